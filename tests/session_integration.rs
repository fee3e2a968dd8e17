// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Integration tests for sessions and scrapes against a mock controller.

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{MockController, WAIT, eventually};
use porter_lib::manager::{LutronConfig, TargetConfig};
use porter_lib::protocol::{Endpoint, ProtocolConnection};
use porter_lib::{ControllerFamily, IntegrationId, LutronClient, MetricFamily, Runnable};
use prometheus::proto::Metric;
use serde_json::json;

fn lutron_config(system: &str) -> LutronConfig {
    let defaults: TargetConfig = serde_json::from_value(json!({
        "system": system,
        "scenes": {"42": "Movie Time"},
        "areas": {
            "Living": [[23, "Pendants"], [28, "Pico", [2, 4]]],
            "Kitchen": [[101_000_301, "Island"]]
        }
    }))
    .unwrap();
    LutronConfig {
        defaults,
        ..LutronConfig::default()
    }
}

fn family<'f>(families: &'f [MetricFamily], name: &str) -> &'f MetricFamily {
    families.iter().find(|f| f.get_name() == name).unwrap()
}

/// Label pairs sorted by name.
fn labels(metric: &Metric) -> Vec<(&str, &str)> {
    let mut pairs: Vec<_> = metric
        .get_label()
        .iter()
        .map(|pair| (pair.get_name(), pair.get_value()))
        .collect();
    pairs.sort_unstable();
    pairs
}

/// Runs the client's scheduler until the test ends.
fn drive(client: &Arc<LutronClient>) {
    let client = Arc::clone(client);
    tokio::spawn(async move {
        loop {
            client.drive_once(Duration::from_millis(50)).await.unwrap();
        }
    });
}

// ============================================================================
// Session Tests
// ============================================================================

mod session {
    use super::*;

    #[tokio::test]
    async fn queries_every_dimmer_after_login() {
        let mut controller = MockController::start(ControllerFamily::Lip).await;
        let client = Arc::new(LutronClient::new(lutron_config("lip")));
        client.register(&controller.target()).unwrap();
        drive(&client);

        assert_eq!(controller.next_line().await, "?OUTPUT,23,1");
        assert_eq!(controller.next_line().await, "?OUTPUT,101000301,1");
    }

    #[tokio::test]
    async fn notifications_update_the_scrape() {
        let mut controller = MockController::start(ControllerFamily::Lip).await;
        let target = controller.target();
        let client = Arc::new(LutronClient::new(lutron_config("lip")));

        // First scrape registers; nothing is known yet.
        assert!(client.collect(&target).is_empty());
        drive(&client);
        controller.wait_for("?OUTPUT,101000301,1").await;

        controller.send("~DEVICE,1,42,3\r\n");
        controller.send("~DEVICE,1,42,4\r\n");
        controller.send("~OUTPUT,23,1,75.00\r\n");
        controller.send("~DEVICE,28,2,3\r\n");

        let session = client.manager().session(&target).unwrap();
        eventually(|| session.snapshot().device_presses.len() == 1).await;

        let snapshot = session.snapshot();
        assert_eq!(snapshot.scene_presses[&42], 1);
        assert_eq!(snapshot.levels[&IntegrationId::new(23)], 75.0);
        assert!(!snapshot.levels.contains_key(&IntegrationId::new(101_000_301)));

        let families = client.collect(&target);
        let levels = family(&families, "output_level_pct");
        assert_eq!(levels.get_metric().len(), 1);
        assert_eq!(
            labels(&levels.get_metric()[0]),
            [("area", "Living"), ("deviceid", "23"), ("name", "Pendants")]
        );

        let presses = family(&families, "press_actions");
        let scene = presses
            .get_metric()
            .iter()
            .find(|metric| labels(metric).contains(&("name", "Movie Time")))
            .unwrap();
        assert!(labels(scene).contains(&("scene_number", "42")));
        assert_eq!(scene.get_counter().get_value(), 1.0);
        let button = presses
            .get_metric()
            .iter()
            .find(|metric| labels(metric).contains(&("deviceid", "28")))
            .unwrap();
        assert!(labels(button).contains(&("button", "2")));
    }

    #[tokio::test]
    async fn illumination_addresses_are_translated() {
        let mut controller = MockController::start(ControllerFamily::Illumination).await;
        let target = controller.target();
        let client = Arc::new(LutronClient::new(lutron_config("illumination")));
        client.register(&target).unwrap();
        drive(&client);

        controller.wait_for("rdl,01:01:00:03:01").await;
        controller.send("DL, [01:01:00:03:01], 40.00\r\n");

        let session = client.manager().session(&target).unwrap();
        eventually(|| !session.snapshot().levels.is_empty()).await;
        assert_eq!(session.snapshot().levels[&IntegrationId::new(101_000_301)], 40.0);
    }

    #[tokio::test]
    async fn quiet_connection_is_pinged() {
        let mut controller = MockController::start(ControllerFamily::Lip).await;
        let mut config = lutron_config("lip");
        config.defaults.keepalive_secs = 2;
        let client = Arc::new(LutronClient::new(config));
        client.register(&controller.target()).unwrap();
        drive(&client);
        controller.wait_for("?OUTPUT,101000301,1").await;
        let opened = Instant::now();

        // Traffic a second in pushes the first ping back.
        tokio::time::sleep(Duration::from_secs(1)).await;
        controller.send("~OUTPUT,23,1,10.00\r\n");
        assert!(controller.wait_for("#PING").await.is_empty());
        assert!(opened.elapsed() >= Duration::from_millis(2500));

        let pinged = Instant::now();
        assert!(controller.wait_for("#PING").await.is_empty());
        let quiet = pinged.elapsed();
        assert!(
            quiet >= Duration::from_millis(1500) && quiet < Duration::from_secs(3),
            "{quiet:?}"
        );
    }
}

// ============================================================================
// Connection Tests
// ============================================================================

mod connection {
    use super::*;

    #[tokio::test]
    async fn dropped_controller_is_reopened() {
        let controller = MockController::start(ControllerFamily::Lip).await;
        let connection = ProtocolConnection::new(ControllerFamily::Lip);
        let endpoint = Endpoint::new("127.0.0.1", controller.port(), "lutron", "integration");
        connection.try_open(&endpoint).await.unwrap();
        assert_eq!(controller.logins(), 1);

        // A half-written frame is lost with the connection.
        controller.send("~OUTPUT,23,1,");
        controller.hang_up();
        let read = tokio::time::timeout(WAIT, connection.read()).await.unwrap();
        assert!(read.is_none());
        assert!(connection.is_connected());
        assert_eq!(connection.endpoint(), Some(endpoint));
        assert_eq!(controller.logins(), 2);

        controller.send("~OUTPUT,23,1,40.00\r\n");
        let frame = tokio::time::timeout(WAIT, connection.read())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(frame.address, IntegrationId::new(23));
        assert_eq!(frame.value, Some(40.0));
    }
}

// ============================================================================
// Command Tests
// ============================================================================

mod commands {
    use super::*;

    #[tokio::test]
    async fn lip_setlevel_zero() {
        let mut controller = MockController::start(ControllerFamily::Lip).await;
        let target = controller.target();
        let client = LutronClient::new(lutron_config("lip"));

        client
            .run(&target, &json!("Pendants"), "setlevel", &[json!(0)])
            .await
            .unwrap();
        client
            .run(&target, &json!(23), "setlevel", &[json!(12.5), json!(2)])
            .await
            .unwrap();

        assert_eq!(controller.next_line().await, "#OUTPUT,23,1,0");
        assert_eq!(controller.next_line().await, "#OUTPUT,23,1,12.5,2");
    }

    #[tokio::test]
    async fn lip_press_scene_and_button() {
        let mut controller = MockController::start(ControllerFamily::Lip).await;
        let target = controller.target();
        let client = LutronClient::new(lutron_config("lip"));

        client
            .run(&target, &json!("Movie Time"), "press", &[])
            .await
            .unwrap();
        client
            .run(&target, &json!("Pico"), "press", &[json!(4)])
            .await
            .unwrap();

        assert_eq!(controller.next_line().await, "#DEVICE,1,42,3");
        assert_eq!(controller.next_line().await, "#DEVICE,1,42,4");
        assert_eq!(controller.next_line().await, "#DEVICE,28,4,3");
        assert_eq!(controller.next_line().await, "#DEVICE,28,4,4");
    }

    #[tokio::test]
    async fn illumination_setlevel_uses_fadedim() {
        let mut controller = MockController::start(ControllerFamily::Illumination).await;
        let target = controller.target();
        let client = LutronClient::new(lutron_config("illumination"));

        client
            .run(&target, &json!("Island"), "setlevel", &[json!(50)])
            .await
            .unwrap();

        assert_eq!(controller.next_line().await, "FADEDIM,50,0,0,01:01:00:03:01");
    }

    #[tokio::test]
    async fn illumination_press_uses_keypad_commands() {
        let mut controller = MockController::start(ControllerFamily::Illumination).await;
        let target = controller.target();
        let client = LutronClient::new(lutron_config("illumination"));

        client
            .run(&target, &json!(28), "press", &[json!("2")])
            .await
            .unwrap();

        assert_eq!(controller.next_line().await, "KBP,28,2");
        assert_eq!(controller.next_line().await, "KBR,28,2");
    }
}
