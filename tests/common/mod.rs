// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-process mock Lutron controller for integration tests.

#![allow(dead_code)]

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use porter_lib::ControllerFamily;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::TcpListener;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;

/// How long a test waits for the crate to do something.
pub const WAIT: Duration = Duration::from_secs(5);

enum Outgoing {
    Line(String),
    HangUp,
}

/// A controller on `127.0.0.1` serving one session at a time.
///
/// Lines written by the client are recorded in order; lines queued with
/// [`MockController::send`] are written once the client has logged in.
/// After [`MockController::hang_up`] the next connection is accepted.
pub struct MockController {
    port: u16,
    outgoing: mpsc::UnboundedSender<Outgoing>,
    received: mpsc::UnboundedReceiver<String>,
    logins: Arc<AtomicUsize>,
}

impl MockController {
    pub async fn start(family: ControllerFamily) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (outgoing, mut outgoing_rx) = mpsc::unbounded_channel();
        let (received_tx, received) = mpsc::unbounded_channel();
        let logins = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&logins);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let (read, mut write) = stream.into_split();
                let mut lines = BufReader::new(read).lines();
                if login(family, &mut lines, &mut write, &counter).await.is_err() {
                    continue;
                }

                loop {
                    tokio::select! {
                        line = lines.next_line() => match line {
                            Ok(Some(line)) => {
                                if received_tx.send(line.trim_end().to_string()).is_err() {
                                    return;
                                }
                            }
                            _ => break,
                        },
                        outgoing = outgoing_rx.recv() => match outgoing {
                            Some(Outgoing::Line(line)) => {
                                if write.write_all(line.as_bytes()).await.is_err() {
                                    break;
                                }
                            }
                            Some(Outgoing::HangUp) => break,
                            None => return,
                        },
                    }
                }
            }
        });

        Self {
            port,
            outgoing,
            received,
            logins,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Target name for this controller.
    pub fn target(&self) -> String {
        format!("127.0.0.1:{}", self.port)
    }

    /// Queues a raw notification, including its terminator.
    pub fn send(&self, line: &str) {
        self.outgoing.send(Outgoing::Line(line.to_string())).unwrap();
    }

    /// Closes the current connection after the queued lines are written.
    pub fn hang_up(&self) {
        self.outgoing.send(Outgoing::HangUp).unwrap();
    }

    /// Number of completed logins.
    pub fn logins(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
    }

    /// Returns the next line the client wrote.
    pub async fn next_line(&mut self) -> String {
        tokio::time::timeout(WAIT, self.received.recv())
            .await
            .expect("timed out waiting for the client")
            .expect("controller connection closed")
    }

    /// Skips client lines until `expected` arrives; returns the skipped ones.
    pub async fn wait_for(&mut self, expected: &str) -> Vec<String> {
        let mut skipped = Vec::new();
        loop {
            let line = self.next_line().await;
            if line == expected {
                return skipped;
            }
            skipped.push(line);
        }
    }
}

/// Runs the family's login exchange. The login is counted before the
/// final reply so the client never sees a session the count misses.
async fn login(
    family: ControllerFamily,
    lines: &mut Lines<BufReader<OwnedReadHalf>>,
    write: &mut OwnedWriteHalf,
    logins: &AtomicUsize,
) -> io::Result<()> {
    match family {
        ControllerFamily::Lip => {
            write.write_all(b"login: ").await?;
            lines.next_line().await?;
            write.write_all(b"password: ").await?;
            lines.next_line().await?;
            logins.fetch_add(1, Ordering::SeqCst);
            write.write_all(b"GNET> ").await?;
        }
        ControllerFamily::Illumination => {
            write.write_all(b"LOGIN: ").await?;
            lines.next_line().await?;
            write.write_all(b"login successful\r\n").await?;
            for (n, _) in ControllerFamily::ILLUMINATION_MONITORS.iter().enumerate() {
                lines.next_line().await?;
                if n + 1 == ControllerFamily::ILLUMINATION_MONITORS.len() {
                    logins.fetch_add(1, Ordering::SeqCst);
                }
                write.write_all(b"monitoring enabled\r\n").await?;
            }
        }
    }
    Ok(())
}

/// Polls `check` until it passes or [`WAIT`] elapses.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    let result = tokio::time::timeout(WAIT, async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(result.is_ok(), "condition not reached in time");
}
