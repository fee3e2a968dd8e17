// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Stateful telnet connection to one controller.
//!
//! A [`ProtocolConnection`] owns one TCP socket split into halves. The read
//! half (with its [`FrameReader`] buffer) and the write half sit behind
//! independent locks, so a pending read never delays a command. Only
//! same-direction operations serialize.
//!
//! # Lifecycle
//!
//! ```text
//!   Closed ──open()──> Opening ──login ok──> Opened
//!     ^                   │                    │
//!     └──── failure ──────┘     read failure ──┤ (reopen with last endpoint)
//!     └──────────────────────── logout() ──────┘
//! ```
//!
//! Transient failures are logged and swallowed; callers check
//! [`ProtocolConnection::is_connected`] after [`ProtocolConnection::open`].

use std::fmt;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Mutex;

use crate::error::ProtocolError;
use crate::protocol::frame_reader::{DEFAULT_MAX_BUFFER, FrameReader, Terminator};
use crate::protocol::{Command, ControllerFamily, Frame};
use crate::types::IntegrationId;

/// Default prompt printed by Lutron bridges after login.
pub const DEFAULT_PROMPT: &str = "GNET";

/// Default time allowed for connect plus login.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No socket.
    Closed,
    /// Connecting or logging in.
    Opening,
    /// Logged in and monitoring.
    Opened,
}

/// Where and as whom to log in.
#[derive(Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Controller host name or address.
    pub host: String,
    /// Telnet port.
    pub port: u16,
    /// Integration user.
    pub user: String,
    /// Integration password.
    pub password: String,
}

impl Endpoint {
    /// Creates an endpoint.
    #[must_use]
    pub fn new(
        host: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            user: user.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// A connection to one controller.
///
/// # Examples
///
/// ```no_run
/// use porter_lib::protocol::{ControllerFamily, Endpoint, ProtocolConnection};
/// use porter_lib::types::IntegrationId;
///
/// # async fn example() {
/// let conn = ProtocolConnection::new(ControllerFamily::Lip);
/// conn.open(&Endpoint::new("192.168.1.20", 23, "lutron", "integration")).await;
///
/// if conn.is_connected() {
///     conn.query("OUTPUT", IntegrationId::new(23), 1).await;
///     if let Some(frame) = conn.read().await {
///         println!("{} {} {:?}", frame.kind, frame.address, frame.value);
///     }
/// }
/// # }
/// ```
pub struct ProtocolConnection {
    family: ControllerFamily,
    prompt: Vec<u8>,
    connect_timeout: Duration,
    max_buffer: usize,
    state: parking_lot::Mutex<ConnectionState>,
    endpoint: parking_lot::Mutex<Option<Endpoint>>,
    reader: Mutex<Option<FrameReader<OwnedReadHalf>>>,
    writer: Mutex<Option<OwnedWriteHalf>>,
}

impl ProtocolConnection {
    /// Creates a closed connection for the given family.
    #[must_use]
    pub fn new(family: ControllerFamily) -> Self {
        Self {
            family,
            prompt: prompt_bytes(DEFAULT_PROMPT),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_buffer: DEFAULT_MAX_BUFFER,
            state: parking_lot::Mutex::new(ConnectionState::Closed),
            endpoint: parking_lot::Mutex::new(None),
            reader: Mutex::new(None),
            writer: Mutex::new(None),
        }
    }

    /// Sets the login prompt name; the connection expects `<prompt>> `.
    #[must_use]
    pub fn with_prompt(mut self, prompt: &str) -> Self {
        self.prompt = prompt_bytes(prompt);
        self
    }

    /// Sets the time allowed for connect plus login.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the read buffer cap.
    #[must_use]
    pub fn with_max_buffer(mut self, max_buffer: usize) -> Self {
        self.max_buffer = max_buffer;
        self
    }

    /// Returns the controller family.
    #[must_use]
    pub fn family(&self) -> ControllerFamily {
        self.family
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    /// Returns true when logged in.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Opened
    }

    /// Returns the endpoint of the last open attempt.
    #[must_use]
    pub fn endpoint(&self) -> Option<Endpoint> {
        self.endpoint.lock().clone()
    }

    /// Opens the connection, logging and swallowing failures.
    ///
    /// No-op unless the connection is closed. Check [`Self::is_connected`]
    /// afterwards.
    pub async fn open(&self, endpoint: &Endpoint) {
        if let Err(e) = self.try_open(endpoint).await {
            tracing::warn!(
                endpoint = %endpoint,
                family = %self.family,
                error = %e,
                "Error opening controller connection"
            );
        }
    }

    /// Opens the connection, returning the failure.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError` if connecting or logging in fails or times
    /// out. The connection is left closed.
    pub async fn try_open(&self, endpoint: &Endpoint) -> Result<(), ProtocolError> {
        if self.state() != ConnectionState::Closed {
            return Ok(());
        }
        let mut reader_slot = self.reader.lock().await;
        let mut writer_slot = self.writer.lock().await;
        {
            let mut state = self.state.lock();
            if *state != ConnectionState::Closed {
                return Ok(());
            }
            *state = ConnectionState::Opening;
        }
        *self.endpoint.lock() = Some(endpoint.clone());
        tracing::debug!(endpoint = %endpoint, family = %self.family, "Opening controller connection");

        let result = tokio::time::timeout(self.connect_timeout, self.handshake(endpoint)).await;
        match result {
            Ok(Ok((reader, writer))) => {
                *reader_slot = Some(reader);
                *writer_slot = Some(writer);
                *self.state.lock() = ConnectionState::Opened;
                tracing::info!(endpoint = %endpoint, family = %self.family, "Opened controller connection");
                Ok(())
            }
            Ok(Err(e)) => {
                *reader_slot = None;
                *writer_slot = None;
                *self.state.lock() = ConnectionState::Closed;
                Err(e)
            }
            Err(_) => {
                *reader_slot = None;
                *writer_slot = None;
                *self.state.lock() = ConnectionState::Closed;
                // Safe: connect timeouts are seconds, far below u64::MAX ms
                #[allow(clippy::cast_possible_truncation)]
                let timeout_ms = self.connect_timeout.as_millis() as u64;
                Err(ProtocolError::Timeout(timeout_ms))
            }
        }
    }

    /// Connects and performs the family's login exchange.
    async fn handshake(
        &self,
        endpoint: &Endpoint,
    ) -> Result<(FrameReader<OwnedReadHalf>, OwnedWriteHalf), ProtocolError> {
        let stream = TcpStream::connect((endpoint.host.as_str(), endpoint.port))
            .await
            .map_err(|e| ProtocolError::ConnectionFailed(format!("{endpoint}: {e}")))?;
        let (read_half, mut writer) = stream.into_split();
        let mut reader = FrameReader::new(read_half).with_max_buffer(self.max_buffer);

        match self.family {
            ControllerFamily::Lip => {
                expect(&mut reader, b"login: ", "login prompt").await?;
                write_line(&mut writer, &format!("{}\r\n", endpoint.user)).await?;
                expect(&mut reader, b"password: ", "password prompt").await?;
                write_line(&mut writer, &format!("{}\r\n", endpoint.password)).await?;
                expect(&mut reader, &self.prompt, "command prompt").await?;
            }
            ControllerFamily::Illumination => {
                expect(&mut reader, b"LOGIN: ", "login prompt").await?;
                write_line(
                    &mut writer,
                    &format!("{},{}\r\n", endpoint.user, endpoint.password),
                )
                .await?;
                expect(&mut reader, b"login successful\r\n", "login confirmation").await?;
                for monitor in ControllerFamily::ILLUMINATION_MONITORS {
                    write_line(&mut writer, &format!("{monitor}\r\n")).await?;
                    expect(&mut reader, b"monitoring enabled\r\n", monitor).await?;
                }
            }
        }
        Ok((reader, writer))
    }

    /// Waits for the next notification.
    ///
    /// Returns `None` when the connection is not open, when the frame cannot
    /// be decoded, or when the peer disconnected. In the last case the
    /// connection is reopened with the last endpoint before returning; the
    /// caller simply reads again.
    pub async fn read(&self) -> Option<Frame> {
        let outcome = {
            let mut guard = self.reader.lock().await;
            if !self.is_connected() {
                return None;
            }
            let reader = guard.as_mut()?;
            reader
                .read_until(Terminator::Pattern(self.family.frame_pattern()))
                .await
        };

        match outcome {
            Ok(raw) => match self.family.decode(&raw) {
                Ok(frame) => {
                    tracing::debug!(
                        kind = %frame.kind,
                        address = %frame.address,
                        action = frame.action,
                        value = ?frame.value,
                        "Received frame"
                    );
                    Some(frame)
                }
                Err(e) => {
                    tracing::warn!(
                        frame = %String::from_utf8_lossy(&raw).trim_end(),
                        error = %e,
                        "Discarding undecodable frame"
                    );
                    None
                }
            },
            Err(e) => {
                let endpoint = self.endpoint();
                tracing::info!(
                    endpoint = ?endpoint.as_ref().map(ToString::to_string),
                    error = %e,
                    "Controller read failed, reconnecting"
                );
                *self.state.lock() = ConnectionState::Closed;
                if let Some(endpoint) = endpoint {
                    self.open(&endpoint).await;
                }
                None
            }
        }
    }

    /// Sends a command line. No-op unless open; write errors are logged.
    pub async fn send(&self, command: &Command) {
        let line = command.to_line(self.family);
        let mut guard = self.writer.lock().await;
        if !self.is_connected() {
            tracing::debug!(command = %line.trim_end(), "Not connected, dropping command");
            return;
        }
        let Some(writer) = guard.as_mut() else {
            return;
        };
        tracing::debug!(command = %line.trim_end(), "Sending command");
        if let Err(e) = write_line(writer, &line).await {
            tracing::warn!(error = %e, "Error writing to the controller");
        }
    }

    /// Sends `#MODE,ADDRESS,ACTION[,VALUE][,ARGS...]`.
    pub async fn write(
        &self,
        mode: &str,
        address: IntegrationId,
        action: u32,
        value: Option<&str>,
        args: &[&str],
    ) {
        let mut command = Command::write(mode, address, action);
        if let Some(value) = value {
            command = command.with_value(value);
        }
        for arg in args {
            command = command.with_arg(*arg);
        }
        self.send(&command).await;
    }

    /// Asks the controller to report a level.
    pub async fn query(&self, mode: &str, address: IntegrationId, action: u32) {
        self.send(&Command::query(mode, address, action)).await;
    }

    /// Sends a keepalive.
    pub async fn ping(&self) {
        self.send(&Command::Ping).await;
    }

    /// Sends a raw comma-joined line, such as `FADEDIM,50,0,0,01:01`.
    pub async fn send_fields(&self, fields: &[&str]) {
        self.send(&Command::raw(fields.iter().copied())).await;
    }

    /// Logs out and marks the connection closed.
    pub async fn logout(&self) {
        let line = Command::Logout.to_line(self.family);
        let mut guard = self.writer.lock().await;
        if !self.is_connected() {
            return;
        }
        if let Some(writer) = guard.as_mut()
            && let Err(e) = write_line(writer, &line).await
        {
            tracing::warn!(error = %e, "Error writing logout to the controller");
        }
        *self.state.lock() = ConnectionState::Closed;
        tracing::info!(endpoint = ?self.endpoint().map(|e| e.to_string()), "Logged out");
    }
}

impl fmt::Debug for ProtocolConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtocolConnection")
            .field("family", &self.family)
            .field("state", &self.state())
            .field("endpoint", &self.endpoint())
            .finish_non_exhaustive()
    }
}

fn prompt_bytes(prompt: &str) -> Vec<u8> {
    format!("{prompt}> ").into_bytes()
}

async fn expect(
    reader: &mut FrameReader<OwnedReadHalf>,
    literal: &[u8],
    what: &str,
) -> Result<(), ProtocolError> {
    reader
        .read_until(Terminator::Literal(literal))
        .await
        .map(|_| ())
        .map_err(|e| ProtocolError::LoginFailed(format!("waiting for {what}: {e}")))
}

async fn write_line(writer: &mut OwnedWriteHalf, line: &str) -> Result<(), ProtocolError> {
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}
