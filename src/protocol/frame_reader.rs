// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Buffered frame extraction over an async byte stream.
//!
//! [`FrameReader`] accumulates bytes until a [`Terminator`] matches. A
//! literal terminator returns everything up to and including the literal;
//! a pattern terminator returns only the matched bytes, discarding whatever
//! noise preceded them (echoed prompts, banner text). Either way the bytes
//! after the match stay buffered for the next call, so the returned frame
//! does not depend on how the stream was chunked.

use regex::bytes::Regex;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Default cap on buffered bytes while waiting for a terminator.
pub const DEFAULT_MAX_BUFFER: usize = 64 * 1024;

const READ_CHUNK: usize = 1024;

/// What ends a frame.
#[derive(Debug, Clone, Copy)]
pub enum Terminator<'a> {
    /// A fixed byte sequence, such as a login prompt.
    Literal(&'a [u8]),
    /// A line pattern; the first (leftmost) match in the buffer wins.
    Pattern(&'a Regex),
}

/// Why a frame could not be read.
#[derive(Debug, Error)]
pub enum ReadError {
    /// The peer closed the stream (zero-length read).
    #[error("peer closed the connection")]
    Disconnected,

    /// The underlying read failed.
    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Reads terminator-delimited frames from an async reader.
///
/// # Examples
///
/// ```
/// use porter_lib::protocol::{FrameReader, Terminator};
///
/// # tokio_test::block_on(async {
/// let stream: &[u8] = b"login: ";
/// let mut reader = FrameReader::new(stream);
/// let frame = reader.read_until(Terminator::Literal(b"login: ")).await.unwrap();
/// assert_eq!(frame, b"login: ");
/// # });
/// ```
#[derive(Debug)]
pub struct FrameReader<R> {
    inner: R,
    buffer: Vec<u8>,
    max_buffer: usize,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Wraps a reader with an empty buffer.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buffer: Vec::new(),
            max_buffer: DEFAULT_MAX_BUFFER,
        }
    }

    /// Sets the buffer cap. Values below 16 bytes are raised to 16.
    #[must_use]
    pub fn with_max_buffer(mut self, max_buffer: usize) -> Self {
        self.max_buffer = max_buffer.max(16);
        self
    }

    /// Returns the bytes currently buffered but not yet returned.
    #[must_use]
    pub fn buffered(&self) -> &[u8] {
        &self.buffer
    }

    /// Reads until `terminator` matches and returns the frame.
    ///
    /// # Errors
    ///
    /// Returns [`ReadError::Disconnected`] on a zero-length read and
    /// [`ReadError::Io`] if the underlying read fails. A partial frame is
    /// never returned.
    pub async fn read_until(&mut self, terminator: Terminator<'_>) -> Result<Vec<u8>, ReadError> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            if let Some(frame) = self.extract(terminator) {
                return Ok(frame);
            }
            if self.buffer.len() >= self.max_buffer {
                self.drop_stale(terminator);
            }

            let n = self.inner.read(&mut chunk).await?;
            if n == 0 {
                return Err(ReadError::Disconnected);
            }
            self.buffer.extend_from_slice(&chunk[..n]);
        }
    }

    fn extract(&mut self, terminator: Terminator<'_>) -> Option<Vec<u8>> {
        match terminator {
            Terminator::Literal(literal) => {
                let end = find_literal(&self.buffer, literal)? + literal.len();
                Some(self.buffer.drain(..end).collect())
            }
            Terminator::Pattern(pattern) => {
                let found = pattern.find(&self.buffer)?;
                let (start, end) = (found.start(), found.end());
                if start > 0 {
                    tracing::trace!(
                        discarded = %String::from_utf8_lossy(&self.buffer[..start]),
                        "Discarding bytes before frame"
                    );
                }
                let frame = self.buffer[start..end].to_vec();
                self.buffer.drain(..end);
                Some(frame)
            }
        }
    }

    /// Drops buffered bytes that can no longer start a match.
    fn drop_stale(&mut self, terminator: Terminator<'_>) {
        let keep_from = match terminator {
            // A literal may straddle the next read by at most len - 1 bytes.
            Terminator::Literal(literal) => self
                .buffer
                .len()
                .saturating_sub(literal.len().saturating_sub(1)),
            // Line patterns never span a newline.
            Terminator::Pattern(_) => self
                .buffer
                .iter()
                .rposition(|b| *b == b'\n')
                .map_or(self.buffer.len(), |pos| pos + 1),
        };
        let keep_from = if self.buffer.len() - keep_from >= self.max_buffer {
            self.buffer.len()
        } else {
            keep_from
        };
        tracing::warn!(
            dropped = keep_from,
            max_buffer = self.max_buffer,
            "Frame buffer overflow, dropping unmatched bytes"
        );
        self.buffer.drain(..keep_from);
    }
}

fn find_literal(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use std::sync::LazyLock;

    use super::*;

    static LINE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"~([A-Z]+),([0-9.]+),([0-9.]+)(?:,([0-9.]+))?\r\n").unwrap());

    #[tokio::test]
    async fn literal_includes_prefix_and_keeps_trailing_bytes() {
        let mock = tokio_test::io::Builder::new()
            .read(b"Welcome\r\nlogin: extra")
            .build();
        let mut reader = FrameReader::new(mock);

        let frame = reader.read_until(Terminator::Literal(b"login: ")).await.unwrap();

        assert_eq!(frame, b"Welcome\r\nlogin: ");
        assert_eq!(reader.buffered(), b"extra");
    }

    #[tokio::test]
    async fn literal_split_across_reads() {
        let mock = tokio_test::io::Builder::new()
            .read(b"pass")
            .read(b"wor")
            .read(b"d: ")
            .build();
        let mut reader = FrameReader::new(mock);

        let frame = reader.read_until(Terminator::Literal(b"password: ")).await.unwrap();

        assert_eq!(frame, b"password: ");
    }

    #[tokio::test]
    async fn pattern_is_independent_of_chunking() {
        let stream: &[u8] = b"GNET> ~OUTPUT,23,1,75.00\r\n~DEVICE,1,42,3\r\n";
        for split in 1..stream.len() {
            let mock = tokio_test::io::Builder::new()
                .read(&stream[..split])
                .read(&stream[split..])
                .build();
            let mut reader = FrameReader::new(mock);

            let first = reader.read_until(Terminator::Pattern(&LINE)).await.unwrap();
            let second = reader.read_until(Terminator::Pattern(&LINE)).await.unwrap();

            assert_eq!(first, b"~OUTPUT,23,1,75.00\r\n", "split at {split}");
            assert_eq!(second, b"~DEVICE,1,42,3\r\n", "split at {split}");
        }
    }

    #[tokio::test]
    async fn byte_at_a_time_stream() {
        let mut builder = tokio_test::io::Builder::new();
        for byte in b"~OUTPUT,7,1,0\r\n" {
            builder.read(std::slice::from_ref(byte));
        }
        let mut reader = FrameReader::new(builder.build());

        let frame = reader.read_until(Terminator::Pattern(&LINE)).await.unwrap();

        assert_eq!(frame, b"~OUTPUT,7,1,0\r\n");
    }

    #[tokio::test]
    async fn zero_length_read_is_disconnect_not_partial_frame() {
        let mock = tokio_test::io::Builder::new().read(b"~OUTPUT,23,1,7").build();
        let mut reader = FrameReader::new(mock);

        let result = reader.read_until(Terminator::Pattern(&LINE)).await;

        assert!(matches!(result, Err(ReadError::Disconnected)));
        assert_eq!(reader.buffered(), b"~OUTPUT,23,1,7");
    }

    #[tokio::test]
    async fn io_error_is_reported() {
        let mock = tokio_test::io::Builder::new()
            .read_error(std::io::Error::other("reset"))
            .build();
        let mut reader = FrameReader::new(mock);

        let result = reader.read_until(Terminator::Literal(b"\r\n")).await;

        assert!(matches!(result, Err(ReadError::Io(_))));
    }

    #[tokio::test]
    async fn overflow_drops_noise_and_still_finds_frame() {
        let noise = vec![b'x'; 200];
        let mock = tokio_test::io::Builder::new()
            .read(&noise)
            .read(b"\r\n~OUTPUT,5,1,100\r\n")
            .build();
        let mut reader = FrameReader::new(mock).with_max_buffer(64);

        let frame = reader.read_until(Terminator::Pattern(&LINE)).await.unwrap();

        assert_eq!(frame, b"~OUTPUT,5,1,100\r\n");
        assert!(reader.buffered().is_empty());
    }
}
