//! Tokio codec for the ingress link.
//!
//! This module provides [`IngressCodec`], which implements the `Decoder` and
//! `Encoder` traits from `tokio-util` so a scanner connection can be wrapped
//! in a `Framed` transport.
//!
//! # Framing
//!
//! Inbound payloads are terminated by `\n` (an optional `\r` is dropped).
//! Scanners that never send a terminator are handled by the listener, which
//! calls [`decode_eof`](Decoder::decode_eof) on whatever arrived once the link
//! goes quiet or the peer half-closes.
//!
//! Outbound traffic is either the 2-byte acknowledgment `OK` or a relayed
//! display message. Relayed messages keep their `\n` line breaks and end with
//! an empty line.
//!
//! # Example
//!
//! ```no_run
//! use tokio::net::TcpStream;
//! use tokio_util::codec::Framed;
//! use doorman_protocol::IngressCodec;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let stream = TcpStream::connect("127.0.0.1:8080").await?;
//! let framed = Framed::new(stream, IngressCodec::new());
//! # Ok(())
//! # }
//! ```

use crate::payload::IngressFrame;
use bytes::{BufMut, BytesMut};
use doorman_core::constants::{ACK_TOKEN, MAX_PAYLOAD_SIZE};
use doorman_core::{Error, Result};
use tokio_util::codec::{Decoder, Encoder};

/// Outbound frames written to a scanner connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngressReply {
    /// Fixed 2-byte success token.
    Ack,

    /// Display message relayed through an open session, terminated by an empty line.
    Relay(String),
}

/// Codec for scanner payloads and replies.
#[derive(Debug, Clone)]
pub struct IngressCodec {
    max_payload_size: usize,
}

impl IngressCodec {
    /// Create a codec with the default payload limit (1024 bytes).
    pub fn new() -> Self {
        Self {
            max_payload_size: MAX_PAYLOAD_SIZE,
        }
    }

    /// Create a codec with a custom payload limit.
    pub fn with_max_payload_size(max_payload_size: usize) -> Self {
        Self { max_payload_size }
    }

    pub fn max_payload_size(&self) -> usize {
        self.max_payload_size
    }

    fn parse_bytes(&self, bytes: &[u8]) -> Result<IngressFrame> {
        if bytes.len() > self.max_payload_size {
            return Err(Error::FrameTooLarge {
                size: bytes.len(),
                max_size: self.max_payload_size,
            });
        }

        let text = std::str::from_utf8(bytes)
            .map_err(|e| Error::InvalidPayload(format!("Payload is not UTF-8: {e}")))?;

        IngressFrame::parse(text)
    }
}

impl Default for IngressCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for IngressCodec {
    type Item = IngressFrame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<IngressFrame>> {
        loop {
            let Some(pos) = src.iter().position(|b| *b == b'\n') else {
                if src.len() > self.max_payload_size {
                    return Err(Error::FrameTooLarge {
                        size: src.len(),
                        max_size: self.max_payload_size,
                    });
                }
                return Ok(None);
            };

            let line = src.split_to(pos + 1);
            let line = line.strip_suffix(b"\n").unwrap_or(&line[..]);
            let line = line.strip_suffix(b"\r").unwrap_or(line);

            // Blank lines between payloads carry nothing
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            return self.parse_bytes(line).map(Some);
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<IngressFrame>> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }

        if src.iter().all(u8::is_ascii_whitespace) {
            src.clear();
            return Ok(None);
        }

        let remaining = src.split();
        self.parse_bytes(&remaining[..]).map(Some)
    }
}

impl Encoder<IngressReply> for IngressCodec {
    type Error = Error;

    fn encode(&mut self, item: IngressReply, dst: &mut BytesMut) -> Result<()> {
        match item {
            IngressReply::Ack => dst.put_slice(ACK_TOKEN),
            IngressReply::Relay(text) => {
                let text = text.trim_end_matches('\n');
                dst.reserve(text.len() + 2);
                dst.put_slice(text.as_bytes());
                dst.put_slice(b"\n\n");
            }
        }
        Ok(())
    }
}
