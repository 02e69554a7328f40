//! Git pkt-line format implementation.
//!
//! The pkt-line format is used for all git protocol communication.
//! Each line is prefixed with a 4-character hex length, or "0000" for flush.
//! The length counts the prefix itself.

use crate::{GitError, Result};
use std::io::Write;

/// Largest encoded packet, prefix included.
pub const MAX_PKT_LEN: usize = 0xffff;

/// Largest payload that fits in one packet.
pub const MAX_PKT_PAYLOAD: usize = MAX_PKT_LEN - 4;

/// Encoded flush packet.
pub const FLUSH_PKT: &[u8] = b"0000";

/// A pkt-line packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PktLine {
    /// Data line with content.
    Data(Vec<u8>),
    /// Flush packet (0000).
    Flush,
    /// Delimiter packet (0001).
    Delimiter,
    /// Response-end packet (0002).
    ResponseEnd,
}

impl PktLine {
    /// Creates a data packet from a string slice.
    pub fn from_string(s: &str) -> Self {
        Self::Data(s.as_bytes().to_vec())
    }

    /// Creates a data packet from bytes.
    pub fn from_bytes(b: impl Into<Vec<u8>>) -> Self {
        Self::Data(b.into())
    }

    /// Creates a data packet, rejecting payloads that do not fit the 4-digit length.
    pub fn data(b: impl Into<Vec<u8>>) -> Result<Self> {
        let data = b.into();
        if data.len() > MAX_PKT_PAYLOAD {
            return Err(GitError::InvalidPktLine(format!(
                "payload of {} bytes exceeds {}",
                data.len(),
                MAX_PKT_PAYLOAD
            )));
        }
        Ok(Self::Data(data))
    }

    /// Encodes the packet to bytes.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::Data(data) => {
                let len = data.len() + 4; // 4 bytes for the length prefix
                let mut result = format!("{:04x}", len).into_bytes();
                result.extend_from_slice(data);
                result
            }
            Self::Flush => FLUSH_PKT.to_vec(),
            Self::Delimiter => b"0001".to_vec(),
            Self::ResponseEnd => b"0002".to_vec(),
        }
    }

    /// Returns true if this is a flush packet.
    pub fn is_flush(&self) -> bool {
        matches!(self, Self::Flush)
    }

    /// Returns the data content, or None for special packets.
    pub fn payload(&self) -> Option<&[u8]> {
        match self {
            Self::Data(data) => Some(data),
            _ => None,
        }
    }

    /// Returns the data as a string, trimming any trailing newline.
    pub fn as_str(&self) -> Option<&str> {
        self.payload()
            .and_then(|d| std::str::from_utf8(d).ok())
            .map(|s| s.strip_suffix('\n').unwrap_or(s))
    }
}

/// Encodes a single data line. Callers keep `data` within [`MAX_PKT_PAYLOAD`].
pub fn encode(data: &[u8]) -> Vec<u8> {
    PktLine::from_bytes(data).encode()
}

fn parse_len(prefix: &[u8]) -> Option<usize> {
    let text = std::str::from_utf8(prefix).ok()?;
    if !text.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    usize::from_str_radix(text, 16).ok()
}

/// Decodes a buffer into its data payloads, skipping flush packets.
///
/// This never fails: decoding stops at the first malformed length prefix
/// (non-hex, or shorter than the prefix itself) or at a payload that runs
/// past the end of the input. One trailing newline is trimmed from each line.
pub fn decode_lines(buf: &[u8]) -> Vec<Vec<u8>> {
    let mut lines = Vec::new();
    let mut pos = 0;

    while let Some(prefix) = buf.get(pos..pos + 4) {
        let Some(len) = parse_len(prefix) else {
            break;
        };
        if len == 0 {
            pos += 4;
            continue;
        }
        if len < 4 {
            break;
        }
        let Some(payload) = buf.get(pos + 4..pos + len) else {
            break;
        };
        let payload = payload.strip_suffix(b"\n").unwrap_or(payload);
        lines.push(payload.to_vec());
        pos += len;
    }

    lines
}

/// Strict reader over a borrowed buffer.
pub struct PktLineReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> PktLineReader<'a> {
    /// Creates a new pkt-line reader.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Reads the next packet, or `None` at the end of the buffer.
    pub fn read(&mut self) -> Result<Option<PktLine>> {
        if self.pos == self.data.len() {
            return Ok(None);
        }
        let prefix = self
            .data
            .get(self.pos..self.pos + 4)
            .ok_or_else(|| GitError::InvalidPktLine("truncated length prefix".to_string()))?;

        match prefix {
            b"0000" => {
                self.pos += 4;
                return Ok(Some(PktLine::Flush));
            }
            b"0001" => {
                self.pos += 4;
                return Ok(Some(PktLine::Delimiter));
            }
            b"0002" => {
                self.pos += 4;
                return Ok(Some(PktLine::ResponseEnd));
            }
            _ => {}
        }

        let len = parse_len(prefix)
            .ok_or_else(|| GitError::InvalidPktLine("invalid length".to_string()))?;
        if len < 4 {
            return Err(GitError::InvalidPktLine("length too small".to_string()));
        }
        let payload = self
            .data
            .get(self.pos + 4..self.pos + len)
            .ok_or_else(|| GitError::InvalidPktLine("truncated payload".to_string()))?;
        self.pos += len;

        Ok(Some(PktLine::Data(payload.to_vec())))
    }

    /// Reads all packets until a flush packet.
    pub fn read_until_flush(&mut self) -> Result<Vec<PktLine>> {
        let mut packets = Vec::new();
        loop {
            match self.read()? {
                Some(PktLine::Flush) | None => break,
                Some(pkt) => packets.push(pkt),
            }
        }
        Ok(packets)
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }
}

/// Writer for pkt-line format.
pub struct PktLineWriter<W> {
    writer: W,
}

impl<W: Write> PktLineWriter<W> {
    /// Creates a new pkt-line writer.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Writes a packet.
    pub fn write(&mut self, pkt: &PktLine) -> Result<()> {
        self.writer.write_all(&pkt.encode())?;
        Ok(())
    }

    /// Writes a data line.
    pub fn write_data(&mut self, data: &[u8]) -> Result<()> {
        self.write(&PktLine::data(data.to_vec())?)
    }

    /// Writes a string line (with newline).
    pub fn write_line(&mut self, s: &str) -> Result<()> {
        let mut data = s.as_bytes().to_vec();
        if !s.ends_with('\n') {
            data.push(b'\n');
        }
        self.write(&PktLine::data(data)?)
    }

    /// Writes a flush packet.
    pub fn flush_pkt(&mut self) -> Result<()> {
        self.write(&PktLine::Flush)
    }

    /// Writes raw bytes with no framing (pack data after `NAK`).
    pub fn write_raw(&mut self, data: &[u8]) -> Result<()> {
        self.writer.write_all(data)?;
        Ok(())
    }

    /// Flushes the underlying writer.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    /// Returns the inner writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}
