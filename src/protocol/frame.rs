//! Frame layout.
//!
//! ```text
//! client -> server   request   selector | args...
//! server -> client   response  0x00 | result
//!                    event     0x01 | event ordinal (u8) | args...
//!                    fault     0x02 | message (string)
//! ```
//!
//! The selector is either a one-byte method ordinal or a length-prefixed
//! method name, depending on [`SelectorEncoding`]. Frames carry no length
//! field; boundaries are implied by the declared signatures.
//!
//! # Example
//!
//! ```
//! use tinyrpc::protocol::{build_event, FrameKind};
//!
//! let frame = build_event(0, &(1.5f64, "x")).unwrap();
//! assert_eq!(frame[0], FrameKind::Event.as_byte());
//! assert_eq!(frame[1], 0);
//! assert_eq!(frame.len(), 2 + 8 + 2);
//! ```

use std::fmt;

use bytes::Bytes;

use crate::codec::{WireDecode, WireEncode, WireReader, WireWriter, MAX_STRING_LEN};
use crate::config::SelectorEncoding;
use crate::error::{CodecResult, ProtocolViolation};

/// Leading byte of every server-to-client frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameKind {
    /// Result of the outstanding call.
    Response = 0x00,
    /// Unsolicited event.
    Event = 0x01,
    /// Failure of the outstanding call.
    Fault = 0x02,
}

impl FrameKind {
    /// Wire byte for this kind.
    #[inline]
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// Parse a frame kind byte.
    pub fn from_byte(b: u8) -> Result<Self, ProtocolViolation> {
        match b {
            0x00 => Ok(FrameKind::Response),
            0x01 => Ok(FrameKind::Event),
            0x02 => Ok(FrameKind::Fault),
            other => Err(ProtocolViolation::UnexpectedFrameKind(other)),
        }
    }
}

/// Method selector at the head of a request frame.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Selector {
    /// 0-based declaration index.
    Ordinal(u8),
    /// Method name.
    Name(String),
}

impl Selector {
    /// Read a selector in the given encoding.
    pub fn decode(r: &mut WireReader<'_>, encoding: SelectorEncoding) -> CodecResult<Self> {
        match encoding {
            SelectorEncoding::Ordinal => Ok(Selector::Ordinal(r.read_u8()?)),
            SelectorEncoding::Name => Ok(Selector::Name(String::decode(r)?)),
        }
    }

    /// Append this selector to `w`.
    pub fn encode(&self, w: &mut WireWriter) -> CodecResult<()> {
        match self {
            Selector::Ordinal(ordinal) => {
                w.put_u8(*ordinal);
                Ok(())
            }
            Selector::Name(name) => name.encode(w),
        }
    }

    /// The protocol violation raised when nothing matches this selector.
    pub fn unknown(&self) -> ProtocolViolation {
        match self {
            Selector::Ordinal(ordinal) => ProtocolViolation::UnknownOrdinal(*ordinal),
            Selector::Name(name) => ProtocolViolation::UnknownName(name.clone()),
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Ordinal(ordinal) => write!(f, "#{}", ordinal),
            Selector::Name(name) => write!(f, "'{}'", name),
        }
    }
}

/// Build a request frame.
pub fn build_request<A: WireEncode + ?Sized>(selector: &Selector, args: &A) -> CodecResult<Bytes> {
    let mut w = WireWriter::new();
    selector.encode(&mut w)?;
    args.encode(&mut w)?;
    Ok(w.freeze())
}

/// Build a response frame around an encoded result.
pub fn build_response<R: WireEncode + ?Sized>(result: &R) -> CodecResult<Bytes> {
    let mut w = WireWriter::new();
    w.put_u8(FrameKind::Response.as_byte());
    result.encode(&mut w)?;
    Ok(w.freeze())
}

/// Build an event frame.
pub fn build_event<A: WireEncode + ?Sized>(ordinal: u8, args: &A) -> CodecResult<Bytes> {
    let mut w = WireWriter::new();
    w.put_u8(FrameKind::Event.as_byte());
    w.put_u8(ordinal);
    args.encode(&mut w)?;
    Ok(w.freeze())
}

/// Build a fault frame. Messages longer than a wire string are cut at the
/// last character boundary that fits.
pub fn build_fault(message: &str) -> CodecResult<Bytes> {
    let mut end = message.len().min(MAX_STRING_LEN);
    while !message.is_char_boundary(end) {
        end -= 1;
    }

    let mut w = WireWriter::with_capacity(2 + end);
    w.put_u8(FrameKind::Fault.as_byte());
    message[..end].encode(&mut w)?;
    Ok(w.freeze())
}
