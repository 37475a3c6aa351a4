//! Codec module - the binary wire codec.
//!
//! Every wire value implements [`WireEncode`] and/or [`WireDecode`]. Encoding
//! appends to a [`WireWriter`]; decoding consumes from a bounds-checked
//! [`WireReader`]. The codec performs no I/O: when the cursor runs dry it
//! reports [`CodecError::Incomplete`](crate::error::CodecError::Incomplete)
//! and the caller decides whether to read more.
//!
//! # Wire format
//!
//! ```text
//! integer(N bits)  N/8 raw bytes, native byte order
//! f32 / f64        4 / 8 raw bytes, native byte order
//! bool             1 byte, 0 or 1
//! string           1 length byte (0-255) + UTF-8 bytes
//! sequence<T>      u32 count + count x T
//! tuple(T1..Tn)    T1 .. Tn, no delimiter
//! record           fields in declaration order
//! enum             i32 ordinal
//! timestamp        i64 .NET ticks (100ns since 0001-01-01T00:00:00Z)
//! ```
//!
//! # Example
//!
//! ```
//! use tinyrpc::codec::{decode_from_slice, encode_to_bytes};
//!
//! let bytes = encode_to_bytes(&(2i32, String::from("hi"))).unwrap();
//! assert_eq!(bytes.len(), 4 + 1 + 2);
//!
//! let (n, s): (i32, String) = decode_from_slice(&bytes).unwrap();
//! assert_eq!((n, s.as_str()), (2, "hi"));
//! ```

mod cursor;
mod macros;
mod primitives;
mod timestamp;

use bytes::Bytes;
use serde::Serialize;

pub use crate::error::{CodecError, CodecResult};
pub use cursor::{WireReader, WireWriter};
pub use primitives::MAX_STRING_LEN;
pub use timestamp::{
    ticks_from_unix_nanos, unix_nanos_from_ticks, NANOS_PER_TICK, TICKS_AT_UNIX_EPOCH,
};

/// Static description of a wire type, used by method descriptors and the
/// exported schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum WireType {
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    String,
    Timestamp,
    Sequence {
        element: Box<WireType>,
    },
    Tuple {
        elements: Vec<WireType>,
    },
    Record {
        name: &'static str,
        fields: Vec<Field>,
    },
    Enum {
        name: &'static str,
        variants: Vec<EnumVariant>,
    },
}

impl WireType {
    /// Flatten a top-level tuple into its components.
    ///
    /// Method arguments are declared as a tuple; the descriptor lists the
    /// parameters individually.
    pub fn into_components(self) -> Vec<WireType> {
        match self {
            WireType::Tuple { elements } => elements,
            other => vec![other],
        }
    }
}

/// Named record field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Field {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub ty: WireType,
}

/// Declared enumerator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnumVariant {
    pub name: &'static str,
    pub ordinal: i32,
}

/// A type with a fixed wire representation.
pub trait Wire {
    /// Wire type descriptor.
    fn wire_type() -> WireType;
}

/// Values that can be written to the wire.
pub trait WireEncode: Wire {
    /// Append the encoded value to `w`.
    fn encode(&self, w: &mut WireWriter) -> CodecResult<()>;
}

/// Values that can be read from the wire.
pub trait WireDecode: Wire + Sized {
    /// Exact encoded size, when it does not depend on the value.
    const FIXED_SIZE: Option<usize> = None;

    /// Consume one value from `r`.
    fn decode(r: &mut WireReader<'_>) -> CodecResult<Self>;
}

/// Sum of fixed sizes, or `None` if any component is variable-sized.
pub const fn sum_fixed(sizes: &[Option<usize>]) -> Option<usize> {
    let mut total = 0;
    let mut i = 0;
    while i < sizes.len() {
        match sizes[i] {
            Some(n) => total += n,
            None => return None,
        }
        i += 1;
    }
    Some(total)
}

/// Encode a single value into a fresh buffer.
pub fn encode_to_bytes<T: WireEncode + ?Sized>(value: &T) -> CodecResult<Bytes> {
    let mut w = WireWriter::new();
    value.encode(&mut w)?;
    Ok(w.freeze())
}

/// Decode a single value from a complete buffer.
///
/// Trailing bytes are ignored; use a [`WireReader`] directly to decode
/// several values back to back.
pub fn decode_from_slice<T: WireDecode>(buf: &[u8]) -> CodecResult<T> {
    let mut r = WireReader::new(buf);
    T::decode(&mut r)
}
