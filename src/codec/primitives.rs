//! Wire impls for scalars, strings, sequences and tuples.

use super::{sum_fixed, Wire, WireDecode, WireEncode, WireReader, WireType, WireWriter};
use crate::error::{CodecResult, ProtocolViolation};

/// Longest string the single-byte length prefix can describe.
pub const MAX_STRING_LEN: usize = u8::MAX as usize;

macro_rules! impl_native {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl Wire for $ty {
                fn wire_type() -> WireType {
                    WireType::$variant
                }
            }

            impl WireEncode for $ty {
                #[inline]
                fn encode(&self, w: &mut WireWriter) -> CodecResult<()> {
                    w.put_slice(&self.to_ne_bytes());
                    Ok(())
                }
            }

            impl WireDecode for $ty {
                const FIXED_SIZE: Option<usize> = Some(std::mem::size_of::<$ty>());

                #[inline]
                fn decode(r: &mut WireReader<'_>) -> CodecResult<Self> {
                    Ok(<$ty>::from_ne_bytes(r.read_array()?))
                }
            }
        )*
    };
}

impl_native! {
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    f32 => F32,
    f64 => F64,
}

impl Wire for bool {
    fn wire_type() -> WireType {
        WireType::Bool
    }
}

impl WireEncode for bool {
    fn encode(&self, w: &mut WireWriter) -> CodecResult<()> {
        w.put_u8(u8::from(*self));
        Ok(())
    }
}

impl WireDecode for bool {
    const FIXED_SIZE: Option<usize> = Some(1);

    fn decode(r: &mut WireReader<'_>) -> CodecResult<Self> {
        match r.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(ProtocolViolation::InvalidBool(other).into()),
        }
    }
}

impl Wire for str {
    fn wire_type() -> WireType {
        WireType::String
    }
}

impl WireEncode for str {
    fn encode(&self, w: &mut WireWriter) -> CodecResult<()> {
        let len = self.len();
        if len > MAX_STRING_LEN {
            return Err(ProtocolViolation::StringTooLong(len).into());
        }
        w.put_u8(len as u8);
        w.put_slice(self.as_bytes());
        Ok(())
    }
}

impl Wire for String {
    fn wire_type() -> WireType {
        WireType::String
    }
}

impl WireEncode for String {
    fn encode(&self, w: &mut WireWriter) -> CodecResult<()> {
        self.as_str().encode(w)
    }
}

impl WireDecode for String {
    fn decode(r: &mut WireReader<'_>) -> CodecResult<Self> {
        // Length and body are taken from a copy so that an incomplete body
        // leaves the caller's cursor untouched.
        let mut probe = r.clone();
        let len = probe.read_u8()? as usize;
        let body = probe.read_bytes(len)?;
        let s = std::str::from_utf8(body).map_err(|_| ProtocolViolation::InvalidUtf8)?;
        *r = probe;
        Ok(s.to_owned())
    }
}

impl<T: Wire> Wire for [T] {
    fn wire_type() -> WireType {
        WireType::Sequence {
            element: Box::new(T::wire_type()),
        }
    }
}

impl<T: WireEncode> WireEncode for [T] {
    fn encode(&self, w: &mut WireWriter) -> CodecResult<()> {
        let count =
            u32::try_from(self.len()).map_err(|_| ProtocolViolation::SequenceTooLong(self.len()))?;
        count.encode(w)?;
        for item in self {
            item.encode(w)?;
        }
        Ok(())
    }
}

impl<T: Wire> Wire for Vec<T> {
    fn wire_type() -> WireType {
        <[T]>::wire_type()
    }
}

impl<T: WireEncode> WireEncode for Vec<T> {
    fn encode(&self, w: &mut WireWriter) -> CodecResult<()> {
        self.as_slice().encode(w)
    }
}

impl<T: WireDecode> WireDecode for Vec<T> {
    fn decode(r: &mut WireReader<'_>) -> CodecResult<Self> {
        let count = u32::decode(r)? as usize;

        // Fixed-size elements let us ask for the whole body up front
        // instead of failing element by element.
        if let Some(size) = T::FIXED_SIZE {
            let body = count
                .checked_mul(size)
                .ok_or(ProtocolViolation::SequenceTooLong(count))?;
            r.require(body)?;
        }

        // Never trust the count for the allocation size.
        let min_elem = T::FIXED_SIZE.unwrap_or(1).max(1);
        let mut out = Vec::with_capacity(count.min(r.remaining() / min_elem));
        for _ in 0..count {
            out.push(T::decode(r)?);
        }
        Ok(out)
    }
}

impl<T: Wire + ?Sized> Wire for &T {
    fn wire_type() -> WireType {
        T::wire_type()
    }
}

impl<T: WireEncode + ?Sized> WireEncode for &T {
    #[inline]
    fn encode(&self, w: &mut WireWriter) -> CodecResult<()> {
        (**self).encode(w)
    }
}

macro_rules! impl_tuple {
    ($($name:ident $var:ident),*) => {
        impl<$($name: Wire),*> Wire for ($($name,)*) {
            fn wire_type() -> WireType {
                WireType::Tuple {
                    elements: vec![$($name::wire_type()),*],
                }
            }
        }

        impl<$($name: WireEncode),*> WireEncode for ($($name,)*) {
            #[allow(unused_variables)]
            fn encode(&self, w: &mut WireWriter) -> CodecResult<()> {
                let ($($var,)*) = self;
                $($var.encode(w)?;)*
                Ok(())
            }
        }

        impl<$($name: WireDecode),*> WireDecode for ($($name,)*) {
            const FIXED_SIZE: Option<usize> = sum_fixed(&[$($name::FIXED_SIZE),*]);

            #[allow(unused_variables)]
            fn decode(r: &mut WireReader<'_>) -> CodecResult<Self> {
                Ok(($($name::decode(r)?,)*))
            }
        }
    };
}

impl_tuple!();
impl_tuple!(A a);
impl_tuple!(A a, B b);
impl_tuple!(A a, B b, C c);
impl_tuple!(A a, B b, C c, D d);
impl_tuple!(A a, B b, C c, D d, E e);
impl_tuple!(A a, B b, C c, D d, E e, F f);
impl_tuple!(A a, B b, C c, D d, E e, F f, G g);
impl_tuple!(A a, B b, C c, D d, E e, F f, G g, H h);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{decode_from_slice, encode_to_bytes};
    use crate::error::CodecError;

    #[test]
    fn test_integers_are_native_endian() {
        let bytes = encode_to_bytes(&0x0102_0304i32).unwrap();
        assert_eq!(&bytes[..], &0x0102_0304i32.to_ne_bytes());

        let bytes = encode_to_bytes(&u64::MAX).unwrap();
        assert_eq!(bytes.len(), 8);
        assert_eq!(decode_from_slice::<u64>(&bytes).unwrap(), u64::MAX);
    }

    #[test]
    fn test_string_layout() {
        let bytes = encode_to_bytes("hello").unwrap();
        assert_eq!(&bytes[..], b"\x05hello");

        let bytes = encode_to_bytes("").unwrap();
        assert_eq!(&bytes[..], &[0]);
    }

    #[test]
    fn test_string_length_limit() {
        let ok = "x".repeat(255);
        let bytes = encode_to_bytes(&ok).unwrap();
        assert_eq!(bytes[0], 255);
        assert_eq!(bytes.len(), 256);

        let too_long = "x".repeat(256);
        assert_eq!(
            encode_to_bytes(&too_long).unwrap_err(),
            CodecError::Violation(ProtocolViolation::StringTooLong(256))
        );
    }

    #[test]
    fn test_string_rejects_invalid_utf8() {
        let err = decode_from_slice::<String>(&[2, 0xC3, 0x28]).unwrap_err();
        assert_eq!(err, CodecError::Violation(ProtocolViolation::InvalidUtf8));
    }

    #[test]
    fn test_incomplete_string_leaves_cursor() {
        let data = [5u8, b'a', b'b'];
        let mut r = WireReader::new(&data);
        assert_eq!(
            String::decode(&mut r).unwrap_err(),
            CodecError::Incomplete { needed: 3 }
        );
        assert_eq!(r.position(), 0);
    }

    #[test]
    fn test_bool() {
        assert_eq!(&encode_to_bytes(&true).unwrap()[..], &[1]);
        assert!(!decode_from_slice::<bool>(&[0]).unwrap());
        assert_eq!(
            decode_from_slice::<bool>(&[2]).unwrap_err(),
            CodecError::Violation(ProtocolViolation::InvalidBool(2))
        );
    }

    #[test]
    fn test_sequence_layout() {
        let bytes = encode_to_bytes(&vec![1u8, 2, 3]).unwrap();
        let mut expected = 3u32.to_ne_bytes().to_vec();
        expected.extend_from_slice(&[1, 2, 3]);
        assert_eq!(&bytes[..], &expected[..]);

        let empty: Vec<i32> = Vec::new();
        let bytes = encode_to_bytes(&empty).unwrap();
        assert_eq!(&bytes[..], &0u32.to_ne_bytes());
        assert!(decode_from_slice::<Vec<i32>>(&bytes).unwrap().is_empty());
    }

    #[test]
    fn test_fixed_sequence_reports_whole_body() {
        // count says 4 x i32, only one element present
        let mut data = 4u32.to_ne_bytes().to_vec();
        data.extend_from_slice(&7i32.to_ne_bytes());
        assert_eq!(
            decode_from_slice::<Vec<i32>>(&data).unwrap_err(),
            CodecError::Incomplete { needed: 12 }
        );
    }

    #[test]
    fn test_huge_count_does_not_preallocate() {
        let data = u32::MAX.to_ne_bytes();
        let err = decode_from_slice::<Vec<String>>(&data).unwrap_err();
        assert!(matches!(err, CodecError::Incomplete { .. }));
    }

    #[test]
    fn test_tuple_has_no_framing() {
        let bytes = encode_to_bytes(&(1i16, "ab", 2u8)).unwrap();
        let mut expected = 1i16.to_ne_bytes().to_vec();
        expected.extend_from_slice(b"\x02ab");
        expected.push(2);
        assert_eq!(&bytes[..], &expected[..]);

        let back: (i16, String, u8) = decode_from_slice(&bytes).unwrap();
        assert_eq!(back, (1, "ab".to_string(), 2));
    }

    #[test]
    fn test_unit_is_empty() {
        assert!(encode_to_bytes(&()).unwrap().is_empty());
        assert_eq!(<() as WireDecode>::FIXED_SIZE, Some(0));
        decode_from_slice::<()>(&[]).unwrap();
    }

    #[test]
    fn test_floats() {
        let bytes = encode_to_bytes(&(3.14f64, 1.5f32)).unwrap();
        assert_eq!(bytes.len(), 12);
        let (d, f): (f64, f32) = decode_from_slice(&bytes).unwrap();
        assert_eq!(d, 3.14);
        assert_eq!(f, 1.5);
    }
}
