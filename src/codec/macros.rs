//! Declarative wire impls for records and enumerations.

/// Declare a record whose wire form is its fields in declaration order.
///
/// ```
/// tinyrpc::wire_record! {
///     #[derive(Debug, Clone, PartialEq)]
///     pub struct Point {
///         pub x: i32,
///         pub y: i32,
///     }
/// }
///
/// let bytes = tinyrpc::codec::encode_to_bytes(&Point { x: 1, y: 2 }).unwrap();
/// assert_eq!(bytes.len(), 8);
/// ```
#[macro_export]
macro_rules! wire_record {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$fmeta:meta])*
                $fvis:vis $field:ident : $ty:ty
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis struct $name {
            $(
                $(#[$fmeta])*
                $fvis $field: $ty,
            )*
        }

        impl $crate::codec::Wire for $name {
            fn wire_type() -> $crate::codec::WireType {
                $crate::codec::WireType::Record {
                    name: stringify!($name),
                    fields: vec![
                        $(
                            $crate::codec::Field {
                                name: stringify!($field),
                                ty: <$ty as $crate::codec::Wire>::wire_type(),
                            },
                        )*
                    ],
                }
            }
        }

        impl $crate::codec::WireEncode for $name {
            fn encode(
                &self,
                w: &mut $crate::codec::WireWriter,
            ) -> $crate::codec::CodecResult<()> {
                $( $crate::codec::WireEncode::encode(&self.$field, w)?; )*
                Ok(())
            }
        }

        impl $crate::codec::WireDecode for $name {
            const FIXED_SIZE: Option<usize> = $crate::codec::sum_fixed(&[
                $( <$ty as $crate::codec::WireDecode>::FIXED_SIZE, )*
            ]);

            fn decode(
                r: &mut $crate::codec::WireReader<'_>,
            ) -> $crate::codec::CodecResult<Self> {
                Ok(Self {
                    $( $field: <$ty as $crate::codec::WireDecode>::decode(r)?, )*
                })
            }
        }
    };
}

/// Declare an enumeration carried on the wire as its `i32` ordinal.
///
/// Every enumerator needs an explicit ordinal. Decoding an ordinal that no
/// enumerator declares is a protocol violation.
///
/// ```
/// tinyrpc::wire_enum! {
///     #[derive(Debug, Clone, Copy, PartialEq)]
///     pub enum Color {
///         Red = 0,
///         Green = 1,
///     }
/// }
///
/// assert_eq!(Color::Green.ordinal(), 1);
/// assert_eq!(Color::from_ordinal(0), Some(Color::Red));
/// assert_eq!(Color::from_ordinal(7), None);
/// ```
#[macro_export]
macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $(
                $(#[$vmeta:meta])*
                $variant:ident = $value:literal
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(i32)]
        $vis enum $name {
            $(
                $(#[$vmeta])*
                $variant = $value,
            )*
        }

        impl $name {
            /// Every declared enumerator, in declaration order.
            pub const VARIANTS: &'static [$name] = &[$($name::$variant),*];

            /// Wire ordinal of this enumerator.
            pub fn ordinal(&self) -> i32 {
                match self {
                    $( $name::$variant => $value, )*
                }
            }

            /// Enumerator declared with `ordinal`, if any.
            pub fn from_ordinal(ordinal: i32) -> Option<Self> {
                match ordinal {
                    $( x if x == $value => Some($name::$variant), )*
                    _ => None,
                }
            }
        }

        impl $crate::codec::Wire for $name {
            fn wire_type() -> $crate::codec::WireType {
                $crate::codec::WireType::Enum {
                    name: stringify!($name),
                    variants: vec![
                        $(
                            $crate::codec::EnumVariant {
                                name: stringify!($variant),
                                ordinal: $value,
                            },
                        )*
                    ],
                }
            }
        }

        impl $crate::codec::WireEncode for $name {
            fn encode(
                &self,
                w: &mut $crate::codec::WireWriter,
            ) -> $crate::codec::CodecResult<()> {
                $crate::codec::WireEncode::encode(&self.ordinal(), w)
            }
        }

        impl $crate::codec::WireDecode for $name {
            const FIXED_SIZE: Option<usize> = Some(4);

            fn decode(
                r: &mut $crate::codec::WireReader<'_>,
            ) -> $crate::codec::CodecResult<Self> {
                let ordinal = <i32 as $crate::codec::WireDecode>::decode(r)?;
                $name::from_ordinal(ordinal).ok_or_else(|| {
                    $crate::error::ProtocolViolation::InvalidEnumOrdinal {
                        type_name: stringify!($name),
                        ordinal,
                    }
                    .into()
                })
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use crate::codec::{decode_from_slice, encode_to_bytes, Wire, WireDecode, WireType};
    use crate::error::{CodecError, ProtocolViolation};

    crate::wire_enum! {
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        enum Level {
            Low = 0,
            High = 5,
            Negative = -2,
        }
    }

    crate::wire_record! {
        #[derive(Debug, Clone, PartialEq)]
        struct Inner {
            a: i32,
        }
    }

    crate::wire_record! {
        #[derive(Debug, Clone, PartialEq)]
        struct Outer {
            label: String,
            level: Level,
            inner: Inner,
        }
    }

    #[test]
    fn test_enum_ordinals() {
        assert_eq!(Level::VARIANTS.len(), 3);
        assert_eq!(Level::Negative.ordinal(), -2);
        assert_eq!(Level::from_ordinal(5), Some(Level::High));

        let bytes = encode_to_bytes(&Level::High).unwrap();
        assert_eq!(&bytes[..], &5i32.to_ne_bytes());
    }

    #[test]
    fn test_enum_rejects_undeclared_ordinal() {
        let err = decode_from_slice::<Level>(&3i32.to_ne_bytes()).unwrap_err();
        assert_eq!(
            err,
            CodecError::Violation(ProtocolViolation::InvalidEnumOrdinal {
                type_name: "Level",
                ordinal: 3,
            })
        );
    }

    #[test]
    fn test_record_layout_is_declaration_order() {
        let value = Outer {
            label: "x".into(),
            level: Level::Low,
            inner: Inner { a: 9 },
        };
        let bytes = encode_to_bytes(&value).unwrap();

        let mut expected = vec![1, b'x'];
        expected.extend_from_slice(&0i32.to_ne_bytes());
        expected.extend_from_slice(&9i32.to_ne_bytes());
        assert_eq!(&bytes[..], &expected[..]);

        assert_eq!(decode_from_slice::<Outer>(&bytes).unwrap(), value);
    }

    #[test]
    fn test_record_metadata() {
        assert_eq!(<Inner as WireDecode>::FIXED_SIZE, Some(4));
        assert_eq!(<Outer as WireDecode>::FIXED_SIZE, None);

        match Outer::wire_type() {
            WireType::Record { name, fields } => {
                assert_eq!(name, "Outer");
                let names: Vec<_> = fields.iter().map(|f| f.name).collect();
                assert_eq!(names, ["label", "level", "inner"]);
            }
            other => panic!("unexpected wire type {other:?}"),
        }
    }
}
