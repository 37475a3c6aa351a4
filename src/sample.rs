//! Reference interface shared by the demo server and client.
//!
//! Method ordinals follow the declaration order below:
//!
//! | # | Method | Params | Result |
//! |---|--------|--------|--------|
//! | 0 | `Add` | `i32, i32` | `i32` |
//! | 1 | `BufferCall` | `bytes, i32` | `bytes` |
//! | 2 | `FancyHi` | `string, i32` | void |
//! | 3 | `GetNewE` | `E` | `E` |
//! | 4 | `GetStruct` | `i32, S1, f64` | `S2` |
//! | 5 | `GetValueTupleArrayResult` | | `[(u32, i64, timestamp, f64)]` |
//! | 6 | `GetValueTupleResult` | `string` | `(i32, i32, i16, bytes)` |
//! | 7 | `Hi` | | void |
//!
//! Event 0 is `OnData(f64, string)`.

use std::sync::{Arc, LazyLock};

use chrono::{DateTime, Duration, TimeZone, Utc};
use regex::Regex;

use crate::client::ClientBuilder;
use crate::handler::HandlerResult;
use crate::server::ServerBuilder;

static TUPLE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+) (\d+) (\d+) (.*)$").unwrap());

crate::wire_enum! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum E {
        A = 0,
        B = 1,
        C = 2,
        D = 3,
    }
}

crate::wire_record! {
    #[derive(Debug, Clone, Default, PartialEq, Eq)]
    pub struct S11 {
        pub a: i32,
    }
}

crate::wire_record! {
    #[derive(Debug, Clone, Default, PartialEq, Eq)]
    pub struct S1 {
        pub a: i32,
        pub b: String,
        pub s11: S11,
    }
}

crate::wire_record! {
    #[derive(Debug, Clone, Default, PartialEq, Eq)]
    pub struct S22 {
        pub a: i32,
    }
}

crate::wire_record! {
    #[derive(Debug, Clone, Default, PartialEq, Eq)]
    pub struct S2 {
        pub c: String,
        pub d: u64,
        pub s22: S22,
    }
}

/// Row returned by `GetValueTupleArrayResult`.
pub type TupleRow = (u32, i64, DateTime<Utc>, f64);

/// Result of `GetValueTupleResult`.
pub type ParsedTuple = (i32, i32, i16, Vec<u8>);

/// Business operations behind the sample interface.
pub trait SampleApi: Send + Sync + 'static {
    fn add(&self, x: i32, y: i32) -> HandlerResult<i32>;
    fn buffer_call(&self, base_utf8: Vec<u8>, n: i32) -> HandlerResult<Vec<u8>>;
    fn fancy_hi(&self, name: String, age: i32) -> HandlerResult<()>;
    fn get_new_e(&self, input: E) -> HandlerResult<E>;
    fn get_struct(&self, a: i32, s: S1, b: f64) -> HandlerResult<S2>;
    fn get_value_tuple_array_result(&self) -> HandlerResult<Vec<TupleRow>>;
    fn get_value_tuple_result(&self, s: String) -> HandlerResult<ParsedTuple>;
    fn hi(&self) -> HandlerResult<()>;
}

/// Name of the sample event.
pub const ON_DATA: &str = "OnData";

/// Declare the sample interface on a server, backed by `service`.
pub fn server<S: SampleApi>(s: Arc<S>) -> ServerBuilder {
    ServerBuilder::new()
        .handle("Add", {
            let s = s.clone();
            move |(x, y): (i32, i32)| {
                let s = s.clone();
                async move { s.add(x, y) }
            }
        })
        .handle("BufferCall", {
            let s = s.clone();
            move |(base, n): (Vec<u8>, i32)| {
                let s = s.clone();
                async move { s.buffer_call(base, n) }
            }
        })
        .handle_void("FancyHi", {
            let s = s.clone();
            move |(name, age): (String, i32)| {
                let s = s.clone();
                async move { s.fancy_hi(name, age) }
            }
        })
        .handle("GetNewE", {
            let s = s.clone();
            move |(input,): (E,)| {
                let s = s.clone();
                async move { s.get_new_e(input) }
            }
        })
        .handle("GetStruct", {
            let s = s.clone();
            move |(a, st, b): (i32, S1, f64)| {
                let s = s.clone();
                async move { s.get_struct(a, st, b) }
            }
        })
        .handle("GetValueTupleArrayResult", {
            let s = s.clone();
            move |(): ()| {
                let s = s.clone();
                async move { s.get_value_tuple_array_result() }
            }
        })
        .handle("GetValueTupleResult", {
            let s = s.clone();
            move |(text,): (String,)| {
                let s = s.clone();
                async move { s.get_value_tuple_result(text) }
            }
        })
        .handle_void("Hi", move |(): ()| {
            let s = s.clone();
            async move { s.hi() }
        })
        .event::<(f64, String)>(ON_DATA)
}

/// Declare the sample interface on a client.
pub fn client() -> ClientBuilder {
    ClientBuilder::new()
        .method::<(i32, i32), i32>("Add")
        .method::<(Vec<u8>, i32), Vec<u8>>("BufferCall")
        .method_void::<(String, i32)>("FancyHi")
        .method::<(E,), E>("GetNewE")
        .method::<(i32, S1, f64), S2>("GetStruct")
        .method::<(), Vec<TupleRow>>("GetValueTupleArrayResult")
        .method::<(String,), ParsedTuple>("GetValueTupleResult")
        .method_void::<()>("Hi")
        .event::<(f64, String)>(ON_DATA)
}

/// The demo implementation.
#[derive(Debug, Default, Clone, Copy)]
pub struct DemoService;

impl SampleApi for DemoService {
    fn add(&self, x: i32, y: i32) -> HandlerResult<i32> {
        Ok(x.wrapping_add(y))
    }

    fn buffer_call(&self, base_utf8: Vec<u8>, n: i32) -> HandlerResult<Vec<u8>> {
        let text = String::from_utf8(base_utf8)?;
        Ok(format!("{} x{}", text, n).into_bytes())
    }

    fn fancy_hi(&self, name: String, age: i32) -> HandlerResult<()> {
        tracing::info!("Fancy hi, {} years old {}!", age, name);
        Ok(())
    }

    fn get_new_e(&self, input: E) -> HandlerResult<E> {
        Ok(match input {
            E::A => E::B,
            E::B => E::C,
            E::C => E::D,
            E::D => E::A,
        })
    }

    fn get_struct(&self, a: i32, s: S1, b: f64) -> HandlerResult<S2> {
        Ok(S2 {
            c: format!(
                "a={} s.a={} s.b={} s.S11.a={} b={}",
                a, s.a, s.b, s.s11.a, b
            ),
            d: 514546,
            s22: S22 { a: 123 },
        })
    }

    fn get_value_tuple_array_result(&self) -> HandlerResult<Vec<TupleRow>> {
        // Widest instants the tick encoding carries.
        let latest = Utc
            .with_ymd_and_hms(9999, 12, 31, 23, 59, 59)
            .single()
            .and_then(|t| t.checked_add_signed(Duration::nanoseconds(999_999_900)))
            .ok_or("latest timestamp out of range")?;
        let earliest = Utc
            .with_ymd_and_hms(1, 1, 1, 0, 0, 0)
            .single()
            .ok_or("earliest timestamp out of range")?;

        Ok(vec![
            (1, 15, Utc::now(), 35.0),
            (u32::MAX, i64::MAX, latest, f64::MIN),
            (u32::MIN, i64::MIN, earliest, f64::MAX),
        ])
    }

    fn get_value_tuple_result(&self, s: String) -> HandlerResult<ParsedTuple> {
        let caps = TUPLE_PATTERN
            .captures(&s)
            .ok_or_else(|| format!("'{}' does not match '<int> <int> <short> <text>'", s))?;
        Ok((
            caps[1].parse()?,
            caps[2].parse()?,
            caps[3].parse()?,
            caps[4].as_bytes().to_vec(),
        ))
    }

    fn hi(&self) -> HandlerResult<()> {
        tracing::info!("hi");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tables_line_up() {
        let schema = server(Arc::new(DemoService)).schema();
        let names: Vec<_> = schema.methods.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(
            names,
            [
                "Add",
                "BufferCall",
                "FancyHi",
                "GetNewE",
                "GetStruct",
                "GetValueTupleArrayResult",
                "GetValueTupleResult",
                "Hi"
            ]
        );
        assert_eq!(schema.method("GetStruct").unwrap().ordinal, 4);
        assert!(schema.method("Hi").unwrap().is_void());
        assert_eq!(schema.event(ON_DATA).unwrap().ordinal, 0);
    }

    #[test]
    fn test_get_new_e_wraps() {
        let service = DemoService;
        assert_eq!(service.get_new_e(E::A).unwrap(), E::B);
        assert_eq!(service.get_new_e(E::D).unwrap(), E::A);
    }

    #[test]
    fn test_get_struct_formats_inputs() {
        let s = S1 {
            a: 15,
            b: "b".into(),
            s11: S11 { a: 49859485 },
        };
        let s2 = DemoService.get_struct(12, s, 3.1415).unwrap();
        assert_eq!(s2.c, "a=12 s.a=15 s.b=b s.S11.a=49859485 b=3.1415");
        assert_eq!(s2.d, 514546);
        assert_eq!(s2.s22, S22 { a: 123 });
    }

    #[test]
    fn test_get_value_tuple_result() {
        let parsed = DemoService
            .get_value_tuple_result("1 2 3 hello".into())
            .unwrap();
        assert_eq!(parsed, (1, 2, 3, b"hello".to_vec()));

        assert!(DemoService.get_value_tuple_result("abc".into()).is_err());
        // 40000 does not fit the short
        assert!(DemoService
            .get_value_tuple_result("1 2 40000 x".into())
            .is_err());
    }

    #[test]
    fn test_tuple_array_rows_encode() {
        let rows = DemoService.get_value_tuple_array_result().unwrap();
        assert_eq!(rows.len(), 3);
        let bytes = crate::codec::encode_to_bytes(&rows).unwrap();
        assert_eq!(bytes.len(), 4 + 3 * (4 + 8 + 8 + 8));
    }

    #[test]
    fn test_buffer_call() {
        let out = DemoService.buffer_call(b"arf arf".to_vec(), 10).unwrap();
        assert_eq!(out, b"arf arf x10");
    }
}
