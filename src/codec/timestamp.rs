//! Timestamps as signed 64-bit tick counts.
//!
//! One tick is 100 nanoseconds; tick 0 is 0001-01-01T00:00:00Z. Conversion
//! from finer resolutions rounds toward negative infinity.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};

use super::{Wire, WireDecode, WireEncode, WireReader, WireType, WireWriter};
use crate::error::{CodecResult, ProtocolViolation};

/// Ticks between 0001-01-01 and 1970-01-01.
pub const TICKS_AT_UNIX_EPOCH: i64 = 621_355_968_000_000_000;

/// Nanoseconds in one tick.
pub const NANOS_PER_TICK: i128 = 100;

const NANOS_PER_SEC: i128 = 1_000_000_000;

/// Convert nanoseconds since the Unix epoch to ticks.
pub fn ticks_from_unix_nanos(nanos: i128) -> CodecResult<i64> {
    let ticks = nanos.div_euclid(NANOS_PER_TICK) + i128::from(TICKS_AT_UNIX_EPOCH);
    i64::try_from(ticks).map_err(|_| ProtocolViolation::TimestampOutOfRange.into())
}

/// Convert ticks to nanoseconds since the Unix epoch.
pub fn unix_nanos_from_ticks(ticks: i64) -> i128 {
    (i128::from(ticks) - i128::from(TICKS_AT_UNIX_EPOCH)) * NANOS_PER_TICK
}

impl Wire for DateTime<Utc> {
    fn wire_type() -> WireType {
        WireType::Timestamp
    }
}

impl WireEncode for DateTime<Utc> {
    fn encode(&self, w: &mut WireWriter) -> CodecResult<()> {
        let nanos = i128::from(self.timestamp()) * NANOS_PER_SEC
            + i128::from(self.timestamp_subsec_nanos());
        ticks_from_unix_nanos(nanos)?.encode(w)
    }
}

impl WireDecode for DateTime<Utc> {
    const FIXED_SIZE: Option<usize> = Some(8);

    fn decode(r: &mut WireReader<'_>) -> CodecResult<Self> {
        let nanos = unix_nanos_from_ticks(i64::decode(r)?);
        let secs = i64::try_from(nanos.div_euclid(NANOS_PER_SEC))
            .map_err(|_| ProtocolViolation::TimestampOutOfRange)?;
        let subsec = nanos.rem_euclid(NANOS_PER_SEC) as u32;
        DateTime::from_timestamp(secs, subsec)
            .ok_or_else(|| ProtocolViolation::TimestampOutOfRange.into())
    }
}

impl Wire for SystemTime {
    fn wire_type() -> WireType {
        WireType::Timestamp
    }
}

impl WireEncode for SystemTime {
    fn encode(&self, w: &mut WireWriter) -> CodecResult<()> {
        let nanos = match self.duration_since(UNIX_EPOCH) {
            Ok(after) => after.as_nanos() as i128,
            Err(before) => -(before.duration().as_nanos() as i128),
        };
        ticks_from_unix_nanos(nanos)?.encode(w)
    }
}

impl WireDecode for SystemTime {
    const FIXED_SIZE: Option<usize> = Some(8);

    fn decode(r: &mut WireReader<'_>) -> CodecResult<Self> {
        let nanos = unix_nanos_from_ticks(i64::decode(r)?);
        let magnitude = nanos.unsigned_abs();
        let secs = u64::try_from(magnitude / NANOS_PER_SEC as u128)
            .map_err(|_| ProtocolViolation::TimestampOutOfRange)?;
        let offset = Duration::new(secs, (magnitude % NANOS_PER_SEC as u128) as u32);

        let t = if nanos >= 0 {
            UNIX_EPOCH.checked_add(offset)
        } else {
            UNIX_EPOCH.checked_sub(offset)
        };
        t.ok_or_else(|| ProtocolViolation::TimestampOutOfRange.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{decode_from_slice, encode_to_bytes};
    use crate::error::CodecError;
    use chrono::TimeZone;

    fn ticks_of<T: WireEncode>(value: &T) -> i64 {
        decode_from_slice::<i64>(&encode_to_bytes(value).unwrap()).unwrap()
    }

    #[test]
    fn test_unix_epoch() {
        let epoch = Utc.timestamp_opt(0, 0).unwrap();
        assert_eq!(ticks_of(&epoch), TICKS_AT_UNIX_EPOCH);
        assert_eq!(ticks_of(&UNIX_EPOCH), TICKS_AT_UNIX_EPOCH);
    }

    #[test]
    fn test_year_one_is_tick_zero() {
        let start = Utc.with_ymd_and_hms(1, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(ticks_of(&start), 0);
    }

    #[test]
    fn test_rounds_toward_negative_infinity() {
        assert_eq!(ticks_from_unix_nanos(99).unwrap(), TICKS_AT_UNIX_EPOCH);
        assert_eq!(ticks_from_unix_nanos(100).unwrap(), TICKS_AT_UNIX_EPOCH + 1);
        assert_eq!(ticks_from_unix_nanos(-1).unwrap(), TICKS_AT_UNIX_EPOCH - 1);
        assert_eq!(ticks_from_unix_nanos(-100).unwrap(), TICKS_AT_UNIX_EPOCH - 1);
        assert_eq!(ticks_from_unix_nanos(-101).unwrap(), TICKS_AT_UNIX_EPOCH - 2);

        let before_epoch = UNIX_EPOCH - Duration::from_nanos(50);
        assert_eq!(ticks_of(&before_epoch), TICKS_AT_UNIX_EPOCH - 1);
    }

    #[test]
    fn test_round_trip_within_one_tick() {
        let t = Utc.with_ymd_and_hms(2024, 2, 29, 12, 30, 45).unwrap()
            + chrono::Duration::nanoseconds(123_456_789);
        let back: DateTime<Utc> = decode_from_slice(&encode_to_bytes(&t).unwrap()).unwrap();
        let drift = (t - back).num_nanoseconds().unwrap();
        assert!((0..100).contains(&drift), "drift {drift}ns");

        let now = SystemTime::now();
        let back: SystemTime = decode_from_slice(&encode_to_bytes(&now).unwrap()).unwrap();
        let drift = now.duration_since(back).unwrap();
        assert!(drift < Duration::from_nanos(100));
    }

    #[test]
    fn test_ticks_around_epoch_decode_and_re_encode() {
        for (delta, nanos) in [(-1i64, -100i64), (0, 0), (1, 100)] {
            let ticks = TICKS_AT_UNIX_EPOCH + delta;
            let bytes = encode_to_bytes(&ticks).unwrap();

            let dt: DateTime<Utc> = decode_from_slice(&bytes).unwrap();
            assert_eq!(dt, Utc.timestamp_nanos(nanos));
            assert_eq!(ticks_of(&dt), ticks);

            let st: SystemTime = decode_from_slice(&bytes).unwrap();
            let expected = if nanos < 0 {
                UNIX_EPOCH - Duration::from_nanos(nanos.unsigned_abs())
            } else {
                UNIX_EPOCH + Duration::from_nanos(nanos as u64)
            };
            assert_eq!(st, expected);
            assert_eq!(ticks_of(&st), ticks);
        }
    }

    #[test]
    fn test_tick_before_epoch_is_last_instant_of_1969() {
        let bytes = encode_to_bytes(&(TICKS_AT_UNIX_EPOCH - 1)).unwrap();
        let dt: DateTime<Utc> = decode_from_slice(&bytes).unwrap();
        assert_eq!(dt.timestamp(), -1);
        assert_eq!(dt.timestamp_subsec_nanos(), 999_999_900);
    }

    #[test]
    fn test_out_of_range() {
        let err = ticks_from_unix_nanos(i128::from(i64::MAX) * 100).unwrap_err();
        assert_eq!(
            err,
            CodecError::Violation(ProtocolViolation::TimestampOutOfRange)
        );
    }

    #[test]
    fn test_extreme_ticks_survive() {
        for ticks in [0, i64::MAX] {
            let bytes = encode_to_bytes(&ticks).unwrap();
            let t: DateTime<Utc> = decode_from_slice(&bytes).unwrap();
            assert_eq!(ticks_of(&t), ticks);
        }
    }
}
