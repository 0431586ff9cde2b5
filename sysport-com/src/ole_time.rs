//! OLE Automation date and FILETIME tick conversions.
//!
//! Both formats are fixed by the OS vendor: an OLE date is an `f64` whose
//! integer part counts days from 1899-12-30 and whose fraction is the
//! time of day; a FILETIME counts 100 ns intervals since 1601-01-01.
//! Works on raw values so the math is testable on any host.

/// Days from the OLE epoch (1899-12-30) to the Unix epoch (1970-01-01).
const OLE_EPOCH_DAYS: i64 = 25_569;

/// Seconds from the Windows epoch (1601-01-01) to the Unix epoch.
const WINDOWS_TO_UNIX_SECS: u64 = 11_644_473_600;

/// Converts an OLE Automation date to a UTC datetime.
///
/// Returns `None` for values outside chrono's representable range.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
pub fn ole_date_to_utc(ole_date: f64) -> Option<chrono::DateTime<chrono::Utc>> {
    let total_secs = (ole_date - OLE_EPOCH_DAYS as f64) * 86_400.0;
    chrono::DateTime::from_timestamp(total_secs as i64, 0)
}

/// Converts a UTC datetime to an OLE Automation date.
#[allow(clippy::cast_precision_loss)]
pub fn utc_to_ole_date(utc: &chrono::DateTime<chrono::Utc>) -> f64 {
    utc.timestamp() as f64 / 86_400.0 + OLE_EPOCH_DAYS as f64
}

/// Formats an OLE date as local time, falling back to the raw number when
/// out of range.
pub fn ole_date_to_string(ole_date: f64) -> String {
    ole_date_to_utc(ole_date).map_or_else(
        || format!("{ole_date:.6}"),
        |utc| {
            utc.with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        },
    )
}

/// Converts raw FILETIME halves to a UTC datetime.
///
/// Returns `None` for the zero FILETIME or values before the Unix epoch.
#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
pub fn filetime_to_utc(high: u32, low: u32) -> Option<chrono::DateTime<chrono::Utc>> {
    if high == 0 && low == 0 {
        return None;
    }
    let intervals = (u64::from(high) << 32) | u64::from(low);
    let unix_secs = (intervals / 10_000_000).checked_sub(WINDOWS_TO_UNIX_SECS)?;
    let nanos = ((intervals % 10_000_000) * 100) as u32;
    chrono::DateTime::from_timestamp(unix_secs as i64, nanos)
}

/// Formats raw FILETIME halves as local time; the zero FILETIME reads "N/A".
pub fn filetime_to_string(high: u32, low: u32) -> String {
    filetime_to_utc(high, low).map_or_else(
        || "N/A".to_string(),
        |utc| {
            utc.with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ole_epoch_is_1899_12_30() {
        let utc = ole_date_to_utc(0.0).unwrap();
        assert_eq!(utc.format("%Y-%m-%d").to_string(), "1899-12-30");
    }

    #[test]
    fn unix_epoch_round_trip() {
        let utc = chrono::DateTime::from_timestamp(0, 0).unwrap();
        let ole = utc_to_ole_date(&utc);
        assert!((ole - 25_569.0).abs() < 1e-9);
        assert_eq!(ole_date_to_utc(ole).unwrap(), utc);
    }

    #[test]
    fn ole_fraction_is_time_of_day() {
        // 25569.5 = 1970-01-01 12:00:00 UTC
        let utc = ole_date_to_utc(25_569.5).unwrap();
        assert_eq!(utc.format("%H:%M:%S").to_string(), "12:00:00");
    }

    #[test]
    fn zero_filetime_is_not_a_time() {
        assert!(filetime_to_utc(0, 0).is_none());
        assert_eq!(filetime_to_string(0, 0), "N/A");
    }

    #[test]
    fn filetime_unix_epoch() {
        // 11_644_473_600 s in 100 ns ticks
        let ticks = 11_644_473_600u64 * 10_000_000;
        let utc = filetime_to_utc((ticks >> 32) as u32, ticks as u32).unwrap();
        assert_eq!(utc.timestamp(), 0);
    }

    #[test]
    fn filetime_before_unix_epoch() {
        assert!(filetime_to_utc(0, 1).is_none());
    }
}
