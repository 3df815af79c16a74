use std::sync::LazyLock;

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;

use super::error::DropReason;

/// Departure/arrival time: `10:30AM`, `11:50PM+1`, `6:05AM-1`.
pub static TIME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{1,2}):(\d{2}) ?(AM|PM)(?:([+-])(\d))?$").unwrap());

static HR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)\s*hr").unwrap());
static MIN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)\s*min").unwrap());

/// Total minutes in "X hr Y min", "X hr" or "Y min".
///
/// `None` when the string has neither unit, or the numbers don't fit.
pub fn parse_duration(s: &str) -> Option<u32> {
    if !s.contains("hr") && !s.contains("min") {
        return None;
    }
    let hours = match HR_RE.captures(s) {
        Some(c) => c[1].parse::<u32>().ok()?,
        None if s.contains("hr") => return None,
        None => 0,
    };
    let minutes = match MIN_RE.captures(s) {
        Some(c) => c[1].parse::<u32>().ok()?,
        None if s.contains("min") => return None,
        None => 0,
    };
    hours.checked_mul(60)?.checked_add(minutes)
}

/// Inverse of [`parse_duration`], choosing the shortest unit spelling.
pub fn format_duration(minutes: u32) -> String {
    let (h, m) = (minutes / 60, minutes % 60);
    match (h, m) {
        (0, m) => format!("{} min", m),
        (h, 0) => format!("{} hr", h),
        (h, m) => format!("{} hr {} min", h, m),
    }
}

/// Combine a clock time shown on the page with the searched date.
///
/// A trailing `+N`/`-N` moves the result N days, which is how the page marks
/// arrivals after midnight.
pub fn parse_time_with_offset(date: NaiveDate, time: &str) -> Result<NaiveDateTime, DropReason> {
    let bad = || DropReason::UnparseableTime(time.to_string());
    let caps = TIME_RE.captures(time.trim()).ok_or_else(bad)?;

    let hour: u32 = caps[1].parse().map_err(|_| bad())?;
    let minute: u32 = caps[2].parse().map_err(|_| bad())?;
    if !(1..=12).contains(&hour) {
        return Err(bad());
    }
    let hour24 = match (&caps[3], hour) {
        ("AM", 12) => 0,
        ("AM", h) => h,
        ("PM", 12) => 12,
        (_, h) => h + 12,
    };
    let clock = NaiveTime::from_hms_opt(hour24, minute, 0).ok_or_else(bad)?;

    let offset_days = match (caps.get(4), caps.get(5)) {
        (Some(sign), Some(n)) => {
            let n: i64 = n.as_str().parse().map_err(|_| bad())?;
            if sign.as_str() == "-" {
                -n
            } else {
                n
            }
        }
        _ => 0,
    };

    date.and_time(clock)
        .checked_add_signed(Duration::days(offset_days))
        .ok_or_else(bad)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 25).unwrap()
    }

    fn at(d: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, d)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn duration_shapes() {
        assert_eq!(parse_duration("3 hr 20 min"), Some(200));
        assert_eq!(parse_duration("5 hr"), Some(300));
        assert_eq!(parse_duration("45 min"), Some(45));
        assert_eq!(parse_duration("0 min"), Some(0));
    }

    #[test]
    fn duration_absent() {
        assert_eq!(parse_duration("Nonstop"), None);
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("hr"), None);
    }

    #[test]
    fn duration_ignores_trailing_location() {
        assert_eq!(parse_duration("1 hr 5 min FRA"), Some(65));
    }

    #[test]
    fn format_shapes() {
        assert_eq!(format_duration(0), "0 min");
        assert_eq!(format_duration(45), "45 min");
        assert_eq!(format_duration(120), "2 hr");
        assert_eq!(format_duration(135), "2 hr 15 min");
    }

    #[test]
    fn time_same_day() {
        assert_eq!(parse_time_with_offset(date(), "10:30AM").unwrap(), at(25, 10, 30));
        assert_eq!(parse_time_with_offset(date(), "1:45PM").unwrap(), at(25, 13, 45));
    }

    #[test]
    fn time_midnight_and_noon() {
        assert_eq!(parse_time_with_offset(date(), "12:05AM").unwrap(), at(25, 0, 5));
        assert_eq!(parse_time_with_offset(date(), "12:05PM").unwrap(), at(25, 12, 5));
    }

    #[test]
    fn time_next_day() {
        assert_eq!(parse_time_with_offset(date(), "11:50PM+1").unwrap(), at(26, 23, 50));
    }

    #[test]
    fn time_previous_day() {
        assert_eq!(parse_time_with_offset(date(), "6:05AM-1").unwrap(), at(24, 6, 5));
    }

    #[test]
    fn time_out_of_range() {
        assert!(matches!(
            parse_time_with_offset(date(), "13:10PM"),
            Err(DropReason::UnparseableTime(_))
        ));
        assert!(parse_time_with_offset(date(), "10:75AM").is_err());
        assert!(parse_time_with_offset(date(), "10:30").is_err());
    }

    proptest! {
        #[test]
        fn hr_min_sums(h in 0u32..=24, m in 0u32..=59) {
            prop_assert_eq!(parse_duration(&format!("{} hr {} min", h, m)), Some(60 * h + m));
            prop_assert_eq!(parse_duration(&format!("{} hr", h)), Some(60 * h));
            prop_assert_eq!(parse_duration(&format!("{} min", m)), Some(m));
        }

        #[test]
        fn format_then_parse(m in 0u32..1_000_000) {
            prop_assert_eq!(parse_duration(&format_duration(m)), Some(m));
        }
    }
}
