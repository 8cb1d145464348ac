//! Deadline arithmetic
//!
//! SLA windows are counted in days, either as calendar days or as business
//! days (Monday to Friday). The time of day of the start is kept.

use chrono::{DateTime, Datelike, Duration, Utc, Weekday};

use civic_core::{EngineError, EngineResult, MAX_DEADLINE_DAYS};

/// `start` plus `days` days. Windows longer than `MAX_DEADLINE_DAYS`, or
/// ones that leave the representable date range, are invalid definitions.
pub fn add_days(start: DateTime<Utc>, days: u32, business_days: bool) -> EngineResult<DateTime<Utc>> {
    if days > MAX_DEADLINE_DAYS {
        return Err(EngineError::InvalidDefinition(format!(
            "deadline of {} days exceeds {} days",
            days, MAX_DEADLINE_DAYS
        )));
    }
    if !business_days {
        return shift(start, i64::from(days));
    }
    let mut due = start;
    let mut remaining = days;
    while remaining > 0 {
        due = shift(due, 1)?;
        if is_business_day(due) {
            remaining -= 1;
        }
    }
    Ok(due)
}

fn shift(at: DateTime<Utc>, days: i64) -> EngineResult<DateTime<Utc>> {
    at.checked_add_signed(Duration::days(days)).ok_or_else(|| {
        EngineError::InvalidDefinition(format!("{} plus {} days is out of range", at, days))
    })
}

pub fn is_business_day(at: DateTime<Utc>) -> bool {
    !matches!(at.weekday(), Weekday::Sat | Weekday::Sun)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_calendar_days() {
        let friday = Utc.with_ymd_and_hms(2025, 3, 14, 10, 0, 0).unwrap();
        assert_eq!(add_days(friday, 3, false).unwrap(), Utc.with_ymd_and_hms(2025, 3, 17, 10, 0, 0).unwrap());
    }

    #[test]
    fn test_business_days_skip_weekend() {
        let friday = Utc.with_ymd_and_hms(2025, 3, 14, 10, 0, 0).unwrap();
        assert_eq!(add_days(friday, 1, true).unwrap(), Utc.with_ymd_and_hms(2025, 3, 17, 10, 0, 0).unwrap());
        assert_eq!(add_days(friday, 6, true).unwrap(), Utc.with_ymd_and_hms(2025, 3, 24, 10, 0, 0).unwrap());
    }

    #[test]
    fn test_business_days_from_saturday() {
        let saturday = Utc.with_ymd_and_hms(2025, 3, 15, 8, 0, 0).unwrap();
        assert_eq!(add_days(saturday, 1, true).unwrap(), Utc.with_ymd_and_hms(2025, 3, 17, 8, 0, 0).unwrap());
    }

    #[test]
    fn test_zero_days() {
        let start = Utc.with_ymd_and_hms(2025, 3, 15, 8, 0, 0).unwrap();
        assert_eq!(add_days(start, 0, true).unwrap(), start);
    }

    #[test]
    fn test_oversized_window_rejected() {
        let start = Utc.with_ymd_and_hms(2025, 3, 15, 8, 0, 0).unwrap();
        for business_days in [false, true] {
            let err = add_days(start, u32::MAX, business_days).unwrap_err();
            assert_eq!(err.code(), "SCHEMA/INVALID_DEFINITION");
        }
        assert!(add_days(start, MAX_DEADLINE_DAYS, true).is_ok());
    }

    #[test]
    fn test_out_of_range_date_rejected() {
        let err = add_days(DateTime::<Utc>::MAX_UTC, 1, false).unwrap_err();
        assert!(matches!(err, EngineError::InvalidDefinition(_)));
    }
}
