use chrono::{Datelike, Days, Months, NaiveDate};
use serde::Deserialize;

use crate::error::SyncError;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// How the run's inclusive date range is selected. The relative modes clamp
/// the end date to two days before today; the metrics provider's figures for
/// the last two days are still settling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeMode {
    ThisMonth,
    LastMonth,
    Explicit,
}

impl RangeMode {
    pub fn parse(s: &str) -> Result<Self, SyncError> {
        match s {
            "this_month" => Ok(RangeMode::ThisMonth),
            "last_month" => Ok(RangeMode::LastMonth),
            "explicit" => Ok(RangeMode::Explicit),
            other => Err(SyncError::Configuration(format!(
                "unknown date mode '{}' (expected this_month, last_month or explicit)",
                other
            ))),
        }
    }
}

pub fn resolve(
    mode: RangeMode,
    start: Option<&str>,
    end: Option<&str>,
    today: NaiveDate,
) -> Result<(NaiveDate, NaiveDate), SyncError> {
    match mode {
        RangeMode::ThisMonth => {
            let first = first_of_month(today)?;
            let end = latest_reportable(today)?;
            if end < first {
                return Err(SyncError::Configuration(format!(
                    "this_month has no reportable days yet (today is {})",
                    today
                )));
            }
            Ok((first, end))
        }
        RangeMode::LastMonth => {
            let first_this = first_of_month(today)?;
            let first = first_this
                .checked_sub_months(Months::new(1))
                .ok_or_else(|| SyncError::Configuration("date underflow".to_string()))?;
            let last = first_this
                .pred_opt()
                .ok_or_else(|| SyncError::Configuration("date underflow".to_string()))?;
            let end = last.min(latest_reportable(today)?);
            if end < first {
                return Err(SyncError::Configuration(format!(
                    "last_month has no reportable days yet (today is {})",
                    today
                )));
            }
            Ok((first, end))
        }
        RangeMode::Explicit => {
            let start = parse_date("start", start)?;
            let end = parse_date("end", end)?;
            if start > end {
                return Err(SyncError::Configuration(format!(
                    "start {} is after end {}",
                    start, end
                )));
            }
            Ok((start, end))
        }
    }
}

fn first_of_month(date: NaiveDate) -> Result<NaiveDate, SyncError> {
    date.with_day(1)
        .ok_or_else(|| SyncError::Configuration(format!("invalid date {}", date)))
}

fn latest_reportable(today: NaiveDate) -> Result<NaiveDate, SyncError> {
    today
        .checked_sub_days(Days::new(2))
        .ok_or_else(|| SyncError::Configuration("date underflow".to_string()))
}

fn parse_date(field: &str, value: Option<&str>) -> Result<NaiveDate, SyncError> {
    let raw = value.ok_or_else(|| {
        SyncError::Configuration(format!("explicit date mode requires '{}'", field))
    })?;
    NaiveDate::parse_from_str(raw, DATE_FORMAT).map_err(|e| {
        SyncError::Configuration(format!("invalid {} date '{}': {}", field, raw, e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn this_month_clamps_end_to_two_days_ago() {
        let (start, end) = resolve(RangeMode::ThisMonth, None, None, d(2025, 12, 15)).unwrap();
        assert_eq!(start, d(2025, 12, 1));
        assert_eq!(end, d(2025, 12, 13));
    }

    #[test]
    fn this_month_on_the_first_has_no_reportable_days() {
        let err = resolve(RangeMode::ThisMonth, None, None, d(2025, 12, 1)).unwrap_err();
        assert!(matches!(err, SyncError::Configuration(_)));
    }

    #[test]
    fn last_month_spans_the_whole_month() {
        let (start, end) = resolve(RangeMode::LastMonth, None, None, d(2025, 12, 15)).unwrap();
        assert_eq!(start, d(2025, 11, 1));
        assert_eq!(end, d(2025, 11, 30));
    }

    #[test]
    fn last_month_end_clamped_right_after_month_boundary() {
        let (start, end) = resolve(RangeMode::LastMonth, None, None, d(2025, 12, 1)).unwrap();
        assert_eq!(start, d(2025, 11, 1));
        assert_eq!(end, d(2025, 11, 29));
    }

    #[test]
    fn explicit_range_parses_and_orders() {
        let (start, end) = resolve(
            RangeMode::Explicit,
            Some("2025-12-01"),
            Some("2025-12-31"),
            d(2026, 1, 10),
        )
        .unwrap();
        assert_eq!(start, d(2025, 12, 1));
        assert_eq!(end, d(2025, 12, 31));
    }

    #[test]
    fn explicit_range_rejects_reversed_dates() {
        let err = resolve(
            RangeMode::Explicit,
            Some("2025-12-31"),
            Some("2025-12-01"),
            d(2026, 1, 10),
        )
        .unwrap_err();
        assert!(matches!(err, SyncError::Configuration(_)));
    }

    #[test]
    fn explicit_range_requires_both_dates() {
        let err = resolve(RangeMode::Explicit, Some("2025-12-01"), None, d(2026, 1, 10))
            .unwrap_err();
        assert!(matches!(err, SyncError::Configuration(_)));
    }

    #[test]
    fn mode_parse_round_trip() {
        assert_eq!(RangeMode::parse("last_month").unwrap(), RangeMode::LastMonth);
        assert!(RangeMode::parse("yesterday").is_err());
    }
}
