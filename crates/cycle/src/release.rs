use chrono::{Datelike, Days, NaiveDate};
use payrun_types::EngineError;

/// Compute the release date for a cycle ending on `cycle_end`.
///
/// The payout calendar is fixed: cycles end on the 7th, 13th, 21st or
/// 28th. The first three release 7 days later; the 28th releases on the
/// 4th of the following month. Any other end day is rejected outright,
/// never rounded to a nearby boundary.
pub fn release_date(cycle_end: NaiveDate) -> Result<NaiveDate, EngineError> {
    match cycle_end.day() {
        7 | 13 | 21 => cycle_end
            .checked_add_days(Days::new(7))
            .ok_or_else(|| EngineError::PolicyViolation("release date out of range".to_string())),
        28 => {
            let (year, month) = if cycle_end.month() == 12 {
                (cycle_end.year() + 1, 1)
            } else {
                (cycle_end.year(), cycle_end.month() + 1)
            };
            NaiveDate::from_ymd_opt(year, month, 4).ok_or_else(|| {
                EngineError::PolicyViolation("release date out of range".to_string())
            })
        }
        other => Err(EngineError::PolicyViolation(format!(
            "cycle end day {} is not a payout boundary (expected 7, 13, 21 or 28)",
            other
        ))),
    }
}
