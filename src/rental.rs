//! Rental lifecycle engine.
//!
//! Pure classification of rental records against a clock instant, plus
//! the period arithmetic used to compute rental end dates. Notification
//! emission lives in [`crate::store`]; nothing here mutates state.

use crate::error::{AppError, Result};
use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};

/// Default warning window before expiry, in days.
pub const DEFAULT_WARNING_WINDOW_DAYS: i64 = 3;

/// Fixed set of rental durations offered by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RentalPeriod {
    /// Two weeks (exactly 14 days).
    #[serde(rename = "2weeks")]
    TwoWeeks,
    /// One calendar month.
    #[serde(rename = "1month")]
    OneMonth,
    /// Three calendar months.
    #[serde(rename = "3months")]
    ThreeMonths,
}

impl RentalPeriod {
    /// Parse a period code.
    pub fn parse(code: &str) -> Result<Self> {
        match code {
            "2weeks" => Ok(RentalPeriod::TwoWeeks),
            "1month" => Ok(RentalPeriod::OneMonth),
            "3months" => Ok(RentalPeriod::ThreeMonths),
            other => Err(AppError::InvalidPeriod(other.to_string())),
        }
    }

    /// The wire code for this period.
    pub fn code(&self) -> &'static str {
        match self {
            RentalPeriod::TwoWeeks => "2weeks",
            RentalPeriod::OneMonth => "1month",
            RentalPeriod::ThreeMonths => "3months",
        }
    }

    /// Compute the rental end date for a rental starting at `start`.
    ///
    /// Two weeks is exactly 14 days; month periods use calendar-month
    /// addition (2024-01-31 + 1 month = 2024-02-29).
    pub fn end_date_from(&self, start: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            RentalPeriod::TwoWeeks => start + Duration::days(14),
            RentalPeriod::OneMonth => start
                .checked_add_months(Months::new(1))
                .unwrap_or(start),
            RentalPeriod::ThreeMonths => start
                .checked_add_months(Months::new(3))
                .unwrap_or(start),
        }
    }
}

/// Lifecycle state of a rental record at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RentalStatus {
    /// End date in the future, outside the warning window.
    Active,
    /// End date in the future but within the warning window.
    ExpiringSoon,
    /// End date at or before now.
    Expired,
}

/// Notifiable rental conditions, used as the dedup key for notices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    /// Rental is about to expire.
    Expiring,
    /// Rental has expired.
    Expired,
}

impl NoticeKind {
    /// Stable key stored with the notification.
    pub fn code(&self) -> &'static str {
        match self {
            NoticeKind::Expiring => "expiring",
            NoticeKind::Expired => "expired",
        }
    }
}

/// Days remaining until `end_date`, as a ceiling of the delta in whole
/// days. Zero once the end date has passed.
pub fn days_remaining(end_date: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let secs = (end_date - now).num_seconds();
    if secs <= 0 { 0 } else { (secs + 86_399) / 86_400 }
}

/// Classify a rental into exactly one lifecycle state.
pub fn classify(
    end_date: DateTime<Utc>,
    now: DateTime<Utc>,
    warning_window_days: i64,
) -> RentalStatus {
    if end_date <= now {
        return RentalStatus::Expired;
    }
    if days_remaining(end_date, now) <= warning_window_days {
        RentalStatus::ExpiringSoon
    } else {
        RentalStatus::Active
    }
}

/// The notice a rental state calls for, if any.
pub fn notice_for(status: RentalStatus) -> Option<NoticeKind> {
    match status {
        RentalStatus::Active => None,
        RentalStatus::ExpiringSoon => Some(NoticeKind::Expiring),
        RentalStatus::Expired => Some(NoticeKind::Expired),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, mo: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, 12, 0, 0).unwrap()
    }

    #[test]
    fn parse_period_codes() {
        assert_eq!(RentalPeriod::parse("2weeks").unwrap(), RentalPeriod::TwoWeeks);
        assert_eq!(RentalPeriod::parse("1month").unwrap(), RentalPeriod::OneMonth);
        assert_eq!(
            RentalPeriod::parse("3months").unwrap(),
            RentalPeriod::ThreeMonths
        );
        assert!(matches!(
            RentalPeriod::parse("6months"),
            Err(AppError::InvalidPeriod(_))
        ));
    }

    #[test]
    fn two_weeks_is_exactly_fourteen_days() {
        let start = at(2024, 3, 1);
        let end = RentalPeriod::TwoWeeks.end_date_from(start);
        assert_eq!(end - start, Duration::days(14));
    }

    #[test]
    fn one_month_uses_calendar_addition() {
        let end = RentalPeriod::OneMonth.end_date_from(at(2024, 1, 31));
        assert_eq!(end, at(2024, 2, 29));

        let end = RentalPeriod::OneMonth.end_date_from(at(2023, 1, 31));
        assert_eq!(end, at(2023, 2, 28));
    }

    #[test]
    fn three_months_uses_calendar_addition() {
        let end = RentalPeriod::ThreeMonths.end_date_from(at(2024, 11, 30));
        assert_eq!(end, at(2025, 2, 28));
    }

    #[test]
    fn days_remaining_is_a_ceiling() {
        let now = at(2024, 5, 1);
        assert_eq!(days_remaining(now + Duration::hours(1), now), 1);
        assert_eq!(days_remaining(now + Duration::days(2), now), 2);
        assert_eq!(
            days_remaining(now + Duration::days(2) + Duration::hours(1), now),
            3
        );
        assert_eq!(days_remaining(now - Duration::hours(1), now), 0);
        assert_eq!(days_remaining(now, now), 0);
    }

    #[test]
    fn classify_states_are_exclusive() {
        let now = at(2024, 5, 1);
        let window = DEFAULT_WARNING_WINDOW_DAYS;

        assert_eq!(
            classify(now + Duration::days(30), now, window),
            RentalStatus::Active
        );
        assert_eq!(
            classify(now + Duration::days(2), now, window),
            RentalStatus::ExpiringSoon
        );
        assert_eq!(
            classify(now + Duration::days(3), now, window),
            RentalStatus::ExpiringSoon
        );
        assert_eq!(classify(now, now, window), RentalStatus::Expired);
        assert_eq!(
            classify(now - Duration::days(1), now, window),
            RentalStatus::Expired
        );
    }

    #[test]
    fn notice_for_status() {
        assert_eq!(notice_for(RentalStatus::Active), None);
        assert_eq!(
            notice_for(RentalStatus::ExpiringSoon),
            Some(NoticeKind::Expiring)
        );
        assert_eq!(notice_for(RentalStatus::Expired), Some(NoticeKind::Expired));
    }
}
