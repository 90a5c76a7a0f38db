//! Seats and entitlements, the sellable surface of a course

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sellable mode of a course run or entitlement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeatType {
    Audit,
    Verified,
    Professional,
    Credit,
    Masters,
    Honor,
}

impl SeatType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeatType::Audit => "audit",
            SeatType::Verified => "verified",
            SeatType::Professional => "professional",
            SeatType::Credit => "credit",
            SeatType::Masters => "masters",
            SeatType::Honor => "honor",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "audit" => Some(SeatType::Audit),
            "verified" => Some(SeatType::Verified),
            "professional" | "no-id-professional" => Some(SeatType::Professional),
            "credit" => Some(SeatType::Credit),
            "masters" => Some(SeatType::Masters),
            "honor" => Some(SeatType::Honor),
            _ => None,
        }
    }

    /// Seat types a learner pays for
    pub fn is_paid(&self) -> bool {
        !matches!(self, SeatType::Audit | SeatType::Honor)
    }

    /// Paid types whose upgrade deadline tracks the run's end date.
    /// Credit seats keep their own deadline.
    pub fn deadline_tracks_run_end(&self) -> bool {
        self.is_paid() && *self != SeatType::Credit
    }
}

/// A sellable mode within a course run. Composite identity within the run
/// is `(type, credit_provider, currency)`.
#[derive(Debug, Clone, Serialize)]
pub struct Seat {
    pub id: i64,
    pub course_run_id: i64,
    pub seat_type: SeatType,
    pub credit_provider: Option<String>,
    pub currency: String,
    pub price: f64,
    pub upgrade_deadline: Option<DateTime<Utc>>,
    pub sku: Option<String>,
    pub bulk_sku: Option<String>,
    pub credit_hours: Option<i64>,
}

impl Seat {
    /// A seat is enrollable while its upgrade deadline has not passed
    pub fn is_enrollable(&self, now: DateTime<Utc>) -> bool {
        self.upgrade_deadline.map(|d| d > now).unwrap_or(true)
    }
}

/// A run-independent sellable right to a Course in a given mode.
/// Identified by `(course, mode)`.
#[derive(Debug, Clone, Serialize)]
pub struct CourseEntitlement {
    pub id: i64,
    pub course_id: i64,
    pub mode: SeatType,
    pub price: f64,
    pub currency: String,
    pub sku: Option<String>,
    pub expires: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_types() {
        assert_eq!(SeatType::parse("verified"), Some(SeatType::Verified));
        assert_eq!(SeatType::parse("Audit"), Some(SeatType::Audit));
        assert_eq!(
            SeatType::parse("no-id-professional"),
            Some(SeatType::Professional)
        );
        assert_eq!(SeatType::parse("premium"), None);
    }

    #[test]
    fn paid_classification() {
        assert!(SeatType::Verified.is_paid());
        assert!(SeatType::Credit.is_paid());
        assert!(!SeatType::Audit.is_paid());
        assert!(!SeatType::Honor.is_paid());
    }

    #[test]
    fn credit_deadline_is_exempt_from_run_end_sync() {
        assert!(SeatType::Verified.deadline_tracks_run_end());
        assert!(SeatType::Professional.deadline_tracks_run_end());
        assert!(!SeatType::Credit.deadline_tracks_run_end());
        assert!(!SeatType::Audit.deadline_tracks_run_end());
    }
}
