//! Course and course run records

use super::review::CourseRunStatus;
use super::seat::Seat;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Run pacing reported by the learning platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PacingType {
    InstructorPaced,
    SelfPaced,
}

impl PacingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PacingType::InstructorPaced => "instructor_paced",
            PacingType::SelfPaced => "self_paced",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "instructor_paced" => Some(PacingType::InstructorPaced),
            "self_paced" => Some(PacingType::SelfPaced),
            _ => None,
        }
    }

    /// Map the upstream `pacing` field (`instructor` / `self`)
    pub fn from_upstream(value: Option<&str>) -> Option<Self> {
        match value.map(|v| v.to_ascii_lowercase()).as_deref() {
            Some("instructor") => Some(PacingType::InstructorPaced),
            Some("self") => Some(PacingType::SelfPaced),
            _ => None,
        }
    }
}

/// Stable unit of content identified by `(partner, key)` where
/// `key = "ORG+NUMBER"`. Exists as draft/official twin rows; the official
/// row is the publicly visible projection.
#[derive(Debug, Clone, Serialize)]
pub struct Course {
    pub id: i64,
    pub uuid: Uuid,
    pub partner_id: i64,
    pub key: String,
    pub title: String,
    pub short_description: Option<String>,
    pub full_description: Option<String>,
    pub image_url: Option<String>,
    pub level: Option<String>,
    /// None is the "empty type": not yet enough signal to classify
    pub course_type_id: Option<i64>,
    pub canonical_course_run_id: Option<i64>,
    pub draft: bool,
    pub draft_version_of: Option<i64>,
}

/// A scheduled instance of a Course, identified by a globally unique
/// opaque key (e.g. `course-v1:ORG+NUMBER+TERM`).
#[derive(Debug, Clone, Serialize)]
pub struct CourseRun {
    pub id: i64,
    pub uuid: Uuid,
    pub course_id: i64,
    pub key: String,
    /// Institution-supplied alternate identifier; unique within the
    /// run's program graph
    pub external_key: Option<String>,
    pub status: CourseRunStatus,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub enrollment_start: Option<DateTime<Utc>>,
    pub enrollment_end: Option<DateTime<Utc>>,
    pub announcement: Option<DateTime<Utc>>,
    pub go_live_date: Option<DateTime<Utc>>,
    pub pacing_type: Option<PacingType>,
    pub language: Option<String>,
    pub hidden: bool,
    pub license: String,
    pub slug: Option<String>,
    pub title_override: Option<String>,
    pub short_description_override: Option<String>,
    pub mobile_available: bool,
    pub video_id: Option<i64>,
    pub min_effort: Option<i64>,
    pub max_effort: Option<i64>,
    pub weeks_to_complete: Option<i64>,
    /// None is the "empty run type"
    pub course_run_type_id: Option<i64>,
    pub draft: bool,
    pub draft_version_of: Option<i64>,
}

impl CourseRun {
    /// Whether enrollment is currently open
    pub fn is_enrollable(&self, now: DateTime<Utc>) -> bool {
        let started = self.enrollment_start.map(|s| s <= now).unwrap_or(true);
        let not_ended = self.enrollment_end.map(|e| e > now).unwrap_or(true);
        started && not_ended
    }

    /// A run is marketable iff its slug is non-empty and it carries at
    /// least one enrollable paid seat, or, for program-only run types,
    /// its parent program is Active.
    pub fn is_marketable(
        &self,
        seats: &[Seat],
        now: DateTime<Utc>,
        program_only_type: bool,
        parent_program_active: bool,
    ) -> bool {
        let has_slug = self.slug.as_deref().map(|s| !s.is_empty()).unwrap_or(false);
        if !has_slug {
            return false;
        }
        if program_only_type {
            return parent_program_active;
        }
        seats
            .iter()
            .any(|seat| seat.seat_type.is_paid() && seat.is_enrollable(now))
    }

    /// Whether the run is published and has not yet ended
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.status == CourseRunStatus::Published && self.end.map(|e| e > now).unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SeatType;

    fn run_with_slug(slug: Option<&str>) -> CourseRun {
        CourseRun {
            id: 1,
            uuid: Uuid::new_v4(),
            course_id: 1,
            key: "course-v1:MITx+6.00x+1T2024".to_string(),
            external_key: None,
            status: CourseRunStatus::Published,
            start: None,
            end: None,
            enrollment_start: None,
            enrollment_end: None,
            announcement: None,
            go_live_date: None,
            pacing_type: Some(PacingType::SelfPaced),
            language: None,
            hidden: false,
            license: String::new(),
            slug: slug.map(String::from),
            title_override: None,
            short_description_override: None,
            mobile_available: false,
            video_id: None,
            min_effort: None,
            max_effort: None,
            weeks_to_complete: None,
            course_run_type_id: None,
            draft: false,
            draft_version_of: None,
        }
    }

    fn paid_seat() -> Seat {
        Seat {
            id: 1,
            course_run_id: 1,
            seat_type: SeatType::Verified,
            credit_provider: None,
            currency: "USD".to_string(),
            price: 49.0,
            upgrade_deadline: None,
            sku: Some("S1".to_string()),
            bulk_sku: None,
            credit_hours: None,
        }
    }

    #[test]
    fn marketable_requires_slug() {
        let now = Utc::now();
        let run = run_with_slug(None);
        assert!(!run.is_marketable(&[paid_seat()], now, false, false));

        let run = run_with_slug(Some("intro-python"));
        assert!(run.is_marketable(&[paid_seat()], now, false, false));
    }

    #[test]
    fn marketable_requires_paid_seat_or_active_program() {
        let now = Utc::now();
        let run = run_with_slug(Some("intro-python"));
        assert!(!run.is_marketable(&[], now, false, false));
        assert!(run.is_marketable(&[], now, true, true));
        assert!(!run.is_marketable(&[], now, true, false));
    }

    #[test]
    fn pacing_maps_from_upstream() {
        assert_eq!(
            PacingType::from_upstream(Some("Self")),
            Some(PacingType::SelfPaced)
        );
        assert_eq!(
            PacingType::from_upstream(Some("instructor")),
            Some(PacingType::InstructorPaced)
        );
        assert_eq!(PacingType::from_upstream(Some("other")), None);
        assert_eq!(PacingType::from_upstream(None), None);
    }
}
