//! Course run lifecycle states
//!
//! A run moves through editorial review before it is visible publicly:
//! Unpublished → LegalReview → InternalReview → Reviewed → Published, with
//! an explicit unpublish path back to Unpublished. The state lives on the
//! run row; draft and official twins share it in lockstep once review
//! completes.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CourseRunStatus {
    Unpublished,
    LegalReview,
    InternalReview,
    Reviewed,
    Published,
}

impl CourseRunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CourseRunStatus::Unpublished => "unpublished",
            CourseRunStatus::LegalReview => "review_by_legal",
            CourseRunStatus::InternalReview => "review_by_internal",
            CourseRunStatus::Reviewed => "reviewed",
            CourseRunStatus::Published => "published",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "unpublished" => Some(CourseRunStatus::Unpublished),
            "review_by_legal" => Some(CourseRunStatus::LegalReview),
            "review_by_internal" => Some(CourseRunStatus::InternalReview),
            "reviewed" => Some(CourseRunStatus::Reviewed),
            "published" => Some(CourseRunStatus::Published),
            _ => None,
        }
    }

    /// States in which review-gated fields are frozen
    pub fn is_in_review(&self) -> bool {
        matches!(
            self,
            CourseRunStatus::LegalReview | CourseRunStatus::InternalReview
        )
    }

    /// Whether arbitrary draft edits are accepted in this state
    pub fn allows_gated_edits(&self) -> bool {
        matches!(
            self,
            CourseRunStatus::Unpublished | CourseRunStatus::Reviewed | CourseRunStatus::Published
        )
    }

    /// Next state on review approval, if any
    pub fn next_review_state(&self) -> Option<Self> {
        match self {
            CourseRunStatus::LegalReview => Some(CourseRunStatus::InternalReview),
            CourseRunStatus::InternalReview => Some(CourseRunStatus::Reviewed),
            _ => None,
        }
    }
}

/// Fields exempt from review gating: scheduling knobs editors may adjust
/// while a run sits in legal or internal review.
pub const REVIEW_EXEMPT_FIELDS: &[&str] = &[
    "go_live_date",
    "min_effort",
    "max_effort",
    "weeks_to_complete",
    "start",
    "end",
];
