//! Programs, curricula and pathways

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgramStatus {
    Unpublished,
    Active,
    Retired,
    Deleted,
}

impl ProgramStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgramStatus::Unpublished => "unpublished",
            ProgramStatus::Active => "active",
            ProgramStatus::Retired => "retired",
            ProgramStatus::Deleted => "deleted",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "unpublished" => Some(ProgramStatus::Unpublished),
            "active" => Some(ProgramStatus::Active),
            "retired" => Some(ProgramStatus::Retired),
            "deleted" => Some(ProgramStatus::Deleted),
            _ => None,
        }
    }
}

/// A bundle of Courses sold under a marketing type (MicroMasters, XSeries,
/// Professional Certificate, Masters).
#[derive(Debug, Clone, Serialize)]
pub struct Program {
    pub id: i64,
    pub uuid: Uuid,
    pub partner_id: i64,
    pub title: String,
    pub subtitle: Option<String>,
    pub program_type: String,
    pub status: ProgramStatus,
    pub marketing_slug: Option<String>,
    pub banner_image_url: Option<String>,
    pub banner_image_id: Option<i64>,
}

impl Program {
    /// An Active program must carry a banner image
    pub fn banner_satisfies_status(&self) -> bool {
        self.status != ProgramStatus::Active
            || self.banner_image_url.is_some()
            || self.banner_image_id.is_some()
    }
}

/// A set of course and nested-program memberships, bound to exactly one
/// parent Program.
#[derive(Debug, Clone)]
pub struct Curriculum {
    pub id: i64,
    pub uuid: Uuid,
    pub program_id: i64,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct CurriculumCourseMembership {
    pub id: i64,
    pub curriculum_id: i64,
    pub course_id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathwayStatus {
    Unpublished,
    Published,
    Retired,
}

impl PathwayStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PathwayStatus::Unpublished => "unpublished",
            PathwayStatus::Published => "published",
            PathwayStatus::Retired => "retired",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "unpublished" => Some(PathwayStatus::Unpublished),
            "published" => Some(PathwayStatus::Published),
            "retired" => Some(PathwayStatus::Retired),
            _ => None,
        }
    }
}

/// An externally advertised path composed of Programs
#[derive(Debug, Clone)]
pub struct Pathway {
    pub id: i64,
    pub uuid: Uuid,
    pub partner_id: i64,
    pub name: String,
    pub status: PathwayStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_program_requires_banner() {
        let mut program = Program {
            id: 1,
            uuid: Uuid::new_v4(),
            partner_id: 1,
            title: "Data Science".to_string(),
            subtitle: None,
            program_type: "MicroMasters".to_string(),
            status: ProgramStatus::Active,
            marketing_slug: Some("data-science".to_string()),
            banner_image_url: None,
            banner_image_id: None,
        };
        assert!(!program.banner_satisfies_status());

        program.banner_image_url = Some("https://img.example/banner.jpg".to_string());
        assert!(program.banner_satisfies_status());

        program.banner_image_url = None;
        program.status = ProgramStatus::Unpublished;
        assert!(program.banner_satisfies_status());
    }
}
