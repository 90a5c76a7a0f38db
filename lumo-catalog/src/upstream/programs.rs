//! Programs API payload shapes

use serde::Deserialize;
use std::collections::HashMap;

/// Banner variant the loader downloads
pub const BANNER_IMAGE_KEY: &str = "w1440h480";

#[derive(Debug, Clone, Deserialize)]
pub struct ProgramRecord {
    pub uuid: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub marketing_slug: Option<String>,
    #[serde(default)]
    pub organizations: Vec<OrganizationRef>,
    #[serde(default)]
    pub banner_image_urls: HashMap<String, String>,
    #[serde(default)]
    pub course_codes: Vec<CourseCode>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrganizationRef {
    pub key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CourseCode {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub organization: Option<OrganizationRef>,
    #[serde(default)]
    pub run_modes: Vec<RunMode>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunMode {
    pub course_key: String,
    #[serde(default)]
    pub mode_slug: Option<String>,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub start_date: Option<String>,
}

impl ProgramRecord {
    /// All run keys named anywhere in the payload. The course_code key
    /// field is unreliable; the course list must be built from these.
    pub fn named_run_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .course_codes
            .iter()
            .flat_map(|code| code.run_modes.iter().map(|m| m.course_key.clone()))
            .collect();
        keys.sort();
        keys.dedup();
        keys
    }

    pub fn banner_image_url(&self) -> Option<&str> {
        self.banner_image_urls
            .get(BANNER_IMAGE_KEY)
            .map(String::as_str)
            .filter(|url| !url.is_empty())
    }
}
