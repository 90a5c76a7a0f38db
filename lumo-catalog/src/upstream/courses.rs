//! Courses API payload shapes

use serde::Deserialize;

/// One course run as reported by the learning platform
#[derive(Debug, Clone, Deserialize)]
pub struct CourseRunRecord {
    /// Globally unique run key, e.g. `course-v1:MITx+6.00x+1T2024`
    pub id: String,
    #[serde(default)]
    pub org: Option<String>,
    #[serde(default)]
    pub number: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub short_description: Option<String>,
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
    #[serde(default)]
    pub enrollment_start: Option<String>,
    #[serde(default)]
    pub enrollment_end: Option<String>,
    #[serde(default)]
    pub media: Media,
    #[serde(default)]
    pub pacing: Option<String>,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub mobile_available: Option<bool>,
    #[serde(default)]
    pub license: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Media {
    #[serde(default)]
    pub course_video: Option<MediaUri>,
    #[serde(default)]
    pub image: Option<MediaImage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediaUri {
    #[serde(default)]
    pub uri: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediaImage {
    #[serde(default)]
    pub raw: Option<String>,
}

impl CourseRunRecord {
    /// Derive the course key `ORG+NUMBER` from the run key
    /// `course-v1:ORG+NUMBER+TERM`. The org/number display fields are not
    /// used: they may not be unique for an organization.
    pub fn course_key(&self) -> Option<String> {
        let body = self.id.strip_prefix("course-v1:").unwrap_or(&self.id);
        let mut parts = body.split('+');
        let org = parts.next()?;
        let number = parts.next()?;
        parts.next()?; // a run key without a term segment is malformed
        Some(format!("{org}+{number}"))
    }

    /// Organization key segment of the run key
    pub fn org_key(&self) -> Option<String> {
        let body = self.id.strip_prefix("course-v1:").unwrap_or(&self.id);
        body.split('+').next().map(String::from)
    }

    pub fn video_uri(&self) -> Option<&str> {
        self.media
            .course_video
            .as_ref()
            .and_then(|v| v.uri.as_deref())
            .filter(|uri| !uri.is_empty())
    }

    pub fn image_url(&self) -> Option<&str> {
        self.media
            .image
            .as_ref()
            .and_then(|i| i.raw.as_deref())
            .filter(|url| !url.is_empty())
    }
}
