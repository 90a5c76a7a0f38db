//! Course persistence and draft-twin management

use crate::models::Course;
use crate::store::history;
use lumo_common::{Error, Result};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// Fields supplied when creating a course
#[derive(Debug, Clone, Default)]
pub struct NewCourse {
    pub partner_id: i64,
    pub key: String,
    pub title: String,
    pub short_description: Option<String>,
    pub full_description: Option<String>,
    pub image_url: Option<String>,
    pub level: Option<String>,
    pub draft: bool,
    pub draft_version_of: Option<i64>,
}

fn map_row(row: &sqlx::sqlite::SqliteRow) -> Course {
    let uuid_str: String = row.get("uuid");
    let draft: i64 = row.get("draft");
    Course {
        id: row.get("id"),
        uuid: Uuid::parse_str(&uuid_str).unwrap_or_default(),
        partner_id: row.get("partner_id"),
        key: row.get("key"),
        title: row.get("title"),
        short_description: row.get("short_description"),
        full_description: row.get("full_description"),
        image_url: row.get("image_url"),
        level: row.get("level"),
        course_type_id: row.get("course_type_id"),
        canonical_course_run_id: row.get("canonical_course_run_id"),
        draft: draft != 0,
        draft_version_of: row.get("draft_version_of"),
    }
}

/// Case-insensitive lookup by `(partner, key)` in the requested variant
pub async fn get_by_key(
    pool: &SqlitePool,
    partner_id: i64,
    key: &str,
    draft: bool,
) -> Result<Option<Course>> {
    let row = sqlx::query(
        "SELECT * FROM courses WHERE partner_id = ? AND key = ? COLLATE NOCASE AND draft = ?",
    )
    .bind(partner_id)
    .bind(key)
    .bind(draft as i64)
    .fetch_optional(pool)
    .await?;
    Ok(row.as_ref().map(map_row))
}

pub async fn get_by_id(pool: &SqlitePool, id: i64) -> Result<Option<Course>> {
    let row = sqlx::query("SELECT * FROM courses WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row.as_ref().map(map_row))
}

pub async fn get_by_uuid(pool: &SqlitePool, uuid: Uuid, draft: bool) -> Result<Option<Course>> {
    let row = sqlx::query("SELECT * FROM courses WHERE uuid = ? AND draft = ?")
        .bind(uuid.to_string())
        .bind(draft as i64)
        .fetch_optional(pool)
        .await?;
    Ok(row.as_ref().map(map_row))
}

pub async fn create(pool: &SqlitePool, new: &NewCourse, actor: &str) -> Result<Course> {
    let uuid = Uuid::new_v4();
    let result = sqlx::query(
        r#"
        INSERT INTO courses (
            uuid, partner_id, key, title, short_description, full_description,
            image_url, level, draft, draft_version_of
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(uuid.to_string())
    .bind(new.partner_id)
    .bind(&new.key)
    .bind(&new.title)
    .bind(&new.short_description)
    .bind(&new.full_description)
    .bind(&new.image_url)
    .bind(&new.level)
    .bind(new.draft as i64)
    .bind(new.draft_version_of)
    .execute(pool)
    .await?;

    let course = get_by_id(pool, result.last_insert_rowid())
        .await?
        .ok_or_else(|| Error::Internal("course insert lost row".to_string()))?;

    history::record(
        pool,
        history::entity::COURSES,
        course.uuid,
        "created",
        actor,
        serde_json::to_value(&course).unwrap_or_default(),
    )
    .await?;

    Ok(course)
}

/// Persist the mutable fields of an already-loaded course. A write that
/// would not change the stored row is skipped entirely, so repeated
/// ingests leave no trace.
pub async fn update(pool: &SqlitePool, course: &Course, actor: &str) -> Result<()> {
    if let Some(current) = get_by_id(pool, course.id).await? {
        if serde_json::to_value(&current).ok() == serde_json::to_value(course).ok() {
            return Ok(());
        }
    }
    sqlx::query(
        r#"
        UPDATE courses SET
            title = ?, short_description = ?, full_description = ?,
            image_url = ?, level = ?, course_type_id = ?,
            canonical_course_run_id = ?, draft_version_of = ?,
            updated_at = CURRENT_TIMESTAMP
        WHERE id = ?
        "#,
    )
    .bind(&course.title)
    .bind(&course.short_description)
    .bind(&course.full_description)
    .bind(&course.image_url)
    .bind(&course.level)
    .bind(course.course_type_id)
    .bind(course.canonical_course_run_id)
    .bind(course.draft_version_of)
    .bind(course.id)
    .execute(pool)
    .await?;

    history::record(
        pool,
        history::entity::COURSES,
        course.uuid,
        "updated",
        actor,
        serde_json::to_value(course).unwrap_or_default(),
    )
    .await?;
    Ok(())
}

/// Point a draft at its official counterpart
pub async fn link_draft(pool: &SqlitePool, official_id: i64, draft_id: i64) -> Result<()> {
    sqlx::query("UPDATE courses SET draft_version_of = ? WHERE id = ? AND draft = 1")
        .bind(official_id)
        .bind(draft_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Copy a draft's editorial fields onto its official twin and return the
/// updated official row
pub async fn promote_draft(pool: &SqlitePool, draft: &Course, actor: &str) -> Result<Course> {
    let official_id = draft.draft_version_of.ok_or_else(|| {
        Error::InvalidInput(format!("course draft {} has no official twin", draft.key))
    })?;
    let mut official = get_by_id(pool, official_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("official course {official_id}")))?;

    official.title = draft.title.clone();
    official.short_description = draft.short_description.clone();
    official.full_description = draft.full_description.clone();
    official.image_url = draft.image_url.clone();
    official.level = draft.level.clone();
    official.course_type_id = draft.course_type_id;

    update(pool, &official, actor).await?;
    Ok(official)
}

/// All official courses for a partner joined with their draft twin, if any
pub async fn load_pairs(
    pool: &SqlitePool,
    partner_id: i64,
) -> Result<Vec<(Course, Option<Course>)>> {
    let officials = sqlx::query(
        "SELECT * FROM courses WHERE partner_id = ? AND draft = 0 ORDER BY key",
    )
    .bind(partner_id)
    .fetch_all(pool)
    .await?;

    let mut pairs = Vec::with_capacity(officials.len());
    for row in &officials {
        let official = map_row(row);
        let draft_row = sqlx::query(
            "SELECT * FROM courses WHERE draft = 1 AND draft_version_of = ?",
        )
        .bind(official.id)
        .fetch_optional(pool)
        .await?;
        pairs.push((official, draft_row.as_ref().map(map_row)));
    }
    Ok(pairs)
}

pub async fn list_for_partner(pool: &SqlitePool, partner_id: i64, draft: bool) -> Result<Vec<Course>> {
    let rows = sqlx::query("SELECT * FROM courses WHERE partner_id = ? AND draft = ? ORDER BY key")
        .bind(partner_id)
        .bind(draft as i64)
        .fetch_all(pool)
        .await?;
    Ok(rows.iter().map(map_row).collect())
}
