//! Course run persistence and draft-twin management

use crate::models::{CourseRun, CourseRunStatus, PacingType};
use crate::store::history;
use chrono::{DateTime, Utc};
use lumo_common::{Error, Result};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// Fields required to create a run; everything else is set by a follow-up
/// [`update`] once the caller has filled the loaded struct
#[derive(Debug, Clone)]
pub struct NewCourseRun {
    pub course_id: i64,
    pub key: String,
    pub status: CourseRunStatus,
    pub draft: bool,
    pub draft_version_of: Option<i64>,
}

fn map_row(row: &sqlx::sqlite::SqliteRow) -> CourseRun {
    let uuid_str: String = row.get("uuid");
    let status_str: String = row.get("status");
    let pacing_str: Option<String> = row.get("pacing_type");
    let hidden: i64 = row.get("hidden");
    let mobile: i64 = row.get("mobile_available");
    let draft: i64 = row.get("draft");
    CourseRun {
        id: row.get("id"),
        uuid: Uuid::parse_str(&uuid_str).unwrap_or_default(),
        course_id: row.get("course_id"),
        key: row.get("key"),
        external_key: row.get("external_key"),
        status: CourseRunStatus::parse(&status_str).unwrap_or(CourseRunStatus::Unpublished),
        start: row.get("start"),
        end: row.get("end"),
        enrollment_start: row.get("enrollment_start"),
        enrollment_end: row.get("enrollment_end"),
        announcement: row.get("announcement"),
        go_live_date: row.get("go_live_date"),
        pacing_type: pacing_str.as_deref().and_then(PacingType::parse),
        language: row.get("language"),
        hidden: hidden != 0,
        license: row.get("license"),
        slug: row.get("slug"),
        title_override: row.get("title_override"),
        short_description_override: row.get("short_description_override"),
        mobile_available: mobile != 0,
        video_id: row.get("video_id"),
        min_effort: row.get("min_effort"),
        max_effort: row.get("max_effort"),
        weeks_to_complete: row.get("weeks_to_complete"),
        course_run_type_id: row.get("course_run_type_id"),
        draft: draft != 0,
        draft_version_of: row.get("draft_version_of"),
    }
}

/// Case-insensitive lookup by run key in the requested variant
pub async fn get_by_key(pool: &SqlitePool, key: &str, draft: bool) -> Result<Option<CourseRun>> {
    let row = sqlx::query("SELECT * FROM course_runs WHERE key = ? COLLATE NOCASE AND draft = ?")
        .bind(key)
        .bind(draft as i64)
        .fetch_optional(pool)
        .await?;
    Ok(row.as_ref().map(map_row))
}

pub async fn get_by_id(pool: &SqlitePool, id: i64) -> Result<Option<CourseRun>> {
    let row = sqlx::query("SELECT * FROM course_runs WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row.as_ref().map(map_row))
}

pub async fn runs_for_course(
    pool: &SqlitePool,
    course_id: i64,
    draft: bool,
) -> Result<Vec<CourseRun>> {
    let rows = sqlx::query(
        "SELECT * FROM course_runs WHERE course_id = ? AND draft = ? ORDER BY start",
    )
    .bind(course_id)
    .bind(draft as i64)
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(map_row).collect())
}

pub async fn create(pool: &SqlitePool, new: &NewCourseRun, actor: &str) -> Result<CourseRun> {
    let uuid = Uuid::new_v4();
    let result = sqlx::query(
        r#"
        INSERT INTO course_runs (uuid, course_id, key, status, draft, draft_version_of)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(uuid.to_string())
    .bind(new.course_id)
    .bind(&new.key)
    .bind(new.status.as_str())
    .bind(new.draft as i64)
    .bind(new.draft_version_of)
    .execute(pool)
    .await?;

    let run = get_by_id(pool, result.last_insert_rowid())
        .await?
        .ok_or_else(|| Error::Internal("course run insert lost row".to_string()))?;

    history::record(
        pool,
        history::entity::COURSE_RUNS,
        run.uuid,
        "created",
        actor,
        serde_json::to_value(&run).unwrap_or_default(),
    )
    .await?;

    Ok(run)
}

/// Persist the mutable fields of an already-loaded run. Writes that would
/// not change the stored row are skipped so repeated ingests are inert.
pub async fn update(pool: &SqlitePool, run: &CourseRun, actor: &str) -> Result<()> {
    if let Some(current) = get_by_id(pool, run.id).await? {
        if serde_json::to_value(&current).ok() == serde_json::to_value(run).ok() {
            return Ok(());
        }
    }
    sqlx::query(
        r#"
        UPDATE course_runs SET
            external_key = ?, status = ?, start = ?, "end" = ?,
            enrollment_start = ?, enrollment_end = ?, announcement = ?,
            go_live_date = ?, pacing_type = ?, language = ?, hidden = ?,
            license = ?, slug = ?, title_override = ?,
            short_description_override = ?, mobile_available = ?, video_id = ?,
            min_effort = ?, max_effort = ?, weeks_to_complete = ?,
            course_run_type_id = ?, draft_version_of = ?,
            updated_at = CURRENT_TIMESTAMP
        WHERE id = ?
        "#,
    )
    .bind(&run.external_key)
    .bind(run.status.as_str())
    .bind(run.start)
    .bind(run.end)
    .bind(run.enrollment_start)
    .bind(run.enrollment_end)
    .bind(run.announcement)
    .bind(run.go_live_date)
    .bind(run.pacing_type.map(|p| p.as_str()))
    .bind(&run.language)
    .bind(run.hidden as i64)
    .bind(&run.license)
    .bind(&run.slug)
    .bind(&run.title_override)
    .bind(&run.short_description_override)
    .bind(run.mobile_available as i64)
    .bind(run.video_id)
    .bind(run.min_effort)
    .bind(run.max_effort)
    .bind(run.weeks_to_complete)
    .bind(run.course_run_type_id)
    .bind(run.draft_version_of)
    .bind(run.id)
    .execute(pool)
    .await?;

    history::record(
        pool,
        history::entity::COURSE_RUNS,
        run.uuid,
        "updated",
        actor,
        serde_json::to_value(run).unwrap_or_default(),
    )
    .await?;
    Ok(())
}

/// Point a draft run at its official counterpart
pub async fn link_draft(pool: &SqlitePool, official_id: i64, draft_id: i64) -> Result<()> {
    sqlx::query("UPDATE course_runs SET draft_version_of = ? WHERE id = ? AND draft = 1")
        .bind(official_id)
        .bind(draft_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Copy a draft run's fields onto its official twin and return the
/// updated official row
pub async fn promote_draft(pool: &SqlitePool, draft: &CourseRun, actor: &str) -> Result<CourseRun> {
    let official_id = draft.draft_version_of.ok_or_else(|| {
        Error::InvalidInput(format!("run draft {} has no official twin", draft.key))
    })?;
    let mut official = get_by_id(pool, official_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("official run {official_id}")))?;

    official.external_key = draft.external_key.clone();
    official.start = draft.start;
    official.end = draft.end;
    official.enrollment_start = draft.enrollment_start;
    official.enrollment_end = draft.enrollment_end;
    official.announcement = draft.announcement;
    official.go_live_date = draft.go_live_date;
    official.pacing_type = draft.pacing_type;
    official.language = draft.language.clone();
    official.hidden = draft.hidden;
    official.license = draft.license.clone();
    official.slug = draft.slug.clone();
    official.title_override = draft.title_override.clone();
    official.short_description_override = draft.short_description_override.clone();
    official.mobile_available = draft.mobile_available;
    official.video_id = draft.video_id;
    official.min_effort = draft.min_effort;
    official.max_effort = draft.max_effort;
    official.weeks_to_complete = draft.weeks_to_complete;
    official.course_run_type_id = draft.course_run_type_id;

    update(pool, &official, actor).await?;
    Ok(official)
}

/// Update just the status column on a set of twin rows
pub async fn set_status(
    pool: &SqlitePool,
    run_ids: &[i64],
    status: CourseRunStatus,
) -> Result<()> {
    for id in run_ids {
        sqlx::query(
            "UPDATE course_runs SET status = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(id)
        .execute(pool)
        .await?;
    }
    Ok(())
}

/// Runs in Reviewed state whose go-live date has passed
pub async fn due_for_publication(
    pool: &SqlitePool,
    now: DateTime<Utc>,
) -> Result<Vec<CourseRun>> {
    let rows = sqlx::query(
        r#"
        SELECT * FROM course_runs
        WHERE status = 'reviewed' AND draft = 1
          AND go_live_date IS NOT NULL AND go_live_date <= ?
        "#,
    )
    .bind(now)
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(map_row).collect())
}

/// Store a video source URL, returning its row id
pub async fn get_or_create_video(pool: &SqlitePool, src: &str) -> Result<i64> {
    sqlx::query("INSERT OR IGNORE INTO videos (src) VALUES (?)")
        .bind(src)
        .execute(pool)
        .await?;
    let row = sqlx::query("SELECT id FROM videos WHERE src = ?")
        .bind(src)
        .fetch_one(pool)
        .await?;
    Ok(row.get(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::courses::{self, NewCourse};
    use crate::store::test_support::fixture_pool;

    async fn fixture_course(pool: &SqlitePool, partner_id: i64) -> crate::models::Course {
        courses::create(
            pool,
            &NewCourse {
                partner_id,
                key: "MITx+6.00x".to_string(),
                title: "Intro".to_string(),
                ..NewCourse::default()
            },
            "ingest",
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn create_and_reload_round_trips_fields() {
        let (pool, partner) = fixture_pool().await;
        let course = fixture_course(&pool, partner.id).await;

        let mut run = create(
            &pool,
            &NewCourseRun {
                course_id: course.id,
                key: "course-v1:MITx+6.00x+1T2024".to_string(),
                status: CourseRunStatus::Published,
                draft: false,
                draft_version_of: None,
            },
            "ingest",
        )
        .await
        .unwrap();

        run.start = lumo_common::time::parse_datetime(Some("2024-01-01T00:00:00Z"));
        run.end = lumo_common::time::parse_datetime(Some("2024-04-01T00:00:00Z"));
        run.pacing_type = Some(PacingType::SelfPaced);
        run.hidden = true;
        run.external_key = Some("EXT-1".to_string());
        update(&pool, &run, "ingest").await.unwrap();

        let loaded = get_by_key(&pool, "course-v1:MITx+6.00x+1T2024", false)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.status, CourseRunStatus::Published);
        assert_eq!(loaded.pacing_type, Some(PacingType::SelfPaced));
        assert!(loaded.hidden);
        assert_eq!(loaded.external_key.as_deref(), Some("EXT-1"));
        assert_eq!(loaded.start, run.start);
        assert_eq!(loaded.end, run.end);
    }

    #[tokio::test]
    async fn due_for_publication_filters_on_go_live() {
        let (pool, partner) = fixture_pool().await;
        let course = fixture_course(&pool, partner.id).await;

        let mut due = create(
            &pool,
            &NewCourseRun {
                course_id: course.id,
                key: "course-v1:MITx+6.00x+1T2024".to_string(),
                status: CourseRunStatus::Reviewed,
                draft: true,
                draft_version_of: None,
            },
            "editor",
        )
        .await
        .unwrap();
        due.go_live_date = lumo_common::time::parse_datetime(Some("2020-01-01T00:00:00Z"));
        update(&pool, &due, "editor").await.unwrap();

        let mut not_due = create(
            &pool,
            &NewCourseRun {
                course_id: course.id,
                key: "course-v1:MITx+6.00x+2T2024".to_string(),
                status: CourseRunStatus::Reviewed,
                draft: true,
                draft_version_of: None,
            },
            "editor",
        )
        .await
        .unwrap();
        not_due.go_live_date = lumo_common::time::parse_datetime(Some("2999-01-01T00:00:00Z"));
        update(&pool, &not_due, "editor").await.unwrap();

        let runs = due_for_publication(&pool, Utc::now()).await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].key, "course-v1:MITx+6.00x+1T2024");
    }
}
