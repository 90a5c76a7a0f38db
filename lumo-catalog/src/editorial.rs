//! Editor-facing mutations and the review lifecycle
//!
//! Editors work on draft rows; ingestion and publication move content to
//! the official twin. A draft entering legal review freezes its
//! review-gated fields; a small set of scheduling fields stays editable
//! throughout. Publication copies the draft onto the official twin and,
//! once the go-live date passes, flips both to Published.

use crate::models::{CourseRun, CourseRunStatus};
use crate::store::{course_runs, courses};
use crate::validation;
use chrono::{DateTime, Utc};
use lumo_common::events::{CatalogEvent, ChangeAction, EventBus, RecordKind};
use lumo_common::{Error, Result};
use sqlx::SqlitePool;
use tracing::{error, info};

/// A partial edit to a draft run. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct RunEdit {
    // Review-gated fields
    pub external_key: Option<String>,
    pub slug: Option<String>,
    pub title_override: Option<String>,
    pub short_description_override: Option<String>,
    pub language: Option<String>,
    pub announcement: Option<DateTime<Utc>>,
    // Fields exempt from review gating
    pub go_live_date: Option<DateTime<Utc>>,
    pub min_effort: Option<i64>,
    pub max_effort: Option<i64>,
    pub weeks_to_complete: Option<i64>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl RunEdit {
    /// Whether this edit touches any review-gated field
    pub fn touches_gated_fields(&self) -> bool {
        self.external_key.is_some()
            || self.slug.is_some()
            || self.title_override.is_some()
            || self.short_description_override.is_some()
            || self.language.is_some()
            || self.announcement.is_some()
    }

    fn apply(&self, run: &mut CourseRun) {
        if let Some(v) = &self.external_key {
            run.external_key = Some(v.clone());
        }
        if let Some(v) = &self.slug {
            run.slug = Some(v.clone());
        }
        if let Some(v) = &self.title_override {
            run.title_override = Some(v.clone());
        }
        if let Some(v) = &self.short_description_override {
            run.short_description_override = Some(v.clone());
        }
        if let Some(v) = &self.language {
            run.language = Some(v.clone());
        }
        if let Some(v) = self.announcement {
            run.announcement = Some(v);
        }
        if let Some(v) = self.go_live_date {
            run.go_live_date = Some(v);
        }
        if let Some(v) = self.min_effort {
            run.min_effort = Some(v);
        }
        if let Some(v) = self.max_effort {
            run.max_effort = Some(v);
        }
        if let Some(v) = self.weeks_to_complete {
            run.weeks_to_complete = Some(v);
        }
        if let Some(v) = self.start {
            run.start = Some(v);
        }
        if let Some(v) = self.end {
            run.end = Some(v);
        }
    }
}

/// The draft twin of a run, created from the official row on first edit
pub async fn ensure_draft(pool: &SqlitePool, run_key: &str, actor: &str) -> Result<CourseRun> {
    if let Some(draft) = course_runs::get_by_key(pool, run_key, true).await? {
        return Ok(draft);
    }
    let official = course_runs::get_by_key(pool, run_key, false)
        .await?
        .ok_or_else(|| Error::NotFound(format!("course run {run_key}")))?;

    let created = course_runs::create(
        pool,
        &course_runs::NewCourseRun {
            course_id: official.course_id,
            key: official.key.clone(),
            status: official.status,
            draft: true,
            draft_version_of: Some(official.id),
        },
        actor,
    )
    .await?;

    // Seed the draft with the official content
    let mut draft = official.clone();
    draft.id = created.id;
    draft.uuid = created.uuid;
    draft.draft = true;
    draft.draft_version_of = Some(official.id);
    course_runs::update(pool, &draft, actor).await?;
    Ok(draft)
}

/// Apply an editor's edit to the run's draft twin, honoring review gating
///
/// - In LegalReview/InternalReview, only the exempt scheduling fields may
///   change; anything else is a permission error.
/// - Editing a gated field while Reviewed resets both twins to
///   Unpublished (the content must be re-reviewed).
/// - An external-key change is validated against every scope the run
///   participates in before it sticks.
pub async fn apply_run_edit(
    pool: &SqlitePool,
    bus: &EventBus,
    run_key: &str,
    edit: &RunEdit,
    actor: &str,
) -> Result<CourseRun> {
    let mut draft = ensure_draft(pool, run_key, actor).await?;
    let gated = edit.touches_gated_fields();

    if gated && draft.status.is_in_review() {
        return Err(Error::Permission(format!(
            "course run {run_key} is in review; only scheduling fields may change"
        )));
    }

    let previous_external_key = draft.external_key.clone();
    edit.apply(&mut draft);
    course_runs::update(pool, &draft, actor).await?;

    if edit.external_key.is_some() {
        if let Err(collision) = validation::ensure_unique_external_keys(pool, &[draft.id]).await {
            // Restore the previous key so the rejected edit leaves no trace
            draft.external_key = previous_external_key;
            course_runs::update(pool, &draft, actor).await?;
            return Err(collision);
        }
    }

    if gated && draft.status == CourseRunStatus::Reviewed {
        let mut reset_ids = vec![draft.id];
        reset_ids.extend(draft.draft_version_of);
        course_runs::set_status(pool, &reset_ids, CourseRunStatus::Unpublished).await?;
        draft.status = CourseRunStatus::Unpublished;
        info!(run = %run_key, "Review-gated edit reset run to unpublished");
    }

    bus.emit_lossy(CatalogEvent::new(
        RecordKind::CourseRun,
        draft.uuid,
        ChangeAction::Updated,
    ));
    Ok(draft)
}

/// Add a course to a curriculum, validating external-key uniqueness in
/// the curriculum's program graph before the membership sticks
pub async fn add_course_to_curriculum(
    pool: &SqlitePool,
    curriculum_id: i64,
    course_id: i64,
) -> Result<()> {
    crate::store::programs::add_course_membership(pool, curriculum_id, course_id).await?;

    let collisions = validation::validate_curriculum(pool, curriculum_id).await?;
    if collisions.is_empty() {
        return Ok(());
    }

    // Roll the membership back so the rejected change leaves no trace
    crate::store::programs::remove_course_membership(pool, curriculum_id, course_id).await?;
    let message = collisions
        .iter()
        .map(|c| c.message())
        .collect::<Vec<_>>()
        .join("; ");
    Err(Error::Validation(message))
}

/// Unpublished → LegalReview: submission freezes the draft
pub async fn submit_for_review(pool: &SqlitePool, run_key: &str) -> Result<CourseRun> {
    let mut draft = course_runs::get_by_key(pool, run_key, true)
        .await?
        .ok_or_else(|| Error::NotFound(format!("draft run {run_key}")))?;
    if draft.status != CourseRunStatus::Unpublished {
        return Err(Error::InvalidInput(format!(
            "run {run_key} cannot enter review from {:?}",
            draft.status
        )));
    }
    course_runs::set_status(pool, &[draft.id], CourseRunStatus::LegalReview).await?;
    draft.status = CourseRunStatus::LegalReview;
    Ok(draft)
}

/// Advance one review stage: LegalReview → InternalReview → Reviewed
pub async fn approve_review(pool: &SqlitePool, run_key: &str) -> Result<CourseRun> {
    let mut draft = course_runs::get_by_key(pool, run_key, true)
        .await?
        .ok_or_else(|| Error::NotFound(format!("draft run {run_key}")))?;
    let next = draft.status.next_review_state().ok_or_else(|| {
        Error::InvalidInput(format!(
            "run {run_key} has no review approval from {:?}",
            draft.status
        ))
    })?;
    course_runs::set_status(pool, &[draft.id], next).await?;
    draft.status = next;
    Ok(draft)
}

/// Publication request on a Reviewed draft: promote its fields onto the
/// official twin. If the go-live date has passed both twins go Published;
/// otherwise they hold at Reviewed for the scheduled publisher.
pub async fn request_publication(
    pool: &SqlitePool,
    bus: &EventBus,
    run_key: &str,
    now: DateTime<Utc>,
    actor: &str,
) -> Result<CourseRun> {
    let draft = course_runs::get_by_key(pool, run_key, true)
        .await?
        .ok_or_else(|| Error::NotFound(format!("draft run {run_key}")))?;
    if draft.status != CourseRunStatus::Reviewed {
        return Err(Error::InvalidInput(format!(
            "run {run_key} must be reviewed before publication (is {:?})",
            draft.status
        )));
    }

    let official = course_runs::promote_draft(pool, &draft, actor).await?;

    // The owning course's draft, if any, goes along with the run
    if let Some(course_draft) = find_course_draft(pool, official.course_id).await? {
        courses::promote_draft(pool, &course_draft, actor).await?;
    }

    let live = draft.go_live_date.map(|d| d <= now).unwrap_or(true);
    if live {
        course_runs::set_status(pool, &[draft.id, official.id], CourseRunStatus::Published).await?;
        bus.emit_lossy(CatalogEvent::new(
            RecordKind::CourseRun,
            official.uuid,
            ChangeAction::Updated,
        ));
        info!(run = %run_key, "Published course run");
    } else {
        info!(run = %run_key, "Promotion held at reviewed until go-live");
    }

    course_runs::get_by_id(pool, official.id)
        .await?
        .ok_or_else(|| Error::Internal("official run vanished".to_string()))
}

async fn find_course_draft(
    pool: &SqlitePool,
    official_course_id: i64,
) -> Result<Option<crate::models::Course>> {
    let official = courses::get_by_id(pool, official_course_id).await?;
    let official = match official {
        Some(c) => c,
        None => return Ok(None),
    };
    let pairs = courses::load_pairs(pool, official.partner_id).await?;
    Ok(pairs
        .into_iter()
        .find(|(o, _)| o.id == official.id)
        .and_then(|(_, draft)| draft))
}

/// Scheduled publisher: every Reviewed draft whose go-live date passed is
/// promoted and published. Individual failures are logged and the sweep
/// continues.
pub async fn publish_due_runs(pool: &SqlitePool, bus: &EventBus, now: DateTime<Utc>) -> u64 {
    let due = match course_runs::due_for_publication(pool, now).await {
        Ok(due) => due,
        Err(e) => {
            error!("Publisher scan failed: {}", e);
            return 0;
        }
    };

    let mut published = 0;
    for draft in due {
        match request_publication(pool, bus, &draft.key, now, "publisher").await {
            Ok(_) => published += 1,
            Err(e) => error!(run = %draft.key, "Scheduled publication failed: {}", e),
        }
    }
    if published > 0 {
        info!(published, "Scheduled publisher promoted due runs");
    }
    published
}

/// Explicit unpublish. Allowed only while the owning course keeps at
/// least one other active Published run visible.
pub async fn unpublish_run(
    pool: &SqlitePool,
    bus: &EventBus,
    run_key: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    let official = course_runs::get_by_key(pool, run_key, false)
        .await?
        .ok_or_else(|| Error::NotFound(format!("course run {run_key}")))?;
    if official.status != CourseRunStatus::Published {
        return Err(Error::InvalidInput(format!("run {run_key} is not published")));
    }

    let siblings = course_runs::runs_for_course(pool, official.course_id, false).await?;
    let other_active = siblings
        .iter()
        .any(|run| run.id != official.id && run.is_active(now));
    if !other_active {
        return Err(Error::Validation(format!(
            "run {run_key} is the course's last active published run"
        )));
    }

    let mut ids = vec![official.id];
    if let Some(draft) = course_runs::get_by_key(pool, run_key, true).await? {
        ids.push(draft.id);
    }
    course_runs::set_status(pool, &ids, CourseRunStatus::Unpublished).await?;
    bus.emit_lossy(CatalogEvent::new(
        RecordKind::CourseRun,
        official.uuid,
        ChangeAction::Updated,
    ));
    Ok(())
}

/// Keep-visible sweep: a course whose published runs have all ended gets
/// its most-recently-started announced Unpublished run promoted back to
/// Published. Runs without an announcement never auto-republish.
pub async fn republish_ended_runs(pool: &SqlitePool, bus: &EventBus, now: DateTime<Utc>) -> u64 {
    let partner_rows = match crate::store::partners::list_all(pool).await {
        Ok(rows) => rows,
        Err(e) => {
            error!("Republish sweep failed to list partners: {}", e);
            return 0;
        }
    };

    let mut republished = 0;
    for partner in partner_rows {
        let course_list = match courses::list_for_partner(pool, partner.id, false).await {
            Ok(list) => list,
            Err(e) => {
                error!(partner = %partner.short_code, "Republish sweep failed: {}", e);
                continue;
            }
        };
        for course in course_list {
            match republish_for_course(pool, bus, course.id, now).await {
                Ok(true) => republished += 1,
                Ok(false) => {}
                Err(e) => error!(course = %course.key, "Republish failed: {}", e),
            }
        }
    }
    republished
}

async fn republish_for_course(
    pool: &SqlitePool,
    bus: &EventBus,
    course_id: i64,
    now: DateTime<Utc>,
) -> Result<bool> {
    let runs = course_runs::runs_for_course(pool, course_id, false).await?;
    if runs.is_empty() || runs.iter().any(|run| run.is_active(now)) {
        return Ok(false);
    }
    // No published run was ever present: nothing to keep visible
    if !runs.iter().any(|run| run.status == CourseRunStatus::Published) {
        return Ok(false);
    }

    let candidate = runs
        .iter()
        .filter(|run| {
            run.status == CourseRunStatus::Unpublished && run.announcement.is_some()
        })
        .max_by_key(|run| run.start);
    let candidate = match candidate {
        Some(run) => run,
        None => return Ok(false),
    };

    course_runs::set_status(pool, &[candidate.id], CourseRunStatus::Published).await?;
    bus.emit_lossy(CatalogEvent::new(
        RecordKind::CourseRun,
        candidate.uuid,
        ChangeAction::Updated,
    ));
    info!(run = %candidate.key, "Auto-republished run to keep course visible");
    Ok(true)
}
