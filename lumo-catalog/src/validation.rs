//! Cross-record integrity checks
//!
//! The institution-supplied `external_key` on a course run must be unique
//! within every scope the run participates in: its course, each curriculum
//! containing that course, and each program owning one of those curricula.
//! Callers validate before committing any create/update that introduces a
//! key or moves a run into a new scope; a violation reports every
//! colliding run so the error can be rendered precisely.

use crate::models::CourseRun;
use crate::store::{course_runs, programs};
use lumo_common::{Error, Result};
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;

/// One duplicated external key and all runs carrying it within a scope
#[derive(Debug, Clone)]
pub struct Collision {
    pub external_key: String,
    pub scope: String,
    pub run_keys: Vec<String>,
}

impl Collision {
    pub fn message(&self) -> String {
        format!(
            "duplicate external_key [{}] in {}: {}",
            self.external_key,
            self.scope,
            self.run_keys.join(", ")
        )
    }
}

/// Validate a set of changed runs, returning every collision found.
/// An empty result means the change is safe to commit.
pub async fn validate_external_keys(
    pool: &SqlitePool,
    changed_run_ids: &[i64],
) -> Result<Vec<Collision>> {
    let mut collisions: Vec<Collision> = Vec::new();

    for &run_id in changed_run_ids {
        let run = match course_runs::get_by_id(pool, run_id).await? {
            Some(run) => run,
            None => continue,
        };
        let external_key = match run.external_key.as_deref() {
            Some(key) if !key.is_empty() => key.to_string(),
            _ => continue,
        };

        // Course scope. Draft and official variants are considered
        // together; a run's own twin shares its key and is deduplicated,
        // so twins never self-collide.
        let course_runs_in_scope = runs_in_course_scope(pool, run.course_id).await?;
        collect_collisions(
            &course_runs_in_scope,
            &format!("course #{}", run.course_id),
            Some(&external_key),
            &mut collisions,
        );

        // Curriculum and program scopes
        for curriculum in programs::curricula_containing_course(pool, run.course_id).await? {
            let curriculum_runs = runs_in_curriculum_scope(pool, curriculum.id).await?;
            collect_collisions(
                &curriculum_runs,
                &format!("curriculum {}", curriculum.uuid),
                Some(&external_key),
                &mut collisions,
            );

            let program_runs = runs_in_program_scope(pool, curriculum.program_id).await?;
            collect_collisions(
                &program_runs,
                &format!("program #{}", curriculum.program_id),
                Some(&external_key),
                &mut collisions,
            );
        }
    }

    dedupe(&mut collisions);
    Ok(collisions)
}

/// Validate every run reachable from a curriculum, used when a membership
/// or the curriculum's program binding changes
pub async fn validate_curriculum(pool: &SqlitePool, curriculum_id: i64) -> Result<Vec<Collision>> {
    let row = sqlx::query("SELECT program_id, uuid FROM curricula WHERE id = ?")
        .bind(curriculum_id)
        .fetch_optional(pool)
        .await?;
    let (program_id, curriculum_uuid): (i64, String) = match row {
        Some(r) => (r.get("program_id"), r.get("uuid")),
        None => return Ok(Vec::new()),
    };

    let mut collisions = Vec::new();
    let curriculum_runs = runs_in_curriculum_scope(pool, curriculum_id).await?;
    collect_collisions(
        &curriculum_runs,
        &format!("curriculum {curriculum_uuid}"),
        None,
        &mut collisions,
    );
    let program_runs = runs_in_program_scope(pool, program_id).await?;
    collect_collisions(
        &program_runs,
        &format!("program #{program_id}"),
        None,
        &mut collisions,
    );
    dedupe(&mut collisions);
    Ok(collisions)
}

/// Convenience wrapper: collisions become a `Validation` error whose
/// message lists every offending run
pub async fn ensure_unique_external_keys(
    pool: &SqlitePool,
    changed_run_ids: &[i64],
) -> Result<()> {
    let collisions = validate_external_keys(pool, changed_run_ids).await?;
    if collisions.is_empty() {
        Ok(())
    } else {
        let message = collisions
            .iter()
            .map(Collision::message)
            .collect::<Vec<_>>()
            .join("; ");
        Err(Error::Validation(message))
    }
}

/// Gather duplicated external keys within one scope's run set. When
/// `only_key` is set, restrict reporting to that key (the one the caller
/// is introducing); the collision still lists every run carrying it.
fn collect_collisions(
    runs: &[CourseRun],
    scope: &str,
    only_key: Option<&str>,
    out: &mut Vec<Collision>,
) {
    let mut by_key: BTreeMap<&str, Vec<&CourseRun>> = BTreeMap::new();
    for run in runs {
        if let Some(key) = run.external_key.as_deref() {
            if !key.is_empty() {
                by_key.entry(key).or_default().push(run);
            }
        }
    }

    for (key, holders) in by_key {
        if let Some(only) = only_key {
            if key != only {
                continue;
            }
        }
        // The same logical run may appear via several membership paths
        let mut run_keys: Vec<String> = holders.iter().map(|r| r.key.clone()).collect();
        run_keys.sort();
        run_keys.dedup();
        if run_keys.len() > 1 {
            out.push(Collision {
                external_key: key.to_string(),
                scope: scope.to_string(),
                run_keys,
            });
        }
    }
}

fn dedupe(collisions: &mut Vec<Collision>) {
    collisions.sort_by(|a, b| {
        (&a.external_key, &a.scope, &a.run_keys).cmp(&(&b.external_key, &b.scope, &b.run_keys))
    });
    collisions.dedup_by(|a, b| {
        a.external_key == b.external_key && a.scope == b.scope && a.run_keys == b.run_keys
    });
}

async fn runs_in_course_scope(pool: &SqlitePool, course_id: i64) -> Result<Vec<CourseRun>> {
    let rows = sqlx::query("SELECT id FROM course_runs WHERE course_id = ?")
        .bind(course_id)
        .fetch_all(pool)
        .await?;
    load_runs(pool, rows).await
}

async fn runs_in_curriculum_scope(
    pool: &SqlitePool,
    curriculum_id: i64,
) -> Result<Vec<CourseRun>> {
    let rows = sqlx::query(
        r#"
        SELECT r.id FROM course_runs r
        JOIN curriculum_course_memberships m ON m.course_id = r.course_id
        WHERE m.curriculum_id = ?
        "#,
    )
    .bind(curriculum_id)
    .fetch_all(pool)
    .await?;
    load_runs(pool, rows).await
}

async fn runs_in_program_scope(pool: &SqlitePool, program_id: i64) -> Result<Vec<CourseRun>> {
    let rows = sqlx::query(
        r#"
        SELECT r.id FROM course_runs r
        JOIN curriculum_course_memberships m ON m.course_id = r.course_id
        JOIN curricula c ON c.id = m.curriculum_id
        WHERE c.program_id = ?
        "#,
    )
    .bind(program_id)
    .fetch_all(pool)
    .await?;
    load_runs(pool, rows).await
}

async fn load_runs(
    pool: &SqlitePool,
    rows: Vec<sqlx::sqlite::SqliteRow>,
) -> Result<Vec<CourseRun>> {
    let mut runs = Vec::with_capacity(rows.len());
    for row in &rows {
        let id: i64 = row.get(0);
        if let Some(run) = course_runs::get_by_id(pool, id).await? {
            runs.push(run);
        }
    }
    Ok(runs)
}
