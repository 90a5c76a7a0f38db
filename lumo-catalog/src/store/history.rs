//! Append-only change history
//!
//! Every create/update/delete lands one row in the entity's history table
//! with the acting principal and a JSON snapshot of the record after the
//! change (or before it, for deletes).

use lumo_common::Result;
use sqlx::SqlitePool;
use uuid::Uuid;

/// History table names; callers pass one of these constants.
pub mod entity {
    pub const ORGANIZATIONS: &str = "organizations";
    pub const COURSES: &str = "courses";
    pub const COURSE_RUNS: &str = "course_runs";
    pub const SEATS: &str = "seats";
    pub const COURSE_ENTITLEMENTS: &str = "course_entitlements";
    pub const PROGRAMS: &str = "programs";
}

/// Append one history row
pub async fn record(
    pool: &SqlitePool,
    entity: &'static str,
    record_uuid: Uuid,
    action: &str,
    actor: &str,
    snapshot: serde_json::Value,
) -> Result<()> {
    let sql = format!(
        "INSERT INTO {entity}_history (record_uuid, action, actor, snapshot) VALUES (?, ?, ?, ?)"
    );
    sqlx::query(&sql)
        .bind(record_uuid.to_string())
        .bind(action)
        .bind(actor)
        .bind(snapshot.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

/// Number of history rows for a record, oldest first
pub async fn count_for_record(
    pool: &SqlitePool,
    entity: &'static str,
    record_uuid: Uuid,
) -> Result<i64> {
    let sql = format!("SELECT COUNT(*) FROM {entity}_history WHERE record_uuid = ?");
    let count: (i64,) = sqlx::query_as(&sql)
        .bind(record_uuid.to_string())
        .fetch_one(pool)
        .await?;
    Ok(count.0)
}
