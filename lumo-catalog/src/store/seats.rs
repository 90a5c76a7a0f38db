//! Seat and entitlement persistence
//!
//! Seats are owned by the e-commerce reconciler: it upserts what the
//! product feed names and removes what disappeared, so these functions
//! favor composite-key addressing over row ids.

use crate::models::{CourseEntitlement, Seat, SeatType};
use crate::store::history;
use lumo_common::{Error, Result};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// Composite seat identity within a run
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SeatKey {
    pub seat_type: SeatType,
    pub credit_provider: String,
    pub currency: String,
}

/// Loader-supplied seat fields
#[derive(Debug, Clone)]
pub struct SeatInput {
    pub seat_type: SeatType,
    pub credit_provider: Option<String>,
    pub currency: String,
    pub price: f64,
    pub upgrade_deadline: Option<chrono::DateTime<chrono::Utc>>,
    pub sku: Option<String>,
    pub credit_hours: Option<i64>,
}

fn map_seat(row: &sqlx::sqlite::SqliteRow) -> Seat {
    let type_str: String = row.get("type");
    let provider: String = row.get("credit_provider");
    Seat {
        id: row.get("id"),
        course_run_id: row.get("course_run_id"),
        seat_type: SeatType::parse(&type_str).unwrap_or(SeatType::Audit),
        credit_provider: if provider.is_empty() { None } else { Some(provider) },
        currency: row.get("currency"),
        price: row.get("price"),
        upgrade_deadline: row.get("upgrade_deadline"),
        sku: row.get("sku"),
        bulk_sku: row.get("bulk_sku"),
        credit_hours: row.get("credit_hours"),
    }
}

pub async fn list_for_run(pool: &SqlitePool, course_run_id: i64) -> Result<Vec<Seat>> {
    let rows = sqlx::query("SELECT * FROM seats WHERE course_run_id = ? ORDER BY type")
        .bind(course_run_id)
        .fetch_all(pool)
        .await?;
    Ok(rows.iter().map(map_seat).collect())
}

/// Upsert a seat by `(run, type, credit_provider, currency)`, returning the
/// stored seat and whether it was created. History is keyed by the owning
/// run's uuid.
pub async fn upsert(
    pool: &SqlitePool,
    course_run_id: i64,
    run_uuid: Uuid,
    input: &SeatInput,
    actor: &str,
) -> Result<(Seat, bool)> {
    let provider = input.credit_provider.clone().unwrap_or_default();

    let existing = sqlx::query(
        "SELECT * FROM seats WHERE course_run_id = ? AND type = ? AND credit_provider = ? AND currency = ?",
    )
    .bind(course_run_id)
    .bind(input.seat_type.as_str())
    .bind(&provider)
    .bind(&input.currency)
    .fetch_optional(pool)
    .await?;
    let created = existing.is_none();

    // Skip upserts that change nothing so repeated ingests are inert
    if let Some(row) = existing.as_ref() {
        let current = map_seat(row);
        if current.price == input.price
            && current.upgrade_deadline == input.upgrade_deadline
            && current.sku == input.sku
            && current.credit_hours == input.credit_hours
        {
            return Ok((current, false));
        }
    }

    sqlx::query(
        r#"
        INSERT INTO seats (course_run_id, type, credit_provider, currency, price, upgrade_deadline, sku, credit_hours)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(course_run_id, type, credit_provider, currency) DO UPDATE SET
            price = excluded.price,
            upgrade_deadline = excluded.upgrade_deadline,
            sku = excluded.sku,
            credit_hours = excluded.credit_hours
        "#,
    )
    .bind(course_run_id)
    .bind(input.seat_type.as_str())
    .bind(&provider)
    .bind(&input.currency)
    .bind(input.price)
    .bind(input.upgrade_deadline)
    .bind(&input.sku)
    .bind(input.credit_hours)
    .execute(pool)
    .await?;

    let row = sqlx::query(
        "SELECT * FROM seats WHERE course_run_id = ? AND type = ? AND credit_provider = ? AND currency = ?",
    )
    .bind(course_run_id)
    .bind(input.seat_type.as_str())
    .bind(&provider)
    .bind(&input.currency)
    .fetch_one(pool)
    .await?;
    let seat = map_seat(&row);

    history::record(
        pool,
        history::entity::SEATS,
        run_uuid,
        if created { "created" } else { "updated" },
        actor,
        serde_json::to_value(&seat).unwrap_or_default(),
    )
    .await?;

    Ok((seat, created))
}

/// Persist a changed upgrade deadline
pub async fn set_upgrade_deadline(
    pool: &SqlitePool,
    seat_id: i64,
    deadline: Option<chrono::DateTime<chrono::Utc>>,
) -> Result<()> {
    sqlx::query("UPDATE seats SET upgrade_deadline = ? WHERE id = ?")
        .bind(deadline)
        .bind(seat_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Record the bulk-purchase SKU on the seat of the matching type
pub async fn set_bulk_sku(
    pool: &SqlitePool,
    course_run_id: i64,
    seat_type: SeatType,
    bulk_sku: &str,
) -> Result<bool> {
    let result = sqlx::query("UPDATE seats SET bulk_sku = ? WHERE course_run_id = ? AND type = ?")
        .bind(bulk_sku)
        .bind(course_run_id)
        .bind(seat_type.as_str())
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Delete seats on a run whose composite key is not in `keep`; returns the
/// number removed
pub async fn delete_missing(
    pool: &SqlitePool,
    course_run_id: i64,
    run_uuid: Uuid,
    keep: &[SeatKey],
    actor: &str,
) -> Result<u64> {
    let mut removed = 0;
    for seat in list_for_run(pool, course_run_id).await? {
        let key = SeatKey {
            seat_type: seat.seat_type,
            credit_provider: seat.credit_provider.clone().unwrap_or_default(),
            currency: seat.currency.clone(),
        };
        if keep.contains(&key) {
            continue;
        }
        sqlx::query("DELETE FROM seats WHERE id = ?")
            .bind(seat.id)
            .execute(pool)
            .await?;
        history::record(
            pool,
            history::entity::SEATS,
            run_uuid,
            "deleted",
            actor,
            serde_json::to_value(&seat).unwrap_or_default(),
        )
        .await?;
        removed += 1;
    }
    Ok(removed)
}

pub async fn count_all(pool: &SqlitePool) -> Result<i64> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM seats").fetch_one(pool).await?;
    Ok(row.0)
}

fn map_entitlement(row: &sqlx::sqlite::SqliteRow) -> CourseEntitlement {
    let mode_str: String = row.get("mode");
    CourseEntitlement {
        id: row.get("id"),
        course_id: row.get("course_id"),
        mode: SeatType::parse(&mode_str).unwrap_or(SeatType::Verified),
        price: row.get("price"),
        currency: row.get("currency"),
        sku: row.get("sku"),
        expires: row.get("expires"),
    }
}

pub async fn list_entitlements_for_course(
    pool: &SqlitePool,
    course_id: i64,
) -> Result<Vec<CourseEntitlement>> {
    let rows = sqlx::query("SELECT * FROM course_entitlements WHERE course_id = ? ORDER BY mode")
        .bind(course_id)
        .fetch_all(pool)
        .await?;
    Ok(rows.iter().map(map_entitlement).collect())
}

/// Upsert an entitlement by `(course, mode)`
pub async fn upsert_entitlement(
    pool: &SqlitePool,
    course_id: i64,
    course_uuid: Uuid,
    mode: SeatType,
    price: f64,
    currency: &str,
    sku: Option<&str>,
    expires: Option<chrono::DateTime<chrono::Utc>>,
    actor: &str,
) -> Result<(CourseEntitlement, bool)> {
    let existing = sqlx::query("SELECT * FROM course_entitlements WHERE course_id = ? AND mode = ?")
        .bind(course_id)
        .bind(mode.as_str())
        .fetch_optional(pool)
        .await?;
    let created = existing.is_none();

    if let Some(row) = existing.as_ref() {
        let current = map_entitlement(row);
        if current.price == price
            && current.currency == currency
            && current.sku.as_deref() == sku
            && current.expires == expires
        {
            return Ok((current, false));
        }
    }

    sqlx::query(
        r#"
        INSERT INTO course_entitlements (course_id, mode, price, currency, sku, expires)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(course_id, mode) DO UPDATE SET
            price = excluded.price,
            currency = excluded.currency,
            sku = excluded.sku,
            expires = excluded.expires
        "#,
    )
    .bind(course_id)
    .bind(mode.as_str())
    .bind(price)
    .bind(currency)
    .bind(sku)
    .bind(expires)
    .execute(pool)
    .await?;

    let row = sqlx::query("SELECT * FROM course_entitlements WHERE course_id = ? AND mode = ?")
        .bind(course_id)
        .bind(mode.as_str())
        .fetch_one(pool)
        .await?;
    let entitlement = map_entitlement(&row);

    history::record(
        pool,
        history::entity::COURSE_ENTITLEMENTS,
        course_uuid,
        if created { "created" } else { "updated" },
        actor,
        serde_json::to_value(&entitlement).unwrap_or_default(),
    )
    .await?;

    Ok((entitlement, created))
}

/// Delete entitlements whose SKU did not reappear in this ingest
pub async fn delete_entitlements_not_in(pool: &SqlitePool, skus: &[String]) -> Result<u64> {
    let rows = sqlx::query("SELECT id, sku FROM course_entitlements")
        .fetch_all(pool)
        .await?;
    let mut removed = 0;
    for row in &rows {
        let sku: Option<String> = row.get("sku");
        if sku.as_ref().map(|s| skus.contains(s)).unwrap_or(false) {
            continue;
        }
        let id: i64 = row.get("id");
        sqlx::query("DELETE FROM course_entitlements WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;
        removed += 1;
    }
    Ok(removed)
}

pub async fn count_entitlements(pool: &SqlitePool) -> Result<i64> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM course_entitlements")
        .fetch_one(pool)
        .await?;
    Ok(row.0)
}

/// Seat currency must exist in the local currency table before upserting
pub async fn ensure_currency(pool: &SqlitePool, code: &str) -> Result<()> {
    if crate::store::types::currency_exists(pool, code).await? {
        Ok(())
    } else {
        Err(Error::NotFound(format!("currency {code}")))
    }
}
