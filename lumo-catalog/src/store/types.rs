//! Course type and run type classifiers, plus currency reference data

use crate::models::{CourseRunType, CourseType, SeatType};
use lumo_common::{Error, Result};
use sqlx::{Row, SqlitePool};
use std::collections::BTreeSet;

/// Seed currencies and the default classifier set. Idempotent.
pub async fn seed_reference_data(pool: &SqlitePool) -> Result<()> {
    for (code, name) in [
        ("USD", "US Dollar"),
        ("EUR", "Euro"),
        ("GBP", "Pound Sterling"),
        ("AUD", "Australian Dollar"),
        ("CAD", "Canadian Dollar"),
        ("JPY", "Yen"),
        ("CNY", "Yuan Renminbi"),
        ("INR", "Indian Rupee"),
        ("BRL", "Brazilian Real"),
        ("MXN", "Mexican Peso"),
    ] {
        sqlx::query("INSERT OR IGNORE INTO currencies (code, name) VALUES (?, ?)")
            .bind(code)
            .bind(name)
            .execute(pool)
            .await?;
    }

    // Run types: (name, tracks, program_only)
    let run_types: &[(&str, &[SeatType], bool)] = &[
        ("audit", &[SeatType::Audit], false),
        ("honor", &[SeatType::Honor], false),
        ("verified-audit", &[SeatType::Verified, SeatType::Audit], false),
        ("professional", &[SeatType::Professional], false),
        (
            "credit-verified-audit",
            &[SeatType::Credit, SeatType::Verified, SeatType::Audit],
            false,
        ),
        ("masters", &[SeatType::Masters], true),
    ];
    for (name, tracks, program_only) in run_types {
        let tracks_json = serde_json::to_string(
            &tracks.iter().map(|t| t.as_str()).collect::<Vec<_>>(),
        )
        .unwrap_or_else(|_| "[]".to_string());
        sqlx::query(
            "INSERT OR IGNORE INTO course_run_types (name, tracks, program_only) VALUES (?, ?, ?)",
        )
        .bind(name)
        .bind(tracks_json)
        .bind(*program_only as i64)
        .execute(pool)
        .await?;
    }

    // Course types: (name, entitlement modes, allowed run types)
    let course_types: &[(&str, &[SeatType], &[&str])] = &[
        ("audit", &[], &["audit", "honor"]),
        (
            "verified-audit",
            &[SeatType::Verified],
            &["audit", "verified-audit", "honor"],
        ),
        ("professional", &[SeatType::Professional], &["professional"]),
        (
            "credit-verified-audit",
            &[SeatType::Verified],
            &["audit", "verified-audit", "credit-verified-audit", "honor"],
        ),
        ("masters", &[], &["masters"]),
    ];
    for (name, modes, run_type_names) in course_types {
        let modes_json = serde_json::to_string(
            &modes.iter().map(|m| m.as_str()).collect::<Vec<_>>(),
        )
        .unwrap_or_else(|_| "[]".to_string());
        sqlx::query("INSERT OR IGNORE INTO course_types (name, entitlement_modes) VALUES (?, ?)")
            .bind(name)
            .bind(modes_json)
            .execute(pool)
            .await?;
        for run_type_name in *run_type_names {
            sqlx::query(
                r#"
                INSERT OR IGNORE INTO course_type_run_types (course_type_id, course_run_type_id)
                SELECT ct.id, crt.id FROM course_types ct, course_run_types crt
                WHERE ct.name = ? AND crt.name = ?
                "#,
            )
            .bind(name)
            .bind(run_type_name)
            .execute(pool)
            .await?;
        }
    }

    Ok(())
}

fn parse_tracks(raw: &str) -> Vec<SeatType> {
    serde_json::from_str::<Vec<String>>(raw)
        .unwrap_or_default()
        .iter()
        .filter_map(|s| SeatType::parse(s))
        .collect()
}

fn map_run_type(row: &sqlx::sqlite::SqliteRow) -> CourseRunType {
    let tracks_raw: String = row.get("tracks");
    let program_only: i64 = row.get("program_only");
    CourseRunType {
        id: row.get("id"),
        name: row.get("name"),
        tracks: parse_tracks(&tracks_raw),
        program_only: program_only != 0,
    }
}

pub async fn list_run_types(pool: &SqlitePool) -> Result<Vec<CourseRunType>> {
    let rows = sqlx::query("SELECT * FROM course_run_types ORDER BY id")
        .fetch_all(pool)
        .await?;
    Ok(rows.iter().map(map_run_type).collect())
}

pub async fn get_run_type(pool: &SqlitePool, id: i64) -> Result<Option<CourseRunType>> {
    let row = sqlx::query("SELECT * FROM course_run_types WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row.as_ref().map(map_run_type))
}

pub async fn get_run_type_by_name(pool: &SqlitePool, name: &str) -> Result<CourseRunType> {
    let row = sqlx::query("SELECT * FROM course_run_types WHERE name = ?")
        .bind(name)
        .fetch_optional(pool)
        .await?;
    row.as_ref()
        .map(map_run_type)
        .ok_or_else(|| Error::NotFound(format!("course run type {name}")))
}

pub async fn list_course_types(pool: &SqlitePool) -> Result<Vec<CourseType>> {
    let rows = sqlx::query("SELECT * FROM course_types ORDER BY id")
        .fetch_all(pool)
        .await?;

    let mut out = Vec::with_capacity(rows.len());
    for row in &rows {
        let id: i64 = row.get("id");
        let modes_raw: String = row.get("entitlement_modes");
        let run_type_rows = sqlx::query(
            "SELECT course_run_type_id FROM course_type_run_types WHERE course_type_id = ?",
        )
        .bind(id)
        .fetch_all(pool)
        .await?;
        out.push(CourseType {
            id,
            name: row.get("name"),
            entitlement_modes: parse_tracks(&modes_raw),
            run_type_ids: run_type_rows.iter().map(|r| r.get(0)).collect(),
        });
    }
    Ok(out)
}

pub async fn get_course_type(pool: &SqlitePool, id: i64) -> Result<Option<CourseType>> {
    Ok(list_course_types(pool).await?.into_iter().find(|t| t.id == id))
}

/// The unique run type identified by an observed seat-type set, if any.
///
/// Free tracks may be absent from the seats; paid tracks must all be
/// present. Ambiguity (zero or several candidates) yields `None` and the
/// run keeps its empty type.
pub async fn match_run_type(
    pool: &SqlitePool,
    seat_types: &BTreeSet<SeatType>,
) -> Result<Option<CourseRunType>> {
    if seat_types.is_empty() {
        return Ok(None);
    }
    let mut candidates: Vec<CourseRunType> = list_run_types(pool)
        .await?
        .into_iter()
        .filter(|rt| rt.matches_seat_types(seat_types))
        .collect();
    if candidates.len() == 1 {
        Ok(Some(candidates.remove(0)))
    } else {
        Ok(None)
    }
}

/// The most specific course type admitting the given run type, if it is
/// unambiguous. Specificity = fewest allowed run types; a tie is treated
/// as ambiguous.
pub async fn match_course_type(
    pool: &SqlitePool,
    run_type_id: i64,
) -> Result<Option<CourseType>> {
    let mut candidates: Vec<CourseType> = list_course_types(pool)
        .await?
        .into_iter()
        .filter(|ct| ct.allows_run_type(run_type_id))
        .collect();
    candidates.sort_by_key(|ct| ct.run_type_ids.len());

    match candidates.len() {
        0 => Ok(None),
        1 => Ok(Some(candidates.remove(0))),
        _ => {
            if candidates[0].run_type_ids.len() < candidates[1].run_type_ids.len() {
                Ok(Some(candidates.remove(0)))
            } else {
                Ok(None)
            }
        }
    }
}

pub async fn currency_exists(pool: &SqlitePool, code: &str) -> Result<bool> {
    let row = sqlx::query("SELECT 1 FROM currencies WHERE code = ?")
        .bind(code)
        .fetch_optional(pool)
        .await?;
    Ok(row.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::fixture_pool;

    #[tokio::test]
    async fn seeds_are_idempotent() {
        let (pool, _) = fixture_pool().await;
        let before = list_run_types(&pool).await.unwrap().len();
        seed_reference_data(&pool).await.unwrap();
        let after = list_run_types(&pool).await.unwrap().len();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn verified_seat_matches_verified_audit_run_type() {
        let (pool, _) = fixture_pool().await;
        let seats: BTreeSet<_> = [SeatType::Verified].into_iter().collect();
        let matched = match_run_type(&pool, &seats).await.unwrap().unwrap();
        assert_eq!(matched.name, "verified-audit");
    }

    #[tokio::test]
    async fn verified_audit_run_type_identifies_verified_course_type() {
        let (pool, _) = fixture_pool().await;
        let run_type = get_run_type_by_name(&pool, "verified-audit").await.unwrap();
        let course_type = match_course_type(&pool, run_type.id).await.unwrap().unwrap();
        assert_eq!(course_type.name, "verified-audit");
    }

    #[tokio::test]
    async fn empty_seat_set_matches_nothing() {
        let (pool, _) = fixture_pool().await;
        let matched = match_run_type(&pool, &BTreeSet::new()).await.unwrap();
        assert!(matched.is_none());
    }

    #[tokio::test]
    async fn known_currencies_seeded() {
        let (pool, _) = fixture_pool().await;
        assert!(currency_exists(&pool, "USD").await.unwrap());
        assert!(!currency_exists(&pool, "XTS").await.unwrap());
    }
}
