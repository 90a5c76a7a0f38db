//! Translated field values
//!
//! Translations live in a side table keyed by
//! `(record_kind, record_uuid, language, field)`; the projection layer
//! asks for a field in the request's language and falls back to the
//! record's stored value when no translation exists.

use lumo_common::events::RecordKind;
use lumo_common::Result;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

pub async fn set_translation(
    pool: &SqlitePool,
    kind: RecordKind,
    record_uuid: Uuid,
    language: &str,
    field: &str,
    value: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO translations (record_kind, record_uuid, language, field, value)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(record_kind, record_uuid, language, field) DO UPDATE SET
            value = excluded.value
        "#,
    )
    .bind(kind.as_str())
    .bind(record_uuid.to_string())
    .bind(language)
    .bind(field)
    .bind(value)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_translation(
    pool: &SqlitePool,
    kind: RecordKind,
    record_uuid: Uuid,
    language: &str,
    field: &str,
) -> Result<Option<String>> {
    let row = sqlx::query(
        r#"
        SELECT value FROM translations
        WHERE record_kind = ? AND record_uuid = ? AND language = ? AND field = ?
        "#,
    )
    .bind(kind.as_str())
    .bind(record_uuid.to_string())
    .bind(language)
    .bind(field)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|r| r.get(0)))
}

/// A field in the requested language, falling back to the stored value
pub async fn translated_or(
    pool: &SqlitePool,
    kind: RecordKind,
    record_uuid: Uuid,
    language: &str,
    field: &str,
    fallback: &str,
) -> Result<String> {
    Ok(get_translation(pool, kind, record_uuid, language, field)
        .await?
        .unwrap_or_else(|| fallback.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::courses::{self, NewCourse};
    use crate::store::test_support::fixture_pool;

    #[tokio::test]
    async fn translation_overrides_fallback_per_language() {
        let (pool, partner) = fixture_pool().await;
        let course = courses::create(
            &pool,
            &NewCourse {
                partner_id: partner.id,
                key: "MITx+6.00x".to_string(),
                title: "Intro".to_string(),
                ..Default::default()
            },
            "editor",
        )
        .await
        .unwrap();

        set_translation(&pool, RecordKind::Course, course.uuid, "es", "title", "Introducción")
            .await
            .unwrap();

        let spanish = translated_or(
            &pool, RecordKind::Course, course.uuid, "es", "title", &course.title,
        )
        .await
        .unwrap();
        assert_eq!(spanish, "Introducción");

        let french = translated_or(
            &pool, RecordKind::Course, course.uuid, "fr", "title", &course.title,
        )
        .await
        .unwrap();
        assert_eq!(french, "Intro");

        // Updating a translation replaces it
        set_translation(&pool, RecordKind::Course, course.uuid, "es", "title", "Introducción v2")
            .await
            .unwrap();
        let spanish = get_translation(&pool, RecordKind::Course, course.uuid, "es", "title")
            .await
            .unwrap();
        assert_eq!(spanish.as_deref(), Some("Introducción v2"));
    }
}
