//! Organization persistence

use crate::models::Organization;
use crate::store::history;
use lumo_common::Result;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// Loader-supplied organization fields
#[derive(Debug, Clone, Default)]
pub struct OrganizationInput {
    pub name: String,
    pub description: Option<String>,
    pub logo_image_url: Option<String>,
    pub marketing_url: Option<String>,
}

fn map_row(row: &sqlx::sqlite::SqliteRow) -> Organization {
    let uuid_str: String = row.get("uuid");
    Organization {
        id: row.get("id"),
        uuid: Uuid::parse_str(&uuid_str).unwrap_or_default(),
        partner_id: row.get("partner_id"),
        key: row.get("key"),
        name: row.get("name"),
        description: row.get("description"),
        logo_image_url: row.get("logo_image_url"),
        marketing_url: row.get("marketing_url"),
    }
}

/// Case-insensitive lookup by `(partner, key)`
pub async fn get_by_key(
    pool: &SqlitePool,
    partner_id: i64,
    key: &str,
) -> Result<Option<Organization>> {
    let row = sqlx::query(
        "SELECT * FROM organizations WHERE partner_id = ? AND key = ? COLLATE NOCASE",
    )
    .bind(partner_id)
    .bind(key)
    .fetch_optional(pool)
    .await?;
    Ok(row.as_ref().map(map_row))
}

/// Create or update, returning the stored row and whether it was created
pub async fn upsert(
    pool: &SqlitePool,
    partner_id: i64,
    key: &str,
    input: &OrganizationInput,
    actor: &str,
) -> Result<(Organization, bool)> {
    let existing = get_by_key(pool, partner_id, key).await?;
    let created = existing.is_none();

    // An upsert that changes nothing is skipped so repeated ingests are inert
    if let Some(org) = existing.as_ref() {
        if org.name == input.name
            && org.description == input.description
            && org.logo_image_url == input.logo_image_url
            && org.marketing_url == input.marketing_url
        {
            return Ok((org.clone(), false));
        }
    }

    match existing {
        Some(org) => {
            sqlx::query(
                r#"
                UPDATE organizations
                SET name = ?, description = ?, logo_image_url = ?, marketing_url = ?
                WHERE id = ?
                "#,
            )
            .bind(&input.name)
            .bind(&input.description)
            .bind(&input.logo_image_url)
            .bind(&input.marketing_url)
            .bind(org.id)
            .execute(pool)
            .await?;
        }
        None => {
            sqlx::query(
                r#"
                INSERT INTO organizations (uuid, partner_id, key, name, description, logo_image_url, marketing_url)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(partner_id)
            .bind(key)
            .bind(&input.name)
            .bind(&input.description)
            .bind(&input.logo_image_url)
            .bind(&input.marketing_url)
            .execute(pool)
            .await?;
        }
    }

    let stored = get_by_key(pool, partner_id, key)
        .await?
        .ok_or_else(|| lumo_common::Error::Internal("organization upsert lost row".to_string()))?;

    history::record(
        pool,
        history::entity::ORGANIZATIONS,
        stored.uuid,
        if created { "created" } else { "updated" },
        actor,
        serde_json::to_value(&stored).unwrap_or_default(),
    )
    .await?;

    Ok((stored, created))
}

/// Create-if-missing with only the key set, used when a course references
/// an organization the organizations loader has not seen yet
pub async fn get_or_create(
    pool: &SqlitePool,
    partner_id: i64,
    key: &str,
    actor: &str,
) -> Result<(Organization, bool)> {
    if let Some(org) = get_by_key(pool, partner_id, key).await? {
        return Ok((org, false));
    }
    let input = OrganizationInput {
        name: key.to_string(),
        ..OrganizationInput::default()
    };
    upsert(pool, partner_id, key, &input, actor).await
}

pub async fn get_ids_for_keys(
    pool: &SqlitePool,
    partner_id: i64,
    keys: &[String],
) -> Result<Vec<(String, i64)>> {
    let mut found = Vec::with_capacity(keys.len());
    for key in keys {
        if let Some(org) = get_by_key(pool, partner_id, key).await? {
            found.push((key.clone(), org.id));
        }
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::fixture_pool;

    #[tokio::test]
    async fn upsert_creates_then_updates() {
        let (pool, partner) = fixture_pool().await;

        let input = OrganizationInput {
            name: "MIT Open Learning".to_string(),
            ..OrganizationInput::default()
        };
        let (org, created) = upsert(&pool, partner.id, "MITx", &input, "ingest")
            .await
            .unwrap();
        assert!(created);
        assert_eq!(org.key, "MITx");

        let input = OrganizationInput {
            name: "MIT".to_string(),
            description: Some("Cambridge, MA".to_string()),
            ..OrganizationInput::default()
        };
        let (org2, created2) = upsert(&pool, partner.id, "MITx", &input, "ingest")
            .await
            .unwrap();
        assert!(!created2);
        assert_eq!(org2.id, org.id);
        assert_eq!(org2.name, "MIT");

        let history_rows =
            history::count_for_record(&pool, history::entity::ORGANIZATIONS, org.uuid)
                .await
                .unwrap();
        assert_eq!(history_rows, 2);
    }

    #[tokio::test]
    async fn lookup_is_case_insensitive() {
        let (pool, partner) = fixture_pool().await;
        let input = OrganizationInput {
            name: "Harvard".to_string(),
            ..OrganizationInput::default()
        };
        upsert(&pool, partner.id, "HarvardX", &input, "ingest")
            .await
            .unwrap();

        let found = get_by_key(&pool, partner.id, "harvardx").await.unwrap();
        assert!(found.is_some());
    }
}
