//! Partner persistence

use crate::models::Partner;
use lumo_common::Result;
use sqlx::{Row, SqlitePool};

fn map_row(row: &sqlx::sqlite::SqliteRow) -> Partner {
    Partner {
        id: row.get("id"),
        short_code: row.get("short_code"),
        name: row.get("name"),
        courses_api_url: row.get("courses_api_url"),
        ecommerce_api_url: row.get("ecommerce_api_url"),
        programs_api_url: row.get("programs_api_url"),
        organizations_api_url: row.get("organizations_api_url"),
        token_url: row.get("token_url"),
        oauth_client_id: row.get("oauth_client_id"),
        oauth_client_secret: row.get("oauth_client_secret"),
    }
}

pub async fn get_by_code(pool: &SqlitePool, short_code: &str) -> Result<Option<Partner>> {
    let row = sqlx::query("SELECT * FROM partners WHERE short_code = ?")
        .bind(short_code)
        .fetch_optional(pool)
        .await?;
    Ok(row.as_ref().map(map_row))
}

pub async fn list_all(pool: &SqlitePool) -> Result<Vec<Partner>> {
    let rows = sqlx::query("SELECT * FROM partners ORDER BY short_code")
        .fetch_all(pool)
        .await?;
    Ok(rows.iter().map(map_row).collect())
}

/// Create or update a partner by short code, returning the stored row
pub async fn upsert(pool: &SqlitePool, partner: &Partner) -> Result<Partner> {
    sqlx::query(
        r#"
        INSERT INTO partners (
            short_code, name, courses_api_url, ecommerce_api_url,
            programs_api_url, organizations_api_url, token_url,
            oauth_client_id, oauth_client_secret
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(short_code) DO UPDATE SET
            name = excluded.name,
            courses_api_url = excluded.courses_api_url,
            ecommerce_api_url = excluded.ecommerce_api_url,
            programs_api_url = excluded.programs_api_url,
            organizations_api_url = excluded.organizations_api_url,
            token_url = excluded.token_url,
            oauth_client_id = excluded.oauth_client_id,
            oauth_client_secret = excluded.oauth_client_secret
        "#,
    )
    .bind(&partner.short_code)
    .bind(&partner.name)
    .bind(&partner.courses_api_url)
    .bind(&partner.ecommerce_api_url)
    .bind(&partner.programs_api_url)
    .bind(&partner.organizations_api_url)
    .bind(&partner.token_url)
    .bind(&partner.oauth_client_id)
    .bind(&partner.oauth_client_secret)
    .execute(pool)
    .await?;

    get_by_code(pool, &partner.short_code)
        .await?
        .ok_or_else(|| lumo_common::Error::Internal("partner upsert lost row".to_string()))
}
