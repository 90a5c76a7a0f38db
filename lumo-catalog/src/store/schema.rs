//! Catalog schema creation
//!
//! Idempotent `CREATE TABLE IF NOT EXISTS` statements, one function per
//! table, run at startup. Draft twins live in the same table as official
//! rows: `draft` discriminates and `draft_version_of` points from a draft
//! to its official counterpart. Each editorially relevant entity gets an
//! append-only history table.

use lumo_common::Result;
use sqlx::SqlitePool;
use tracing::info;

/// Create all catalog tables and seed reference data
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    create_partners_table(pool).await?;
    create_currencies_table(pool).await?;
    create_organizations_table(pool).await?;
    create_images_table(pool).await?;
    create_videos_table(pool).await?;
    create_course_run_types_table(pool).await?;
    create_course_types_table(pool).await?;
    create_courses_table(pool).await?;
    create_course_runs_table(pool).await?;
    create_seats_table(pool).await?;
    create_course_entitlements_table(pool).await?;
    create_programs_table(pool).await?;
    create_curricula_table(pool).await?;
    create_pathways_table(pool).await?;
    create_translations_table(pool).await?;
    create_history_tables(pool).await?;

    crate::store::types::seed_reference_data(pool).await?;

    info!("Catalog schema initialized");
    Ok(())
}

async fn create_partners_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS partners (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            short_code TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL DEFAULT '',
            courses_api_url TEXT NOT NULL DEFAULT '',
            ecommerce_api_url TEXT NOT NULL DEFAULT '',
            programs_api_url TEXT NOT NULL DEFAULT '',
            organizations_api_url TEXT NOT NULL DEFAULT '',
            token_url TEXT NOT NULL DEFAULT '',
            oauth_client_id TEXT NOT NULL DEFAULT '',
            oauth_client_secret TEXT NOT NULL DEFAULT ''
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_currencies_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS currencies (
            code TEXT PRIMARY KEY,
            name TEXT NOT NULL DEFAULT ''
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_organizations_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS organizations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            uuid TEXT NOT NULL,
            partner_id INTEGER NOT NULL REFERENCES partners(id),
            key TEXT NOT NULL,
            name TEXT NOT NULL DEFAULT '',
            description TEXT,
            logo_image_url TEXT,
            marketing_url TEXT,
            UNIQUE(partner_id, key)
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_images_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS images (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            src TEXT NOT NULL UNIQUE,
            width INTEGER,
            height INTEGER,
            data BLOB
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_videos_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS videos (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            src TEXT NOT NULL UNIQUE,
            image_id INTEGER REFERENCES images(id)
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_course_run_types_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS course_run_types (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            tracks TEXT NOT NULL DEFAULT '[]',
            program_only INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_course_types_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS course_types (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            entitlement_modes TEXT NOT NULL DEFAULT '[]'
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS course_type_run_types (
            course_type_id INTEGER NOT NULL REFERENCES course_types(id) ON DELETE CASCADE,
            course_run_type_id INTEGER NOT NULL REFERENCES course_run_types(id) ON DELETE CASCADE,
            UNIQUE(course_type_id, course_run_type_id)
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_courses_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS courses (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            uuid TEXT NOT NULL,
            partner_id INTEGER NOT NULL REFERENCES partners(id),
            key TEXT NOT NULL,
            title TEXT NOT NULL DEFAULT '',
            short_description TEXT,
            full_description TEXT,
            image_url TEXT,
            level TEXT,
            course_type_id INTEGER REFERENCES course_types(id),
            canonical_course_run_id INTEGER,
            draft INTEGER NOT NULL DEFAULT 0,
            draft_version_of INTEGER REFERENCES courses(id),
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE(partner_id, key, draft)
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_course_runs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS course_runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            uuid TEXT NOT NULL,
            course_id INTEGER NOT NULL REFERENCES courses(id),
            key TEXT NOT NULL,
            external_key TEXT,
            status TEXT NOT NULL DEFAULT 'unpublished',
            start TEXT,
            "end" TEXT,
            enrollment_start TEXT,
            enrollment_end TEXT,
            announcement TEXT,
            go_live_date TEXT,
            pacing_type TEXT,
            language TEXT,
            hidden INTEGER NOT NULL DEFAULT 0,
            license TEXT NOT NULL DEFAULT '',
            slug TEXT,
            title_override TEXT,
            short_description_override TEXT,
            mobile_available INTEGER NOT NULL DEFAULT 0,
            video_id INTEGER REFERENCES videos(id),
            min_effort INTEGER,
            max_effort INTEGER,
            weeks_to_complete INTEGER,
            course_run_type_id INTEGER REFERENCES course_run_types(id),
            draft INTEGER NOT NULL DEFAULT 0,
            draft_version_of INTEGER REFERENCES course_runs(id),
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE(key, draft)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_course_runs_course ON course_runs(course_id)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_course_runs_external_key ON course_runs(external_key)",
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_seats_table(pool: &SqlitePool) -> Result<()> {
    // credit_provider uses '' rather than NULL so the composite uniqueness
    // constraint holds (SQLite treats NULLs as distinct)
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS seats (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            course_run_id INTEGER NOT NULL REFERENCES course_runs(id) ON DELETE CASCADE,
            type TEXT NOT NULL,
            credit_provider TEXT NOT NULL DEFAULT '',
            currency TEXT NOT NULL REFERENCES currencies(code),
            price REAL NOT NULL DEFAULT 0,
            upgrade_deadline TEXT,
            sku TEXT,
            bulk_sku TEXT,
            credit_hours INTEGER,
            UNIQUE(course_run_id, type, credit_provider, currency)
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_course_entitlements_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS course_entitlements (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            course_id INTEGER NOT NULL REFERENCES courses(id) ON DELETE CASCADE,
            mode TEXT NOT NULL,
            price REAL NOT NULL DEFAULT 0,
            currency TEXT NOT NULL,
            sku TEXT,
            expires TEXT,
            UNIQUE(course_id, mode)
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_programs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS programs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            uuid TEXT NOT NULL,
            partner_id INTEGER NOT NULL REFERENCES partners(id),
            title TEXT NOT NULL DEFAULT '',
            subtitle TEXT,
            type TEXT NOT NULL DEFAULT '',
            status TEXT NOT NULL DEFAULT 'unpublished',
            marketing_slug TEXT,
            banner_image_url TEXT,
            banner_image_id INTEGER REFERENCES images(id),
            UNIQUE(partner_id, uuid)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS program_courses (
            program_id INTEGER NOT NULL REFERENCES programs(id) ON DELETE CASCADE,
            course_id INTEGER NOT NULL REFERENCES courses(id),
            position INTEGER NOT NULL DEFAULT 0,
            UNIQUE(program_id, course_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS program_excluded_course_runs (
            program_id INTEGER NOT NULL REFERENCES programs(id) ON DELETE CASCADE,
            course_run_id INTEGER NOT NULL REFERENCES course_runs(id),
            UNIQUE(program_id, course_run_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS program_organizations (
            program_id INTEGER NOT NULL REFERENCES programs(id) ON DELETE CASCADE,
            organization_id INTEGER NOT NULL REFERENCES organizations(id),
            UNIQUE(program_id, organization_id)
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_curricula_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS curricula (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            uuid TEXT NOT NULL UNIQUE,
            program_id INTEGER NOT NULL REFERENCES programs(id) ON DELETE CASCADE,
            name TEXT NOT NULL DEFAULT ''
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS curriculum_course_memberships (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            curriculum_id INTEGER NOT NULL REFERENCES curricula(id) ON DELETE CASCADE,
            course_id INTEGER NOT NULL REFERENCES courses(id),
            UNIQUE(curriculum_id, course_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS curriculum_program_memberships (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            curriculum_id INTEGER NOT NULL REFERENCES curricula(id) ON DELETE CASCADE,
            program_id INTEGER NOT NULL REFERENCES programs(id),
            UNIQUE(curriculum_id, program_id)
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_pathways_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pathways (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            uuid TEXT NOT NULL UNIQUE,
            partner_id INTEGER NOT NULL REFERENCES partners(id),
            name TEXT NOT NULL DEFAULT '',
            status TEXT NOT NULL DEFAULT 'unpublished'
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pathway_programs (
            pathway_id INTEGER NOT NULL REFERENCES pathways(id) ON DELETE CASCADE,
            program_id INTEGER NOT NULL REFERENCES programs(id),
            UNIQUE(pathway_id, program_id)
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_translations_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS translations (
            record_kind TEXT NOT NULL,
            record_uuid TEXT NOT NULL,
            language TEXT NOT NULL,
            field TEXT NOT NULL,
            value TEXT NOT NULL,
            UNIQUE(record_kind, record_uuid, language, field)
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// Append-only history: every change with actor and timestamp
async fn create_history_tables(pool: &SqlitePool) -> Result<()> {
    for entity in [
        "organizations",
        "courses",
        "course_runs",
        "seats",
        "course_entitlements",
        "programs",
    ] {
        let ddl = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {entity}_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                record_uuid TEXT NOT NULL,
                action TEXT NOT NULL,
                actor TEXT NOT NULL,
                changed_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                snapshot TEXT NOT NULL
            )
            "#
        );
        sqlx::query(&ddl).execute(pool).await?;
    }
    Ok(())
}
