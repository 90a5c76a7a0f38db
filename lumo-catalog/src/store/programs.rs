//! Program, curriculum and pathway persistence

use crate::models::{Curriculum, CurriculumCourseMembership, Pathway, PathwayStatus, Program, ProgramStatus};
use crate::store::history;
use lumo_common::{Error, Result};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// Loader-supplied program fields
#[derive(Debug, Clone)]
pub struct ProgramInput {
    pub uuid: Uuid,
    pub title: String,
    pub subtitle: Option<String>,
    pub program_type: String,
    pub status: ProgramStatus,
    pub marketing_slug: Option<String>,
    pub banner_image_url: Option<String>,
}

fn map_program(row: &sqlx::sqlite::SqliteRow) -> Program {
    let uuid_str: String = row.get("uuid");
    let status_str: String = row.get("status");
    Program {
        id: row.get("id"),
        uuid: Uuid::parse_str(&uuid_str).unwrap_or_default(),
        partner_id: row.get("partner_id"),
        title: row.get("title"),
        subtitle: row.get("subtitle"),
        program_type: row.get("type"),
        status: ProgramStatus::parse(&status_str).unwrap_or(ProgramStatus::Unpublished),
        marketing_slug: row.get("marketing_slug"),
        banner_image_url: row.get("banner_image_url"),
        banner_image_id: row.get("banner_image_id"),
    }
}

pub async fn get_by_uuid(
    pool: &SqlitePool,
    partner_id: i64,
    uuid: Uuid,
) -> Result<Option<Program>> {
    let row = sqlx::query("SELECT * FROM programs WHERE partner_id = ? AND uuid = ?")
        .bind(partner_id)
        .bind(uuid.to_string())
        .fetch_optional(pool)
        .await?;
    Ok(row.as_ref().map(map_program))
}

pub async fn get_by_id(pool: &SqlitePool, id: i64) -> Result<Option<Program>> {
    let row = sqlx::query("SELECT * FROM programs WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row.as_ref().map(map_program))
}

/// Upsert by `(partner, uuid)`, returning the stored row and whether it
/// was created
pub async fn upsert(
    pool: &SqlitePool,
    partner_id: i64,
    input: &ProgramInput,
    actor: &str,
) -> Result<(Program, bool)> {
    let existing = get_by_uuid(pool, partner_id, input.uuid).await?;
    let created = existing.is_none();

    // Skip upserts that change nothing so repeated ingests are inert
    if let Some(program) = existing.as_ref() {
        if program.title == input.title
            && program.subtitle == input.subtitle
            && program.program_type == input.program_type
            && program.status == input.status
            && program.marketing_slug == input.marketing_slug
            && program.banner_image_url == input.banner_image_url
        {
            return Ok((program.clone(), false));
        }
    }

    sqlx::query(
        r#"
        INSERT INTO programs (uuid, partner_id, title, subtitle, type, status, marketing_slug, banner_image_url)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(partner_id, uuid) DO UPDATE SET
            title = excluded.title,
            subtitle = excluded.subtitle,
            type = excluded.type,
            status = excluded.status,
            marketing_slug = excluded.marketing_slug,
            banner_image_url = excluded.banner_image_url
        "#,
    )
    .bind(input.uuid.to_string())
    .bind(partner_id)
    .bind(&input.title)
    .bind(&input.subtitle)
    .bind(&input.program_type)
    .bind(input.status.as_str())
    .bind(&input.marketing_slug)
    .bind(&input.banner_image_url)
    .execute(pool)
    .await?;

    let program = get_by_uuid(pool, partner_id, input.uuid)
        .await?
        .ok_or_else(|| Error::Internal("program upsert lost row".to_string()))?;

    history::record(
        pool,
        history::entity::PROGRAMS,
        program.uuid,
        if created { "created" } else { "updated" },
        actor,
        serde_json::to_value(&program).unwrap_or_default(),
    )
    .await?;

    Ok((program, created))
}

/// Replace the program's course set
pub async fn set_courses(pool: &SqlitePool, program_id: i64, course_ids: &[i64]) -> Result<()> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM program_courses WHERE program_id = ?")
        .bind(program_id)
        .execute(&mut *tx)
        .await?;
    for (position, course_id) in course_ids.iter().enumerate() {
        sqlx::query("INSERT INTO program_courses (program_id, course_id, position) VALUES (?, ?, ?)")
            .bind(program_id)
            .bind(course_id)
            .bind(position as i64)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    Ok(())
}

pub async fn course_ids_for_program(pool: &SqlitePool, program_id: i64) -> Result<Vec<i64>> {
    let rows = sqlx::query(
        "SELECT course_id FROM program_courses WHERE program_id = ? ORDER BY position",
    )
    .bind(program_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(|r| r.get(0)).collect())
}

/// Replace the program's excluded-run set
pub async fn set_excluded_runs(pool: &SqlitePool, program_id: i64, run_ids: &[i64]) -> Result<()> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM program_excluded_course_runs WHERE program_id = ?")
        .bind(program_id)
        .execute(&mut *tx)
        .await?;
    for run_id in run_ids {
        sqlx::query(
            "INSERT INTO program_excluded_course_runs (program_id, course_run_id) VALUES (?, ?)",
        )
        .bind(program_id)
        .bind(run_id)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
}

pub async fn excluded_run_ids_for_program(pool: &SqlitePool, program_id: i64) -> Result<Vec<i64>> {
    let rows = sqlx::query(
        "SELECT course_run_id FROM program_excluded_course_runs WHERE program_id = ?",
    )
    .bind(program_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(|r| r.get(0)).collect())
}

/// Replace the program's authoring organization set
pub async fn set_organizations(pool: &SqlitePool, program_id: i64, org_ids: &[i64]) -> Result<()> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM program_organizations WHERE program_id = ?")
        .bind(program_id)
        .execute(&mut *tx)
        .await?;
    for org_id in org_ids {
        sqlx::query(
            "INSERT INTO program_organizations (program_id, organization_id) VALUES (?, ?)",
        )
        .bind(program_id)
        .bind(org_id)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
}

pub async fn organization_ids_for_program(pool: &SqlitePool, program_id: i64) -> Result<Vec<i64>> {
    let rows = sqlx::query(
        "SELECT organization_id FROM program_organizations WHERE program_id = ?",
    )
    .bind(program_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(|r| r.get(0)).collect())
}

/// Store downloaded banner bytes, returning the image row id
pub async fn store_banner_image(
    pool: &SqlitePool,
    program_id: i64,
    src: &str,
    width: i64,
    height: i64,
    data: &[u8],
) -> Result<i64> {
    sqlx::query(
        r#"
        INSERT INTO images (src, width, height, data) VALUES (?, ?, ?, ?)
        ON CONFLICT(src) DO UPDATE SET width = excluded.width, height = excluded.height, data = excluded.data
        "#,
    )
    .bind(src)
    .bind(width)
    .bind(height)
    .bind(data)
    .execute(pool)
    .await?;

    let row = sqlx::query("SELECT id FROM images WHERE src = ?")
        .bind(src)
        .fetch_one(pool)
        .await?;
    let image_id: i64 = row.get(0);

    sqlx::query("UPDATE programs SET banner_image_id = ? WHERE id = ?")
        .bind(image_id)
        .bind(program_id)
        .execute(pool)
        .await?;

    Ok(image_id)
}

fn map_curriculum(row: &sqlx::sqlite::SqliteRow) -> Curriculum {
    let uuid_str: String = row.get("uuid");
    Curriculum {
        id: row.get("id"),
        uuid: Uuid::parse_str(&uuid_str).unwrap_or_default(),
        program_id: row.get("program_id"),
        name: row.get("name"),
    }
}

pub async fn create_curriculum(
    pool: &SqlitePool,
    program_id: i64,
    name: &str,
) -> Result<Curriculum> {
    let uuid = Uuid::new_v4();
    let result = sqlx::query("INSERT INTO curricula (uuid, program_id, name) VALUES (?, ?, ?)")
        .bind(uuid.to_string())
        .bind(program_id)
        .bind(name)
        .execute(pool)
        .await?;
    let row = sqlx::query("SELECT * FROM curricula WHERE id = ?")
        .bind(result.last_insert_rowid())
        .fetch_one(pool)
        .await?;
    Ok(map_curriculum(&row))
}

pub async fn curricula_for_program(pool: &SqlitePool, program_id: i64) -> Result<Vec<Curriculum>> {
    let rows = sqlx::query("SELECT * FROM curricula WHERE program_id = ? ORDER BY id")
        .bind(program_id)
        .fetch_all(pool)
        .await?;
    Ok(rows.iter().map(map_curriculum).collect())
}

/// Curricula whose membership set contains the course
pub async fn curricula_containing_course(
    pool: &SqlitePool,
    course_id: i64,
) -> Result<Vec<Curriculum>> {
    let rows = sqlx::query(
        r#"
        SELECT c.* FROM curricula c
        JOIN curriculum_course_memberships m ON m.curriculum_id = c.id
        WHERE m.course_id = ?
        "#,
    )
    .bind(course_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(map_curriculum).collect())
}

pub async fn add_course_membership(
    pool: &SqlitePool,
    curriculum_id: i64,
    course_id: i64,
) -> Result<CurriculumCourseMembership> {
    sqlx::query(
        "INSERT OR IGNORE INTO curriculum_course_memberships (curriculum_id, course_id) VALUES (?, ?)",
    )
    .bind(curriculum_id)
    .bind(course_id)
    .execute(pool)
    .await?;
    let row = sqlx::query(
        "SELECT * FROM curriculum_course_memberships WHERE curriculum_id = ? AND course_id = ?",
    )
    .bind(curriculum_id)
    .bind(course_id)
    .fetch_one(pool)
    .await?;
    Ok(CurriculumCourseMembership {
        id: row.get("id"),
        curriculum_id: row.get("curriculum_id"),
        course_id: row.get("course_id"),
    })
}

pub async fn remove_course_membership(
    pool: &SqlitePool,
    curriculum_id: i64,
    course_id: i64,
) -> Result<()> {
    sqlx::query(
        "DELETE FROM curriculum_course_memberships WHERE curriculum_id = ? AND course_id = ?",
    )
    .bind(curriculum_id)
    .bind(course_id)
    .execute(pool)
    .await?;
    Ok(())
}

fn map_pathway(row: &sqlx::sqlite::SqliteRow) -> Pathway {
    let uuid_str: String = row.get("uuid");
    let status_str: String = row.get("status");
    Pathway {
        id: row.get("id"),
        uuid: Uuid::parse_str(&uuid_str).unwrap_or_default(),
        partner_id: row.get("partner_id"),
        name: row.get("name"),
        status: PathwayStatus::parse(&status_str).unwrap_or(PathwayStatus::Unpublished),
    }
}

pub async fn create_pathway(
    pool: &SqlitePool,
    partner_id: i64,
    name: &str,
    status: PathwayStatus,
) -> Result<Pathway> {
    let uuid = Uuid::new_v4();
    let result = sqlx::query("INSERT INTO pathways (uuid, partner_id, name, status) VALUES (?, ?, ?, ?)")
        .bind(uuid.to_string())
        .bind(partner_id)
        .bind(name)
        .bind(status.as_str())
        .execute(pool)
        .await?;
    let row = sqlx::query("SELECT * FROM pathways WHERE id = ?")
        .bind(result.last_insert_rowid())
        .fetch_one(pool)
        .await?;
    Ok(map_pathway(&row))
}

pub async fn add_pathway_program(pool: &SqlitePool, pathway_id: i64, program_id: i64) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO pathway_programs (pathway_id, program_id) VALUES (?, ?)")
        .bind(pathway_id)
        .bind(program_id)
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::fixture_pool;

    #[tokio::test]
    async fn upsert_by_uuid_updates_in_place() {
        let (pool, partner) = fixture_pool().await;
        let uuid = Uuid::new_v4();

        let input = ProgramInput {
            uuid,
            title: "Data Science".to_string(),
            subtitle: None,
            program_type: "MicroMasters".to_string(),
            status: ProgramStatus::Unpublished,
            marketing_slug: Some("data-science".to_string()),
            banner_image_url: None,
        };
        let (program, created) = upsert(&pool, partner.id, &input, "ingest").await.unwrap();
        assert!(created);

        let input = ProgramInput {
            title: "Data Science Essentials".to_string(),
            status: ProgramStatus::Active,
            ..input
        };
        let (program2, created2) = upsert(&pool, partner.id, &input, "ingest").await.unwrap();
        assert!(!created2);
        assert_eq!(program2.id, program.id);
        assert_eq!(program2.title, "Data Science Essentials");
        assert_eq!(program2.status, ProgramStatus::Active);
    }

    #[tokio::test]
    async fn course_set_replacement() {
        let (pool, partner) = fixture_pool().await;
        let uuid = Uuid::new_v4();
        let (program, _) = upsert(
            &pool,
            partner.id,
            &ProgramInput {
                uuid,
                title: "P".to_string(),
                subtitle: None,
                program_type: "XSeries".to_string(),
                status: ProgramStatus::Unpublished,
                marketing_slug: None,
                banner_image_url: None,
            },
            "ingest",
        )
        .await
        .unwrap();

        let course_a = crate::store::courses::create(
            &pool,
            &crate::store::courses::NewCourse {
                partner_id: partner.id,
                key: "MITx+A".to_string(),
                title: "A".to_string(),
                ..Default::default()
            },
            "ingest",
        )
        .await
        .unwrap();
        let course_b = crate::store::courses::create(
            &pool,
            &crate::store::courses::NewCourse {
                partner_id: partner.id,
                key: "MITx+B".to_string(),
                title: "B".to_string(),
                ..Default::default()
            },
            "ingest",
        )
        .await
        .unwrap();

        set_courses(&pool, program.id, &[course_a.id, course_b.id]).await.unwrap();
        assert_eq!(
            course_ids_for_program(&pool, program.id).await.unwrap(),
            vec![course_a.id, course_b.id]
        );

        set_courses(&pool, program.id, &[course_b.id]).await.unwrap();
        assert_eq!(
            course_ids_for_program(&pool, program.id).await.unwrap(),
            vec![course_b.id]
        );
    }
}
