//! Orphan sweeper
//!
//! After a full ingest, images and videos can be left dangling: a program
//! whose banner changed, a run whose video was replaced. The sweeper
//! deletes rows no live foreign key references, inside one transaction so
//! a failure leaves everything in place.

use lumo_common::Result;
use sqlx::SqlitePool;
use tracing::{info, warn};

#[derive(Debug, Default, Clone, Copy)]
pub struct SweepReport {
    pub images_removed: u64,
    pub videos_removed: u64,
}

/// Delete unreferenced images and videos. Errors are logged and reported
/// as an empty sweep; they never abort the caller.
pub async fn sweep(pool: &SqlitePool) -> SweepReport {
    match sweep_inner(pool).await {
        Ok(report) => {
            if report.images_removed > 0 || report.videos_removed > 0 {
                info!(
                    images = report.images_removed,
                    videos = report.videos_removed,
                    "Swept orphaned media rows"
                );
            }
            report
        }
        Err(e) => {
            warn!("Orphan sweep failed (continuing): {}", e);
            SweepReport::default()
        }
    }
}

async fn sweep_inner(pool: &SqlitePool) -> Result<SweepReport> {
    let mut tx = pool.begin().await?;

    let videos = sqlx::query(
        r#"
        DELETE FROM videos WHERE id NOT IN (
            SELECT video_id FROM course_runs WHERE video_id IS NOT NULL
        )
        "#,
    )
    .execute(&mut *tx)
    .await?;

    let images = sqlx::query(
        r#"
        DELETE FROM images WHERE id NOT IN (
            SELECT banner_image_id FROM programs WHERE banner_image_id IS NOT NULL
            UNION
            SELECT image_id FROM videos WHERE image_id IS NOT NULL
        )
        "#,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(SweepReport {
        images_removed: images.rows_affected(),
        videos_removed: videos.rows_affected(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::fixture_pool;

    #[tokio::test]
    async fn removes_only_unreferenced_rows() {
        let (pool, partner) = fixture_pool().await;

        // Referenced video via a course run
        let course = crate::store::courses::create(
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
        let mut run = crate::store::course_runs::create(
            &pool,
            &crate::store::course_runs::NewCourseRun {
                course_id: course.id,
                key: "course-v1:MITx+A+1T2024".to_string(),
                status: crate::models::CourseRunStatus::Published,
                draft: false,
                draft_version_of: None,
            },
            "ingest",
        )
        .await
        .unwrap();
        let video_id = crate::store::course_runs::get_or_create_video(&pool, "https://cdn/v1.mp4")
            .await
            .unwrap();
        run.video_id = Some(video_id);
        crate::store::course_runs::update(&pool, &run, "ingest").await.unwrap();

        // Orphaned video and image
        crate::store::course_runs::get_or_create_video(&pool, "https://cdn/old.mp4")
            .await
            .unwrap();
        sqlx::query("INSERT INTO images (src) VALUES ('https://cdn/old.jpg')")
            .execute(&pool)
            .await
            .unwrap();

        let report = sweep(&pool).await;
        assert_eq!(report.videos_removed, 1);
        assert_eq!(report.images_removed, 1);

        // The referenced video survived
        let survivors: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM videos")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(survivors.0, 1);
    }
}
