//! End-to-end catalog scenarios driving the reconcilers directly

mod helpers;

use helpers::{test_partner, test_pool};
use lumo_catalog::editorial::{self, RunEdit};
use lumo_catalog::loaders::courses::CoursesLoader;
use lumo_catalog::loaders::ecommerce::EcommerceLoader;
use lumo_catalog::models::{CourseRunStatus, SeatType};
use lumo_catalog::store;
use lumo_common::events::EventBus;
use lumo_common::time::parse_datetime;
use lumo_common::Error;

const RUN_KEY: &str = "course-v1:MITx+6.00x+1T2024";

async fn fixture() -> (sqlx::SqlitePool, lumo_catalog::models::Partner, EventBus) {
    let pool = test_pool().await;
    let partner = test_partner(&pool, "http://unused.test").await;
    let bus = EventBus::new(256);
    (pool, partner, bus)
}

async fn ingest_intro_run(
    pool: &sqlx::SqlitePool,
    partner: &lumo_catalog::models::Partner,
    bus: &EventBus,
) {
    let loader = CoursesLoader::new(pool, bus, partner, false);
    let record = serde_json::from_str(
        r#"{
            "id": "course-v1:MITx+6.00x+1T2024",
            "org": "MITx",
            "number": "6.00x",
            "name": "Intro",
            "start": "2024-01-01T00:00:00Z",
            "end": "2024-04-01T00:00:00Z",
            "pacing": "self"
        }"#,
    )
    .unwrap();
    loader.process_page(&[record]).await.unwrap();
}

/// Scenario 1: a new course arrives from the LMS
#[tokio::test]
async fn new_course_via_lms_builds_org_course_and_canonical_run() {
    let (pool, partner, bus) = fixture().await;
    ingest_intro_run(&pool, &partner, &bus).await;

    assert!(store::organizations::get_by_key(&pool, partner.id, "MITx")
        .await
        .unwrap()
        .is_some());

    let course = store::courses::get_by_key(&pool, partner.id, "MITx+6.00x", false)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(course.title, "Intro");
    assert!(course.course_type_id.is_none(), "course type starts empty");

    let run = store::course_runs::get_by_key(&pool, RUN_KEY, false)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(course.canonical_course_run_id, Some(run.id));
    assert_eq!(
        run.pacing_type,
        Some(lumo_catalog::models::PacingType::SelfPaced)
    );
}

/// Scenario 2: a verified seat upgrades the empty run and course types
#[tokio::test]
async fn verified_seat_upgrades_types() {
    let (pool, partner, bus) = fixture().await;
    ingest_intro_run(&pool, &partner, &bus).await;

    let mut loader = EcommerceLoader::new(&pool, &bus, &partner, 1.0);
    let product = serde_json::from_str(&format!(
        r#"{{
            "parent": "{RUN_KEY}",
            "structure": "child",
            "attribute_values": [{{"name": "certificate_type", "value": "verified"}}],
            "stockrecords": [{{"price_currency": "USD", "price_excl_tax": "49.00", "partner_sku": "S1"}}]
        }}"#
    ))
    .unwrap();
    loader.process_page(&[product]).await.unwrap();
    loader.finalize().await.unwrap();

    let run = store::course_runs::get_by_key(&pool, RUN_KEY, false)
        .await
        .unwrap()
        .unwrap();
    let seats = store::seats::list_for_run(&pool, run.id).await.unwrap();
    assert_eq!(seats.len(), 1);
    assert_eq!(seats[0].seat_type, SeatType::Verified);
    assert_eq!(seats[0].price, 49.0);
    assert_eq!(seats[0].currency, "USD");
    assert_eq!(seats[0].sku.as_deref(), Some("S1"));

    let run_type = store::types::get_run_type(&pool, run.course_run_type_id.unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(run_type.name, "verified-audit");

    let course = store::courses::get_by_id(&pool, run.course_id).await.unwrap().unwrap();
    let course_type = store::types::get_course_type(&pool, course.course_type_id.unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(course_type.name, "verified-audit");
}

/// Scenario 3: an external-key collision across a curriculum is rejected
/// with the full collision list and leaves the target run unchanged
#[tokio::test]
async fn external_key_collision_in_curriculum_is_rejected() {
    let (pool, partner, bus) = fixture().await;

    // Courses A and B with one run each, bundled in one curriculum
    let loader = CoursesLoader::new(&pool, &bus, &partner, false);
    let records: Vec<lumo_catalog::upstream::courses::CourseRunRecord> = [
        r#"{"id": "course-v1:MITx+A+1T", "name": "A"}"#,
        r#"{"id": "course-v1:MITx+B+1T", "name": "B"}"#,
    ]
    .iter()
    .map(|j| serde_json::from_str(j).unwrap())
    .collect();
    loader.process_page(&records).await.unwrap();

    let (program, _) = store::programs::upsert(
        &pool,
        partner.id,
        &store::programs::ProgramInput {
            uuid: uuid::Uuid::new_v4(),
            title: "P".to_string(),
            subtitle: None,
            program_type: "MicroMasters".to_string(),
            status: lumo_catalog::models::ProgramStatus::Active,
            marketing_slug: Some("p".to_string()),
            banner_image_url: Some("https://cdn/banner.jpg".to_string()),
        },
        "test",
    )
    .await
    .unwrap();
    let curriculum = store::programs::create_curriculum(&pool, program.id, "C1")
        .await
        .unwrap();
    for course_key in ["MITx+A", "MITx+B"] {
        let course = store::courses::get_by_key(&pool, partner.id, course_key, false)
            .await
            .unwrap()
            .unwrap();
        store::programs::add_course_membership(&pool, curriculum.id, course.id)
            .await
            .unwrap();
    }

    // A1 takes EXT-1 first
    editorial::apply_run_edit(
        &pool,
        &bus,
        "course-v1:MITx+A+1T",
        &RunEdit {
            external_key: Some("EXT-1".to_string()),
            ..Default::default()
        },
        "editor",
    )
    .await
    .unwrap();

    // B1 trying the same key collides; the message names both runs
    let result = editorial::apply_run_edit(
        &pool,
        &bus,
        "course-v1:MITx+B+1T",
        &RunEdit {
            external_key: Some("EXT-1".to_string()),
            ..Default::default()
        },
        "editor",
    )
    .await;
    let message = match result {
        Err(Error::Validation(message)) => message,
        other => panic!("expected validation error, got {other:?}"),
    };
    assert!(message.contains("course-v1:MITx+A+1T"));
    assert!(message.contains("course-v1:MITx+B+1T"));

    let b1_draft = store::course_runs::get_by_key(&pool, "course-v1:MITx+B+1T", true)
        .await
        .unwrap()
        .unwrap();
    assert!(b1_draft.external_key.is_none());
}

/// Scenario 5 + P6: every ingest moves the cache boundary forward
#[tokio::test]
async fn cache_keys_differ_across_timestamp_bumps() {
    let cache = lumo_catalog::cache::ResponseCache::new();
    let params = vec![("page".to_string(), "1".to_string())];

    let t0 = cache.api_timestamp().await;
    let key_t0 = cache.response_key("/api/v1/courses", &params, "alice").await;

    let t1 = cache.bump_api_timestamp().await;
    assert!(t1 > t0);

    let key_t1 = cache.response_key("/api/v1/courses", &params, "alice").await;
    assert_ne!(key_t0, key_t1);
}

/// P3: draft twins keep the invariant through ingest and editing
#[tokio::test]
async fn draft_twin_invariant_holds() {
    let (pool, partner, bus) = fixture().await;
    ingest_intro_run(&pool, &partner, &bus).await;

    editorial::apply_run_edit(
        &pool,
        &bus,
        RUN_KEY,
        &RunEdit {
            title_override: Some("Edited".to_string()),
            ..Default::default()
        },
        "editor",
    )
    .await
    .unwrap();

    let official = store::course_runs::get_by_key(&pool, RUN_KEY, false)
        .await
        .unwrap()
        .unwrap();
    let draft = store::course_runs::get_by_key(&pool, RUN_KEY, true)
        .await
        .unwrap()
        .unwrap();

    assert!(!official.draft);
    assert!(draft.draft);
    assert_eq!(draft.draft_version_of, Some(official.id));
    assert_eq!(draft.key, official.key);

    // Editing the draft never touches the official twin
    assert!(official.title_override.is_none());
    assert_eq!(draft.title_override.as_deref(), Some("Edited"));
}

/// Scenario 6: auto-republish after the last active run ends, end to end
/// through an ingest that moves the end date into the past
#[tokio::test]
async fn ended_course_republishes_announced_run() {
    let (pool, partner, bus) = fixture().await;
    ingest_intro_run(&pool, &partner, &bus).await;

    // Second run, unpublished but announced
    let loader = CoursesLoader::new(&pool, &bus, &partner, false);
    let second: lumo_catalog::upstream::courses::CourseRunRecord = serde_json::from_str(
        r#"{"id": "course-v1:MITx+6.00x+2T2024", "name": "Intro", "start": "2024-06-01T00:00:00Z"}"#,
    )
    .unwrap();
    loader.process_page(&[second]).await.unwrap();

    let mut r2 = store::course_runs::get_by_key(&pool, "course-v1:MITx+6.00x+2T2024", false)
        .await
        .unwrap()
        .unwrap();
    r2.status = CourseRunStatus::Unpublished;
    r2.announcement = parse_datetime(Some("2024-05-01T00:00:00Z"));
    store::course_runs::update(&pool, &r2, "editor").await.unwrap();
    store::course_runs::set_status(&pool, &[r2.id], CourseRunStatus::Unpublished)
        .await
        .unwrap();

    // The first run ended in the past (fixture end is 2024-04-01), so
    // after the sweep the announced run is the visible one
    let republished = editorial::republish_ended_runs(&pool, &bus, chrono::Utc::now()).await;
    assert_eq!(republished, 1);

    let r2 = store::course_runs::get_by_key(&pool, "course-v1:MITx+6.00x+2T2024", false)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(r2.status, CourseRunStatus::Published);
}

/// P2: run ownership and canonical membership hold after mixed ingests
#[tokio::test]
async fn canonical_run_belongs_to_its_course() {
    let (pool, partner, bus) = fixture().await;
    ingest_intro_run(&pool, &partner, &bus).await;

    let loader = CoursesLoader::new(&pool, &bus, &partner, false);
    let second: lumo_catalog::upstream::courses::CourseRunRecord = serde_json::from_str(
        r#"{"id": "course-v1:MITx+6.00x+2T2024", "name": "Intro"}"#,
    )
    .unwrap();
    loader.process_page(&[second]).await.unwrap();

    let course = store::courses::get_by_key(&pool, partner.id, "MITx+6.00x", false)
        .await
        .unwrap()
        .unwrap();
    let runs = store::course_runs::runs_for_course(&pool, course.id, false)
        .await
        .unwrap();
    assert_eq!(runs.len(), 2);

    let canonical = course.canonical_course_run_id.unwrap();
    assert!(runs.iter().any(|r| r.id == canonical));
    // Canonical stays with the first-seen run
    let first = store::course_runs::get_by_key(&pool, RUN_KEY, false)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(canonical, first.id);
}
