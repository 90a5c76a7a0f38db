//! Course / course-run reconciler for the learning-platform source
//!
//! Walks run records, deriving the owning course from each run key. The
//! LMS owns scheduling fields (dates, pacing, hidden, license, video) on
//! every partner; editorial fields (titles, descriptions) only where the
//! partner is not publisher-managed.

use crate::loaders::{clean, LoaderStats, ACTOR_INGEST};
use crate::models::{Course, CourseRun, CourseRunStatus, PacingType, Partner};
use crate::store::{course_runs, courses, organizations, seats};
use crate::upstream::courses::CourseRunRecord;
use lumo_common::events::{CatalogEvent, ChangeAction, EventBus, RecordKind};
use lumo_common::time::parse_datetime;
use lumo_common::{Error, Result};
use sqlx::SqlitePool;
use tracing::{info, warn};

pub struct CoursesLoader<'a> {
    pool: &'a SqlitePool,
    bus: &'a EventBus,
    partner: &'a Partner,
    publisher_managed: bool,
}

impl<'a> CoursesLoader<'a> {
    pub fn new(
        pool: &'a SqlitePool,
        bus: &'a EventBus,
        partner: &'a Partner,
        publisher_managed: bool,
    ) -> Self {
        Self {
            pool,
            bus,
            partner,
            publisher_managed,
        }
    }

    pub async fn process_page(&self, records: &[CourseRunRecord]) -> Result<LoaderStats> {
        let mut stats = LoaderStats::default();
        for record in records {
            stats.processed += 1;
            match self.process_record(record).await {
                Ok(created) => {
                    if created {
                        stats.created += 1;
                    } else {
                        stats.updated += 1;
                    }
                }
                Err(e) => {
                    stats.skipped += 1;
                    warn!(run = %record.id, "Skipping course run: {}", e);
                }
            }
        }
        Ok(stats)
    }

    async fn process_record(&self, record: &CourseRunRecord) -> Result<bool> {
        let course_key = record
            .course_key()
            .ok_or_else(|| Error::FatalUpstream(format!("malformed run key {}", record.id)))?;
        let org_key = record
            .org_key()
            .ok_or_else(|| Error::FatalUpstream(format!("malformed run key {}", record.id)))?;

        // The organizations loader normally runs first; create lazily when
        // this run arrives ahead of its organization.
        let (_, org_created) =
            organizations::get_or_create(self.pool, self.partner.id, &org_key, ACTOR_INGEST)
                .await?;
        if org_created {
            info!(org = %org_key, "Created organization referenced by course run");
        }

        let mut course = self.reconcile_course(&course_key, record).await?;
        let (mut run, run_created, end_changed) = self.reconcile_run(&course, record).await?;

        // First run observed for the course becomes its canonical run;
        // an existing choice is never overridden.
        if course.canonical_course_run_id.is_none() {
            course.canonical_course_run_id = Some(run.id);
            courses::update(self.pool, &course, ACTOR_INGEST).await?;
        }

        self.inherit_run_type(&course, &mut run).await?;

        if end_changed {
            self.resync_upgrade_deadlines(&run).await?;
        }

        self.bus.emit_lossy(CatalogEvent::new(
            RecordKind::CourseRun,
            run.uuid,
            if run_created {
                ChangeAction::Created
            } else {
                ChangeAction::Updated
            },
        ));

        info!(course = %course.key, run = %run.key, created = run_created, "Processed course run");
        Ok(run_created)
    }

    /// Resolve the course twins for a run key, creating the official row
    /// (with empty type) when absent, and apply the loader-owned fields.
    async fn reconcile_course(
        &self,
        course_key: &str,
        record: &CourseRunRecord,
    ) -> Result<Course> {
        let official = courses::get_by_key(self.pool, self.partner.id, course_key, false).await?;
        let draft = courses::get_by_key(self.pool, self.partner.id, course_key, true).await?;

        let official = match (official, draft) {
            (Some(mut official), draft) => {
                self.apply_course_fields(&mut official, record, false);
                courses::update(self.pool, &official, ACTOR_INGEST).await?;
                if let Some(mut draft) = draft {
                    self.apply_course_fields(&mut draft, record, false);
                    courses::update(self.pool, &draft, ACTOR_INGEST).await?;
                }
                self.bus.emit_lossy(CatalogEvent::new(
                    RecordKind::Course,
                    official.uuid,
                    ChangeAction::Updated,
                ));
                official
            }
            (None, Some(draft)) => {
                // Editors got here first: create the official twin from the
                // draft's fields and link them.
                let mut official = courses::create(
                    self.pool,
                    &courses::NewCourse {
                        partner_id: self.partner.id,
                        key: course_key.to_string(),
                        title: draft.title.clone(),
                        short_description: draft.short_description.clone(),
                        full_description: draft.full_description.clone(),
                        image_url: draft.image_url.clone(),
                        level: draft.level.clone(),
                        draft: false,
                        draft_version_of: None,
                    },
                    ACTOR_INGEST,
                )
                .await?;
                courses::link_draft(self.pool, official.id, draft.id).await?;
                self.apply_course_fields(&mut official, record, true);
                courses::update(self.pool, &official, ACTOR_INGEST).await?;
                self.bus.emit_lossy(CatalogEvent::new(
                    RecordKind::Course,
                    official.uuid,
                    ChangeAction::Created,
                ));
                official
            }
            (None, None) => {
                let mut official = courses::create(
                    self.pool,
                    &courses::NewCourse {
                        partner_id: self.partner.id,
                        key: course_key.to_string(),
                        title: clean(record.name.as_deref())
                            .unwrap_or_else(|| course_key.to_string()),
                        draft: false,
                        draft_version_of: None,
                        ..Default::default()
                    },
                    ACTOR_INGEST,
                )
                .await?;
                self.apply_course_fields(&mut official, record, true);
                courses::update(self.pool, &official, ACTOR_INGEST).await?;
                self.bus.emit_lossy(CatalogEvent::new(
                    RecordKind::Course,
                    official.uuid,
                    ChangeAction::Created,
                ));
                official
            }
        };

        Ok(official)
    }

    /// The loader owns the image in both modes; titles and descriptions
    /// only when the partner is not publisher-managed (and on creation,
    /// where there is nothing editorial to preserve).
    fn apply_course_fields(&self, course: &mut Course, record: &CourseRunRecord, creating: bool) {
        if creating || !self.publisher_managed {
            if let Some(title) = clean(record.name.as_deref()) {
                course.title = title;
            }
            if let Some(short) = clean(record.short_description.as_deref()) {
                course.short_description = Some(short);
            }
        }
        if let Some(image) = record.image_url() {
            course.image_url = Some(image.to_string());
        }
    }

    /// Upsert the run row; returns `(run, created, end_changed)`
    async fn reconcile_run(
        &self,
        course: &Course,
        record: &CourseRunRecord,
    ) -> Result<(CourseRun, bool, bool)> {
        let existing = course_runs::get_by_key(self.pool, &record.id, false).await?;
        let (mut run, created) = match existing {
            Some(run) => (run, false),
            None => {
                let status = if self.publisher_managed {
                    CourseRunStatus::Unpublished
                } else {
                    CourseRunStatus::Published
                };
                let run = course_runs::create(
                    self.pool,
                    &course_runs::NewCourseRun {
                        course_id: course.id,
                        key: record.id.clone(),
                        status,
                        draft: false,
                        draft_version_of: None,
                    },
                    ACTOR_INGEST,
                )
                .await?;
                (run, true)
            }
        };

        let new_end = parse_datetime(record.end.as_deref());
        let end_changed = !created && run.end != new_end && new_end.is_some();

        run.start = parse_datetime(record.start.as_deref());
        run.end = new_end;
        run.enrollment_start = parse_datetime(record.enrollment_start.as_deref());
        run.enrollment_end = parse_datetime(record.enrollment_end.as_deref());
        run.hidden = record.hidden;
        run.license = clean(record.license.as_deref()).unwrap_or_default();
        run.pacing_type = PacingType::from_upstream(record.pacing.as_deref()).or(run.pacing_type);
        run.mobile_available = record.mobile_available.unwrap_or(run.mobile_available);
        if let Some(uri) = record.video_uri() {
            run.video_id = Some(course_runs::get_or_create_video(self.pool, uri).await?);
        }
        if !self.publisher_managed {
            run.title_override = clean(record.name.as_deref());
            run.short_description_override = clean(record.short_description.as_deref());
        }

        course_runs::update(self.pool, &run, ACTOR_INGEST).await?;
        Ok((run, created, end_changed))
    }

    /// A new run with the empty type inherits the type of the sibling with
    /// the most recent start, when one exists
    async fn inherit_run_type(&self, course: &Course, run: &mut CourseRun) -> Result<()> {
        if run.course_run_type_id.is_some() {
            return Ok(());
        }
        let siblings = course_runs::runs_for_course(self.pool, course.id, false).await?;
        let donor = siblings
            .iter()
            .filter(|s| s.id != run.id && s.course_run_type_id.is_some())
            .max_by_key(|s| s.start);
        if let Some(donor) = donor {
            run.course_run_type_id = donor.course_run_type_id;
            course_runs::update(self.pool, run, ACTOR_INGEST).await?;
            info!(
                run = %run.key,
                donor = %donor.key,
                "Inherited run type from sibling"
            );
        }
        Ok(())
    }

    /// The run's end moved: drag paid non-credit seat deadlines along and
    /// announce the run so downstream e-commerce republishes it
    async fn resync_upgrade_deadlines(&self, run: &CourseRun) -> Result<()> {
        let mut touched = false;
        for seat in seats::list_for_run(self.pool, run.id).await? {
            if seat.seat_type.deadline_tracks_run_end() && seat.upgrade_deadline.is_some() {
                seats::set_upgrade_deadline(self.pool, seat.id, run.end).await?;
                touched = true;
            }
        }
        if touched {
            info!(run = %run.key, "Re-synced seat upgrade deadlines to run end");
            self.bus.emit_lossy(CatalogEvent::new(
                RecordKind::CourseRun,
                run.uuid,
                ChangeAction::Updated,
            ));
        }
        Ok(())
    }
}
