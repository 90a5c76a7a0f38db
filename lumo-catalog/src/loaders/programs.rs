//! Program reconciler for the program-management source

use crate::loaders::{clean, LoaderStats, ACTOR_INGEST};
use crate::models::{Partner, ProgramStatus};
use crate::store::programs::ProgramInput;
use crate::store::{course_runs, organizations, programs};
use crate::upstream::programs::ProgramRecord;
use lumo_common::events::{CatalogEvent, ChangeAction, EventBus, RecordKind};
use lumo_common::{Error, Result};
use sqlx::SqlitePool;
use tracing::{error, info, warn};
use uuid::Uuid;

pub struct ProgramsLoader<'a> {
    pool: &'a SqlitePool,
    bus: &'a EventBus,
    partner: &'a Partner,
    /// HTTP client for banner downloads; banners are public assets, no
    /// bearer auth involved
    http: reqwest::Client,
}

impl<'a> ProgramsLoader<'a> {
    pub fn new(pool: &'a SqlitePool, bus: &'a EventBus, partner: &'a Partner) -> Self {
        Self {
            pool,
            bus,
            partner,
            http: reqwest::Client::new(),
        }
    }

    pub async fn process_page(&self, records: &[ProgramRecord]) -> Result<LoaderStats> {
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
                    warn!(program = %record.uuid, "Failed to load program: {}", e);
                }
            }
        }
        Ok(stats)
    }

    async fn process_record(&self, record: &ProgramRecord) -> Result<bool> {
        let uuid = Uuid::parse_str(&record.uuid)
            .map_err(|_| Error::FatalUpstream(format!("malformed program uuid {}", record.uuid)))?;

        let previous = programs::get_by_uuid(self.pool, self.partner.id, uuid).await?;
        let previous_banner = previous.as_ref().and_then(|p| p.banner_image_url.clone());

        let status = record
            .status
            .as_deref()
            .and_then(ProgramStatus::parse)
            .unwrap_or(ProgramStatus::Unpublished);

        let input = ProgramInput {
            uuid,
            title: clean(record.name.as_deref()).unwrap_or_default(),
            subtitle: clean(record.subtitle.as_deref()),
            program_type: clean(record.category.as_deref()).unwrap_or_default(),
            status,
            marketing_slug: clean(record.marketing_slug.as_deref()),
            banner_image_url: record.banner_image_url().map(String::from),
        };
        let (program, created) =
            programs::upsert(self.pool, self.partner.id, &input, ACTOR_INGEST).await?;

        self.sync_organizations(record, program.id).await?;
        self.sync_courses_and_runs(record, program.id).await?;
        self.sync_banner_image(record, program.id, previous_banner.as_deref())
            .await;

        self.bus.emit_lossy(CatalogEvent::new(
            RecordKind::Program,
            program.uuid,
            if created {
                ChangeAction::Created
            } else {
                ChangeAction::Updated
            },
        ));

        info!(program = %program.uuid, title = %program.title, created, "Processed program");
        Ok(created)
    }

    /// Resolve the authoring organizations; an unknown key leaves the
    /// program with no organizations and an error in the log
    async fn sync_organizations(&self, record: &ProgramRecord, program_id: i64) -> Result<()> {
        let keys: Vec<String> = record
            .organizations
            .iter()
            .map(|org| org.key.trim().to_string())
            .collect();
        let found = organizations::get_ids_for_keys(self.pool, self.partner.id, &keys).await?;

        if found.len() != keys.len() {
            error!(
                program = %record.uuid,
                expected = keys.len(),
                resolved = found.len(),
                "Organizations for program are invalid"
            );
            programs::set_organizations(self.pool, program_id, &[]).await?;
            return Ok(());
        }

        let ids: Vec<i64> = found.into_iter().map(|(_, id)| id).collect();
        programs::set_organizations(self.pool, program_id, &ids).await?;
        Ok(())
    }

    /// The course list is rebuilt from the run keys the payload names;
    /// runs of those courses it does not name become the excluded set
    async fn sync_courses_and_runs(&self, record: &ProgramRecord, program_id: i64) -> Result<()> {
        let named_keys = record.named_run_keys();

        let mut course_ids: Vec<i64> = Vec::new();
        let mut named_run_ids: Vec<i64> = Vec::new();
        for run_key in &named_keys {
            match course_runs::get_by_key(self.pool, run_key, false).await? {
                Some(run) => {
                    named_run_ids.push(run.id);
                    if !course_ids.contains(&run.course_id) {
                        course_ids.push(run.course_id);
                    }
                }
                None => {
                    warn!(program = %record.uuid, run = %run_key, "Program references unknown run");
                }
            }
        }

        programs::set_courses(self.pool, program_id, &course_ids).await?;

        let mut excluded: Vec<i64> = Vec::new();
        for course_id in &course_ids {
            for run in course_runs::runs_for_course(self.pool, *course_id, false).await? {
                if !named_run_ids.contains(&run.id) {
                    excluded.push(run.id);
                }
            }
        }
        programs::set_excluded_runs(self.pool, program_id, &excluded).await?;
        Ok(())
    }

    /// Download the banner when its URL changed. Failures are logged and
    /// never abort the program upsert.
    async fn sync_banner_image(
        &self,
        record: &ProgramRecord,
        program_id: i64,
        previous_banner: Option<&str>,
    ) {
        let url = match record.banner_image_url() {
            Some(url) => url,
            None => {
                warn!(program = %record.uuid, "There is no banner image url for program");
                return;
            }
        };
        if previous_banner == Some(url) {
            return;
        }

        match self.download_banner(url).await {
            Ok(data) => {
                // Record every advertised size variant; only the primary
                // carries the downloaded bytes (resampling is out of scope)
                for (size_key, variant_url) in &record.banner_image_urls {
                    let (width, height) = parse_size_key(size_key).unwrap_or((0, 0));
                    let bytes: &[u8] = if variant_url == url { &data } else { &[] };
                    if let Err(e) = programs::store_banner_image(
                        self.pool, program_id, variant_url, width, height, bytes,
                    )
                    .await
                    {
                        warn!(program = %record.uuid, "Failed to store banner variant: {}", e);
                    }
                }
            }
            Err(e) => {
                warn!(
                    program = %record.uuid,
                    url = %url,
                    "Loading the banner image failed: {}",
                    e
                );
            }
        }
    }

    async fn download_banner(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| Error::TransientUpstream(format!("banner download failed: {e}")))?;
        if !response.status().is_success() {
            return Err(Error::FatalUpstream(format!(
                "banner download returned {}",
                response.status()
            )));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::TransientUpstream(format!("banner body read failed: {e}")))?;
        Ok(bytes.to_vec())
    }
}

/// Parse a `w1440h480`-style size key
fn parse_size_key(key: &str) -> Option<(i64, i64)> {
    let rest = key.strip_prefix('w')?;
    let (width, height) = rest.split_once('h')?;
    Some((width.parse().ok()?, height.parse().ok()?))
}
