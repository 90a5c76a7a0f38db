//! Organizations reconciler

use crate::loaders::{clean, LoaderStats, ACTOR_INGEST};
use crate::models::Partner;
use crate::store::organizations::{self, OrganizationInput};
use crate::upstream::organizations::OrganizationRecord;
use lumo_common::events::{CatalogEvent, ChangeAction, EventBus, RecordKind};
use lumo_common::Result;
use sqlx::SqlitePool;
use tracing::{info, warn};

pub struct OrganizationsLoader<'a> {
    pool: &'a SqlitePool,
    bus: &'a EventBus,
    partner: &'a Partner,
    publisher_managed: bool,
}

impl<'a> OrganizationsLoader<'a> {
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

    pub async fn process_page(&self, records: &[OrganizationRecord]) -> Result<LoaderStats> {
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
                    warn!(
                        org = %record.short_name,
                        "Skipping organization: {}",
                        e
                    );
                }
            }
        }
        Ok(stats)
    }

    async fn process_record(&self, record: &OrganizationRecord) -> Result<bool> {
        let key = record.short_name.trim();
        let existing = organizations::get_by_key(self.pool, self.partner.id, key).await?;

        // Publisher-managed partners own name and description externally;
        // ingestion only refreshes the logo for them.
        let input = if self.publisher_managed {
            let existing = existing.as_ref();
            OrganizationInput {
                name: existing
                    .map(|org| org.name.clone())
                    .or_else(|| clean(record.name.as_deref()))
                    .unwrap_or_else(|| key.to_string()),
                description: existing.and_then(|org| org.description.clone()),
                logo_image_url: clean(record.logo.as_deref()),
                marketing_url: existing.and_then(|org| org.marketing_url.clone()),
            }
        } else {
            OrganizationInput {
                name: clean(record.name.as_deref()).unwrap_or_else(|| key.to_string()),
                description: clean(record.description.as_deref()),
                logo_image_url: clean(record.logo.as_deref()),
                marketing_url: None,
            }
        };

        let (org, created) =
            organizations::upsert(self.pool, self.partner.id, key, &input, ACTOR_INGEST).await?;

        self.bus.emit_lossy(CatalogEvent::new(
            RecordKind::Organization,
            org.uuid,
            if created {
                ChangeAction::Created
            } else {
                ChangeAction::Updated
            },
        ));

        info!(org = %org.key, created, "Processed organization");
        Ok(created)
    }
}
