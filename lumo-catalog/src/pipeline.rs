//! Pipeline driver
//!
//! `refresh` fans out to the four loaders for one partner. Organizations
//! run to completion first because course reconciliation references them
//! (course reconciliation also lazily creates missing organizations as a
//! fallback). The remaining loaders run serially, or on a bounded worker
//! pool in parallel mode. The change-notification bus is disconnected for
//! the duration; on completion the driver reconnects it, bumps the global
//! ingest timestamp, and sweeps orphaned media.

use crate::cache::ResponseCache;
use crate::loaders::{
    courses::CoursesLoader, ecommerce::EcommerceLoader, organizations::OrganizationsLoader,
    programs::ProgramsLoader, LoaderStats,
};
use crate::models::Partner;
use crate::store::orphans;
use crate::upstream::UpstreamClient;
use lumo_common::config::CatalogConfig;
use lumo_common::events::EventBus;
use lumo_common::Result;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Which loaders ran and whether each succeeded
#[derive(Debug, Clone)]
pub struct RefreshOutcome {
    pub success: bool,
    pub cancelled: bool,
    pub loader_failures: Vec<String>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum LoaderKind {
    Organizations,
    Courses,
    Ecommerce,
    Programs,
}

impl LoaderKind {
    fn name(&self) -> &'static str {
        match self {
            LoaderKind::Organizations => "organizations",
            LoaderKind::Courses => "courses",
            LoaderKind::Ecommerce => "ecommerce",
            LoaderKind::Programs => "programs",
        }
    }
}

/// Run a full catalog refresh for one partner
pub async fn refresh(
    pool: &SqlitePool,
    bus: &EventBus,
    cache: &ResponseCache,
    client: &UpstreamClient,
    partner: &Partner,
    config: &CatalogConfig,
    cancel: CancellationToken,
) -> Result<RefreshOutcome> {
    info!(
        partner = %partner.short_code,
        parallel = config.parallel,
        "Starting catalog refresh"
    );

    bus.disconnect();
    let mut failures: Vec<String> = Vec::new();

    // Organizations complete (and flush) before anything else begins
    if let Err(e) = execute_loader(
        LoaderKind::Organizations,
        pool.clone(),
        bus.clone(),
        client.clone(),
        partner.clone(),
        config.clone(),
        cancel.clone(),
    )
    .await
    {
        failures.push(format!("organizations: {e}"));
    }

    let rest = [LoaderKind::Courses, LoaderKind::Ecommerce, LoaderKind::Programs];

    if cancel.is_cancelled() {
        bus.reconnect();
        warn!(partner = %partner.short_code, "Refresh cancelled");
        return Ok(RefreshOutcome {
            success: false,
            cancelled: true,
            loader_failures: failures,
        });
    }

    if config.parallel {
        let permits = Arc::new(Semaphore::new(config.max_workers));
        let mut tasks: JoinSet<(LoaderKind, Result<()>)> = JoinSet::new();
        for kind in rest {
            let permits = Arc::clone(&permits);
            let pool = pool.clone();
            let bus = bus.clone();
            let client = client.clone();
            let partner = partner.clone();
            let config = config.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await;
                let result = execute_loader(kind, pool, bus, client, partner, config, cancel).await;
                (kind, result)
            });
        }
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((kind, Ok(()))) => info!(loader = kind.name(), "Loader finished"),
                Ok((kind, Err(e))) => failures.push(format!("{}: {e}", kind.name())),
                Err(e) => failures.push(format!("loader task panicked: {e}")),
            }
        }
    } else {
        for kind in rest {
            if cancel.is_cancelled() {
                break;
            }
            if let Err(e) = execute_loader(
                kind,
                pool.clone(),
                bus.clone(),
                client.clone(),
                partner.clone(),
                config.clone(),
                cancel.clone(),
            )
            .await
            {
                failures.push(format!("{}: {e}", kind.name()));
            }
        }
    }

    // Subscribers come back before the invalidation stamp so nothing that
    // happens after this point is lost
    bus.reconnect();

    let cancelled = cancel.is_cancelled();
    if cancelled {
        warn!(partner = %partner.short_code, "Refresh cancelled");
        return Ok(RefreshOutcome {
            success: false,
            cancelled: true,
            loader_failures: failures,
        });
    }

    let stamp = cache.bump_api_timestamp().await;

    if config.sweep_orphans {
        orphans::sweep(pool).await;
    }

    for failure in &failures {
        error!(partner = %partner.short_code, "Loader failed: {}", failure);
    }
    info!(
        partner = %partner.short_code,
        api_timestamp = stamp,
        failed_loaders = failures.len(),
        "Catalog refresh finished"
    );

    Ok(RefreshOutcome {
        success: failures.is_empty(),
        cancelled: false,
        loader_failures: failures,
    })
}

/// Drive one loader's page walk. Per-record failures were already handled
/// inside the loader; an error here is systemic (auth, exhausted retries,
/// database) and fails the loader as a whole.
async fn execute_loader(
    kind: LoaderKind,
    pool: SqlitePool,
    bus: EventBus,
    client: UpstreamClient,
    partner: Partner,
    config: CatalogConfig,
    cancel: CancellationToken,
) -> Result<()> {
    let publisher_managed = config
        .publisher_managed_partners
        .contains(&partner.short_code);
    let mut stats = LoaderStats::default();

    match kind {
        LoaderKind::Organizations => {
            let loader = OrganizationsLoader::new(&pool, &bus, &partner, publisher_managed);
            let mut pager = client.pages(&partner.organizations_api_url);
            while let Some(page) = pager.next_page().await? {
                if cancel.is_cancelled() {
                    return Ok(());
                }
                stats.absorb(loader.process_page(&page).await?);
            }
        }
        LoaderKind::Courses => {
            let loader = CoursesLoader::new(&pool, &bus, &partner, publisher_managed);
            let mut pager = client.pages(&partner.courses_api_url);
            while let Some(page) = pager.next_page().await? {
                if cancel.is_cancelled() {
                    return Ok(());
                }
                stats.absorb(loader.process_page(&page).await?);
            }
        }
        LoaderKind::Ecommerce => {
            let mut loader = EcommerceLoader::new(
                &pool,
                &bus,
                &partner,
                config.change_threshold_fraction,
            );
            let mut pager = client.pages(&partner.ecommerce_api_url);
            while let Some(page) = pager.next_page().await? {
                if cancel.is_cancelled() {
                    return Ok(());
                }
                stats.absorb(loader.process_page(&page).await?);
            }
            loader.finalize().await?;
        }
        LoaderKind::Programs => {
            let loader = ProgramsLoader::new(&pool, &bus, &partner);
            let mut pager = client.pages(&partner.programs_api_url);
            while let Some(page) = pager.next_page().await? {
                if cancel.is_cancelled() {
                    return Ok(());
                }
                stats.absorb(loader.process_page(&page).await?);
            }
        }
    }

    info!(
        loader = kind.name(),
        partner = %partner.short_code,
        processed = stats.processed,
        created = stats.created,
        updated = stats.updated,
        skipped = stats.skipped,
        "Loader completed"
    );
    Ok(())
}
