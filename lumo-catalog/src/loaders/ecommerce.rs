//! Seat / entitlement reconciler for the e-commerce source
//!
//! The product feed is the source of truth for the sellable surface:
//! seats and entitlements it names are upserted, those that disappeared
//! are removed at the end of the ingest. A change-threshold sanity check
//! guards the destructive half against a truncated upstream response.

use crate::loaders::{LoaderStats, ACTOR_INGEST};
use crate::models::{Partner, SeatType};
use crate::store::seats::{SeatInput, SeatKey};
use crate::store::{course_runs, courses, seats, types};
use crate::upstream::ecommerce::{
    ProductRecord, PRODUCT_CLASS_COURSE_ENTITLEMENT, PRODUCT_CLASS_ENROLLMENT_CODE,
};
use lumo_common::events::{CatalogEvent, ChangeAction, EventBus, RecordKind};
use lumo_common::time::parse_datetime;
use lumo_common::{Error, Result};
use sqlx::SqlitePool;
use std::collections::{BTreeSet, HashMap};
use tracing::{info, warn};
use uuid::Uuid;

pub struct EcommerceLoader<'a> {
    pool: &'a SqlitePool,
    bus: &'a EventBus,
    partner: &'a Partner,
    change_threshold: f64,
    /// Seats observed this ingest, keyed by run id
    seen_seats: HashMap<i64, (Uuid, Vec<SeatKey>)>,
    /// Entitlement SKUs observed this ingest
    seen_entitlement_skus: Vec<String>,
    /// Seat types found incompatible with their run's type; reported as a
    /// fatal error once the ingest has otherwise finished
    incompatible: Vec<String>,
}

impl<'a> EcommerceLoader<'a> {
    pub fn new(
        pool: &'a SqlitePool,
        bus: &'a EventBus,
        partner: &'a Partner,
        change_threshold: f64,
    ) -> Self {
        Self {
            pool,
            bus,
            partner,
            change_threshold,
            seen_seats: HashMap::new(),
            seen_entitlement_skus: Vec::new(),
            incompatible: Vec::new(),
        }
    }

    pub async fn process_page(&mut self, products: &[ProductRecord]) -> Result<LoaderStats> {
        let mut stats = LoaderStats::default();
        for product in products {
            stats.processed += 1;
            match self.process_product(product).await {
                Ok(true) => stats.updated += 1,
                Ok(false) => stats.skipped += 1,
                Err(e) => {
                    stats.skipped += 1;
                    warn!(
                        product = product.id.as_deref().unwrap_or("<unknown>"),
                        "Skipping product: {}",
                        e
                    );
                }
            }
        }
        Ok(stats)
    }

    /// Returns whether the product resulted in a store change
    async fn process_product(&mut self, product: &ProductRecord) -> Result<bool> {
        if product
            .product_class
            .as_deref()
            .map(|c| c == PRODUCT_CLASS_COURSE_ENTITLEMENT)
            .unwrap_or(false)
        {
            return self.process_entitlement(product).await;
        }

        if product.is_parent() {
            return Ok(false);
        }

        if product.is_standalone() {
            if product
                .product_class
                .as_deref()
                .map(|c| c == PRODUCT_CLASS_ENROLLMENT_CODE)
                .unwrap_or(false)
            {
                return self.process_enrollment_code(product).await;
            }
            return Ok(false);
        }

        if product.is_child() {
            return self.process_seat(product).await;
        }

        warn!(
            structure = %product.structure,
            "Unrecognized product structure, skipping"
        );
        Ok(false)
    }

    async fn process_seat(&mut self, product: &ProductRecord) -> Result<bool> {
        let run_key = product
            .parent
            .as_deref()
            .ok_or_else(|| Error::FatalUpstream("child product without parent".to_string()))?;
        let run = match course_runs::get_by_key(self.pool, run_key, false).await? {
            Some(run) => run,
            None => {
                warn!(run = %run_key, "Could not find course run for seat product");
                return Ok(false);
            }
        };

        let stock = product
            .stockrecord()
            .ok_or_else(|| Error::FatalUpstream("child product without stockrecord".to_string()))?;

        // Products priced in a currency we do not track are skipped; the
        // rest of the feed proceeds.
        if !types::currency_exists(self.pool, &stock.price_currency).await? {
            warn!(currency = %stock.price_currency, "Could not find currency, skipping product");
            return Ok(false);
        }
        let price = stock.price().ok_or_else(|| {
            Error::FatalUpstream(format!("unparseable price {}", stock.price_excl_tax))
        })?;

        let attributes = product.attributes();
        let seat_type = attributes
            .get("certificate_type")
            .map(|raw| {
                SeatType::parse(raw)
                    .ok_or_else(|| Error::FatalUpstream(format!("unknown seat type {raw}")))
            })
            .transpose()?
            .unwrap_or(SeatType::Audit);
        let credit_provider = attributes.get("credit_provider").cloned();
        let credit_hours = attributes
            .get("credit_hours")
            .and_then(|h| h.parse::<i64>().ok());

        // Invariant check against the run's classifier. The seat is stored
        // regardless so the catalog reflects upstream, but the ingest ends
        // with a fatal error for the operator.
        if let Some(run_type_id) = run.course_run_type_id {
            if let Some(run_type) = types::get_run_type(self.pool, run_type_id).await? {
                if !run_type.permits(seat_type) {
                    warn!(
                        run = %run.key,
                        seat_type = seat_type.as_str(),
                        run_type = %run_type.name,
                        "Seat type not permitted by run type"
                    );
                    self.incompatible.push(format!(
                        "seat {} not permitted by run type {} on {}",
                        seat_type.as_str(),
                        run_type.name,
                        run.key
                    ));
                }
            }
        }

        let input = SeatInput {
            seat_type,
            credit_provider: credit_provider.clone(),
            currency: stock.price_currency.clone(),
            price,
            upgrade_deadline: parse_datetime(product.expires.as_deref()),
            sku: stock.partner_sku.clone(),
            credit_hours,
        };
        let (seat, created) = seats::upsert(self.pool, run.id, run.uuid, &input, ACTOR_INGEST).await?;

        self.seen_seats
            .entry(run.id)
            .or_insert_with(|| (run.uuid, Vec::new()))
            .1
            .push(SeatKey {
                seat_type,
                credit_provider: credit_provider.unwrap_or_default(),
                currency: seat.currency.clone(),
            });

        self.bus.emit_lossy(CatalogEvent::new(
            RecordKind::Seat,
            run.uuid,
            if created {
                ChangeAction::Created
            } else {
                ChangeAction::Updated
            },
        ));
        Ok(true)
    }

    async fn process_enrollment_code(&mut self, product: &ProductRecord) -> Result<bool> {
        let attributes = product.attributes();
        let run_key = match attributes.get("course_key") {
            Some(key) => key.clone(),
            None => {
                warn!("Enrollment code without course_key attribute, skipping");
                return Ok(false);
            }
        };
        let seat_type = attributes
            .get("seat_type")
            .and_then(|raw| SeatType::parse(raw));
        let (run, seat_type) = match (
            course_runs::get_by_key(self.pool, &run_key, false).await?,
            seat_type,
        ) {
            (Some(run), Some(seat_type)) => (run, seat_type),
            _ => {
                warn!(run = %run_key, "Enrollment code references unknown run or seat type");
                return Ok(false);
            }
        };
        let bulk_sku = product
            .stockrecord()
            .and_then(|s| s.partner_sku.clone())
            .unwrap_or_default();
        if bulk_sku.is_empty() {
            return Ok(false);
        }
        let updated = seats::set_bulk_sku(self.pool, run.id, seat_type, &bulk_sku).await?;
        if !updated {
            warn!(run = %run.key, seat_type = seat_type.as_str(), "No seat found for enrollment code");
        }
        Ok(updated)
    }

    async fn process_entitlement(&mut self, product: &ProductRecord) -> Result<bool> {
        let attributes = product.attributes();

        let course_uuid = attributes
            .get("UUID")
            .and_then(|raw| Uuid::parse_str(raw).ok());
        let course = match course_uuid {
            Some(uuid) => courses::get_by_uuid(self.pool, uuid, false).await?,
            None => None,
        };
        let course = match course {
            Some(course) => course,
            None => {
                warn!(
                    uuid = attributes.get("UUID").map(String::as_str).unwrap_or("<missing>"),
                    "Could not find course for entitlement"
                );
                return Ok(false);
            }
        };

        let mode = match attributes
            .get("certificate_type")
            .and_then(|raw| SeatType::parse(raw))
        {
            Some(mode) => mode,
            None => {
                warn!(course = %course.key, "Entitlement with unknown mode, skipping");
                return Ok(false);
            }
        };

        let stock = match product.stockrecord() {
            Some(stock) => stock,
            None => {
                warn!(course = %course.key, "Entitlement without stockrecord, skipping");
                return Ok(false);
            }
        };
        if !types::currency_exists(self.pool, &stock.price_currency).await? {
            warn!(currency = %stock.price_currency, "Could not find currency, skipping entitlement");
            return Ok(false);
        }
        let price = stock.price().unwrap_or(0.0);

        // Modes must be permitted by the course's classifier, when set
        if let Some(course_type_id) = course.course_type_id {
            if let Some(course_type) = types::get_course_type(self.pool, course_type_id).await? {
                if !course_type.permits_entitlement(mode) {
                    warn!(
                        course = %course.key,
                        mode = mode.as_str(),
                        course_type = %course_type.name,
                        "Entitlement mode not permitted by course type"
                    );
                    self.incompatible.push(format!(
                        "entitlement mode {} not permitted by course type {} on {}",
                        mode.as_str(),
                        course_type.name,
                        course.key
                    ));
                }
            }
        }

        let (entitlement, created) = seats::upsert_entitlement(
            self.pool,
            course.id,
            course.uuid,
            mode,
            price,
            &stock.price_currency,
            stock.partner_sku.as_deref(),
            parse_datetime(product.expires.as_deref()),
            ACTOR_INGEST,
        )
        .await?;
        if let Some(sku) = entitlement.sku.clone() {
            self.seen_entitlement_skus.push(sku);
        }

        self.bus.emit_lossy(CatalogEvent::new(
            RecordKind::CourseEntitlement,
            course.uuid,
            if created {
                ChangeAction::Created
            } else {
                ChangeAction::Updated
            },
        ));
        Ok(true)
    }

    /// Remove what disappeared, upgrade empty classifiers, and surface any
    /// incompatibilities. Called once after every page is processed.
    pub async fn finalize(mut self) -> Result<()> {
        self.guard_change_threshold().await?;

        // Seats that did not reappear on reconciled runs
        let seen_seats = std::mem::take(&mut self.seen_seats);
        for (run_id, (run_uuid, keep)) in &seen_seats {
            let removed =
                seats::delete_missing(self.pool, *run_id, *run_uuid, keep, ACTOR_INGEST).await?;
            if removed > 0 {
                info!(run_id, removed, "Removed seats that disappeared upstream");
                self.bus.emit_lossy(CatalogEvent::new(
                    RecordKind::Seat,
                    *run_uuid,
                    ChangeAction::Deleted,
                ));
            }
        }

        // Entitlements whose SKU did not reappear
        if !self.seen_entitlement_skus.is_empty() {
            let removed =
                seats::delete_entitlements_not_in(self.pool, &self.seen_entitlement_skus).await?;
            if removed > 0 {
                info!(removed, "Removed entitlements that disappeared upstream");
            }
        }

        // Empty classifiers upgrade once the observed seat set identifies a
        // unique type
        for (&run_id, _) in &seen_seats {
            self.upgrade_types(run_id).await?;
        }

        info!(
            partner = %self.partner.short_code,
            runs = seen_seats.len(),
            entitlement_skus = self.seen_entitlement_skus.len(),
            "E-commerce reconciliation finalized"
        );

        if !self.incompatible.is_empty() {
            return Err(Error::IncompatibleType(self.incompatible.join("; ")));
        }
        Ok(())
    }

    /// Reject the destructive half of the ingest when it would remove an
    /// implausible fraction of the existing sellable records
    async fn guard_change_threshold(&self) -> Result<()> {
        let mut existing: u64 = 0;
        let mut removals: u64 = 0;

        for (run_id, (_, keep)) in &self.seen_seats {
            for seat in seats::list_for_run(self.pool, *run_id).await? {
                existing += 1;
                let key = SeatKey {
                    seat_type: seat.seat_type,
                    credit_provider: seat.credit_provider.clone().unwrap_or_default(),
                    currency: seat.currency.clone(),
                };
                if !keep.contains(&key) {
                    removals += 1;
                }
            }
        }

        if !self.seen_entitlement_skus.is_empty() {
            let total = seats::count_entitlements(self.pool).await? as u64;
            let kept = self.seen_entitlement_skus.len() as u64;
            existing += total;
            removals += total.saturating_sub(kept);
        }

        if existing > 0 {
            let fraction = removals as f64 / existing as f64;
            if fraction > self.change_threshold {
                return Err(Error::Validation(format!(
                    "ingest would remove {removals} of {existing} sellable records \
                     ({fraction:.2} > threshold {:.2}); rejecting",
                    self.change_threshold
                )));
            }
        }
        Ok(())
    }

    /// Upgrade the run's empty type (and then the course's) when the seat
    /// set identifies a unique classifier
    async fn upgrade_types(&self, run_id: i64) -> Result<()> {
        let mut run = match course_runs::get_by_id(self.pool, run_id).await? {
            Some(run) => run,
            None => return Ok(()),
        };

        if run.course_run_type_id.is_none() {
            let seat_types: BTreeSet<SeatType> = seats::list_for_run(self.pool, run.id)
                .await?
                .iter()
                .map(|s| s.seat_type)
                .collect();
            if let Some(run_type) = types::match_run_type(self.pool, &seat_types).await? {
                info!(run = %run.key, run_type = %run_type.name, "Upgraded empty run type");
                run.course_run_type_id = Some(run_type.id);
                course_runs::update(self.pool, &run, ACTOR_INGEST).await?;
            }
        }

        if let Some(run_type_id) = run.course_run_type_id {
            let mut course = match courses::get_by_id(self.pool, run.course_id).await? {
                Some(course) => course,
                None => return Ok(()),
            };
            if course.course_type_id.is_none() {
                if let Some(course_type) = types::match_course_type(self.pool, run_type_id).await? {
                    info!(course = %course.key, course_type = %course_type.name, "Upgraded empty course type");
                    course.course_type_id = Some(course_type.id);
                    courses::update(self.pool, &course, ACTOR_INGEST).await?;
                }
            }
        }
        Ok(())
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loaders::courses::CoursesLoader;
    use crate::store::test_support::fixture_pool;

    const RUN_KEY: &str = "course-v1:MITx+6.00x+1T2024";

    async fn seed_run(pool: &SqlitePool, partner: &Partner, bus: &EventBus) {
        let loader = CoursesLoader::new(pool, bus, partner, false);
        let record = serde_json::from_str(
            r#"{"id": "course-v1:MITx+6.00x+1T2024", "name": "Intro", "pacing": "self"}"#,
        )
        .unwrap();
        loader.process_page(&[record]).await.unwrap();
    }

    fn verified_child(price: &str, sku: &str) -> ProductRecord {
        serde_json::from_str(&format!(
            r#"{{
                "id": "seat-1",
                "parent": "{RUN_KEY}",
                "structure": "child",
                "product_class": "Seat",
                "attribute_values": [{{"name": "certificate_type", "value": "verified"}}],
                "stockrecords": [{{"price_currency": "USD", "price_excl_tax": "{price}", "partner_sku": "{sku}"}}]
            }}"#
        ))
        .unwrap()
    }

    #[tokio::test]
    async fn verified_seat_added_and_types_upgraded() {
        let (pool, partner) = fixture_pool().await;
        let bus = EventBus::new(64);
        seed_run(&pool, &partner, &bus).await;

        let mut loader = EcommerceLoader::new(&pool, &bus, &partner, 1.0);
        loader.process_page(&[verified_child("49.00", "S1")]).await.unwrap();
        loader.finalize().await.unwrap();

        let run = course_runs::get_by_key(&pool, RUN_KEY, false).await.unwrap().unwrap();
        let run_seats = seats::list_for_run(&pool, run.id).await.unwrap();
        assert_eq!(run_seats.len(), 1);
        assert_eq!(run_seats[0].seat_type, SeatType::Verified);
        assert_eq!(run_seats[0].price, 49.0);
        assert_eq!(run_seats[0].sku.as_deref(), Some("S1"));

        let run_type = types::get_run_type(&pool, run.course_run_type_id.unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(run_type.name, "verified-audit");

        let course = courses::get_by_id(&pool, run.course_id).await.unwrap().unwrap();
        let course_type = types::get_course_type(&pool, course.course_type_id.unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(course_type.name, "verified-audit");
    }

    #[tokio::test]
    async fn unknown_currency_is_skipped_with_warning() {
        let (pool, partner) = fixture_pool().await;
        let bus = EventBus::new(64);
        seed_run(&pool, &partner, &bus).await;

        let product: ProductRecord = serde_json::from_str(&format!(
            r#"{{
                "parent": "{RUN_KEY}",
                "structure": "child",
                "attribute_values": [{{"name": "certificate_type", "value": "verified"}}],
                "stockrecords": [{{"price_currency": "XTS", "price_excl_tax": "49.00", "partner_sku": "S1"}}]
            }}"#
        ))
        .unwrap();

        let mut loader = EcommerceLoader::new(&pool, &bus, &partner, 1.0);
        let stats = loader
            .process_page(&[product, verified_child("49.00", "S2")])
            .await
            .unwrap();
        assert_eq!(stats.skipped, 1);
        loader.finalize().await.unwrap();

        let run = course_runs::get_by_key(&pool, RUN_KEY, false).await.unwrap().unwrap();
        let run_seats = seats::list_for_run(&pool, run.id).await.unwrap();
        assert_eq!(run_seats.len(), 1);
        assert_eq!(run_seats[0].sku.as_deref(), Some("S2"));
    }

    #[tokio::test]
    async fn unknown_course_uuid_creates_nothing() {
        let (pool, partner) = fixture_pool().await;
        let bus = EventBus::new(64);
        seed_run(&pool, &partner, &bus).await;

        let product: ProductRecord = serde_json::from_str(
            r#"{
                "structure": "child",
                "product_class": "Course Entitlement",
                "attribute_values": [
                    {"name": "UUID", "value": "3f2ad743-adde-4aa2-92fb-b23a076873a6"},
                    {"name": "certificate_type", "value": "verified"}
                ],
                "stockrecords": [{"price_currency": "USD", "price_excl_tax": "99.00", "partner_sku": "ENT-1"}]
            }"#,
        )
        .unwrap();

        let mut loader = EcommerceLoader::new(&pool, &bus, &partner, 1.0);
        let stats = loader.process_page(&[product]).await.unwrap();
        assert_eq!(stats.skipped, 1);
        loader.finalize().await.unwrap();

        assert_eq!(seats::count_entitlements(&pool).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn disappeared_seat_is_removed() {
        let (pool, partner) = fixture_pool().await;
        let bus = EventBus::new(64);
        seed_run(&pool, &partner, &bus).await;

        let mut first = EcommerceLoader::new(&pool, &bus, &partner, 1.0);
        first
            .process_page(&[
                verified_child("49.00", "S1"),
                serde_json::from_str(&format!(
                    r#"{{
                        "parent": "{RUN_KEY}",
                        "structure": "child",
                        "attribute_values": [{{"name": "certificate_type", "value": "audit"}}],
                        "stockrecords": [{{"price_currency": "USD", "price_excl_tax": "0.00", "partner_sku": "S0"}}]
                    }}"#
                ))
                .unwrap(),
            ])
            .await
            .unwrap();
        first.finalize().await.unwrap();

        let run = course_runs::get_by_key(&pool, RUN_KEY, false).await.unwrap().unwrap();
        assert_eq!(seats::list_for_run(&pool, run.id).await.unwrap().len(), 2);

        // Second ingest only names the verified seat
        let mut second = EcommerceLoader::new(&pool, &bus, &partner, 1.0);
        second.process_page(&[verified_child("49.00", "S1")]).await.unwrap();
        second.finalize().await.unwrap();

        let remaining = seats::list_for_run(&pool, run.id).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].seat_type, SeatType::Verified);
    }

    #[tokio::test]
    async fn change_threshold_rejects_mass_removal() {
        let (pool, partner) = fixture_pool().await;
        let bus = EventBus::new(64);
        seed_run(&pool, &partner, &bus).await;

        let mut first = EcommerceLoader::new(&pool, &bus, &partner, 1.0);
        first.process_page(&[verified_child("49.00", "S1")]).await.unwrap();
        first.finalize().await.unwrap();

        // A feed that renames the only seat's currency would remove 1 of 2
        // observed rows (the stale one); with a zero threshold that is
        // rejected and nothing is deleted.
        let renamed: ProductRecord = serde_json::from_str(&format!(
            r#"{{
                "parent": "{RUN_KEY}",
                "structure": "child",
                "attribute_values": [{{"name": "certificate_type", "value": "verified"}}],
                "stockrecords": [{{"price_currency": "EUR", "price_excl_tax": "45.00", "partner_sku": "S1E"}}]
            }}"#
        ))
        .unwrap();
        let mut second = EcommerceLoader::new(&pool, &bus, &partner, 0.0);
        second.process_page(&[renamed]).await.unwrap();
        let result = second.finalize().await;
        assert!(matches!(result, Err(Error::Validation(_))));

        let run = course_runs::get_by_key(&pool, RUN_KEY, false).await.unwrap().unwrap();
        let remaining = seats::list_for_run(&pool, run.id).await.unwrap();
        // Both the old USD seat and the new EUR seat are still present
        assert_eq!(remaining.len(), 2);
    }

    #[tokio::test]
    async fn incompatible_seat_type_is_fatal_at_end() {
        let (pool, partner) = fixture_pool().await;
        let bus = EventBus::new(64);
        seed_run(&pool, &partner, &bus).await;

        // Pin the run to professional-only
        let run_type = types::get_run_type_by_name(&pool, "professional").await.unwrap();
        let mut run = course_runs::get_by_key(&pool, RUN_KEY, false).await.unwrap().unwrap();
        run.course_run_type_id = Some(run_type.id);
        course_runs::update(&pool, &run, "test").await.unwrap();

        let mut loader = EcommerceLoader::new(&pool, &bus, &partner, 1.0);
        loader.process_page(&[verified_child("49.00", "S1")]).await.unwrap();
        let result = loader.finalize().await;
        assert!(matches!(result, Err(Error::IncompatibleType(_))));
    }

    #[tokio::test]
    async fn enrollment_code_sets_bulk_sku() {
        let (pool, partner) = fixture_pool().await;
        let bus = EventBus::new(64);
        seed_run(&pool, &partner, &bus).await;

        let mut loader = EcommerceLoader::new(&pool, &bus, &partner, 1.0);
        loader.process_page(&[verified_child("49.00", "S1")]).await.unwrap();

        let code: ProductRecord = serde_json::from_str(&format!(
            r#"{{
                "structure": "standalone",
                "product_class": "Enrollment Code",
                "attribute_values": [
                    {{"name": "course_key", "value": "{RUN_KEY}"}},
                    {{"name": "seat_type", "value": "verified"}}
                ],
                "stockrecords": [{{"price_currency": "USD", "price_excl_tax": "49.00", "partner_sku": "BULK-1"}}]
            }}"#
        ))
        .unwrap();
        loader.process_page(&[code]).await.unwrap();
        loader.finalize().await.unwrap();

        let run = course_runs::get_by_key(&pool, RUN_KEY, false).await.unwrap().unwrap();
        let run_seats = seats::list_for_run(&pool, run.id).await.unwrap();
        assert_eq!(run_seats[0].bulk_sku.as_deref(), Some("BULK-1"));
    }
}
