//! Plan synchronization against the billing provider
//!
//! Keeps a plan's external product and per-cycle prices in line with its
//! local definition. Provider objects are mutated first and the catalog
//! row is written last, so a crash mid-sync can leave unreferenced
//! provider objects but never a catalog row pointing at ids that were
//! never created.

use std::collections::HashMap;
use std::sync::Arc;

use time::OffsetDateTime;

use siteforge_shared::BillingCycle;

use crate::catalog::{CatalogStore, PlanDefinition, SyncedIds};
use crate::drift::{DesiredPrice, DriftDecision, PriceDriftDetector};
use crate::error::{BillingError, BillingResult, ProviderError};
use crate::provider::{BillingProvider, ProductAttrs};

/// Feature entries carried into product metadata, at most
const FEATURE_METADATA_LIMIT: usize = 15;

/// Monthly charge in minor currency units
fn monthly_minor_units(price: f64) -> i64 {
    (price * 100.0).round() as i64
}

/// Annual charge in minor currency units. Annual plans are quoted to users
/// as a monthly-equivalent but billed as a full-year total.
fn annual_minor_units(price: f64) -> i64 {
    (price * 12.0 * 100.0).round() as i64
}

fn product_metadata(plan: &PlanDefinition) -> HashMap<String, String> {
    let features = plan
        .features
        .iter()
        .take(FEATURE_METADATA_LIMIT)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join("|");

    let mut metadata = HashMap::new();
    metadata.insert("planId".to_string(), plan.id.to_string());
    metadata.insert("isFeatured".to_string(), plan.is_featured.to_string());
    metadata.insert("features".to_string(), features);
    metadata
}

/// Plan synchronization service
pub struct PlanSyncService {
    provider: Arc<dyn BillingProvider>,
    catalog: Arc<dyn CatalogStore>,
    detector: PriceDriftDetector,
    currency: String,
}

impl PlanSyncService {
    pub fn new(
        provider: Arc<dyn BillingProvider>,
        catalog: Arc<dyn CatalogStore>,
        currency: String,
    ) -> Self {
        let detector = PriceDriftDetector::new(provider.clone());
        Self {
            provider,
            catalog,
            detector,
            currency,
        }
    }

    /// Reconcile one plan with the billing provider and persist the
    /// resulting external ids. The first provider failure aborts the sync
    /// before anything is written to the catalog.
    pub async fn sync(&self, plan: &PlanDefinition) -> BillingResult<SyncedIds> {
        let sync_err = |source: ProviderError| BillingError::Sync {
            plan_id: plan.id,
            source,
        };

        let attrs = ProductAttrs {
            name: plan.name.clone(),
            description: plan.description.clone(),
            active: !plan.is_archived,
            metadata: product_metadata(plan),
        };

        let product_id = self
            .provider
            .upsert_product(plan.stripe_product_id.as_deref(), &attrs)
            .await
            .map_err(sync_err)?;

        let price_id_monthly = self
            .sync_cycle(
                plan,
                BillingCycle::Monthly,
                &product_id,
                monthly_minor_units(plan.monthly_price),
            )
            .await
            .map_err(sync_err)?;

        let price_id_annually = self
            .sync_cycle(
                plan,
                BillingCycle::Annually,
                &product_id,
                annual_minor_units(plan.annual_price),
            )
            .await
            .map_err(sync_err)?;

        let ids = SyncedIds {
            product_id,
            price_id_monthly,
            price_id_annually,
        };

        self.catalog
            .record_synced_ids(plan.id, &ids, OffsetDateTime::now_utc())
            .await?;

        tracing::info!(
            plan_id = %plan.id,
            product_id = %ids.product_id,
            "Synced plan with billing provider"
        );

        Ok(ids)
    }

    /// Reconcile one billing cycle, returning the price id the catalog
    /// should carry for it. A zero amount means the cycle is not for sale:
    /// any stale price is deactivated and no reference is kept.
    async fn sync_cycle(
        &self,
        plan: &PlanDefinition,
        cycle: BillingCycle,
        product_id: &str,
        unit_amount: i64,
    ) -> Result<Option<String>, ProviderError> {
        let existing = plan.price_id_for(cycle);

        if unit_amount <= 0 {
            if let Some(old_id) = existing {
                self.archive_superseded(plan, old_id).await;
            }
            return Ok(None);
        }

        let desired = DesiredPrice {
            unit_amount,
            currency: self.currency.clone(),
            cycle,
        };

        let decision = self.detector.check(existing, &desired).await?;

        match decision {
            DriftDecision::Reuse => Ok(existing.map(str::to_string)),
            DriftDecision::Replace(reason) => {
                if decision.requires_archive() {
                    if let Some(old_id) = existing {
                        self.archive_superseded(plan, old_id).await;
                    }
                }

                tracing::info!(
                    plan_id = %plan.id,
                    cycle = %cycle,
                    reason = ?reason,
                    "Replacing billing price"
                );

                let mut metadata = HashMap::new();
                metadata.insert("planId".to_string(), plan.id.to_string());
                metadata.insert("billingCycle".to_string(), cycle.as_str().to_string());

                let new_id = self
                    .provider
                    .create_price(product_id, unit_amount, &self.currency, cycle, metadata)
                    .await?;

                Ok(Some(new_id))
            }
        }
    }

    /// Deactivate a price that is being replaced. Archival failure is
    /// logged and swallowed; it must not abort the sync.
    async fn archive_superseded(&self, plan: &PlanDefinition, price_id: &str) {
        if let Err(err) = self.provider.set_price_active(price_id, false).await {
            tracing::warn!(
                plan_id = %plan.id,
                price_id = %price_id,
                error = %err,
                "Failed to archive superseded price; continuing"
            );
        }
    }
}
