//! Plan catalog and tenant billing persistence

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;

use siteforge_shared::{BillingCycle, PlanId, TenantId};

use crate::error::BillingResult;

/// A locally-defined subscription plan.
///
/// The `stripe_*` references are nullable: a plan that has never been
/// synced has none, and a zero-amount billing cycle keeps its reference
/// NULL on purpose (no purchasable price exists for that cycle).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PlanDefinition {
    pub id: PlanId,
    pub name: String,
    pub description: Option<String>,
    /// Monthly price in decimal currency units
    pub monthly_price: f64,
    /// Annual billing, quoted as a monthly-equivalent in decimal currency
    /// units; the provider-side price carries the full-year total
    pub annual_price: f64,
    pub features: Vec<String>,
    pub is_featured: bool,
    pub is_archived: bool,
    pub stripe_product_id: Option<String>,
    pub stripe_price_id_monthly: Option<String>,
    pub stripe_price_id_annually: Option<String>,
    pub stripe_last_sync_at: Option<OffsetDateTime>,
}

impl PlanDefinition {
    /// The stored price reference for one billing cycle
    pub fn price_id_for(&self, cycle: BillingCycle) -> Option<&str> {
        match cycle {
            BillingCycle::Monthly => self.stripe_price_id_monthly.as_deref(),
            BillingCycle::Annually => self.stripe_price_id_annually.as_deref(),
        }
    }
}

/// External ids produced by a successful plan sync
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncedIds {
    pub product_id: String,
    pub price_id_monthly: Option<String>,
    pub price_id_annually: Option<String>,
}

/// Billing state for a tenant. `stripe_customer_id` is created lazily on
/// first checkout and stable for the tenant's lifetime once set.
#[derive(Debug, Clone, FromRow)]
pub struct TenantBillingRecord {
    pub id: TenantId,
    pub email: String,
    pub stripe_customer_id: Option<String>,
}

/// Persistence for plans and tenant billing records
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn plan(&self, id: PlanId) -> BillingResult<Option<PlanDefinition>>;

    /// Insert the plan or update its editable fields. Stripe references are
    /// written only on insert; for existing rows the stored references win,
    /// since they were persisted by a completed sync.
    async fn upsert_plan(&self, plan: &PlanDefinition) -> BillingResult<PlanDefinition>;

    /// Plans shown on the public pricing page, cheapest first
    async fn list_public_plans(&self) -> BillingResult<Vec<PlanDefinition>>;

    /// Merge-update of the synced columns only; concurrent edits to name,
    /// features, or flags are not clobbered.
    async fn record_synced_ids(
        &self,
        id: PlanId,
        ids: &SyncedIds,
        synced_at: OffsetDateTime,
    ) -> BillingResult<()>;

    async fn tenant(&self, id: TenantId) -> BillingResult<Option<TenantBillingRecord>>;

    async fn record_customer_id(&self, id: TenantId, customer_id: &str) -> BillingResult<()>;
}

/// Postgres-backed catalog store
#[derive(Clone)]
pub struct PgCatalogStore {
    pool: PgPool,
}

impl PgCatalogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const PLAN_COLUMNS: &str = "id, name, description, monthly_price, annual_price, features, \
     is_featured, is_archived, stripe_product_id, stripe_price_id_monthly, \
     stripe_price_id_annually, stripe_last_sync_at";

#[async_trait]
impl CatalogStore for PgCatalogStore {
    async fn plan(&self, id: PlanId) -> BillingResult<Option<PlanDefinition>> {
        let plan = sqlx::query_as::<_, PlanDefinition>(&format!(
            "SELECT {} FROM plans WHERE id = $1",
            PLAN_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(plan)
    }

    async fn upsert_plan(&self, plan: &PlanDefinition) -> BillingResult<PlanDefinition> {
        let merged = sqlx::query_as::<_, PlanDefinition>(&format!(
            r#"
            INSERT INTO plans (id, name, description, monthly_price, annual_price, features,
                               is_featured, is_archived, stripe_product_id,
                               stripe_price_id_monthly, stripe_price_id_annually)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                description = EXCLUDED.description,
                monthly_price = EXCLUDED.monthly_price,
                annual_price = EXCLUDED.annual_price,
                features = EXCLUDED.features,
                is_featured = EXCLUDED.is_featured,
                is_archived = EXCLUDED.is_archived,
                updated_at = NOW()
            RETURNING {}
            "#,
            PLAN_COLUMNS
        ))
        .bind(plan.id)
        .bind(&plan.name)
        .bind(&plan.description)
        .bind(plan.monthly_price)
        .bind(plan.annual_price)
        .bind(&plan.features)
        .bind(plan.is_featured)
        .bind(plan.is_archived)
        .bind(&plan.stripe_product_id)
        .bind(&plan.stripe_price_id_monthly)
        .bind(&plan.stripe_price_id_annually)
        .fetch_one(&self.pool)
        .await?;

        Ok(merged)
    }

    async fn list_public_plans(&self) -> BillingResult<Vec<PlanDefinition>> {
        let plans = sqlx::query_as::<_, PlanDefinition>(&format!(
            "SELECT {} FROM plans WHERE is_archived = FALSE ORDER BY monthly_price ASC, name ASC",
            PLAN_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(plans)
    }

    async fn record_synced_ids(
        &self,
        id: PlanId,
        ids: &SyncedIds,
        synced_at: OffsetDateTime,
    ) -> BillingResult<()> {
        sqlx::query(
            r#"
            UPDATE plans
            SET stripe_product_id = $1,
                stripe_price_id_monthly = $2,
                stripe_price_id_annually = $3,
                stripe_last_sync_at = $4,
                updated_at = NOW()
            WHERE id = $5
            "#,
        )
        .bind(&ids.product_id)
        .bind(&ids.price_id_monthly)
        .bind(&ids.price_id_annually)
        .bind(synced_at)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn tenant(&self, id: TenantId) -> BillingResult<Option<TenantBillingRecord>> {
        let tenant = sqlx::query_as::<_, TenantBillingRecord>(
            "SELECT id, email, stripe_customer_id FROM tenants WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(tenant)
    }

    async fn record_customer_id(&self, id: TenantId, customer_id: &str) -> BillingResult<()> {
        sqlx::query("UPDATE tenants SET stripe_customer_id = $1, updated_at = NOW() WHERE id = $2")
            .bind(customer_id)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
