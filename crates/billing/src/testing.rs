//! In-memory mock implementations of the billing seams for tests
#![allow(clippy::unwrap_used)]

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use time::OffsetDateTime;

use siteforge_shared::{BillingCycle, PlanId, TenantId};

use crate::catalog::{CatalogStore, PlanDefinition, SyncedIds, TenantBillingRecord};
use crate::error::{BillingResult, ProviderError};
use crate::provider::{BillingProvider, CheckoutSessionHandle, PriceSnapshot, ProductAttrs};

#[derive(Debug, Clone)]
pub struct MockProduct {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub active: bool,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct MockPrice {
    pub id: String,
    pub product_id: String,
    pub active: bool,
    pub unit_amount: i64,
    pub currency: String,
    pub cycle: BillingCycle,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct MockCustomer {
    pub id: String,
    pub tenant_id: TenantId,
    pub email: String,
}

#[derive(Debug, Clone)]
pub struct MockCheckoutSession {
    pub id: String,
    pub customer_id: String,
    pub price_id: String,
    pub success_url: String,
    pub cancel_url: String,
    pub metadata: HashMap<String, String>,
    pub trial_days: Option<u32>,
}

/// In-memory stand-in for the external billing API.
///
/// Every call is appended to an operation log so tests can assert call
/// counts and ordering. Failures are injected per price id (deactivation)
/// or globally (creation), since those are the calls the services must
/// survive or roll back around.
#[derive(Default)]
pub struct MockBillingProvider {
    products: Mutex<HashMap<String, MockProduct>>,
    prices: Mutex<HashMap<String, MockPrice>>,
    customers: Mutex<Vec<MockCustomer>>,
    checkout_sessions: Mutex<Vec<MockCheckoutSession>>,
    ops: Mutex<Vec<String>>,
    id_counter: Mutex<u64>,
    price_deactivation_failures: Mutex<HashSet<String>>,
    price_creation_fails: Mutex<bool>,
    product_upsert_fails: Mutex<bool>,
}

impl MockBillingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn make_id(&self, prefix: &str) -> String {
        let mut counter = self.id_counter.lock().unwrap();
        *counter += 1;
        format!("{}_mock_{}", prefix, counter)
    }

    fn record(&self, op: String) {
        self.ops.lock().unwrap().push(op);
    }

    pub fn seed_product(&self, name: &str) -> String {
        let id = self.make_id("prod");
        self.products.lock().unwrap().insert(
            id.clone(),
            MockProduct {
                id: id.clone(),
                name: name.to_string(),
                description: None,
                active: true,
                metadata: HashMap::new(),
            },
        );
        id
    }

    pub fn seed_price(
        &self,
        product_id: &str,
        unit_amount: i64,
        currency: &str,
        cycle: BillingCycle,
    ) -> String {
        let id = self.make_id("price");
        self.prices.lock().unwrap().insert(
            id.clone(),
            MockPrice {
                id: id.clone(),
                product_id: product_id.to_string(),
                active: true,
                unit_amount,
                currency: currency.to_string(),
                cycle,
                metadata: HashMap::new(),
            },
        );
        id
    }

    pub fn deactivate_price(&self, price_id: &str) {
        if let Some(price) = self.prices.lock().unwrap().get_mut(price_id) {
            price.active = false;
        }
    }

    /// Make `set_price_active` fail for this price id until cleared
    pub fn fail_price_deactivation(&self, price_id: &str) {
        self.price_deactivation_failures
            .lock()
            .unwrap()
            .insert(price_id.to_string());
    }

    pub fn clear_price_deactivation_failures(&self) {
        self.price_deactivation_failures.lock().unwrap().clear();
    }

    /// Make every `create_price` call fail until cleared
    pub fn fail_price_creation(&self) {
        *self.price_creation_fails.lock().unwrap() = true;
    }

    /// Make every `upsert_product` call fail until cleared
    pub fn fail_product_upsert(&self) {
        *self.product_upsert_fails.lock().unwrap() = true;
    }

    pub fn product(&self, id: &str) -> Option<MockProduct> {
        self.products.lock().unwrap().get(id).cloned()
    }

    pub fn price(&self, id: &str) -> Option<MockPrice> {
        self.prices.lock().unwrap().get(id).cloned()
    }

    pub fn customers(&self) -> Vec<MockCustomer> {
        self.customers.lock().unwrap().clone()
    }

    pub fn checkout_sessions(&self) -> Vec<MockCheckoutSession> {
        self.checkout_sessions.lock().unwrap().clone()
    }

    /// The full operation log, in call order
    pub fn ops(&self) -> Vec<String> {
        self.ops.lock().unwrap().clone()
    }

    pub fn total_calls(&self) -> usize {
        self.ops.lock().unwrap().len()
    }

    pub fn get_price_calls(&self) -> usize {
        self.calls_matching("get_price:")
    }

    pub fn create_price_calls(&self) -> usize {
        self.calls_matching("create_price:")
    }

    pub fn upsert_product_calls(&self) -> usize {
        self.calls_matching("upsert_product:")
    }

    fn calls_matching(&self, prefix: &str) -> usize {
        self.ops
            .lock()
            .unwrap()
            .iter()
            .filter(|op| op.starts_with(prefix))
            .count()
    }
}

#[async_trait]
impl BillingProvider for MockBillingProvider {
    async fn upsert_product(
        &self,
        existing_id: Option<&str>,
        attrs: &ProductAttrs,
    ) -> Result<String, ProviderError> {
        self.record(format!(
            "upsert_product:{}",
            existing_id.unwrap_or("new")
        ));
        if *self.product_upsert_fails.lock().unwrap() {
            return Err(ProviderError::new("injected product upsert failure"));
        }

        match existing_id {
            Some(id) => {
                let mut products = self.products.lock().unwrap();
                let product = products
                    .get_mut(id)
                    .ok_or_else(|| ProviderError::new(format!("No such product: {}", id)))?;
                product.name = attrs.name.clone();
                product.description = attrs.description.clone();
                product.active = attrs.active;
                product.metadata = attrs.metadata.clone();
                Ok(id.to_string())
            }
            None => {
                let id = self.make_id("prod");
                self.products.lock().unwrap().insert(
                    id.clone(),
                    MockProduct {
                        id: id.clone(),
                        name: attrs.name.clone(),
                        description: attrs.description.clone(),
                        active: attrs.active,
                        metadata: attrs.metadata.clone(),
                    },
                );
                Ok(id)
            }
        }
    }

    async fn set_product_active(
        &self,
        product_id: &str,
        active: bool,
    ) -> Result<(), ProviderError> {
        self.record(format!("set_product_active:{}:{}", product_id, active));
        let mut products = self.products.lock().unwrap();
        let product = products
            .get_mut(product_id)
            .ok_or_else(|| ProviderError::new(format!("No such product: {}", product_id)))?;
        product.active = active;
        Ok(())
    }

    async fn create_price(
        &self,
        product_id: &str,
        unit_amount: i64,
        currency: &str,
        cycle: BillingCycle,
        metadata: HashMap<String, String>,
    ) -> Result<String, ProviderError> {
        self.record(format!("create_price:{}:{}", product_id, cycle));
        if *self.price_creation_fails.lock().unwrap() {
            return Err(ProviderError::new("injected price creation failure"));
        }

        let id = self.make_id("price");
        self.prices.lock().unwrap().insert(
            id.clone(),
            MockPrice {
                id: id.clone(),
                product_id: product_id.to_string(),
                active: true,
                unit_amount,
                currency: currency.to_string(),
                cycle,
                metadata,
            },
        );
        Ok(id)
    }

    async fn get_price(&self, price_id: &str) -> Result<Option<PriceSnapshot>, ProviderError> {
        self.record(format!("get_price:{}", price_id));
        Ok(self
            .prices
            .lock()
            .unwrap()
            .get(price_id)
            .map(|price| PriceSnapshot {
                active: price.active,
                unit_amount: price.unit_amount,
                currency: price.currency.clone(),
                interval: Some(price.cycle),
            }))
    }

    async fn set_price_active(&self, price_id: &str, active: bool) -> Result<(), ProviderError> {
        self.record(format!("set_price_active:{}:{}", price_id, active));
        if self
            .price_deactivation_failures
            .lock()
            .unwrap()
            .contains(price_id)
        {
            return Err(ProviderError::new(format!(
                "injected deactivation failure for {}",
                price_id
            )));
        }

        let mut prices = self.prices.lock().unwrap();
        let price = prices
            .get_mut(price_id)
            .ok_or_else(|| ProviderError::new(format!("No such price: {}", price_id)))?;
        price.active = active;
        Ok(())
    }

    async fn list_active_prices(&self, product_id: &str) -> Result<Vec<String>, ProviderError> {
        self.record(format!("list_active_prices:{}", product_id));
        let mut ids: Vec<String> = self
            .prices
            .lock()
            .unwrap()
            .values()
            .filter(|price| price.product_id == product_id && price.active)
            .map(|price| price.id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn create_customer(
        &self,
        tenant_id: TenantId,
        email: &str,
    ) -> Result<String, ProviderError> {
        self.record(format!("create_customer:{}", tenant_id));
        let id = self.make_id("cus");
        self.customers.lock().unwrap().push(MockCustomer {
            id: id.clone(),
            tenant_id,
            email: email.to_string(),
        });
        Ok(id)
    }

    async fn create_checkout_session(
        &self,
        customer_id: &str,
        price_id: &str,
        success_url: &str,
        cancel_url: &str,
        metadata: HashMap<String, String>,
        trial_days: Option<u32>,
    ) -> Result<CheckoutSessionHandle, ProviderError> {
        self.record(format!("create_checkout_session:{}", price_id));
        let id = self.make_id("cs");
        self.checkout_sessions.lock().unwrap().push(MockCheckoutSession {
            id: id.clone(),
            customer_id: customer_id.to_string(),
            price_id: price_id.to_string(),
            success_url: success_url.to_string(),
            cancel_url: cancel_url.to_string(),
            metadata,
            trial_days,
        });
        Ok(CheckoutSessionHandle {
            url: Some(format!("https://checkout.mock/{}", id)),
            id,
        })
    }

    async fn create_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> Result<String, ProviderError> {
        self.record(format!(
            "create_portal_session:{}:{}",
            customer_id, return_url
        ));
        Ok(format!("https://portal.mock/{}", customer_id))
    }
}

/// In-memory catalog store mirroring the Postgres merge semantics
#[derive(Default)]
pub struct InMemoryCatalog {
    plans: Mutex<HashMap<PlanId, PlanDefinition>>,
    tenants: Mutex<HashMap<TenantId, TenantBillingRecord>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_plans(plans: Vec<PlanDefinition>) -> Self {
        let map = plans.into_iter().map(|plan| (plan.id, plan)).collect();
        Self {
            plans: Mutex::new(map),
            tenants: Mutex::new(HashMap::new()),
        }
    }

    pub fn insert_plan(&self, plan: PlanDefinition) {
        self.plans.lock().unwrap().insert(plan.id, plan);
    }

    pub fn insert_tenant(&self, tenant: TenantBillingRecord) {
        self.tenants.lock().unwrap().insert(tenant.id, tenant);
    }

    pub fn stored_plan(&self, id: PlanId) -> Option<PlanDefinition> {
        self.plans.lock().unwrap().get(&id).cloned()
    }

    pub fn stored_tenant(&self, id: TenantId) -> Option<TenantBillingRecord> {
        self.tenants.lock().unwrap().get(&id).cloned()
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalog {
    async fn plan(&self, id: PlanId) -> BillingResult<Option<PlanDefinition>> {
        Ok(self.plans.lock().unwrap().get(&id).cloned())
    }

    async fn upsert_plan(&self, plan: &PlanDefinition) -> BillingResult<PlanDefinition> {
        let mut plans = self.plans.lock().unwrap();
        let merged = match plans.get(&plan.id) {
            Some(existing) => {
                let mut merged = plan.clone();
                merged.stripe_product_id = existing.stripe_product_id.clone();
                merged.stripe_price_id_monthly = existing.stripe_price_id_monthly.clone();
                merged.stripe_price_id_annually = existing.stripe_price_id_annually.clone();
                merged.stripe_last_sync_at = existing.stripe_last_sync_at;
                merged
            }
            None => plan.clone(),
        };
        plans.insert(merged.id, merged.clone());
        Ok(merged)
    }

    async fn list_public_plans(&self) -> BillingResult<Vec<PlanDefinition>> {
        let mut plans: Vec<PlanDefinition> = self
            .plans
            .lock()
            .unwrap()
            .values()
            .filter(|plan| !plan.is_archived)
            .cloned()
            .collect();
        plans.sort_by(|a, b| {
            a.monthly_price
                .partial_cmp(&b.monthly_price)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(plans)
    }

    async fn record_synced_ids(
        &self,
        id: PlanId,
        ids: &SyncedIds,
        synced_at: OffsetDateTime,
    ) -> BillingResult<()> {
        let mut plans = self.plans.lock().unwrap();
        if let Some(plan) = plans.get_mut(&id) {
            plan.stripe_product_id = Some(ids.product_id.clone());
            plan.stripe_price_id_monthly = ids.price_id_monthly.clone();
            plan.stripe_price_id_annually = ids.price_id_annually.clone();
            plan.stripe_last_sync_at = Some(synced_at);
        }
        Ok(())
    }

    async fn tenant(&self, id: TenantId) -> BillingResult<Option<TenantBillingRecord>> {
        Ok(self.tenants.lock().unwrap().get(&id).cloned())
    }

    async fn record_customer_id(&self, id: TenantId, customer_id: &str) -> BillingResult<()> {
        let mut tenants = self.tenants.lock().unwrap();
        if let Some(tenant) = tenants.get_mut(&id) {
            tenant.stripe_customer_id = Some(customer_id.to_string());
        }
        Ok(())
    }
}

/// A plan definition with the given prices and no synced references
pub fn plan_fixture(name: &str, monthly_price: f64, annual_price: f64) -> PlanDefinition {
    PlanDefinition {
        id: PlanId::new(),
        name: name.to_string(),
        description: Some(format!("{} plan", name)),
        monthly_price,
        annual_price,
        features: vec!["Custom domain".to_string(), "Unlimited pages".to_string()],
        is_featured: false,
        is_archived: false,
        stripe_product_id: None,
        stripe_price_id_monthly: None,
        stripe_price_id_annually: None,
        stripe_last_sync_at: None,
    }
}

/// A tenant record, optionally with a billing customer already on file
pub fn tenant_fixture(email: &str, customer_id: Option<&str>) -> TenantBillingRecord {
    TenantBillingRecord {
        id: TenantId::new(),
        email: email.to_string(),
        stripe_customer_id: customer_id.map(str::to_string),
    }
}
