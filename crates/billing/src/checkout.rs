//! Checkout session issuance

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use siteforge_shared::{BillingCycle, PlanId, TenantId};

use crate::catalog::CatalogStore;
use crate::client::StripeConfig;
use crate::error::{BillingError, BillingResult};
use crate::provider::BillingProvider;

/// Result of issuing a checkout session
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub session_id: String,
    pub url: Option<String>,
}

/// Issues provider checkout sessions for plan purchases
pub struct CheckoutService {
    provider: Arc<dyn BillingProvider>,
    catalog: Arc<dyn CatalogStore>,
    config: StripeConfig,
}

impl CheckoutService {
    pub fn new(
        provider: Arc<dyn BillingProvider>,
        catalog: Arc<dyn CatalogStore>,
        config: StripeConfig,
    ) -> Self {
        Self {
            provider,
            catalog,
            config,
        }
    }

    /// Create a checkout session for a tenant buying a plan on the given
    /// billing cycle.
    ///
    /// A plan without a price for the requested cycle fails with
    /// `PriceNotConfigured` before any provider call is made. A tenant
    /// with no billing customer gets one created and persisted before the
    /// session is requested.
    pub async fn create_checkout(
        &self,
        tenant_id: TenantId,
        plan_id: PlanId,
        cycle: BillingCycle,
        success_url: Option<&str>,
        cancel_url: Option<&str>,
    ) -> BillingResult<CheckoutResponse> {
        let plan = self
            .catalog
            .plan(plan_id)
            .await?
            .ok_or(BillingError::PlanNotFound(plan_id))?;

        let price_id = plan
            .price_id_for(cycle)
            .ok_or(BillingError::PriceNotConfigured { plan_id, cycle })?
            .to_string();

        let tenant = self
            .catalog
            .tenant(tenant_id)
            .await?
            .ok_or(BillingError::TenantNotFound(tenant_id))?;

        let customer_id = match tenant.stripe_customer_id {
            Some(existing) => existing,
            None => {
                let created = self
                    .provider
                    .create_customer(tenant_id, &tenant.email)
                    .await?;
                // Persisted before the session is created; retries reuse
                // this customer instead of minting another.
                self.catalog.record_customer_id(tenant_id, &created).await?;
                created
            }
        };

        let success_url = match success_url {
            Some(url) => url.to_string(),
            None => format!(
                "{}/billing/success?session_id={{CHECKOUT_SESSION_ID}}",
                self.config.app_base_url
            ),
        };
        let cancel_url = match cancel_url {
            Some(url) => url.to_string(),
            None => format!("{}/billing/cancel", self.config.app_base_url),
        };

        let trial_days = if self.config.plan_has_trial(plan_id) {
            Some(self.config.trial_period_days)
        } else {
            None
        };

        let mut metadata = HashMap::new();
        metadata.insert("tenantId".to_string(), tenant_id.to_string());
        metadata.insert("planId".to_string(), plan_id.to_string());
        metadata.insert("billingCycle".to_string(), cycle.as_str().to_string());

        let session = self
            .provider
            .create_checkout_session(
                &customer_id,
                &price_id,
                &success_url,
                &cancel_url,
                metadata,
                trial_days,
            )
            .await?;

        tracing::info!(
            tenant_id = %tenant_id,
            plan_id = %plan_id,
            session_id = %session.id,
            cycle = %cycle,
            "Created checkout session"
        );

        Ok(CheckoutResponse {
            session_id: session.id,
            url: session.url,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::testing::{plan_fixture, tenant_fixture, InMemoryCatalog, MockBillingProvider};

    fn test_config(trial_plan_ids: Vec<PlanId>) -> StripeConfig {
        StripeConfig {
            secret_key: "sk_test_unused".to_string(),
            webhook_secret: "whsec_test".to_string(),
            currency: "usd".to_string(),
            app_base_url: "https://app.siteforge.test".to_string(),
            trial_plan_ids,
            trial_period_days: 14,
        }
    }

    fn build(
        trial_plan_ids: Vec<PlanId>,
    ) -> (Arc<MockBillingProvider>, Arc<InMemoryCatalog>, CheckoutService) {
        let provider = Arc::new(MockBillingProvider::new());
        let catalog = Arc::new(InMemoryCatalog::new());
        let service = CheckoutService::new(
            provider.clone(),
            catalog.clone(),
            test_config(trial_plan_ids),
        );
        (provider, catalog, service)
    }

    fn purchasable_plan(provider: &MockBillingProvider) -> crate::catalog::PlanDefinition {
        let mut plan = plan_fixture("Pro", 49.0, 39.0);
        let product_id = provider.seed_product("Pro");
        let monthly = provider.seed_price(&product_id, 4900, "usd", BillingCycle::Monthly);
        plan.stripe_product_id = Some(product_id);
        plan.stripe_price_id_monthly = Some(monthly);
        plan
    }

    #[tokio::test]
    async fn unknown_plan_fails_with_plan_not_found() {
        let (_, catalog, service) = build(Vec::new());
        let tenant = tenant_fixture("owner@example.com", None);
        catalog.insert_tenant(tenant.clone());

        let missing = PlanId::new();
        let err = service
            .create_checkout(tenant.id, missing, BillingCycle::Monthly, None, None)
            .await
            .unwrap_err();

        assert!(matches!(err, BillingError::PlanNotFound(id) if id == missing));
    }

    #[tokio::test]
    async fn missing_cycle_price_fails_before_any_provider_call() {
        let (provider, catalog, service) = build(Vec::new());
        let plan = plan_fixture("Free", 0.0, 0.0);
        catalog.insert_plan(plan.clone());
        let tenant = tenant_fixture("owner@example.com", None);
        catalog.insert_tenant(tenant.clone());

        let err = service
            .create_checkout(tenant.id, plan.id, BillingCycle::Monthly, None, None)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            BillingError::PriceNotConfigured { plan_id, cycle }
                if plan_id == plan.id && cycle == BillingCycle::Monthly
        ));
        assert_eq!(provider.total_calls(), 0);
    }

    #[tokio::test]
    async fn unknown_tenant_fails_with_tenant_not_found() {
        let (provider, catalog, service) = build(Vec::new());
        let plan = purchasable_plan(&provider);
        catalog.insert_plan(plan.clone());

        let missing = TenantId::new();
        let err = service
            .create_checkout(missing, plan.id, BillingCycle::Monthly, None, None)
            .await
            .unwrap_err();

        assert!(matches!(err, BillingError::TenantNotFound(id) if id == missing));
    }

    #[tokio::test]
    async fn first_checkout_creates_and_persists_the_customer() {
        let (provider, catalog, service) = build(Vec::new());
        let plan = purchasable_plan(&provider);
        catalog.insert_plan(plan.clone());
        let tenant = tenant_fixture("owner@example.com", None);
        catalog.insert_tenant(tenant.clone());

        service
            .create_checkout(tenant.id, plan.id, BillingCycle::Monthly, None, None)
            .await
            .unwrap();

        let customers = provider.customers();
        assert_eq!(customers.len(), 1);
        assert_eq!(customers[0].email, "owner@example.com");

        let stored = catalog.stored_tenant(tenant.id).unwrap();
        assert_eq!(stored.stripe_customer_id, Some(customers[0].id.clone()));

        // The customer id is persisted before the session call goes out.
        let ops = provider.ops();
        let create_pos = ops
            .iter()
            .position(|op| op.starts_with("create_customer:"))
            .unwrap();
        let session_pos = ops
            .iter()
            .position(|op| op.starts_with("create_checkout_session:"))
            .unwrap();
        assert!(create_pos < session_pos);

        // A second checkout reuses the same customer.
        service
            .create_checkout(tenant.id, plan.id, BillingCycle::Monthly, None, None)
            .await
            .unwrap();
        assert_eq!(provider.customers().len(), 1);
    }

    #[tokio::test]
    async fn trial_applies_only_to_allowlisted_plans() {
        let provider = Arc::new(MockBillingProvider::new());

        let trial_plan = purchasable_plan(&provider);
        let plain_plan = purchasable_plan(&provider);
        let catalog = Arc::new(InMemoryCatalog::with_plans(vec![
            trial_plan.clone(),
            plain_plan.clone(),
        ]));

        let tenant = tenant_fixture("owner@example.com", Some("cus_mock_existing"));
        catalog.insert_tenant(tenant.clone());

        let service = CheckoutService::new(
            provider.clone(),
            catalog.clone(),
            test_config(vec![trial_plan.id]),
        );

        service
            .create_checkout(tenant.id, trial_plan.id, BillingCycle::Monthly, None, None)
            .await
            .unwrap();
        service
            .create_checkout(tenant.id, plain_plan.id, BillingCycle::Monthly, None, None)
            .await
            .unwrap();

        let sessions = provider.checkout_sessions();
        assert_eq!(sessions[0].trial_days, Some(14));
        assert_eq!(sessions[1].trial_days, None);
    }

    #[tokio::test]
    async fn session_metadata_correlates_tenant_plan_and_cycle() {
        let (provider, catalog, service) = build(Vec::new());
        let mut plan = purchasable_plan(&provider);
        let annual = provider.seed_price(
            plan.stripe_product_id.as_deref().unwrap(),
            46800,
            "usd",
            BillingCycle::Annually,
        );
        plan.stripe_price_id_annually = Some(annual);
        catalog.insert_plan(plan.clone());
        let tenant = tenant_fixture("owner@example.com", Some("cus_mock_existing"));
        catalog.insert_tenant(tenant.clone());

        service
            .create_checkout(tenant.id, plan.id, BillingCycle::Annually, None, None)
            .await
            .unwrap();

        let session = provider.checkout_sessions().pop().unwrap();
        assert_eq!(
            session.metadata.get("tenantId"),
            Some(&tenant.id.to_string())
        );
        assert_eq!(session.metadata.get("planId"), Some(&plan.id.to_string()));
        assert_eq!(
            session.metadata.get("billingCycle"),
            Some(&"annually".to_string())
        );
        assert_eq!(session.price_id, plan.stripe_price_id_annually.unwrap());
    }

    #[tokio::test]
    async fn default_urls_are_derived_from_the_app_base() {
        let (provider, catalog, service) = build(Vec::new());
        let plan = purchasable_plan(&provider);
        catalog.insert_plan(plan.clone());
        let tenant = tenant_fixture("owner@example.com", Some("cus_mock_existing"));
        catalog.insert_tenant(tenant.clone());

        service
            .create_checkout(tenant.id, plan.id, BillingCycle::Monthly, None, None)
            .await
            .unwrap();

        let session = provider.checkout_sessions().pop().unwrap();
        assert_eq!(
            session.success_url,
            "https://app.siteforge.test/billing/success?session_id={CHECKOUT_SESSION_ID}"
        );
        assert_eq!(session.cancel_url, "https://app.siteforge.test/billing/cancel");
    }

    #[tokio::test]
    async fn explicit_urls_override_the_defaults() {
        let (provider, catalog, service) = build(Vec::new());
        let plan = purchasable_plan(&provider);
        catalog.insert_plan(plan.clone());
        let tenant = tenant_fixture("owner@example.com", Some("cus_mock_existing"));
        catalog.insert_tenant(tenant.clone());

        service
            .create_checkout(
                tenant.id,
                plan.id,
                BillingCycle::Monthly,
                Some("https://other.example/done"),
                Some("https://other.example/back"),
            )
            .await
            .unwrap();

        let session = provider.checkout_sessions().pop().unwrap();
        assert_eq!(session.success_url, "https://other.example/done");
        assert_eq!(session.cancel_url, "https://other.example/back");
    }
}
