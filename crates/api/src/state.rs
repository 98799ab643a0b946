//! Application state

use std::sync::Arc;

use sqlx::PgPool;

use siteforge_billing::{
    BillingProvider, CatalogStore, CheckoutService, PgCatalogStore, PlanArchiveService,
    PlanSyncService, PortalService, StripeClient, StripeConfig, WebhookService,
};

/// The billing services, constructed once at startup and shared by handlers
pub struct BillingServices {
    pub sync: PlanSyncService,
    pub archive: PlanArchiveService,
    pub checkout: CheckoutService,
    pub portal: PortalService,
    pub webhooks: WebhookService,
}

impl BillingServices {
    /// Wire the services over any provider implementation
    pub fn new(
        provider: Arc<dyn BillingProvider>,
        catalog: Arc<dyn CatalogStore>,
        config: &StripeConfig,
    ) -> Self {
        Self {
            sync: PlanSyncService::new(
                provider.clone(),
                catalog.clone(),
                config.currency.clone(),
            ),
            archive: PlanArchiveService::new(provider.clone()),
            checkout: CheckoutService::new(provider.clone(), catalog.clone(), config.clone()),
            portal: PortalService::new(provider, catalog.clone(), config.app_base_url.clone()),
            webhooks: WebhookService::new(catalog, config.webhook_secret.clone()),
        }
    }

    /// Wire the services over the live Stripe client
    pub fn from_stripe(config: StripeConfig, catalog: Arc<dyn CatalogStore>) -> Self {
        let provider: Arc<dyn BillingProvider> = Arc::new(StripeClient::new(config.clone()));
        Self::new(provider, catalog, &config)
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub catalog: Arc<dyn CatalogStore>,
    /// `None` when billing is disabled; the billing routes are not mounted
    pub billing: Option<Arc<BillingServices>>,
}

impl AppState {
    pub fn new(pool: PgPool, billing_config: Option<StripeConfig>) -> Self {
        let catalog: Arc<dyn CatalogStore> = Arc::new(PgCatalogStore::new(pool.clone()));
        let billing =
            billing_config.map(|config| Arc::new(BillingServices::from_stripe(config, catalog.clone())));
        Self {
            pool,
            catalog,
            billing,
        }
    }

    /// State over externally-supplied collaborators
    pub fn with_parts(
        pool: PgPool,
        catalog: Arc<dyn CatalogStore>,
        billing: Option<Arc<BillingServices>>,
    ) -> Self {
        Self {
            pool,
            catalog,
            billing,
        }
    }
}
