//! Self-service billing portal sessions

use std::sync::Arc;

use siteforge_shared::TenantId;

use crate::catalog::CatalogStore;
use crate::error::{BillingError, BillingResult};
use crate::provider::BillingProvider;

/// Response for creating a portal session
#[derive(Debug, serde::Serialize)]
pub struct PortalResponse {
    pub url: String,
}

/// Issues provider portal sessions for subscription self-service
pub struct PortalService {
    provider: Arc<dyn BillingProvider>,
    catalog: Arc<dyn CatalogStore>,
    app_base_url: String,
}

impl PortalService {
    pub fn new(
        provider: Arc<dyn BillingProvider>,
        catalog: Arc<dyn CatalogStore>,
        app_base_url: String,
    ) -> Self {
        Self {
            provider,
            catalog,
            app_base_url,
        }
    }

    /// Create a portal session for a tenant. Fails with `NoCustomerOnFile`
    /// when the tenant has never completed a checkout.
    pub async fn create_portal(
        &self,
        tenant_id: TenantId,
        return_url: Option<&str>,
    ) -> BillingResult<PortalResponse> {
        let tenant = self
            .catalog
            .tenant(tenant_id)
            .await?
            .ok_or(BillingError::TenantNotFound(tenant_id))?;

        let customer_id = tenant
            .stripe_customer_id
            .ok_or(BillingError::NoCustomerOnFile(tenant_id))?;

        let return_url = match return_url {
            Some(url) => url.to_string(),
            None => format!("{}/billing", self.app_base_url),
        };

        let url = self
            .provider
            .create_portal_session(&customer_id, &return_url)
            .await?;

        tracing::info!(
            tenant_id = %tenant_id,
            customer_id = %customer_id,
            "Created billing portal session"
        );

        Ok(PortalResponse { url })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::testing::{tenant_fixture, InMemoryCatalog, MockBillingProvider};

    fn build() -> (Arc<MockBillingProvider>, Arc<InMemoryCatalog>, PortalService) {
        let provider = Arc::new(MockBillingProvider::new());
        let catalog = Arc::new(InMemoryCatalog::new());
        let service = PortalService::new(
            provider.clone(),
            catalog.clone(),
            "https://app.siteforge.test".to_string(),
        );
        (provider, catalog, service)
    }

    #[tokio::test]
    async fn tenant_without_customer_fails_with_no_customer_on_file() {
        let (provider, catalog, service) = build();
        let tenant = tenant_fixture("owner@example.com", None);
        catalog.insert_tenant(tenant.clone());

        let err = service.create_portal(tenant.id, None).await.unwrap_err();

        assert!(matches!(err, BillingError::NoCustomerOnFile(id) if id == tenant.id));
        assert_eq!(provider.total_calls(), 0);
    }

    #[tokio::test]
    async fn unknown_tenant_fails_with_tenant_not_found() {
        let (_, _, service) = build();

        let missing = TenantId::new();
        let err = service.create_portal(missing, None).await.unwrap_err();

        assert!(matches!(err, BillingError::TenantNotFound(id) if id == missing));
    }

    #[tokio::test]
    async fn portal_session_uses_the_stored_customer_and_default_return() {
        let (provider, catalog, service) = build();
        let tenant = tenant_fixture("owner@example.com", Some("cus_mock_7"));
        catalog.insert_tenant(tenant.clone());

        let response = service.create_portal(tenant.id, None).await.unwrap();

        assert_eq!(response.url, "https://portal.mock/cus_mock_7");
        assert_eq!(
            provider.ops(),
            vec![
                "create_portal_session:cus_mock_7:https://app.siteforge.test/billing".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn explicit_return_url_is_passed_through() {
        let (provider, catalog, service) = build();
        let tenant = tenant_fixture("owner@example.com", Some("cus_mock_7"));
        catalog.insert_tenant(tenant.clone());

        service
            .create_portal(tenant.id, Some("https://other.example/account"))
            .await
            .unwrap();

        assert!(provider.ops()[0].ends_with(":https://other.example/account"));
    }
}
