//! Billing routes for Stripe integration

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};

use siteforge_shared::{BillingCycle, PlanId, TenantId};

use crate::{error::ApiError, state::AppState};

/// Request to create a checkout session
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateCheckoutRequest {
    pub tenant_id: TenantId,
    pub plan_id: PlanId,
    /// "monthly" or "annually"
    pub billing_cycle: String,
    #[serde(default)]
    pub success_url: Option<String>,
    #[serde(default)]
    pub cancel_url: Option<String>,
}

/// Response from creating a checkout session
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSessionResponse {
    pub success: bool,
    pub session_id: String,
    pub url: Option<String>,
}

/// Create a checkout session for a subscription purchase
pub async fn create_checkout(
    State(state): State<AppState>,
    Json(req): Json<CreateCheckoutRequest>,
) -> Result<Json<CheckoutSessionResponse>, ApiError> {
    let billing = state.billing.as_ref().ok_or(ApiError::ServiceUnavailable)?;

    let cycle = BillingCycle::from_str(&req.billing_cycle).ok_or_else(|| {
        ApiError::Validation(format!("Unknown billing cycle: {}", req.billing_cycle))
    })?;

    let session = billing
        .checkout
        .create_checkout(
            req.tenant_id,
            req.plan_id,
            cycle,
            req.success_url.as_deref(),
            req.cancel_url.as_deref(),
        )
        .await?;

    Ok(Json(CheckoutSessionResponse {
        success: true,
        session_id: session.session_id,
        url: session.url,
    }))
}

/// Request to create a billing portal session
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreatePortalRequest {
    pub tenant_id: TenantId,
    #[serde(default)]
    pub return_url: Option<String>,
}

/// Response from creating a portal session
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortalSessionResponse {
    pub success: bool,
    pub url: String,
}

/// Create a billing portal session
pub async fn create_portal_session(
    State(state): State<AppState>,
    Json(req): Json<CreatePortalRequest>,
) -> Result<Json<PortalSessionResponse>, ApiError> {
    let billing = state.billing.as_ref().ok_or(ApiError::ServiceUnavailable)?;

    let portal = billing
        .portal
        .create_portal(req.tenant_id, req.return_url.as_deref())
        .await?;

    Ok(Json(PortalSessionResponse {
        success: true,
        url: portal.url,
    }))
}

/// Stripe webhook receiver
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<StatusCode, ApiError> {
    let billing = state.billing.as_ref().ok_or(ApiError::ServiceUnavailable)?;

    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            tracing::warn!("Stripe webhook missing signature header");
            ApiError::BadRequest("Missing Stripe signature".to_string())
        })?;

    let event = billing.webhooks.verify_event(&body, signature)?;

    tracing::info!(
        event_type = %event.type_,
        event_id = %event.id,
        "Stripe webhook event verified"
    );

    billing.webhooks.handle_event(event).await?;

    Ok(StatusCode::OK)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::json;
    use tower::ServiceExt;

    use siteforge_billing::testing::{
        plan_fixture, tenant_fixture, InMemoryCatalog, MockBillingProvider,
    };
    use siteforge_shared::BillingCycle;

    use crate::routes::testing::{body_json, post_json, test_router};

    fn purchasable_plan(
        provider: &MockBillingProvider,
        catalog: &InMemoryCatalog,
    ) -> siteforge_billing::PlanDefinition {
        let product_id = provider.seed_product("Growth");
        let price_id = provider.seed_price(&product_id, 4900, "usd", BillingCycle::Monthly);
        let mut plan = plan_fixture("Growth", 49.0, 39.0);
        plan.stripe_product_id = Some(product_id);
        plan.stripe_price_id_monthly = Some(price_id);
        catalog.insert_plan(plan.clone());
        plan
    }

    #[tokio::test]
    async fn checkout_returns_the_session_redirect() {
        let provider = Arc::new(MockBillingProvider::new());
        let catalog = Arc::new(InMemoryCatalog::new());
        let plan = purchasable_plan(&provider, &catalog);
        let tenant = tenant_fixture("owner@example.com", None);
        catalog.insert_tenant(tenant.clone());
        let app = test_router(provider.clone(), catalog.clone());

        let response = app
            .oneshot(post_json(
                "/api/v1/billing/checkout",
                json!({
                    "tenantId": tenant.id,
                    "planId": plan.id,
                    "billingCycle": "monthly",
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["success"], json!(true));
        assert!(body["sessionId"].is_string());
        assert!(body["url"].as_str().unwrap().starts_with("https://checkout.mock/"));

        // The new customer was persisted onto the tenant record
        assert!(catalog
            .stored_tenant(tenant.id)
            .unwrap()
            .stripe_customer_id
            .is_some());
    }

    #[tokio::test]
    async fn missing_cycle_price_reads_as_not_purchasable() {
        let provider = Arc::new(MockBillingProvider::new());
        let catalog = Arc::new(InMemoryCatalog::new());
        let plan = purchasable_plan(&provider, &catalog);
        let tenant = tenant_fixture("owner@example.com", None);
        catalog.insert_tenant(tenant.clone());
        let app = test_router(provider.clone(), catalog);

        let response = app
            .oneshot(post_json(
                "/api/v1/billing/checkout",
                json!({
                    "tenantId": tenant.id,
                    "planId": plan.id,
                    "billingCycle": "annually",
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body = body_json(response).await;
        assert_eq!(body["code"], json!("PLAN_NOT_PURCHASABLE"));
        assert_eq!(body["error"], json!("This plan is not currently purchasable"));
        assert_eq!(provider.total_calls(), 0);
    }

    #[tokio::test]
    async fn unknown_billing_cycle_fails_validation() {
        let provider = Arc::new(MockBillingProvider::new());
        let catalog = Arc::new(InMemoryCatalog::new());
        let plan = purchasable_plan(&provider, &catalog);
        let tenant = tenant_fixture("owner@example.com", None);
        catalog.insert_tenant(tenant.clone());
        let app = test_router(provider, catalog);

        let response = app
            .oneshot(post_json(
                "/api/v1/billing/checkout",
                json!({
                    "tenantId": tenant.id,
                    "planId": plan.id,
                    "billingCycle": "weekly",
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["code"], json!("VALIDATION_ERROR"));
    }

    #[tokio::test]
    async fn portal_requires_a_customer_on_file() {
        let provider = Arc::new(MockBillingProvider::new());
        let catalog = Arc::new(InMemoryCatalog::new());
        let tenant = tenant_fixture("owner@example.com", None);
        catalog.insert_tenant(tenant.clone());
        let app = test_router(provider, catalog);

        let response = app
            .oneshot(post_json(
                "/api/v1/billing/portal",
                json!({ "tenantId": tenant.id }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body = body_json(response).await;
        assert_eq!(body["code"], json!("NO_CUSTOMER_ON_FILE"));
    }

    #[tokio::test]
    async fn portal_redirects_a_known_customer() {
        let provider = Arc::new(MockBillingProvider::new());
        let catalog = Arc::new(InMemoryCatalog::new());
        let tenant = tenant_fixture("owner@example.com", Some("cus_live_1"));
        catalog.insert_tenant(tenant.clone());
        let app = test_router(provider, catalog);

        let response = app
            .oneshot(post_json(
                "/api/v1/billing/portal",
                json!({ "tenantId": tenant.id }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["url"], json!("https://portal.mock/cus_live_1"));
    }

    #[tokio::test]
    async fn webhook_without_a_signature_is_rejected() {
        let provider = Arc::new(MockBillingProvider::new());
        let catalog = Arc::new(InMemoryCatalog::new());
        let app = test_router(provider, catalog);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/billing/webhook")
                    .header("content-type", "application/json")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn webhook_with_a_stale_signature_is_rejected() {
        let provider = Arc::new(MockBillingProvider::new());
        let catalog = Arc::new(InMemoryCatalog::new());
        let app = test_router(provider, catalog);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/billing/webhook")
                    .header("content-type", "application/json")
                    .header("stripe-signature", "t=1,v1=deadbeef")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
