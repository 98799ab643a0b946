//! API routes

pub mod billing;
pub mod health;
pub mod plans;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;

/// Create all API routes
pub fn create_router(state: AppState) -> Router {
    // Health check routes (at root level for infrastructure monitoring)
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    // The public catalog read works even when billing is disabled
    let mut api_v1_routes = Router::new().route("/plans", get(plans::list_plans));

    // Provider-facing routes are mounted only when billing is configured
    if state.billing.is_some() {
        api_v1_routes = api_v1_routes
            // Plan administration
            .route("/plans/sync", post(plans::sync_plan))
            .route("/plans/archive", post(plans::archive_plan))
            // Tenant purchase flow
            .route("/billing/checkout", post(billing::create_checkout))
            .route("/billing/portal", post(billing::create_portal_session))
            // Stripe webhook (public, uses signature verification)
            .route("/billing/webhook", post(billing::webhook));
    }

    Router::new()
        .merge(health_routes)
        .nest("/api/v1", api_v1_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(CompressionLayer::new()),
        )
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .with_state(state)
}

/// Route harness shared by the handler test modules
#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod testing {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::Request;
    use serde_json::Value;

    use siteforge_billing::testing::{InMemoryCatalog, MockBillingProvider};
    use siteforge_billing::{CatalogStore, StripeConfig};

    use crate::routes::create_router;
    use crate::state::{AppState, BillingServices};

    /// Full route stack backed by the mock provider and an in-memory catalog
    pub fn test_router(
        provider: Arc<MockBillingProvider>,
        catalog: Arc<InMemoryCatalog>,
    ) -> axum::Router {
        let config = StripeConfig {
            secret_key: "sk_test_unused".to_string(),
            webhook_secret: "whsec_test".to_string(),
            currency: "usd".to_string(),
            app_base_url: "https://app.siteforge.test".to_string(),
            trial_plan_ids: Vec::new(),
            trial_period_days: 14,
        };
        let store: Arc<dyn CatalogStore> = catalog;
        let billing = Arc::new(BillingServices::new(provider, store.clone(), &config));
        // Never connected; handlers under test go through the catalog instead
        let pool = sqlx::PgPool::connect_lazy("postgres://localhost/unused").unwrap();
        create_router(AppState::with_parts(pool, store, Some(billing)))
    }

    pub fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    pub async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }
}
