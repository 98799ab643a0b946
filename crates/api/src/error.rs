//! API error types and handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use siteforge_billing::BillingError;

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    // Validation errors
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Invalid request: {0}")]
    BadRequest(String),

    // Resource errors
    #[error("{0}")]
    NotFound(String),

    // Billing state errors (legitimate configuration, not failures)
    #[error("This plan is not currently purchasable")]
    PlanNotPurchasable,
    #[error("No billing customer on file; complete a checkout first")]
    NoCustomerOnFile,
    #[error("Failed to archive {} price(s) on product {product_id}", failed_price_ids.len())]
    ArchiveIncomplete {
        product_id: String,
        failed_price_ids: Vec<String>,
    },

    // Upstream billing provider
    #[error("Billing provider error: {0}")]
    Provider(String),

    // Internal errors
    #[error("Database error: {0}")]
    Database(String),
    #[error("Internal server error")]
    Internal,
    #[error("Service unavailable")]
    ServiceUnavailable,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // Validation
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),

            // Resources
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),

            // Billing state
            ApiError::PlanNotPurchasable => {
                (StatusCode::CONFLICT, "PLAN_NOT_PURCHASABLE", self.to_string())
            }
            ApiError::NoCustomerOnFile => {
                (StatusCode::CONFLICT, "NO_CUSTOMER_ON_FILE", self.to_string())
            }
            ApiError::ArchiveIncomplete { .. } => {
                (StatusCode::BAD_GATEWAY, "ARCHIVE_INCOMPLETE", self.to_string())
            }

            // Provider
            ApiError::Provider(msg) => (StatusCode::BAD_GATEWAY, "PROVIDER_ERROR", msg.clone()),

            // Internal
            ApiError::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "DATABASE_ERROR",
                "Database error".to_string(),
            ),
            ApiError::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", self.to_string()),
            ApiError::ServiceUnavailable => {
                (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", self.to_string())
            }
        };

        let mut body = json!({
            "success": false,
            "code": code,
            "error": message,
        });
        // Callers retry just the prices that are still active
        if let ApiError::ArchiveIncomplete {
            failed_price_ids, ..
        } = &self
        {
            body["failedPriceIds"] = json!(failed_price_ids);
        }

        (status, Json(body)).into_response()
    }
}

impl From<BillingError> for ApiError {
    fn from(err: BillingError) -> Self {
        match err {
            BillingError::PlanNotFound(_) | BillingError::TenantNotFound(_) => {
                ApiError::NotFound(err.to_string())
            }
            BillingError::PriceNotConfigured { .. } => ApiError::PlanNotPurchasable,
            BillingError::NoCustomerOnFile(_) => ApiError::NoCustomerOnFile,
            BillingError::Archive {
                product_id,
                failed_price_ids,
            } => ApiError::ArchiveIncomplete {
                product_id,
                failed_price_ids,
            },
            BillingError::WebhookSignatureInvalid => {
                ApiError::BadRequest("Invalid webhook signature".to_string())
            }
            BillingError::WebhookEventNotSupported(msg) => ApiError::BadRequest(msg),
            BillingError::Database(msg) => ApiError::Database(msg),
            BillingError::Config(msg) => {
                tracing::error!(error = %msg, "Billing configuration error");
                ApiError::Internal
            }
            BillingError::Provider(_) | BillingError::Sync { .. } => {
                ApiError::Provider(err.to_string())
            }
        }
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use siteforge_billing::ProviderError;
    use siteforge_shared::{BillingCycle, PlanId, TenantId};

    #[test]
    fn missing_price_maps_to_not_purchasable() {
        let err: ApiError = BillingError::PriceNotConfigured {
            plan_id: PlanId::new(),
            cycle: BillingCycle::Monthly,
        }
        .into();

        assert!(matches!(err, ApiError::PlanNotPurchasable));
        assert_eq!(err.to_string(), "This plan is not currently purchasable");
    }

    #[test]
    fn partial_archive_keeps_the_failed_price_ids() {
        let err: ApiError = BillingError::Archive {
            product_id: "prod_1".to_string(),
            failed_price_ids: vec!["price_1".to_string(), "price_2".to_string()],
        }
        .into();

        match err {
            ApiError::ArchiveIncomplete {
                product_id,
                failed_price_ids,
            } => {
                assert_eq!(product_id, "prod_1");
                assert_eq!(failed_price_ids.len(), 2);
            }
            other => panic!("unexpected mapping: {:?}", other),
        }
    }

    #[test]
    fn missing_customer_maps_to_conflict_variant() {
        let err: ApiError = BillingError::NoCustomerOnFile(TenantId::new()).into();
        assert!(matches!(err, ApiError::NoCustomerOnFile));
    }

    #[test]
    fn sync_failures_surface_the_plan_context() {
        let err: ApiError = BillingError::Sync {
            plan_id: PlanId::new(),
            source: ProviderError::new("rate limited"),
        }
        .into();

        match err {
            ApiError::Provider(msg) => assert!(msg.contains("rate limited")),
            other => panic!("unexpected mapping: {:?}", other),
        }
    }
}
