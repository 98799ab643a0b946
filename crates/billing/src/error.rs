//! Billing error types

use siteforge_shared::{BillingCycle, PlanId, TenantId};
use thiserror::Error;

/// A failure talking to the external billing provider, carrying the
/// provider's own message
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ProviderError {
    pub message: String,
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<stripe::StripeError> for ProviderError {
    fn from(err: stripe::StripeError) -> Self {
        Self::new(err.to_string())
    }
}

/// Billing-specific errors
#[derive(Debug, Error)]
pub enum BillingError {
    #[error("Billing provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Plan sync failed for {plan_id}: {source}")]
    Sync {
        plan_id: PlanId,
        #[source]
        source: ProviderError,
    },

    #[error("Archive left {} price(s) active on product {product_id}", failed_price_ids.len())]
    Archive {
        product_id: String,
        /// Price ids that could not be deactivated; retry just these
        failed_price_ids: Vec<String>,
    },

    #[error("Plan not found: {0}")]
    PlanNotFound(PlanId),

    #[error("Plan {plan_id} has no {cycle} price configured")]
    PriceNotConfigured { plan_id: PlanId, cycle: BillingCycle },

    #[error("Tenant not found: {0}")]
    TenantNotFound(TenantId),

    #[error("No billing customer on file for tenant {0}")]
    NoCustomerOnFile(TenantId),

    #[error("Invalid webhook signature")]
    WebhookSignatureInvalid,

    #[error("Unsupported webhook event: {0}")]
    WebhookEventNotSupported(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<sqlx::Error> for BillingError {
    fn from(err: sqlx::Error) -> Self {
        BillingError::Database(err.to_string())
    }
}

pub type BillingResult<T> = Result<T, BillingError>;
