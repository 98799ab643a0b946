//! Capability interface over the external billing provider

use std::collections::HashMap;

use async_trait::async_trait;
use siteforge_shared::{BillingCycle, TenantId};

use crate::error::ProviderError;

/// Attributes pushed to the provider when creating or updating a product
#[derive(Debug, Clone)]
pub struct ProductAttrs {
    pub name: String,
    pub description: Option<String>,
    pub active: bool,
    pub metadata: HashMap<String, String>,
}

/// Point-in-time view of an external price, as returned by lookup
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSnapshot {
    pub active: bool,
    /// Integer minor currency units
    pub unit_amount: i64,
    /// Lowercase ISO currency code
    pub currency: String,
    /// None for one-off (non-recurring) prices
    pub interval: Option<BillingCycle>,
}

/// Provider-issued checkout session handle
#[derive(Debug, Clone)]
pub struct CheckoutSessionHandle {
    pub id: String,
    pub url: Option<String>,
}

/// Interface over the external billing API.
///
/// All monetary amounts cross this boundary in integer minor currency
/// units. A failed call signals `ProviderError`; callers must not assume a
/// failure left behind a usable object.
#[async_trait]
pub trait BillingProvider: Send + Sync {
    /// Create the product, or update name/description/active/metadata in
    /// place when `existing_id` is given. Returns the product id.
    async fn upsert_product(
        &self,
        existing_id: Option<&str>,
        attrs: &ProductAttrs,
    ) -> Result<String, ProviderError>;

    async fn set_product_active(
        &self,
        product_id: &str,
        active: bool,
    ) -> Result<(), ProviderError>;

    /// Create a recurring price under `product_id`. Prices are immutable
    /// once created; a wrong one can only be archived and replaced.
    async fn create_price(
        &self,
        product_id: &str,
        unit_amount: i64,
        currency: &str,
        cycle: BillingCycle,
        metadata: HashMap<String, String>,
    ) -> Result<String, ProviderError>;

    /// Look up a price. `Ok(None)` means the provider reports it missing,
    /// which callers treat differently from a transport failure.
    async fn get_price(&self, price_id: &str) -> Result<Option<PriceSnapshot>, ProviderError>;

    async fn set_price_active(&self, price_id: &str, active: bool) -> Result<(), ProviderError>;

    async fn list_active_prices(&self, product_id: &str) -> Result<Vec<String>, ProviderError>;

    /// Create a customer for a tenant. Callers own the decision to reuse an
    /// existing customer id; this always creates.
    async fn create_customer(
        &self,
        tenant_id: TenantId,
        email: &str,
    ) -> Result<String, ProviderError>;

    async fn create_checkout_session(
        &self,
        customer_id: &str,
        price_id: &str,
        success_url: &str,
        cancel_url: &str,
        metadata: HashMap<String, String>,
        trial_days: Option<u32>,
    ) -> Result<CheckoutSessionHandle, ProviderError>;

    /// Create a self-service portal session, returning the redirect URL
    async fn create_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> Result<String, ProviderError>;
}
