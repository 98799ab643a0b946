//! Siteforge Billing Library
//!
//! Plan synchronization, checkout, and customer portal integration with
//! the Stripe billing provider.

pub mod archive;
pub mod catalog;
pub mod checkout;
pub mod client;
pub mod drift;
pub mod error;
pub mod portal;
pub mod provider;
pub mod sync;
pub mod testing;
pub mod webhook;

pub use archive::PlanArchiveService;
pub use catalog::{CatalogStore, PgCatalogStore, PlanDefinition, SyncedIds, TenantBillingRecord};
pub use checkout::{CheckoutResponse, CheckoutService};
pub use client::{StripeClient, StripeConfig};
pub use drift::{DesiredPrice, DriftDecision, DriftReason, PriceDriftDetector};
pub use error::{BillingError, BillingResult, ProviderError};
pub use portal::{PortalResponse, PortalService};
pub use provider::{BillingProvider, CheckoutSessionHandle, PriceSnapshot, ProductAttrs};
pub use sync::PlanSyncService;
pub use webhook::{WebhookOutcome, WebhookService};
