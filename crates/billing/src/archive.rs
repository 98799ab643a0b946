//! Plan retirement against the billing provider

use std::sync::Arc;

use crate::error::{BillingError, BillingResult};
use crate::provider::BillingProvider;

/// Takes a retired plan's product off sale
pub struct PlanArchiveService {
    provider: Arc<dyn BillingProvider>,
}

impl PlanArchiveService {
    pub fn new(provider: Arc<dyn BillingProvider>) -> Self {
        Self { provider }
    }

    /// Deactivate a product and every active price under it. The product
    /// is deactivated first and stays deactivated even when price archival
    /// fails partway; a partial failure reports the price ids that are
    /// still active. Retrying with the same product id is safe, since
    /// already-inactive objects deactivate as no-ops.
    pub async fn archive(&self, product_id: &str) -> BillingResult<()> {
        self.provider.set_product_active(product_id, false).await?;

        let active_price_ids = self.provider.list_active_prices(product_id).await?;

        let mut failed_price_ids = Vec::new();
        for price_id in &active_price_ids {
            if let Err(err) = self.provider.set_price_active(price_id, false).await {
                tracing::warn!(
                    product_id = %product_id,
                    price_id = %price_id,
                    error = %err,
                    "Failed to archive price"
                );
                failed_price_ids.push(price_id.clone());
            }
        }

        if !failed_price_ids.is_empty() {
            return Err(BillingError::Archive {
                product_id: product_id.to_string(),
                failed_price_ids,
            });
        }

        tracing::info!(
            product_id = %product_id,
            archived_prices = active_price_ids.len(),
            "Archived billing product"
        );

        Ok(())
    }
}
