//! Price drift detection
//!
//! Stripe prices are immutable, so a plan edit can leave the stored price
//! reference pointing at an object that no longer matches the plan. Drift
//! detection decides, per billing cycle, whether the stored price can keep
//! serving checkouts or has to be archived and recreated.

use std::sync::Arc;

use siteforge_shared::BillingCycle;

use crate::error::ProviderError;
use crate::provider::{BillingProvider, PriceSnapshot};

/// The price a plan's current configuration calls for
#[derive(Debug, Clone, PartialEq)]
pub struct DesiredPrice {
    /// Integer minor currency units
    pub unit_amount: i64,
    pub currency: String,
    pub cycle: BillingCycle,
}

/// Why a stored price reference cannot be kept
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriftReason {
    /// The plan has never had a price for this cycle
    NoExistingPrice,
    /// The provider no longer knows the stored price id
    PriceMissing,
    /// The price exists but was archived
    PriceInactive,
    /// The charged amount no longer matches the plan
    AmountChanged,
    /// The recurrence interval no longer matches the cycle
    IntervalChanged,
    /// The price is denominated in a different currency
    CurrencyChanged,
}

/// Outcome of checking one stored price reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriftDecision {
    /// The existing price still matches; keep using it
    Reuse,
    /// The existing price is unusable; create a replacement
    Replace(DriftReason),
}

impl DriftDecision {
    /// True when an old price object still exists at the provider and
    /// should be archived before the replacement takes over
    pub fn requires_archive(&self) -> bool {
        match self {
            DriftDecision::Reuse => false,
            DriftDecision::Replace(reason) => !matches!(
                reason,
                DriftReason::NoExistingPrice | DriftReason::PriceMissing
            ),
        }
    }
}

/// Compare a live price snapshot against the desired price. Checks run in
/// a fixed order and the first mismatch wins.
pub fn compare(snapshot: &PriceSnapshot, desired: &DesiredPrice) -> DriftDecision {
    if !snapshot.active {
        return DriftDecision::Replace(DriftReason::PriceInactive);
    }
    if snapshot.unit_amount != desired.unit_amount {
        return DriftDecision::Replace(DriftReason::AmountChanged);
    }
    if snapshot.interval != Some(desired.cycle) {
        return DriftDecision::Replace(DriftReason::IntervalChanged);
    }
    if !snapshot.currency.eq_ignore_ascii_case(&desired.currency) {
        return DriftDecision::Replace(DriftReason::CurrencyChanged);
    }
    DriftDecision::Reuse
}

/// Resolves the reuse-or-replace question for stored price references
pub struct PriceDriftDetector {
    provider: Arc<dyn BillingProvider>,
}

impl PriceDriftDetector {
    pub fn new(provider: Arc<dyn BillingProvider>) -> Self {
        Self { provider }
    }

    /// Decide whether `existing_price_id` can keep serving checkouts for
    /// the given desired price. A missing id short-circuits without any
    /// provider call; a dangling id is logged and treated as replaceable
    /// rather than an error.
    pub async fn check(
        &self,
        existing_price_id: Option<&str>,
        desired: &DesiredPrice,
    ) -> Result<DriftDecision, ProviderError> {
        let price_id = match existing_price_id {
            Some(id) => id,
            None => return Ok(DriftDecision::Replace(DriftReason::NoExistingPrice)),
        };

        match self.provider.get_price(price_id).await? {
            Some(snapshot) => Ok(compare(&snapshot, desired)),
            None => {
                tracing::warn!(
                    price_id = %price_id,
                    "Stored price no longer exists at the billing provider; scheduling replacement"
                );
                Ok(DriftDecision::Replace(DriftReason::PriceMissing))
            }
        }
    }
}
