//! Stripe webhook intake
//!
//! Verifies event signatures and correlates completed checkouts back to
//! the issuing tenant via the metadata stamped onto every session.

use std::collections::HashMap;
use std::sync::Arc;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use stripe::{Event, EventObject, EventType, Webhook};
use uuid::Uuid;

use siteforge_shared::{BillingCycle, PlanId, TenantId};

use crate::catalog::CatalogStore;
use crate::error::{BillingError, BillingResult};

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// What a verified webhook event amounted to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// A completed checkout, correlated back to its tenant and plan
    CheckoutCompleted {
        tenant_id: TenantId,
        plan_id: PlanId,
        cycle: BillingCycle,
        customer_id: Option<String>,
    },
    /// An event type this service does not act on
    Ignored { event_type: String },
}

/// Webhook handler for Stripe events
pub struct WebhookService {
    catalog: Arc<dyn CatalogStore>,
    webhook_secret: String,
}

impl WebhookService {
    pub fn new(catalog: Arc<dyn CatalogStore>, webhook_secret: String) -> Self {
        Self {
            catalog,
            webhook_secret,
        }
    }

    /// Verify and parse a Stripe webhook event
    ///
    /// Uses manual signature verification as a fallback to work around
    /// async-stripe version incompatibility with newer Stripe API versions.
    pub fn verify_event(&self, payload: &str, signature: &str) -> BillingResult<Event> {
        match Webhook::construct_event(payload, signature, &self.webhook_secret) {
            Ok(event) => return Ok(event),
            Err(e) => {
                tracing::warn!(
                    stripe_error = %e,
                    "Standard webhook verification failed, trying manual verification"
                );
            }
        }

        verify_signature(&self.webhook_secret, payload, signature)?;

        let event: Event = serde_json::from_str(payload).map_err(|e| {
            tracing::error!(parse_error = %e, "Failed to parse webhook event JSON");
            BillingError::WebhookEventNotSupported(format!("Unparseable event payload: {}", e))
        })?;

        Ok(event)
    }

    /// Handle a verified Stripe event
    pub async fn handle_event(&self, event: Event) -> BillingResult<WebhookOutcome> {
        match event.type_ {
            EventType::CheckoutSessionCompleted => self.handle_checkout_completed(event).await,
            other => {
                tracing::debug!(event_type = %other, "Ignoring webhook event");
                Ok(WebhookOutcome::Ignored {
                    event_type: other.to_string(),
                })
            }
        }
    }

    async fn handle_checkout_completed(&self, event: Event) -> BillingResult<WebhookOutcome> {
        let session = match event.data.object {
            EventObject::CheckoutSession(session) => session,
            _ => {
                return Err(BillingError::WebhookEventNotSupported(
                    "Expected a checkout session object".to_string(),
                ))
            }
        };

        let metadata = session.metadata.clone().unwrap_or_default();
        let correlation = match correlation_from_metadata(&metadata) {
            Some(correlation) => correlation,
            None => {
                tracing::warn!(
                    session_id = %session.id,
                    "Checkout session completed without correlation metadata"
                );
                return Ok(WebhookOutcome::Ignored {
                    event_type: EventType::CheckoutSessionCompleted.to_string(),
                });
            }
        };

        let customer_id = match &session.customer {
            Some(stripe::Expandable::Id(id)) => Some(id.to_string()),
            Some(stripe::Expandable::Object(customer)) => Some(customer.id.to_string()),
            None => None,
        };

        let (tenant_id, plan_id, cycle) = correlation;
        self.apply_checkout(tenant_id, plan_id, cycle, customer_id, session.id.as_str())
            .await
    }

    /// Record a correlated checkout completion. The session's customer id
    /// is stamped onto the tenant only when none is on file yet; an
    /// already-recorded customer id is never overwritten.
    async fn apply_checkout(
        &self,
        tenant_id: TenantId,
        plan_id: PlanId,
        cycle: BillingCycle,
        customer_id: Option<String>,
        session_id: &str,
    ) -> BillingResult<WebhookOutcome> {
        if let Some(customer_id) = &customer_id {
            let needs_stamp = self
                .catalog
                .tenant(tenant_id)
                .await?
                .map(|tenant| tenant.stripe_customer_id.is_none())
                .unwrap_or(false);

            if needs_stamp {
                self.catalog
                    .record_customer_id(tenant_id, customer_id)
                    .await?;
            }
        }

        tracing::info!(
            tenant_id = %tenant_id,
            plan_id = %plan_id,
            session_id = %session_id,
            cycle = %cycle,
            "Checkout completed"
        );

        Ok(WebhookOutcome::CheckoutCompleted {
            tenant_id,
            plan_id,
            cycle,
            customer_id,
        })
    }
}

/// Manual signature check for the `t=...,v1=...` header format
fn verify_signature(webhook_secret: &str, payload: &str, signature: &str) -> BillingResult<()> {
    let mut timestamp: Option<i64> = None;
    let mut v1_signature: Option<String> = None;

    for part in signature.split(',') {
        let kv: Vec<&str> = part.splitn(2, '=').collect();
        if kv.len() == 2 {
            match kv[0] {
                "t" => timestamp = kv[1].parse().ok(),
                "v1" => v1_signature = Some(kv[1].to_string()),
                _ => {}
            }
        }
    }

    let timestamp = timestamp.ok_or(BillingError::WebhookSignatureInvalid)?;
    let v1_signature = v1_signature.ok_or(BillingError::WebhookSignatureInvalid)?;

    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_err(|_| BillingError::WebhookSignatureInvalid)?
        .as_secs() as i64;

    if (now - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
        tracing::error!(
            timestamp = timestamp,
            now = now,
            "Webhook timestamp outside tolerance"
        );
        return Err(BillingError::WebhookSignatureInvalid);
    }

    // The configured secret may carry Stripe's whsec_ prefix
    let secret_key = webhook_secret
        .strip_prefix("whsec_")
        .unwrap_or(webhook_secret);
    let signed_payload = format!("{}.{}", timestamp, payload);

    let mut mac = HmacSha256::new_from_slice(secret_key.as_bytes())
        .map_err(|_| BillingError::WebhookSignatureInvalid)?;
    mac.update(signed_payload.as_bytes());
    let computed = hex::encode(mac.finalize().into_bytes());

    if computed != v1_signature {
        tracing::error!("Webhook signature mismatch");
        return Err(BillingError::WebhookSignatureInvalid);
    }

    Ok(())
}

/// Extract the tenant/plan/cycle correlation stamped onto sessions at
/// creation time. `None` when any part is missing or malformed.
fn correlation_from_metadata(
    metadata: &HashMap<String, String>,
) -> Option<(TenantId, PlanId, BillingCycle)> {
    let tenant_id = metadata.get("tenantId")?.parse::<Uuid>().ok().map(TenantId)?;
    let plan_id = metadata.get("planId")?.parse::<Uuid>().ok().map(PlanId)?;
    let cycle = BillingCycle::from_str(metadata.get("billingCycle")?)?;
    Some((tenant_id, plan_id, cycle))
}
