//! Stripe client configuration and the live `BillingProvider` implementation

use std::collections::HashMap;

use async_trait::async_trait;
use stripe::{
    BillingPortalSession, CheckoutSession, CheckoutSessionMode, Client, CreateBillingPortalSession,
    CreateCheckoutSession, CreateCheckoutSessionLineItems, CreateCheckoutSessionSubscriptionData,
    CreateCustomer, CreatePrice, CreatePriceRecurring, CreatePriceRecurringInterval, CreateProduct,
    Currency, Customer, CustomerId, IdOrCreate, ListPrices, Price, PriceId, Product, ProductId,
    RecurringInterval, UpdateProduct, UpdatePrice,
};
use uuid::Uuid;

use siteforge_shared::{BillingCycle, PlanId, TenantId};

use crate::error::{BillingError, BillingResult, ProviderError};
use crate::provider::{BillingProvider, CheckoutSessionHandle, PriceSnapshot, ProductAttrs};

const DEFAULT_TRIAL_PERIOD_DAYS: u32 = 14;

/// Configuration for Stripe billing
#[derive(Debug, Clone)]
pub struct StripeConfig {
    /// Stripe secret API key
    pub secret_key: String,
    /// Stripe webhook signing secret
    pub webhook_secret: String,
    /// Lowercase ISO currency code used for every price we create
    pub currency: String,
    /// Base URL for success/cancel redirects
    pub app_base_url: String,
    /// Plans whose checkout sessions start with a free trial
    pub trial_plan_ids: Vec<PlanId>,
    /// Trial length applied to plans in `trial_plan_ids`
    pub trial_period_days: u32,
}

impl StripeConfig {
    /// Create config from environment variables
    pub fn from_env() -> BillingResult<Self> {
        let currency = std::env::var("BILLING_CURRENCY").unwrap_or_else(|_| "usd".to_string());
        if currency.parse::<Currency>().is_err() {
            return Err(BillingError::Config(format!(
                "Unsupported BILLING_CURRENCY: {}",
                currency
            )));
        }

        let trial_plan_ids = match std::env::var("TRIAL_PLAN_IDS") {
            Ok(raw) => parse_trial_plan_ids(&raw)?,
            Err(_) => Vec::new(),
        };

        let trial_period_days = match std::env::var("TRIAL_PERIOD_DAYS") {
            Ok(raw) => raw
                .parse::<u32>()
                .map_err(|_| BillingError::Config(format!("Invalid TRIAL_PERIOD_DAYS: {}", raw)))?,
            Err(_) => DEFAULT_TRIAL_PERIOD_DAYS,
        };

        Ok(Self {
            secret_key: std::env::var("STRIPE_SECRET_KEY")
                .map_err(|_| BillingError::Config("STRIPE_SECRET_KEY not set".to_string()))?,
            webhook_secret: std::env::var("STRIPE_WEBHOOK_SECRET")
                .map_err(|_| BillingError::Config("STRIPE_WEBHOOK_SECRET not set".to_string()))?,
            currency,
            app_base_url: std::env::var("APP_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            trial_plan_ids,
            trial_period_days,
        })
    }

    /// Check whether checkouts for this plan should start with a trial
    pub fn plan_has_trial(&self, plan_id: PlanId) -> bool {
        self.trial_plan_ids.contains(&plan_id)
    }
}

/// Parse a comma-separated list of plan UUIDs
fn parse_trial_plan_ids(raw: &str) -> BillingResult<Vec<PlanId>> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            entry.parse::<Uuid>().map(PlanId).map_err(|_| {
                BillingError::Config(format!("Invalid TRIAL_PLAN_IDS entry: {}", entry))
            })
        })
        .collect()
}

/// Stripe billing client
#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    config: StripeConfig,
}

impl StripeClient {
    /// Create a new Stripe client from config
    pub fn new(config: StripeConfig) -> Self {
        let client = Client::new(&config.secret_key);
        Self { client, config }
    }

    /// Create a new Stripe client from environment variables
    pub fn from_env() -> BillingResult<Self> {
        let config = StripeConfig::from_env()?;
        Ok(Self::new(config))
    }

    /// Get the inner Stripe client
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Get the config
    pub fn config(&self) -> &StripeConfig {
        &self.config
    }
}

fn parse_product_id(id: &str) -> Result<ProductId, ProviderError> {
    id.parse::<ProductId>()
        .map_err(|e| ProviderError::new(format!("Invalid product ID: {}", e)))
}

fn parse_price_id(id: &str) -> Result<PriceId, ProviderError> {
    id.parse::<PriceId>()
        .map_err(|e| ProviderError::new(format!("Invalid price ID: {}", e)))
}

fn parse_customer_id(id: &str) -> Result<CustomerId, ProviderError> {
    id.parse::<CustomerId>()
        .map_err(|e| ProviderError::new(format!("Invalid customer ID: {}", e)))
}

fn parse_currency(code: &str) -> Result<Currency, ProviderError> {
    code.parse::<Currency>()
        .map_err(|_| ProviderError::new(format!("Unsupported currency: {}", code)))
}

#[async_trait]
impl BillingProvider for StripeClient {
    async fn upsert_product(
        &self,
        existing_id: Option<&str>,
        attrs: &ProductAttrs,
    ) -> Result<String, ProviderError> {
        match existing_id {
            Some(id) => {
                let product_id = parse_product_id(id)?;
                let params = UpdateProduct {
                    name: Some(&attrs.name),
                    description: attrs.description.clone(),
                    active: Some(attrs.active),
                    metadata: Some(attrs.metadata.clone()),
                    ..Default::default()
                };
                let product = Product::update(&self.client, &product_id, params).await?;
                Ok(product.id.to_string())
            }
            None => {
                let mut params = CreateProduct::new(&attrs.name);
                params.description = attrs.description.as_deref();
                params.active = Some(attrs.active);
                params.metadata = Some(attrs.metadata.clone());

                let product = Product::create(&self.client, params).await?;

                tracing::info!(
                    product_id = %product.id,
                    name = %attrs.name,
                    "Created billing product"
                );

                Ok(product.id.to_string())
            }
        }
    }

    async fn set_product_active(
        &self,
        product_id: &str,
        active: bool,
    ) -> Result<(), ProviderError> {
        let product_id = parse_product_id(product_id)?;
        let params = UpdateProduct {
            active: Some(active),
            ..Default::default()
        };
        Product::update(&self.client, &product_id, params).await?;
        Ok(())
    }

    async fn create_price(
        &self,
        product_id: &str,
        unit_amount: i64,
        currency: &str,
        cycle: BillingCycle,
        metadata: HashMap<String, String>,
    ) -> Result<String, ProviderError> {
        let interval = match cycle {
            BillingCycle::Monthly => CreatePriceRecurringInterval::Month,
            BillingCycle::Annually => CreatePriceRecurringInterval::Year,
        };

        let mut params = CreatePrice::new(parse_currency(currency)?);
        params.product = Some(IdOrCreate::Id(product_id));
        params.unit_amount = Some(unit_amount);
        params.recurring = Some(CreatePriceRecurring {
            interval,
            interval_count: None,
            aggregate_usage: None,
            trial_period_days: None,
            usage_type: None,
        });
        params.metadata = Some(metadata);

        let price = Price::create(&self.client, params).await?;

        tracing::info!(
            price_id = %price.id,
            unit_amount = unit_amount,
            cycle = %cycle,
            "Created billing price"
        );

        Ok(price.id.to_string())
    }

    async fn get_price(&self, price_id: &str) -> Result<Option<PriceSnapshot>, ProviderError> {
        let price_id = parse_price_id(price_id)?;

        let price = match Price::retrieve(&self.client, &price_id, &[]).await {
            Ok(price) => price,
            Err(stripe::StripeError::Stripe(request_error))
                if request_error.http_status == 404 =>
            {
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };

        let interval = price
            .recurring
            .as_ref()
            .and_then(|recurring| match recurring.interval {
                RecurringInterval::Month => Some(BillingCycle::Monthly),
                RecurringInterval::Year => Some(BillingCycle::Annually),
                _ => None,
            });

        Ok(Some(PriceSnapshot {
            active: price.active.unwrap_or(false),
            unit_amount: price.unit_amount.unwrap_or(0),
            currency: price.currency.map(|c| c.to_string()).unwrap_or_default(),
            interval,
        }))
    }

    async fn set_price_active(&self, price_id: &str, active: bool) -> Result<(), ProviderError> {
        let price_id = parse_price_id(price_id)?;
        let params = UpdatePrice {
            active: Some(active),
            ..Default::default()
        };
        Price::update(&self.client, &price_id, params).await?;
        Ok(())
    }

    async fn list_active_prices(&self, product_id: &str) -> Result<Vec<String>, ProviderError> {
        let mut price_ids = Vec::new();
        let mut cursor: Option<PriceId> = None;

        loop {
            let mut list_prices = ListPrices::default();
            list_prices.product = Some(IdOrCreate::Id(product_id));
            list_prices.active = Some(true);
            list_prices.limit = Some(100);
            list_prices.starting_after = cursor.clone();

            let page = Price::list(&self.client, &list_prices).await?;
            if page.data.is_empty() {
                break;
            }

            cursor = page.data.last().map(|price| price.id.clone());
            for price in page.data {
                price_ids.push(price.id.to_string());
            }

            if !page.has_more {
                break;
            }
        }

        Ok(price_ids)
    }

    async fn create_customer(
        &self,
        tenant_id: TenantId,
        email: &str,
    ) -> Result<String, ProviderError> {
        let mut metadata = HashMap::new();
        metadata.insert("tenant_id".to_string(), tenant_id.to_string());
        metadata.insert("platform".to_string(), "siteforge".to_string());

        let params = CreateCustomer {
            email: Some(email),
            metadata: Some(metadata),
            ..Default::default()
        };

        let customer = Customer::create(&self.client, params).await?;

        tracing::info!(
            tenant_id = %tenant_id,
            customer_id = %customer.id,
            "Created Stripe customer"
        );

        Ok(customer.id.to_string())
    }

    async fn create_checkout_session(
        &self,
        customer_id: &str,
        price_id: &str,
        success_url: &str,
        cancel_url: &str,
        metadata: HashMap<String, String>,
        trial_days: Option<u32>,
    ) -> Result<CheckoutSessionHandle, ProviderError> {
        let customer_id = parse_customer_id(customer_id)?;

        let line_items = vec![CreateCheckoutSessionLineItems {
            price: Some(price_id.to_string()),
            quantity: Some(1),
            ..Default::default()
        }];

        let mut params = CreateCheckoutSession {
            customer: Some(customer_id),
            mode: Some(CheckoutSessionMode::Subscription),
            line_items: Some(line_items),
            success_url: Some(success_url),
            cancel_url: Some(cancel_url),
            metadata: Some(metadata),
            allow_promotion_codes: Some(true),
            billing_address_collection: Some(stripe::CheckoutSessionBillingAddressCollection::Auto),
            ..Default::default()
        };

        if let Some(trial_days) = trial_days {
            params.subscription_data = Some(CreateCheckoutSessionSubscriptionData {
                trial_period_days: Some(trial_days),
                ..Default::default()
            });
        }

        let session = CheckoutSession::create(&self.client, params).await?;

        tracing::info!(
            session_id = %session.id,
            "Created checkout session"
        );

        Ok(CheckoutSessionHandle {
            id: session.id.to_string(),
            url: session.url,
        })
    }

    async fn create_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> Result<String, ProviderError> {
        let customer_id = parse_customer_id(customer_id)?;

        let mut params = CreateBillingPortalSession::new(customer_id);
        params.return_url = Some(return_url);

        let session = BillingPortalSession::create(&self.client, params).await?;

        Ok(session.url)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn trial_plan_ids_parse_from_csv() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let parsed = parse_trial_plan_ids(&format!("{}, {}", a, b)).unwrap();
        assert_eq!(parsed, vec![PlanId(a), PlanId(b)]);
    }

    #[test]
    fn trial_plan_ids_reject_garbage() {
        assert!(parse_trial_plan_ids("not-a-uuid").is_err());
    }

    #[test]
    fn trial_plan_ids_ignore_blank_entries() {
        assert!(parse_trial_plan_ids("").unwrap().is_empty());
        assert!(parse_trial_plan_ids(" , ").unwrap().is_empty());
    }
}
