//! Plan catalog and synchronization routes

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use siteforge_billing::PlanDefinition;
use siteforge_shared::PlanId;

use crate::{error::ApiError, state::AppState};

/// Plan payload from the plan-editing surface
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SyncPlanRequest {
    pub id: PlanId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: PlanPrices,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub is_featured: bool,
    #[serde(default)]
    pub is_archived: bool,
    #[serde(default)]
    pub stripe_product_id: Option<String>,
    #[serde(default)]
    pub stripe_price_id_monthly: Option<String>,
    #[serde(default)]
    pub stripe_price_id_annually: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlanPrices {
    pub monthly: f64,
    pub annually: f64,
}

impl SyncPlanRequest {
    fn validate(&self) -> Result<(), ApiError> {
        if self.name.trim().is_empty() {
            return Err(ApiError::Validation("name must not be empty".to_string()));
        }
        if !(self.price.monthly >= 0.0 && self.price.monthly.is_finite()) {
            return Err(ApiError::Validation(
                "price.monthly must be a non-negative number".to_string(),
            ));
        }
        if !(self.price.annually >= 0.0 && self.price.annually.is_finite()) {
            return Err(ApiError::Validation(
                "price.annually must be a non-negative number".to_string(),
            ));
        }
        Ok(())
    }

    fn into_definition(self) -> PlanDefinition {
        PlanDefinition {
            id: self.id,
            name: self.name,
            description: self.description,
            monthly_price: self.price.monthly,
            annual_price: self.price.annually,
            features: self.features,
            is_featured: self.is_featured,
            is_archived: self.is_archived,
            stripe_product_id: self.stripe_product_id,
            stripe_price_id_monthly: self.stripe_price_id_monthly,
            stripe_price_id_annually: self.stripe_price_id_annually,
            stripe_last_sync_at: None,
        }
    }
}

/// Result of a plan sync, echoing the external ids now on file
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncPlanResponse {
    pub success: bool,
    pub product_id: String,
    pub price_id_monthly: Option<String>,
    pub price_id_annually: Option<String>,
}

/// Upsert a plan definition and reconcile it with the billing provider
pub async fn sync_plan(
    State(state): State<AppState>,
    Json(req): Json<SyncPlanRequest>,
) -> Result<Json<SyncPlanResponse>, ApiError> {
    let billing = state.billing.as_ref().ok_or(ApiError::ServiceUnavailable)?;
    req.validate()?;

    let merged = state.catalog.upsert_plan(&req.into_definition()).await?;
    let ids = billing.sync.sync(&merged).await?;

    Ok(Json(SyncPlanResponse {
        success: true,
        product_id: ids.product_id,
        price_id_monthly: ids.price_id_monthly,
        price_id_annually: ids.price_id_annually,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ArchivePlanRequest {
    pub product_id: String,
}

#[derive(Debug, Serialize)]
pub struct ArchivePlanResponse {
    pub success: bool,
}

/// Take a retired plan's product and prices off sale at the billing provider
pub async fn archive_plan(
    State(state): State<AppState>,
    Json(req): Json<ArchivePlanRequest>,
) -> Result<Json<ArchivePlanResponse>, ApiError> {
    let billing = state.billing.as_ref().ok_or(ApiError::ServiceUnavailable)?;

    billing.archive.archive(&req.product_id).await?;

    Ok(Json(ArchivePlanResponse { success: true }))
}

/// Public plan summary for the pricing page
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicPlan {
    pub id: PlanId,
    pub name: String,
    pub description: Option<String>,
    pub monthly_price: f64,
    pub annual_price: f64,
    pub features: Vec<String>,
    pub is_featured: bool,
}

impl From<PlanDefinition> for PublicPlan {
    fn from(plan: PlanDefinition) -> Self {
        Self {
            id: plan.id,
            name: plan.name,
            description: plan.description,
            monthly_price: plan.monthly_price,
            annual_price: plan.annual_price,
            features: plan.features,
            is_featured: plan.is_featured,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PlanListResponse {
    pub success: bool,
    pub plans: Vec<PublicPlan>,
}

/// List non-archived plans for the public pricing page
pub async fn list_plans(State(state): State<AppState>) -> Result<Json<PlanListResponse>, ApiError> {
    let plans = state.catalog.list_public_plans().await?;
    Ok(Json(PlanListResponse {
        success: true,
        plans: plans.into_iter().map(PublicPlan::from).collect(),
    }))
}
