//! Siteforge API server

use siteforge_api::{routes::create_router, AppState, Config};
use siteforge_billing::StripeConfig;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    dotenvy::dotenv().ok();

    let config = Config::from_env()?;

    let pool =
        siteforge_shared::create_pool(&config.database_url, config.database_max_connections)
            .await?;
    siteforge_shared::run_migrations(&pool).await?;

    let billing_config = if config.enable_billing {
        Some(StripeConfig::from_env()?)
    } else {
        tracing::warn!("Billing is disabled; plan sync and checkout routes are not mounted");
        None
    };

    let state = AppState::new(pool, billing_config);
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    tracing::info!(address = %config.bind_address, "Siteforge API listening");
    axum::serve(listener, router).await?;

    Ok(())
}
