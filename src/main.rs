//! Sports odds refresh service.
//!
//! Polls The Odds API on a fixed interval, flattens each game's bookmaker
//! quotes (h2h, spreads, totals) and stores one document per market and
//! sport, tracking the best moneyline price for each side.

mod config;
mod health;
mod normalizer;
mod odds_api;
mod service;
mod store;

use anyhow::Result;
use tracing::{error, info};

use crate::config::Config;
use crate::odds_api::OddsApiClient;
use crate::service::OddsRefreshService;
use crate::store::PgOddsStore;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("odds_refresh=info".parse()?),
        )
        .init();

    info!("Odds refresh service v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    let health_port = config.health_port;
    let run_once = config.run_once;

    let client = OddsApiClient::new(&config)?;
    let store = PgOddsStore::connect(&config.database_url).await?;
    let service = OddsRefreshService::new(config, client, store);

    // Start health check server
    let app = health::router(service.health());
    let health_addr = format!("0.0.0.0:{}", health_port);
    let listener = tokio::net::TcpListener::bind(&health_addr).await?;
    info!("Health endpoint listening on {}", health_addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Health server error: {:?}", e);
        }
    });

    let result = if run_once {
        info!("Running in one-shot mode (RUN_ONCE=true)");
        match service.refresh_cycle().await {
            Ok(summary) => {
                info!(
                    "One-shot refresh completed: {} games across {} sports",
                    summary.games_written, summary.sports_refreshed
                );
                Ok(())
            }
            Err(e) => {
                error!("One-shot refresh failed: {:?}", e);
                Err(e)
            }
        }
    } else {
        tokio::select! {
            _ = service.run() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down...");
            }
        }
        Ok(())
    };

    service.into_store().close().await;
    result
}
