use anyhow::{Context, Result};
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::config::{sport_label, Config};
use crate::health::HealthState;
use crate::normalizer::{normalize, MarketKind};
use crate::odds_api::OddsSource;
use crate::store::OddsStore;

/// Totals for one refresh cycle
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleSummary {
    pub sports_refreshed: usize,
    pub games_written: usize,
}

/// Odds refresh service
pub struct OddsRefreshService<A, S> {
    config: Config,
    source: A,
    store: S,
    health: HealthState,
}

impl<A: OddsSource, S: OddsStore> OddsRefreshService<A, S> {
    pub fn new(config: Config, source: A, store: S) -> Self {
        Self {
            config,
            source,
            store,
            health: HealthState::new(),
        }
    }

    pub fn health(&self) -> HealthState {
        self.health.clone()
    }

    /// Hand the store back so the caller can release it
    pub fn into_store(self) -> S {
        self.store
    }

    /// Main polling loop. The first tick fires immediately and is the initial refresh.
    pub async fn run(&self) {
        info!(
            "Starting odds refresh loop (interval: {}s)",
            self.config.poll_interval_seconds
        );

        let mut ticker = tokio::time::interval(Duration::from_secs(self.config.poll_interval_seconds));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let start = Instant::now();
            info!("Starting odds refresh...");

            match self.refresh_cycle().await {
                Ok(summary) => {
                    self.health.record_success(summary.games_written).await;
                    info!(
                        "Refresh completed: {} games across {} sports in {:?}",
                        summary.games_written,
                        summary.sports_refreshed,
                        start.elapsed()
                    );
                }
                Err(e) => {
                    self.health.record_error().await;
                    error!("Refresh failed: {:?}", e);
                }
            }
        }
    }

    /// One pass over every configured sport that is currently in season.
    /// Stops at the first error.
    pub async fn refresh_cycle(&self) -> Result<CycleSummary> {
        let active = self
            .source
            .fetch_active_sports()
            .await
            .context("Failed to fetch active sports")?;

        let mut summary = CycleSummary::default();

        for sport_key in &self.config.sports {
            if !active.contains(sport_key) {
                debug!("{} is not active, skipping", sport_key);
                continue;
            }

            for &kind in &self.config.markets {
                summary.games_written += self
                    .refresh_market(sport_key, kind)
                    .await
                    .with_context(|| format!("Failed to refresh {} {}", sport_key, kind))?;
            }
            summary.sports_refreshed += 1;
        }

        Ok(summary)
    }

    /// Fetch, normalize and store one (sport, market) pair.
    ///
    /// Every game is normalized before the stored document is touched and the
    /// store swaps the whole set at once, so a malformed response or a failed
    /// write leaves the previous games in place.
    pub async fn refresh_market(&self, sport_key: &str, kind: MarketKind) -> Result<usize> {
        let events = self.source.fetch_odds(sport_key, kind).await?;

        let records = events
            .iter()
            .map(|event| normalize(kind, event))
            .collect::<Result<Vec<_>, _>>()?;

        let sport = sport_label(sport_key);
        self.store.replace_games(kind, &sport, &records).await?;

        info!("Stored {} {} games for {}", records.len(), kind, sport);
        Ok(records.len())
    }
}
