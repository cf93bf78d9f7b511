//! The Odds API client.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use governor::{Quota, RateLimiter};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::Config;
use crate::normalizer::MarketKind;

/// The Odds API event structure
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct OddsApiEvent {
    pub id: String,
    pub sport_key: String,
    pub sport_title: String,
    pub commence_time: Option<DateTime<Utc>>,
    pub home_team: String,
    pub away_team: String,
    pub bookmakers: Vec<Bookmaker>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Bookmaker {
    pub key: String,
    pub title: String,
    pub last_update: Option<DateTime<Utc>>,
    pub markets: Vec<Market>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Market {
    pub key: String,
    pub last_update: Option<DateTime<Utc>>,
    pub outcomes: Vec<Outcome>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Outcome {
    pub name: String,
    pub price: Option<f64>,
    pub point: Option<f64>,
}

/// Entry of the `/sports` listing
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct SportInfo {
    pub key: String,
    pub group: String,
    pub title: String,
    pub active: bool,
    pub has_outrights: bool,
}

/// Where the refresh job gets its odds from
#[allow(async_fn_in_trait)]
pub trait OddsSource {
    /// Keys of the sports currently in season
    async fn fetch_active_sports(&self) -> Result<Vec<String>>;

    /// Upcoming games for one sport with a single market attached
    async fn fetch_odds(&self, sport_key: &str, kind: MarketKind) -> Result<Vec<OddsApiEvent>>;
}

type DirectRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

pub struct OddsApiClient {
    base_url: String,
    api_key: String,
    regions: String,
    odds_format: String,
    http_client: reqwest::Client,
    rate_limiter: DirectRateLimiter,
}

impl OddsApiClient {
    pub fn new(config: &Config) -> Result<Self> {
        let per_minute = NonZeroU32::new(config.requests_per_minute)
            .ok_or_else(|| anyhow!("REQUESTS_PER_MINUTE must be greater than zero"))?;

        // HTTP client with timeouts
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(5)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            base_url: config.odds_api_base_url.trim_end_matches('/').to_string(),
            api_key: config.odds_api_key.clone(),
            regions: config.regions.clone(),
            odds_format: config.odds_format.clone(),
            http_client,
            rate_limiter: RateLimiter::direct(Quota::per_minute(per_minute)),
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
        what: &str,
    ) -> Result<T> {
        // Wait for rate limit
        self.rate_limiter.until_ready().await;

        let response = self
            .http_client
            .get(url)
            .query(&[("apiKey", self.api_key.as_str())])
            .query(query)
            .send()
            .await
            .with_context(|| format!("Failed to fetch {}", what))?;

        // Log API usage from headers
        if let Some(remaining) = response.headers().get("x-requests-remaining") {
            info!(
                "API requests remaining: {}",
                remaining.to_str().unwrap_or("?")
            );
        }

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read response body")?;

        if !status.is_success() {
            return Err(anyhow!("Odds API error (status {}): {}", status, body));
        }

        serde_json::from_str(&body).with_context(|| format!("Failed to parse {}", what))
    }
}

impl OddsSource for OddsApiClient {
    async fn fetch_active_sports(&self) -> Result<Vec<String>> {
        let url = format!("{}/sports", self.base_url);
        let sports: Vec<SportInfo> = self.get_json(&url, &[], "sports list").await?;

        let active = active_sport_keys(sports);
        debug!("Active sports: {}", active.join(", "));
        Ok(active)
    }

    async fn fetch_odds(&self, sport_key: &str, kind: MarketKind) -> Result<Vec<OddsApiEvent>> {
        let url = format!("{}/sports/{}/odds", self.base_url, sport_key);

        let events: Vec<OddsApiEvent> = self
            .get_json(
                &url,
                &[
                    ("regions", self.regions.as_str()),
                    ("markets", kind.key()),
                    ("oddsFormat", self.odds_format.as_str()),
                ],
                "odds events",
            )
            .await?;

        info!(
            "Fetched {} {} events for {} from The Odds API",
            events.len(),
            kind,
            sport_key
        );
        Ok(events)
    }
}

fn active_sport_keys(sports: Vec<SportInfo>) -> Vec<String> {
    sports
        .into_iter()
        .filter(|s| s.active)
        .map(|s| s.key)
        .collect()
}
