use anyhow::{anyhow, Result};
use std::env;

use crate::normalizer::MarketKind;

pub const DEFAULT_ODDS_API_BASE_URL: &str = "https://api.the-odds-api.com/v4";
pub const DEFAULT_SPORTS: &str = "basketball_nba,americanfootball_nfl,baseball_mlb,basketball_ncaab";

/// Configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub odds_api_key: String,
    pub odds_api_base_url: String,
    pub database_url: String,
    /// Odds API sport keys, refreshed in this order
    pub sports: Vec<String>,
    pub markets: Vec<MarketKind>,
    pub regions: String,
    pub odds_format: String,
    pub poll_interval_seconds: u64,
    pub health_port: u16,
    /// If true, run one refresh cycle and exit (no polling loop)
    pub run_once: bool,
    pub requests_per_minute: u32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get_or = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());

        let sports = parse_list(&get_or("SPORTS", DEFAULT_SPORTS));
        if sports.is_empty() {
            return Err(anyhow!("SPORTS must name at least one sport"));
        }

        let markets = parse_list(&get_or("MARKETS", "h2h"))
            .iter()
            .map(|m| m.parse::<MarketKind>())
            .collect::<Result<Vec<_>>>()?;
        if markets.is_empty() {
            return Err(anyhow!("MARKETS must name at least one market"));
        }

        Ok(Self {
            odds_api_key: required(&lookup, "ODDSAPI_KEY")?,
            odds_api_base_url: get_or("ODDS_API_BASE_URL", DEFAULT_ODDS_API_BASE_URL),
            database_url: required(&lookup, "DATABASE_URL")?,
            sports,
            markets,
            regions: get_or("REGIONS", "us"),
            odds_format: get_or("ODDS_FORMAT", "decimal"),
            poll_interval_seconds: parse_positive(lookup("POLL_INTERVAL_SECONDS"), 300),
            health_port: lookup("HEALTH_PORT")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(3000),
            run_once: get_or("RUN_ONCE", "false").to_lowercase() == "true",
            requests_per_minute: parse_positive(lookup("REQUESTS_PER_MINUTE"), 30),
        })
    }
}

fn required<F>(lookup: &F, name: &str) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        Some(_) => Err(anyhow!("{} is set but empty", name)),
        None => Err(anyhow!("{} must be set", name)),
    }
}

fn parse_positive<T>(raw: Option<String>, default: T) -> T
where
    T: std::str::FromStr + PartialOrd + Default,
{
    raw.and_then(|v| v.trim().parse::<T>().ok())
        .filter(|v| *v > T::default())
        .unwrap_or(default)
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Label stored documents are keyed by, e.g. `basketball_nba` -> `NBA`.
/// Keys without a short name use the whole key upper-cased.
pub fn sport_label(sport_key: &str) -> String {
    match sport_key {
        "basketball_nba" => "NBA".to_string(),
        "americanfootball_nfl" => "NFL".to_string(),
        "baseball_mlb" => "MLB".to_string(),
        "basketball_ncaab" => "NCAAB".to_string(),
        other => other.to_uppercase(),
    }
}
