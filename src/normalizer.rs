//! Odds normalization.
//!
//! Flattens one game's bookmaker quotes into the stored record shape and,
//! for moneyline markets, picks the best price per outcome across books.

use anyhow::anyhow;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::odds_api::{Bookmaker, Market, OddsApiEvent, Outcome};

/// Market kinds refreshed from The Odds API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarketKind {
    H2h,
    Spreads,
    Totals,
}

impl MarketKind {
    /// API market key, also used as the stored collection name
    pub fn key(self) -> &'static str {
        match self {
            MarketKind::H2h => "h2h",
            MarketKind::Spreads => "spreads",
            MarketKind::Totals => "totals",
        }
    }

    fn needs_point(self) -> bool {
        !matches!(self, MarketKind::H2h)
    }

    fn computes_best(self) -> bool {
        matches!(self, MarketKind::H2h)
    }
}

impl fmt::Display for MarketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for MarketKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "h2h" => Ok(MarketKind::H2h),
            "spreads" => Ok(MarketKind::Spreads),
            "totals" => Ok(MarketKind::Totals),
            other => Err(anyhow!(
                "Unknown market '{}' (expected h2h, spreads or totals)",
                other
            )),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum NormalizeError {
    #[error("game has no id (home: '{home_team}', away: '{away_team}')")]
    MalformedGame { home_team: String, away_team: String },

    #[error("malformed quote in game {game_id} from bookmaker '{bookmaker}': {detail}")]
    MalformedQuote {
        game_id: String,
        bookmaker: String,
        detail: String,
    },
}

/// One bookmaker's two-outcome quote for a game
#[derive(Debug, Clone, PartialEq)]
pub struct BookmakerEntry {
    pub bookmaker: String,
    pub outcome1: f64,
    pub outcome2: f64,
    pub point1: Option<f64>,
    pub point2: Option<f64>,
}

/// Flattened quotes for a single game, in API bookmaker order
#[derive(Debug, Clone, PartialEq)]
pub struct GameQuote {
    pub id: String,
    pub team1: String,
    pub team2: String,
    pub entries: Vec<BookmakerEntry>,
}

/// Best moneyline price per outcome.
///
/// Starts at `0.0` with no bookmaker and only moves on a strictly greater
/// price, so ties keep the earliest book and an all non-positive set of
/// prices (American favourites) leaves the defaults untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BestPrice {
    pub best_price1: f64,
    pub best_bookmaker1: String,
    pub best_price2: f64,
    pub best_bookmaker2: String,
}

impl BestPrice {
    fn observe(&mut self, entry: &BookmakerEntry) {
        if self.best_price1 < entry.outcome1 {
            self.best_price1 = entry.outcome1;
            self.best_bookmaker1 = entry.bookmaker.clone();
        }

        if self.best_price2 < entry.outcome2 {
            self.best_price2 = entry.outcome2;
            self.best_bookmaker2 = entry.bookmaker.clone();
        }
    }
}

/// Stored moneyline record
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct H2hRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub team1: String,
    pub team2: String,
    pub bookmakers: Vec<String>,
    pub odds1: Vec<f64>,
    pub odds2: Vec<f64>,
    pub best_odds1: f64,
    pub best_bookmaker1: String,
    pub best_odds2: f64,
    pub best_bookmaker2: String,
}

/// Stored point-spread record
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpreadRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub team1: String,
    pub team2: String,
    pub bookmakers: Vec<String>,
    pub odds1: Vec<f64>,
    pub points1: Vec<f64>,
    pub odds2: Vec<f64>,
    pub points2: Vec<f64>,
}

/// Stored over/under record
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TotalRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub team1: String,
    pub team2: String,
    pub bookmakers: Vec<String>,
    pub odds_over: Vec<f64>,
    pub points_over: Vec<f64>,
    pub odds_under: Vec<f64>,
    pub points_under: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum GameRecord {
    H2h(H2hRecord),
    Spreads(SpreadRecord),
    Totals(TotalRecord),
}

impl GameRecord {
    pub fn id(&self) -> &str {
        match self {
            GameRecord::H2h(r) => &r.id,
            GameRecord::Spreads(r) => &r.id,
            GameRecord::Totals(r) => &r.id,
        }
    }
}

impl GameQuote {
    fn bookmakers(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.bookmaker.clone()).collect()
    }

    fn column<T>(&self, f: impl Fn(&BookmakerEntry) -> T) -> Vec<T> {
        self.entries.iter().map(f).collect()
    }

    fn into_h2h(self, best: BestPrice) -> H2hRecord {
        H2hRecord {
            bookmakers: self.bookmakers(),
            odds1: self.column(|e| e.outcome1),
            odds2: self.column(|e| e.outcome2),
            best_odds1: best.best_price1,
            best_bookmaker1: best.best_bookmaker1,
            best_odds2: best.best_price2,
            best_bookmaker2: best.best_bookmaker2,
            id: self.id,
            team1: self.team1,
            team2: self.team2,
        }
    }

    // Points are validated present for spreads/totals before we get here.
    fn into_spread(self) -> SpreadRecord {
        SpreadRecord {
            bookmakers: self.bookmakers(),
            odds1: self.column(|e| e.outcome1),
            points1: self.column(|e| e.point1.unwrap_or_default()),
            odds2: self.column(|e| e.outcome2),
            points2: self.column(|e| e.point2.unwrap_or_default()),
            id: self.id,
            team1: self.team1,
            team2: self.team2,
        }
    }

    fn into_total(self) -> TotalRecord {
        TotalRecord {
            bookmakers: self.bookmakers(),
            odds_over: self.column(|e| e.outcome1),
            points_over: self.column(|e| e.point1.unwrap_or_default()),
            odds_under: self.column(|e| e.outcome2),
            points_under: self.column(|e| e.point2.unwrap_or_default()),
            id: self.id,
            team1: self.team1,
            team2: self.team2,
        }
    }
}

/// Normalize a moneyline game and pick the best price for each side
pub fn normalize_moneyline(event: &OddsApiEvent) -> Result<(GameQuote, BestPrice), NormalizeError> {
    let (quote, best) = flatten(event, MarketKind::H2h)?;
    Ok((quote, best.unwrap_or_default()))
}

/// Normalize a point-spread game. No best price is tracked for spreads.
pub fn normalize_spread(event: &OddsApiEvent) -> Result<GameQuote, NormalizeError> {
    flatten(event, MarketKind::Spreads).map(|(quote, _)| quote)
}

/// Normalize an over/under game. Outcome 1 is the over, outcome 2 the under.
pub fn normalize_total(event: &OddsApiEvent) -> Result<GameQuote, NormalizeError> {
    flatten(event, MarketKind::Totals).map(|(quote, _)| quote)
}

/// Normalize a game into the record stored for `kind`
pub fn normalize(kind: MarketKind, event: &OddsApiEvent) -> Result<GameRecord, NormalizeError> {
    let record = match kind {
        MarketKind::H2h => {
            let (quote, best) = normalize_moneyline(event)?;
            GameRecord::H2h(quote.into_h2h(best))
        }
        MarketKind::Spreads => GameRecord::Spreads(normalize_spread(event)?.into_spread()),
        MarketKind::Totals => GameRecord::Totals(normalize_total(event)?.into_total()),
    };
    Ok(record)
}

fn flatten(
    event: &OddsApiEvent,
    kind: MarketKind,
) -> Result<(GameQuote, Option<BestPrice>), NormalizeError> {
    if event.id.trim().is_empty() {
        return Err(NormalizeError::MalformedGame {
            home_team: event.home_team.clone(),
            away_team: event.away_team.clone(),
        });
    }

    let mut entries = Vec::with_capacity(event.bookmakers.len());
    let mut best = kind.computes_best().then(BestPrice::default);

    for bookmaker in &event.bookmakers {
        let entry = read_entry(event, bookmaker, kind)?;
        if let Some(best) = best.as_mut() {
            best.observe(&entry);
        }
        entries.push(entry);
    }

    let quote = GameQuote {
        id: event.id.clone(),
        team1: event.home_team.clone(),
        team2: event.away_team.clone(),
        entries,
    };

    Ok((quote, best))
}

/// Prefer the market keyed for `kind`; an unkeyed first market is accepted as-is.
fn select_market(bookmaker: &Bookmaker, kind: MarketKind) -> Option<&Market> {
    bookmaker
        .markets
        .iter()
        .find(|m| m.key == kind.key())
        .or_else(|| bookmaker.markets.first().filter(|m| m.key.is_empty()))
}

fn read_entry(
    event: &OddsApiEvent,
    bookmaker: &Bookmaker,
    kind: MarketKind,
) -> Result<BookmakerEntry, NormalizeError> {
    let malformed = |detail: String| NormalizeError::MalformedQuote {
        game_id: event.id.clone(),
        bookmaker: bookmaker.title.clone(),
        detail,
    };

    let market =
        select_market(bookmaker, kind).ok_or_else(|| malformed(format!("no {} market", kind)))?;

    let (first, second) = match market.outcomes.as_slice() {
        [first, second, ..] => (first, second),
        other => {
            return Err(malformed(format!(
                "expected two outcomes, found {}",
                other.len()
            )))
        }
    };

    let price = |n: usize, outcome: &Outcome| {
        outcome
            .price
            .ok_or_else(|| malformed(format!("outcome {} has no price", n)))
    };

    let point = |n: usize, outcome: &Outcome| match outcome.point {
        None if kind.needs_point() => Err(malformed(format!("outcome {} has no point", n))),
        point => Ok(point),
    };

    Ok(BookmakerEntry {
        bookmaker: bookmaker.title.clone(),
        outcome1: price(1, first)?,
        outcome2: price(2, second)?,
        point1: point(1, first)?,
        point2: point(2, second)?,
    })
}
