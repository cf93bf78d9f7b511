//! Document storage for refreshed odds.
//!
//! One document per (market, sport) holds the `games` array. A refresh
//! empties it and appends one record per game inside a single transaction,
//! so readers see either the previous games or the complete new set.

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgConnection, PgPool};
use std::time::Duration;
use tracing::{debug, info};

use crate::normalizer::{GameRecord, MarketKind};

#[allow(async_fn_in_trait)]
pub trait OddsStore {
    /// Replace the document's games with `records`, all or nothing
    async fn replace_games(&self, kind: MarketKind, sport: &str, records: &[GameRecord]) -> Result<()>;
}

/// Postgres-backed store. Expects:
///
/// ```sql
/// CREATE TABLE odds_documents (
///     market     TEXT NOT NULL,
///     sport      TEXT NOT NULL,
///     games      JSONB NOT NULL DEFAULT '[]'::jsonb,
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     PRIMARY KEY (market, sport)
/// );
/// ```
pub struct PgOddsStore {
    pool: PgPool,
}

impl PgOddsStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10))
            .connect(url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        info!("Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Release the pool; waits for checked-out connections to come back
    pub async fn close(self) {
        self.pool.close().await;
        info!("Closed PostgreSQL pool");
    }
}

impl OddsStore for PgOddsStore {
    async fn replace_games(&self, kind: MarketKind, sport: &str, records: &[GameRecord]) -> Result<()> {
        // Dropping the transaction before commit (error or shutdown) rolls it back
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        reset_games(&mut *tx, kind, sport).await?;
        for record in records {
            append_game(&mut *tx, kind, sport, record).await?;
        }

        tx.commit()
            .await
            .with_context(|| format!("Failed to commit {} games for {}", kind, sport))?;

        debug!("Replaced {} games for {} ({} records)", kind, sport, records.len());
        Ok(())
    }
}

async fn reset_games(conn: &mut PgConnection, kind: MarketKind, sport: &str) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO odds_documents (market, sport, games, updated_at)
        VALUES ($1, $2, '[]'::jsonb, NOW())
        ON CONFLICT (market, sport) DO UPDATE SET
            games = '[]'::jsonb,
            updated_at = NOW()
        "#,
    )
    .bind(kind.key())
    .bind(sport)
    .execute(conn)
    .await
    .with_context(|| format!("Failed to reset {} games for {}", kind, sport))?;

    Ok(())
}

async fn append_game(
    conn: &mut PgConnection,
    kind: MarketKind,
    sport: &str,
    record: &GameRecord,
) -> Result<()> {
    let document = serde_json::to_value(record).context("Failed to serialize game record")?;

    sqlx::query(
        r#"
        INSERT INTO odds_documents (market, sport, games, updated_at)
        VALUES ($1, $2, jsonb_build_array($3::jsonb), NOW())
        ON CONFLICT (market, sport) DO UPDATE SET
            games = odds_documents.games || EXCLUDED.games,
            updated_at = NOW()
        "#,
    )
    .bind(kind.key())
    .bind(sport)
    .bind(document)
    .execute(conn)
    .await
    .with_context(|| format!("Failed to store {} game {} for {}", kind, record.id(), sport))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalizer::normalize;
    use crate::odds_api::OddsApiEvent;
    use serde_json::{json, Value};

    fn record(id: &str, price: f64) -> GameRecord {
        let event: OddsApiEvent = serde_json::from_value(json!({
            "id": id, "home_team": "A", "away_team": "B",
            "bookmakers": [{ "title": "X", "markets": [{ "key": "h2h", "outcomes": [{ "price": price }, { "price": 2.0 }] }] }]
        }))
        .unwrap();
        normalize(MarketKind::H2h, &event).unwrap()
    }

    async fn stored_ids(store: &PgOddsStore, sport: &str) -> Vec<Value> {
        let games: Value = sqlx::query_scalar(
            "SELECT games FROM odds_documents WHERE market = 'h2h' AND sport = $1",
        )
        .bind(sport)
        .fetch_one(&store.pool)
        .await
        .unwrap();

        games
            .as_array()
            .unwrap()
            .iter()
            .map(|g| g["_id"].clone())
            .collect()
    }

    #[tokio::test]
    #[ignore]
    async fn test_replace_games_round_trip() {
        dotenvy::dotenv().ok();
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL not set");
        let store = PgOddsStore::connect(&url).await.unwrap();

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS odds_documents (
                market     TEXT NOT NULL,
                sport      TEXT NOT NULL,
                games      JSONB NOT NULL DEFAULT '[]'::jsonb,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                PRIMARY KEY (market, sport)
            )
            "#,
        )
        .execute(&store.pool)
        .await
        .unwrap();

        let sport = "TEST_REPLACE_GAMES";
        sqlx::query("DELETE FROM odds_documents WHERE sport = $1")
            .bind(sport)
            .execute(&store.pool)
            .await
            .unwrap();

        // First write creates the document
        store
            .replace_games(MarketKind::H2h, sport, &[record("g1", 1.5), record("g2", 1.7)])
            .await
            .unwrap();
        assert_eq!(stored_ids(&store, sport).await, vec![json!("g1"), json!("g2")]);

        // Second write replaces, not appends
        store
            .replace_games(MarketKind::H2h, sport, &[record("g3", 1.9)])
            .await
            .unwrap();
        assert_eq!(stored_ids(&store, sport).await, vec![json!("g3")]);

        // Empty refresh leaves an empty array rather than no document
        store.replace_games(MarketKind::H2h, sport, &[]).await.unwrap();
        assert!(stored_ids(&store, sport).await.is_empty());

        sqlx::query("DELETE FROM odds_documents WHERE sport = $1")
            .bind(sport)
            .execute(&store.pool)
            .await
            .unwrap();
        store.close().await;
    }
}
