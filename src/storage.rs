//! Persistent store.
//!
//! SQLite behind a narrow interface: matches with their odds trail, the
//! news log keyed by content fingerprint, and the alert log keyed by
//! (match, cycle). Each operation is a single transaction; callers treat
//! them as atomic.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::models::{AnalysisResult, Match, NewsItem, OddsSnapshot};

/// Logical store operations the pipeline depends on.
pub trait Store: Send + Sync {
    fn upsert_match(&self, m: &Match) -> Result<()>;
    fn append_odds_snapshot(&self, snapshot: &OddsSnapshot) -> Result<()>;
    fn read_odds_history(&self, match_id: &str, window: Duration) -> Result<Vec<OddsSnapshot>>;
    /// Returns false when the item was already present (fingerprint hit).
    fn upsert_news(&self, item: &NewsItem) -> Result<bool>;
    fn read_news(&self, match_id: &str) -> Result<Vec<NewsItem>>;
    fn read_pending_matches(&self, now: DateTime<Utc>, horizon: Duration) -> Result<Vec<Match>>;
    fn record_alert(&self, cycle: u64, score: f64, result: &AnalysisResult) -> Result<()>;
    fn has_alert(&self, match_id: &str, cycle: u64) -> Result<bool>;
}

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new(path: &str) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open database")?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        info!(path, "Store opened");
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS matches (
                id TEXT PRIMARY KEY,
                league_key TEXT NOT NULL,
                home_team TEXT NOT NULL,
                away_team TEXT NOT NULL,
                start_time TEXT NOT NULL,
                opening_home_odd REAL,
                opening_draw_odd REAL,
                opening_away_odd REAL,
                current_home_odd REAL,
                current_draw_odd REAL,
                current_away_odd REAL,
                over25_odd REAL,
                under25_odd REAL,
                btts_odd REAL,
                highest_alerted_score REAL,
                last_deep_dive_at TEXT
            );

            CREATE TABLE IF NOT EXISTS odds_snapshots (
                match_id TEXT NOT NULL,
                captured_at TEXT NOT NULL,
                home_odd REAL,
                draw_odd REAL,
                away_odd REAL,
                over25_odd REAL,
                btts_odd REAL,
                PRIMARY KEY (match_id, captured_at)
            );
            CREATE INDEX IF NOT EXISTS idx_snapshots_match
                ON odds_snapshots (match_id, captured_at);

            CREATE TABLE IF NOT EXISTS news_log (
                match_id TEXT NOT NULL,
                fingerprint TEXT NOT NULL,
                title TEXT NOT NULL,
                snippet TEXT NOT NULL,
                source TEXT NOT NULL,
                published_at TEXT,
                confidence TEXT NOT NULL,
                priority_boost REAL NOT NULL,
                deep_dive_applied INTEGER NOT NULL,
                PRIMARY KEY (match_id, fingerprint)
            );

            CREATE TABLE IF NOT EXISTS alert_log (
                match_id TEXT NOT NULL,
                cycle INTEGER NOT NULL,
                score REAL NOT NULL,
                verdict TEXT NOT NULL,
                confidence INTEGER NOT NULL,
                recommended_market TEXT NOT NULL,
                primary_driver TEXT NOT NULL,
                edge_pct REAL,
                kelly_pct REAL,
                verification TEXT NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (match_id, cycle)
            );
            "#,
        )
        .context("Failed to initialize schema")?;
        Ok(())
    }
}

fn parse_instant_column(raw: Option<String>) -> Option<DateTime<Utc>> {
    raw.as_deref().and_then(crate::util::time::parse_instant)
}

fn row_to_match(row: &rusqlite::Row<'_>) -> rusqlite::Result<Match> {
    let start_raw: String = row.get("start_time")?;
    let deep_dive_raw: Option<String> = row.get("last_deep_dive_at")?;
    Ok(Match {
        id: row.get("id")?,
        league_key: row.get("league_key")?,
        home_team: row.get("home_team")?,
        away_team: row.get("away_team")?,
        start_time: crate::util::time::parse_instant(&start_raw).unwrap_or_else(Utc::now),
        opening_home_odd: row.get("opening_home_odd")?,
        opening_draw_odd: row.get("opening_draw_odd")?,
        opening_away_odd: row.get("opening_away_odd")?,
        current_home_odd: row.get("current_home_odd")?,
        current_draw_odd: row.get("current_draw_odd")?,
        current_away_odd: row.get("current_away_odd")?,
        over25_odd: row.get("over25_odd")?,
        under25_odd: row.get("under25_odd")?,
        btts_odd: row.get("btts_odd")?,
        highest_alerted_score: row.get("highest_alerted_score")?,
        last_deep_dive_at: parse_instant_column(deep_dive_raw),
    })
}

impl Store for SqliteStore {
    /// First sighting freezes the opening odds; later sightings only move
    /// the current ones.
    fn upsert_match(&self, m: &Match) -> Result<()> {
        let conn = self.conn.lock();
        let existing: Option<String> = conn
            .query_row(
                "SELECT id FROM matches WHERE id = ?1",
                params![m.id],
                |row| row.get(0),
            )
            .optional()?;

        if existing.is_none() {
            conn.execute(
                r#"INSERT INTO matches (
                    id, league_key, home_team, away_team, start_time,
                    opening_home_odd, opening_draw_odd, opening_away_odd,
                    current_home_odd, current_draw_odd, current_away_odd,
                    over25_odd, under25_odd, btts_odd,
                    highest_alerted_score, last_deep_dive_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, NULL, NULL)"#,
                params![
                    m.id,
                    m.league_key,
                    m.home_team,
                    m.away_team,
                    m.start_time.to_rfc3339(),
                    m.current_home_odd,
                    m.current_draw_odd,
                    m.current_away_odd,
                    m.current_home_odd,
                    m.current_draw_odd,
                    m.current_away_odd,
                    m.over25_odd,
                    m.under25_odd,
                    m.btts_odd,
                ],
            )?;
            debug!(match_id = %m.id, "Match inserted");
        } else {
            conn.execute(
                r#"UPDATE matches SET
                    current_home_odd = ?2, current_draw_odd = ?3, current_away_odd = ?4,
                    over25_odd = COALESCE(?5, over25_odd),
                    under25_odd = COALESCE(?6, under25_odd),
                    btts_odd = COALESCE(?7, btts_odd),
                    start_time = ?8
                WHERE id = ?1"#,
                params![
                    m.id,
                    m.current_home_odd,
                    m.current_draw_odd,
                    m.current_away_odd,
                    m.over25_odd,
                    m.under25_odd,
                    m.btts_odd,
                    m.start_time.to_rfc3339(),
                ],
            )?;
        }
        Ok(())
    }

    fn append_odds_snapshot(&self, snapshot: &OddsSnapshot) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            r#"INSERT OR IGNORE INTO odds_snapshots
                (match_id, captured_at, home_odd, draw_odd, away_odd, over25_odd, btts_odd)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
            params![
                snapshot.match_id,
                snapshot.captured_at.to_rfc3339(),
                snapshot.home_odd,
                snapshot.draw_odd,
                snapshot.away_odd,
                snapshot.over25_odd,
                snapshot.btts_odd,
            ],
        )?;
        Ok(())
    }

    fn read_odds_history(&self, match_id: &str, window: Duration) -> Result<Vec<OddsSnapshot>> {
        let conn = self.conn.lock();
        let cutoff = (Utc::now() - window).to_rfc3339();
        let mut stmt = conn.prepare(
            r#"SELECT match_id, captured_at, home_odd, draw_odd, away_odd, over25_odd, btts_odd
               FROM odds_snapshots
               WHERE match_id = ?1 AND captured_at >= ?2
               ORDER BY captured_at ASC"#,
        )?;
        let rows = stmt.query_map(params![match_id, cutoff], |row| {
            let captured_raw: String = row.get(1)?;
            Ok(OddsSnapshot {
                match_id: row.get(0)?,
                captured_at: crate::util::time::parse_instant(&captured_raw)
                    .unwrap_or_else(Utc::now),
                home_odd: row.get(2)?,
                draw_odd: row.get(3)?,
                away_odd: row.get(4)?,
                over25_odd: row.get(5)?,
                btts_odd: row.get(6)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn upsert_news(&self, item: &NewsItem) -> Result<bool> {
        let conn = self.conn.lock();
        let inserted = conn.execute(
            r#"INSERT OR IGNORE INTO news_log
                (match_id, fingerprint, title, snippet, source, published_at,
                 confidence, priority_boost, deep_dive_applied)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"#,
            params![
                item.match_id,
                item.fingerprint(),
                item.title,
                item.snippet,
                item.source,
                item.published_at.map(|t| t.to_rfc3339()),
                serde_json::to_string(&item.confidence)?,
                item.priority_boost,
                item.deep_dive_applied as i64,
            ],
        )?;
        Ok(inserted > 0)
    }

    fn read_news(&self, match_id: &str) -> Result<Vec<NewsItem>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            r#"SELECT match_id, title, snippet, source, published_at,
                      confidence, priority_boost, deep_dive_applied
               FROM news_log WHERE match_id = ?1
               ORDER BY priority_boost DESC"#,
        )?;
        let rows = stmt.query_map(params![match_id], |row| {
            let published_raw: Option<String> = row.get(4)?;
            let confidence_raw: String = row.get(5)?;
            Ok(NewsItem {
                match_id: row.get(0)?,
                title: row.get(1)?,
                snippet: row.get(2)?,
                source: row.get(3)?,
                published_at: parse_instant_column(published_raw),
                confidence: serde_json::from_str(&confidence_raw)
                    .unwrap_or(crate::models::NewsConfidence::Low),
                priority_boost: row.get(6)?,
                deep_dive_applied: row.get::<_, i64>(7)? != 0,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Matches still ahead of kickoff inside the horizon, soonest first.
    fn read_pending_matches(&self, now: DateTime<Utc>, horizon: Duration) -> Result<Vec<Match>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            r#"SELECT * FROM matches
               WHERE start_time > ?1 AND start_time <= ?2
               ORDER BY start_time ASC"#,
        )?;
        let rows = stmt.query_map(
            params![now.to_rfc3339(), (now + horizon).to_rfc3339()],
            row_to_match,
        )?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn record_alert(&self, cycle: u64, score: f64, result: &AnalysisResult) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            r#"INSERT OR REPLACE INTO alert_log
                (match_id, cycle, score, verdict, confidence, recommended_market,
                 primary_driver, edge_pct, kelly_pct, verification, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"#,
            params![
                result.match_id,
                cycle as i64,
                score,
                result.verdict.as_str(),
                result.confidence as i64,
                result.recommended_market,
                result.primary_driver,
                result.quant.edge_pct,
                result.quant.kelly_pct,
                result.verification.as_str(),
                Utc::now().to_rfc3339(),
            ],
        )?;
        conn.execute(
            "UPDATE matches SET highest_alerted_score = MAX(COALESCE(highest_alerted_score, 0), ?2) WHERE id = ?1",
            params![result.match_id, score],
        )?;
        Ok(())
    }

    fn has_alert(&self, match_id: &str, cycle: u64) -> Result<bool> {
        let conn = self.conn.lock();
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM alert_log WHERE match_id = ?1 AND cycle = ?2",
                params![match_id, cycle as i64],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{QuantBlock, Verdict, VerificationStatus};

    fn store() -> SqliteStore {
        SqliteStore::in_memory().unwrap()
    }

    fn sample_match(id: &str, hours_ahead: i64) -> Match {
        let mut m = Match::new(
            id,
            "serie_a",
            "Inter",
            "Napoli",
            Utc::now() + Duration::hours(hours_ahead),
        );
        m.current_home_odd = Some(2.0);
        m.current_draw_odd = Some(3.3);
        m.current_away_odd = Some(3.6);
        m
    }

    #[test]
    fn test_upsert_freezes_opening_odds() {
        let s = store();
        let mut m = sample_match("m1", 24);
        s.upsert_match(&m).unwrap();

        m.current_home_odd = Some(1.85);
        s.upsert_match(&m).unwrap();

        let pending = s.read_pending_matches(Utc::now(), Duration::hours(48)).unwrap();
        assert_eq!(pending.len(), 1);
        let stored = &pending[0];
        assert_eq!(stored.opening_home_odd, Some(2.0), "opening stays at first sighting");
        assert_eq!(stored.current_home_odd, Some(1.85), "current follows the market");
    }

    #[test]
    fn test_pending_window_is_strict_on_start() {
        let s = store();
        s.upsert_match(&sample_match("past", -1)).unwrap();
        s.upsert_match(&sample_match("soon", 2)).unwrap();
        s.upsert_match(&sample_match("far", 100)).unwrap();

        let pending = s.read_pending_matches(Utc::now(), Duration::hours(48)).unwrap();
        let ids: Vec<&str> = pending.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["soon"]);
    }

    #[test]
    fn test_odds_history_ordered_and_windowed() {
        let s = store();
        for minutes_ago in [60, 30, 5] {
            s.append_odds_snapshot(&OddsSnapshot {
                match_id: "m1".to_string(),
                captured_at: Utc::now() - Duration::minutes(minutes_ago),
                home_odd: Some(2.0),
                draw_odd: Some(3.3),
                away_odd: Some(3.6),
                over25_odd: None,
                btts_odd: None,
            })
            .unwrap();
        }
        let recent = s.read_odds_history("m1", Duration::minutes(45)).unwrap();
        assert_eq!(recent.len(), 2);
        assert!(recent[0].captured_at < recent[1].captured_at);
    }

    #[test]
    fn test_news_dedup_by_fingerprint() {
        let s = store();
        let item = NewsItem::new("m1", "Striker OUT", "snippet", "gazzetta");
        assert!(s.upsert_news(&item).unwrap());
        // Same title/source, different snippet: still a duplicate.
        let dup = NewsItem::new("m1", "striker out", "other snippet", "Gazzetta");
        assert!(!s.upsert_news(&dup).unwrap());
        assert_eq!(s.read_news("m1").unwrap().len(), 1);
    }

    #[test]
    fn test_file_backed_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pitchbot-test.db");
        let path_str = path.to_str().unwrap();

        {
            let s = SqliteStore::new(path_str).unwrap();
            s.upsert_match(&sample_match("m1", 12)).unwrap();
        }

        let reopened = SqliteStore::new(path_str).unwrap();
        let pending = reopened
            .read_pending_matches(Utc::now(), Duration::hours(48))
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].home_team, "Inter");
    }

    #[test]
    fn test_alert_log_keyed_by_match_and_cycle() {
        let s = store();
        s.upsert_match(&sample_match("m1", 10)).unwrap();
        let result = AnalysisResult {
            match_id: "m1".to_string(),
            verdict: Verdict::Bet,
            confidence: 75,
            recommended_market: "1".to_string(),
            reasoning: "edge".to_string(),
            primary_driver: "QUANT_EDGE".to_string(),
            quant: QuantBlock::empty(),
            verification: VerificationStatus::Confirmed,
        };
        assert!(!s.has_alert("m1", 7).unwrap());
        s.record_alert(7, 8.2, &result).unwrap();
        assert!(s.has_alert("m1", 7).unwrap());
        assert!(!s.has_alert("m1", 8).unwrap());

        // Re-recording the same (match, cycle) replaces, not duplicates.
        s.record_alert(7, 8.4, &result).unwrap();
        assert!(s.has_alert("m1", 7).unwrap());

        let pending = s.read_pending_matches(Utc::now(), Duration::hours(48)).unwrap();
        assert_eq!(pending[0].highest_alerted_score, Some(8.4));
    }
}
