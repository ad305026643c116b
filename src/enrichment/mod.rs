//! Parallel match enrichment orchestrator.
//!
//! Nine independent fetches fan out under a bounded-concurrency scheduler
//! with a per-task timeout and a global wall-clock deadline; the deadline is
//! shorter than nine serial task timeouts, so partial results are the normal
//! degraded outcome, not an error. Weather depends on stadium coordinates
//! and runs sequentially after the join point. Tasks share no mutable state
//! beyond the result sink; the stats provider rate-limits itself through the
//! shared HTTP client.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinSet;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::models::Match;
use crate::providers::stats::{
    RefereeInfo, StatsProvider, TacticalInsights, TeamContext, TeamStats, TurnoverRisk,
};
use crate::providers::weather::{WeatherImpact, WeatherProvider};

/// Aggregated enrichment for one match. Every field is optional: downstream
/// consumers degrade gracefully on any missing subset.
#[derive(Debug, Default, Serialize)]
pub struct EnrichmentResult {
    pub home_context: Option<TeamContext>,
    pub away_context: Option<TeamContext>,
    pub home_turnover: Option<TurnoverRisk>,
    pub away_turnover: Option<TurnoverRisk>,
    pub referee: Option<RefereeInfo>,
    pub stadium_coords: Option<(f64, f64)>,
    pub home_stats: Option<TeamStats>,
    pub away_stats: Option<TeamStats>,
    pub tactical: Option<TacticalInsights>,
    pub weather: Option<WeatherImpact>,

    pub elapsed_ms: u64,
    pub successful_calls: u32,
    pub failed_calls: Vec<String>,
}

impl EnrichmentResult {
    pub fn has_injuries(&self) -> bool {
        let count = |ctx: &Option<TeamContext>| {
            ctx.as_ref().map(|c| c.injuries.len()).unwrap_or(0)
        };
        count(&self.home_context) + count(&self.away_context) > 0
    }

    pub fn has_high_turnover(&self) -> bool {
        let high = |t: &Option<TurnoverRisk>| {
            t.as_ref().map(|t| t.risk_level == "HIGH").unwrap_or(false)
        };
        high(&self.home_turnover) || high(&self.away_turnover)
    }

    /// One-line digest for cycle logs.
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if self.has_injuries() {
            parts.push(format!(
                "injuries H={} A={}",
                self.home_context.as_ref().map(|c| c.injuries.len()).unwrap_or(0),
                self.away_context.as_ref().map(|c| c.injuries.len()).unwrap_or(0),
            ));
        }
        if self.has_high_turnover() {
            parts.push("HIGH turnover".to_string());
        }
        if let Some(r) = &self.referee {
            parts.push(format!("referee {}", r.name));
        }
        if let Some(w) = &self.weather {
            if w.alert.is_some() {
                parts.push(format!("weather {}", w.condition));
            }
        }
        if parts.is_empty() {
            "no significant findings".to_string()
        } else {
            parts.join(" | ")
        }
    }
}

pub struct EnrichmentOrchestrator {
    stats: Arc<StatsProvider>,
    weather: Arc<WeatherProvider>,
    task_timeout: Duration,
    total_timeout: Duration,
    concurrency: usize,
}

impl EnrichmentOrchestrator {
    pub fn new(stats: Arc<StatsProvider>, weather: Arc<WeatherProvider>, config: &Config) -> Self {
        Self {
            stats,
            weather,
            task_timeout: Duration::from_secs(config.enrichment_task_timeout_secs),
            total_timeout: Duration::from_secs(config.enrichment_total_timeout_secs),
            concurrency: config.enrichment_concurrency.max(1),
        }
    }

    pub async fn enrich(&self, m: &Match) -> EnrichmentResult {
        let started = Instant::now();
        let sink: Arc<Mutex<EnrichmentResult>> = Arc::new(Mutex::new(EnrichmentResult::default()));
        let semaphore = Arc::new(tokio::sync::Semaphore::new(self.concurrency));

        info!(home = %m.home_team, away = %m.away_team, "Enrichment fan-out start");

        let home = m.home_team.clone();
        let away = m.away_team.clone();
        let kickoff = m.start_time;

        let mut set: JoinSet<()> = JoinSet::new();

        macro_rules! spawn_task {
            ($key:literal, $fut:expr, $apply:expr) => {{
                let sink = sink.clone();
                let semaphore = semaphore.clone();
                let task_timeout = self.task_timeout;
                set.spawn(async move {
                    let Ok(_permit) = semaphore.acquire().await else {
                        return;
                    };
                    match timeout(task_timeout, $fut).await {
                        Ok(Ok(value)) => {
                            let mut guard = sink.lock();
                            #[allow(clippy::redundant_closure_call)]
                            ($apply)(&mut *guard, value);
                            guard.successful_calls += 1;
                            debug!(task = $key, "Enrichment task completed");
                        }
                        Ok(Err(e)) => {
                            warn!(task = $key, error = %e, "Enrichment task failed");
                            sink.lock().failed_calls.push($key.to_string());
                        }
                        Err(_) => {
                            warn!(task = $key, "Enrichment task timed out");
                            sink.lock().failed_calls.push($key.to_string());
                        }
                    }
                });
            }};
        }

        {
            let stats = self.stats.clone();
            let team = home.clone();
            spawn_task!(
                "home_context",
                async move { stats.full_team_context(&team, Some(kickoff)).await },
                |r: &mut EnrichmentResult, v: TeamContext| r.home_context = Some(v)
            );
        }
        {
            let stats = self.stats.clone();
            let team = away.clone();
            spawn_task!(
                "away_context",
                async move { stats.full_team_context(&team, Some(kickoff)).await },
                |r: &mut EnrichmentResult, v: TeamContext| r.away_context = Some(v)
            );
        }
        {
            let stats = self.stats.clone();
            let team = home.clone();
            spawn_task!(
                "home_turnover",
                async move { stats.turnover_risk(&team).await },
                |r: &mut EnrichmentResult, v: TurnoverRisk| r.home_turnover = Some(v)
            );
        }
        {
            let stats = self.stats.clone();
            let team = away.clone();
            spawn_task!(
                "away_turnover",
                async move { stats.turnover_risk(&team).await },
                |r: &mut EnrichmentResult, v: TurnoverRisk| r.away_turnover = Some(v)
            );
        }
        {
            let stats = self.stats.clone();
            let team = home.clone();
            spawn_task!(
                "referee_info",
                async move { stats.referee_info(&team).await },
                |r: &mut EnrichmentResult, v: Option<RefereeInfo>| r.referee = v
            );
        }
        {
            let stats = self.stats.clone();
            let team = home.clone();
            spawn_task!(
                "stadium_coords",
                async move { stats.stadium_coordinates(&team).await },
                |r: &mut EnrichmentResult, v: Option<(f64, f64)>| r.stadium_coords = v
            );
        }
        {
            let stats = self.stats.clone();
            let team = home.clone();
            spawn_task!(
                "home_stats",
                async move { stats.team_stats(&team).await },
                |r: &mut EnrichmentResult, v: TeamStats| r.home_stats = Some(v)
            );
        }
        {
            let stats = self.stats.clone();
            let team = away.clone();
            spawn_task!(
                "away_stats",
                async move { stats.team_stats(&team).await },
                |r: &mut EnrichmentResult, v: TeamStats| r.away_stats = Some(v)
            );
        }
        {
            let stats = self.stats.clone();
            let h = home.clone();
            let a = away.clone();
            spawn_task!(
                "tactical",
                async move { stats.tactical_insights(&h, &a).await },
                |r: &mut EnrichmentResult, v: TacticalInsights| r.tactical = Some(v)
            );
        }

        // Drain the join set under the global deadline; whatever has not
        // finished by then is cancelled and reported as failed.
        let deadline = started + self.total_timeout;
        loop {
            match timeout_at(deadline, set.join_next()).await {
                Ok(Some(_)) => continue,
                Ok(None) => break,
                Err(_) => {
                    let pending = set.len();
                    warn!(pending, "Enrichment global deadline hit, cancelling rest");
                    set.abort_all();
                    while set.join_next().await.is_some() {}
                    sink.lock().failed_calls.push("deadline".to_string());
                    break;
                }
            }
        }

        // Dependent step: weather needs stadium coordinates from the fan-out.
        let coords = sink.lock().stadium_coords;
        if let Some((lat, lon)) = coords {
            if self.weather.is_available() {
                match timeout(self.task_timeout, self.weather.match_weather(lat, lon, kickoff)).await
                {
                    Ok(Ok(w)) => {
                        let mut guard = sink.lock();
                        guard.weather = Some(w);
                        guard.successful_calls += 1;
                    }
                    Ok(Err(e)) => {
                        warn!(error = %e, "Weather fetch failed");
                        sink.lock().failed_calls.push("weather".to_string());
                    }
                    Err(_) => {
                        sink.lock().failed_calls.push("weather".to_string());
                    }
                }
            }
        } else {
            debug!("No stadium coordinates, skipping weather");
        }

        let mut result = Arc::try_unwrap(sink)
            .map(|m| m.into_inner())
            .unwrap_or_default();
        result.elapsed_ms = started.elapsed().as_millis() as u64;

        info!(
            elapsed_ms = result.elapsed_ms,
            ok = result.successful_calls,
            failed = result.failed_calls.len(),
            summary = %result.summary(),
            "Enrichment complete"
        );
        result
    }
}
