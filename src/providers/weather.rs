//! Match-weather lookup by stadium coordinates.
//!
//! Runs only after enrichment produced coordinates. A missing key or a
//! failed lookup yields no weather impact, never an aborted enrichment.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::providers::http_client::SharedHttpClient;

const API_URL: &str = "https://api.weatherapi.com/v1/forecast.json";
const RATE_LIMIT_KEY: &str = "weather";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WeatherSeverity {
    None,
    Low,
    Moderate,
    Severe,
}

#[derive(Debug, Clone, Serialize)]
pub struct WeatherImpact {
    pub condition: String,
    pub temp_c: f64,
    pub wind_kph: f64,
    pub precipitation_mm: f64,
    pub severity: WeatherSeverity,
    /// Set when conditions are bad enough to mention in the dossier.
    pub alert: Option<String>,
}

pub struct WeatherProvider {
    http: Arc<SharedHttpClient>,
    api_key: Option<String>,
}

impl WeatherProvider {
    pub fn new(http: Arc<SharedHttpClient>, api_key: Option<String>) -> Self {
        Self {
            http,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        }
    }

    pub fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    pub async fn match_weather(
        &self,
        lat: f64,
        lon: f64,
        kickoff: DateTime<Utc>,
    ) -> Result<WeatherImpact> {
        let key = self.api_key.as_deref().context("no weather API key configured")?;
        let response = self
            .http
            .get(
                API_URL,
                RATE_LIMIT_KEY,
                &[
                    ("key", key.to_string()),
                    ("q", format!("{lat:.4},{lon:.4}")),
                    ("dt", kickoff.format("%Y-%m-%d").to_string()),
                    ("hour", kickoff.format("%H").to_string()),
                ],
                &[],
            )
            .await?;

        if !response.is_success() {
            anyhow::bail!("weather endpoint HTTP {}", response.status);
        }
        let body = response.json()?;

        let hour = body
            .pointer("/forecast/forecastday/0/hour/0")
            .cloned()
            .unwrap_or(serde_json::Value::Null);
        let condition = hour
            .pointer("/condition/text")
            .and_then(|v| v.as_str())
            .unwrap_or("Unknown")
            .to_string();
        let temp_c = hour["temp_c"].as_f64().unwrap_or(15.0);
        let wind_kph = hour["wind_kph"].as_f64().unwrap_or(0.0);
        let precipitation_mm = hour["precip_mm"].as_f64().unwrap_or(0.0);

        let impact = classify(temp_c, wind_kph, precipitation_mm, &condition);
        debug!(condition = %impact.condition, severity = ?impact.severity, "Weather resolved");
        Ok(impact)
    }
}

fn classify(temp_c: f64, wind_kph: f64, precipitation_mm: f64, condition: &str) -> WeatherImpact {
    let cond_lower = condition.to_lowercase();
    let severe_condition =
        cond_lower.contains("snow") || cond_lower.contains("storm") || cond_lower.contains("fog");

    let severity = if severe_condition || wind_kph >= 50.0 || precipitation_mm >= 10.0 {
        WeatherSeverity::Severe
    } else if wind_kph >= 30.0 || precipitation_mm >= 4.0 || temp_c <= -3.0 || temp_c >= 34.0 {
        WeatherSeverity::Moderate
    } else if precipitation_mm > 0.5 || wind_kph >= 20.0 {
        WeatherSeverity::Low
    } else {
        WeatherSeverity::None
    };

    let alert = match severity {
        WeatherSeverity::Severe => Some(format!(
            "Severe conditions expected: {condition}, wind {wind_kph:.0} km/h, precip {precipitation_mm:.1} mm"
        )),
        WeatherSeverity::Moderate => Some(format!(
            "Adverse conditions: {condition}, wind {wind_kph:.0} km/h"
        )),
        _ => None,
    };

    WeatherImpact {
        condition: condition.to_string(),
        temp_c,
        wind_kph,
        precipitation_mm,
        severity,
        alert,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_evening_no_impact() {
        let w = classify(18.0, 8.0, 0.0, "Clear");
        assert_eq!(w.severity, WeatherSeverity::None);
        assert!(w.alert.is_none());
    }

    #[test]
    fn test_heavy_rain_is_severe() {
        let w = classify(12.0, 25.0, 14.0, "Heavy rain");
        assert_eq!(w.severity, WeatherSeverity::Severe);
        assert!(w.alert.unwrap().contains("Severe"));
    }

    #[test]
    fn test_snow_condition_overrides_numbers() {
        let w = classify(0.0, 5.0, 1.0, "Light snow");
        assert_eq!(w.severity, WeatherSeverity::Severe);
    }

    #[test]
    fn test_strong_wind_is_moderate() {
        let w = classify(16.0, 38.0, 0.0, "Partly cloudy");
        assert_eq!(w.severity, WeatherSeverity::Moderate);
        assert!(w.alert.is_some());
    }
}
