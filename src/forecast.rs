//! Carbon-intensity forecast client
//!
//! Fetches next-24-hour per-zone forecasts from the carbon-data provider.
//! Without premium API access the `/forecast` endpoint is unavailable, so
//! the default mode replays the past 24 hours of history shifted +24h as
//! a mock forecast.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use futures::stream::{self, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Error, Result};

/// How many zone fetches run concurrently.
const FETCH_CONCURRENCY: usize = 4;

/// One hour-aligned forecast sample.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ForecastPoint {
    pub datetime: DateTime<Utc>,
    #[serde(rename = "carbonIntensity")]
    pub carbon_intensity: f64,
}

/// Forecast series for one platform region.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RegionForecast {
    pub name: String,
    pub zone: String,
    pub forecast: Vec<ForecastPoint>,
}

/// Forecasts for all requested regions plus the zones that failed.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ForecastBundle {
    pub fetched_at: DateTime<Utc>,
    pub regions: BTreeMap<String, RegionForecast>,
    pub failed_regions: Vec<String>,
}

impl ForecastBundle {
    /// Sub-bundle restricted to the given regions. An empty allow-list
    /// keeps everything.
    pub fn filtered_to(&self, allowed_regions: &[String]) -> ForecastBundle {
        if allowed_regions.is_empty() {
            return self.clone();
        }
        ForecastBundle {
            fetched_at: self.fetched_at,
            regions: self
                .regions
                .iter()
                .filter(|(code, _)| allowed_regions.contains(code))
                .map(|(code, f)| (code.clone(), f.clone()))
                .collect(),
            failed_regions: self.failed_regions.clone(),
        }
    }

    /// Start of the common forecast window.
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.regions
            .values()
            .filter_map(|r| r.forecast.first())
            .map(|p| p.datetime)
            .min()
    }
}

/// One (region, zone) pair to fetch.
#[derive(Clone, Debug)]
pub struct ZoneRequest {
    pub region: String,
    pub name: String,
    pub zone: String,
}

/// HTTP client for the carbon-data provider.
#[derive(Clone)]
pub struct ForecastClient {
    client: Client,
    base_url: String,
    token: String,
    use_actual_forecasts: bool,
}

impl ForecastClient {
    pub fn new(base_url: &str, token: &str, use_actual_forecasts: bool) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            use_actual_forecasts,
        }
    }

    /// Fetch forecasts for every requested region. Per-zone failures are
    /// tolerated and reported; zero successful zones is fatal.
    pub async fn fetch_regions(&self, requests: &[ZoneRequest]) -> Result<ForecastBundle> {
        if self.use_actual_forecasts {
            info!("Fetching carbon intensity forecasts");
        } else {
            info!("Using mock forecasts (history shifted +24h)");
        }

        let results: Vec<(ZoneRequest, Result<Vec<ForecastPoint>>)> = stream::iter(
            requests.iter().cloned().map(|req| async move {
                let points = self.fetch_zone(&req.zone).await;
                (req, points)
            }),
        )
        .buffer_unordered(FETCH_CONCURRENCY)
        .collect()
        .await;

        let mut regions = BTreeMap::new();
        let mut failed_regions = Vec::new();

        for (req, outcome) in results {
            match outcome {
                Ok(forecast) => {
                    info!(
                        region = %req.region,
                        points = forecast.len(),
                        "Fetched forecast for {} ({})",
                        req.region,
                        req.name
                    );
                    regions.insert(
                        req.region,
                        RegionForecast {
                            name: req.name,
                            zone: req.zone,
                            forecast,
                        },
                    );
                }
                Err(e) => {
                    warn!(region = %req.region, "Failed to fetch forecast: {}", e);
                    failed_regions.push(req.region);
                }
            }
        }

        if regions.is_empty() {
            return Err(Error::Forecast(
                "failed to fetch forecasts for all regions".into(),
            ));
        }
        failed_regions.sort();

        Ok(ForecastBundle {
            fetched_at: Utc::now(),
            regions,
            failed_regions,
        })
    }

    async fn fetch_zone(&self, zone: &str) -> Result<Vec<ForecastPoint>> {
        if self.use_actual_forecasts {
            self.fetch_forecast(zone).await
        } else {
            let history = self.fetch_history(zone).await?;
            Ok(shift_history(&history, 24))
        }
    }

    async fn fetch_forecast(&self, zone: &str) -> Result<Vec<ForecastPoint>> {
        #[derive(Deserialize)]
        struct ForecastResponse {
            #[serde(default)]
            forecast: Vec<ForecastPoint>,
        }

        let response = self
            .client
            .get(format!("{}/forecast", self.base_url))
            .header("auth-token", &self.token)
            .query(&[("zone", zone), ("horizonHours", "24")])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::Forecast(format!(
                "forecast fetch for zone {} failed: {}",
                zone,
                response.status()
            )));
        }

        let body: ForecastResponse = response.json().await?;
        Ok(body.forecast)
    }

    async fn fetch_history(&self, zone: &str) -> Result<Vec<ForecastPoint>> {
        #[derive(Deserialize)]
        struct HistoryResponse {
            #[serde(default)]
            history: Vec<ForecastPoint>,
        }

        let response = self
            .client
            .get(format!("{}/history", self.base_url))
            .header("auth-token", &self.token)
            .query(&[("zone", zone)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::Forecast(format!(
                "history fetch for zone {} failed: {}",
                zone,
                response.status()
            )));
        }

        let body: HistoryResponse = response.json().await?;
        Ok(body.history)
    }
}

/// Turn a history window into a mock forecast: every timestamp moves
/// forward by `shift_hours`, only intensity and datetime survive.
pub fn shift_history(history: &[ForecastPoint], shift_hours: i64) -> Vec<ForecastPoint> {
    let delta = Duration::hours(shift_hours);
    history
        .iter()
        .map(|point| ForecastPoint {
            datetime: point.datetime + delta,
            carbon_intensity: point.carbon_intensity,
        })
        .collect()
}
