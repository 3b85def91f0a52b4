//! Persisted schedule model and ranking validation

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::forecast::ForecastBundle;
use crate::metadata::ResolvedMetadata;

/// Wire format of slot timestamps, UTC.
pub const SLOT_FORMAT: &str = "%Y-%m-%d %H:%M";

pub fn parse_slot_datetime(s: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, SLOT_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| Error::Ranking(format!("invalid slot datetime '{}': {}", s, e)))
}

pub fn format_slot_datetime(dt: DateTime<Utc>) -> String {
    dt.format(SLOT_FORMAT).to_string()
}

/// One (hour, region) cell of the 24-slot plan.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SlotRecommendation {
    /// "YYYY-MM-DD HH:MM", UTC
    pub datetime: String,
    pub region: String,
    /// gCO2/kWh for that hour
    pub carbon_intensity: i64,
    /// Per-execution transfer cost, copied from the region metrics
    pub transfer_cost_usd: f64,
    /// Per-execution emissions, copied from the region metrics
    pub emissions_grams: f64,
    /// 1 = best, 24 = worst
    pub priority: u32,
    pub reasoning: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_url: Option<String>,
}

impl SlotRecommendation {
    pub fn parsed_datetime(&self) -> Result<DateTime<Utc>> {
        parse_slot_datetime(&self.datetime)
    }
}

/// Deployment snapshot attached after the schedule's ranking is final.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct DeploymentInfo {
    pub function_url: String,
    pub region: String,
    pub deployed_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ScheduleMetadata {
    pub generated_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub metadata_hash: String,
    pub function_metadata: ResolvedMetadata,
    pub regions_used: Vec<String>,
    #[serde(default)]
    pub failed_regions: Vec<String>,
}

/// Persisted per-function execution plan.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Schedule {
    pub recommendations: Vec<SlotRecommendation>,
    pub metadata: ScheduleMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment: Option<DeploymentInfo>,
}

impl Schedule {
    /// Region of the priority-1 slot.
    pub fn optimal_region(&self) -> Option<&str> {
        self.recommendations
            .iter()
            .min_by_key(|r| r.priority)
            .map(|r| r.region.as_str())
    }

    /// Best `n` slots, ascending by priority.
    pub fn top_recommendations(&self, n: usize) -> Vec<SlotRecommendation> {
        let mut sorted = self.recommendations.clone();
        sorted.sort_by_key(|r| r.priority);
        sorted.truncate(n);
        sorted
    }

    /// Re-stamp every slot to today, keeping the hour-of-day and leaving
    /// the ranking untouched. Used when a cached schedule is still valid.
    pub fn refresh_to_today(&mut self, now: DateTime<Utc>) -> Result<()> {
        let today = now.date_naive();
        for rec in &mut self.recommendations {
            let original = rec.parsed_datetime()?;
            let refreshed = today.and_time(original.time()).and_utc();
            rec.datetime = format_slot_datetime(refreshed);
        }
        self.metadata.generated_at = now;
        Ok(())
    }

    /// Set the deployed function URL on the schedule and every slot.
    pub fn attach_deployment(&mut self, deployment: DeploymentInfo) {
        for rec in &mut self.recommendations {
            rec.function_url = Some(deployment.function_url.clone());
        }
        self.deployment = Some(deployment);
    }

    /// True when some slot is missing the function URL.
    pub fn missing_function_urls(&self) -> bool {
        self.recommendations.iter().any(|r| r.function_url.is_none())
    }
}

/// Validate an untrusted ranking payload against the output contract:
/// exactly 24 slots, priorities forming the permutation 1..=24, regions
/// restricted to the candidates offered, datetimes on forecast hours.
/// Returns the slots sorted ascending by priority.
pub fn validate_ranking(
    payload: &serde_json::Value,
    offered_regions: &[String],
    bundle: &ForecastBundle,
) -> Result<Vec<SlotRecommendation>> {
    #[derive(Deserialize)]
    struct RankedPayload {
        recommendations: Vec<RankedSlot>,
    }
    #[derive(Deserialize)]
    struct RankedSlot {
        datetime: String,
        region: String,
        carbon_intensity: f64,
        #[serde(default)]
        transfer_cost_usd: f64,
        #[serde(default)]
        emissions_grams: f64,
        priority: u32,
        #[serde(default)]
        reasoning: String,
    }

    let parsed: RankedPayload = serde_json::from_value(payload.clone())
        .map_err(|e| Error::Ranking(format!("ranking payload has wrong shape: {}", e)))?;

    if parsed.recommendations.len() != 24 {
        return Err(Error::Ranking(format!(
            "expected 24 recommendations, got {}",
            parsed.recommendations.len()
        )));
    }

    let mut seen = [false; 24];
    for slot in &parsed.recommendations {
        if slot.priority < 1 || slot.priority > 24 {
            return Err(Error::Ranking(format!(
                "priority {} outside 1..=24",
                slot.priority
            )));
        }
        let idx = (slot.priority - 1) as usize;
        if seen[idx] {
            return Err(Error::Ranking(format!(
                "duplicate priority {}",
                slot.priority
            )));
        }
        seen[idx] = true;
    }

    let forecast_hours: std::collections::HashSet<DateTime<Utc>> = bundle
        .regions
        .values()
        .flat_map(|r| r.forecast.iter().map(|p| p.datetime))
        .collect();

    let mut slots = Vec::with_capacity(24);
    for slot in parsed.recommendations {
        if !offered_regions.contains(&slot.region) {
            return Err(Error::Ranking(format!(
                "region '{}' was not offered to the ranker",
                slot.region
            )));
        }
        let dt = parse_slot_datetime(&slot.datetime)?;
        if !forecast_hours.contains(&dt) {
            return Err(Error::Ranking(format!(
                "slot datetime '{}' is not a forecast hour",
                slot.datetime
            )));
        }
        slots.push(SlotRecommendation {
            datetime: slot.datetime,
            region: slot.region,
            carbon_intensity: slot.carbon_intensity.round() as i64,
            transfer_cost_usd: slot.transfer_cost_usd,
            emissions_grams: slot.emissions_grams,
            priority: slot.priority,
            reasoning: slot.reasoning,
            function_url: None,
        });
    }

    slots.sort_by_key(|s| s.priority);
    Ok(slots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_fixtures::sample_config;
    use crate::forecast::{ForecastPoint, RegionForecast};
    use crate::metadata::RawMetadata;
    use serde_json::json;

    fn bundle() -> ForecastBundle {
        let start: DateTime<Utc> = "2026-01-28T00:00:00Z".parse().unwrap();
        let mut regions = std::collections::BTreeMap::new();
        for code in ["europe-north1", "europe-west1"] {
            regions.insert(
                code.to_string(),
                RegionForecast {
                    name: code.to_string(),
                    zone: code.to_string(),
                    forecast: (0..24)
                        .map(|h| ForecastPoint {
                            datetime: start + chrono::Duration::hours(h),
                            carbon_intensity: 100.0,
                        })
                        .collect(),
                },
            );
        }
        ForecastBundle {
            fetched_at: Utc::now(),
            regions,
            failed_regions: vec![],
        }
    }

    fn ranking_payload() -> serde_json::Value {
        let recommendations: Vec<_> = (0..24)
            .map(|h| {
                json!({
                    "datetime": format!("2026-01-28 {:02}:00", h),
                    "region": if h % 2 == 0 { "europe-north1" } else { "europe-west1" },
                    "carbon_intensity": 100,
                    "transfer_cost_usd": 0.02,
                    "emissions_grams": 0.5,
                    "priority": h + 1,
                    "reasoning": "test"
                })
            })
            .collect();
        json!({ "recommendations": recommendations })
    }

    fn offered() -> Vec<String> {
        vec!["europe-north1".to_string(), "europe-west1".to_string()]
    }

    fn schedule_from(slots: Vec<SlotRecommendation>) -> Schedule {
        let config = sample_config();
        let metadata =
            ResolvedMetadata::resolve("demo", RawMetadata::default(), &config.agent_defaults);
        let hash = metadata.metadata_hash();
        Schedule {
            recommendations: slots,
            metadata: ScheduleMetadata {
                generated_at: Utc::now(),
                created_at: Utc::now(),
                metadata_hash: hash,
                function_metadata: metadata,
                regions_used: offered(),
                failed_regions: vec![],
            },
            deployment: None,
        }
    }

    #[test]
    fn valid_ranking_passes_and_sorts() {
        let slots = validate_ranking(&ranking_payload(), &offered(), &bundle()).unwrap();
        assert_eq!(slots.len(), 24);
        let priorities: Vec<u32> = slots.iter().map(|s| s.priority).collect();
        assert_eq!(priorities, (1..=24).collect::<Vec<_>>());
    }

    #[test]
    fn wrong_length_is_rejected() {
        let mut payload = ranking_payload();
        payload["recommendations"].as_array_mut().unwrap().pop();
        let err = validate_ranking(&payload, &offered(), &bundle()).unwrap_err();
        assert!(matches!(err, Error::Ranking(_)));
    }

    #[test]
    fn duplicate_priority_is_rejected() {
        let mut payload = ranking_payload();
        payload["recommendations"][1]["priority"] = json!(1);
        assert!(validate_ranking(&payload, &offered(), &bundle()).is_err());
    }

    #[test]
    fn unoffered_region_is_rejected() {
        let mut payload = ranking_payload();
        payload["recommendations"][0]["region"] = json!("us-east1");
        assert!(validate_ranking(&payload, &offered(), &bundle()).is_err());
    }

    #[test]
    fn off_forecast_datetime_is_rejected() {
        let mut payload = ranking_payload();
        payload["recommendations"][0]["datetime"] = json!("2026-02-01 00:00");
        assert!(validate_ranking(&payload, &offered(), &bundle()).is_err());
    }

    #[test]
    fn refresh_keeps_hours_and_ranking() {
        let slots = validate_ranking(&ranking_payload(), &offered(), &bundle()).unwrap();
        let mut schedule = schedule_from(slots);
        let before: Vec<(String, u32)> = schedule
            .recommendations
            .iter()
            .map(|r| (r.region.clone(), r.priority))
            .collect();

        let now: DateTime<Utc> = "2026-02-03T09:30:00Z".parse().unwrap();
        schedule.refresh_to_today(now).unwrap();

        for (rec, (region, priority)) in schedule.recommendations.iter().zip(&before) {
            let dt = rec.parsed_datetime().unwrap();
            assert_eq!(dt.date_naive().to_string(), "2026-02-03");
            assert_eq!(&rec.region, region);
            assert_eq!(&rec.priority, priority);
        }
        // Hour-of-day preserved for the first slot.
        let first = schedule.recommendations[0].parsed_datetime().unwrap();
        assert_eq!(first.format("%H:%M").to_string(), "00:00");
    }

    #[test]
    fn attach_deployment_backfills_every_slot() {
        let slots = validate_ranking(&ranking_payload(), &offered(), &bundle()).unwrap();
        let mut schedule = schedule_from(slots);
        assert!(schedule.missing_function_urls());

        schedule.attach_deployment(DeploymentInfo {
            function_url: "https://fn.example".into(),
            region: "europe-north1".into(),
            deployed_at: Utc::now(),
        });
        assert!(!schedule.missing_function_urls());
        assert_eq!(
            schedule.deployment.as_ref().unwrap().function_url,
            "https://fn.example"
        );
    }
}
