//! Region selection engine
//!
//! Deterministic pre-ranking layer: filters candidate regions by latency
//! continent, GPU availability and the caller's allow-list, then computes
//! per-region cost and emissions figures for the ranking prompt.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::StaticConfig;
use crate::energy::{
    self, emissions_per_execution, energy_per_execution, transfer_cost_per_execution,
    ExecutionProfile,
};
use crate::error::Result;
use crate::forecast::ForecastBundle;
use crate::metadata::ResolvedMetadata;

/// Outcome of region filtering for one function.
///
/// `candidates` is what this function may run on; an empty list means
/// "no filter" and the whole fetched bundle applies. `fetch_union`
/// is this function's contribution to the set of zones the planner must
/// fetch. The GPU filter narrows `candidates` only: other functions may
/// still need the regions it removes.
#[derive(Clone, Debug, Default)]
pub struct CandidateRegions {
    pub candidates: Vec<String>,
    pub fetch_union: Vec<String>,
}

/// Apply the latency, allow-list and GPU filters for one function.
/// Filters are monotone: they only ever remove candidates.
pub fn select_candidate_regions(
    metadata: &ResolvedMetadata,
    config: &StaticConfig,
) -> CandidateRegions {
    let mut candidates = metadata.allowed_regions.clone();
    let mut fetch_union: Vec<String> = Vec::new();

    if metadata.latency_important {
        let continent = config.continent_of(&metadata.source_location);
        if candidates.is_empty() {
            candidates = config
                .regions
                .iter()
                .filter(|(_, r)| r.continent == continent)
                .map(|(code, _)| code.clone())
                .collect();
            debug!(
                function = %metadata.function_id,
                %continent,
                "Latency-sensitive, using all same-continent regions"
            );
        } else {
            candidates.retain(|code| config.continent_of(code) == continent);
            debug!(
                function = %metadata.function_id,
                %continent,
                ?candidates,
                "Latency-sensitive, intersected allow-list with continent"
            );
        }
        fetch_union.extend(candidates.iter().cloned());
    } else if !candidates.is_empty() {
        fetch_union.extend(candidates.iter().cloned());
    }

    if metadata.gpu_required {
        if candidates.is_empty() {
            candidates = config
                .regions
                .iter()
                .filter(|(_, r)| r.gpu_available)
                .map(|(code, _)| code.clone())
                .collect();
            fetch_union.extend(candidates.iter().cloned());
        } else {
            // Shrinks this function's candidates only, never the union.
            candidates.retain(|code| {
                config
                    .regions
                    .get(code)
                    .map(|r| r.gpu_available)
                    .unwrap_or(false)
            });
        }
        debug!(
            function = %metadata.function_id,
            ?candidates,
            "GPU required, filtered to GPU-capable regions"
        );
    }

    fetch_union.sort();
    fetch_union.dedup();

    CandidateRegions {
        candidates,
        fetch_union,
    }
}

/// Per-region cost and emissions figures for one function.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RegionMetrics {
    /// Mean intensity over the 24-hour forecast window, gCO2/kWh
    pub avg_carbon_intensity: f64,
    pub transfer_cost_per_execution: f64,
    pub transfer_cost_yearly: f64,
    pub compute_cost_per_execution: f64,
    pub emissions_per_execution_g: f64,
    pub emissions_yearly_kg: f64,
}

/// Compute metrics for every region present in the (already filtered)
/// forecast bundle.
pub fn region_metrics(
    metadata: &ResolvedMetadata,
    bundle: &ForecastBundle,
    config: &StaticConfig,
) -> Result<BTreeMap<String, RegionMetrics>> {
    let profile = ExecutionProfile::planning(metadata, config);
    let energy = energy_per_execution(&profile, config)?;

    let mut metrics = BTreeMap::new();
    for (region_code, region_forecast) in &bundle.regions {
        let window = &region_forecast.forecast;
        let avg_carbon_intensity = if window.is_empty() {
            0.0
        } else {
            let horizon = window.iter().take(24);
            let count = horizon.clone().count() as f64;
            horizon.map(|p| p.carbon_intensity).sum::<f64>() / count
        };

        let rate = config.region(region_code)?.data_transfer_cost_per_gb_usd;
        let transfer_per_exec = transfer_cost_per_execution(
            region_code,
            &metadata.source_location,
            metadata.data_input_gb,
            metadata.data_output_gb,
            rate,
        );
        let emissions_g = emissions_per_execution(energy.total_kwh, avg_carbon_intensity);
        let compute_cost = energy::compute_cost_per_execution(metadata, region_code, config)?;

        metrics.insert(
            region_code.clone(),
            RegionMetrics {
                avg_carbon_intensity,
                transfer_cost_per_execution: transfer_per_exec,
                transfer_cost_yearly: energy::yearly(transfer_per_exec, metadata.invocations_per_day),
                compute_cost_per_execution: compute_cost,
                emissions_per_execution_g: emissions_g,
                emissions_yearly_kg: energy::yearly(emissions_g, metadata.invocations_per_day)
                    / 1000.0,
            },
        );
    }

    Ok(metrics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_fixtures::sample_config;
    use crate::forecast::{ForecastPoint, RegionForecast};
    use crate::metadata::{RawMetadata, ResolvedMetadata};
    use chrono::Utc;

    fn resolve(raw: RawMetadata) -> ResolvedMetadata {
        ResolvedMetadata::resolve("demo", raw, &sample_config().agent_defaults)
    }

    fn bundle_for(regions: &[(&str, f64)]) -> ForecastBundle {
        let start: chrono::DateTime<Utc> = "2026-01-28T00:00:00Z".parse().unwrap();
        let mut map = std::collections::BTreeMap::new();
        for (code, intensity) in regions {
            let forecast = (0..24)
                .map(|h| ForecastPoint {
                    datetime: start + chrono::Duration::hours(h),
                    carbon_intensity: *intensity,
                })
                .collect();
            map.insert(
                code.to_string(),
                RegionForecast {
                    name: code.to_string(),
                    zone: code.to_string(),
                    forecast,
                },
            );
        }
        ForecastBundle {
            fetched_at: Utc::now(),
            regions: map,
            failed_regions: vec![],
        }
    }

    #[test]
    fn latency_filter_intersects_with_continent() {
        let config = sample_config();
        let metadata = resolve(RawMetadata {
            source_location: Some("europe-west1".into()),
            latency_important: Some(true),
            allowed_regions: Some(vec!["europe-north1".into(), "us-east1".into()]),
            ..Default::default()
        });

        let selection = select_candidate_regions(&metadata, &config);
        assert_eq!(selection.candidates, vec!["europe-north1".to_string()]);
        assert_eq!(selection.fetch_union, vec!["europe-north1".to_string()]);
    }

    #[test]
    fn latency_filter_without_allow_list_uses_whole_continent() {
        let config = sample_config();
        let metadata = resolve(RawMetadata {
            source_location: Some("europe-west1".into()),
            latency_important: Some(true),
            ..Default::default()
        });

        let selection = select_candidate_regions(&metadata, &config);
        let mut expected: Vec<String> = config
            .regions
            .iter()
            .filter(|(_, r)| r.continent == "europe")
            .map(|(c, _)| c.clone())
            .collect();
        expected.sort();
        let mut got = selection.candidates.clone();
        got.sort();
        assert_eq!(got, expected);
    }

    #[test]
    fn gpu_filter_shrinks_candidates_but_not_union() {
        let config = sample_config();
        // Function A requires a GPU; europe-west1 has none.
        let a = resolve(RawMetadata {
            gpu_required: Some(true),
            allowed_regions: Some(vec!["europe-north1".into(), "europe-west1".into()]),
            ..Default::default()
        });
        let selection = select_candidate_regions(&a, &config);
        assert_eq!(selection.candidates, vec!["europe-north1".to_string()]);
        // Union still carries europe-west1 for other functions.
        assert!(selection
            .fetch_union
            .contains(&"europe-west1".to_string()));
    }

    #[test]
    fn gpu_filter_without_allow_list_uses_all_gpu_regions() {
        let config = sample_config();
        let metadata = resolve(RawMetadata {
            gpu_required: Some(true),
            ..Default::default()
        });
        let selection = select_candidate_regions(&metadata, &config);
        let mut got = selection.candidates.clone();
        got.sort();
        assert_eq!(
            got,
            vec!["europe-north1".to_string(), "us-east1".to_string()]
        );
    }

    #[test]
    fn no_filters_means_empty_selection() {
        let config = sample_config();
        let selection = select_candidate_regions(&resolve(RawMetadata::default()), &config);
        assert!(selection.candidates.is_empty());
        assert!(selection.fetch_union.is_empty());
    }

    #[test]
    fn source_region_has_zero_transfer_cost() {
        let config = sample_config();
        let metadata = resolve(RawMetadata {
            source_location: Some("us-east1".into()),
            data_input_gb: Some(10.0),
            data_output_gb: Some(5.0),
            invocations_per_day: Some(1000),
            ..Default::default()
        });
        let bundle = bundle_for(&[("us-east1", 400.0), ("europe-north1", 80.0)]);
        let metrics = region_metrics(&metadata, &bundle, &config).unwrap();

        let home = &metrics["us-east1"];
        assert_eq!(home.transfer_cost_per_execution, 0.0);
        assert_eq!(home.transfer_cost_yearly, 0.0);

        let away = &metrics["europe-north1"];
        let rate = config.regions["europe-north1"].data_transfer_cost_per_gb_usd;
        let expected_yearly = 15.0 * rate * 365_000.0;
        assert!((away.transfer_cost_yearly - expected_yearly).abs() < 1e-6);
    }

    #[test]
    fn average_intensity_covers_the_24h_window() {
        let config = sample_config();
        let metadata = resolve(RawMetadata::default());
        let bundle = bundle_for(&[("europe-north1", 80.0)]);
        let metrics = region_metrics(&metadata, &bundle, &config).unwrap();
        assert!((metrics["europe-north1"].avg_carbon_intensity - 80.0).abs() < 1e-9);
        assert!(metrics["europe-north1"].emissions_per_execution_g > 0.0);
    }
}
