//! Planning orchestration
//!
//! One planning pass per invocation: normalize metadata, check schedule
//! caches, fetch forecasts for the union of candidate regions, rank each
//! function's (region, hour) slots with the LLM, persist schedules and
//! reconcile deployments.

pub mod schedule;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::StaticConfig;
use crate::deploy::{reconcile_deployments, DeployService, FunctionDeployment};
use crate::error::{Error, Result};
use crate::forecast::{ForecastBundle, ForecastClient, ZoneRequest};
use crate::llm::{generate_json, prompts, LlmClient};
use crate::metadata::{ExtractionNotes, MetadataEntry, RawMetadata, ResolvedMetadata};
use crate::selection::{region_metrics, select_candidate_regions};
use crate::storage::{keys, ObjectStore};

use schedule::{Schedule, ScheduleMetadata};

/// Cached schedules older than this are regenerated.
pub const MAX_FORECAST_AGE_DAYS: i64 = 7;

/// Per-function result of a planning pass.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum FunctionReport {
    Success {
        schedule_location: String,
        from_cache: bool,
        top_5_recommendations: Vec<schedule::SlotRecommendation>,
        total_recommendations: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        deployment: Option<FunctionDeployment>,
    },
    Error {
        message: String,
    },
}

/// Result of one planning pass across all functions.
#[derive(Clone, Debug, Serialize)]
pub struct PlanReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forecast_location: Option<String>,
    pub functions: BTreeMap<String, FunctionReport>,
}

pub struct Planner {
    store: Arc<dyn ObjectStore>,
    config: Arc<StaticConfig>,
    forecast: ForecastClient,
    llm: Arc<dyn LlmClient>,
    deployer: Arc<dyn DeployService>,
}

impl Planner {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        config: Arc<StaticConfig>,
        forecast: ForecastClient,
        llm: Arc<dyn LlmClient>,
        deployer: Arc<dyn DeployService>,
    ) -> Self {
        Self {
            store,
            config,
            forecast,
            llm,
            deployer,
        }
    }

    pub fn config(&self) -> &Arc<StaticConfig> {
        &self.config
    }

    /// Reconcile deployments for the given schedules. Used by the
    /// one-off submission path; `plan_all` runs this itself.
    pub async fn deploy(
        &self,
        schedules: &mut BTreeMap<String, Schedule>,
        metadata: &BTreeMap<String, ResolvedMetadata>,
    ) -> Result<BTreeMap<String, FunctionDeployment>> {
        reconcile_deployments(
            self.deployer.as_ref(),
            self.store.as_ref(),
            schedules,
            metadata,
        )
        .await
    }

    /// Drive one planning pass for every function in the metadata document.
    pub async fn plan_all(&self) -> Result<PlanReport> {
        let raw_entries = self.load_metadata_entries().await?;
        info!(count = raw_entries.len(), "Found functions to schedule");

        // Normalize every entry before any downstream stage runs. The
        // metadata hash is computed here, before region filtering, so it
        // fingerprints user intent rather than derived state.
        let mut resolved: BTreeMap<String, ResolvedMetadata> = BTreeMap::new();
        let mut hashes: BTreeMap<String, String> = BTreeMap::new();
        let mut failures: BTreeMap<String, String> = BTreeMap::new();

        for (func_name, entry) in raw_entries {
            match self.normalize_entry(&func_name, entry).await {
                Ok(metadata) => {
                    hashes.insert(func_name.clone(), metadata.metadata_hash());
                    resolved.insert(func_name, metadata);
                }
                Err(e) => {
                    warn!(function = %func_name, "Metadata normalization failed: {}", e);
                    failures.insert(func_name, e.to_string());
                }
            }
        }
        if resolved.is_empty() && !failures.is_empty() {
            return Err(Error::Metadata(
                "no function metadata could be normalized".into(),
            ));
        }

        // Cache check per function, before any forecast work.
        let mut cached: BTreeMap<String, Schedule> = BTreeMap::new();
        let mut needs_schedule: BTreeSet<String> = BTreeSet::new();
        for (func_name, metadata) in &resolved {
            match self.cached_schedule(func_name, metadata, &hashes[func_name]).await {
                Some(schedule) => {
                    info!(function = %func_name, "Valid cached schedule found");
                    cached.insert(func_name.clone(), schedule);
                }
                None => {
                    info!(function = %func_name, "No valid cache, will generate new schedule");
                    needs_schedule.insert(func_name.clone());
                }
            }
        }

        let mut schedules: BTreeMap<String, Schedule> = BTreeMap::new();
        let mut schedule_paths: BTreeMap<String, String> = BTreeMap::new();
        let mut from_cache: BTreeSet<String> = BTreeSet::new();
        let mut forecast_location = None;

        // Refresh cached schedules to today's date; the ranking is reused
        // verbatim.
        let now = Utc::now();
        for (func_name, mut schedule) in cached {
            schedule.refresh_to_today(now)?;
            let path = self.persist_schedule(&func_name, &schedule).await?;
            schedule_paths.insert(func_name.clone(), path);
            from_cache.insert(func_name.clone());
            schedules.insert(func_name, schedule);
        }

        if needs_schedule.is_empty() {
            info!("All functions have valid cached schedules, skipping forecast fetch");
        } else {
            // Region-set assembly: each function's candidates shrink
            // individually, the fetch union only ever grows.
            let mut fetch_union: BTreeSet<String> = BTreeSet::new();
            for func_name in &needs_schedule {
                let metadata = resolved.get_mut(func_name).expect("resolved entry");
                let selection = select_candidate_regions(metadata, &self.config);
                fetch_union.extend(selection.fetch_union);
                metadata.allowed_regions = selection.candidates;
            }

            let bundle = self.fetch_forecasts(&fetch_union).await?;
            forecast_location = Some(
                self.store
                    .write(keys::CARBON_FORECASTS, &serde_json::to_value(&bundle)?)
                    .await?,
            );

            for func_name in &needs_schedule {
                let metadata = &resolved[func_name];
                match self.rank_function(metadata, &bundle, &hashes[func_name]).await {
                    Ok(schedule) => {
                        let path = self.persist_schedule(func_name, &schedule).await?;
                        schedule_paths.insert(func_name.clone(), path);
                        schedules.insert(func_name.clone(), schedule);
                    }
                    Err(e) => {
                        // The previous schedule, if any, stays untouched.
                        warn!(function = %func_name, "Schedule generation failed: {}", e);
                        failures.insert(func_name.clone(), e.to_string());
                    }
                }
            }
        }

        let deployments = reconcile_deployments(
            self.deployer.as_ref(),
            self.store.as_ref(),
            &mut schedules,
            &resolved,
        )
        .await?;

        let mut functions = BTreeMap::new();
        for (func_name, schedule) in &schedules {
            functions.insert(
                func_name.clone(),
                FunctionReport::Success {
                    schedule_location: schedule_paths[func_name].clone(),
                    from_cache: from_cache.contains(func_name),
                    top_5_recommendations: schedule.top_recommendations(5),
                    total_recommendations: schedule.recommendations.len(),
                    deployment: deployments.get(func_name).cloned(),
                },
            );
        }
        for (func_name, message) in failures {
            functions.insert(func_name, FunctionReport::Error { message });
        }

        Ok(PlanReport {
            forecast_location,
            functions,
        })
    }

    /// Plan a single ad-hoc function: fetch forecasts for its candidate
    /// regions and rank. Used by one-off submissions; no cache is
    /// consulted since the function id is fresh.
    pub async fn plan_one(&self, metadata: &mut ResolvedMetadata) -> Result<Schedule> {
        let hash = metadata.metadata_hash();
        let selection = select_candidate_regions(metadata, &self.config);
        metadata.allowed_regions = selection.candidates;

        let union: BTreeSet<String> = selection.fetch_union.iter().cloned().collect();
        let bundle = self.fetch_forecasts(&union).await?;
        self.store
            .write(keys::CARBON_FORECASTS, &serde_json::to_value(&bundle)?)
            .await?;

        let schedule = self.rank_function(metadata, &bundle, &hash).await?;
        self.persist_schedule(&metadata.function_id, &schedule).await?;
        Ok(schedule)
    }

    async fn load_metadata_entries(&self) -> Result<BTreeMap<String, MetadataEntry>> {
        let value = self
            .store
            .read(keys::FUNCTION_METADATA)
            .await
            .map_err(|e| Error::Metadata(format!("could not load function metadata: {}", e)))?;

        let functions = value
            .get("functions")
            .cloned()
            .ok_or_else(|| Error::Metadata("function_metadata.json has no 'functions' map".into()))?;
        let entries: BTreeMap<String, MetadataEntry> = serde_json::from_value(functions)
            .map_err(|e| Error::Metadata(format!("invalid function entry: {}", e)))?;

        if entries.is_empty() {
            return Err(Error::Metadata("no functions found in metadata".into()));
        }
        Ok(entries)
    }

    /// Turn one metadata entry into a resolved record, running
    /// natural-language descriptions through the extraction prompt.
    async fn normalize_entry(
        &self,
        func_name: &str,
        entry: MetadataEntry,
    ) -> Result<ResolvedMetadata> {
        let raw = match entry {
            MetadataEntry::Structured(raw) => raw,
            MetadataEntry::Description(description) => {
                info!(function = func_name, "Parsing natural language description");
                let value = generate_json(
                    self.llm.as_ref(),
                    &prompts::extraction_prompt(&description),
                )
                .await
                .map_err(|e| Error::Extraction(format!("{}: {}", func_name, e)))?;

                let raw: RawMetadata = serde_json::from_value(value.clone())
                    .map_err(|e| Error::Extraction(format!("{}: {}", func_name, e)))?;
                let notes: ExtractionNotes =
                    serde_json::from_value(value).unwrap_or_default();
                info!(
                    function = func_name,
                    confidence = notes.confidence_score,
                    "Extracted metadata from description"
                );
                for warning in &notes.warnings {
                    warn!(function = func_name, "Extraction warning: {}", warning);
                }
                raw
            }
        };
        Ok(ResolvedMetadata::resolve(
            func_name,
            raw,
            &self.config.agent_defaults,
        ))
    }

    /// A cached schedule is reusable iff caching is allowed, the stored
    /// hash matches and the schedule is younger than the forecast window
    /// we trust.
    async fn cached_schedule(
        &self,
        func_name: &str,
        metadata: &ResolvedMetadata,
        current_hash: &str,
    ) -> Option<Schedule> {
        if !metadata.allow_schedule_caching {
            return None;
        }
        let value = match self.store.read(&keys::schedule(func_name)).await {
            Ok(value) => value,
            Err(_) => return None,
        };
        let cached: Schedule = serde_json::from_value(value).ok()?;

        if cached.metadata.metadata_hash != current_hash {
            return None;
        }
        let age_days = (Utc::now() - cached.metadata.created_at).num_days();
        if age_days > MAX_FORECAST_AGE_DAYS {
            return None;
        }
        Some(cached)
    }

    async fn fetch_forecasts(&self, union: &BTreeSet<String>) -> Result<ForecastBundle> {
        let requests: Vec<ZoneRequest> = if union.is_empty() {
            // No function constrained its regions: fetch everything.
            self.config
                .regions
                .iter()
                .map(|(code, region)| ZoneRequest {
                    region: code.clone(),
                    name: region.name.clone(),
                    zone: region.electricity_maps_zone.clone(),
                })
                .collect()
        } else {
            union
                .iter()
                .filter_map(|code| match self.config.regions.get(code) {
                    Some(region) => Some(ZoneRequest {
                        region: code.clone(),
                        name: region.name.clone(),
                        zone: region.electricity_maps_zone.clone(),
                    }),
                    None => {
                        warn!(region = %code, "Region not in static config, skipping");
                        None
                    }
                })
                .collect()
        };

        self.forecast.fetch_regions(&requests).await
    }

    /// Metrics, prompt, LLM call, validation, schedule assembly.
    async fn rank_function(
        &self,
        metadata: &ResolvedMetadata,
        bundle: &ForecastBundle,
        metadata_hash: &str,
    ) -> Result<Schedule> {
        let function_bundle = bundle.filtered_to(&metadata.allowed_regions);
        if function_bundle.regions.is_empty() {
            return Err(Error::Ranking(format!(
                "no forecast data for any candidate region of {}",
                metadata.function_id
            )));
        }

        let metrics = region_metrics(metadata, &function_bundle, &self.config)?;
        let prompt = prompts::ranking_prompt(metadata, &function_bundle, &metrics, &self.config);

        info!(function = %metadata.function_id, "Requesting schedule from LLM");
        let payload = generate_json(self.llm.as_ref(), &prompt).await?;

        let offered: Vec<String> = function_bundle.regions.keys().cloned().collect();
        let recommendations = schedule::validate_ranking(&payload, &offered, &function_bundle)?;

        let now = Utc::now();
        Ok(Schedule {
            recommendations,
            metadata: ScheduleMetadata {
                generated_at: now,
                created_at: now,
                metadata_hash: metadata_hash.to_string(),
                function_metadata: metadata.clone(),
                regions_used: offered,
                failed_regions: function_bundle.failed_regions.clone(),
            },
            deployment: None,
        })
    }

    async fn persist_schedule(&self, func_name: &str, schedule: &Schedule) -> Result<String> {
        self.store
            .write(&keys::schedule(func_name), &serde_json::to_value(schedule)?)
            .await
    }
}
