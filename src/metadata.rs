//! Function metadata: polymorphic input form, defaults and fingerprints

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::AgentDefaults;

/// One entry in `function_metadata.json`: either a natural-language
/// description (normalized through LLM extraction before any downstream
/// stage sees it) or an already structured record.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum MetadataEntry {
    Structured(RawMetadata),
    Description(String),
}

/// Optimization priority selecting the ranking decision framework.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    #[default]
    Balanced,
    Costs,
    Emissions,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Balanced => "balanced",
            Priority::Costs => "costs",
            Priority::Emissions => "emissions",
        }
    }
}

/// User-provided metadata before default application.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct RawMetadata {
    #[serde(default)]
    pub function_id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub runtime_ms: Option<f64>,
    #[serde(default)]
    pub memory_mb: Option<u32>,
    #[serde(default)]
    pub vcpus: Option<u32>,
    #[serde(default)]
    pub gpu_required: Option<bool>,
    #[serde(default)]
    pub data_input_gb: Option<f64>,
    #[serde(default)]
    pub data_output_gb: Option<f64>,
    #[serde(default)]
    pub invocations_per_day: Option<u64>,
    #[serde(default)]
    pub source_location: Option<String>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub latency_important: Option<bool>,
    #[serde(default)]
    pub allowed_regions: Option<Vec<String>>,
    #[serde(default)]
    pub allow_schedule_caching: Option<bool>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub requirements: Option<String>,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

/// Estimation metadata returned by the natural-language extraction step.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ExtractionNotes {
    #[serde(default)]
    pub confidence_score: f64,
    #[serde(default)]
    pub assumptions: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// Metadata after default application: every scheduling-relevant field
/// is present, so downstream stages never reach for fallbacks.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ResolvedMetadata {
    pub function_id: String,
    pub description: String,
    pub runtime_ms: f64,
    pub memory_mb: u32,
    pub vcpus: u32,
    pub gpu_required: bool,
    pub data_input_gb: f64,
    pub data_output_gb: f64,
    pub invocations_per_day: u64,
    pub source_location: String,
    pub priority: Priority,
    pub latency_important: bool,
    pub allowed_regions: Vec<String>,
    pub allow_schedule_caching: bool,
    pub timeout_seconds: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requirements: Option<String>,
}

impl ResolvedMetadata {
    /// Apply defaults to a raw record. The mapping key from
    /// `function_metadata.json` overrides any embedded `function_id`.
    pub fn resolve(function_id: &str, raw: RawMetadata, defaults: &AgentDefaults) -> Self {
        let gpu_required = raw.gpu_required.unwrap_or(false);
        let vcpus = raw.vcpus.unwrap_or(if gpu_required {
            defaults.vcpus_if_gpu
        } else {
            defaults.vcpus_default
        });

        Self {
            function_id: function_id.to_string(),
            description: raw
                .description
                .unwrap_or_else(|| "Serverless function".to_string()),
            runtime_ms: raw.runtime_ms.unwrap_or(1000.0),
            memory_mb: raw.memory_mb.unwrap_or(512),
            vcpus,
            gpu_required,
            data_input_gb: raw.data_input_gb.unwrap_or(0.0),
            data_output_gb: raw.data_output_gb.unwrap_or(0.0),
            invocations_per_day: raw.invocations_per_day.unwrap_or(1),
            source_location: raw
                .source_location
                .unwrap_or_else(|| "us-east1".to_string()),
            priority: raw.priority.unwrap_or_default(),
            latency_important: raw.latency_important.unwrap_or(false),
            allowed_regions: raw.allowed_regions.unwrap_or_default(),
            allow_schedule_caching: raw.allow_schedule_caching.unwrap_or(true),
            timeout_seconds: raw.timeout_seconds.unwrap_or(60),
            code: raw.code,
            requirements: raw.requirements,
        }
    }

    /// Stable fingerprint of the scheduling-relevant inputs.
    ///
    /// Excludes `allow_schedule_caching` (toggling it must not invalidate
    /// the cache it governs) and sorts `allowed_regions` so the hash is
    /// independent of input ordering. Computed before any region
    /// filtering: the hash represents user intent, not derived state.
    pub fn metadata_hash(&self) -> String {
        let mut regions = self.allowed_regions.clone();
        regions.sort();

        let fields = serde_json::json!({
            "runtime_ms": self.runtime_ms,
            "memory_mb": self.memory_mb,
            "data_input_gb": self.data_input_gb,
            "data_output_gb": self.data_output_gb,
            "source_location": self.source_location,
            "invocations_per_day": self.invocations_per_day,
            "priority": self.priority,
            "latency_important": self.latency_important,
            "gpu_required": self.gpu_required,
            "vcpus": self.vcpus,
            "allowed_regions": regions,
        });

        // serde_json maps are ordered by key, so this string is canonical.
        let canonical = fields.to_string();
        hex::encode(Sha256::digest(canonical.as_bytes()))
    }
}

/// Fingerprint of function source code, whitespace-insensitive at the ends.
pub fn code_hash(code: &str) -> String {
    hex::encode(Sha256::digest(code.trim().as_bytes()))
}
