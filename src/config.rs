//! Static configuration: regions, power constants, defaults and pricing
//!
//! Loaded once from the object store at startup, validated, and shared
//! read-only for the lifetime of the process.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};
use crate::storage::{keys, ObjectStore};

/// One platform region and its static attributes.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RegionConfig {
    /// Human-readable name, e.g. "Finland"
    pub name: String,
    /// Grid-zone code used by the carbon-data provider, e.g. "FI"
    pub electricity_maps_zone: String,
    /// Continent grouping used by the latency filter
    pub continent: String,
    /// Whether GPU-backed services can be created here
    #[serde(default)]
    pub gpu_available: bool,
    /// Egress pricing applied when data crosses into this region
    pub data_transfer_cost_per_gb_usd: f64,
    /// Key into `Pricing::tiers`
    pub pricing_tier: String,
}

/// Min/max wattage envelope for one GPU type.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct GpuWatts {
    pub min_watts: f64,
    pub max_watts: f64,
}

/// CCF-style power model constants.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PowerConstants {
    pub cpu_min_watts_per_vcpu: f64,
    pub cpu_max_watts_per_vcpu: f64,
    /// Planning-time CPU utilization assumption when no measurement exists
    pub cpu_utilization_default: f64,
    /// Allocation-based: DRAM refresh power does not track access rate
    pub memory_watts_per_gib: f64,
    pub datacenter_pue: f64,
    pub network_kwh_per_gb: f64,
    /// Per-GPU-type wattage envelopes
    #[serde(default)]
    pub gpu_watts: BTreeMap<String, GpuWatts>,
}

/// Resource defaults applied to incomplete function metadata.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AgentDefaults {
    pub vcpus_default: u32,
    pub vcpus_if_gpu: u32,
    pub gpu_count: u32,
    /// Assumed GPU utilization at planning time
    pub gpu_utilization_default: f64,
    pub gpu_type_default: String,
}

/// Per-tier serverless compute pricing.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct TierPricing {
    pub invocation_usd: f64,
    pub vcpu_second_usd: f64,
    pub memory_gib_second_usd: f64,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Pricing {
    pub tiers: BTreeMap<String, TierPricing>,
    /// GPU-second pricing per GPU type
    #[serde(default)]
    pub gpu_second_usd: BTreeMap<String, f64>,
}

/// Process-wide static configuration, read-only after startup.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct StaticConfig {
    pub regions: BTreeMap<String, RegionConfig>,
    pub power_constants: PowerConstants,
    pub agent_defaults: AgentDefaults,
    pub pricing: Pricing,
}

impl StaticConfig {
    /// Load and validate `static_config.json` from the object store.
    pub async fn load(store: &dyn ObjectStore) -> Result<Arc<Self>> {
        let value = store.read(keys::STATIC_CONFIG).await.map_err(|e| {
            Error::Config(format!("could not load {}: {}", keys::STATIC_CONFIG, e))
        })?;
        let config: StaticConfig = serde_json::from_value(value)
            .map_err(|e| Error::Config(format!("invalid static_config.json: {}", e)))?;
        config.validate()?;
        info!(regions = config.regions.len(), "Loaded static configuration");
        Ok(Arc::new(config))
    }

    /// Reject configurations that would produce nonsense downstream.
    pub fn validate(&self) -> Result<()> {
        if self.regions.is_empty() {
            return Err(Error::Config("no regions configured".into()));
        }

        for (code, region) in &self.regions {
            if !self.pricing.tiers.contains_key(&region.pricing_tier) {
                return Err(Error::Config(format!(
                    "region {} references unknown pricing tier '{}'",
                    code, region.pricing_tier
                )));
            }
            if region.electricity_maps_zone.is_empty() {
                return Err(Error::Config(format!("region {} has no grid zone", code)));
            }
        }

        let pc = &self.power_constants;
        if pc.datacenter_pue < 1.0 {
            return Err(Error::Config(format!(
                "datacenter_pue must be >= 1.0, got {}",
                pc.datacenter_pue
            )));
        }
        if pc.cpu_max_watts_per_vcpu < pc.cpu_min_watts_per_vcpu {
            return Err(Error::Config(
                "cpu_max_watts_per_vcpu below cpu_min_watts_per_vcpu".into(),
            ));
        }

        let defaults = &self.agent_defaults;
        if !pc.gpu_watts.contains_key(&defaults.gpu_type_default) {
            return Err(Error::Config(format!(
                "default GPU type '{}' has no wattage entry",
                defaults.gpu_type_default
            )));
        }
        if !self
            .pricing
            .gpu_second_usd
            .contains_key(&defaults.gpu_type_default)
        {
            return Err(Error::Config(format!(
                "default GPU type '{}' has no pricing entry",
                defaults.gpu_type_default
            )));
        }

        Ok(())
    }

    /// Region lookup; unknown codes are a caller bug surfaced as ConfigError.
    pub fn region(&self, code: &str) -> Result<&RegionConfig> {
        self.regions
            .get(code)
            .ok_or_else(|| Error::Config(format!("unknown region code '{}'", code)))
    }

    /// Continent of a region, falling back to "north-america" for codes
    /// outside the configured set (e.g. a source location we do not serve).
    pub fn continent_of(&self, code: &str) -> String {
        self.regions
            .get(code)
            .map(|r| r.continent.clone())
            .unwrap_or_else(|| "north-america".to_string())
    }

    /// Pricing tier for a region.
    pub fn tier_pricing(&self, region: &RegionConfig) -> Result<&TierPricing> {
        self.pricing.tiers.get(&region.pricing_tier).ok_or_else(|| {
            Error::Config(format!("unknown pricing tier '{}'", region.pricing_tier))
        })
    }
}


#[cfg(test)]
mod tests {
    use super::test_fixtures::sample_config;
    use super::*;

    #[test]
    fn sample_config_is_valid() {
        sample_config().validate().unwrap();
    }

    #[test]
    fn unknown_pricing_tier_is_rejected() {
        let mut config = sample_config();
        config
            .regions
            .get_mut("us-east1")
            .unwrap()
            .pricing_tier = "tier9".to_string();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn pue_below_one_is_rejected() {
        let mut config = sample_config();
        config.power_constants.datacenter_pue = 0.9;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_default_gpu_wattage_is_rejected() {
        let mut config = sample_config();
        config.power_constants.gpu_watts.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn continent_falls_back_for_unknown_region() {
        let config = sample_config();
        assert_eq!(config.continent_of("europe-north1"), "europe");
        assert_eq!(config.continent_of("mars-east1"), "north-america");
    }
}
