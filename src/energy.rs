//! Energy, emissions and cost model
//!
//! Pure functions over the static configuration. CPU power follows the
//! CCF min/max envelope scaled by utilization; memory power is
//! allocation-based because DRAM refresh draw is roughly independent of
//! access rate.

use serde::{Deserialize, Serialize};

use crate::config::StaticConfig;
use crate::error::{Error, Result};
use crate::metadata::ResolvedMetadata;

/// Inputs to the per-execution energy model.
#[derive(Clone, Debug)]
pub struct ExecutionProfile {
    pub vcpus: u32,
    pub memory_mb: u32,
    pub runtime_ms: f64,
    /// Measured utilization in [0,1] when available, otherwise the
    /// planning-time default from the power constants.
    pub cpu_utilization: f64,
    pub data_input_gb: f64,
    pub data_output_gb: f64,
    /// Network transfer is amortized over this many requests.
    pub request_count: u64,
    pub gpu_required: bool,
}

impl ExecutionProfile {
    /// Planning-time profile for a resolved function: default CPU
    /// utilization, network energy attributed to a single request.
    pub fn planning(metadata: &ResolvedMetadata, config: &StaticConfig) -> Self {
        Self {
            vcpus: metadata.vcpus,
            memory_mb: metadata.memory_mb,
            runtime_ms: metadata.runtime_ms,
            cpu_utilization: config.power_constants.cpu_utilization_default,
            data_input_gb: metadata.data_input_gb,
            data_output_gb: metadata.data_output_gb,
            request_count: 1,
            gpu_required: metadata.gpu_required,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PowerBreakdown {
    pub cpu_power_w: f64,
    pub memory_power_w: f64,
    pub gpu_power_w: f64,
    pub runtime_s: f64,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct EnergyBreakdown {
    pub compute_kwh: f64,
    pub network_kwh: f64,
    pub total_kwh: f64,
    pub breakdown: PowerBreakdown,
}

/// Energy drawn by one execution, split into compute and network shares.
pub fn energy_per_execution(
    profile: &ExecutionProfile,
    config: &StaticConfig,
) -> Result<EnergyBreakdown> {
    let pc = &config.power_constants;
    let defaults = &config.agent_defaults;

    let runtime_s = profile.runtime_ms / 1000.0;
    let memory_gib = f64::from(profile.memory_mb) / 1024.0;

    let cpu_power_w = f64::from(profile.vcpus)
        * (pc.cpu_min_watts_per_vcpu
            + profile.cpu_utilization * (pc.cpu_max_watts_per_vcpu - pc.cpu_min_watts_per_vcpu));
    let memory_power_w = memory_gib * pc.memory_watts_per_gib;

    let gpu_power_w = if profile.gpu_required {
        let watts = pc
            .gpu_watts
            .get(&defaults.gpu_type_default)
            .ok_or_else(|| {
                Error::Config(format!(
                    "no wattage entry for GPU type '{}'",
                    defaults.gpu_type_default
                ))
            })?;
        f64::from(defaults.gpu_count)
            * (watts.min_watts
                + defaults.gpu_utilization_default * (watts.max_watts - watts.min_watts))
    } else {
        0.0
    };

    let total_power_w = cpu_power_w + memory_power_w + gpu_power_w;
    let compute_kwh = total_power_w * (runtime_s / 3600.0) * pc.datacenter_pue;

    let network_kwh_total = (profile.data_input_gb + profile.data_output_gb) * pc.network_kwh_per_gb;
    let network_kwh = network_kwh_total / profile.request_count.max(1) as f64;

    Ok(EnergyBreakdown {
        compute_kwh,
        network_kwh,
        total_kwh: compute_kwh + network_kwh,
        breakdown: PowerBreakdown {
            cpu_power_w,
            memory_power_w,
            gpu_power_w,
            runtime_s,
        },
    })
}

/// Grams of CO2 for one execution at the given grid intensity.
pub fn emissions_per_execution(total_kwh: f64, carbon_intensity_g_per_kwh: f64) -> f64 {
    total_kwh * carbon_intensity_g_per_kwh
}

/// Egress cost of one execution. Zero when the function runs where its
/// data already lives.
pub fn transfer_cost_per_execution(
    target_region: &str,
    source_location: &str,
    data_input_gb: f64,
    data_output_gb: f64,
    rate_usd_per_gb: f64,
) -> f64 {
    if target_region == source_location {
        return 0.0;
    }
    (data_input_gb + data_output_gb) * rate_usd_per_gb
}

/// Serverless compute price of one execution under a region's tier.
pub fn compute_cost_per_execution(
    metadata: &ResolvedMetadata,
    region_code: &str,
    config: &StaticConfig,
) -> Result<f64> {
    let region = config.region(region_code)?;
    let tier = config.tier_pricing(region)?;

    let runtime_s = metadata.runtime_ms / 1000.0;
    let memory_gib = f64::from(metadata.memory_mb) / 1024.0;

    let mut cost = tier.invocation_usd
        + f64::from(metadata.vcpus) * runtime_s * tier.vcpu_second_usd
        + memory_gib * runtime_s * tier.memory_gib_second_usd;

    if metadata.gpu_required {
        let defaults = &config.agent_defaults;
        let gpu_rate = config
            .pricing
            .gpu_second_usd
            .get(&defaults.gpu_type_default)
            .ok_or_else(|| {
                Error::Config(format!(
                    "no pricing entry for GPU type '{}'",
                    defaults.gpu_type_default
                ))
            })?;
        cost += f64::from(defaults.gpu_count) * runtime_s * gpu_rate;
    }

    Ok(cost)
}

/// Linear scale-up of a per-execution figure to one year of traffic.
pub fn yearly(per_execution: f64, invocations_per_day: u64) -> f64 {
    per_execution * invocations_per_day as f64 * 365.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_fixtures::sample_config;
    use crate::metadata::{RawMetadata, ResolvedMetadata};

    fn profile() -> ExecutionProfile {
        ExecutionProfile {
            vcpus: 1,
            memory_mb: 512,
            runtime_ms: 1000.0,
            cpu_utilization: 0.5,
            data_input_gb: 1.0,
            data_output_gb: 1.0,
            request_count: 1,
            gpu_required: false,
        }
    }

    #[test]
    fn compute_energy_matches_hand_calculation() {
        let config = sample_config();
        let energy = energy_per_execution(&profile(), &config).unwrap();

        // 1 vCPU at 50% of the 0.74..3.5 W envelope, 0.5 GiB of memory.
        let cpu_w = 0.74 + 0.5 * (3.5 - 0.74);
        let mem_w = 0.5 * 0.392;
        let expected = (cpu_w + mem_w) * (1.0 / 3600.0) * 1.1;
        assert!((energy.compute_kwh - expected).abs() < 1e-12);
        assert!((energy.network_kwh - 0.002).abs() < 1e-12);
        assert!((energy.total_kwh - (expected + 0.002)).abs() < 1e-12);
    }

    #[test]
    fn gpu_adds_power_draw() {
        let config = sample_config();
        let without = energy_per_execution(&profile(), &config).unwrap();
        let with = energy_per_execution(
            &ExecutionProfile {
                gpu_required: true,
                ..profile()
            },
            &config,
        )
        .unwrap();

        // One L4 at the assumed midpoint of its 20..72 W envelope.
        let gpu_w = 20.0 + 0.5 * (72.0 - 20.0);
        assert!((with.breakdown.gpu_power_w - gpu_w).abs() < 1e-12);
        assert!(with.compute_kwh > without.compute_kwh);
    }

    #[test]
    fn runtime_and_memory_increase_compute_energy() {
        let config = sample_config();
        let base = energy_per_execution(&profile(), &config).unwrap();

        let longer = energy_per_execution(
            &ExecutionProfile {
                runtime_ms: 2000.0,
                ..profile()
            },
            &config,
        )
        .unwrap();
        assert!(longer.compute_kwh > base.compute_kwh);

        let bigger = energy_per_execution(
            &ExecutionProfile {
                memory_mb: 2048,
                ..profile()
            },
            &config,
        )
        .unwrap();
        assert!(bigger.compute_kwh > base.compute_kwh);
    }

    #[test]
    fn network_energy_scales_with_data_and_request_count() {
        let config = sample_config();
        let base = energy_per_execution(&profile(), &config).unwrap();

        let more_data = energy_per_execution(
            &ExecutionProfile {
                data_input_gb: 2.0,
                ..profile()
            },
            &config,
        )
        .unwrap();
        assert!(more_data.network_kwh > base.network_kwh);

        let amortized = energy_per_execution(
            &ExecutionProfile {
                request_count: 4,
                ..profile()
            },
            &config,
        )
        .unwrap();
        assert!((amortized.network_kwh - base.network_kwh / 4.0).abs() < 1e-15);
    }

    #[test]
    fn same_region_transfer_is_free() {
        assert_eq!(
            transfer_cost_per_execution("us-east1", "us-east1", 10.0, 5.0, 0.02),
            0.0
        );
        let cost = transfer_cost_per_execution("europe-west1", "us-east1", 10.0, 5.0, 0.02);
        assert!((cost - 0.3).abs() < 1e-12);
    }

    #[test]
    fn compute_cost_uses_region_tier() {
        let config = sample_config();
        let metadata = ResolvedMetadata::resolve(
            "demo",
            RawMetadata {
                runtime_ms: Some(1000.0),
                memory_mb: Some(1024),
                ..Default::default()
            },
            &config.agent_defaults,
        );

        let tier1 = compute_cost_per_execution(&metadata, "europe-west1", &config).unwrap();
        let tier2 = compute_cost_per_execution(&metadata, "europe-west9", &config).unwrap();
        assert!(tier2 > tier1);
    }

    #[test]
    fn yearly_scaling_is_linear() {
        assert!((yearly(0.5, 1000) - 182_500.0).abs() < 1e-9);
        assert_eq!(yearly(0.0, 1000), 0.0);
    }
}
