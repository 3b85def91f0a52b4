//! Redeploy decisions against the current schedules

use std::collections::BTreeMap;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::deploy::{
    load_deployment_state, save_deployment_state, DeployRequest, DeployService, DeploymentRecord,
    ServiceState,
};
use crate::error::Result;
use crate::metadata::{code_hash, ResolvedMetadata};
use crate::planner::schedule::{DeploymentInfo, Schedule};
use crate::storage::{keys, ObjectStore};

/// Per-function deployment outcome surfaced in the planning report.
#[derive(Clone, Debug, Serialize)]
pub struct FunctionDeployment {
    pub deployed: bool,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FunctionDeployment {
    fn skipped(reason: &str) -> Self {
        Self {
            deployed: false,
            reason: reason.to_string(),
            function_url: None,
            region: None,
            error: None,
        }
    }
}

/// Align deployed instances with the top-ranked region of each schedule.
///
/// A redeploy happens iff there is no prior record, the code hash
/// changed, the optimal region changed, or the remote service is not
/// ACTIVE. The deployment state document is written exactly once, after
/// every function has been processed.
pub async fn reconcile_deployments(
    deployer: &dyn DeployService,
    store: &dyn ObjectStore,
    schedules: &mut BTreeMap<String, Schedule>,
    metadata: &BTreeMap<String, ResolvedMetadata>,
) -> Result<BTreeMap<String, FunctionDeployment>> {
    let mut state = load_deployment_state(store).await?;
    let mut results = BTreeMap::new();

    for (func_name, schedule) in schedules.iter_mut() {
        let outcome = reconcile_one(deployer, store, func_name, schedule, metadata, &mut state)
            .await;
        results.insert(func_name.clone(), outcome);
    }

    save_deployment_state(store, &state).await?;
    Ok(results)
}

async fn reconcile_one(
    deployer: &dyn DeployService,
    store: &dyn ObjectStore,
    func_name: &str,
    schedule: &mut Schedule,
    metadata: &BTreeMap<String, ResolvedMetadata>,
    state: &mut BTreeMap<String, DeploymentRecord>,
) -> FunctionDeployment {
    let Some(meta) = metadata.get(func_name) else {
        return FunctionDeployment::skipped("no_metadata");
    };
    let Some(code) = meta.code.as_deref() else {
        info!(function = func_name, "No code provided, skipping deployment");
        return FunctionDeployment::skipped("no_code");
    };
    let Some(optimal_region) = schedule.optimal_region().map(str::to_string) else {
        return FunctionDeployment::skipped("no_recommendations");
    };

    let current_hash = code_hash(code);
    let existing = state.get(func_name).cloned();

    let deploy_reason = match &existing {
        None => Some("new_function"),
        Some(record) if record.code_hash != current_hash => Some("code_changed"),
        Some(record) if record.deployed_region != optimal_region => Some("region_changed"),
        Some(record) => {
            match deployer
                .get_function_status(func_name, &record.deployed_region)
                .await
            {
                Ok(status) if status.exists && status.status == ServiceState::Active => {
                    info!(function = func_name, "Already deployed and active, skipping");
                    // Keep the schedule dispatchable even when nothing is
                    // redeployed: every slot needs the function URL.
                    let url_current = schedule
                        .deployment
                        .as_ref()
                        .map(|d| d.function_url == record.function_url)
                        .unwrap_or(false);
                    if !url_current || schedule.missing_function_urls() {
                        schedule.attach_deployment(DeploymentInfo {
                            function_url: record.function_url.clone(),
                            region: record.deployed_region.clone(),
                            deployed_at: record.deployed_at,
                        });
                        if let Err(e) = persist_schedule(store, func_name, schedule).await {
                            warn!(function = func_name, "Schedule backfill failed: {}", e);
                        }
                    }
                    return FunctionDeployment {
                        deployed: false,
                        reason: "already_deployed".to_string(),
                        function_url: Some(record.function_url.clone()),
                        region: Some(record.deployed_region.clone()),
                        error: None,
                    };
                }
                Ok(status) => {
                    info!(
                        function = func_name,
                        status = ?status.status,
                        "Service not active, will redeploy"
                    );
                    Some("not_active")
                }
                Err(e) => {
                    warn!(function = func_name, "Status check failed: {}", e);
                    Some("status_check_failed")
                }
            }
        }
    };

    let reason = deploy_reason.unwrap_or("new_function");
    info!(function = func_name, region = %optimal_region, reason, "Deploying");

    let request = DeployRequest {
        function_name: func_name.to_string(),
        code: code.to_string(),
        region: optimal_region.clone(),
        runtime: "python312".to_string(),
        memory_mb: meta.memory_mb,
        cpu: meta.vcpus.to_string(),
        timeout_seconds: meta.timeout_seconds,
        entry_point: "main".to_string(),
        requirements: meta.requirements.clone().unwrap_or_default(),
    };

    match deployer.deploy_function(&request).await {
        Ok(outcome) if outcome.success => {
            let Some(function_url) = outcome.function_url else {
                return FunctionDeployment {
                    deployed: false,
                    reason: "deployment_failed".to_string(),
                    function_url: None,
                    region: Some(optimal_region),
                    error: Some("deploy succeeded without a function URL".to_string()),
                };
            };
            let deployed_at = Utc::now();
            state.insert(
                func_name.to_string(),
                DeploymentRecord {
                    code_hash: current_hash,
                    deployed_region: optimal_region.clone(),
                    function_url: function_url.clone(),
                    deployed_at,
                },
            );
            schedule.attach_deployment(DeploymentInfo {
                function_url: function_url.clone(),
                region: optimal_region.clone(),
                deployed_at,
            });
            if let Err(e) = persist_schedule(store, func_name, schedule).await {
                warn!(function = func_name, "Schedule update failed: {}", e);
            }
            info!(function = func_name, url = %function_url, "Deployed successfully");
            FunctionDeployment {
                deployed: true,
                reason: reason.to_string(),
                function_url: Some(function_url),
                region: Some(optimal_region),
                error: None,
            }
        }
        Ok(outcome) => FunctionDeployment {
            deployed: false,
            reason: "deployment_failed".to_string(),
            function_url: None,
            region: Some(optimal_region),
            error: outcome.error.or_else(|| Some("unknown error".to_string())),
        },
        Err(e) => FunctionDeployment {
            deployed: false,
            reason: "deployment_error".to_string(),
            function_url: None,
            region: Some(optimal_region),
            error: Some(e.to_string()),
        },
    }
}

async fn persist_schedule(
    store: &dyn ObjectStore,
    func_name: &str,
    schedule: &Schedule,
) -> Result<String> {
    store
        .write(&keys::schedule(func_name), &serde_json::to_value(schedule)?)
        .await
}
