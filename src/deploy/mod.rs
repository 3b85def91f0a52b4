//! Function deployment: external deploy contract and reconciliation
//!
//! Keeps deployed function instances aligned with the top-ranked region
//! of each schedule while avoiding needless redeploys.

mod http;
mod orchestrator;

pub use http::HttpDeployService;
pub use orchestrator::{reconcile_deployments, FunctionDeployment};

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::storage::{keys, ObjectStore};

/// Arguments for creating or replacing a function service.
#[derive(Clone, Debug, Serialize)]
pub struct DeployRequest {
    pub function_name: String,
    pub code: String,
    pub region: String,
    pub runtime: String,
    pub memory_mb: u32,
    /// vCPU count as the platform expects it, e.g. "1"
    pub cpu: String,
    pub timeout_seconds: u64,
    pub entry_point: String,
    pub requirements: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct DeployOutcome {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub function_url: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Remote service state as reported by the deploy contract.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceState {
    Active,
    Deploying,
    Failed,
    NotFound,
}

#[derive(Clone, Debug, Deserialize)]
pub struct FunctionStatus {
    #[serde(default)]
    pub exists: bool,
    pub status: ServiceState,
    #[serde(default)]
    pub function_url: Option<String>,
    #[serde(default)]
    pub last_updated: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct InvokeOutcome {
    pub status: u16,
    #[serde(default)]
    pub response: Value,
    #[serde(default)]
    pub execution_time_ms: u64,
}

/// External deploy contract.
#[async_trait]
pub trait DeployService: Send + Sync {
    async fn deploy_function(&self, request: &DeployRequest) -> Result<DeployOutcome>;
    async fn get_function_status(&self, name: &str, region: &str) -> Result<FunctionStatus>;
    async fn invoke_function(
        &self,
        url: &str,
        payload: &Value,
        timeout_seconds: u64,
    ) -> Result<InvokeOutcome>;
    async fn delete_function(&self, name: &str, region: &str) -> Result<bool>;
}

/// What we last deployed for one function.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct DeploymentRecord {
    pub code_hash: String,
    pub deployed_region: String,
    pub function_url: String,
    pub deployed_at: DateTime<Utc>,
}

/// function_id -> deployment record, persisted as one document.
pub type DeploymentState = BTreeMap<String, DeploymentRecord>;

/// Load the deployment state; a missing document is an empty state.
pub async fn load_deployment_state(store: &dyn ObjectStore) -> Result<DeploymentState> {
    match store.read(keys::DEPLOYMENT_STATE).await {
        Ok(value) => Ok(serde_json::from_value(value)?),
        Err(e) if e.is_not_found() => Ok(DeploymentState::new()),
        Err(e) => Err(e),
    }
}

/// Replace the deployment state document. Called exactly once per
/// planning run, after all per-function updates were applied locally.
pub async fn save_deployment_state(
    store: &dyn ObjectStore,
    state: &DeploymentState,
) -> Result<String> {
    store
        .write(keys::DEPLOYMENT_STATE, &serde_json::to_value(state)?)
        .await
}
