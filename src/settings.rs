//! Process settings parsed from CLI flags and environment variables

use clap::{Parser, ValueEnum};

/// Which backend holds the JSON documents shared between planner and dispatcher.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum StorageMode {
    /// Filesystem directory standing in for a bucket
    Local,
    /// Managed object store addressed by bucket name
    Cloud,
}

/// Runtime settings for the planner and dispatcher services.
///
/// Every field can be supplied via environment variable, which is how the
/// Cloud Run style deployment configures the process.
#[derive(Clone, Debug, Parser)]
#[command(name = "gridshift", about = "Carbon-aware serverless function scheduler")]
pub struct Settings {
    /// Storage backend selection
    #[arg(long, value_enum, env = "STORAGE_MODE", default_value = "local")]
    pub storage_mode: StorageMode,

    /// Bucket name (cloud mode) or bucket directory (local mode)
    #[arg(long, env = "BUCKET_NAME", default_value = "local_bucket")]
    pub bucket: String,

    /// Base URL of the cloud object store API
    #[arg(long, env = "OBJECT_STORE_URL", default_value = "https://storage.googleapis.com")]
    pub object_store_url: String,

    /// OAuth bearer token for the cloud object store
    #[arg(long, env = "OBJECT_STORE_TOKEN", default_value = "")]
    pub object_store_token: String,

    /// Base URL of the carbon-intensity data provider
    #[arg(long, env = "CARBON_API_URL", default_value = "https://api.electricitymaps.com/v3/carbon-intensity")]
    pub carbon_api_url: String,

    /// auth-token header value for the carbon-intensity provider
    #[arg(long, env = "ELECTRICITYMAPS_TOKEN", default_value = "")]
    pub carbon_api_token: String,

    /// Use the real forecast endpoint instead of history shifted +24h
    #[arg(long, env = "USE_ACTUAL_FORECASTS", default_value_t = false)]
    pub use_actual_forecasts: bool,

    /// Base URL of the LLM provider
    #[arg(long, env = "LLM_API_URL", default_value = "https://generativelanguage.googleapis.com")]
    pub llm_api_url: String,

    /// API key for the LLM provider
    #[arg(long, env = "GEMINI_API_KEY", default_value = "")]
    pub llm_api_key: String,

    /// Model identifier for ranking and extraction calls
    #[arg(long, env = "LLM_MODEL", default_value = "gemini-2.5-flash")]
    pub llm_model: String,

    /// Base URL of the function deploy service
    #[arg(long, env = "DEPLOY_SERVER_URL", default_value = "http://localhost:8080")]
    pub deploy_server_url: String,

    /// API key for the deploy service
    #[arg(long, env = "DEPLOY_API_KEY", default_value = "")]
    pub deploy_api_key: String,

    /// Task-queue endpoint; empty disables enqueueing
    #[arg(long, env = "TASK_QUEUE_URL", default_value = "")]
    pub task_queue_url: String,

    /// Listen address for the HTTP surface
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8080")]
    pub bind_addr: String,
}

impl Settings {
    /// True when a task queue endpoint has been configured.
    pub fn task_queue_enabled(&self) -> bool {
        !self.task_queue_url.is_empty()
    }
}
