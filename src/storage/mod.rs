//! Object store abstraction shared by planner and dispatcher
//!
//! One flat namespace of JSON documents. Writes are whole-object
//! replacements; readers either get the full document or `NotFound`.

mod gcs;
mod local;

pub use gcs::GcsStore;
pub use local::LocalStore;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::settings::{Settings, StorageMode};

/// Well-known object keys.
pub mod keys {
    pub const STATIC_CONFIG: &str = "static_config.json";
    pub const FUNCTION_METADATA: &str = "function_metadata.json";
    pub const CARBON_FORECASTS: &str = "carbon_forecasts.json";
    pub const DEPLOYMENT_STATE: &str = "deployment_state.json";

    pub fn schedule(function_name: &str) -> String {
        format!("schedule_{}.json", function_name)
    }

    pub fn submission(submission_id: &str) -> String {
        format!("submission_{}.json", submission_id)
    }
}

/// Uniform JSON blob I/O over interchangeable backends.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Read one document. Missing objects are `Error::NotFound`; any
    /// transport error is fatal for the containing step.
    async fn read(&self, key: &str) -> Result<Value>;

    /// Replace one document, returning its location string.
    async fn write(&self, key: &str, value: &Value) -> Result<String>;
}

/// Construct the backend selected by the process settings.
pub fn from_settings(settings: &Settings) -> Box<dyn ObjectStore> {
    match settings.storage_mode {
        StorageMode::Local => Box::new(LocalStore::new(&settings.bucket)),
        StorageMode::Cloud => Box::new(GcsStore::new(
            &settings.object_store_url,
            &settings.bucket,
            &settings.object_store_token,
        )),
    }
}
