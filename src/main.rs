//! Gridshift planner service entry point
//!
//! Starts the planning REST API: /run, /health, /submit and /dispatch.

use std::sync::Arc;

use clap::Parser;
use gridshift::config::StaticConfig;
use gridshift::deploy::HttpDeployService;
use gridshift::dispatcher::TaskQueue;
use gridshift::forecast::ForecastClient;
use gridshift::llm::GeminiClient;
use gridshift::planner::Planner;
use gridshift::rest_api::{planner_router, run_server, AppState};
use gridshift::settings::Settings;
use gridshift::{storage, Error};
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let settings = Settings::parse();
    info!(
        "Starting gridshift planner v{}",
        env!("CARGO_PKG_VERSION")
    );

    let store: Arc<dyn storage::ObjectStore> = storage::from_settings(&settings).into();
    let config = StaticConfig::load(store.as_ref()).await?;

    let forecast = ForecastClient::new(
        &settings.carbon_api_url,
        &settings.carbon_api_token,
        settings.use_actual_forecasts,
    );
    let llm = Arc::new(GeminiClient::new(
        &settings.llm_api_url,
        &settings.llm_api_key,
        &settings.llm_model,
    ));
    let deployer = Arc::new(HttpDeployService::new(
        &settings.deploy_server_url,
        &settings.deploy_api_key,
    ));

    let planner = Planner::new(store.clone(), config, forecast, llm, deployer);
    let task_queue = settings
        .task_queue_enabled()
        .then(|| TaskQueue::new(&settings.task_queue_url));

    let bind_addr = settings.bind_addr.clone();
    let state = Arc::new(AppState {
        planner,
        store,
        task_queue,
        settings,
    });

    run_server(planner_router(state), &bind_addr).await
}
