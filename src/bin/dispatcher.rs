//! Gridshift dispatcher entry point
//!
//! Either handles one dispatch event passed via `--event '<json>'` and
//! prints the selection, or serves the /dispatch endpoint over HTTP.

use std::sync::Arc;

use clap::Parser;
use gridshift::config::StaticConfig;
use gridshift::deploy::HttpDeployService;
use gridshift::dispatcher::{handle_event, DispatchEvent, TaskQueue};
use gridshift::forecast::ForecastClient;
use gridshift::llm::GeminiClient;
use gridshift::planner::Planner;
use gridshift::rest_api::{dispatcher_router, run_server, AppState};
use gridshift::settings::Settings;
use gridshift::storage;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "gridshift-dispatcher", about = "Slot selection and deferred dispatch")]
struct Args {
    /// Handle a single JSON event and exit instead of serving HTTP
    #[arg(long)]
    event: Option<String>,

    #[command(flatten)]
    settings: Settings,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let args = Args::parse();
    let settings = args.settings;
    let store: Arc<dyn storage::ObjectStore> = storage::from_settings(&settings).into();
    let task_queue = settings
        .task_queue_enabled()
        .then(|| TaskQueue::new(&settings.task_queue_url));

    if let Some(raw_event) = args.event {
        let event: DispatchEvent = serde_json::from_str(&raw_event)?;
        let response = handle_event(event, store.as_ref(), task_queue.as_ref()).await?;
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    info!(
        "Starting gridshift dispatcher v{}",
        env!("CARGO_PKG_VERSION")
    );

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

    let bind_addr = settings.bind_addr.clone();
    let state = Arc::new(AppState {
        planner,
        store,
        task_queue,
        settings,
    });

    run_server(dispatcher_router(state), &bind_addr).await?;
    Ok(())
}
