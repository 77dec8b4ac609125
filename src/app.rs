use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::application::{
    spawn_telemetry, CaptureRelay, DiagnosticSession, FaultRecordStore, HybridResolver,
};
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::llm_clients::GeminiClient;
use crate::interfaces::http::{add_log, start_server, HttpState};

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

pub async fn run() -> std::io::Result<()> {
    let config = match AppConfig::load_with_dotenv() {
        Ok(config) => config,
        Err(e) => {
            init_tracing("info");
            error!("Invalid configuration: {}", e);
            return Err(std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()));
        }
    };
    init_tracing(&config.log_level);

    if config.gemini.api_key.is_none() {
        warn!("No Gemini API key configured, diagnosis requests will fail");
    }

    let store = Arc::new(FaultRecordStore::load_from_path(&config.catalog.path));
    info!(
        records = store.len(),
        path = %config.catalog.path.display(),
        "Fault table ready"
    );

    let llm_client = Arc::new(GeminiClient::new(config.gemini.timeout_secs));
    let resolver = HybridResolver::new(llm_client, config.gemini.clone());
    let session = Arc::new(DiagnosticSession::new(store, resolver));

    let (end_tx, end_rx) = watch::channel(false);
    let (telemetry, ticker) = spawn_telemetry(
        Duration::from_secs(config.telemetry.interval_secs),
        end_rx.clone(),
    );

    let logs = Arc::new(Mutex::new(Vec::new()));
    let (host, port) = config.bind_address();
    add_log(
        &logs,
        "INFO",
        "HttpApi",
        &format!("Server listening on http://{}:{}", host, port),
    );

    let state = HttpState {
        session,
        telemetry,
        capture: CaptureRelay::new(),
        session_end: end_rx,
        logs,
    };
    info!("Starting API server on http://{}:{}", host, port);
    let result = start_server(state, &config)?.await;

    let _ = end_tx.send(true);
    if let Err(e) = ticker.await {
        warn!("Telemetry task ended abnormally: {}", e);
    }
    info!("Session ended");
    result
}
