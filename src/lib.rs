pub mod api;
pub mod models;
pub mod services;

use anyhow::Context;
use api::{router, AppState};
use services::config_store::ConfigStore;
use services::detection::Detector;
use services::model::{load_into, ModelError, ModelSlot};

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Instant;
use tokio::sync::oneshot;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static PROCESS_START: OnceLock<Instant> = OnceLock::new();
static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

const LOG_FILE_PREFIX: &str = "ai-detector_";
const LOG_FILES_KEPT: usize = 30;

fn startup_elapsed_ms() -> u128 {
    PROCESS_START
        .get()
        .map(|t| t.elapsed().as_millis())
        .unwrap_or(0)
}

fn env_flag(key: &str) -> bool {
    matches!(
        std::env::var(key).as_deref(),
        Ok("1") | Ok("true") | Ok("TRUE")
    )
}

/// Initialize logging: console always, plus a timestamped log file when
/// `DETECTOR_LOG_DIR` is set.
pub fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let logs_dir = match std::env::var("DETECTOR_LOG_DIR") {
        Ok(p) if !p.trim().is_empty() && !env_flag("DETECTOR_DISABLE_FILE_LOG") => PathBuf::from(p),
        _ => {
            init_console_only_logging(env_filter);
            return;
        }
    };

    if let Err(e) = fs::create_dir_all(&logs_dir) {
        eprintln!("Failed to create logs directory: {}", e);
        init_console_only_logging(env_filter);
        info!("Falling back to console-only logging (log dir not writable)");
        return;
    }

    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let log_filename = format!("{}{}.log", LOG_FILE_PREFIX, timestamp);

    // One file per process; writes go through a non-blocking worker.
    let file_appender = rolling::never(&logs_dir, &log_filename);
    let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(file_guard);

    let file_layer = fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer())
        .init();

    info!("Log file: {}/{}", logs_dir.display(), log_filename);

    if !env_flag("DETECTOR_DISABLE_LOG_CLEANUP") {
        std::thread::spawn(move || {
            cleanup_old_logs(&logs_dir, LOG_FILES_KEPT);
        });
    }
}

#[cfg(debug_assertions)]
fn console_layer<S>() -> impl tracing_subscriber::Layer<S>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fmt::layer()
        .with_writer(std::io::stdout)
        .with_ansi(true)
        .with_target(true)
}

#[cfg(not(debug_assertions))]
fn console_layer<S>() -> impl tracing_subscriber::Layer<S>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(true)
}

fn init_console_only_logging(env_filter: EnvFilter) {
    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer())
        .init();
}

fn cleanup_old_logs(logs_dir: &Path, keep: usize) {
    let mut entries: Vec<_> = match fs::read_dir(logs_dir) {
        Ok(rd) => rd.filter_map(|e| e.ok()).collect(),
        Err(_) => return,
    };

    entries.retain(|e| {
        let name = e.file_name().to_string_lossy().to_string();
        name.starts_with(LOG_FILE_PREFIX) && name.ends_with(".log")
    });

    if entries.len() <= keep {
        return;
    }

    entries.sort_by_key(|e| {
        e.metadata()
            .and_then(|m| m.modified())
            .unwrap_or(std::time::SystemTime::UNIX_EPOCH)
    });

    let remove_count = entries.len().saturating_sub(keep);
    for entry in entries.into_iter().take(remove_count) {
        let _ = fs::remove_file(entry.path());
    }
}

/// Failure reported by the model loader, kept for `run` to return.
type LoadFailure = Arc<Mutex<Option<ModelError>>>;

/// Resolves on Ctrl-C, or when the model loader reports a failure. A
/// reported failure is stored in `failure` before this returns.
async fn shutdown_signal(loader_failed: oneshot::Receiver<ModelError>, failure: LoadFailure) {
    let loader_failed = async {
        match loader_failed.await {
            Ok(err) => err,
            // A dropped sender means the loader succeeded: keep serving.
            Err(_) => std::future::pending::<ModelError>().await,
        }
    };

    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        _ = ctrl_c => {
            info!("Shutdown requested");
        }
        err = loader_failed => {
            error!("Model failed to load, shutting down: {}", err);
            if let Ok(mut slot) = failure.lock() {
                *slot = Some(err);
            }
        }
    }
}

/// Run the service until Ctrl-C or a model load failure.
pub async fn run() -> anyhow::Result<()> {
    PROCESS_START.get_or_init(Instant::now);

    let logging_t0 = Instant::now();
    init_logging();
    info!(
        startup_ms = startup_elapsed_ms(),
        logging_ms = logging_t0.elapsed().as_millis(),
        version = env!("CARGO_PKG_VERSION"),
        "logging.initialized"
    );

    let store = ConfigStore::from_env();
    let config = store
        .load_effective()
        .with_context(|| format!("loading config from {}", store.path().display()))?;
    let addr = config.server.bind_addr()?;

    let slot = Arc::new(ModelSlot::new());
    let state = AppState::new(Detector::new(slot.clone()), config.model.name.as_str());
    let app = router(state, &config.cors);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!(
        addr = %addr,
        model = %config.model.name,
        startup_ms = startup_elapsed_ms(),
        "server.listening"
    );

    let (failed_tx, failed_rx) = oneshot::channel();
    let model_config = config.model.clone();
    let loader = tokio::spawn(async move {
        if let Err(e) = load_into(&model_config, &slot).await {
            let _ = failed_tx.send(e);
        }
    });

    let failure: LoadFailure = Arc::new(Mutex::new(None));
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(failed_rx, failure.clone()))
        .await
        .context("serving HTTP")?;
    loader.abort();

    let load_error = failure.lock().ok().and_then(|mut slot| slot.take());
    if let Some(err) = load_error {
        return Err(anyhow::Error::new(err).context("loading model"));
    }

    info!("=== AI Detector Exited ===");
    Ok(())
}
