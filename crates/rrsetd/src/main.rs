// # rrsetd - RRset Daemon
//
// A thin integration layer around rrset-core. All validation, commit and
// retry logic lives in the library.
//
// The rrsetd daemon is responsible for:
// 1. Reading configuration from environment variables
// 2. Initializing logging and the runtime
// 3. Opening the store and starting the reconciler and sync worker
// 4. Serving line-delimited JSON requests on stdin/stdout
//
// ## Configuration
//
// All configuration is done via environment variables:
//
// ### Store
// - `RRSET_STORE_TYPE`: Type of store (memory, file)
// - `RRSET_STORE_PATH`: Path to the store file (for file store)
//
// ### Engine
// - `RRSET_MINIMUM_TTL`: TTL floor for newly created domains
// - `RRSET_MAXIMUM_TTL`: Upper TTL bound for every write
// - `RRSET_MAX_RETRIES`: Maximum retries after a storage fault
// - `RRSET_RETRY_DELAY_MS`: Delay before the first retry
// - `RRSET_REQUEST_TIMEOUT_MS`: Deadline for a batch to reach its commit point
//
// ### Logging
// - `RRSET_LOG_LEVEL`: trace, debug, info, warn, error (logs go to stderr)
//
// ## Example
//
// ```bash
// export RRSET_STORE_TYPE=file
// export RRSET_STORE_PATH=/var/lib/rrsetd/zones.json
//
// echo '{"action":"create_domain","principal":"alice","domain":"example.com"}' | rrsetd
// ```

mod protocol;

use anyhow::{Context, Result};
use rrset_core::{
    EngineConfig, Reconciler, ServiceConfig, StoreConfig, SyncWorker, TracingZoneSync, open_store,
};
use std::env;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::oneshot;
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

use protocol::Service;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum RrsetExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<RrsetExitCode> for ExitCode {
    fn from(code: RrsetExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
struct Config {
    store_type: String,
    store_path: Option<String>,
    minimum_ttl: Option<u32>,
    maximum_ttl: Option<u32>,
    max_retries: Option<usize>,
    retry_delay_ms: Option<u64>,
    request_timeout_ms: Option<u64>,
    log_level: String,
}

/// Read and parse an optional numeric variable
fn env_number<T: FromStr>(name: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("{} is not a valid number ('{}'): {}", name, value, e)),
        Err(_) => Ok(None),
    }
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Ok(Self {
            store_type: env::var("RRSET_STORE_TYPE").unwrap_or_else(|_| "memory".to_string()),
            store_path: env::var("RRSET_STORE_PATH").ok(),
            minimum_ttl: env_number("RRSET_MINIMUM_TTL")?,
            maximum_ttl: env_number("RRSET_MAXIMUM_TTL")?,
            max_retries: env_number("RRSET_MAX_RETRIES")?,
            retry_delay_ms: env_number("RRSET_RETRY_DELAY_MS")?,
            request_timeout_ms: env_number("RRSET_REQUEST_TIMEOUT_MS")?,
            log_level: env::var("RRSET_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        match self.store_type.as_str() {
            "memory" => {}
            "file" => {
                let Some(path) = self.store_path.as_deref().filter(|p| !p.is_empty()) else {
                    anyhow::bail!(
                        "RRSET_STORE_PATH is required when RRSET_STORE_TYPE=file. \
                        Set it via: export RRSET_STORE_PATH=/var/lib/rrsetd/zones.json"
                    );
                };

                if let Some(parent) = std::path::Path::new(path).parent()
                    && !parent.as_os_str().is_empty()
                    && !parent.exists()
                {
                    anyhow::bail!(
                        "RRSET_STORE_PATH parent directory does not exist: {}. \
                            Create it first: sudo mkdir -p {}",
                        parent.display(),
                        parent.display()
                    );
                }
            }
            _ => anyhow::bail!(
                "RRSET_STORE_TYPE '{}' is not supported. \
                Supported types: memory, file",
                self.store_type
            ),
        }

        if let Some(ttl) = self.minimum_ttl
            && !(1..=86400).contains(&ttl)
        {
            anyhow::bail!("RRSET_MINIMUM_TTL must be between 1 and 86400. Got: {}", ttl);
        }

        if let Some(ttl) = self.maximum_ttl
            && !(60..=604800).contains(&ttl)
        {
            anyhow::bail!("RRSET_MAXIMUM_TTL must be between 60 and 604800. Got: {}", ttl);
        }

        if let Some(max_retries) = self.max_retries
            && max_retries > 10
        {
            anyhow::bail!(
                "RRSET_MAX_RETRIES must be between 0 and 10. Got: {}",
                max_retries
            );
        }

        if let Some(delay) = self.retry_delay_ms
            && !(1..=60_000).contains(&delay)
        {
            anyhow::bail!(
                "RRSET_RETRY_DELAY_MS must be between 1 and 60000. Got: {}",
                delay
            );
        }

        if let Some(timeout) = self.request_timeout_ms
            && !(100..=600_000).contains(&timeout)
        {
            anyhow::bail!(
                "RRSET_REQUEST_TIMEOUT_MS must be between 100 and 600000. Got: {}",
                timeout
            );
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "RRSET_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        self.service_config()
            .validate()
            .context("Inconsistent engine configuration")?;
        Ok(())
    }

    /// Library configuration, defaults filled in
    fn service_config(&self) -> ServiceConfig {
        let defaults = EngineConfig::default();
        let store = match (self.store_type.as_str(), &self.store_path) {
            ("file", Some(path)) => StoreConfig::File { path: path.clone() },
            _ => StoreConfig::Memory,
        };
        ServiceConfig {
            engine: EngineConfig {
                minimum_ttl: self.minimum_ttl.unwrap_or(defaults.minimum_ttl),
                maximum_ttl: self.maximum_ttl.unwrap_or(defaults.maximum_ttl),
                max_retries: self.max_retries.unwrap_or(defaults.max_retries),
                retry_delay_ms: self.retry_delay_ms.unwrap_or(defaults.retry_delay_ms),
                request_timeout_ms: self.request_timeout_ms.unwrap_or(defaults.request_timeout_ms),
                ..defaults
            },
            store,
        }
    }
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return RrsetExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {:#}", e);
        return RrsetExitCode::ConfigError.into();
    }

    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // stdout carries responses
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return RrsetExitCode::ConfigError.into();
    }

    info!("Starting rrsetd daemon");
    info!("Store type: {}", config.store_type);

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return RrsetExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        if let Err(e) = run_daemon(config).await {
            error!("Daemon error: {:#}", e);
            RrsetExitCode::RuntimeError
        } else {
            RrsetExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Run the daemon until input ends or a shutdown signal arrives
async fn run_daemon(config: Config) -> Result<()> {
    let service_config = config.service_config();

    let store = open_store(&service_config.store)
        .await
        .context("Failed to open store")?;
    let (reconciler, changes) = Reconciler::new(store.clone(), service_config.engine.clone())?;
    let service = Service::new(Arc::new(reconciler));

    let worker = SyncWorker::new(
        changes,
        Arc::new(TracingZoneSync),
        store.clone(),
        &service_config.engine,
    );
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let worker_handle = tokio::spawn(worker.run_with_shutdown(Some(shutdown_rx)));

    info!("Ready to serve requests");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    let shutdown = wait_for_shutdown();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read request")? else {
                    info!("Input closed");
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }

                let response = service.handle_line(&line).await;
                let mut out = serde_json::to_vec(&response)?;
                out.push(b'\n');
                stdout.write_all(&out).await?;
                stdout.flush().await?;
            }

            signal = &mut shutdown => {
                info!("Received shutdown signal: {}", signal?);
                break;
            }
        }
    }

    info!("Shutting down daemon");
    drop(service);
    let _ = shutdown_tx.send(());
    worker_handle
        .await
        .context("Sync worker panicked")?
        .context("Sync worker failed")?;
    store.flush().await.context("Failed to flush store")?;
    info!("Store flushed, daemon stopped");

    Ok(())
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
///
/// # Returns
///
/// Returns the name of the signal received.
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
