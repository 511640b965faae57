//! # Tillpoint Register
//!
//! Headless register process: one device, one local database, one backend.
//!
//! ## Startup Sequence
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Register Startup                                  │
//! │                                                                         │
//! │  1. Initialize Logging                                                 │
//! │     • tracing-subscriber with env filter, RUST_LOG overrides           │
//! │                                                                         │
//! │  2. Load Configuration                                                 │
//! │     • register.toml + TILL_* environment, validated                    │
//! │     • first run writes the file so the device ID sticks                │
//! │                                                                         │
//! │  3. Open Local Store                                                   │
//! │     • TILL_DB_PATH or <data dir>/till.db, WAL, migrations              │
//! │                                                                         │
//! │  4. Start Background Tasks                                             │
//! │     • ConnectivityProbe → ConnectivityMonitor                          │
//! │     • SyncAgent replays the queue on reconnect                         │
//! │                                                                         │
//! │  5. Scan Loop                                                          │
//! │     • terminal: raw keys feed the scanner, typed lines are manual      │
//! │     • piped stdin: every line is a manual scan                         │
//! │     • `:status` prints sync state; runs until Ctrl+C / SIGTERM         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod keys;

pub use keys::{translate, InputEvent, KeyAction, KeyInput, RawModeWriter, TerminalReader};

use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use till_client::{
    ApiClient, BarcodeScanner, ClientConfig, ConnectivityMonitor, ConnectivityProbe,
    KeyboardEvents, OfflineQueue, ResponseCache, ScanEvent, SyncAgent, SyncAgentHandle,
};
use till_core::Product;
use till_db::{Database, DbConfig, KeyValueStore};

/// Typed at the prompt to print the sync state instead of scanning.
const STATUS_COMMAND: &str = ":status";

/// Runs the register until a shutdown signal arrives.
pub async fn run() -> anyhow::Result<()> {
    let interactive = std::io::stdin().is_terminal();
    init_tracing(interactive);

    info!("Starting Tillpoint register");

    let config = load_config()?;
    info!(
        device_id = %config.device_id(),
        device_name = %config.device.name,
        api = %config.api.base_url,
        "Configuration loaded"
    );

    let db_path = database_path()?;
    info!(?db_path, "Database path determined");
    let database = Database::new(DbConfig::new(db_path))
        .await
        .context("Failed to open the local database")?;
    let store: Arc<dyn KeyValueStore> = Arc::new(database.store());

    let monitor = ConnectivityMonitor::default();
    let probe = ConnectivityProbe::new(&config, monitor.clone())?.spawn();

    let cache = ResponseCache::new(store.clone(), monitor.clone());
    let queue = OfflineQueue::new(store)
        .with_requeue_on_connectivity_error(config.offline.requeue_on_connectivity_error);
    let client = ApiClient::new(&config, monitor.clone(), cache, queue.clone())?;

    let agent = SyncAgent::new(monitor, queue, Arc::new(client.clone())).start();

    let keyboard = KeyboardEvents::default();
    let (scanner, mut scans) = BarcodeScanner::new(keyboard.clone(), config.scan_config());
    let session = scanner.activate();

    let (input_tx, mut input) = mpsc::channel(16);
    let reader = if interactive {
        let keys = KeyInput::new(keyboard, config.scan_config());
        Some(TerminalReader::spawn(keys, input_tx))
    } else {
        tokio::spawn(read_lines(input_tx));
        None
    };

    info!("Register ready, type or scan a barcode");

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            Some(scan) = scans.recv() => report_scan(&client, &scan).await,

            Some(event) = input.recv() => match event {
                InputEvent::Line(line) if line.trim() == STATUS_COMMAND => report_status(&agent).await,
                InputEvent::Line(line) => {
                    scanner.submit_manual(&line).await;
                }
                InputEvent::Interrupt => {
                    info!("Interrupted from the keyboard");
                    break;
                }
            },

            _ = &mut shutdown => break,
        }
    }

    if let Some(reader) = reader {
        reader.stop().await;
    }
    session.stop().await;
    agent.shutdown().await?;
    probe.shutdown().await?;
    database.close().await;

    info!("Register stopped");
    Ok(())
}

/// Forwards piped stdin, one manual entry per line.
async fn read_lines(events: mpsc::Sender<InputEvent>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if events.send(InputEvent::Line(line)).await.is_err() {
                    break;
                }
            }
            Ok(None) => {
                info!("Input closed, waiting for shutdown signal");
                break;
            }
            Err(e) => {
                warn!(error = %e, "Failed to read input, ignoring stdin from now on");
                break;
            }
        }
    }
}

/// What a scanned barcode resolved to.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanLookup {
    Found(Product),
    NotFound,
    /// Neither the backend nor the cache could answer.
    Unavailable(String),
}

/// Resolves a barcode against the catalog (cached when offline).
pub async fn lookup_scan(client: &ApiClient, barcode: &str) -> ScanLookup {
    match client.find_product_by_barcode(barcode).await {
        Ok(Some(product)) => ScanLookup::Found(product),
        Ok(None) => ScanLookup::NotFound,
        Err(e) => ScanLookup::Unavailable(e.to_string()),
    }
}

async fn report_scan(client: &ApiClient, scan: &ScanEvent) {
    match lookup_scan(client, &scan.barcode).await {
        ScanLookup::Found(product) => {
            info!(
                barcode = %scan.barcode,
                source = ?scan.source,
                name = %product.name,
                price = product.price,
                stock = product.stock,
                "Product scanned"
            );
            if !product.can_sell(1) {
                warn!(name = %product.name, "Out of stock");
            } else if product.is_low_stock() {
                warn!(name = %product.name, stock = product.stock, "Low stock");
            }
        }
        ScanLookup::NotFound => {
            warn!(barcode = %scan.barcode, source = ?scan.source, "No product with this barcode")
        }
        ScanLookup::Unavailable(reason) => {
            error!(barcode = %scan.barcode, %reason, "Catalog unavailable")
        }
    }
}

async fn report_status(agent: &SyncAgentHandle) {
    let status = agent.status().await;
    info!(
        online = status.is_online,
        pending = status.pending_count,
        last_replay_at = ?status.last_replay_at,
        last_report = ?status.last_report,
        "Sync status"
    );
}

/// Initializes the tracing subscriber.
///
/// `RUST_LOG` overrides the default filter. On a terminal the log lines end
/// in `\r\n` to stay readable in raw mode.
fn init_tracing(interactive: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,till=debug,sqlx=warn"));

    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if interactive {
        subscriber.with_writer(|| RawModeWriter).init();
    } else {
        subscriber.init();
    }
}

/// Loads the config, writing it out on first run so the generated device
/// ID survives restarts.
fn load_config() -> anyhow::Result<ClientConfig> {
    let config = ClientConfig::load(None).context("Failed to load register configuration")?;

    if let Some(path) = ClientConfig::default_config_path() {
        if !path.exists() {
            match config.save(Some(path.clone())) {
                Ok(()) => info!(?path, "Wrote initial configuration"),
                Err(e) => warn!(?path, error = %e, "Could not write initial configuration"),
            }
        }
    }

    Ok(config)
}

/// Determines the database file path.
///
/// `TILL_DB_PATH` wins; otherwise `till.db` in the platform data directory.
fn database_path() -> anyhow::Result<PathBuf> {
    if let Ok(path) = std::env::var("TILL_DB_PATH") {
        return Ok(PathBuf::from(path));
    }

    let proj_dirs = ClientConfig::project_dirs()
        .context("Could not determine app data directory")?;
    let data_dir = proj_dirs.data_dir();
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("Could not create {}", data_dir.display()))?;

    Ok(data_dir.join("till.db"))
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use till_db::MemoryStore;

    fn offline_client() -> ApiClient {
        // Nothing listens on a port we just released
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut config = ClientConfig::default();
        config.api.base_url = format!("http://{addr}");

        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let monitor = ConnectivityMonitor::new(false);
        ApiClient::new(
            &config,
            monitor.clone(),
            ResponseCache::new(store.clone(), monitor),
            OfflineQueue::new(store),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_lookup_uses_cached_catalog_offline() {
        let client = offline_client();
        client
            .cache()
            .store(
                till_client::endpoints::PRODUCTS,
                &json!([{
                    "id": "p-7",
                    "name": "Bread",
                    "barcode": "200000000017",
                    "price": 2.1,
                    "stock": 3,
                    "lowStockThreshold": 5,
                    "category": "Bakery",
                    "createdAt": "2026-01-01T00:00:00Z",
                    "updatedAt": "2026-01-01T00:00:00Z"
                }]),
            )
            .await;

        match lookup_scan(&client, "200000000017").await {
            ScanLookup::Found(product) => {
                assert_eq!(product.name, "Bread");
                assert!(product.is_low_stock());
            }
            other => panic!("expected a product, got {other:?}"),
        }
        assert_eq!(lookup_scan(&client, "999").await, ScanLookup::NotFound);
    }

    #[tokio::test]
    async fn test_lookup_without_cache_is_unavailable() {
        let client = offline_client();
        assert!(matches!(
            lookup_scan(&client, "200000000017").await,
            ScanLookup::Unavailable(_)
        ));
    }
}
