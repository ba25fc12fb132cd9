//! Portico -- session-aware page shell with role-gated access.
//!
//! This is the application entry point. It wires together all modules:
//!   - Configuration loading
//!   - Session storage backend selection
//!   - Session store restore (cached identity, loading phase)
//!   - Identity bridge + provider event loop
//!   - HTTP server (page shell + form flows)
//!   - Graceful shutdown on SIGTERM / SIGINT

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use portico::AppState;
use portico::bridge::IdentityBridge;
use portico::bridge::backend::BackendClient;
use portico::bridge::provider::{IdentityProvider, NullProvider};
use portico::config::{Config, ProviderMode, StorageBackend};
use portico::session::SessionStore;
use portico::session::identity::AdminAllowlist;
use portico::session::storage::{FileSessionStorage, MemorySessionStorage, SessionStorage};
use portico::shell;

// ---------------------------------------------------------------------------
// CLI argument parsing (minimal, no clap dependency)
// ---------------------------------------------------------------------------

struct CliArgs {
    config_path: PathBuf,
}

fn parse_args() -> CliArgs {
    let mut args = std::env::args().skip(1);
    let mut config_path = PathBuf::from("portico.toml");

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                if let Some(path) = args.next() {
                    config_path = PathBuf::from(path);
                } else {
                    eprintln!("Error: --config requires a path argument");
                    std::process::exit(1);
                }
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("portico {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {other}");
                eprintln!("Run with --help for usage information.");
                std::process::exit(1);
            }
        }
    }

    CliArgs { config_path }
}

fn print_usage() {
    println!(
        "\
portico {version} -- session-aware page shell

USAGE:
    portico [OPTIONS]

OPTIONS:
    -c, --config <PATH>    Path to configuration file [default: portico.toml]
    -h, --help             Print this help message
    -V, --version          Print version information

ENVIRONMENT:
    RUST_LOG               Override log level (e.g. RUST_LOG=debug)
    PORTICO_CONFIG         Alternative to --config flag
",
        version = env!("CARGO_PKG_VERSION")
    );
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Parse CLI arguments
    let cli = parse_args();

    // Allow PORTICO_CONFIG env var as alternative to --config flag
    let config_path = std::env::var("PORTICO_CONFIG")
        .map(PathBuf::from)
        .unwrap_or(cli.config_path);

    // 2. Load configuration
    let config = Config::load(&config_path)?;

    // 3. Initialize tracing/logging
    init_tracing(&config);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path.display(),
        "Starting portico"
    );

    // 4. Select the session storage backend
    let storage = build_session_storage(&config);
    tracing::info!(backend = storage.name(), "Session storage selected");

    // 5. Restore the session store (synchronous cache read; the session
    //    stays in the loading phase until the bridge resolves it)
    let allowlist = AdminAllowlist::new(config.auth.admin_emails.iter().cloned());
    let sessions = Arc::new(SessionStore::new(
        storage,
        allowlist,
        &config.auth.default_avatar,
    ));

    // 6. Wire the identity bridge and spawn its event loop
    let provider = build_provider(&config);
    let backend = BackendClient::new(
        &config.backend.base_url,
        Duration::from_secs(config.backend.timeout_secs),
    );
    let bridge = Arc::new(IdentityBridge::new(
        sessions.clone(),
        provider,
        backend,
    ));
    tokio::spawn(bridge.clone().run());

    if config.auth.admin_emails.is_empty() {
        tracing::warn!("No admin emails configured -- admin pages are unreachable");
    }

    // 7. Build shared application state
    let state = AppState {
        config: Arc::new(config.clone()),
        sessions,
        bridge,
    };

    // 8. Build the router
    let app = build_app(state);

    // 9. Bind and serve
    let listen_addr = config.listen_addr();
    let listener = TcpListener::bind(&listen_addr).await?;
    tracing::info!(addr = %listen_addr, "Listening");

    println!();
    println!("  portico v{} is running", env!("CARGO_PKG_VERSION"));
    println!("  Shell: http://{listen_addr}/");
    println!("  Login: http://{listen_addr}/login");
    println!();

    // 10. Serve with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down gracefully");
    Ok(())
}

// ---------------------------------------------------------------------------
// Component builders
// ---------------------------------------------------------------------------

/// Pick the session storage backend from config.
///
/// The keyring backend falls back to file storage when the crate was built
/// without the `system-keyring` feature.
fn build_session_storage(config: &Config) -> Arc<dyn SessionStorage> {
    match config.session.storage_backend {
        StorageBackend::Memory => Arc::new(MemorySessionStorage::new()),
        StorageBackend::File => Arc::new(FileSessionStorage::new(&config.session.dir)),
        StorageBackend::Keyring => {
            #[cfg(feature = "system-keyring")]
            let storage: Arc<dyn SessionStorage> =
                Arc::new(portico::session::storage::KeyringSessionStorage::new());
            #[cfg(not(feature = "system-keyring"))]
            let storage: Arc<dyn SessionStorage> = {
                tracing::warn!(
                    "Keyring storage requested but the system-keyring feature is disabled, \
                     falling back to file storage"
                );
                Arc::new(FileSessionStorage::new(&config.session.dir))
            };
            storage
        }
    }
}

fn build_provider(config: &Config) -> Arc<dyn IdentityProvider> {
    match config.auth.provider {
        ProviderMode::None => Arc::new(NullProvider::new()),
    }
}

// ---------------------------------------------------------------------------
// Router assembly
// ---------------------------------------------------------------------------

/// Build the application router with all middleware layers.
fn build_app(state: AppState) -> Router {
    let config = state.config.clone();

    // -- CORS layer -----------------------------------------------------------
    let cors = build_cors_layer(&config);

    // -- Request ID layer (X-Request-ID) --------------------------------------
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    // -- Tracing layer --------------------------------------------------------
    let trace = TraceLayer::new_for_http();

    shell::build_router(state)
        .layer(propagate_id)
        .layer(request_id)
        .layer(trace)
        .layer(cors)
}

/// Build the CORS layer from config.
fn build_cors_layer(config: &Config) -> CorsLayer {
    if config.server.cors_origins.is_empty() {
        // Default: allow all origins for development convenience
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = config
            .server
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

// ---------------------------------------------------------------------------
// Tracing initialization
// ---------------------------------------------------------------------------

/// Set up the tracing subscriber based on configuration.
fn init_tracing(config: &Config) {
    // RUST_LOG env var takes precedence over config file
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &config.logging.level;
        EnvFilter::new(format!("portico={level},tower_http={level},warn"))
    });

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if config.logging.json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

// ---------------------------------------------------------------------------
// Graceful shutdown
// ---------------------------------------------------------------------------

/// Wait for a shutdown signal (SIGTERM or SIGINT / Ctrl+C).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl+C)");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
