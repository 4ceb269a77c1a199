//! Authgate - authenticating front door
//!
//! Wires the configuration store, domain registry, proxy resolver and
//! pipeline together and serves them over HTTP. Send SIGHUP to re-read the
//! configuration store.

use authgate::auth::session::InMemorySessionStore;
use authgate::config::Config;
use authgate::domain::{AuthTypeRegistry, AuthenticationDomainRegistry};
use authgate::pipeline::AuthPipeline;
use authgate::repository::{ConfigurationRepository, FileStore, Settings, CONFIG_TYPE};
use authgate::server::{AppState, AuthServer};
use authgate::xff::XffResolver;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Until the first chain is published, retry loading at this interval
const STARTUP_RETRY: Duration = Duration::from_secs(5);

/// Authgate - dynamically reconfigurable authentication chain
#[derive(Parser, Debug)]
#[command(name = "authgate")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "authgate.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting Authgate v{}", authgate::VERSION);

    let config = Config::load(&args.config)?;
    info!("Loaded configuration from {:?}", args.config);

    let store = Arc::new(FileStore::new(&config.store.path));
    let repository = Arc::new(ConfigurationRepository::new(store));

    let registry = Arc::new(AuthenticationDomainRegistry::new(
        AuthTypeRegistry::with_builtins(Arc::clone(&repository)),
    ));
    let xff = Arc::new(XffResolver::new());
    repository.subscribe(CONFIG_TYPE, registry.clone());
    repository.subscribe(CONFIG_TYPE, xff.clone());

    let mut pipeline = AuthPipeline::new(Arc::clone(&registry));
    if config.sessions.enabled {
        let sessions = Arc::new(InMemorySessionStore::new(Duration::from_secs(
            config.sessions.ttl_secs,
        )));
        spawn_session_purge(Arc::clone(&sessions), config.sessions.ttl_secs);
        pipeline = pipeline.with_sessions(sessions);
    }

    spawn_reloader(Arc::clone(&repository), Arc::clone(&registry));

    let state = AppState::new(Arc::new(pipeline), xff).with_metrics(config.metrics.enabled);
    let server = AuthServer::bind(&config.server.address, state).await?;

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => info!("Shutting down server"),
    }

    Ok(())
}

/// Load the configuration in the background: retry until the first chain is
/// published, then reload on every SIGHUP.
fn spawn_reloader(
    repository: Arc<ConfigurationRepository>,
    registry: Arc<AuthenticationDomainRegistry>,
) {
    tokio::spawn(async move {
        while !registry.is_initialized() {
            match repository.reload_subscribed().await {
                Ok(loaded) if loaded.contains_key(CONFIG_TYPE) => {
                    if registry.is_initialized() {
                        break;
                    }
                    error!("Configuration loaded but no authentication chain could be built");
                }
                Ok(_) if repository.is_ready() => {
                    warn!("No '{}' document in the store; using the default domain", CONFIG_TYPE);
                    if let Err(e) = registry.rebuild(&Settings::empty()) {
                        error!(error = %e, "Failed to build the default authentication chain");
                    }
                }
                Ok(_) => warn!("Configuration store not ready; retrying"),
                Err(e) => error!(error = %e, "Failed to load configuration"),
            }
            if !registry.is_initialized() {
                tokio::time::sleep(STARTUP_RETRY).await;
            }
        }

        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            let mut hangup = match signal(SignalKind::hangup()) {
                Ok(stream) => stream,
                Err(e) => {
                    error!(error = %e, "Cannot listen for SIGHUP; reload disabled");
                    return;
                }
            };

            while hangup.recv().await.is_some() {
                info!("SIGHUP received; reloading configuration");
                if let Err(e) = repository.reload_subscribed().await {
                    error!(error = %e, "Configuration reload failed");
                }
            }
        }
    });
}

fn spawn_session_purge(sessions: Arc<InMemorySessionStore>, ttl_secs: u64) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(ttl_secs.max(1)));
        loop {
            interval.tick().await;
            let purged = sessions.purge_expired();
            if purged > 0 {
                info!(purged, "Expired sessions purged");
            }
        }
    });
}
