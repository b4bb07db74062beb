//! Sabre logger binary entrypoint wiring REST, SSE, identity, completion and storage layers.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::{Context, bail};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sabre_logger_back::{
    config::AppConfig,
    dao::{
        match_store::{MatchStore, memory::MemoryMatchStore},
        storage::StorageError,
    },
    routes,
    services::{
        completion::{CompletionClient, OpenAiClient},
        identity::{GoTrueIdentity, IdentityProvider},
        storage_supervisor,
    },
    state::{AppState, SharedState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();

    let identity = GoTrueIdentity::from_env().map(|identity| {
        info!("identity provider configured");
        Arc::new(identity) as Arc<dyn IdentityProvider>
    });
    if identity.is_none() {
        warn!("AUTH_BASE_URL or AUTH_ANON_KEY not set; authenticated routes will answer 503");
    }

    let completion = OpenAiClient::from_env()
        .map(|client| Arc::new(client) as Arc<dyn CompletionClient>);
    if completion.is_none() {
        warn!("OPENAI_API_KEY not set; coaching reports are disabled");
    }

    let app_state = AppState::new(config, identity, completion);
    spawn_storage_supervisor(app_state.clone())?;

    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Start the background task installing the configured match store.
///
/// `STORAGE_BACKEND` selects `mongo`, `couch` or `memory`; the server answers 503 on data
/// routes until the store is connected.
fn spawn_storage_supervisor(state: SharedState) -> anyhow::Result<()> {
    let backend = env::var("STORAGE_BACKEND").unwrap_or_else(|_| default_backend().to_owned());
    info!(backend = %backend, "selecting storage backend");

    match backend.trim().to_ascii_lowercase().as_str() {
        "memory" => {
            warn!("using the in-memory match store; data is lost on restart");
            tokio::spawn(storage_supervisor::run(state, connect_memory));
        }
        #[cfg(feature = "mongo-store")]
        "mongo" => {
            tokio::spawn(storage_supervisor::run(state, connect_mongo));
        }
        #[cfg(feature = "couch-store")]
        "couch" => {
            tokio::spawn(storage_supervisor::run(state, connect_couch));
        }
        other => bail!("unsupported STORAGE_BACKEND `{other}` for this build"),
    }

    Ok(())
}

fn default_backend() -> &'static str {
    if cfg!(feature = "mongo-store") {
        "mongo"
    } else if cfg!(feature = "couch-store") {
        "couch"
    } else {
        "memory"
    }
}

async fn connect_memory() -> Result<Arc<dyn MatchStore>, StorageError> {
    Ok(Arc::new(MemoryMatchStore::new()))
}

#[cfg(feature = "mongo-store")]
async fn connect_mongo() -> Result<Arc<dyn MatchStore>, StorageError> {
    use sabre_logger_back::dao::match_store::mongodb::{MongoConfig, MongoMatchStore};

    let config = MongoConfig::from_env().await?;
    let store = MongoMatchStore::connect(config).await?;
    Ok(Arc::new(store))
}

#[cfg(feature = "couch-store")]
async fn connect_couch() -> Result<Arc<dyn MatchStore>, StorageError> {
    use sabre_logger_back::dao::match_store::couchdb::{CouchConfig, CouchMatchStore};

    let config = CouchConfig::from_env()?;
    let store = CouchMatchStore::connect(config).await?;
    Ok(Arc::new(store))
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler; waiting for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
