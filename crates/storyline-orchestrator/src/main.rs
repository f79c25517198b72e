use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, warn};

mod app;
mod dispatch;
mod http;
mod phase;
mod pipeline;
mod routing;

use storyline_continuity::ContinuityManager;
use storyline_core::config::StorylineConfig;
use storyline_intent::IntentClassifier;
use storyline_jobs::{HttpContentAgentDispatcher, JobManager, NoopDispatcher};
use storyline_llm::HttpChatProvider;
use storyline_quota::QuotaGate;
use storyline_safety::SafetyModerator;
use storyline_store::{InMemoryKvCache, KvCache, RowStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "storyline_orchestrator=info,tower_http=debug".into()),
        )
        .init();

    let config_path = std::env::var("STORYLINE_CONFIG").ok();
    let config = StorylineConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("config load failed ({e}), using defaults");
        StorylineConfig::default()
    });

    let conn = rusqlite::Connection::open(&config.database.path)?;
    storyline_store::db::init_db(&conn)?;
    let store = Arc::new(RowStore::new(conn));
    let kv: Arc<dyn KvCache> = Arc::new(InMemoryKvCache::new());

    const SESSION_TTL_SECONDS: i64 = 24 * 3600;
    let encryption_keys = encryption_keys(&config);
    let continuity = ContinuityManager::new(
        kv.clone(),
        store.clone(),
        "storyline:ctx",
        encryption_keys,
        config.encryption.active_key_id.clone(),
        SESSION_TTL_SECONDS,
        storyline_core::config::DEFAULT_HISTORY_MAX,
        storyline_core::config::DEVICE_HISTORY_MAX,
        storyline_core::config::DEFAULT_COMPRESS_THRESHOLD_BYTES,
    );

    let classifier_provider = Arc::new(HttpChatProvider::new(
        "classifier",
        config.providers.classifier.base_url.clone(),
        config.providers.classifier.api_key.clone(),
    ));
    let intent_classifier = IntentClassifier::new(classifier_provider, config.providers.classifier.model.clone());

    let moderation_provider = Arc::new(HttpChatProvider::new(
        "moderation",
        config.providers.moderation.base_url.clone(),
        config.providers.moderation.api_key.clone(),
    ));
    let safety = SafetyModerator::new(moderation_provider, config.providers.moderation.model.clone());

    let quota = QuotaGate::new(store.clone(), kv.clone(), "storyline:quota");

    let content_dispatcher: Arc<dyn storyline_jobs::ContentAgentDispatcher> = match &config.agents.content_agent_url {
        Some(url) => Arc::new(HttpContentAgentDispatcher::new(url.clone())),
        None => Arc::new(NoopDispatcher),
    };
    let jobs = JobManager::new(store.clone(), content_dispatcher.clone());

    let sync_dispatcher: Option<Arc<dyn dispatch::SyncAgentDispatcher>> = config
        .agents
        .sync_agent_url
        .as_ref()
        .map(|url| Arc::new(dispatch::HttpSyncAgentDispatcher::new(url.clone())) as Arc<dyn dispatch::SyncAgentDispatcher>);

    let bind = config.server.bind.clone();
    let port = config.server.port;

    let state = Arc::new(app::AppState::new(
        config,
        store.clone(),
        kv.clone(),
        continuity,
        intent_classifier,
        safety,
        quota,
        jobs,
        sync_dispatcher,
    ));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let asset_worker = state.asset_worker(content_dispatcher);
    let worker_shutdown = shutdown_rx.clone();
    let worker_handle = tokio::spawn(async move { asset_worker.run(worker_shutdown).await });

    let sweeper = state.timeout_sweeper();
    let sweeper_shutdown = shutdown_rx.clone();
    let sweeper_handle = tokio::spawn(async move { sweeper.run(sweeper_shutdown).await });

    let router = app::build_router(state.clone());
    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    info!("storyline orchestrator listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    let _ = worker_handle.await;
    let _ = sweeper_handle.await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    warn!("shutdown signal received, draining background loops");
}

/// Decode every configured key so a rotation (old key retired from
/// `active_key_id` but still needed to decrypt existing sessions) doesn't
/// lock anyone out.
fn encryption_keys(config: &StorylineConfig) -> std::collections::HashMap<String, [u8; 32]> {
    let mut keys = std::collections::HashMap::new();
    for key_cfg in &config.encryption.keys {
        let Ok(bytes) = hex::decode(&key_cfg.key_hex) else {
            warn!(key_id = %key_cfg.key_id, "skipping encryption key with invalid hex");
            continue;
        };
        let Ok(key) = bytes.try_into() else {
            warn!(key_id = %key_cfg.key_id, "skipping encryption key with wrong length");
            continue;
        };
        keys.insert(key_cfg.key_id.clone(), key);
    }
    keys
}
