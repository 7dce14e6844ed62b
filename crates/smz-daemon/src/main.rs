//! Daemon binary.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use smz_cache::{MediaCache, MediaCacheConfig, MetaStore, MetaStoreConfig};
use smz_core::{FileConfig, Paths, RunOptions, RunServices, RuntimeContext};
use smz_daemon::{create_router, AppState, DaemonFile, RunRegistry};
use smz_llm::{ModelRegistry, RegistryConfig};
use smz_media::ToolPaths;
use smz_models::PricingTable;
use smz_slides::DirLocks;
use uuid::Uuid;

const DEFAULT_PORT: u16 = 8765;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::from_default_env().add_directive("smz=info".parse().expect("valid directive")),
        )
        .init();

    if let Err(e) = serve().await {
        error!(error = %e, "Daemon failed to start");
        std::process::exit(1);
    }
}

async fn serve() -> Result<(), Box<dyn std::error::Error>> {
    let ctx = RuntimeContext::from_process();
    let paths = Paths::new(&ctx);
    let config = FileConfig::load(&paths.config_file())?;

    let port = ctx
        .env("SUMMARIZE_DAEMON_PORT")
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_PORT);

    // Reuse the installed token when present; otherwise mint one.
    let daemon_path = paths.daemon_file();
    let daemon_file = match DaemonFile::load(&daemon_path) {
        Some(existing) if existing.port == port => existing,
        _ => {
            let fresh = DaemonFile {
                port,
                token: Uuid::new_v4().to_string(),
                installed_at_ms: ctx.now_ms(),
            };
            fresh.store(&daemon_path)?;
            fresh
        }
    };

    let meta = if config.cache.enabled {
        let store = MetaStore::open(&MetaStoreConfig {
            path: paths.cache_db(&config.cache),
            max_bytes: config.cache.max_mb * 1024 * 1024,
            ttl_ms: config.cache.ttl_days as i64 * 24 * 3600 * 1000,
        })?;
        Some(Arc::new(store))
    } else {
        None
    };

    let media = if config.cache.media.enabled {
        let cache = MediaCache::open(MediaCacheConfig {
            dir: paths.media_dir(&config.cache.media),
            max_bytes: config.cache.media.max_mb * 1024 * 1024,
            ttl_ms: Some(config.cache.media.ttl_days as i64 * 24 * 3600 * 1000),
            verify: config.cache.media.verify,
        })
        .await?;
        Some(Arc::new(cache))
    } else {
        None
    };

    let registry = ModelRegistry::new(
        RegistryConfig {
            presets: config.models.clone(),
            default_selector: config.model.clone(),
            cli_openai_base_url: None,
            cli_anthropic_base_url: None,
            config_openai_base_url: config.openai.base_url.clone(),
            config_anthropic_base_url: config.anthropic.base_url.clone(),
            config_openai_use_chat_completions: config.openai.use_chat_completions,
        },
        ctx.env_fn(),
    );

    let services = RunServices {
        registry: Arc::new(registry),
        meta,
        media,
        tools: ToolPaths::resolve({
            let ctx = ctx.clone();
            move |name| ctx.env(name)
        }),
        locks: Arc::new(DirLocks::new()),
        pricing: Arc::new(PricingTable::builtin()),
    };

    let base_options = RunOptions {
        language: config.language.clone(),
        ..RunOptions::default()
    };

    let version = ctx
        .env("SUMMARIZE_VERSION")
        .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string());

    let state = AppState {
        ctx,
        services,
        base_options,
        token: daemon_file.token.clone(),
        runs: Arc::new(RunRegistry::new()),
        slides_root: paths.slides_dir(),
        version,
    };

    let app = create_router(state);
    let addr: SocketAddr = ([127, 0, 0, 1], port).into();
    info!(%addr, "summarized listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Daemon shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install CTRL+C handler");
    info!("Received shutdown signal");
}
