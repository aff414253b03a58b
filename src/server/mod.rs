//! HTTP surface: the site API plus server bootstrap.

pub mod api;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::assistant::{AiderAssistant, AssistantPool};
use crate::chat::{ChatService, FileChatStore};
use crate::config::Config;
use crate::llm;
use crate::router::DecisionRouter;
use crate::site::SiteStatusStore;
use crate::workflow::SiteWorkflow;

pub use api::{AppState, SharedState};

pub fn build_router(state: SharedState, cors_permissive: bool) -> Router {
    let app = api::api_router()
        .with_state(state)
        .layer(TraceLayer::new_for_http());
    if cors_permissive {
        app.layer(CorsLayer::permissive())
    } else {
        app
    }
}

/// Wire every component from `config` and serve until Ctrl+C or SIGTERM.
pub async fn start_server(config: Config) -> Result<()> {
    std::fs::create_dir_all(&config.server.data_dir).with_context(|| {
        format!(
            "Failed to create data directory {}",
            config.server.data_dir.display()
        )
    })?;

    let git = config.git.runner();
    let pool = Arc::new(AssistantPool::new());
    let sweeper = pool.spawn_sweeper(
        Duration::from_secs(config.assistant.sweep_interval_secs.max(1)),
        Duration::from_secs(config.assistant.idle_secs),
    );

    let workflow = Arc::new(
        SiteWorkflow::new(git.clone(), config.site_resolver(), config.workflow_settings())
            .with_pool(pool.clone()),
    );

    let llm_client = llm::client_from_config(&config.llm)
        .context("Failed to configure the language model client")?;
    tracing::info!(model = llm_client.model(), "language model client ready");

    let assistant = AiderAssistant::new(
        config.assistant.aider_settings(),
        git,
        &config.sites.undo_marker,
    );

    let chat = ChatService::new(
        workflow.clone(),
        SiteStatusStore::new(),
        Arc::new(FileChatStore::new(&config.server.data_dir)),
        DecisionRouter::new(Arc::new(llm_client), config.llm.history_limit),
        Arc::new(assistant),
        pool.clone(),
        config.llm.max_context_chars,
    );

    let state = Arc::new(AppState { workflow, chat });
    let app = build_router(state, config.server.cors_permissive);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    tracing::info!(
        addr = %local_addr,
        sites_root = %config.sites.root.display(),
        "sitesmith listening"
    );

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error");

    pool.shutdown();
    sweeper.abort();
    tracing::info!("server shut down");
    served
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
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
    tracing::info!("shutdown signal received");
}
