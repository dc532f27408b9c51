//! HTTP server wiring for wellspringd.
//!
//! Builds the collaborator set from configuration (every backend is chosen
//! here, once, at startup) and serves the API with graceful shutdown.

use crate::config::Config;
use crate::crawl::{FetchMode, HttpFetcher, PageFetcher};
use crate::generate::{AnswerGenerator, LlmAnswerGenerator};
use crate::llm::build_model;
use crate::planner::{LlmQueryPlanner, QueryPlanner};
use crate::reranker::{LlmReranker, Reranker};
use crate::routes;
use crate::search::{SearchBackend, SearxClient};
use crate::session::SessionRegistry;
use anyhow::{bail, Result};
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Application state shared across handlers and pipeline workers.
pub struct AppState {
    pub registry: SessionRegistry,
    /// Each sub-query picks one endpoint uniformly at random.
    pub search_endpoints: Vec<String>,
    pub planner: Arc<dyn QueryPlanner>,
    pub searcher: Arc<dyn SearchBackend>,
    pub reranker: Arc<dyn Reranker>,
    pub fetcher: Arc<dyn PageFetcher>,
    pub generator: Arc<dyn AnswerGenerator>,
}

/// Build the full collaborator set from configuration.
pub fn build_state(config: &Config) -> Result<AppState> {
    if config.search.endpoints.is_empty() {
        bail!("no search endpoints configured ([search].endpoints)");
    }

    let planner_model = build_model(&config.llm, &config.llm.planner)?;
    let reranker_model = build_model(&config.llm, &config.llm.reranker)?;
    let generator_model = build_model(&config.llm, &config.llm.generator)?;

    let fetcher = build_fetcher(
        config.crawler.mode,
        Duration::from_secs(config.crawler.request_timeout_secs),
    )?;

    Ok(AppState {
        registry: SessionRegistry::new(),
        search_endpoints: config.search.endpoints.clone(),
        planner: Arc::new(LlmQueryPlanner::new(planner_model)),
        searcher: Arc::new(SearxClient::new(
            config.search.engines.clone(),
            Duration::from_secs(config.search.request_timeout_secs),
        )?),
        reranker: Arc::new(LlmReranker::new(reranker_model)),
        fetcher,
        generator: Arc::new(LlmAnswerGenerator::new(generator_model)),
    })
}

fn build_fetcher(mode: FetchMode, timeout: Duration) -> Result<Arc<dyn PageFetcher>> {
    match mode {
        FetchMode::Http => Ok(Arc::new(HttpFetcher::new(timeout)?)),
        FetchMode::Rendered | FetchMode::RenderedImages => {
            bail!(
                "crawler mode {:?} requires an external browser renderer; \
                 set [crawler].mode = \"http\"",
                mode
            )
        }
    }
}

/// Run the HTTP server until ctrl-c.
pub async fn run(state: AppState, bind_addr: &str) -> Result<()> {
    let state = Arc::new(state);

    let app = Router::new()
        .merge(routes::api_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!("Listening on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await?;

    Ok(())
}
