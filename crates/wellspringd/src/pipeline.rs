//! The per-session pipeline worker.
//!
//! `run_session` drives one session from query plan to streamed answer:
//! plan, fan out search+rerank per sub-query, deduplicate URLs, fan out
//! crawls, number the sources, then stream the generated answer. Sub-query
//! and crawl failures are absorbed; only planning and generation failures
//! end the session early. The session is always closed on exit.

use crate::distill;
use crate::generate::{GenerateRequest, SourceDocument};
use crate::server::AppState;
use crate::session::Session;
use rand::seq::SliceRandom;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use wellspring_common::{Event, SearchResult, SubQuery};

/// Worker entry point; spawned once per session. Owns the session until it
/// closes it, on every exit path.
pub async fn run_session(state: Arc<AppState>, session: Arc<Session>) {
    drive(&state, &session).await;
    state.registry.close(&session.id).await;
}

async fn drive(state: &Arc<AppState>, session: &Arc<Session>) {
    // Stage 1: plan. Fatal on failure - nothing can proceed without a plan.
    let plan = match state.planner.plan(&session.query).await {
        Ok(plan) => plan,
        Err(e) => {
            error!(session = %session.id, error = %e, "failed to generate query plan");
            session
                .publish(Event::Error {
                    message: "failed to generate query plan".to_string(),
                })
                .await;
            return;
        }
    };

    info!(
        session = %session.id,
        query = %session.query,
        sub_queries = plan.search_queries.len(),
        "query plan ready"
    );

    {
        let slots = plan.search_queries.len();
        *session.plan.write().await = Some(plan.clone());
        *session.results.lock().await = vec![Vec::new(); slots];
        *session.reranked.lock().await = vec![Vec::new(); slots];
    }
    session
        .publish(Event::QueryPlanReady { plan: plan.clone() })
        .await;

    // Stage 2: search + rerank, one task per sub-query. Failures are
    // per-index; the join barrier waits for every task either way.
    let mut tasks = JoinSet::new();
    for (index, sub_query) in plan.search_queries.iter().cloned().enumerate() {
        let state = state.clone();
        let session = session.clone();
        tasks.spawn(async move {
            let success = run_sub_query(&state, &session, index, &sub_query).await;
            session.publish(Event::SubQueryDone { index, success }).await;
        });
    }
    while tasks.join_next().await.is_some() {}

    // Stage 3: deduplicate URLs across all reranked lists.
    let unique_urls: HashSet<String> = session
        .reranked
        .lock()
        .await
        .iter()
        .flatten()
        .map(|result| result.url.clone())
        .collect();

    // Stage 4: crawl every unique URL concurrently. A failed URL simply
    // contributes no source.
    let mut tasks = JoinSet::new();
    for url in unique_urls {
        let state = state.clone();
        let session = session.clone();
        tasks.spawn(async move {
            match state.fetcher.fetch(&url).await {
                Ok(raw) => {
                    let text = distill::clean(&raw);
                    session.pages.lock().await.insert(url.clone(), text);
                    session.publish(Event::PageFetched { url }).await;
                }
                Err(e) => {
                    warn!(url = %url, error = %e, "failed to crawl page");
                }
            }
        });
    }
    while tasks.join_next().await.is_some() {}

    // Stage 5: number the sources 1..n and hand the mapping to the client
    // for citation resolution.
    let (sources, documents) = {
        let pages = session.pages.lock().await;
        let mut sources = BTreeMap::new();
        let mut documents = Vec::with_capacity(pages.len());
        for (number, (url, content)) in pages.iter().enumerate() {
            let number = number + 1;
            sources.insert(number.to_string(), url.clone());
            documents.push(SourceDocument {
                number,
                url: url.clone(),
                content: content.clone(),
            });
        }
        (sources, documents)
    };
    session.publish(Event::SourceMapReady { sources }).await;

    // Stage 6: stream the answer. Chunks are forwarded as they arrive.
    let request = GenerateRequest {
        query: session.query.clone(),
        instruction: plan.instruction.clone(),
        documents,
    };
    let mut chunks = match state.generator.generate(request).await {
        Ok(chunks) => chunks,
        Err(e) => {
            error!(session = %session.id, error = %e, "failed to start answer generation");
            fail_generation(session).await;
            return;
        }
    };

    let started = Instant::now();
    let mut first_chunk_ms = None;
    while let Some(chunk) = chunks.recv().await {
        match chunk {
            Ok(text) => {
                if first_chunk_ms.is_none() {
                    first_chunk_ms = Some(started.elapsed().as_millis());
                }
                session.publish(Event::AnswerChunk { text }).await;
            }
            Err(e) => {
                error!(session = %session.id, error = %e, "answer stream failed");
                fail_generation(session).await;
                return;
            }
        }
    }

    info!(
        session = %session.id,
        first_chunk_ms = first_chunk_ms.unwrap_or(0),
        total_ms = started.elapsed().as_millis(),
        "answer stream complete"
    );
    session.publish(Event::AnswerDone).await;
}

/// Visible in-band marker first, then the error event, so a client that
/// only renders answer text still shows something went wrong.
async fn fail_generation(session: &Arc<Session>) {
    session
        .publish(Event::AnswerChunk {
            text: "\n\n\n\n\nError: failed to generate a response, please try again later\n\n\n\n\n"
                .to_string(),
        })
        .await;
    session
        .publish(Event::Error {
            message: "failed to generate response".to_string(),
        })
        .await;
}

/// One sub-query: search a random endpoint, rerank, store the reranked
/// slice. Returns the success flag for this index.
async fn run_sub_query(
    state: &Arc<AppState>,
    session: &Arc<Session>,
    index: usize,
    sub_query: &SubQuery,
) -> bool {
    let endpoint = match state.search_endpoints.choose(&mut rand::thread_rng()) {
        Some(endpoint) => endpoint.clone(),
        None => {
            warn!(session = %session.id, "no search endpoints configured");
            return false;
        }
    };

    info!(endpoint = %endpoint, query = %sub_query.query, "searching");
    let results = match state.searcher.search(&endpoint, &sub_query.query).await {
        Ok(results) => results,
        Err(e) => {
            warn!(index, error = %e, "search failed");
            return false;
        }
    };

    let summaries: Vec<String> = results
        .iter()
        .map(|result| {
            serde_json::json!({
                "url": result.url,
                "title": result.title,
                "snippet": result.content,
            })
            .to_string()
        })
        .collect();
    session.results.lock().await[index] = results.clone();

    let goal = format!("{}\n\n{}", sub_query.query, sub_query.description);
    let ordering = match state.reranker.rerank(&goal, &summaries).await {
        Ok(ordering) => ordering,
        Err(e) => {
            warn!(index, error = %e, "rerank failed");
            return false;
        }
    };
    // The trait contract says in-range and duplicate-free, but the ordering
    // decides what we crawl, so re-check it at the seam.
    let raw: Vec<i64> = ordering.iter().map(|&i| i as i64).collect();
    let ordering = match crate::reranker::validate_ordering(&raw, results.len()) {
        Ok(ordering) => ordering,
        Err(e) => {
            warn!(index, error = %e, "invalid rerank ordering");
            return false;
        }
    };

    let reranked: Vec<SearchResult> = ordering.iter().map(|&i| results[i].clone()).collect();
    session.reranked.lock().await[index] = reranked;
    true
}
