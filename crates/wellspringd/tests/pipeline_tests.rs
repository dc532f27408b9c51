//! End-to-end pipeline tests with mock collaborators.
//!
//! Every backend is replaced by a deterministic in-process double, so these
//! exercise the orchestration itself: event ordering, per-sub-query failure
//! isolation, URL deduplication, and terminal behavior.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use wellspring_common::{Event, QueryPlan, SearchResult, SubQuery};
use wellspringd::crawl::{FetchError, PageFetcher};
use wellspringd::generate::{AnswerGenerator, GenerateRequest};
use wellspringd::llm::LlmError;
use wellspringd::pipeline;
use wellspringd::planner::{PlanError, QueryPlanner};
use wellspringd::reranker::{RerankError, Reranker};
use wellspringd::search::{SearchBackend, SearchError};
use wellspringd::server::AppState;
use wellspringd::session::SessionRegistry;

struct StaticPlanner {
    plan: QueryPlan,
}

#[async_trait]
impl QueryPlanner for StaticPlanner {
    async fn plan(&self, _query: &str) -> Result<QueryPlan, PlanError> {
        Ok(self.plan.clone())
    }
}

struct FailingPlanner;

#[async_trait]
impl QueryPlanner for FailingPlanner {
    async fn plan(&self, _query: &str) -> Result<QueryPlan, PlanError> {
        Err(PlanError::MissingPlanBlock)
    }
}

/// Results keyed by sub-query text; queries in `failing` error out.
struct MockSearcher {
    results: HashMap<String, Vec<SearchResult>>,
    failing: HashSet<String>,
}

#[async_trait]
impl SearchBackend for MockSearcher {
    async fn search(
        &self,
        _endpoint: &str,
        query: &str,
    ) -> Result<Vec<SearchResult>, SearchError> {
        if self.failing.contains(query) {
            return Err(SearchError::Status(502));
        }
        self.results
            .get(query)
            .cloned()
            .ok_or(SearchError::NoResults)
    }
}

/// Returns the same ordering for every call, truncated to the candidate
/// count's valid prefix.
struct FixedReranker {
    ordering: Vec<usize>,
}

#[async_trait]
impl Reranker for FixedReranker {
    async fn rerank(&self, _goal: &str, candidates: &[String]) -> Result<Vec<usize>, RerankError> {
        Ok(self
            .ordering
            .iter()
            .copied()
            .filter(|&i| i < candidates.len())
            .collect())
    }
}

/// Serves one page per URL and counts fetches per URL.
struct CountingFetcher {
    total: AtomicUsize,
    per_url: Mutex<HashMap<String, usize>>,
}

impl CountingFetcher {
    fn new() -> Self {
        Self {
            total: AtomicUsize::new(0),
            per_url: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl PageFetcher for CountingFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        self.total.fetch_add(1, Ordering::SeqCst);
        *self.per_url.lock().unwrap().entry(url.to_string()).or_insert(0) += 1;
        Ok(format!("<html><body><p>page at {}</p></body></html>", url))
    }
}

struct ChunkGenerator {
    chunks: Vec<String>,
}

#[async_trait]
impl AnswerGenerator for ChunkGenerator {
    async fn generate(
        &self,
        _request: GenerateRequest,
    ) -> Result<mpsc::Receiver<Result<String, LlmError>>, LlmError> {
        let (tx, rx) = mpsc::channel(8);
        let chunks = self.chunks.clone();
        tokio::spawn(async move {
            for chunk in chunks {
                if tx.send(Ok(chunk)).await.is_err() {
                    return;
                }
            }
        });
        Ok(rx)
    }
}

struct FailingGenerator;

#[async_trait]
impl AnswerGenerator for FailingGenerator {
    async fn generate(
        &self,
        _request: GenerateRequest,
    ) -> Result<mpsc::Receiver<Result<String, LlmError>>, LlmError> {
        Err(LlmError::Status(500))
    }
}

fn result(url: &str, title: &str) -> SearchResult {
    SearchResult {
        title: title.to_string(),
        url: url.to_string(),
        content: format!("snippet for {}", title),
        engines: vec!["duckduckgo".to_string()],
    }
}

fn plan_with(queries: &[(&str, &str)]) -> QueryPlan {
    QueryPlan {
        language: "English".to_string(),
        search_queries: queries
            .iter()
            .map(|(q, d)| SubQuery {
                query: q.to_string(),
                description: d.to_string(),
            })
            .collect(),
        instruction: "Answer concisely.".to_string(),
    }
}

struct Harness {
    state: Arc<AppState>,
    fetcher: Arc<CountingFetcher>,
}

fn harness(
    planner: Arc<dyn QueryPlanner>,
    searcher: MockSearcher,
    ordering: Vec<usize>,
    generator: Arc<dyn AnswerGenerator>,
) -> Harness {
    let fetcher = Arc::new(CountingFetcher::new());
    let state = Arc::new(AppState {
        registry: SessionRegistry::new(),
        search_endpoints: vec!["http://searx.test/search".to_string()],
        planner,
        searcher: Arc::new(searcher),
        reranker: Arc::new(FixedReranker { ordering }),
        fetcher: fetcher.clone(),
        generator,
    });
    Harness { state, fetcher }
}

/// Run the worker to completion, then drain every event. The queue holds
/// far more than any scenario here produces, so the worker never blocks on
/// an unclaimed subscriber.
async fn run_and_collect(harness: &Harness, query: &str) -> Vec<Event> {
    let session = harness.state.registry.create(query).await;
    let mut rx = session.subscribe().await.unwrap();

    pipeline::run_session(harness.state.clone(), session).await;

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event.clone());
        if event == Event::SessionClosed {
            break;
        }
    }
    events
}

#[tokio::test]
async fn full_pipeline_happy_path() {
    let mut results = HashMap::new();
    results.insert(
        "rust history".to_string(),
        vec![
            result("http://a.test/0", "zero"),
            result("http://a.test/1", "one"),
            result("http://a.test/2", "two"),
            result("http://a.test/3", "three"),
            result("http://a.test/4", "four"),
        ],
    );
    let h = harness(
        Arc::new(StaticPlanner {
            plan: plan_with(&[("rust history", "origins of the rust language")]),
        }),
        MockSearcher {
            results,
            failing: HashSet::new(),
        },
        vec![2, 0, 4],
        Arc::new(ChunkGenerator {
            chunks: vec!["Rust began ".to_string(), "at Mozilla.§[1]".to_string()],
        }),
    );

    let events = run_and_collect(&h, "when was rust created").await;

    assert!(matches!(events[0], Event::QueryPlanReady { .. }));
    assert!(events.contains(&Event::SubQueryDone {
        index: 0,
        success: true
    }));

    let fetched: HashSet<&str> = events
        .iter()
        .filter_map(|e| match e {
            Event::PageFetched { url } => Some(url.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(
        fetched,
        ["http://a.test/2", "http://a.test/0", "http://a.test/4"]
            .into_iter()
            .collect()
    );

    let sources = events
        .iter()
        .find_map(|e| match e {
            Event::SourceMapReady { sources } => Some(sources.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(sources.len(), 3);
    assert!(sources.contains_key("1") && sources.contains_key("3"));

    let answer: String = events
        .iter()
        .filter_map(|e| match e {
            Event::AnswerChunk { text } => Some(text.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(answer, "Rust began at Mozilla.§[1]");
    assert!(events.contains(&Event::AnswerDone));
    assert_eq!(events.last(), Some(&Event::SessionClosed));
}

#[tokio::test]
async fn failed_sub_query_does_not_stop_the_session() {
    let mut results = HashMap::new();
    results.insert(
        "good query".to_string(),
        vec![result("http://b.test/x", "x")],
    );
    let h = harness(
        Arc::new(StaticPlanner {
            plan: plan_with(&[("good query", "works"), ("bad query", "times out")]),
        }),
        MockSearcher {
            results,
            failing: ["bad query".to_string()].into_iter().collect(),
        },
        vec![0],
        Arc::new(ChunkGenerator {
            chunks: vec!["answer".to_string()],
        }),
    );

    let events = run_and_collect(&h, "mixed outcome").await;

    assert!(events.contains(&Event::SubQueryDone {
        index: 0,
        success: true
    }));
    assert!(events.contains(&Event::SubQueryDone {
        index: 1,
        success: false
    }));
    // the surviving sub-query still feeds crawl and generation
    assert!(events.contains(&Event::PageFetched {
        url: "http://b.test/x".to_string()
    }));
    assert!(events.contains(&Event::AnswerDone));
    assert_eq!(events.last(), Some(&Event::SessionClosed));
}

#[tokio::test]
async fn shared_urls_are_fetched_once() {
    let mut results = HashMap::new();
    results.insert(
        "query one".to_string(),
        vec![
            result("http://shared.test/page", "shared"),
            result("http://c.test/only-one", "one"),
        ],
    );
    results.insert(
        "query two".to_string(),
        vec![
            result("http://shared.test/page", "shared"),
            result("http://c.test/only-two", "two"),
        ],
    );
    let h = harness(
        Arc::new(StaticPlanner {
            plan: plan_with(&[("query one", "first angle"), ("query two", "second angle")]),
        }),
        MockSearcher {
            results,
            failing: HashSet::new(),
        },
        vec![0, 1],
        Arc::new(ChunkGenerator {
            chunks: vec!["answer".to_string()],
        }),
    );

    let events = run_and_collect(&h, "overlapping sources").await;

    assert_eq!(h.fetcher.total.load(Ordering::SeqCst), 3);
    assert_eq!(
        h.fetcher.per_url.lock().unwrap()["http://shared.test/page"],
        1
    );
    let fetched = events
        .iter()
        .filter(|e| matches!(e, Event::PageFetched { .. }))
        .count();
    assert_eq!(fetched, 3);
}

#[tokio::test]
async fn planner_failure_ends_the_session_with_an_error() {
    let h = harness(
        Arc::new(FailingPlanner),
        MockSearcher {
            results: HashMap::new(),
            failing: HashSet::new(),
        },
        vec![0],
        Arc::new(ChunkGenerator { chunks: vec![] }),
    );

    let events = run_and_collect(&h, "doomed").await;

    assert!(matches!(events[0], Event::Error { .. }));
    assert_eq!(events.last(), Some(&Event::SessionClosed));
    assert!(!events.iter().any(|e| matches!(e, Event::QueryPlanReady { .. })));
    assert_eq!(h.fetcher.total.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn generator_failure_emits_visible_marker_then_error() {
    let mut results = HashMap::new();
    results.insert(
        "some query".to_string(),
        vec![result("http://d.test/p", "p")],
    );
    let h = harness(
        Arc::new(StaticPlanner {
            plan: plan_with(&[("some query", "desc")]),
        }),
        MockSearcher {
            results,
            failing: HashSet::new(),
        },
        vec![0],
        Arc::new(FailingGenerator),
    );

    let events = run_and_collect(&h, "no answer").await;

    let marker = events.iter().position(|e| {
        matches!(e, Event::AnswerChunk { text } if text.contains("Error: failed to generate"))
    });
    let error = events
        .iter()
        .position(|e| matches!(e, Event::Error { .. }));
    assert!(marker.is_some() && error.is_some());
    assert!(marker.unwrap() < error.unwrap());
    assert!(!events.contains(&Event::AnswerDone));
    assert_eq!(events.last(), Some(&Event::SessionClosed));
}
