//! Wellspring daemon - answers natural-language queries with live web search.
//!
//! One query becomes one session: a planner decomposes the query into
//! sub-searches, each sub-search is run and reranked concurrently, unique
//! result pages are crawled and distilled, and a grounded answer is streamed
//! back over the session's event bus.

pub mod config;
pub mod crawl;
pub mod distill;
pub mod generate;
pub mod llm;
pub mod pipeline;
pub mod planner;
pub mod reranker;
pub mod routes;
pub mod search;
pub mod server;
pub mod session;
