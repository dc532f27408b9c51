//! Session event stream protocol.
//!
//! Events are emitted by the pipeline worker onto a session's bus and
//! forwarded to the client as newline-delimited JSON, one object per line,
//! each tagged with a `type` discriminator.

use crate::plan::QueryPlan;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One message on a session's event stream.
///
/// Heartbeats are injected by the subscriber loop, not the worker, so they
/// keep flowing while the pipeline is busy inside a collaborator call.
/// `SessionClosed` is the terminal event; nothing follows it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    Heartbeat,
    Error {
        message: String,
    },
    QueryPlanReady {
        plan: QueryPlan,
    },
    /// One sub-query's search + rerank finished. `success: false` means that
    /// sub-query contributes no sources; the session continues regardless.
    SubQueryDone {
        index: usize,
        success: bool,
    },
    PageFetched {
        url: String,
    },
    /// 1-based source number -> URL, used to resolve inline citation markers
    /// in the generated answer.
    SourceMapReady {
        sources: BTreeMap<String, String>,
    },
    AnswerChunk {
        text: String,
    },
    AnswerDone,
    SessionClosed,
}
