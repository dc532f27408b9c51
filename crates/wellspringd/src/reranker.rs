//! Relevance reranking of search results.
//!
//! The model returns an index permutation wrapped in a
//! `<reranking_result>` tag. Orderings are validated strictly: empty,
//! out-of-range, negative or duplicate indices all count as a rerank
//! failure, which the pipeline absorbs as a failed sub-query.

use crate::llm::{ChatModel, LlmError};
use async_trait::async_trait;
use regex::Regex;
use std::fmt::Write as _;
use std::sync::{Arc, OnceLock};

#[derive(Debug, thiserror::Error)]
pub enum RerankError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("no candidates to rerank")]
    NoCandidates,

    #[error("no reranking result in model response")]
    MissingResult,

    #[error("invalid ordering json: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("empty ordering")]
    EmptyOrdering,

    #[error("ordering index {0} out of range for {1} candidates")]
    OutOfRange(i64, usize),

    #[error("duplicate ordering index {0}")]
    Duplicate(usize),
}

#[async_trait]
pub trait Reranker: Send + Sync {
    /// Rank `candidates` against the search goal, returning indices into
    /// `candidates` from most to least relevant (possibly truncated).
    async fn rerank(&self, goal: &str, candidates: &[String]) -> Result<Vec<usize>, RerankError>;
}

/// Check a raw ordering against the candidate count.
pub fn validate_ordering(ordering: &[i64], candidates: usize) -> Result<Vec<usize>, RerankError> {
    if ordering.is_empty() {
        return Err(RerankError::EmptyOrdering);
    }
    let mut seen = vec![false; candidates];
    let mut out = Vec::with_capacity(ordering.len());
    for &raw in ordering {
        if raw < 0 || raw as usize >= candidates {
            return Err(RerankError::OutOfRange(raw, candidates));
        }
        let index = raw as usize;
        if seen[index] {
            return Err(RerankError::Duplicate(index));
        }
        seen[index] = true;
        out.push(index);
    }
    Ok(out)
}

const RERANK_SYSTEM_PROMPT: &str = r#"You are a search result re-ranker. Given a user's search goal and candidate webpages (url, title, snippet each), rank the candidates from most to least relevant.

Return a JSON array of candidate indices, most relevant first, wrapped exactly like this:

<reranking_result>[14, 3, 2, 5]</reranking_result>

Ranking criteria:
1. Authoritativeness: prefer credible sources (official documentation, well-known references).
2. Recency: prefer up-to-date pages where it matters.
3. Snippet relevance: judge how closely the snippet matches the goal.
4. Keyword relevance: check title and snippet against the goal's keywords.
5. No duplicates: never select the same index twice.
6. Avoid PDF files.

Select up to 4 candidates, even if they overlap thematically, as long as each adds distinct information."#;

fn result_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)<reranking_result>(.*?)</reranking_result>").expect("valid regex")
    })
}

/// Extract and validate the ordering from a model response.
pub fn parse_ordering(text: &str, candidates: usize) -> Result<Vec<usize>, RerankError> {
    let captures = result_pattern()
        .captures(text)
        .ok_or(RerankError::MissingResult)?;
    let raw: Vec<i64> = serde_json::from_str(captures[1].trim())?;
    validate_ordering(&raw, candidates)
}

pub struct LlmReranker {
    model: Arc<dyn ChatModel>,
}

impl LlmReranker {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl Reranker for LlmReranker {
    async fn rerank(&self, goal: &str, candidates: &[String]) -> Result<Vec<usize>, RerankError> {
        if candidates.is_empty() {
            return Err(RerankError::NoCandidates);
        }

        let mut prompt = String::new();
        let _ = writeln!(prompt, "<user_query>\n{}</user_query>\n", goal);
        prompt.push_str("<candidates>\n");
        for (index, candidate) in candidates.iter().enumerate() {
            let _ = writeln!(
                prompt,
                "<candidate>\n<index>{}</index>\n<content>\n{}\n</content>\n</candidate>",
                index, candidate
            );
        }
        prompt.push_str("</candidates>\n");

        let response = self.model.complete(Some(RERANK_SYSTEM_PROMPT), &prompt).await?;
        parse_ordering(&response, candidates.len())
    }
}
