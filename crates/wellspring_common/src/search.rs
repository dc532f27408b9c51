//! Search backend result records.

use serde::{Deserialize, Serialize};

/// One result row from the search backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    /// Snippet shown by the search engine, used as the rerank summary.
    pub content: String,
    /// Engines that contributed this result.
    pub engines: Vec<String>,
}
