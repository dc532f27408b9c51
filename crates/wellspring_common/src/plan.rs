//! Query plan produced by the planner collaborator.

use serde::{Deserialize, Serialize};

/// The planner's decomposition of a user query. Immutable once produced;
/// `instruction` is consumed later by the answer generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPlan {
    /// Two-letter language code detected from the user query.
    pub language: String,
    pub search_queries: Vec<SubQuery>,
    /// Free-text guidance for the answer generator.
    pub instruction: String,
}

/// One planned search: the query string plus a description of what
/// information the search is expected to surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubQuery {
    pub query: String,
    pub description: String,
}
