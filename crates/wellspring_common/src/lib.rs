//! Shared wire-protocol types for Wellspring.
//!
//! Everything a client needs to talk to `wellspringd`: the event stream
//! union, the query plan produced by the planner, and search result records.

pub mod events;
pub mod plan;
pub mod search;

pub use events::Event;
pub use plan::{QueryPlan, SubQuery};
pub use search::SearchResult;
