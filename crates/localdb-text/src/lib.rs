//! localdb-text
//!
//! Tantivy-backed desktop search index: document building, faceted and
//! drill-down queries, snippets, suggestions and index maintenance. See
//! [`DesktopIndex`] for the entry point and `examples/` for CLI-like usage.
pub mod analyzer;
pub mod document;
pub mod drilldown;
pub mod engine;
pub mod facet_schema;
pub mod facets;
pub mod highlight;
pub mod maintenance;
pub mod query;
pub mod results;
pub mod scheduler;
pub mod store;
pub mod suggest;
pub mod tantivy_utils;

pub use drilldown::{Constraint, Drilldown, RangeBound};
pub use engine::DesktopIndex;
