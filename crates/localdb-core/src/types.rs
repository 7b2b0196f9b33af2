//! Domain types shared between the extraction side, the index and callers.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A single metadata value as produced by content extraction.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataValue {
    Text(String),
    Timestamp(DateTime<FixedOffset>),
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<DateTime<FixedOffset>> for MetadataValue {
    fn from(value: DateTime<FixedOffset>) -> Self {
        Self::Timestamp(value)
    }
}

/// Extracted content of one file.
///
/// - `path`: absolute path of the source file, also the update/delete key
/// - `language`: detected ISO-639-1 code, anything unknown falls back to the default analyzer
/// - `metadata`: ordered `(key, value)` pairs, keys may repeat
#[derive(Debug, Clone)]
pub struct Content {
    pub path: PathBuf,
    pub text: String,
    pub size_bytes: u64,
    pub last_modified_millis: i64,
    pub language: String,
    pub known_type: bool,
    pub metadata: Vec<(String, MetadataValue)>,
}

impl Content {
    pub fn new(path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            text: text.into(),
            size_bytes: 0,
            last_modified_millis: 0,
            language: "unknown".to_string(),
            known_type: true,
            metadata: Vec::new(),
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_size(mut self, size_bytes: u64) -> Self {
        self.size_bytes = size_bytes;
        self
    }

    pub fn with_last_modified(mut self, millis: i64) -> Self {
        self.last_modified_millis = millis;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.push((key.into(), value.into()));
        self
    }
}

/// Outcome of comparing a file on disk with its indexed version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateCheckResult {
    Unmodified,
    Updated,
}

/// One browsable value of a facet dimension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Facet {
    pub label: String,
    pub count: u64,
    pub link: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetDimension {
    pub name: String,
    pub facets: Vec<Facet>,
}

/// A canonical hit. Documents sharing its content hash are folded into
/// `duplicate_paths`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResultDocument {
    pub document_id: u64,
    pub path: String,
    pub duplicate_paths: Vec<String>,
    pub snippet: String,
    pub last_modified_millis: i64,
    pub normalized_score: u8,
    pub unique_id: String,
    pub preview_available: bool,
    pub similar_files: Vec<String>,
}

impl QueryResultDocument {
    /// Every path carrying this content, canonical first.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.path.as_str()).chain(self.duplicate_paths.iter().map(String::as_str))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub elapsed_millis: u64,
    pub documents: Vec<QueryResultDocument>,
    pub facet_dimensions: Vec<FacetDimension>,
    pub total_indexed_docs: u64,
    pub backlink: String,
}

impl QueryResult {
    pub fn dimension(&self, name: &str) -> Option<&FacetDimension> {
        self.facet_dimensions.iter().find(|d| d.name == name)
    }
}

/// A proposed search phrase. `label` emphasises the completed part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    pub label: String,
    pub phrase: String,
}

/// Per-query knobs a caller may override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryOptions {
    pub max_hits: usize,
    pub show_similar_documents: bool,
}
