//! Turns one search pass into the caller-facing result page.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use tantivy::collector::TopDocs;
use tantivy::query::{MoreLikeThisQuery, Query};
use tantivy::schema::{Field, OwnedValue, Value};
use tantivy::{DocAddress, Score, Searcher, TantivyDocument};
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use localdb_core::config::SearchSettings;
use localdb_core::error::{IndexError, Result};
use localdb_core::traits::PreviewProcessor;
use localdb_core::types::QueryResultDocument;

use crate::document::EMPTY_CONTENT_MD5;
use crate::highlight::{await_snippets, spawn_snippet, Highlighter, SnippetJob};
use crate::tantivy_utils::IndexFields;

/// Candidates fetched per more-like-this lookup.
const SIMILAR_CANDIDATES: usize = 5;
const MAX_NORMALIZED_SCORE: f32 = 5.0;

pub struct ResultAssembler<'a> {
    searcher: &'a Searcher,
    fields: &'a IndexFields,
    settings: &'a SearchSettings,
    preview: &'a dyn PreviewProcessor,
    workers: Arc<Semaphore>,
    runtime: Handle,
}

/// A canonical hit whose snippet task is still running.
pub struct PendingDocument {
    document: QueryResultDocument,
    snippet: JoinHandle<String>,
}

impl<'a> ResultAssembler<'a> {
    pub fn new(
        searcher: &'a Searcher,
        fields: &'a IndexFields,
        settings: &'a SearchSettings,
        preview: &'a dyn PreviewProcessor,
        workers: Arc<Semaphore>,
        runtime: Handle,
    ) -> Self {
        Self { searcher, fields, settings, preview, workers, runtime }
    }

    /// Dedup, check and score `top_docs`. The snippet of each canonical hit
    /// is scheduled on `runtime` as soon as the hit is accepted. Blocking,
    /// meant for the blocking pool.
    pub fn collect(
        &self,
        query: &dyn Query,
        top_docs: Vec<(Score, DocAddress)>,
        show_similar: bool,
    ) -> Result<Vec<PendingDocument>> {
        let max_score = top_docs.iter().map(|(s, _)| *s).fold(0.0_f32, f32::max);
        let mut seen: HashSet<DocAddress> = top_docs.iter().map(|(_, addr)| *addr).collect();
        let mut by_hash: HashMap<String, usize> = HashMap::new();
        let mut highlighters: HashMap<Field, Option<Arc<Highlighter>>> = HashMap::new();
        let mut pending: Vec<PendingDocument> = Vec::new();

        for (score, addr) in top_docs {
            let doc: TantivyDocument = self.searcher.doc(addr).map_err(|e| IndexError::storage("fetch", e))?;
            let path = self.text(&doc, self.fields.path);
            let content_md5 = self.text(&doc, self.fields.content_md5);

            if content_md5 != EMPTY_CONTENT_MD5 {
                if let Some(&canonical) = by_hash.get(&content_md5) {
                    pending[canonical].document.duplicate_paths.push(path);
                    continue;
                }
            }

            if !Path::new(&path).exists() {
                debug!(path = %path, "indexed file is gone, skipping hit");
                continue;
            }

            let preview_available = self.preview.preview_available(Path::new(&path)).unwrap_or_else(|e| {
                warn!(path = %path, error = %e, "preview check failed");
                false
            });

            let (content_field, text) = self.content(&doc);
            let highlighter = highlighters
                .entry(content_field)
                .or_insert_with(|| {
                    Highlighter::new(
                        self.searcher,
                        query,
                        content_field,
                        self.settings.snippet_fragments,
                        self.settings.snippet_max_chars,
                    )
                    .map(Arc::new)
                })
                .clone();

            let similar_files = if show_similar {
                self.similar_files(content_field, &text, &mut seen)?
            } else {
                Vec::new()
            };

            let last_modified_millis = doc.get_first(self.fields.last_modified).and_then(|v| v.as_i64()).unwrap_or(0);
            let snippet = spawn_snippet(
                SnippetJob { highlighter, text, last_modified_millis },
                Arc::clone(&self.workers),
                &self.runtime,
            );
            if content_md5 != EMPTY_CONTENT_MD5 {
                by_hash.insert(content_md5, pending.len());
            }
            pending.push(PendingDocument {
                document: QueryResultDocument {
                    document_id: document_id(addr),
                    path,
                    duplicate_paths: Vec::new(),
                    snippet: String::new(),
                    last_modified_millis,
                    normalized_score: normalize_score(score, max_score),
                    unique_id: self.text(&doc, self.fields.unique_id),
                    preview_available,
                    similar_files,
                },
                snippet,
            });
        }
        Ok(pending)
    }

    fn similar_files(&self, content_field: Field, text: &str, seen: &mut HashSet<DocAddress>) -> Result<Vec<String>> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        let query = MoreLikeThisQuery::builder()
            .with_min_doc_frequency(1)
            .with_min_term_frequency(1)
            .with_document_fields(vec![
                (content_field, vec![OwnedValue::Str(text.to_string())]),
                (self.fields.content_not_stemmed, vec![OwnedValue::Str(text.to_string())]),
            ]);
        let candidates = self
            .searcher
            .search(&query, &TopDocs::with_limit(SIMILAR_CANDIDATES))
            .map_err(|e| IndexError::storage("search", e))?;

        let mut similar = Vec::new();
        for (_, addr) in candidates {
            if !seen.insert(addr) {
                continue;
            }
            let doc: TantivyDocument = self.searcher.doc(addr).map_err(|e| IndexError::storage("fetch", e))?;
            similar.push(self.text(&doc, self.fields.path));
        }
        Ok(similar)
    }

    fn text(&self, doc: &TantivyDocument, field: Field) -> String {
        doc.get_first(field).and_then(|v| v.as_str()).unwrap_or_default().to_string()
    }

    /// Content field the blob was stored in and the blob itself.
    fn content(&self, doc: &TantivyDocument) -> (Field, String) {
        self.fields
            .content_fields()
            .find_map(|field| doc.get_first(field).and_then(|v| v.as_str()).map(|s| (field, s.to_string())))
            .unwrap_or((self.fields.content, String::new()))
    }
}

/// Wait for every snippet of the page. Returns once all of them finished.
pub async fn finish(pending: Vec<PendingDocument>) -> Vec<QueryResultDocument> {
    let (mut documents, handles): (Vec<_>, Vec<_>) =
        pending.into_iter().map(|p| (p.document, p.snippet)).unzip();
    let snippets = await_snippets(handles).await;
    for (document, snippet) in documents.iter_mut().zip(snippets) {
        document.snippet = snippet;
    }
    documents
}

/// Stable within one snapshot: segment ordinal in the high half, doc id in
/// the low half.
pub fn document_id(addr: DocAddress) -> u64 {
    (u64::from(addr.segment_ord) << 32) | u64::from(addr.doc_id)
}

/// `round(score / max * 5)`, 0 when there is no positive maximum.
pub fn normalize_score(score: Score, max_score: Score) -> u8 {
    if max_score <= 0.0 {
        return 0;
    }
    (score / max_score * MAX_NORMALIZED_SCORE).round().clamp(0.0, MAX_NORMALIZED_SCORE) as u8
}
