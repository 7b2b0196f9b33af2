//! Snippet computation on a bounded worker pool.

use std::sync::Arc;

use chrono::DateTime;
use futures::future::join_all;
use tantivy::query::Query;
use tantivy::schema::Field;
use tantivy::snippet::SnippetGenerator;
use tantivy::Searcher;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const FRAGMENT_SEPARATOR: &str = "...";
const HIGHLIGHT_PREFIX: &str = "<b>";
const HIGHLIGHT_POSTFIX: &str = "</b>";

/// Picks the best non-overlapping fragments of a text for one query and
/// content field.
pub struct Highlighter {
    generator: SnippetGenerator,
    max_fragments: usize,
    window_chars: usize,
}

impl Highlighter {
    pub fn new(
        searcher: &Searcher,
        query: &dyn Query,
        field: Field,
        max_fragments: usize,
        window_chars: usize,
    ) -> Option<Self> {
        match SnippetGenerator::create(searcher, query, field) {
            Ok(mut generator) => {
                generator.set_max_num_chars(window_chars);
                Some(Self { generator, max_fragments, window_chars })
            }
            Err(e) => {
                debug!(error = %e, "failed to create snippet generator, snippets will be empty");
                None
            }
        }
    }

    /// Up to `max_fragments` highlighted fragments in document order.
    pub fn fragments(&self, text: &str) -> Vec<String> {
        let mut scored: Vec<(usize, usize, String)> = split_windows(text, self.window_chars)
            .into_iter()
            .enumerate()
            .filter_map(|(position, window)| {
                let mut snippet = self.generator.snippet(window);
                let hits = snippet.highlighted().len();
                if hits == 0 {
                    return None;
                }
                snippet.set_snippet_prefix_postfix(HIGHLIGHT_PREFIX, HIGHLIGHT_POSTFIX);
                Some((position, hits, snippet.to_html().trim().to_string()))
            })
            .collect();

        scored.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(self.max_fragments);
        scored.sort_by_key(|(position, _, _)| *position);
        scored.into_iter().map(|(_, _, fragment)| fragment).collect()
    }
}

/// `"<dd.Month.yyyy> - <fragment>...<fragment>"`
pub fn format_snippet(last_modified_millis: i64, fragments: &[String]) -> String {
    let date = DateTime::from_timestamp_millis(last_modified_millis)
        .map(|d| d.format("%d.%B.%Y").to_string())
        .unwrap_or_default();
    format!("{} - {}", date, fragments.join(FRAGMENT_SEPARATOR))
}

/// Cut `text` into consecutive windows of at most `max_chars` characters,
/// preferring to break on whitespace.
fn split_windows(text: &str, max_chars: usize) -> Vec<&str> {
    let max_chars = max_chars.max(1);
    let mut windows = Vec::new();
    let mut start = 0;
    let mut count = 0;
    let mut last_space: Option<usize> = None;

    for (i, c) in text.char_indices() {
        if count >= max_chars {
            let cut = last_space.filter(|&s| s > start).unwrap_or(i);
            windows.push(&text[start..cut]);
            start = cut;
            count = text[start..i].chars().count();
            last_space = None;
        }
        if c.is_whitespace() {
            last_space = Some(i);
        }
        count += 1;
    }
    if start < text.len() {
        windows.push(&text[start..]);
    }
    windows
}

pub struct SnippetJob {
    pub highlighter: Option<Arc<Highlighter>>,
    pub text: String,
    pub last_modified_millis: i64,
}

/// Schedule one task per job on `runtime`. Each task waits for a permit
/// from `workers` before running on the blocking pool. Callable from
/// blocking threads.
pub fn spawn_snippet(job: SnippetJob, workers: Arc<Semaphore>, runtime: &Handle) -> JoinHandle<String> {
    runtime.spawn(async move {
        let Ok(_permit) = workers.acquire_owned().await else {
            return String::new();
        };
        let SnippetJob { highlighter, text, last_modified_millis } = job;
        let fragments = match highlighter {
            Some(h) => tokio::task::spawn_blocking(move || h.fragments(&text)).await.unwrap_or_else(|e| {
                warn!(error = %e, "snippet task failed");
                Vec::new()
            }),
            None => Vec::new(),
        };
        format_snippet(last_modified_millis, &fragments)
    })
}

/// Await every handle. A failed task yields an empty snippet.
pub async fn await_snippets(handles: Vec<JoinHandle<String>>) -> Vec<String> {
    join_all(handles)
        .await
        .into_iter()
        .map(|res| {
            res.unwrap_or_else(|e| {
                warn!(error = %e, "highlight task failed, leaving snippet empty");
                String::new()
            })
        })
        .collect()
}
