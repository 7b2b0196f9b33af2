//! Staleness checks and garbage collection of entries whose file is gone.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tantivy::collector::DocSetCollector;
use tantivy::query::AllQuery;
use tantivy::schema::Value;
use tantivy::TantivyDocument;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use localdb_core::error::{IndexError, Result};
use localdb_core::types::UpdateCheckResult;

use crate::store::IndexStore;

/// `Unmodified` only when exactly one document is stored for `path` and its
/// timestamp equals `last_modified_millis`. Reads the current snapshot.
pub fn check_modified(store: &IndexStore, path: &str, last_modified_millis: i64) -> Result<UpdateCheckResult> {
    Ok(match store.last_modified_by_path(path)? {
        Some(stored) if stored == last_modified_millis => UpdateCheckResult::Unmodified,
        _ => UpdateCheckResult::Updated,
    })
}

/// Refresh, then delete every live entry whose file no longer exists.
/// Returns the number of entries removed. Deletions become visible on the
/// next refresh.
pub fn garbage_collect(store: &IndexStore) -> Result<usize> {
    store.refresh()?;
    let searcher = store.searcher();
    let fields = store.fields();
    let addresses = searcher.search(&AllQuery, &DocSetCollector).map_err(|e| IndexError::storage("search", e))?;

    let mut removed = 0;
    for addr in addresses {
        let doc: TantivyDocument = searcher.doc(addr).map_err(|e| IndexError::storage("fetch", e))?;
        let Some(path) = doc.get_first(fields.path).and_then(|v| v.as_str()) else {
            continue;
        };
        if Path::new(path).exists() {
            continue;
        }
        let Some(unique_id) = doc.get_first(fields.unique_id).and_then(|v| v.as_str()) else {
            continue;
        };
        debug!(path, unique_id, "removing entry for missing file");
        store.delete_by_unique_id(unique_id)?;
        removed += 1;
    }
    info!(scanned = searcher.num_docs(), removed, "garbage collection finished");
    Ok(removed)
}

/// Run [`garbage_collect`] every `period` until `shutdown` flips to true.
pub fn spawn_gc_loop(store: Arc<IndexStore>, period: Duration, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let store = Arc::clone(&store);
                    match tokio::task::spawn_blocking(move || garbage_collect(&store)).await {
                        Ok(Ok(_)) => {}
                        Ok(Err(IndexError::Closed)) => break,
                        Ok(Err(e)) if e.is_fatal() => {
                            error!(error = %e, "garbage collection hit a storage failure, stopping");
                            break;
                        }
                        Ok(Err(e)) => error!(error = %e, "garbage collection failed"),
                        Err(e) => {
                            error!(error = %e, "garbage collection task panicked, stopping");
                            break;
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("garbage collection loop stopped");
    })
}
