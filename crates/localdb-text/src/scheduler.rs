//! Background commit loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use localdb_core::error::IndexError;

use crate::store::IndexStore;

/// Commit every `period` while there are uncommitted writes. The loop ends
/// when `shutdown` flips to true or on the first failed commit; a commit in
/// progress always completes first.
pub fn spawn_commit_loop(
    store: Arc<IndexStore>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // first tick fires immediately
        ticker.tick().await;
        info!(period_ms = period.as_millis() as u64, "commit scheduler started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let store = Arc::clone(&store);
                    match tokio::task::spawn_blocking(move || store.commit()).await {
                        Ok(Ok(true)) => debug!("scheduled commit done"),
                        Ok(Ok(false)) => {}
                        Ok(Err(IndexError::Closed)) => break,
                        Ok(Err(e)) => {
                            error!(error = %e, "scheduled commit failed, stopping commit scheduler");
                            break;
                        }
                        Err(e) => {
                            error!(error = %e, "commit task panicked, stopping commit scheduler");
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
        info!("commit scheduler stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::AnalyzerSelector;
    use crate::document::DocumentBuilder;
    use localdb_core::types::Content;

    #[tokio::test]
    async fn loop_commits_pending_writes() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = Arc::new(IndexStore::open(dir.path(), &[], 15_000_000)?);
        let (tx, rx) = watch::channel(false);
        let handle = spawn_commit_loop(Arc::clone(&store), Duration::from_millis(20), rx);

        let selector = AnalyzerSelector::new(store.fields(), &[]);
        let doc = DocumentBuilder::new(store.fields(), &selector, store.facet_schema())
            .build("loc", &Content::new("/a.txt", "alpha"));
        store.upsert(doc)?;

        tokio::time::sleep(Duration::from_millis(200)).await;
        // the loop committed, so there is nothing left to commit
        assert!(!store.commit()?);

        tx.send(true)?;
        handle.await?;
        Ok(())
    }

    #[tokio::test]
    async fn loop_stops_after_storage_failure() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = Arc::new(IndexStore::open(dir.path(), &[], 15_000_000)?);
        let _ = store.fail("commit", "disk full");
        // keep the sender alive so only the failure can end the loop
        let (_tx, rx) = watch::channel(false);
        let handle = spawn_commit_loop(Arc::clone(&store), Duration::from_millis(10), rx);
        tokio::time::timeout(Duration::from_secs(5), handle).await??;
        Ok(())
    }
}
