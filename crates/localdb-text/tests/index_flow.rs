use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use chrono::{FixedOffset, TimeZone};
use localdb_core::config::Settings;
use localdb_core::error::IndexError;
use localdb_core::traits::{ExtensionPreview, NoPreview, PreviewProcessor};
use localdb_core::types::{Content, QueryOptions, UpdateCheckResult};
use localdb_text::{drilldown, DesktopIndex, Drilldown};
use tempfile::TempDir;

struct Fixture {
    tmp: TempDir,
    index: DesktopIndex,
}

impl Fixture {
    fn new() -> anyhow::Result<Self> {
        Self::with_preview(Arc::new(NoPreview))
    }

    fn with_preview(preview: Arc<dyn PreviewProcessor>) -> anyhow::Result<Self> {
        let tmp = tempfile::tempdir()?;
        std::fs::create_dir_all(tmp.path().join("files"))?;
        let index = DesktopIndex::open(settings(tmp.path()), preview)?;
        Ok(Self { tmp, index })
    }

    /// Write `text` to `files/<name>` and return the absolute path.
    fn file(&self, name: &str, text: &str) -> anyhow::Result<PathBuf> {
        let path = self.tmp.path().join("files").join(name);
        std::fs::write(&path, text)?;
        Ok(path)
    }

    fn add(&self, content: &Content) -> anyhow::Result<()> {
        self.index.add_or_update("files", content)?;
        Ok(())
    }

    async fn query(&self, text: &str, drill: &[&str]) -> anyhow::Result<localdb_core::types::QueryResult> {
        let mut drilldown = Drilldown::new();
        for d in drill {
            drilldown::add_to_map(d, &mut drilldown)?;
        }
        Ok(self.index.query(text, "/back", "/search", options(), &drilldown).await?)
    }
}

fn settings(root: &Path) -> Settings {
    let mut settings = Settings::for_dir(&root.join("index"));
    settings.index.writer_heap_bytes = 15_000_000;
    settings
}

fn options() -> QueryOptions {
    QueryOptions { max_hits: 50, show_similar_documents: false }
}

fn content(path: &Path, text: &str) -> Content {
    Content::new(path, text).with_language("en")
}

#[tokio::test]
async fn added_document_is_found_with_snippet() -> anyhow::Result<()> {
    let fx = Fixture::new()?;
    let p = fx.file("fox.txt", "the quick brown fox jumps over the lazy dog")?;
    fx.add(&content(&p, "the quick brown fox jumps over the lazy dog").with_last_modified(1_392_854_400_000))?;

    let result = fx.query("fox", &[]).await?;
    assert_eq!(result.documents.len(), 1);
    let doc = &result.documents[0];
    assert_eq!(doc.path, p.to_string_lossy());
    assert_eq!(doc.normalized_score, 5);
    assert!(doc.snippet.starts_with("20.February.2014 - "), "{}", doc.snippet);
    assert!(doc.snippet.contains("<b>fox</b>"), "{}", doc.snippet);
    assert_eq!(result.total_indexed_docs, 1);
    assert_eq!(result.backlink, "/back");
    Ok(())
}

#[tokio::test]
async fn writes_are_invisible_until_refresh() -> anyhow::Result<()> {
    let fx = Fixture::new()?;
    let p = fx.file("a.txt", "alpha")?;
    fx.add(&content(&p, "alpha").with_last_modified(1000))?;

    assert!(!fx.index.exists(&p)?);
    assert_eq!(fx.index.check_modified(&p, 1000)?, UpdateCheckResult::Updated);
    fx.index.refresh()?;
    assert!(fx.index.exists(&p)?);
    Ok(())
}

#[tokio::test]
async fn upsert_keeps_a_single_entry_per_path() -> anyhow::Result<()> {
    let fx = Fixture::new()?;
    let p = fx.file("a.txt", "second version")?;
    fx.add(&content(&p, "first version"))?;
    fx.add(&content(&p, "second version"))?;
    fx.index.refresh()?;

    assert!(fx.index.exists(&p)?);
    assert_eq!(fx.index.num_docs(), 1);
    assert!(fx.query("first", &[]).await?.documents.is_empty());
    assert_eq!(fx.query("second", &[]).await?.documents.len(), 1);
    Ok(())
}

#[tokio::test]
async fn identical_content_is_folded_into_one_hit() -> anyhow::Result<()> {
    let fx = Fixture::new()?;
    let a = fx.file("a.txt", "shared words here")?;
    let b = fx.file("b.txt", "shared words here")?;
    fx.add(&content(&a, "shared words here"))?;
    fx.add(&content(&b, "shared words here"))?;

    let result = fx.query("shared", &[]).await?;
    assert_eq!(result.documents.len(), 1);
    let mut paths: Vec<&str> = result.documents[0].paths().collect();
    paths.sort();
    let mut expected = vec![a.to_str().unwrap_or_default(), b.to_str().unwrap_or_default()];
    expected.sort();
    assert_eq!(paths, expected);
    Ok(())
}

#[tokio::test]
async fn empty_content_is_never_folded() -> anyhow::Result<()> {
    let fx = Fixture::new()?;
    let a = fx.file("a.bin", "")?;
    let b = fx.file("b.bin", "")?;
    fx.add(&Content::new(&a, ""))?;
    fx.add(&Content::new(&b, ""))?;

    let result = fx.query("", &[]).await?;
    assert_eq!(result.documents.len(), 2);
    assert!(result.documents.iter().all(|d| d.duplicate_paths.is_empty()));
    Ok(())
}

#[tokio::test]
async fn check_modified_compares_stored_timestamp() -> anyhow::Result<()> {
    let fx = Fixture::new()?;
    let p = fx.file("a.txt", "alpha")?;
    fx.add(&content(&p, "alpha").with_last_modified(1000))?;
    fx.index.refresh()?;

    assert_eq!(fx.index.check_modified(&p, 1000)?, UpdateCheckResult::Unmodified);
    assert_eq!(fx.index.check_modified(&p, 2000)?, UpdateCheckResult::Updated);
    assert_eq!(fx.index.check_modified(Path::new("/nowhere/x.txt"), 1000)?, UpdateCheckResult::Updated);
    Ok(())
}

#[tokio::test]
async fn date_metadata_is_drillable_at_every_level() -> anyhow::Result<()> {
    let fx = Fixture::new()?;
    let utc = FixedOffset::east_opt(0).expect("utc offset");
    let feb = utc.with_ymd_and_hms(2014, 2, 20, 12, 0, 0).single().expect("valid date");
    let mar = utc.with_ymd_and_hms(2015, 3, 1, 12, 0, 0).single().expect("valid date");

    let a = fx.file("a.txt", "report")?;
    let b = fx.file("b.txt", "report")?;
    fx.add(&content(&a, "report").with_metadata("created", feb))?;
    fx.add(&content(&b, "report").with_metadata("created", mar))?;

    for drill in [
        "created=2014",
        "created=2014/02",
        "created=2014/02/20",
        "created-year=2014",
        "created-year-month=2014/02",
        "created-year-month-day=2014/02/20",
    ] {
        let result = fx.query("", &[drill]).await?;
        assert_eq!(result.documents.len(), 1, "{drill}");
        assert_eq!(result.documents[0].path, a.to_string_lossy(), "{drill}");
    }
    assert!(fx.query("", &["created=2014/03"]).await?.documents.is_empty());
    assert_eq!(fx.query("report", &["created=2015"]).await?.documents[0].path, b.to_string_lossy());
    Ok(())
}

#[tokio::test]
async fn flat_facets_are_counted_and_linked() -> anyhow::Result<()> {
    let fx = Fixture::new()?;
    for (name, author) in [("a.txt", "Jane"), ("b.txt", "Jane"), ("c.txt", "John Doe")] {
        let p = fx.file(name, name)?;
        fx.add(&content(&p, name).with_metadata("author", author).with_metadata("extension", "txt"))?;
    }

    let result = fx.query("", &[]).await?;
    let authors = result.dimension("Author").expect("author facets");
    let labels: Vec<(&str, u64)> = authors.facets.iter().map(|f| (f.label.as_str(), f.count)).collect();
    assert_eq!(labels, vec![("Jane", 2), ("John Doe", 1)]);
    assert_eq!(authors.facets[1].link, "/search/author%3DJohn%20Doe");
    assert_eq!(result.dimension("File types").map(|d| d.facets.len()), Some(1));
    assert!(result.dimension("Keywords").is_none());

    // following a link narrows the result
    let segment = authors.facets[1].link.rsplit('/').next().unwrap_or_default();
    let (dim, constraint) = drilldown::parse_link(segment)?;
    let drilled = fx.index.query("", "/", "/search", options(), &Drilldown::from([(dim, constraint)])).await?;
    assert_eq!(drilled.documents.len(), 1);
    Ok(())
}

#[tokio::test]
async fn focal_length_is_bucketed_into_ranges() -> anyhow::Result<()> {
    let fx = Fixture::new()?;
    for (name, focal) in [("a.jpg", "18 mm"), ("b.jpg", "50mm"), ("c.jpg", "50"), ("d.jpg", "200"), ("e.jpg", "n/a")] {
        let p = fx.file(name, "")?;
        fx.add(&Content::new(&p, "").with_metadata("focal-length-35", focal))?;
    }

    let result = fx.query("", &[]).await?;
    let focal = result.dimension("Focal length").expect("range facets");
    let buckets: Vec<(&str, u64)> = focal.facets.iter().map(|f| (f.label.as_str(), f.count)).collect();
    assert_eq!(buckets, vec![("Ultra wide (<24mm)", 1), ("Normal (35-70)", 2), ("Telephoto (>=135)", 1)]);
    assert_eq!(focal.facets[1].link, "/search/35%3C%3Dfocal-length-35%3C70");

    let drilled = fx.query("", &["35<=focal-length-35<70"]).await?;
    assert_eq!(drilled.documents.len(), 2);
    let open_ended = fx.query("", &["135<=focal-length-35"]).await?;
    assert_eq!(open_ended.documents.len(), 1);
    Ok(())
}

#[tokio::test]
async fn malformed_drilldown_is_rejected() -> anyhow::Result<()> {
    let fx = Fixture::new()?;
    assert!(matches!(drilldown::parse("???"), Err(IndexError::QueryPlanning(_))));

    let mut drilldown = Drilldown::new();
    drilldown::add_to_map("1<author", &mut drilldown)?;
    let err = fx.index.query("", "/", "/search", options(), &drilldown).await;
    assert!(matches!(err, Err(IndexError::QueryPlanning(_))));
    Ok(())
}

#[tokio::test]
async fn garbage_collection_removes_entries_of_deleted_files() -> anyhow::Result<()> {
    let fx = Fixture::new()?;
    let keep = fx.file("keep.txt", "keep me")?;
    let gone = fx.file("gone.txt", "delete me")?;
    fx.add(&content(&keep, "keep me"))?;
    fx.add(&content(&gone, "delete me"))?;
    fx.index.refresh()?;

    std::fs::remove_file(&gone)?;
    // stale hits are skipped even before collection
    assert!(fx.query("delete", &[]).await?.documents.is_empty());

    assert_eq!(fx.index.garbage_collect()?, 1);
    fx.index.refresh()?;
    assert!(!fx.index.exists(&gone)?);
    assert!(fx.index.exists(&keep)?);
    assert_eq!(fx.index.garbage_collect()?, 0);
    Ok(())
}

#[tokio::test]
async fn unique_id_resolves_to_path() -> anyhow::Result<()> {
    let fx = Fixture::new()?;
    let p = fx.file("a.txt", "alpha")?;
    fx.add(&content(&p, "alpha"))?;

    let result = fx.query("alpha", &[]).await?;
    let unique_id = &result.documents[0].unique_id;
    assert_eq!(fx.index.resolve_path_by_unique_id(unique_id)?, Some(p));
    assert_eq!(fx.index.resolve_path_by_unique_id("no-such-id")?, None);
    Ok(())
}

#[tokio::test]
async fn suggestions_complete_and_correct() -> anyhow::Result<()> {
    let fx = Fixture::new()?;
    for (name, text) in [("a.txt", "quick brown fox"), ("b.txt", "quick brown dog"), ("c.txt", "quiet evening")] {
        let p = fx.file(name, text)?;
        fx.add(&content(&p, text))?;
    }

    let single: Vec<String> = fx.index.suggest("qui")?.into_iter().map(|s| s.phrase).collect();
    assert_eq!(single, vec!["quick", "quiet"]);

    let phrase = fx.index.suggest("quick brwn f")?;
    assert_eq!(phrase.len(), 1);
    assert_eq!(phrase[0].phrase, "quick brown fox");
    assert_eq!(phrase[0].label, "quick brown f<b>ox</b>");
    Ok(())
}

#[tokio::test]
async fn similar_documents_are_attached_when_enabled() -> anyhow::Result<()> {
    let fx = Fixture::new()?;
    let a = fx.file("a.txt", "")?;
    let b = fx.file("b.txt", "")?;
    let c = fx.file("c.txt", "")?;
    fx.add(&content(&a, "apple banana cherry elderberry"))?;
    fx.add(&content(&b, "apple banana cherry grape"))?;
    fx.add(&content(&c, "zebra"))?;

    let opts = QueryOptions { max_hits: 10, show_similar_documents: true };
    let result = fx.index.query("elderberry", "/", "/search", opts, &Drilldown::new()).await?;
    assert_eq!(result.documents.len(), 1);
    assert_eq!(result.documents[0].similar_files, vec![b.to_string_lossy().into_owned()]);

    let plain = fx.query("elderberry", &[]).await?;
    assert!(plain.documents[0].similar_files.is_empty());
    Ok(())
}

struct BrokenPreview;

impl PreviewProcessor for BrokenPreview {
    fn preview_available(&self, _path: &Path) -> anyhow::Result<bool> {
        anyhow::bail!("renderer crashed")
    }
}

#[tokio::test]
async fn preview_flag_follows_collaborator() -> anyhow::Result<()> {
    let fx = Fixture::with_preview(Arc::new(ExtensionPreview::new(["txt"])))?;
    let p = fx.file("a.txt", "alpha")?;
    fx.add(&content(&p, "alpha"))?;
    assert!(fx.query("alpha", &[]).await?.documents[0].preview_available);

    let broken = Fixture::with_preview(Arc::new(BrokenPreview))?;
    let p = broken.file("a.txt", "alpha")?;
    broken.add(&content(&p, "alpha"))?;
    let result = broken.query("alpha", &[]).await?;
    assert_eq!(result.documents.len(), 1);
    assert!(!result.documents[0].preview_available);
    Ok(())
}

#[tokio::test]
async fn shutdown_persists_and_closes() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("a.txt");
    std::fs::write(&path, "alpha")?;
    let utc = FixedOffset::east_opt(0).expect("utc offset");
    let created = utc.with_ymd_and_hms(2014, 2, 20, 0, 0, 0).single().expect("valid date");

    let index = DesktopIndex::open(settings(tmp.path()), Arc::new(NoPreview))?;
    index.start();
    index.add_or_update("loc", &content(&path, "alpha").with_metadata("created", created))?;
    index.shutdown().await?;
    assert!(matches!(index.add_or_update("loc", &content(&path, "alpha")), Err(IndexError::Closed)));
    drop(index);

    let reopened = DesktopIndex::open(settings(tmp.path()), Arc::new(NoPreview))?;
    assert!(reopened.exists(&path)?);
    let mut drill = Drilldown::new();
    drilldown::add_to_map("created=2014/02", &mut drill)?;
    let result = reopened.query("", "/", "/search", options(), &drill).await?;
    assert_eq!(result.documents.len(), 1);
    reopened.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn commit_scheduler_makes_writes_durable() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("a.txt");
    std::fs::write(&path, "alpha")?;
    let mut settings = settings(tmp.path());
    settings.index.commit_interval_ms = 20;

    let index = DesktopIndex::open(settings, Arc::new(NoPreview))?;
    index.start();
    index.add_or_update("loc", &content(&path, "alpha"))?;
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    // committed by the scheduler but not yet visible
    assert!(!index.exists(&path)?);
    index.refresh()?;
    assert!(index.exists(&path)?);
    index.shutdown().await?;
    Ok(())
}

/// Blocks until the test releases it, or reports an error after 5s.
struct GatedPreview {
    gate: Mutex<mpsc::Receiver<()>>,
}

impl PreviewProcessor for GatedPreview {
    fn preview_available(&self, _path: &Path) -> anyhow::Result<bool> {
        let gate = self.gate.lock().map_err(|_| anyhow::anyhow!("gate poisoned"))?;
        gate.recv_timeout(Duration::from_secs(5))?;
        Ok(true)
    }
}

// current_thread runtime: the releasing task can only run if the query's
// search and hit checks stay off the runtime thread
#[tokio::test]
async fn query_does_not_block_the_runtime() -> anyhow::Result<()> {
    let (release, gate) = mpsc::channel();
    let fx = Fixture::with_preview(Arc::new(GatedPreview { gate: Mutex::new(gate) }))?;
    let p = fx.file("a.txt", "gate keeper")?;
    fx.add(&content(&p, "gate keeper"))?;

    let releaser = tokio::spawn(async move { release.send(()) });
    let result = fx.query("gate", &[]).await?;
    assert_eq!(result.documents.len(), 1);
    assert!(result.documents[0].preview_available);
    releaser.await??;
    Ok(())
}
