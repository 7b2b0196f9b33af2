//! `DesktopIndex`: the public face of the text index.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures::future::join_all;
use tantivy::collector::{Count, TopDocs};
use tantivy::query::TermQuery;
use tantivy::schema::{IndexRecordOption, Value};
use tantivy::{TantivyDocument, Term};
use tokio::runtime::Handle;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use localdb_core::config::Settings;
use localdb_core::error::{IndexError, Result};
use localdb_core::traits::PreviewProcessor;
use localdb_core::types::{Content, FacetDimension, QueryOptions, QueryResult, Suggestion, UpdateCheckResult};

use crate::analyzer::AnalyzerSelector;
use crate::document::DocumentBuilder;
use crate::drilldown::Drilldown;
use crate::facets::{facet_collector, flat_dimensions, range_dimension, RangeBucketCollector};
use crate::maintenance::{self, spawn_gc_loop};
use crate::query::QueryPlanner;
use crate::results::{self, PendingDocument, ResultAssembler};
use crate::scheduler::spawn_commit_loop;
use crate::store::IndexStore;
use crate::suggest::SuggestionEngine;
use crate::tantivy_utils::{reserved_field_names, IndexFields};

pub struct DesktopIndex {
    settings: Arc<Settings>,
    store: Arc<IndexStore>,
    selector: Arc<AnalyzerSelector>,
    preview: Arc<dyn PreviewProcessor>,
    workers: Arc<Semaphore>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
}

impl DesktopIndex {
    /// Open or create the index under `settings.index.dir`. Background work
    /// starts with [`DesktopIndex::start`].
    pub fn open(settings: Settings, preview: Arc<dyn PreviewProcessor>) -> Result<Self> {
        validate(&settings)?;
        let dir = settings.index_dir();
        let store = Arc::new(IndexStore::open(&dir, &settings.facets.numeric_fields, settings.index.writer_heap_bytes)?);
        let selector = Arc::new(AnalyzerSelector::new(store.fields(), &settings.analysis.languages));
        let workers = Arc::new(Semaphore::new(settings.search.highlight_workers));
        let (shutdown_tx, _) = watch::channel(false);
        Ok(Self {
            settings: Arc::new(settings),
            store,
            selector,
            preview,
            workers,
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
        })
    }

    fn fields(&self) -> &IndexFields {
        self.store.fields()
    }

    /// Start the commit scheduler. Must be called from inside a tokio runtime.
    pub fn start(&self) {
        if self.store.is_closed() {
            warn!("index is closed, background tasks not started");
            return;
        }
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        let period = Duration::from_millis(self.settings.index.commit_interval_ms);
        let handle = spawn_commit_loop(Arc::clone(&self.store), period, self.shutdown_tx.subscribe());
        self.track(handle);
    }

    /// Run garbage collection every `period` until shutdown.
    pub fn spawn_gc(&self, period: Duration) {
        let handle = spawn_gc_loop(Arc::clone(&self.store), period, self.shutdown_tx.subscribe());
        self.track(handle);
    }

    fn track(&self, handle: JoinHandle<()>) {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner()).push(handle);
    }

    /// Stop background loops, commit what is pending and close the writer.
    /// Surfaces an earlier commit failure.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) -> Result<()> {
        // receivers may all be gone already
        let _ = self.shutdown_tx.send(true);
        let handles: Vec<_> = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(|e| e.into_inner()));
        for res in join_all(handles).await {
            if let Err(e) = res {
                warn!(error = %e, "background task ended abnormally");
            }
        }
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.close())
            .await
            .map_err(|e| IndexError::storage("close", e))??;
        info!("desktop index shut down");
        Ok(())
    }

    #[instrument(skip(self, content), fields(path = %content.path.display()))]
    pub fn add_or_update(&self, location_id: &str, content: &Content) -> Result<()> {
        let builder = DocumentBuilder::new(self.fields(), &self.selector, self.store.facet_schema());
        let doc = builder.build(location_id, content);
        debug!(unique_id = %doc.unique_id, content_md5 = %doc.content_md5, "upserting document");
        self.store.upsert(doc)
    }

    #[instrument(skip(self))]
    pub fn remove(&self, path: &Path) -> Result<()> {
        self.store.delete_by_path(&path.to_string_lossy())
    }

    /// Whether the current snapshot has a document for `path`.
    pub fn exists(&self, path: &Path) -> Result<bool> {
        self.store.exists_by_path(&path.to_string_lossy())
    }

    pub fn check_modified(&self, path: &Path, last_modified_millis: i64) -> Result<UpdateCheckResult> {
        maintenance::check_modified(&self.store, &path.to_string_lossy(), last_modified_millis)
    }

    /// Make all writes issued so far visible. Called at crawl start.
    pub fn refresh(&self) -> Result<()> {
        self.store.refresh()
    }

    pub fn num_docs(&self) -> u64 {
        self.store.num_docs()
    }

    /// Plan and run a query. The search pass, facet counting and hit
    /// checks run on the blocking pool; snippets are awaited here.
    #[instrument(skip(self, backlink, base_path, options, drilldown), fields(constraints = drilldown.len()))]
    pub async fn query(
        &self,
        text: &str,
        backlink: &str,
        base_path: &str,
        options: QueryOptions,
        drilldown: &Drilldown,
    ) -> Result<QueryResult> {
        let started = Instant::now();
        let job = QueryJob {
            store: Arc::clone(&self.store),
            selector: Arc::clone(&self.selector),
            settings: Arc::clone(&self.settings),
            preview: Arc::clone(&self.preview),
            workers: Arc::clone(&self.workers),
            runtime: Handle::current(),
            text: text.to_string(),
            base_path: base_path.to_string(),
            options,
            drilldown: drilldown.clone(),
        };
        let page = tokio::task::spawn_blocking(move || job.run())
            .await
            .map_err(|e| IndexError::storage("query", e))??;
        let documents = results::finish(page.pending).await;

        let elapsed_millis = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        info!(matched = page.matched, returned = documents.len(), elapsed_ms = elapsed_millis, "query executed");
        Ok(QueryResult {
            elapsed_millis,
            documents,
            facet_dimensions: page.facet_dimensions,
            total_indexed_docs: page.total_indexed_docs,
            backlink: backlink.to_string(),
        })
    }

    #[instrument(skip(self))]
    pub fn suggest(&self, term: &str) -> Result<Vec<Suggestion>> {
        self.store.refresh()?;
        let searcher = self.store.searcher();
        SuggestionEngine::new(&searcher, self.fields().content_not_stemmed, &self.settings.suggest).suggest(term)
    }

    pub fn resolve_path_by_unique_id(&self, unique_id: &str) -> Result<Option<PathBuf>> {
        self.store.refresh()?;
        let searcher = self.store.searcher();
        let fields = self.fields();
        let query = TermQuery::new(Term::from_field_text(fields.unique_id, unique_id), IndexRecordOption::Basic);
        let hits = searcher.search(&query, &TopDocs::with_limit(1)).map_err(|e| IndexError::storage("search", e))?;
        let Some((_, addr)) = hits.first() else {
            return Ok(None);
        };
        let doc: TantivyDocument = searcher.doc(*addr).map_err(|e| IndexError::storage("fetch", e))?;
        Ok(doc.get_first(fields.path).and_then(|v| v.as_str()).map(PathBuf::from))
    }

    #[instrument(skip(self))]
    pub fn garbage_collect(&self) -> Result<usize> {
        maintenance::garbage_collect(&self.store)
    }
}

/// Owned inputs of the blocking part of a query.
struct QueryJob {
    store: Arc<IndexStore>,
    selector: Arc<AnalyzerSelector>,
    settings: Arc<Settings>,
    preview: Arc<dyn PreviewProcessor>,
    workers: Arc<Semaphore>,
    runtime: Handle,
    text: String,
    base_path: String,
    options: QueryOptions,
    drilldown: Drilldown,
}

struct CollectedPage {
    pending: Vec<PendingDocument>,
    facet_dimensions: Vec<FacetDimension>,
    total_indexed_docs: u64,
    matched: usize,
}

impl QueryJob {
    fn run(self) -> Result<CollectedPage> {
        self.store.refresh()?;
        let searcher = self.store.searcher();
        let fields = self.store.fields();
        let planner = QueryPlanner::new(self.store.index(), fields, &self.selector, self.store.facet_schema());
        let query = planner.plan(&self.text, &self.drilldown)?;
        debug!(query = ?query, "planned query");

        let facets = &self.settings.facets;
        let range = &facets.range_dimension;
        let range_field = fields.numeric.contains_key(&range.dimension).then(|| range.dimension.clone());
        let collectors = (
            TopDocs::with_limit(self.options.max_hits.max(1)),
            facet_collector(facets),
            Count,
            RangeBucketCollector::new(range_field.clone()),
        );
        let (top_docs, facet_counts, matched, range_counts) =
            searcher.search(query.as_ref(), &collectors).map_err(|e| IndexError::storage("search", e))?;

        let mut facet_dimensions =
            flat_dimensions(&facet_counts, facets, self.settings.search.max_facet_labels, &self.base_path);
        if range_field.is_some() {
            facet_dimensions.extend(range_dimension(&range_counts, range, &self.base_path));
        }

        let assembler = ResultAssembler::new(
            &searcher,
            fields,
            &self.settings.search,
            self.preview.as_ref(),
            Arc::clone(&self.workers),
            self.runtime.clone(),
        );
        let pending = assembler.collect(query.as_ref(), top_docs, self.options.show_similar_documents)?;
        Ok(CollectedPage { pending, facet_dimensions, total_indexed_docs: searcher.num_docs(), matched })
    }
}

/// Settings checks that need knowledge of the index layout.
fn validate(settings: &Settings) -> Result<()> {
    settings.validate().map_err(|e| IndexError::Config(e.to_string()))?;
    let reserved = reserved_field_names();
    for name in &settings.facets.numeric_fields {
        if name.trim().is_empty() {
            return Err(IndexError::Config("facets.numeric_fields must not contain empty names".to_string()));
        }
        if reserved.iter().any(|r| r == name) {
            return Err(IndexError::Config(format!("numeric field '{name}' collides with a built-in field")));
        }
    }
    let range = &settings.facets.range_dimension.dimension;
    if !range.is_empty() && !settings.facets.numeric_fields.contains(range) {
        return Err(IndexError::Config(format!("range dimension '{range}' is not listed in facets.numeric_fields")));
    }
    Ok(())
}
