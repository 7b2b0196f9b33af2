//! On-disk index, single writer, manually reloaded reader.
//!
//! Writes become durable on `commit` and visible on `refresh`. Tantivy only
//! exposes committed segments, so `refresh` commits pending operations first.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tantivy::collector::{Count, TopDocs};
use tantivy::directory::MmapDirectory;
use tantivy::query::TermQuery;
use tantivy::schema::{IndexRecordOption, Value};
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, Searcher, TantivyDocument, Term};
use tracing::{debug, error, info};

use localdb_core::error::{IndexError, Result};

use crate::document::IndexedDocument;
use crate::facet_schema::FacetSchema;
use crate::tantivy_utils::{build_schema, register_tokenizers, IndexFields};

/// Upper bound on stored documents fetched for a single path.
const PATH_LOOKUP_LIMIT: usize = 100;

pub struct IndexStore {
    dir: PathBuf,
    index: Index,
    fields: IndexFields,
    reader: IndexReader,
    writer: Mutex<Option<IndexWriter>>,
    dirty: AtomicBool,
    failure: Mutex<Option<String>>,
    facet_schema: Arc<FacetSchema>,
}

impl IndexStore {
    pub fn open(dir: &Path, numeric_fields: &[String], writer_heap_bytes: usize) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let directory = MmapDirectory::open(dir).map_err(|e| IndexError::storage("open", e))?;
        let index = Index::open_or_create(directory, build_schema(numeric_fields))
            .map_err(|e| IndexError::storage("open", e))?;
        register_tokenizers(&index);

        let fields =
            IndexFields::from_schema(&index.schema(), numeric_fields).map_err(|e| IndexError::storage("open", e))?;
        let reader: IndexReader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .map_err(|e| IndexError::storage("open", e))?;
        let writer: IndexWriter = index.writer(writer_heap_bytes).map_err(|e| IndexError::storage("open", e))?;
        let facet_schema = Arc::new(FacetSchema::load(dir)?);

        info!(
            dir = %dir.display(),
            docs = reader.searcher().num_docs(),
            facet_dimensions = facet_schema.dimensions().len(),
            "index opened"
        );
        Ok(Self {
            dir: dir.to_path_buf(),
            index,
            fields,
            reader,
            writer: Mutex::new(Some(writer)),
            dirty: AtomicBool::new(false),
            failure: Mutex::new(None),
            facet_schema,
        })
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    pub fn fields(&self) -> &IndexFields {
        &self.fields
    }

    pub fn facet_schema(&self) -> &Arc<FacetSchema> {
        &self.facet_schema
    }

    /// Replace whatever is stored under the document's path. Delete and add
    /// happen under one writer lock, so a commit never sees half of it.
    pub fn upsert(&self, doc: IndexedDocument) -> Result<()> {
        let path_term = Term::from_field_text(self.fields.path, &doc.path);
        let tantivy_doc = doc.into_tantivy(&self.fields);
        let mut guard = self.writer()?;
        let writer = guard.as_mut().ok_or(IndexError::Closed)?;
        writer.delete_term(path_term);
        writer.add_document(tantivy_doc).map_err(|e| IndexError::storage("add_document", e))?;
        self.dirty.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub fn delete_by_path(&self, path: &str) -> Result<()> {
        self.delete_term(Term::from_field_text(self.fields.path, path))
    }

    pub fn delete_by_unique_id(&self, unique_id: &str) -> Result<()> {
        self.delete_term(Term::from_field_text(self.fields.unique_id, unique_id))
    }

    fn delete_term(&self, term: Term) -> Result<()> {
        let mut guard = self.writer()?;
        let writer = guard.as_mut().ok_or(IndexError::Closed)?;
        writer.delete_term(term);
        self.dirty.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Commit pending operations. Returns whether anything was committed.
    /// A failed commit poisons the store.
    pub fn commit(&self) -> Result<bool> {
        let mut guard = self.writer()?;
        if !self.dirty.load(Ordering::SeqCst) {
            return Ok(false);
        }
        let writer = guard.as_mut().ok_or(IndexError::Closed)?;
        match writer.commit() {
            Ok(opstamp) => {
                self.dirty.store(false, Ordering::SeqCst);
                debug!(opstamp, "committed");
            }
            Err(e) => return Err(self.fail("commit", e)),
        }
        drop(guard);
        self.facet_schema.save_if_dirty(&self.dir)?;
        Ok(true)
    }

    /// Make every write issued so far visible to new searchers.
    pub fn refresh(&self) -> Result<()> {
        self.check_failure()?;
        if self.dirty.load(Ordering::SeqCst) {
            self.commit()?;
        }
        self.reader.reload().map_err(|e| self.fail("reload", e))
    }

    /// Current snapshot. Never changes until the next `refresh`.
    pub fn searcher(&self) -> Searcher {
        self.reader.searcher()
    }

    pub fn exists_by_path(&self, path: &str) -> Result<bool> {
        let query = self.path_query(path);
        let count = self.searcher().search(&query, &Count).map_err(|e| IndexError::storage("search", e))?;
        Ok(count > 0)
    }

    /// Stored timestamp of the single document at `path`. `None` when there
    /// is no document or more than one.
    pub fn last_modified_by_path(&self, path: &str) -> Result<Option<i64>> {
        let searcher = self.searcher();
        let query = self.path_query(path);
        let hits = searcher
            .search(&query, &TopDocs::with_limit(PATH_LOOKUP_LIMIT))
            .map_err(|e| IndexError::storage("search", e))?;
        if hits.len() != 1 {
            debug!(path, matches = hits.len(), "path lookup is not unique");
            return Ok(None);
        }
        let doc: TantivyDocument = searcher.doc(hits[0].1).map_err(|e| IndexError::storage("fetch", e))?;
        Ok(doc.get_first(self.fields.last_modified).and_then(|v| v.as_i64()))
    }

    /// Number of live documents in the current snapshot.
    pub fn num_docs(&self) -> u64 {
        self.searcher().num_docs()
    }

    /// Final commit, wait for merges and drop the writer. Later writes get
    /// `IndexError::Closed`; open snapshots keep working.
    pub fn close(&self) -> Result<()> {
        self.check_failure()?;
        let mut guard = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        let Some(mut writer) = guard.take() else {
            return Ok(());
        };
        if self.dirty.swap(false, Ordering::SeqCst) {
            if let Err(e) = writer.commit() {
                return Err(self.fail("commit", e));
            }
        }
        writer.wait_merging_threads().map_err(|e| self.fail("close", e))?;
        drop(guard);
        self.facet_schema.save_if_dirty(&self.dir)?;
        info!(dir = %self.dir.display(), "index closed");
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.writer.lock().unwrap_or_else(|e| e.into_inner()).is_none()
    }

    fn path_query(&self, path: &str) -> TermQuery {
        TermQuery::new(Term::from_field_text(self.fields.path, path), IndexRecordOption::Basic)
    }

    fn writer(&self) -> Result<MutexGuard<'_, Option<IndexWriter>>> {
        self.check_failure()?;
        Ok(self.writer.lock().unwrap_or_else(|e| e.into_inner()))
    }

    fn check_failure(&self) -> Result<()> {
        match self.failure.lock().unwrap_or_else(|e| e.into_inner()).as_ref() {
            Some(message) => Err(IndexError::Storage { operation: "write", message: message.clone() }),
            None => Ok(()),
        }
    }

    pub(crate) fn fail(&self, operation: &'static str, err: impl std::fmt::Display) -> IndexError {
        let err = IndexError::storage(operation, err);
        error!(error = %err, "index storage failure, refusing further writes");
        *self.failure.lock().unwrap_or_else(|e| e.into_inner()) = Some(err.to_string());
        err
    }
}
