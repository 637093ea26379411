use crate::error::Result;
use crate::persist::{self, IndexPaths};
use crate::query;
use crate::search::{SearchResults, Searcher};
use crate::tokenizer::Analyzer;
use crate::writer::{IndexWriter, OpenMode};
use crate::{DocId, InvertedIndex};
use parking_lot::RwLock;
use std::path::Path;
use std::sync::Arc;

struct Inner {
    paths: IndexPaths,
    analyzer: Arc<dyn Analyzer>,
    snapshot: RwLock<Arc<InvertedIndex>>,
}

/// Explicit handle on one index location. Cheap to clone; every clone sees the same
/// published snapshot. Readers never block on a writer except for the pointer swap at commit.
#[derive(Clone)]
pub struct IndexHandle {
    inner: Arc<Inner>,
}

impl IndexHandle {
    /// Handle with an empty snapshot, without touching storage. Use before a CREATE.
    pub fn new<P: AsRef<Path>>(root: P, analyzer: Arc<dyn Analyzer>) -> Self {
        Self::with_snapshot(IndexPaths::new(root), analyzer, InvertedIndex::new())
    }

    /// Load the committed index at `root`.
    pub fn open<P: AsRef<Path>>(root: P, analyzer: Arc<dyn Analyzer>) -> Result<Self> {
        let paths = IndexPaths::new(root);
        let (index, _) = persist::load_index(&paths)?;
        Ok(Self::with_snapshot(paths, analyzer, index))
    }

    fn with_snapshot(paths: IndexPaths, analyzer: Arc<dyn Analyzer>, index: InvertedIndex) -> Self {
        let snapshot = RwLock::new(Arc::new(index));
        Self { inner: Arc::new(Inner { paths, analyzer, snapshot }) }
    }

    pub fn paths(&self) -> &IndexPaths { &self.inner.paths }

    pub fn analyzer(&self) -> Arc<dyn Analyzer> { Arc::clone(&self.inner.analyzer) }

    /// The latest published snapshot. Stays valid and unchanged while later commits happen.
    pub fn snapshot(&self) -> Arc<InvertedIndex> { self.inner.snapshot.read().clone() }

    pub(crate) fn publish(&self, index: InvertedIndex) {
        *self.inner.snapshot.write() = Arc::new(index);
    }

    /// Open the exclusive writer for this location. Fails with `IndexLocked` if one is already open.
    pub fn writer(&self, mode: OpenMode) -> Result<IndexWriter> { IndexWriter::open(self.clone(), mode) }

    pub fn create(&self) -> Result<IndexWriter> { self.writer(OpenMode::Create) }

    pub fn append(&self) -> Result<IndexWriter> { self.writer(OpenMode::Append) }

    pub fn document_count(&self) -> u32 { self.snapshot().document_count() }

    /// Parse and evaluate `query` against the current snapshot.
    pub fn search(&self, query: &str, max_hits: usize) -> Result<SearchResults> {
        let parsed = query::parse(query)?;
        let snapshot = self.snapshot();
        let searcher = Searcher::new(&snapshot, self.inner.analyzer.as_ref());
        Ok(searcher.search(&parsed, max_hits))
    }

    pub fn exact_term_frequency(&self, term: &str, doc_id: DocId) -> u32 {
        let snapshot = self.snapshot();
        Searcher::new(&snapshot, self.inner.analyzer.as_ref()).exact_term_frequency(term, doc_id)
    }
}
