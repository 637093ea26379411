use crate::error::{LexisError, Result};
use crate::handle::IndexHandle;
use crate::persist::{self, IndexPaths, MetaFile};
use crate::tokenizer::analyze_bytes;
use crate::{DocId, DocMeta, InvertedIndex};
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Discard existing content and assign ids from 0.
    Create,
    /// Extend the committed index; ids continue after the highest existing one.
    Append,
}

/// Exclusive write lock on an index location, held as a `write.lock` file.
#[derive(Debug)]
pub struct WriteLock {
    path: PathBuf,
}

impl WriteLock {
    pub fn acquire(paths: &IndexPaths) -> Result<Self> {
        fs::create_dir_all(&paths.root)?;
        let path = paths.lock();
        let mut f = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(LexisError::IndexLocked(paths.root.clone()));
            }
            Err(e) => return Err(LexisError::Io(e)),
        };
        writeln!(f, "{}", std::process::id())?;
        tracing::debug!(lock = %path.display(), "acquired write lock");
        Ok(Self { path })
    }
}

impl Drop for WriteLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!(lock = %self.path.display(), error = %e, "failed to release write lock");
        }
    }
}

/// Outcome of a batch ingestion. Failures are per document; the batch keeps going.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub indexed: Vec<(String, DocId)>,
    pub failed: Vec<(String, LexisError)>,
    pub cancelled: bool,
}

#[derive(Debug, Clone)]
pub struct CommitInfo {
    pub meta: MetaFile,
    pub added: usize,
}

/// Builds the next snapshot in isolation. Nothing is visible to readers until `commit`.
/// Dropping the writer without committing discards its work and releases the lock.
pub struct IndexWriter {
    handle: IndexHandle,
    index: InvertedIndex,
    /// Path of every document in `index`, for duplicate detection.
    by_path: HashMap<String, DocId>,
    next_doc_id: DocId,
    mode: OpenMode,
    added: usize,
    cancel: Option<Arc<AtomicBool>>,
    _lock: WriteLock,
}

impl IndexWriter {
    pub(crate) fn open(handle: IndexHandle, mode: OpenMode) -> Result<Self> {
        let lock = WriteLock::acquire(handle.paths())?;
        let index = match mode {
            OpenMode::Create => InvertedIndex::new(),
            OpenMode::Append => persist::load_index(handle.paths())?.0,
        };
        let by_path = index.docs.iter().map(|(id, meta)| (meta.path.clone(), *id)).collect();
        let next_doc_id = index.next_doc_id();
        tracing::info!(root = %handle.paths().root.display(), ?mode, next_doc_id, "opened index writer");
        Ok(Self { handle, index, by_path, next_doc_id, mode, added: 0, cancel: None, _lock: lock })
    }

    /// Checked between documents by `add_files`.
    pub fn set_cancel_flag(&mut self, flag: Arc<AtomicBool>) { self.cancel = Some(flag); }

    /// Ingest already-resolved document content. On error nothing from this document is kept.
    pub fn add_document(&mut self, path: &str, bytes: &[u8]) -> Result<DocId> {
        if self.by_path.contains_key(path) {
            return Err(LexisError::DuplicateDocument(path.to_string()));
        }
        let analyzer = self.handle.analyzer();
        let stream = analyze_bytes(analyzer.as_ref(), path, bytes)?;
        let tokens: Vec<(String, u32)> = stream.iter().collect();

        let doc_id = self.next_doc_id;
        self.next_doc_id += 1;
        let meta = DocMeta { path: path.to_string(), text_len: bytes.len() as u64, term_count: tokens.len() as u32 };
        self.index.add_document(doc_id, meta, tokens);
        self.by_path.insert(path.to_string(), doc_id);
        self.added += 1;
        tracing::debug!(doc_id, path, "indexed document");
        Ok(doc_id)
    }

    /// Read a file and ingest it. Read failures surface as `DocumentReadError`.
    pub fn add_file<P: AsRef<Path>>(&mut self, path: P) -> Result<DocId> {
        let path = path.as_ref();
        let name = path.to_string_lossy().into_owned();
        let bytes = fs::read(path).map_err(|source| LexisError::DocumentRead { path: name.clone(), source })?;
        self.add_document(&name, &bytes)
    }

    pub fn add_files<I, P>(&mut self, paths: I) -> IngestReport
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut report = IngestReport::default();
        for path in paths {
            if self.cancel.as_ref().is_some_and(|c| c.load(Ordering::Relaxed)) {
                tracing::warn!(indexed = report.indexed.len(), "ingestion cancelled");
                report.cancelled = true;
                break;
            }
            let name = path.as_ref().to_string_lossy().into_owned();
            match self.add_file(&path) {
                Ok(doc_id) => report.indexed.push((name, doc_id)),
                Err(e) => {
                    tracing::warn!(path = %name, kind = e.kind(), error = %e, "skipping document");
                    report.failed.push((name, e));
                }
            }
        }
        report
    }

    /// Persist the new snapshot and publish it to readers of the handle.
    pub fn commit(self) -> Result<CommitInfo> {
        let meta = persist::save_index(self.handle.paths(), &self.index)?;
        tracing::info!(mode = ?self.mode, added = self.added, num_docs = meta.num_docs, "writer committed");
        let added = self.added;
        self.handle.publish(self.index);
        Ok(CommitInfo { meta, added })
    }
}
