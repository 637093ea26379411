use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub type DocId = u32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocMeta {
    /// Source path, unique per document.
    pub path: String,
    /// Length of the raw text in bytes.
    pub text_len: u64,
    /// Number of terms produced by the analyzer.
    pub term_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub doc_id: DocId,
    pub term_freq: u32,
    pub positions: Vec<u32>, // ascending
}

/// Postings sorted by strictly increasing doc_id.
pub type PostingsList = Vec<Posting>;

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvertedIndex {
    pub postings: HashMap<String, PostingsList>,
    pub docs: HashMap<DocId, DocMeta>,
    pub num_docs: u32,
}

impl InvertedIndex {
    pub fn new() -> Self { Self::default() }

    /// Register a document and index its (term, position) pairs.
    pub fn add_document<I>(&mut self, doc_id: DocId, meta: DocMeta, tokens: I)
    where
        I: IntoIterator<Item = (String, u32)>,
    {
        if self.docs.insert(doc_id, meta).is_none() {
            self.num_docs += 1;
        }
        for (term, pos) in tokens {
            self.add_posting(&term, doc_id, pos);
        }
    }

    /// Record one occurrence of `term` at `position` in `doc_id`. The document must already be registered.
    pub fn add_posting(&mut self, term: &str, doc_id: DocId, position: u32) {
        let list = self.postings.entry(term.to_string()).or_default();
        match list.binary_search_by_key(&doc_id, |p| p.doc_id) {
            Ok(i) => {
                let posting = &mut list[i];
                if let Err(at) = posting.positions.binary_search(&position) {
                    posting.positions.insert(at, position);
                    posting.term_freq += 1;
                }
            }
            Err(i) => list.insert(i, Posting { doc_id, term_freq: 1, positions: vec![position] }),
        }
    }

    /// Drop every posting of `doc_id`; terms left without postings are removed.
    pub fn remove_document(&mut self, doc_id: DocId) {
        if self.docs.remove(&doc_id).is_none() {
            return;
        }
        self.num_docs -= 1;
        self.postings.retain(|_, list| {
            if let Ok(i) = list.binary_search_by_key(&doc_id, |p| p.doc_id) {
                list.remove(i);
            }
            !list.is_empty()
        });
    }

    /// Exact lookup; `term` must already be normalized.
    pub fn lookup(&self, term: &str) -> Option<&PostingsList> { self.postings.get(term) }

    pub fn posting(&self, term: &str, doc_id: DocId) -> Option<&Posting> {
        let list = self.lookup(term)?;
        list.binary_search_by_key(&doc_id, |p| p.doc_id).ok().map(|i| &list[i])
    }

    pub fn term_frequency(&self, term: &str, doc_id: DocId) -> u32 {
        self.posting(term, doc_id).map_or(0, |p| p.term_freq)
    }

    pub fn document_count(&self) -> u32 { self.num_docs }

    pub fn num_terms(&self) -> usize { self.postings.len() }

    pub fn doc(&self, doc_id: DocId) -> Option<&DocMeta> { self.docs.get(&doc_id) }

    /// Next id to assign: max existing id + 1, or 0 for an empty index.
    pub fn next_doc_id(&self) -> DocId {
        self.docs.keys().max().map_or(0, |max| max + 1)
    }

    /// Structural check run after loading from storage.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.num_docs as usize != self.docs.len() {
            return Err(format!("num_docs is {} but {} documents are stored", self.num_docs, self.docs.len()));
        }
        for (term, list) in &self.postings {
            if list.is_empty() {
                return Err(format!("term {term:?} has an empty postings list"));
            }
            let mut prev: Option<DocId> = None;
            for p in list {
                if prev.is_some_and(|prev| prev >= p.doc_id) {
                    return Err(format!("postings for {term:?} are not strictly increasing at doc {}", p.doc_id));
                }
                if !self.docs.contains_key(&p.doc_id) {
                    return Err(format!("postings for {term:?} reference unknown doc {}", p.doc_id));
                }
                if p.term_freq == 0 || p.term_freq as usize != p.positions.len() {
                    return Err(format!("posting ({term:?}, {}) has frequency {} with {} positions", p.doc_id, p.term_freq, p.positions.len()));
                }
                if p.positions.windows(2).any(|w| w[0] >= w[1]) {
                    return Err(format!("positions of ({term:?}, {}) are not increasing", p.doc_id));
                }
                prev = Some(p.doc_id);
            }
        }
        Ok(())
    }
}
