use crate::query::Query;
use crate::tokenizer::{analyze, Analyzer};
use crate::{DocId, InvertedIndex};
use serde::Serialize;
use std::collections::BTreeSet;

/// Hit cap used when the caller does not supply one.
pub const DEFAULT_MAX_HITS: usize = 150;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hit {
    pub doc_id: DocId,
    pub path: String,
    pub score: f32,
    /// Exact frequency of the query term, present only for single-term queries.
    pub frequency: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResults {
    pub total_hits: usize,
    pub hits: Vec<Hit>,
}

/// Evaluates parsed queries against one immutable index snapshot.
pub struct Searcher<'a> {
    index: &'a InvertedIndex,
    analyzer: &'a dyn Analyzer,
}

impl<'a> Searcher<'a> {
    pub fn new(index: &'a InvertedIndex, analyzer: &'a dyn Analyzer) -> Self {
        Self { index, analyzer }
    }

    fn analyze(&self, text: &str) -> Vec<(String, u32)> {
        analyze(self.analyzer, text).iter().collect()
    }

    /// Documents matching `query`, ascending by id. A query made only of dropped words matches nothing.
    pub fn matching_docs(&self, query: &Query) -> BTreeSet<DocId> {
        self.constrain(query).unwrap_or_default()
    }

    /// `None` when every word of the clause was dropped by the analyzer: the clause imposes no constraint.
    fn constrain(&self, query: &Query) -> Option<BTreeSet<DocId>> {
        match query {
            Query::Term(t) => self.sequence_docs(&self.analyze(t)),
            Query::Phrase(words) => self.sequence_docs(&self.analyze(&words.join(" "))),
            Query::And(l, r) => match self.constrain(l) {
                Some(left) if left.is_empty() => Some(left),
                Some(left) => match self.constrain(r) {
                    Some(right) => Some(left.intersection(&right).copied().collect()),
                    None => Some(left),
                },
                None => self.constrain(r),
            },
            Query::Or(l, r) => match (self.constrain(l), self.constrain(r)) {
                (Some(mut left), Some(right)) => {
                    left.extend(right);
                    Some(left)
                }
                (left, right) => left.or(right),
            },
        }
    }

    /// A single analyzed term matches its postings; several must appear at the same relative offsets.
    fn sequence_docs(&self, tokens: &[(String, u32)]) -> Option<BTreeSet<DocId>> {
        if tokens.is_empty() {
            return None;
        }
        let lists: Option<Vec<_>> = tokens.iter().map(|(t, _)| self.index.lookup(t)).collect();
        let Some(lists) = lists else { return Some(BTreeSet::new()) };
        let driver = lists.iter().min_by_key(|l| l.len())?;
        if tokens.len() == 1 {
            return Some(driver.iter().map(|p| p.doc_id).collect());
        }

        let base = tokens[0].1;
        let docs: BTreeSet<DocId> = driver
            .iter()
            .map(|p| p.doc_id)
            .filter(|&doc| {
                let postings: Option<Vec<_>> = tokens.iter().map(|(t, _)| self.index.posting(t, doc)).collect();
                let Some(postings) = postings else { return false };
                postings[0].positions.iter().any(|&start| {
                    tokens.iter().zip(&postings).all(|((_, qpos), posting)| {
                        posting.positions.binary_search(&(start + (qpos - base))).is_ok()
                    })
                })
            })
            .collect();
        Some(docs)
    }

    /// Distinct analyzed terms of every leaf, in first-seen order.
    pub fn scoring_terms(&self, query: &Query) -> Vec<String> {
        let mut terms: Vec<String> = Vec::new();
        for raw in query.terms() {
            for (t, _) in self.analyze(raw) {
                if !terms.contains(&t) {
                    terms.push(t);
                }
            }
        }
        terms
    }

    /// Sum of 1 + ln(tf) over the query terms present in the document.
    pub fn score(&self, doc_id: DocId, terms: &[String]) -> f32 {
        terms
            .iter()
            .map(|t| self.index.term_frequency(t, doc_id))
            .filter(|&tf| tf > 0)
            .map(|tf| 1.0 + (tf as f32).ln())
            .sum()
    }

    /// The index term of a query whose leaves reduce to exactly one distinct term.
    pub fn single_term(&self, query: &Query) -> Option<String> {
        let mut terms = self.scoring_terms(query);
        if terms.len() == 1 { terms.pop() } else { None }
    }

    /// Rank matches by score descending, then doc id ascending, keeping at most `max_hits`.
    /// `total_hits` always counts every match, so a cap of 0 only reports the count.
    pub fn search(&self, query: &Query, max_hits: usize) -> SearchResults {
        let terms = self.scoring_terms(query);
        let mut scored: Vec<(DocId, f32)> = self
            .matching_docs(query)
            .into_iter()
            .map(|doc| (doc, self.score(doc, &terms)))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        let total_hits = scored.len();
        scored.truncate(max_hits);

        let single = self.single_term(query);
        let hits = scored
            .into_iter()
            .filter_map(|(doc_id, score)| {
                let meta = self.index.doc(doc_id)?;
                let frequency = single.as_deref().map(|t| self.index.term_frequency(t, doc_id));
                Some(Hit { doc_id, path: meta.path.clone(), score, frequency })
            })
            .collect();
        tracing::debug!(query = %query, total_hits, "evaluated query");
        SearchResults { total_hits, hits }
    }

    /// Frequency of a raw (un-normalized) term in a document; 0 when absent.
    pub fn exact_term_frequency(&self, term: &str, doc_id: DocId) -> u32 {
        let mut tokens = self.analyze(term);
        match (tokens.pop(), tokens.is_empty()) {
            (Some((t, _)), true) => self.index.term_frequency(&t, doc_id),
            _ => 0,
        }
    }
}
