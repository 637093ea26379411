pub mod error;
pub mod handle;
pub mod index;
pub mod persist;
pub mod query;
pub mod search;
pub mod tokenizer;
pub mod writer;

pub use error::{LexisError, Result};
pub use handle::IndexHandle;
pub use index::{DocId, DocMeta, InvertedIndex, Posting, PostingsList};
pub use query::Query;
pub use search::{Hit, SearchResults, Searcher, DEFAULT_MAX_HITS};
pub use tokenizer::{Analyzer, SpanishAnalyzer};
pub use writer::{CommitInfo, IndexWriter, IngestReport, OpenMode};
