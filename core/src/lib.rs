pub mod cache;
pub mod corpus;
pub mod index;
pub mod normalizer;
pub mod persist;
pub mod query;
pub mod rank;
pub mod rebuild;

use serde::{Deserialize, Serialize};

pub use corpus::{Corpus, Document};
pub use index::{DocumentVector, Index, IndexBuilder};
pub use normalizer::Normalizer;
pub use query::QueryVector;
pub use rank::SearchHit;
pub use rebuild::{IndexHandle, RebuildOutcome, RebuildState};

pub type DocId = u32;
pub type Term = String;

/// Display data for a document, kept outside the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocMeta {
    pub external_id: String,
    pub title: String,
    pub snippet: String,
}

/// Normalize text with the process-wide normalizer.
pub fn normalize(text: &str) -> Vec<Term> {
    normalizer::default_normalizer().normalize(text)
}

/// Build an index over `texts`; ordinals follow slice order.
pub fn build_index<S: AsRef<str>>(texts: &[S]) -> Index {
    let corpus = Corpus::from_texts(texts.iter().map(|t| t.as_ref().to_owned()));
    IndexBuilder::default().build(&corpus)
}

/// Rank every document of `index` against `query`, best first.
pub fn search(query: &str, index: &Index) -> Vec<SearchHit> {
    let q = query::vectorize(query, index);
    rank::rank(&q, index)
}
