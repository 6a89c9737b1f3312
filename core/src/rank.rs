use crate::index::Index;
use crate::query::QueryVector;
use crate::DocId;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub doc_id: DocId,
    pub score: f64,
}

/// Cosine similarity of `query` against every document with a nonzero norm.
///
/// Only positive scores are kept. Output is ordered by score descending,
/// ties by ascending document id.
pub fn rank(query: &QueryVector, index: &Index) -> Vec<SearchHit> {
    if query.is_empty() || query.norm == 0.0 || index.is_empty() {
        return Vec::new();
    }

    let mut hits: Vec<SearchHit> = index
        .documents()
        .filter(|(_, _, norm)| *norm > 0.0)
        .filter_map(|(doc_id, vector, norm)| {
            let dot: f64 = query
                .weights
                .iter()
                .filter_map(|(term, qw)| vector.get(term).map(|dw| qw * dw))
                .sum();
            let score = (dot / (query.norm * norm)).min(1.0);
            (score > 0.0).then_some(SearchHit { doc_id, score })
        })
        .collect();

    hits.sort_by(compare_hits);
    tracing::debug!(candidates = index.corpus_size(), hits = hits.len(), "ranked query");
    hits
}

fn compare_hits(a: &SearchHit, b: &SearchHit) -> Ordering {
    b.score.total_cmp(&a.score).then_with(|| a.doc_id.cmp(&b.doc_id))
}
