use crate::index::Index;
use crate::normalizer::{default_normalizer, Normalizer};
use crate::Term;
use std::collections::BTreeMap;

/// Weighted query terms and their L2 norm.
///
/// Terms the index has never seen carry zero IDF and are left out, so a
/// query of only unknown terms has an empty vector and a zero norm.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryVector {
    pub weights: BTreeMap<Term, f64>,
    pub norm: f64,
}

impl QueryVector {
    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}

pub fn vectorize(query: &str, index: &Index) -> QueryVector {
    vectorize_with(default_normalizer(), query, index)
}

/// Raw query term counts times the index's IDF. No length normalization:
/// the cosine denominator already removes query length.
pub fn vectorize_with(normalizer: &Normalizer, query: &str, index: &Index) -> QueryVector {
    let terms = normalizer.terms(query);
    let mut counts: BTreeMap<&str, u32> = BTreeMap::new();
    for term in terms.iter() {
        *counts.entry(term.as_str()).or_insert(0) += 1;
    }

    let mut weights = BTreeMap::new();
    let mut sum_sq = 0.0;
    for (term, count) in counts {
        let weight = count as f64 * index.idf(term);
        if weight > 0.0 {
            sum_sq += weight * weight;
            weights.insert(term.to_owned(), weight);
        }
    }
    QueryVector { weights, norm: sum_sq.sqrt() }
}
