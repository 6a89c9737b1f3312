use crate::corpus::Corpus;
use crate::normalizer::{default_normalizer, Normalizer};
use crate::{DocId, Term};
use anyhow::{ensure, Result};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Term → TF-IDF weight for one document. Only positive weights are stored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentVector {
    weights: BTreeMap<Term, f64>,
}

impl DocumentVector {
    pub fn get(&self, term: &str) -> Option<f64> {
        self.weights.get(term).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.weights.iter().map(|(t, w)| (t.as_str(), *w))
    }

    pub fn weights(&self) -> &BTreeMap<Term, f64> {
        &self.weights
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// L2 norm, summed in term order so the result is reproducible to the bit.
    pub fn norm(&self) -> f64 {
        self.weights.values().map(|w| w * w).sum::<f64>().sqrt()
    }
}

/// Immutable snapshot of a built corpus. A rebuild produces a new value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Index {
    document_vectors: Vec<DocumentVector>,
    document_norms: Vec<f64>,
    document_frequency: BTreeMap<Term, u32>,
    corpus_size: usize,
}

/// `ln(1 + N/df)`; zero for terms the corpus has never seen.
pub fn smoothed_idf(corpus_size: usize, df: u32) -> f64 {
    if df == 0 {
        return 0.0;
    }
    (corpus_size as f64 / df as f64).ln_1p()
}

impl Index {
    pub fn corpus_size(&self) -> usize {
        self.corpus_size
    }

    pub fn is_empty(&self) -> bool {
        self.corpus_size == 0
    }

    pub fn document_vector(&self, id: DocId) -> Option<&DocumentVector> {
        self.document_vectors.get(id as usize)
    }

    /// Cached L2 norm of a document vector; zero for unknown ids.
    pub fn document_norm(&self, id: DocId) -> f64 {
        self.document_norms.get(id as usize).copied().unwrap_or(0.0)
    }

    pub fn document_frequency(&self, term: &str) -> u32 {
        self.document_frequency.get(term).copied().unwrap_or(0)
    }

    pub fn idf(&self, term: &str) -> f64 {
        smoothed_idf(self.corpus_size, self.document_frequency(term))
    }

    pub fn vocabulary_size(&self) -> usize {
        self.document_frequency.len()
    }

    /// `(ordinal, vector, norm)` in ordinal order.
    pub fn documents(&self) -> impl Iterator<Item = (DocId, &DocumentVector, f64)> + '_ {
        self.document_vectors
            .iter()
            .zip(&self.document_norms)
            .enumerate()
            .map(|(i, (v, n))| (i as DocId, v, *n))
    }

    /// Rebuild an index from stored weights. Document frequency is the
    /// number of vectors holding a term and norms are recomputed, so a
    /// snapshot written from a built index reloads to an equal value.
    /// Every ordinal in `0..corpus_size` must have an entry (empty
    /// documents carry an empty map), so nothing is allocated beyond what
    /// the input actually holds.
    pub fn from_weights<I>(corpus_size: usize, documents: I) -> Result<Index>
    where
        I: IntoIterator<Item = (DocId, BTreeMap<Term, f64>)>,
    {
        ensure!(corpus_size <= DocId::MAX as usize, "corpus size {corpus_size} exceeds ordinal range");
        let mut slots: BTreeMap<DocId, DocumentVector> = BTreeMap::new();
        for (id, weights) in documents {
            ensure!((id as usize) < corpus_size, "document ordinal {id} outside corpus of {corpus_size}");
            for (term, w) in &weights {
                ensure!(w.is_finite() && *w > 0.0, "invalid weight {w} for term {term:?} in document {id}");
            }
            ensure!(slots.insert(id, DocumentVector { weights }).is_none(), "duplicate document ordinal {id}");
        }

        ensure!(
            slots.len() == corpus_size,
            "corpus size {corpus_size} but {} documents stored",
            slots.len()
        );

        // ordinals are unique and all below corpus_size, so they are exactly 0..corpus_size
        let document_vectors: Vec<DocumentVector> = slots.into_values().collect();
        let mut document_frequency: BTreeMap<Term, u32> = BTreeMap::new();
        for v in &document_vectors {
            for term in v.weights.keys() {
                *document_frequency.entry(term.clone()).or_insert(0) += 1;
            }
        }
        let document_norms = document_vectors.iter().map(DocumentVector::norm).collect();
        Ok(Index { document_vectors, document_norms, document_frequency, corpus_size })
    }
}

/// Builds an [`Index`] from a [`Corpus`].
pub struct IndexBuilder<'a> {
    normalizer: &'a Normalizer,
}

impl Default for IndexBuilder<'static> {
    fn default() -> Self {
        Self { normalizer: default_normalizer() }
    }
}

impl<'a> IndexBuilder<'a> {
    pub fn new(normalizer: &'a Normalizer) -> Self {
        Self { normalizer }
    }

    pub fn build(&self, corpus: &Corpus) -> Index {
        let start = std::time::Instant::now();
        let n = corpus.len();

        // Normalization is the expensive part and is independent per document;
        // collect keeps document order.
        let tokenized: Vec<Arc<[Term]>> =
            corpus.documents().par_iter().map(|d| self.normalizer.terms(&d.text)).collect();

        let mut counts: Vec<BTreeMap<&str, u32>> = Vec::with_capacity(n);
        let mut document_frequency: BTreeMap<Term, u32> = BTreeMap::new();
        for terms in &tokenized {
            let mut tf: BTreeMap<&str, u32> = BTreeMap::new();
            for term in terms.iter() {
                *tf.entry(term.as_str()).or_insert(0) += 1;
            }
            for term in tf.keys() {
                *document_frequency.entry((*term).to_owned()).or_insert(0) += 1;
            }
            counts.push(tf);
        }

        let mut document_vectors = Vec::with_capacity(n);
        let mut document_norms = Vec::with_capacity(n);
        for (terms, tf) in tokenized.iter().zip(&counts) {
            let token_count = terms.len();
            let mut weights = BTreeMap::new();
            if token_count > 0 {
                for (term, &count) in tf {
                    let df = document_frequency.get(*term).copied().unwrap_or(0);
                    let weight = (count as f64 / token_count as f64) * smoothed_idf(n, df);
                    if weight > 0.0 {
                        weights.insert((*term).to_owned(), weight);
                    }
                }
            }
            let vector = DocumentVector { weights };
            document_norms.push(vector.norm());
            document_vectors.push(vector);
        }

        tracing::info!(
            num_docs = n,
            num_terms = document_frequency.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "built tf-idf index"
        );
        Index { document_vectors, document_norms, document_frequency, corpus_size: n }
    }
}
