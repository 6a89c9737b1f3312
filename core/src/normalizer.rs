use crate::cache::{content_key, BoundedCache, CacheStats, DEFAULT_CAPACITY};
use crate::Term;
use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use std::borrow::Cow;
use std::collections::HashSet;
use std::sync::Arc;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref WORD: Regex = Regex::new(r"\w+").expect("valid regex");
    static ref DEFAULT_NORMALIZER: Normalizer = Normalizer::default();
    static ref STOPWORDS: HashSet<&'static str> = {
        let words: &[&str] = &[
            "a","about","above","after","again","against","all","am","an","and","any","are","aren","as","at",
            "be","because","been","before","being","below","between","both","but","by",
            "can","cannot","could","couldn",
            "d","did","didn","do","does","doesn","doing","don","down","during",
            "each","few","for","from","further",
            "had","hadn","has","hasn","have","haven","having","he","her","here","hers","herself","him","himself","his","how",
            "i","if","in","into","is","isn","it","its","itself",
            "let","ll","m","me","more","most","mustn","my","myself",
            "no","nor","not","of","off","on","once","only","or","other","ought","our","ours","ourselves","out","over","own",
            "re","s","same","she","should","shouldn","so","some","such",
            "t","than","that","the","their","theirs","them","themselves","then","there","these","they","this","those","through","to","too",
            "under","until","up","ve","very",
            "was","wasn","we","were","weren","what","when","where","which","while","who","whom","why","will","with","won","would","wouldn",
            "you","your","yours","yourself","yourselves"
        ];
        words.iter().copied().collect()
    };
}

pub fn is_stopword(token: &str) -> bool {
    STOPWORDS.contains(token)
}

/// Language-level normalization applied to each surviving token, folding
/// lexical variants (plural nouns, inflected verbs) onto one term.
pub trait Lemmatizer: Send + Sync {
    fn lemmatize<'a>(&self, token: &'a str) -> Cow<'a, str>;
}

/// English Snowball stemmer.
pub struct StemLemmatizer {
    stemmer: Stemmer,
}

impl Default for StemLemmatizer {
    fn default() -> Self {
        Self { stemmer: Stemmer::create(Algorithm::English) }
    }
}

impl Lemmatizer for StemLemmatizer {
    fn lemmatize<'a>(&self, token: &'a str) -> Cow<'a, str> {
        self.stemmer.stem(token)
    }
}

/// Leaves tokens untouched.
pub struct IdentityLemmatizer;

impl Lemmatizer for IdentityLemmatizer {
    fn lemmatize<'a>(&self, token: &'a str) -> Cow<'a, str> {
        Cow::Borrowed(token)
    }
}

/// Turns raw text into terms: NFKC, lowercase, split on non-word
/// characters, drop stopwords, lemmatize.
///
/// Output depends only on the input text, so the memo cache can be shared
/// freely between queries and rebuilds.
pub struct Normalizer {
    lemmatizer: Box<dyn Lemmatizer>,
    cache: BoundedCache<Arc<[Term]>>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(Box::new(StemLemmatizer::default()), DEFAULT_CAPACITY)
    }
}

impl Normalizer {
    pub fn new(lemmatizer: Box<dyn Lemmatizer>, cache_capacity: usize) -> Self {
        Self { lemmatizer, cache: BoundedCache::new(cache_capacity) }
    }

    pub fn normalize(&self, text: &str) -> Vec<Term> {
        self.terms(text).to_vec()
    }

    /// Shared form of [`Normalizer::normalize`]; a cache hit costs one Arc clone.
    pub fn terms(&self, text: &str) -> Arc<[Term]> {
        if text.trim().is_empty() {
            return Arc::from(Vec::new());
        }
        self.cache.get_or_insert_with(content_key(text), || Arc::from(self.analyze(text)))
    }

    fn analyze(&self, text: &str) -> Vec<Term> {
        let lowered = text.nfkc().collect::<String>().to_lowercase();
        WORD.find_iter(&lowered)
            .map(|m| m.as_str())
            .filter(|token| !token.is_empty() && !is_stopword(token))
            .map(|token| self.lemmatizer.lemmatize(token).into_owned())
            .filter(|term| !term.is_empty())
            .collect()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

/// The process-wide normalizer behind [`crate::normalize`].
pub fn default_normalizer() -> &'static Normalizer {
    &DEFAULT_NORMALIZER
}
