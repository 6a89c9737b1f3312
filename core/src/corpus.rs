use crate::{DocId, DocMeta};
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

const SNIPPET_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub id: DocId,
    pub text: String,
}

/// Documents in load order; `documents[i].id == i`.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    documents: Vec<Document>,
}

impl Corpus {
    pub fn from_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let documents = texts
            .into_iter()
            .enumerate()
            .map(|(i, text)| Document { id: i as DocId, text: text.into() })
            .collect();
        Self { documents }
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

pub struct LoadedCorpus {
    pub corpus: Corpus,
    pub docs: Vec<DocMeta>,
}

/// Load every `*.txt` file directly inside `dir`, ordered by file name.
pub fn load_dir<P: AsRef<Path>>(dir: P) -> Result<LoadedCorpus> {
    let dir = dir.as_ref();
    let start = std::time::Instant::now();
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.with_context(|| format!("reading corpus directory {}", dir.display()))?;
        let p = entry.path();
        if p.is_file() && p.extension().and_then(|s| s.to_str()) == Some("txt") {
            files.push(p.to_path_buf());
        }
    }

    let mut texts = Vec::with_capacity(files.len());
    let mut docs = Vec::with_capacity(files.len());
    for file in files {
        let bytes = fs::read(&file).with_context(|| format!("reading {}", file.display()))?;
        let text = match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(file = %file.display(), "invalid utf-8, replacing bad bytes");
                String::from_utf8_lossy(e.as_bytes()).into_owned()
            }
        };
        let external_id = file.file_name().and_then(|s| s.to_str()).unwrap_or_default().to_string();
        let title = file.file_stem().and_then(|s| s.to_str()).unwrap_or_default().to_string();
        let snippet = text.chars().take(SNIPPET_CHARS).collect();
        docs.push(DocMeta { external_id, title, snippet });
        texts.push(text);
    }

    tracing::info!(dir = %dir.display(), num_docs = texts.len(), elapsed_ms = start.elapsed().as_millis() as u64, "loaded corpus");
    Ok(LoadedCorpus { corpus: Corpus::from_texts(texts), docs })
}
