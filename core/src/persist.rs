use crate::cache::content_digest;
use crate::index::Index;
use crate::{DocId, DocMeta, Term};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{create_dir_all, read, rename, File};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const FORMAT_VERSION: u32 = 2;

/// Written last. The digests tie `index.json` and `docs.bin` to this
/// snapshot, so files left over from an interrupted save are detected.
#[derive(Debug, Serialize, Deserialize)]
pub struct MetaFile {
    pub num_docs: u32,
    pub created_at: String,
    pub version: u32,
    pub index_sha1: String,
    pub docs_sha1: String,
}

/// Interop form of an index: ordinal → term → weight, plus corpus size.
#[derive(Debug, Serialize, Deserialize)]
pub struct PersistedIndex {
    pub corpus_size: usize,
    pub documents: BTreeMap<String, BTreeMap<Term, f64>>,
}

impl PersistedIndex {
    pub fn from_index(index: &Index) -> Self {
        let documents = index
            .documents()
            .map(|(id, vector, _)| (id.to_string(), vector.weights().clone()))
            .collect();
        Self { corpus_size: index.corpus_size(), documents }
    }

    pub fn into_index(self) -> Result<Index> {
        let mut documents = Vec::with_capacity(self.documents.len());
        for (key, weights) in self.documents {
            let id: DocId = key.parse().with_context(|| format!("invalid document ordinal {key:?}"))?;
            documents.push((id, weights));
        }
        Index::from_weights(self.corpus_size, documents)
    }
}

pub struct IndexPaths {
    pub root: PathBuf,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    pub fn index(&self) -> PathBuf { self.root.join("index.json") }
    pub fn docs(&self) -> PathBuf { self.root.join("docs.bin") }
    pub fn meta(&self) -> PathBuf { self.root.join("meta.json") }

    pub fn exists(&self) -> bool {
        self.index().is_file()
    }
}

fn hex_digest(bytes: &[u8]) -> String {
    content_digest(bytes).iter().map(|b| format!("{b:02x}")).collect()
}

/// Write to a sibling temp file, then rename over `path`.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    let mut f = File::create(&tmp).with_context(|| format!("creating {}", tmp.display()))?;
    f.write_all(bytes)?;
    f.sync_all()?;
    rename(&tmp, path).with_context(|| format!("renaming {} into place", tmp.display()))?;
    Ok(())
}

fn read_verified(path: &Path, expected_sha1: &str) -> Result<Vec<u8>> {
    let bytes = read(path).with_context(|| format!("opening {}", path.display()))?;
    anyhow::ensure!(
        hex_digest(&bytes) == expected_sha1,
        "{} does not belong to this snapshot",
        path.display()
    );
    Ok(bytes)
}

pub fn encode_index(index: &Index) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(&PersistedIndex::from_index(index))?)
}

pub fn decode_index(bytes: &[u8]) -> Result<Index> {
    let persisted: PersistedIndex = serde_json::from_slice(bytes).context("corrupt index snapshot")?;
    persisted.into_index().context("corrupt index snapshot")
}

pub fn save_index(paths: &IndexPaths, index: &Index) -> Result<()> {
    create_dir_all(&paths.root)?;
    write_atomic(&paths.index(), &encode_index(index)?)
}

pub fn load_index(paths: &IndexPaths) -> Result<Index> {
    let bytes = read(paths.index()).with_context(|| format!("opening {}", paths.index().display()))?;
    decode_index(&bytes).with_context(|| format!("loading {}", paths.index().display()))
}

pub fn load_meta(paths: &IndexPaths) -> Result<MetaFile> {
    let buf = read(paths.meta()).with_context(|| format!("opening {}", paths.meta().display()))?;
    let meta: MetaFile = serde_json::from_slice(&buf).context("corrupt meta file")?;
    Ok(meta)
}

/// Write index, document metadata and meta file. Each file is replaced
/// atomically and the meta file goes last.
pub fn save_snapshot(paths: &IndexPaths, index: &Index, docs: &[DocMeta]) -> Result<()> {
    create_dir_all(&paths.root)?;
    let index_bytes = encode_index(index)?;
    let docs_bytes = bincode::serialize(docs)?;
    write_atomic(&paths.index(), &index_bytes)?;
    write_atomic(&paths.docs(), &docs_bytes)?;
    let meta = MetaFile {
        num_docs: index.corpus_size() as u32,
        created_at: time::OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_default(),
        version: FORMAT_VERSION,
        index_sha1: hex_digest(&index_bytes),
        docs_sha1: hex_digest(&docs_bytes),
    };
    write_atomic(&paths.meta(), serde_json::to_string_pretty(&meta)?.as_bytes())?;
    tracing::info!(root = %paths.root.display(), num_docs = meta.num_docs, "persisted index snapshot");
    Ok(())
}

/// Load a full snapshot. Any unreadable or inconsistent piece is an error;
/// callers rebuild instead of serving a partial structure.
pub fn load_snapshot(paths: &IndexPaths) -> Result<(Index, Vec<DocMeta>, MetaFile)> {
    let meta = load_meta(paths)?;
    anyhow::ensure!(meta.version == FORMAT_VERSION, "unsupported index format version {}", meta.version);

    let docs_bytes = read_verified(&paths.docs(), &meta.docs_sha1)?;
    let docs: Vec<DocMeta> = bincode::deserialize(&docs_bytes).context("corrupt document metadata")?;
    anyhow::ensure!(
        docs.len() == meta.num_docs as usize,
        "snapshot parts disagree: {} docs, meta says {}",
        docs.len(),
        meta.num_docs
    );

    let index_bytes = read_verified(&paths.index(), &meta.index_sha1)?;
    let index = decode_index(&index_bytes)?;
    anyhow::ensure!(
        index.corpus_size() == docs.len(),
        "snapshot parts disagree: index has {}, {} docs",
        index.corpus_size(),
        docs.len()
    );
    Ok((index, docs, meta))
}
