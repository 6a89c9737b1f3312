use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tfidf_core::corpus::load_dir;
use tfidf_core::persist::{load_snapshot, save_snapshot, IndexPaths};
use tfidf_core::{search, IndexBuilder};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Build and query a TF-IDF document index", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the index from a directory of .txt files
    Build {
        /// Corpus directory
        #[arg(long)]
        input: String,
        /// Output index directory
        #[arg(long)]
        output: String,
    },
    /// Rank documents of a persisted index against a query
    Search {
        /// Index directory
        #[arg(long, default_value = "./index")]
        index: String,
        /// Free-text query
        #[arg(long)]
        query: String,
        /// Maximum number of hits to print
        #[arg(long)]
        k: Option<usize>,
    },
}

#[derive(Serialize)]
struct Hit<'a> {
    doc_id: u32,
    score: f64,
    title: &'a str,
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { input, output } => build(&input, &output),
        Commands::Search { index, query, k } => run_search(&index, &query, k),
    }
}

fn build(input: &str, output: &str) -> Result<()> {
    let loaded = load_dir(input).with_context(|| format!("loading corpus from {input}"))?;
    let index = IndexBuilder::default().build(&loaded.corpus);
    // raw text is not needed past this point
    drop(loaded.corpus);
    save_snapshot(&IndexPaths::new(output), &index, &loaded.docs)?;
    tracing::info!(output, num_docs = index.corpus_size(), num_terms = index.vocabulary_size(), "index build complete");
    Ok(())
}

fn run_search(index_dir: &str, query: &str, k: Option<usize>) -> Result<()> {
    let (index, docs, _meta) = load_snapshot(&IndexPaths::new(index_dir))
        .with_context(|| format!("loading index from {index_dir}; run `indexer build` first"))?;
    let hits = search(query, &index);
    let total_hits = hits.len();
    let shown: Vec<Hit> = hits
        .iter()
        .take(k.unwrap_or(usize::MAX))
        .map(|h| Hit {
            doc_id: h.doc_id,
            score: h.score,
            title: docs.get(h.doc_id as usize).map(|d| d.title.as_str()).unwrap_or_default(),
        })
        .collect();
    tracing::debug!(query, total_hits, "search complete");
    println!("{}", serde_json::to_string_pretty(&serde_json::json!({ "query": query, "total_hits": total_hits, "results": shown }))?);
    Ok(())
}
