use anyhow::Result;
use clap::Parser;
use server::{build_app, spawn_rebuild_scheduler, AppState, ServerConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
struct Args {
    /// Index directory path
    #[arg(long, default_value = "./index")]
    index: PathBuf,
    /// Directory of .txt documents to index
    #[arg(long, default_value = "./documents")]
    corpus: PathBuf,
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 3000)]
    port: u16,
    /// Seconds between scheduled index rebuilds
    #[arg(long, default_value_t = 3600)]
    rebuild_interval_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();
    let config = ServerConfig {
        index_dir: args.index,
        corpus_dir: args.corpus,
        admin_token: std::env::var("ADMIN_TOKEN").ok(),
    };

    let state = tokio::task::spawn_blocking(move || AppState::bootstrap(config)).await??;
    let period = Duration::from_secs(args.rebuild_interval_secs.max(1));
    spawn_rebuild_scheduler(state.clone(), period);

    let app = build_app(state);
    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, rebuild_every_s = period.as_secs(), "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
