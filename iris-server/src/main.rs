use anyhow::Result;
use clap::Parser;
use iris_answer::GeminiGenerator;
use iris_embed::FastEmbedProvider;
use iris_retriever::{IrisConfig, Retriever};
use iris_server::{AppState, ServerConfig, run_server};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Serve multimodal search with grounded answers over HTTP.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (defaults to ./iris.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(short, long, default_value = "127.0.0.1:5000")]
    bind: SocketAddr,

    /// Vector index file, overriding the configuration
    #[arg(long)]
    index: Option<PathBuf>,

    /// Metadata file, overriding the configuration
    #[arg(long)]
    metadata: Option<PathBuf>,

    /// Results per search, overriding the configuration
    #[arg(short, long)]
    k: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let iris = IrisConfig::discover(args.config.as_deref())?;

    let mut config = ServerConfig {
        bind: args.bind,
        default_k: iris.retrieval.default_k,
        index: iris.index.clone(),
        ..ServerConfig::default()
    };
    if let Some(index) = args.index {
        config.index.index_path = index;
    }
    if let Some(metadata) = args.metadata {
        config.index.metadata_path = metadata;
    }
    if let Some(k) = args.k {
        config.default_k = k;
    }

    let generator = Arc::new(GeminiGenerator::from_env()?);
    let provider = Arc::new(FastEmbedProvider::create(iris.embedding.clone()).await?);
    let retriever = Arc::new(Retriever::initialize(provider, config.index.clone()));
    if retriever.is_ready() {
        info!("{}", retriever.status());
    } else {
        warn!(
            "No index loaded; searches return 503 until {} exists and /reload is called",
            config.index.index_path.display()
        );
    }

    let state = AppState::new(retriever, generator, config.default_k, config.upload_limit);
    run_server(config.bind, state).await
}
