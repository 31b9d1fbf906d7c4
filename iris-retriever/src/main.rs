use clap::{Parser, Subcommand};
use iris_embed::FastEmbedProvider;
use iris_retriever::{IndexBuilder, IrisConfig, QueryResult, Retriever};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Build and query an iris image-caption index.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (defaults to ./iris.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Vector index file, overriding the configuration
    #[arg(long)]
    index: Option<PathBuf>,

    /// Metadata file, overriding the configuration
    #[arg(long)]
    metadata: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build the index from caption annotations
    Build {
        /// Delimited annotation file
        #[arg(long)]
        annotations: Option<PathBuf>,
        /// Directory containing the images
        #[arg(long)]
        asset_root: Option<PathBuf>,
        /// Maximum number of distinct images
        #[arg(long, conflicts_with = "no_limit")]
        limit: Option<usize>,
        /// Index every image in the annotations
        #[arg(long)]
        no_limit: bool,
    },
    /// Find captions nearest to a text or image query
    Search {
        /// Text query
        #[arg(long, conflicts_with = "image", required_unless_present = "image")]
        text: Option<String>,
        /// Image file to query with
        #[arg(long)]
        image: Option<PathBuf>,
        /// Number of results
        #[arg(short, long)]
        k: Option<usize>,
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
    /// Show what the index files contain
    Status {
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
}

#[derive(Debug, Clone, PartialEq)]
enum OutputFormat {
    Summary,
    Full,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "summary" => Ok(OutputFormat::Summary),
            "full" => Ok(OutputFormat::Full),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Invalid format: {s}")),
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = IrisConfig::discover(args.config.as_deref())?;
    if let Some(index) = args.index {
        config.index.index_path = index;
    }
    if let Some(metadata) = args.metadata {
        config.index.metadata_path = metadata;
    }

    match args.command {
        Commands::Build {
            annotations,
            asset_root,
            limit,
            no_limit,
        } => {
            let mut builder_config = config.builder.clone();
            if let Some(annotations) = annotations {
                builder_config.annotations_path = annotations;
            }
            if let Some(asset_root) = asset_root {
                builder_config.asset_root = asset_root;
            }
            if no_limit {
                builder_config.max_unique_assets = None;
            } else if let Some(limit) = limit {
                builder_config.max_unique_assets = Some(limit);
            }

            let provider = Arc::new(FastEmbedProvider::create(config.embedding.clone()).await?);
            let stats = IndexBuilder::new(builder_config, provider)
                .build_and_persist(&config.index)
                .await?;

            println!("{stats}");
            println!("Index written to {}", config.index.index_path.display());
            println!("Metadata written to {}", config.index.metadata_path.display());
            Ok(())
        }
        Commands::Search {
            text,
            image,
            k,
            format,
        } => {
            let provider = Arc::new(FastEmbedProvider::create(config.embedding.clone()).await?);
            let retriever = Retriever::initialize(provider, config.index.clone());
            if !retriever.is_ready() {
                anyhow::bail!(
                    "no usable index at {}; run `iris-retriever build` first",
                    config.index.index_path.display()
                );
            }

            let k = k.unwrap_or(config.retrieval.default_k);
            let results = match (text, image) {
                (Some(text), _) => retriever.retrieve_by_text(&text, k).await?,
                (None, Some(image)) => retriever.retrieve_by_image(&image, k).await?,
                (None, None) => anyhow::bail!("either --text or --image is required"),
            };
            print_results(&results, &format)?;
            Ok(())
        }
        Commands::Status { format } => {
            let provider = Arc::new(FastEmbedProvider::new(config.embedding.clone()));
            let retriever = Retriever::new(provider, config.index.clone());
            if let Err(e) = retriever.reload() {
                tracing::warn!("{}", e);
            }
            let status = retriever.status();

            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&status)?),
                OutputFormat::Summary => println!("{status}"),
                OutputFormat::Full => {
                    println!("Ready:     {}", status.ready);
                    println!("Index:     {}", status.index_path.display());
                    println!("Metadata:  {}", status.metadata_path.display());
                    println!("Entries:   {}", status.entries);
                    if let Some(dimension) = status.dimension {
                        println!("Dimension: {dimension}");
                    }
                    if let Some(version) = &status.version {
                        println!("Version:   {version}");
                    }
                    if let Some(built_at) = status.built_at {
                        println!("Built at:  {}", built_at.to_rfc3339());
                    }
                }
            }
            Ok(())
        }
    }
}

fn print_results(results: &[QueryResult], format: &OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(results)?),
        OutputFormat::Summary => {
            println!("Found {} results:", results.len());
            for (rank, result) in results.iter().enumerate() {
                let file_name = Path::new(&result.asset_path)
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| result.asset_path.clone());
                println!(
                    "  {}. {:.4} | {} | {}",
                    rank + 1,
                    result.distance,
                    file_name,
                    result.description
                );
            }
        }
        OutputFormat::Full => {
            for (rank, result) in results.iter().enumerate() {
                println!("Result {}", rank + 1);
                println!("Distance:    {:.4}", result.distance);
                println!("Image:       {}", result.asset_path);
                println!("Description: {}", result.description);
                println!("---");
            }
        }
    }
    Ok(())
}
