use clap::Parser;
use iris_answer::{GeminiConfig, GeminiGenerator, PromptBuilder, answer_or_fallback};
use serde::Serialize;
use std::fs;
use std::io::{self, Read};
use std::process;
use tracing_subscriber::EnvFilter;

/// Answer a question from caption snippets, one snippet per line.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// The question to answer
    query: String,

    /// File with one snippet per line. If not provided, reads from stdin.
    #[arg(short, long)]
    input: Option<String>,

    /// Gemini model name
    #[arg(short, long, default_value = iris_answer::gemini::DEFAULT_MODEL)]
    model: String,

    /// Print the prompt as JSON instead of calling the model
    #[arg(long)]
    prompt_only: bool,
}

#[derive(Serialize)]
struct PromptOutput<'a> {
    query: &'a str,
    snippets: &'a [String],
    prompt: String,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let args = Args::parse();

    let content = if let Some(input_path) = &args.input {
        fs::read_to_string(input_path)?
    } else {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    };
    let snippets: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();

    if args.prompt_only {
        let output = PromptOutput {
            query: &args.query,
            snippets: &snippets,
            prompt: PromptBuilder::default().build(&args.query, &snippets),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let generator = GeminiGenerator::new(GeminiConfig::from_env()?.with_model(args.model))?;
    let answer = answer_or_fallback(&generator, &args.query, &snippets).await;
    println!("{answer}");
    Ok(())
}
