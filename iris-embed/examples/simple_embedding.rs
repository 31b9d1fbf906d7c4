//! Embed a caption and an image with the CLIP pair and compare them.
//!
//! Run with: cargo run --example simple_embedding -- path/to/image.jpg "a caption"

use iris_embed::{EmbedConfig, EmbeddingProvider, FastEmbedProvider};
use std::path::PathBuf;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let image = PathBuf::from(args.next().unwrap_or_else(|| "image.jpg".to_string()));
    let caption = args
        .next()
        .unwrap_or_else(|| "a dog running on the beach".to_string());

    let provider = FastEmbedProvider::create(EmbedConfig::default()).await?;
    println!(
        "Loaded {} (dimension {})",
        provider.provider_name(),
        provider.embedding_dimension()
    );

    let text_vector = provider.embed_text(&caption).await?;
    let image_vector = provider.embed_image(&image).await?;

    let distance: f32 = text_vector
        .iter()
        .zip(&image_vector)
        .map(|(a, b)| (a - b) * (a - b))
        .sum();
    println!("Squared L2 distance between caption and image: {distance:.4}");

    Ok(())
}
