//! Embedding provider implementations

use crate::config::{EmbedConfig, MultimodalModel};
use crate::error::{EmbedError, Result};
use async_trait::async_trait;
use fastembed::{
    EmbeddingModel, ImageEmbedding, ImageEmbeddingModel, ImageInitOptions, InitOptions,
    TextEmbedding,
};
use fnv::FnvHasher;
use std::collections::HashMap;
use std::hash::Hasher;
use std::io::Cursor;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

/// Result of embedding generation
#[derive(Debug, Clone)]
pub struct EmbeddingResult {
    /// The generated embeddings, one per input text
    pub embeddings: Vec<Vec<f32>>,
    /// The dimension of each embedding vector
    pub dimension: usize,
}

impl EmbeddingResult {
    /// Create a new embedding result.
    ///
    /// The dimension is inferred from the first embedding vector and defaults
    /// to 0 when there are none.
    pub fn new(embeddings: Vec<Vec<f32>>) -> Self {
        let dimension = embeddings.first().map(|e| e.len()).unwrap_or(0);
        Self {
            embeddings,
            dimension,
        }
    }

    /// Returns the number of embedding vectors in this result.
    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    /// Returns `true` if this result contains no embedding vectors.
    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }
}

/// Scale `vector` to unit L2 length in place. Zero vectors are left alone.
pub fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
}

/// Trait for providers that map text and images into one shared vector space.
///
/// Every vector a provider returns, from either modality, has the same length
/// ([`EmbeddingProvider::embedding_dimension`]).
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text. Empty or whitespace-only text is an
    /// [`EmbedError::Encoding`] error.
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed multiple texts (batch processing)
    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed_text(text).await?);
        }
        Ok(EmbeddingResult::new(embeddings))
    }

    /// Embed the image stored at `path`. A missing, unreadable or undecodable
    /// image is an [`EmbedError::Encoding`] error.
    async fn embed_image(&self, path: &Path) -> Result<Vec<f32>>;

    /// Get the dimension of embeddings produced by this provider
    fn embedding_dimension(&self) -> usize;

    /// Get the name/identifier of this provider
    fn provider_name(&self) -> &str;
}

/// Loaded text and vision towers of one model pair
#[derive(Clone)]
struct ModelPair {
    text: Arc<Mutex<TextEmbedding>>,
    image: Arc<Mutex<ImageEmbedding>>,
}

/// Type alias for cached model entries (models, dimension)
type ModelCacheEntry = (ModelPair, usize);

/// Global cache for initialized embedding models to avoid reloading
static MODEL_CACHE: OnceLock<Mutex<HashMap<String, ModelCacheEntry>>> = OnceLock::new();

/// Get the global model cache
fn get_model_cache() -> MutexGuard<'static, HashMap<String, ModelCacheEntry>> {
    MODEL_CACHE
        .get_or_init(|| Mutex::new(HashMap::new()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn lock_model<T>(model: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    model
        .lock()
        .map_err(|_| EmbedError::invalid_config("Embedding model lock poisoned"))
}

fn text_model(model: MultimodalModel) -> EmbeddingModel {
    match model {
        MultimodalModel::ClipVitB32 => EmbeddingModel::ClipVitB32,
        MultimodalModel::NomicV15 => EmbeddingModel::NomicEmbedTextV15,
    }
}

fn image_model(model: MultimodalModel) -> ImageEmbeddingModel {
    match model {
        MultimodalModel::ClipVitB32 => ImageEmbeddingModel::ClipVitB32,
        MultimodalModel::NomicV15 => ImageEmbeddingModel::NomicEmbedVisionV15,
    }
}

/// Check one tower's probe embedding and return its length.
fn check_probe(tower: &str, embedding: Option<&Vec<f32>>) -> Result<usize> {
    let embedding = embedding.ok_or_else(|| {
        EmbedError::invalid_config(format!(
            "Model validation failed: {tower} tower generated no embeddings"
        ))
    })?;
    if embedding.is_empty() {
        return Err(EmbedError::invalid_config(format!(
            "Model validation failed: empty {tower} embedding"
        )));
    }
    if embedding.iter().any(|value| !value.is_finite()) {
        return Err(EmbedError::invalid_config(format!(
            "Model validation failed: non-finite values in {tower} embedding"
        )));
    }
    Ok(embedding.len())
}

fn check_tower_dimensions(text: usize, image: usize) -> Result<()> {
    if text != image {
        return Err(EmbedError::invalid_config(format!(
            "Model validation failed: text tower produces dimension {text}, image tower {image}"
        )));
    }
    Ok(())
}

/// A small grey PNG for probing the vision tower.
fn probe_image() -> Result<Vec<u8>> {
    let pixels = image::RgbImage::from_pixel(32, 32, image::Rgb([128, 128, 128]));
    let mut png = Vec::new();
    image::DynamicImage::ImageRgb8(pixels)
        .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
        .map_err(EmbedError::embedding_gen)?;
    Ok(png)
}

/// Read and decode the image at `path`. Failures here are the caller's input.
async fn read_image(path: &Path) -> Result<Vec<u8>> {
    let metadata = tokio::fs::metadata(path).await.map_err(|e| {
        EmbedError::encoding(format!("cannot read image {}: {e}", path.display()))
    })?;
    if !metadata.is_file() {
        return Err(EmbedError::encoding(format!(
            "image path {} is not a file",
            path.display()
        )));
    }
    let bytes = tokio::fs::read(path).await.map_err(|e| {
        EmbedError::encoding(format!("cannot read image {}: {e}", path.display()))
    })?;

    let display = path.display().to_string();
    tokio::task::spawn_blocking(move || -> Result<Vec<u8>> {
        image::load_from_memory(&bytes)
            .map_err(|e| EmbedError::encoding(format!("cannot decode image {display}: {e}")))?;
        Ok(bytes)
    })
    .await?
}

/// FastEmbed-based embedding provider using local ONNX text and vision models
#[derive(Clone)]
pub struct FastEmbedProvider {
    config: EmbedConfig,
    models: Option<ModelPair>,
    dimension: usize,
}

impl std::fmt::Debug for FastEmbedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedProvider")
            .field("config", &self.config)
            .field("models", &self.models.is_some())
            .field("dimension", &self.dimension)
            .finish()
    }
}

impl FastEmbedProvider {
    /// Creates a new uninitialized provider. Call [`FastEmbedProvider::initialize`]
    /// before embedding anything.
    pub fn new(config: EmbedConfig) -> Self {
        let dimension = config.model.dimension();
        Self {
            config,
            models: None,
            dimension,
        }
    }

    /// Downloads (if needed) and loads both towers, reusing cached models.
    pub async fn initialize(&mut self) -> Result<()> {
        tracing::info!(
            "Initializing FastEmbed provider for model: {}",
            self.config.model_name()
        );
        self.config.validate()?;

        let cache_key = self.create_cache_key();

        let cached = get_model_cache().get(&cache_key).cloned();
        if let Some((models, dimension)) = cached {
            tracing::info!("Using cached model for: {}", self.config.model_name());
            self.models = Some(models);
            self.dimension = dimension;
            return self.validate_model().await;
        }

        let config = self.config.clone();
        let (text, image) =
            tokio::task::spawn_blocking(move || -> Result<(TextEmbedding, ImageEmbedding)> {
                tracing::info!("Loading text model: {}", config.model_name());
                let text_options = InitOptions::new(text_model(config.model))
                    .with_cache_dir(config.cache_dir.clone())
                    .with_show_download_progress(config.show_download_progress);
                let text = TextEmbedding::try_new(text_options).map_err(EmbedError::model_init)?;

                tracing::info!("Loading vision model: {}", config.model_name());
                let image_options = ImageInitOptions::new(image_model(config.model))
                    .with_cache_dir(config.cache_dir.clone())
                    .with_show_download_progress(config.show_download_progress);
                let image =
                    ImageEmbedding::try_new(image_options).map_err(EmbedError::model_init)?;

                Ok((text, image))
            })
            .await??;

        let models = ModelPair {
            text: Arc::new(Mutex::new(text)),
            image: Arc::new(Mutex::new(image)),
        };
        self.models = Some(models.clone());
        self.validate_model().await?;

        get_model_cache().insert(cache_key, (models, self.dimension));
        Ok(())
    }

    /// Creates and initializes a provider in one step.
    pub async fn create(config: EmbedConfig) -> Result<Self> {
        let mut provider = Self::new(config);
        provider.initialize().await?;
        Ok(provider)
    }

    /// Create a cache key based on the model configuration
    fn create_cache_key(&self) -> String {
        // Non-UTF-8 cache paths fail JSON serialization; Debug output is still deterministic
        let config_json = serde_json::to_string(&self.config)
            .unwrap_or_else(|_| format!("{:?}", self.config));

        let mut hasher = FnvHasher::default();
        hasher.write(b"v1:");
        hasher.write(config_json.as_bytes());

        format!("v1:{:x}", hasher.finish())
    }

    fn models(&self) -> Result<&ModelPair> {
        self.models.as_ref().ok_or_else(|| {
            EmbedError::invalid_config("Model not initialized. Call initialize() first.")
        })
    }

    /// Probe both towers, check they agree, and adopt the dimension they report.
    async fn validate_model(&mut self) -> Result<()> {
        let models = self.models()?.clone();

        let text = Arc::clone(&models.text);
        let text_probe = tokio::task::spawn_blocking(move || -> Result<Vec<Vec<f32>>> {
            let mut model = lock_model(&text)?;
            model
                .embed(vec!["validation test".to_string()], None)
                .map_err(EmbedError::embedding_gen)
        })
        .await??;
        let text_dimension = check_probe("text", text_probe.first())?;

        let image = Arc::clone(&models.image);
        let image_probe = tokio::task::spawn_blocking(move || -> Result<Vec<Vec<f32>>> {
            let png = probe_image()?;
            let mut model = lock_model(&image)?;
            model
                .embed_bytes(&[png.as_slice()], None)
                .map_err(EmbedError::embedding_gen)
        })
        .await??;
        let image_dimension = check_probe("image", image_probe.first())?;

        check_tower_dimensions(text_dimension, image_dimension)?;

        if text_dimension != self.config.model.dimension() {
            tracing::warn!(
                "Model {} reported dimension {}, expected {}",
                self.config.model_name(),
                text_dimension,
                self.config.model.dimension()
            );
        }
        self.dimension = text_dimension;

        tracing::debug!(
            "Model validation passed for: {} (dimension {})",
            self.config.model_name(),
            self.dimension
        );
        Ok(())
    }

    /// Clears the global model cache.
    pub fn clear_cache() {
        get_model_cache().clear();
        tracing::info!("Model cache cleared");
    }

    /// Returns the number of cached model pairs.
    pub fn cache_size() -> usize {
        get_model_cache().len()
    }

    fn finish(&self, mut embeddings: Vec<Vec<f32>>) -> Result<Vec<Vec<f32>>> {
        for embedding in &mut embeddings {
            if embedding.len() != self.dimension {
                return Err(EmbedError::invalid_config(format!(
                    "Model produced dimension {}, expected {}",
                    embedding.len(),
                    self.dimension
                )));
            }
            if self.config.normalize {
                normalize(embedding);
            }
        }
        Ok(embeddings)
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let texts = vec![text.to_string()];
        let result = self.embed_texts(&texts).await?;
        result
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbedError::invalid_config("No embedding generated for text"))
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult> {
        if texts.is_empty() {
            return Ok(EmbeddingResult::new(vec![]));
        }
        if let Some(position) = texts.iter().position(|text| text.trim().is_empty()) {
            return Err(EmbedError::encoding(format!(
                "text at position {position} is empty"
            )));
        }

        let model = &self.models()?.text;
        tracing::debug!("Generating embeddings for {} texts", texts.len());

        let mut all_embeddings = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.config.batch_size.max(1)) {
            let chunk = chunk.to_vec();
            let model = Arc::clone(model);

            let batch = tokio::task::spawn_blocking(move || -> Result<Vec<Vec<f32>>> {
                tracing::debug!("Processing batch of {} texts", chunk.len());
                let mut model = lock_model(&model)?;
                model.embed(chunk, None).map_err(EmbedError::embedding_gen)
            })
            .await??;

            all_embeddings.extend(self.finish(batch)?);
        }

        tracing::debug!("Generated {} embeddings", all_embeddings.len());
        Ok(EmbeddingResult::new(all_embeddings))
    }

    async fn embed_image(&self, path: &Path) -> Result<Vec<f32>> {
        let bytes = read_image(path).await?;
        let model = Arc::clone(&self.models()?.image);

        // The image already decoded, so anything failing now is the model's fault
        let embeddings = tokio::task::spawn_blocking(move || -> Result<Vec<Vec<f32>>> {
            let mut model = lock_model(&model)?;
            model
                .embed_bytes(&[bytes.as_slice()], None)
                .map_err(EmbedError::embedding_gen)
        })
        .await??;

        self.finish(embeddings)?
            .into_iter()
            .next()
            .ok_or_else(|| EmbedError::invalid_config("No embedding generated for image"))
    }

    fn embedding_dimension(&self) -> usize {
        self.dimension
    }

    fn provider_name(&self) -> &str {
        "fastembed"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_embedding_result() {
        let result = EmbeddingResult::new(vec![vec![0.1, 0.2, 0.3], vec![0.4, 0.5, 0.6]]);

        assert_eq!(result.len(), 2);
        assert_eq!(result.dimension, 3);
        assert!(!result.is_empty());
        assert_eq!(EmbeddingResult::new(vec![]).dimension, 0);
    }

    #[test]
    fn test_normalize() {
        let mut v = vec![3.0, 4.0];
        normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);

        let mut zero = vec![0.0, 0.0];
        normalize(&mut zero);
        assert_eq!(zero, vec![0.0, 0.0]);
    }

    #[test]
    fn test_fastembed_provider_creation() {
        let provider = FastEmbedProvider::new(EmbedConfig::default());

        assert_eq!(provider.provider_name(), "fastembed");
        assert_eq!(provider.embedding_dimension(), 512);

        let nomic = FastEmbedProvider::new(EmbedConfig::nomic_v15(".iris/models"));
        assert_eq!(nomic.embedding_dimension(), 768);
    }

    #[tokio::test]
    async fn test_uninitialized_provider_rejects_bad_input_first() {
        let provider = FastEmbedProvider::new(EmbedConfig::default());

        let err = provider.embed_text("   ").await.unwrap_err();
        assert!(matches!(err, EmbedError::Encoding { .. }));

        let err = provider
            .embed_image(Path::new("/definitely/not/here.jpg"))
            .await
            .unwrap_err();
        assert!(err.is_input_error());

        let err = provider.embed_text("a dog").await.unwrap_err();
        assert!(matches!(err, EmbedError::InvalidConfig { .. }));
    }

    #[tokio::test]
    async fn test_directory_is_not_an_image() {
        let temp_dir = tempdir().unwrap();
        let provider = FastEmbedProvider::new(EmbedConfig::default());

        let err = provider.embed_image(temp_dir.path()).await.unwrap_err();
        assert!(matches!(err, EmbedError::Encoding { .. }));
    }

    #[test]
    fn test_probe_checks() {
        assert_eq!(check_probe("text", Some(&vec![0.1, 0.2])).unwrap(), 2);

        let err = check_probe("image", None).unwrap_err();
        assert!(matches!(err, EmbedError::InvalidConfig { .. }));
        let err = check_probe("image", Some(&vec![])).unwrap_err();
        assert!(err.to_string().contains("empty image embedding"));
        let err = check_probe("text", Some(&vec![0.1, f32::NAN])).unwrap_err();
        assert!(err.to_string().contains("non-finite"));
    }

    #[test]
    fn test_mismatched_towers_are_rejected() {
        assert!(check_tower_dimensions(512, 512).is_ok());

        let err = check_tower_dimensions(512, 768).unwrap_err();
        assert!(matches!(err, EmbedError::InvalidConfig { .. }));
        assert!(!err.is_input_error());
        assert!(err.to_string().contains("text tower produces dimension 512, image tower 768"));
    }

    #[test]
    fn test_probe_image_is_a_valid_png() {
        let png = probe_image().unwrap();
        let decoded = image::load_from_memory(&png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (32, 32));
    }

    #[tokio::test]
    async fn test_undecodable_image_is_input_error() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("broken.jpg");
        std::fs::write(&path, b"definitely not a jpeg").unwrap();
        let provider = FastEmbedProvider::new(EmbedConfig::default());

        let err = provider.embed_image(&path).await.unwrap_err();
        assert!(matches!(err, EmbedError::Encoding { .. }));
        assert!(err.to_string().contains("cannot decode image"));
    }

    #[tokio::test]
    async fn test_model_failure_on_valid_image_is_not_input_error() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("grey.png");
        std::fs::write(&path, probe_image().unwrap()).unwrap();
        // No towers loaded: the image decodes, so the failure belongs to the provider
        let provider = FastEmbedProvider::new(EmbedConfig::default());

        let err = provider.embed_image(&path).await.unwrap_err();
        assert!(matches!(err, EmbedError::InvalidConfig { .. }));
        assert!(!err.is_input_error());
    }

    #[test]
    fn test_cache_key_generation() {
        let key1 = FastEmbedProvider::new(EmbedConfig::default()).create_cache_key();
        let key2 = FastEmbedProvider::new(EmbedConfig::default()).create_cache_key();
        assert_eq!(key1, key2, "Same config should produce same cache key");
        assert!(key1.starts_with("v1:"));

        let key3 = FastEmbedProvider::new(EmbedConfig::nomic_v15(".iris/models")).create_cache_key();
        assert_ne!(key1, key3, "Different model should produce different cache key");

        let key4 =
            FastEmbedProvider::new(EmbedConfig::default().with_normalize(false)).create_cache_key();
        assert_ne!(key1, key4);
    }

    #[tokio::test]
    #[ignore] // Downloads the CLIP towers - run with: cargo test test_clip_towers_share_dimension -- --ignored
    async fn test_clip_towers_share_dimension() -> Result<()> {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("grey.png");
        std::fs::write(&path, probe_image()?)?;

        let provider = FastEmbedProvider::create(EmbedConfig::default()).await?;
        let text = provider.embed_text("a grey square").await?;
        let image = provider.embed_image(&path).await?;

        assert_eq!(text.len(), image.len());
        assert_eq!(image.len(), provider.embedding_dimension());
        Ok(())
    }

    #[tokio::test]
    #[ignore] // Downloads the CLIP towers - run with: cargo test test_clip_download_and_embedding -- --ignored
    async fn test_clip_download_and_embedding() -> Result<()> {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .try_init()
            .ok();

        FastEmbedProvider::clear_cache();
        let provider = FastEmbedProvider::create(EmbedConfig::default()).await?;
        assert_eq!(FastEmbedProvider::cache_size(), 1);
        assert_eq!(provider.embedding_dimension(), 512);

        let dog = provider.embed_text("a photo of a dog").await?;
        let puppy = provider.embed_text("a photo of a puppy").await?;
        let car = provider.embed_text("a diagram of a car engine").await?;
        assert_eq!(dog.len(), 512);

        let norm: f32 = dog.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-3, "vectors should be unit length");

        let dot = |a: &[f32], b: &[f32]| a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>();
        assert!(dot(&dog, &puppy) > dot(&dog, &car));

        let provider2 = FastEmbedProvider::create(EmbedConfig::default()).await?;
        assert_eq!(FastEmbedProvider::cache_size(), 1);
        assert_eq!(provider2.embed_text("a dog").await?.len(), 512);

        FastEmbedProvider::clear_cache();
        assert_eq!(FastEmbedProvider::cache_size(), 0);
        Ok(())
    }
}
