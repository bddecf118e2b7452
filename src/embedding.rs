//! Embedding provider abstraction and implementations.
//!
//! Defines the [`Embedder`] trait and concrete implementations:
//! - **[`LocalTextEmbedder`]** — runs text models locally via fastembed;
//!   no network calls after the initial model download.
//! - **[`ClipEmbedder`]** — the CLIP ViT-B/32 pair for the visual backend:
//!   page images through the vision tower, query strings through the
//!   matching text tower, into one 512-dim space.
//! - **[`OpenAiEmbedder`]** — calls the OpenAI embeddings API with
//!   batching, retry, and backoff.
//!
//! Also provides vector utilities:
//! - [`cosine_similarity`] — similarity between two embedding vectors
//! - [`vec_to_blob`] — encode a `Vec<f32>` as little-endian bytes for BLOB storage
//! - [`blob_to_vec`] — decode a BLOB back into a `Vec<f32>`
//!
//! # Retry Strategy
//!
//! The OpenAI provider uses exponential backoff for transient errors:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use async_trait::async_trait;
use std::time::Duration;

use crate::config::{Backend, EmbeddingConfig};
use crate::error::{PipelineError, Result, Stage};
use crate::models::PageImage;

/// Trait for embedding providers.
///
/// `embed_images` has a default refusing implementation; only the CLIP
/// provider supports it.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier (e.g. `"bge-small-en-v1.5"`).
    fn model_name(&self) -> &str;
    /// Embedding vector dimensionality (e.g. `384`).
    fn dims(&self) -> usize;

    /// Embed a batch of texts, one vector per input, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a batch of page images, one vector per page, in input order.
    async fn embed_images(&self, pages: &[PageImage]) -> Result<Vec<Vec<f32>>> {
        let _ = pages;
        Err(PipelineError::upstream(
            Stage::Embed,
            format!("provider '{}' cannot embed images", self.model_name()),
        ))
    }
}

/// Embed a single query string.
pub async fn embed_query(embedder: &dyn Embedder, text: &str) -> Result<Vec<f32>> {
    let results = embedder.embed(&[text.to_string()]).await?;
    results
        .into_iter()
        .next()
        .ok_or_else(|| PipelineError::upstream(Stage::Embed, "empty embedding response"))
}

/// Create the appropriate [`Embedder`] for the configured provider and
/// pipeline backend. The visual backend always uses the CLIP pair.
pub fn create_embedder(
    config: &EmbeddingConfig,
    backend: Backend,
) -> Result<std::sync::Arc<dyn Embedder>> {
    if backend == Backend::Visual {
        if config.provider != "local" {
            return Err(PipelineError::Precondition(format!(
                "the visual backend requires embedding.provider = \"local\", got '{}'",
                config.provider
            )));
        }
        return Ok(std::sync::Arc::new(ClipEmbedder::new(config)?));
    }

    match config.provider.as_str() {
        "local" => Ok(std::sync::Arc::new(LocalTextEmbedder::new(config)?)),
        "openai" => Ok(std::sync::Arc::new(OpenAiEmbedder::new(config)?)),
        other => Err(PipelineError::Precondition(format!(
            "unknown embedding provider: {}",
            other
        ))),
    }
}

// ============ Local text provider (fastembed) ============

/// Embedding provider for local text inference via fastembed.
///
/// Models are downloaded on first use from Hugging Face and cached; after
/// that, embedding runs entirely offline. The default model matches the
/// original deployment: `bge-small-en-v1.5`, 384 dims.
pub struct LocalTextEmbedder {
    model_name: String,
    dims: usize,
    batch_size: usize,
}

impl LocalTextEmbedder {
    #[cfg(feature = "local-embeddings")]
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model_name = config
            .model
            .clone()
            .unwrap_or_else(|| "bge-small-en-v1.5".to_string());
        // Validate the name eagerly so a typo fails at startup, not mid-upload.
        text_model_by_name(&model_name)?;
        let dims = config.dims.unwrap_or(default_dims(&model_name));
        Ok(Self {
            model_name,
            dims,
            batch_size: config.batch_size,
        })
    }

    #[cfg(not(feature = "local-embeddings"))]
    pub fn new(_config: &EmbeddingConfig) -> Result<Self> {
        Err(PipelineError::Precondition(
            "local embedding provider requires --features local-embeddings".to_string(),
        ))
    }
}

#[cfg(feature = "local-embeddings")]
fn default_dims(model_name: &str) -> usize {
    match model_name {
        "all-minilm-l6-v2" => 384,
        "bge-small-en-v1.5" => 384,
        "bge-base-en-v1.5" => 768,
        "bge-large-en-v1.5" => 1024,
        "nomic-embed-text-v1.5" => 768,
        "multilingual-e5-small" => 384,
        _ => 384,
    }
}

#[cfg(feature = "local-embeddings")]
fn text_model_by_name(name: &str) -> Result<fastembed::EmbeddingModel> {
    match name {
        "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "bge-large-en-v1.5" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
        "nomic-embed-text-v1.5" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV15),
        "multilingual-e5-small" => Ok(fastembed::EmbeddingModel::MultilingualE5Small),
        other => Err(PipelineError::Precondition(format!(
            "unknown local embedding model: '{}'. Supported: all-minilm-l6-v2, \
             bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5, \
             nomic-embed-text-v1.5, multilingual-e5-small",
            other
        ))),
    }
}

#[async_trait]
impl Embedder for LocalTextEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }
    fn dims(&self) -> usize {
        self.dims
    }

    #[cfg(feature = "local-embeddings")]
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let model = text_model_by_name(&self.model_name)?;
        let batch_size = self.batch_size;
        let texts = texts.to_vec();

        tokio::task::spawn_blocking(move || {
            let mut embedder = fastembed::TextEmbedding::try_new(
                fastembed::InitOptions::new(model).with_show_download_progress(true),
            )
            .map_err(|e| {
                PipelineError::upstream(
                    Stage::Embed,
                    format!("failed to initialize local embedding model: {}", e),
                )
            })?;

            embedder
                .embed(texts, Some(batch_size))
                .map_err(|e| PipelineError::upstream(Stage::Embed, e))
        })
        .await
        .map_err(|e| PipelineError::upstream(Stage::Embed, e))?
    }

    #[cfg(not(feature = "local-embeddings"))]
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(PipelineError::Precondition(
            "local embedding provider requires --features local-embeddings".to_string(),
        ))
    }
}

// ============ CLIP provider (visual backend) ============

/// CLIP ViT-B/32 text+image pair for the visual backend.
///
/// Page PNGs go through the vision tower, queries through the text tower;
/// both land in the same 512-dim space, so a text query retrieves pages
/// by cosine similarity.
pub struct ClipEmbedder {
    batch_size: usize,
}

pub const CLIP_MODEL_NAME: &str = "clip-vit-b-32";
const CLIP_DIMS: usize = 512;

impl ClipEmbedder {
    #[cfg(feature = "local-embeddings")]
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        Ok(Self {
            batch_size: config.batch_size,
        })
    }

    #[cfg(not(feature = "local-embeddings"))]
    pub fn new(_config: &EmbeddingConfig) -> Result<Self> {
        Err(PipelineError::Precondition(
            "the visual backend requires --features local-embeddings".to_string(),
        ))
    }
}

#[async_trait]
impl Embedder for ClipEmbedder {
    fn model_name(&self) -> &str {
        CLIP_MODEL_NAME
    }
    fn dims(&self) -> usize {
        CLIP_DIMS
    }

    #[cfg(feature = "local-embeddings")]
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let batch_size = self.batch_size;
        let texts = texts.to_vec();

        tokio::task::spawn_blocking(move || {
            let mut embedder = fastembed::TextEmbedding::try_new(
                fastembed::InitOptions::new(fastembed::EmbeddingModel::ClipVitB32)
                    .with_show_download_progress(true),
            )
            .map_err(|e| {
                PipelineError::upstream(
                    Stage::Embed,
                    format!("failed to initialize CLIP text model: {}", e),
                )
            })?;

            embedder
                .embed(texts, Some(batch_size))
                .map_err(|e| PipelineError::upstream(Stage::Embed, e))
        })
        .await
        .map_err(|e| PipelineError::upstream(Stage::Embed, e))?
    }

    #[cfg(not(feature = "local-embeddings"))]
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(PipelineError::Precondition(
            "the visual backend requires --features local-embeddings".to_string(),
        ))
    }

    #[cfg(feature = "local-embeddings")]
    async fn embed_images(&self, pages: &[PageImage]) -> Result<Vec<Vec<f32>>> {
        if pages.is_empty() {
            return Ok(Vec::new());
        }

        let batch_size = self.batch_size;
        // fastembed's image pipeline reads from paths, so stage the PNGs
        // in a scratch directory that is removed when the guard drops.
        let dir = tempfile::tempdir().map_err(|e| PipelineError::upstream(Stage::Embed, e))?;
        let mut paths = Vec::with_capacity(pages.len());
        for page in pages {
            let path = dir.path().join(format!("page-{:05}.png", page.page_index));
            std::fs::write(&path, &page.png)
                .map_err(|e| PipelineError::upstream(Stage::Embed, e))?;
            paths.push(path.to_string_lossy().into_owned());
        }

        tokio::task::spawn_blocking(move || {
            let _dir = dir;
            let mut embedder = fastembed::ImageEmbedding::try_new(fastembed::ImageInitOptions::new(
                fastembed::ImageEmbeddingModel::ClipVitB32,
            ))
            .map_err(|e| {
                PipelineError::upstream(
                    Stage::Embed,
                    format!("failed to initialize CLIP image model: {}", e),
                )
            })?;

            embedder
                .embed(paths, Some(batch_size))
                .map_err(|e| PipelineError::upstream(Stage::Embed, e))
        })
        .await
        .map_err(|e| PipelineError::upstream(Stage::Embed, e))?
    }
}

// ============ OpenAI provider ============

/// Embedding provider using the OpenAI API.
///
/// Calls the `POST /v1/embeddings` endpoint with the configured model.
/// Requires the `OPENAI_API_KEY` environment variable to be set.
pub struct OpenAiEmbedder {
    model: String,
    dims: usize,
    max_retries: u32,
    timeout_secs: u64,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config.model.clone().ok_or_else(|| {
            PipelineError::Precondition("embedding.model required for the OpenAI provider".into())
        })?;
        let dims = config.dims.ok_or_else(|| {
            PipelineError::Precondition("embedding.dims required for the OpenAI provider".into())
        })?;

        if std::env::var("OPENAI_API_KEY").is_err() {
            return Err(PipelineError::Precondition(
                "OPENAI_API_KEY environment variable not set".into(),
            ));
        }

        Ok(Self {
            model,
            dims,
            max_retries: config.max_retries,
            timeout_secs: config.timeout_secs,
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| PipelineError::Precondition("OPENAI_API_KEY not set".into()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()
            .map_err(|e| PipelineError::upstream(Stage::Embed, e))?;

        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = client
                .post("https://api.openai.com/v1/embeddings")
                .header("Authorization", format!("Bearer {}", api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response
                            .json()
                            .await
                            .map_err(|e| PipelineError::upstream(Stage::Embed, e))?;
                        return parse_openai_response(&json);
                    }

                    // Rate limited or server error — retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(PipelineError::upstream(
                            Stage::Embed,
                            format!("OpenAI API error {}: {}", status, body_text),
                        ));
                        continue;
                    }

                    // Client error (not 429) — don't retry
                    let body_text = response.text().await.unwrap_or_default();
                    return Err(PipelineError::upstream(
                        Stage::Embed,
                        format!("OpenAI API error {}: {}", status, body_text),
                    ));
                }
                Err(e) => {
                    last_err = Some(PipelineError::upstream(Stage::Embed, e));
                    continue;
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| PipelineError::upstream(Stage::Embed, "embedding failed after retries")))
    }
}

/// Parse the OpenAI embeddings API response JSON.
///
/// Extracts the `data[].embedding` arrays and returns them in order.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| {
            PipelineError::upstream(Stage::Embed, "invalid OpenAI response: missing data array")
        })?;

    let mut embeddings = Vec::with_capacity(data.len());

    for item in data {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| {
                PipelineError::upstream(Stage::Embed, "invalid OpenAI response: missing embedding")
            })?;

        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();

        embeddings.push(vec);
    }

    Ok(embeddings)
}

// ============ Vector utilities ============

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// Each `f32` is stored as 4 bytes in little-endian order, producing
/// a BLOB of `vec.len() × 4` bytes.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
///
/// Reverses [`vec_to_blob`]: reads 4-byte little-endian `f32` values
/// from the byte slice.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`:
/// - `1.0` = identical direction
/// - `0.0` = orthogonal (unrelated)
/// - `-1.0` = opposite direction
///
/// Returns `0.0` for empty vectors or vectors of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
