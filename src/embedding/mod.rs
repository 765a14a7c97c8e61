//! Sentence-embedding encoders.
//!
//! Defines the [`EmbeddingEncoder`] trait and its implementations:
//! - **[`HashingEncoder`]**: deterministic feature hashing; no model, no network.
//! - **[`LocalEncoder`]**: runs a sentence-transformer locally via fastembed
//!   (feature `local-embeddings-fastembed`, on by default).
//! - **[`OpenAIEncoder`]**: calls an OpenAI-compatible `/embeddings` endpoint.
//!
//! Also provides the little-endian blob codec used by the on-disk vector
//! index: [`vec_to_blob`] and [`blob_to_vec`].
//!
//! # Lifecycle
//!
//! An encoder is built once at startup with [`create_encoder`] and handed to
//! the [`RetrievalCatalog`](crate::catalog::RetrievalCatalog) as an
//! `Arc<dyn EmbeddingEncoder>`. There is no process-global model instance.
//! Encoders never retry: a failed call surfaces as [`EncodingError`] and the
//! catalog treats it as an empty search for that request.
//!
//! ```rust
//! # use product_chat::config::EmbeddingConfig;
//! # use product_chat::embedding::create_encoder;
//! let config = EmbeddingConfig {
//!     provider: "hashing".to_string(),
//!     dims: Some(64),
//!     ..EmbeddingConfig::default()
//! };
//! let encoder = create_encoder(&config).unwrap();
//! assert_eq!(encoder.dims(), 64);
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::config::EmbeddingConfig;
use crate::error::EncodingError;

/// Maps text to a fixed-length vector.
///
/// Implementations must be deterministic for a fixed model and safe to call
/// from many requests at once.
#[async_trait]
pub trait EmbeddingEncoder: Send + Sync {
    /// Returns the model identifier (e.g. `"all-minilm-l6-v2"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `384`).
    fn dims(&self) -> usize;
    /// Embed a single text.
    async fn encode(&self, text: &str) -> Result<Vec<f32>, EncodingError>;
}

// ============ Hashing Encoder ============

/// Bag-of-words feature hashing encoder.
///
/// Each lowercase alphanumeric token is hashed with SHA-256 into one of
/// `dims` buckets with a ±1 sign, and the result is L2-normalized. Texts that
/// share words land close together, which is enough for offline use and for
/// tests that need stable vectors without downloading a model.
pub struct HashingEncoder {
    dims: usize,
}

impl HashingEncoder {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dims];
        let lowered = text.to_lowercase();
        for token in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let digest = Sha256::digest(token.as_bytes());
            let mut bucket_bytes = [0u8; 8];
            bucket_bytes.copy_from_slice(&digest[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % self.dims as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            v[bucket] += sign;
        }
        normalize(&mut v);
        v
    }
}

#[async_trait]
impl EmbeddingEncoder for HashingEncoder {
    fn model_name(&self) -> &str {
        "hashing"
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn encode(&self, text: &str) -> Result<Vec<f32>, EncodingError> {
        Ok(self.embed(text))
    }
}

fn normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

// ============ Local Encoder (fastembed) ============

/// Sentence-transformer run in-process via fastembed.
///
/// The model is downloaded from Hugging Face on first construction and
/// cached. Inference needs exclusive access to the ONNX session, so calls are
/// serialized behind a mutex and run on tokio's blocking pool.
#[cfg(feature = "local-embeddings-fastembed")]
pub struct LocalEncoder {
    model_name: String,
    dims: usize,
    model: Arc<std::sync::Mutex<fastembed::TextEmbedding>>,
}

#[cfg(feature = "local-embeddings-fastembed")]
impl LocalEncoder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let (model_name, dims) = resolve_local_model(config);
        let fastembed_model = config_to_fastembed_model(&model_name)?;

        let model = fastembed::TextEmbedding::try_new(
            fastembed::InitOptions::new(fastembed_model).with_show_download_progress(false),
        )
        .map_err(|e| anyhow::anyhow!("Failed to initialize local embedding model: {}", e))?;

        tracing::info!("loaded local embedding model {} ({} dims)", model_name, dims);

        Ok(Self {
            model_name,
            dims,
            model: Arc::new(std::sync::Mutex::new(model)),
        })
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
#[async_trait]
impl EmbeddingEncoder for LocalEncoder {
    fn model_name(&self) -> &str {
        &self.model_name
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn encode(&self, text: &str) -> Result<Vec<f32>, EncodingError> {
        let model = Arc::clone(&self.model);
        let texts = vec![text.to_string()];

        let embeddings = tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|_| EncodingError::Model("embedding model lock poisoned".to_string()))?;
            model
                .embed(texts, None)
                .map_err(|e| EncodingError::Model(e.to_string()))
        })
        .await
        .map_err(|e| EncodingError::Model(e.to_string()))??;

        embeddings.into_iter().next().ok_or(EncodingError::Empty)
    }
}

fn resolve_local_model(config: &EmbeddingConfig) -> (String, usize) {
    let model_name = config
        .model
        .clone()
        .unwrap_or_else(|| "all-minilm-l6-v2".to_string());

    let dims = config.dims.unwrap_or(match model_name.as_str() {
        "all-minilm-l6-v2" | "bge-small-en-v1.5" | "multilingual-e5-small" => 384,
        "bge-base-en-v1.5" | "multilingual-e5-base" => 768,
        "nomic-embed-text-v1" | "nomic-embed-text-v1.5" => 768,
        "bge-large-en-v1.5" | "multilingual-e5-large" => 1024,
        _ => 384,
    });

    (model_name, dims)
}

#[cfg(feature = "local-embeddings-fastembed")]
fn config_to_fastembed_model(name: &str) -> Result<fastembed::EmbeddingModel> {
    match name {
        "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "bge-large-en-v1.5" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
        "nomic-embed-text-v1" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV1),
        "nomic-embed-text-v1.5" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV15),
        "multilingual-e5-small" => Ok(fastembed::EmbeddingModel::MultilingualE5Small),
        "multilingual-e5-base" => Ok(fastembed::EmbeddingModel::MultilingualE5Base),
        "multilingual-e5-large" => Ok(fastembed::EmbeddingModel::MultilingualE5Large),
        other => bail!(
            "Unknown local embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5, \
             nomic-embed-text-v1, nomic-embed-text-v1.5, \
             multilingual-e5-small, multilingual-e5-base, multilingual-e5-large",
            other
        ),
    }
}

// ============ OpenAI Encoder ============

/// Encoder backed by an OpenAI-compatible `POST {url}/embeddings` endpoint.
///
/// The API key is read from the environment variable named by
/// `embedding.api_key_env` once, at construction.
pub struct OpenAIEncoder {
    model: String,
    dims: usize,
    url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAIEncoder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for OpenAI provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for OpenAI provider"))?;
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| anyhow::anyhow!("{} environment variable not set", config.api_key_env))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model,
            dims,
            url: url.trim_end_matches('/').to_string(),
            api_key,
            client,
        })
    }
}

#[async_trait]
impl EmbeddingEncoder for OpenAIEncoder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn encode(&self, text: &str) -> Result<Vec<f32>, EncodingError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": [text],
        });

        let response = self
            .client
            .post(format!("{}/embeddings", self.url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(EncodingError::MalformedResponse(format!(
                "status {}: {}",
                status, body_text
            )));
        }

        let json: serde_json::Value = response.json().await?;
        parse_openai_response(&json)
    }
}

/// Extract `data[0].embedding` from an embeddings API response.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<f32>, EncodingError> {
    let embedding = json
        .get("data")
        .and_then(|d| d.as_array())
        .and_then(|d| d.first())
        .and_then(|item| item.get("embedding"))
        .and_then(|e| e.as_array())
        .ok_or_else(|| EncodingError::MalformedResponse("missing data[0].embedding".to_string()))?;

    embedding
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| EncodingError::MalformedResponse("non-numeric component".to_string()))
        })
        .collect()
}

/// Create the configured encoder.
///
/// | Config Value | Encoder |
/// |-------------|----------|
/// | `"hashing"` | [`HashingEncoder`] (dims default 256) |
/// | `"local"` | `LocalEncoder` (requires `local-embeddings-fastembed`) |
/// | `"openai"` | [`OpenAIEncoder`] |
pub fn create_encoder(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingEncoder>> {
    match config.provider.as_str() {
        "hashing" => Ok(Arc::new(HashingEncoder::new(config.dims.unwrap_or(256)))),
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Ok(Arc::new(LocalEncoder::new(config)?)),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => bail!("Local embedding provider requires --features local-embeddings-fastembed"),
        "openai" => Ok(Arc::new(OpenAIEncoder::new(config)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

/// Encode a float vector as little-endian `f32` bytes.
///
/// ```rust
/// use product_chat::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12);
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode little-endian `f32` bytes. Trailing bytes that do not fill a
/// whole `f32` are ignored.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
