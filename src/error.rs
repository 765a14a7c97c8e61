//! Typed errors for the retrieval and generation pipeline.
//!
//! Every failure in the chat path is contained at the component boundary
//! where it occurs. These enums carry the reason so callers (and tests) can
//! tell "empty because the product is unknown" apart from "empty because
//! encoding failed" before the error collapses into a fallback value.

use std::path::PathBuf;

use thiserror::Error;

/// The embedding model could not produce a vector for a piece of text.
#[derive(Debug, Error)]
pub enum EncodingError {
    #[error("embedding model failed: {0}")]
    Model(String),
    #[error("embedding request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("embedding response malformed: {0}")]
    MalformedResponse(String),
    #[error("embedding model returned no vector")]
    Empty,
}

/// A product artifact exists on disk but could not be read.
///
/// A missing artifact is not an error: it means the product has no indexed
/// content yet and loads as an empty index.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid vector index {path}: {reason}")]
    Format { path: PathBuf, reason: String },
}

/// Why a similarity search produced no fragments.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("product '{0}' not found in catalog")]
    UnknownProduct(String),
    #[error("no vector index or fragments loaded for product '{0}'")]
    EmptyIndex(String),
    #[error("query encoding failed for product '{product}': {source}")]
    Encoding {
        product: String,
        #[source]
        source: EncodingError,
    },
    #[error("query has {query} dimensions but index for '{product}' has {index}")]
    DimensionMismatch {
        product: String,
        query: usize,
        index: usize,
    },
}

/// The remote completion service did not produce usable content.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// The service answered with a non-success status.
    #[error("completion service returned {status}: {body}")]
    Status { status: u16, body: String },
    /// The call never produced a readable response.
    #[error("completion request failed: {0}")]
    Transport(#[from] reqwest::Error),
    /// A success response whose body lacks `choices[0].message.content`.
    #[error("completion response malformed: {0}")]
    MalformedResponse(String),
}
