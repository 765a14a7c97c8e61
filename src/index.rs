//! Per-product vector index and fragment store.
//!
//! Each product directory holds two artifacts written by the offline
//! indexing pipeline:
//!
//! ```text
//! <root>/<product>/
//! ├── vector_store/index.bin   flat vector index (see FlatIndex)
//! └── chunks.json              {"chunks": [...], "embeddings": [[...], ...]}
//! ```
//!
//! Either may be missing, meaning the product has no indexed content yet.
//! A [`ProductIndex`] is loaded once and never mutated, so it can be shared
//! across concurrent requests without locking.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::error::IndexError;

/// Location of the vector index, relative to a product directory.
pub const INDEX_FILE: &str = "vector_store/index.bin";
/// Location of the fragment store, relative to a product directory.
pub const FRAGMENTS_FILE: &str = "chunks.json";

const MAGIC: &[u8; 4] = b"PCVX";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 4 + 4 + 4 + 8;

/// Artifact paths for one product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductPaths {
    pub index: PathBuf,
    pub fragments: PathBuf,
}

impl ProductPaths {
    /// Standard layout inside `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            index: dir.join(INDEX_FILE),
            fragments: dir.join(FRAGMENTS_FILE),
        }
    }
}

/// A neighbor returned by [`ProductIndex::search`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub position: usize,
    /// Squared Euclidean distance.
    pub distance: f32,
}

/// Exhaustive nearest-neighbor index over fixed-dimension vectors.
///
/// On disk: magic `PCVX`, `u32` version, `u32` dims, `u64` count, then
/// `count × dims` little-endian `f32` values, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatIndex {
    dims: usize,
    data: Vec<f32>,
}

impl FlatIndex {
    /// Build from rows. All rows must share one non-zero dimension.
    pub fn from_rows(rows: &[Vec<f32>]) -> Result<Self, String> {
        let dims = rows.first().map(|r| r.len()).unwrap_or(0);
        if rows.iter().any(|r| r.len() != dims) {
            return Err("rows have differing dimensions".to_string());
        }
        let data = rows.iter().flatten().copied().collect();
        Ok(Self { dims, data })
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn len(&self) -> usize {
        if self.dims == 0 {
            0
        } else {
            self.data.len() / self.dims
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The `k` vectors closest to `query`, nearest first.
    ///
    /// Ties keep index order. The caller checks that `query` has
    /// [`dims`](Self::dims) components.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<Neighbor> {
        if k == 0 || self.is_empty() {
            return Vec::new();
        }
        let mut neighbors: Vec<Neighbor> = self
            .data
            .chunks_exact(self.dims)
            .enumerate()
            .map(|(position, row)| Neighbor {
                position,
                distance: squared_l2(query, row),
            })
            .collect();
        neighbors.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then(a.position.cmp(&b.position))
        });
        neighbors.truncate(k);
        neighbors
    }

    pub fn read(path: &Path) -> Result<Self, IndexError> {
        let bytes = fs::read(path).map_err(|source| IndexError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::decode(&bytes).map_err(|reason| IndexError::Format {
            path: path.to_path_buf(),
            reason,
        })
    }

    pub fn write(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = fs::File::create(path)?;
        file.write_all(&self.encode())?;
        file.flush()
    }

    fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_LEN + self.data.len() * 4);
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&(self.dims as u32).to_le_bytes());
        bytes.extend_from_slice(&(self.len() as u64).to_le_bytes());
        bytes.extend_from_slice(&vec_to_blob(&self.data));
        bytes
    }

    fn decode(bytes: &[u8]) -> Result<Self, String> {
        if bytes.len() < HEADER_LEN {
            return Err(format!("truncated header ({} bytes)", bytes.len()));
        }
        if &bytes[0..4] != MAGIC {
            return Err("bad magic".to_string());
        }
        let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        if version != FORMAT_VERSION {
            return Err(format!("unsupported version {}", version));
        }
        let dims = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
        let mut count_bytes = [0u8; 8];
        count_bytes.copy_from_slice(&bytes[12..20]);
        let count = u64::from_le_bytes(count_bytes) as usize;

        let expected = count
            .checked_mul(dims)
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| "vector count overflows".to_string())?;
        let body = &bytes[HEADER_LEN..];
        if body.len() != expected {
            return Err(format!(
                "expected {} bytes of vectors for {} x {}, found {}",
                expected,
                count,
                dims,
                body.len()
            ));
        }
        if dims == 0 && count > 0 {
            return Err("zero-dimension vectors".to_string());
        }

        let data = blob_to_vec(body);
        if let Some(i) = data.iter().position(|x| !x.is_finite()) {
            return Err(format!(
                "non-finite component in vector {} (dimension {})",
                i / dims,
                i % dims
            ));
        }

        Ok(Self { dims, data })
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    let distance: f32 = a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum();
    // NaN ranks after every real distance.
    if distance.is_nan() {
        f32::INFINITY
    } else {
        distance
    }
}

/// Contents of `chunks.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FragmentStore {
    pub chunks: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embeddings: Option<Vec<Vec<f32>>>,
}

impl FragmentStore {
    pub fn read(path: &Path) -> Result<Self, IndexError> {
        let content = fs::read_to_string(path).map_err(|source| IndexError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| IndexError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn write(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string(self).map_err(io::Error::other)?;
        fs::write(path, json)
    }
}

/// Readiness of a loaded product.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductStatus {
    Ready,
    MissingIndex,
    MissingFragments,
    /// Both artifacts are absent or unreadable, or present but empty.
    Empty,
}

impl ProductStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductStatus::Ready => "ready",
            ProductStatus::MissingIndex => "missing index",
            ProductStatus::MissingFragments => "missing fragments",
            ProductStatus::Empty => "empty",
        }
    }
}

/// One product's searchable content.
#[derive(Debug, Clone, Default)]
pub struct ProductIndex {
    index: Option<FlatIndex>,
    fragments: Vec<String>,
    precomputed_embeddings: Option<Vec<Vec<f32>>>,
}

impl ProductIndex {
    pub fn new(index: Option<FlatIndex>, fragments: Vec<String>) -> Self {
        Self {
            index,
            fragments,
            precomputed_embeddings: None,
        }
    }

    /// Load a product's artifacts. Never fails: a missing artifact leaves
    /// its field empty and an unreadable one is logged and treated the same.
    pub fn load(product: &str, paths: &ProductPaths) -> Self {
        let index = match read_optional(&paths.index, FlatIndex::read) {
            Ok(index) => index,
            Err(e) => {
                error!("error loading vector index for {}: {}", product, e);
                None
            }
        };
        if index.is_none() {
            debug!("no vector index for {} at {}", product, paths.index.display());
        }

        let store = match read_optional(&paths.fragments, FragmentStore::read) {
            Ok(store) => store,
            Err(e) => {
                error!("error loading fragments for {}: {}", product, e);
                None
            }
        };
        if store.is_none() {
            debug!("no fragments for {} at {}", product, paths.fragments.display());
        }
        let store = store.unwrap_or_default();

        let loaded = Self {
            index,
            fragments: store.chunks,
            precomputed_embeddings: store.embeddings,
        };
        if let Some(index) = &loaded.index {
            if index.len() != loaded.fragments.len() && !loaded.fragments.is_empty() {
                warn!(
                    "index for {} holds {} vectors but {} fragments; out-of-range hits will be skipped",
                    product,
                    index.len(),
                    loaded.fragments.len()
                );
            }
        }
        loaded
    }

    /// True when search can never return anything.
    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty() || self.index.as_ref().map_or(true, FlatIndex::is_empty)
    }

    pub fn status(&self) -> ProductStatus {
        let has_index = self.index.as_ref().is_some_and(|i| !i.is_empty());
        let has_fragments = !self.fragments.is_empty();
        match (has_index, has_fragments) {
            (true, true) => ProductStatus::Ready,
            (false, true) => ProductStatus::MissingIndex,
            (true, false) => ProductStatus::MissingFragments,
            (false, false) => ProductStatus::Empty,
        }
    }

    /// Dimension of the stored vectors, if an index is loaded.
    pub fn dims(&self) -> Option<usize> {
        self.index.as_ref().map(FlatIndex::dims)
    }

    pub fn vector_count(&self) -> usize {
        self.index.as_ref().map(FlatIndex::len).unwrap_or(0)
    }

    pub fn fragments(&self) -> &[String] {
        &self.fragments
    }

    pub fn fragment(&self, position: usize) -> Option<&str> {
        self.fragments.get(position).map(String::as_str)
    }

    pub fn precomputed_embeddings(&self) -> Option<&[Vec<f32>]> {
        self.precomputed_embeddings.as_deref()
    }

    /// Nearest fragments to `query`, most similar first, at most `k`.
    ///
    /// Index positions with no matching fragment are skipped, so fewer than
    /// `k` results may come back even when the index holds more vectors.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<Neighbor> {
        let Some(index) = &self.index else {
            return Vec::new();
        };
        if k == 0 || self.fragments.is_empty() {
            return Vec::new();
        }
        let hits = index.search(query, k);
        let total = hits.len();
        let kept: Vec<Neighbor> = hits
            .into_iter()
            .filter(|n| n.position < self.fragments.len())
            .collect();
        if kept.len() < total {
            warn!(
                "skipped {} index hits beyond the {} loaded fragments",
                total - kept.len(),
                self.fragments.len()
            );
        }
        kept
    }
}

/// `Ok(None)` when the file does not exist.
fn read_optional<T>(
    path: &Path,
    read: impl FnOnce(&Path) -> Result<T, IndexError>,
) -> Result<Option<T>, IndexError> {
    if !path.exists() {
        return Ok(None);
    }
    read(path).map(Some)
}
