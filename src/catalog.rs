//! Product discovery and query routing.
//!
//! The catalog owns one [`ProductIndex`] per product and the shared
//! [`EmbeddingEncoder`]. The product set is fixed at construction.
//!
//! Discovery (listing the data root) is kept separate from construction:
//! [`discover_products`] turns a directory into a `product → paths` map and
//! [`RetrievalCatalog::load`] accepts any such map, so tests can build a
//! catalog from in-memory indexes with [`RetrievalCatalog::from_indexes`].

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info, warn};
use walkdir::WalkDir;

use crate::config::Config;
use crate::embedding::{create_encoder, EmbeddingEncoder};
use crate::error::SearchError;
use crate::index::{ProductIndex, ProductPaths};
use crate::models::RetrievedFragment;

/// List every subdirectory of `root` as a product.
///
/// A missing root yields an empty map. A root that exists but cannot be read
/// is an error: it is not one product's problem and should abort startup.
pub fn discover_products(root: &Path) -> Result<BTreeMap<String, ProductPaths>> {
    let mut products = BTreeMap::new();
    if !root.exists() {
        warn!("data root {} does not exist; no products loaded", root.display());
        return Ok(products);
    }

    for entry in WalkDir::new(root).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry =
            entry.with_context(|| format!("Failed to read data root: {}", root.display()))?;
        // Follows symlinks; a dangling link is skipped.
        if !entry.path().is_dir() {
            continue;
        }
        let Some(key) = entry.file_name().to_str() else {
            warn!("skipping non-UTF-8 product directory {}", entry.path().display());
            continue;
        };
        products.insert(key.to_string(), ProductPaths::in_dir(entry.path()));
    }
    Ok(products)
}

/// Build the configured encoder and open the catalog at `data.root`.
pub fn open_catalog(config: &Config) -> Result<RetrievalCatalog> {
    let encoder = create_encoder(&config.embedding)?;
    RetrievalCatalog::open(encoder, &config.data.root)
}

/// Index dimension when it differs from what `encoder` produces.
fn mismatched_dims(encoder: &dyn EmbeddingEncoder, index: &ProductIndex) -> Option<usize> {
    index.dims().filter(|&d| d != encoder.dims())
}

/// Routes similarity queries to per-product indexes.
pub struct RetrievalCatalog {
    encoder: Arc<dyn EmbeddingEncoder>,
    products: BTreeMap<String, ProductIndex>,
}

impl RetrievalCatalog {
    /// Discover products under `root` and load each one.
    pub fn open(encoder: Arc<dyn EmbeddingEncoder>, root: &Path) -> Result<Self> {
        let paths = discover_products(root)?;
        Ok(Self::load(encoder, &paths))
    }

    /// Load every product in `paths`. One product's bad data never stops
    /// the others from loading.
    pub fn load(
        encoder: Arc<dyn EmbeddingEncoder>,
        paths: &BTreeMap<String, ProductPaths>,
    ) -> Self {
        let products = paths
            .iter()
            .map(|(key, paths)| {
                let index = ProductIndex::load(key, paths);
                if let Some(dims) = mismatched_dims(encoder.as_ref(), &index) {
                    warn!(
                        "product {} index has {} dims but encoder {} produces {}; searches will return nothing",
                        key,
                        dims,
                        encoder.model_name(),
                        encoder.dims()
                    );
                }
                info!(
                    "initialized product {} ({}, {} fragments)",
                    key,
                    index.status().as_str(),
                    index.fragments().len()
                );
                (key.clone(), index)
            })
            .collect();
        Self { encoder, products }
    }

    pub fn from_indexes(
        encoder: Arc<dyn EmbeddingEncoder>,
        products: BTreeMap<String, ProductIndex>,
    ) -> Self {
        Self { encoder, products }
    }

    pub fn product_keys(&self) -> impl Iterator<Item = &str> {
        self.products.keys().map(String::as_str)
    }

    pub fn product(&self, key: &str) -> Option<&ProductIndex> {
        self.products.get(key)
    }

    /// Nearest fragments for `query` within one product.
    ///
    /// `Ok(vec![])` only when `k` is zero or every hit was out of range;
    /// every other empty outcome carries its reason.
    pub async fn search(
        &self,
        query: &str,
        product: &str,
        k: usize,
    ) -> Result<Vec<RetrievedFragment>, SearchError> {
        let index = self
            .products
            .get(product)
            .ok_or_else(|| SearchError::UnknownProduct(product.to_string()))?;
        if index.is_empty() {
            return Err(SearchError::EmptyIndex(product.to_string()));
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let query_vec = self
            .encoder
            .encode(query)
            .await
            .map_err(|source| SearchError::Encoding {
                product: product.to_string(),
                source,
            })?;

        let index_dims = index.dims().unwrap_or(0);
        if query_vec.len() != index_dims {
            return Err(SearchError::DimensionMismatch {
                product: product.to_string(),
                query: query_vec.len(),
                index: index_dims,
            });
        }

        Ok(index
            .search(&query_vec, k)
            .into_iter()
            .filter_map(|n| {
                index.fragment(n.position).map(|text| RetrievedFragment {
                    product: product.to_string(),
                    position: n.position,
                    distance: n.distance,
                    text: text.to_string(),
                })
            })
            .collect())
    }

    /// Tagged fragments (`[PRODUCT] text`) for `query`, nearest first.
    ///
    /// Never fails: unknown products, empty indexes, and encoder errors are
    /// logged and yield an empty list.
    pub async fn search_similar_chunks(&self, query: &str, product: &str, k: usize) -> Vec<String> {
        match self.search(query, product, k).await {
            Ok(fragments) => {
                if fragments.is_empty() {
                    info!("no relevant chunks found for product {}", product);
                }
                fragments.iter().map(RetrievedFragment::tagged).collect()
            }
            Err(e @ SearchError::UnknownProduct(_)) | Err(e @ SearchError::EmptyIndex(_)) => {
                warn!("{}", e);
                Vec::new()
            }
            Err(e) => {
                error!("error searching chunks for product {}: {}", product, e);
                Vec::new()
            }
        }
    }
}
