use std::path::Path;

use anyhow::Result;

use crate::catalog::discover_products;
use crate::index::ProductIndex;

/// Print every product under `root` with its load status.
///
/// Loads the indexes directly; no embedding model is needed.
pub fn list_products(root: &Path) -> Result<()> {
    let products = discover_products(root)?;
    if products.is_empty() {
        println!("No products found under {}.", root.display());
        return Ok(());
    }

    println!(
        "{:<24} {:<20} {:>9} {:>8} DIMS",
        "PRODUCT", "STATUS", "FRAGMENTS", "VECTORS"
    );
    for (key, paths) in &products {
        let index = ProductIndex::load(key, paths);
        let dims = index
            .dims()
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<24} {:<20} {:>9} {:>8} {}",
            key,
            index.status().as_str(),
            index.fragments().len(),
            index.vector_count(),
            dims
        );
    }

    Ok(())
}
