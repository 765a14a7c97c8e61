use anyhow::Result;

use crate::catalog::RetrievalCatalog;

/// Print the tagged fragments retrieved for `query`, nearest first.
pub async fn run_search(
    catalog: &RetrievalCatalog,
    query: &str,
    product: &str,
    k: usize,
) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    let chunks = catalog.search_similar_chunks(query, product, k).await;
    if chunks.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, chunk) in chunks.iter().enumerate() {
        println!("{}. {}", i + 1, chunk.replace('\n', " ").trim());
    }
    Ok(())
}
