//! Debug retrieval from the CLI: run a query against the knowledge store and
//! print ranked results.

use anyhow::Result;

use crate::config::Config;
use crate::embedding;
use crate::knowledge::KnowledgeBase;

pub async fn run_search(config: &Config, query: &str, top_k: Option<usize>) -> Result<()> {
    let embedder = embedding::create_embedder(&config.embedding).await?;
    let kb = KnowledgeBase::open(
        &config.knowledge.dir,
        embedder,
        top_k.unwrap_or(config.knowledge.top_k),
    )
    .await?;

    let results = kb.retrieve(query).await?;
    if results.is_empty() {
        println!("No results for: {}", query);
        return Ok(());
    }

    println!("Top {} results for: {}\n", results.len(), query);
    for (rank, chunk) in results.iter().enumerate() {
        println!(
            "{}. [{:.4}] {} (chunk {})",
            rank + 1,
            chunk.score,
            chunk.source,
            chunk.chunk_index
        );
        println!("   {}\n", snippet(&chunk.text, 200));
    }

    kb.close().await;
    Ok(())
}

fn snippet(text: &str, max_chars: usize) -> String {
    let flat = text.replace('\n', " ");
    if flat.chars().count() <= max_chars {
        flat
    } else {
        let cut: String = flat.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}
