//! One-shot corpus ingestion: scan, extract, chunk, embed, persist.
//!
//! Walks the corpus directory applying the configured include/exclude
//! globsets in a deterministic order, extracts plain text (PDF via text
//! extraction, everything else read as UTF-8), chunks with the configured
//! window and overlap, and writes embedded chunks to the knowledge store.
//!
//! Ingestion is additive; `--reset` drops existing chunks first. A file that
//! fails extraction is reported and skipped, never aborting the run.

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use std::time::Instant;
use walkdir::WalkDir;

use crate::chunk::chunk_text;
use crate::config::Config;
use crate::embedding;
use crate::knowledge::KnowledgeBase;
use crate::models::DocumentChunk;

pub async fn run_ingest(config: &Config, corpus: Option<PathBuf>, reset: bool) -> Result<()> {
    let root = corpus.unwrap_or_else(|| config.corpus.root.clone());
    if !root.exists() {
        bail!("corpus directory does not exist: {}", root.display());
    }

    let started = Instant::now();

    println!("Initializing embedding provider ({})...", config.embedding.provider);
    let embedder = embedding::create_embedder(&config.embedding).await?;

    let kb = KnowledgeBase::create_or_open(
        &config.knowledge.dir,
        embedder,
        config.knowledge.top_k,
    )
    .await?;

    if reset {
        let dropped = kb.reset().await?;
        println!("Dropped {} existing chunks.", dropped);
    }

    let files = scan_corpus(&root, &config.corpus.include_globs, &config.corpus.exclude_globs)?;
    println!("Found {} corpus files under {}", files.len(), root.display());

    let mut total_chunks = 0usize;
    let mut ingested_files = 0usize;
    let mut skipped_files = 0usize;

    for path in &files {
        let relative = path
            .strip_prefix(&root)
            .unwrap_or(path)
            .to_string_lossy()
            .to_string();

        let chunks = match read_and_chunk(path, &relative, config) {
            Ok(chunks) => chunks,
            Err(e) => {
                eprintln!("  skipping {}: {:#}", relative, e);
                skipped_files += 1;
                continue;
            }
        };

        if chunks.is_empty() {
            println!("  {} (empty, no chunks)", relative);
            continue;
        }

        let inserted = kb
            .ingest(&chunks, config.embedding.batch_size)
            .await
            .with_context(|| format!("embedding chunks of {}", relative))?;

        println!("  {} -> {} chunks", relative, inserted);
        total_chunks += inserted;
        ingested_files += 1;
    }

    kb.close().await;

    println!(
        "Done: {} files, {} chunks, {} skipped in {:.1}s",
        ingested_files,
        total_chunks,
        skipped_files,
        started.elapsed().as_secs_f64()
    );
    Ok(())
}

/// All matching corpus files in deterministic (path-sorted) order.
fn scan_corpus(root: &Path, include: &[String], exclude: &[String]) -> Result<Vec<PathBuf>> {
    let include_set = build_globset(include)?;
    let exclude_set = build_globset(exclude)?;

    let mut files = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy();

        if exclude_set.is_match(rel_str.as_ref()) || !include_set.is_match(rel_str.as_ref()) {
            continue;
        }
        files.push(path.to_path_buf());
    }

    files.sort();
    Ok(files)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

fn read_and_chunk(path: &Path, relative: &str, config: &Config) -> Result<Vec<DocumentChunk>> {
    let text = extract_text(path)?;
    Ok(chunk_text(
        relative,
        &text,
        config.chunking.max_chars,
        config.chunking.overlap_chars,
    ))
}

/// PDF files go through text extraction; everything else must be UTF-8.
fn extract_text(path: &Path) -> Result<String> {
    let is_pdf = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false);

    if is_pdf {
        let bytes = std::fs::read(path)?;
        pdf_extract::extract_text_from_mem(&bytes)
            .map_err(|e| anyhow::anyhow!("PDF extraction failed: {}", e))
    } else {
        std::fs::read_to_string(path).context("not valid UTF-8")
    }
}
