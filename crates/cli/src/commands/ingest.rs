//! The `colloquy ingest` command: embed a document into the knowledge base.

use std::path::Path;

use anyhow::Context;

use colloquy_config::AppConfig;
use colloquy_core::embedding::EmbeddingModel;
use colloquy_memory::PgVectorStore;
use colloquy_models::OpenAiCompatEmbedding;

/// Characters per chunk.
const CHUNK_SIZE: usize = 1000;

/// Characters shared between consecutive chunks.
const CHUNK_OVERLAP: usize = 200;

pub async fn run(file: &Path, source: Option<String>) -> anyhow::Result<()> {
    let config = AppConfig::load().context("Failed to load config")?;

    let Some(url) = &config.database_url else {
        println!("⚠️  No database configured.");
        println!("   Retrieval needs PostgreSQL with pgvector; set DATABASE_URL first.");
        return Ok(());
    };

    let text = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let source = source.or_else(|| file.file_name().map(|n| n.to_string_lossy().into_owned()));

    let chunks = chunk_text(&text, CHUNK_SIZE, CHUNK_OVERLAP);
    if chunks.is_empty() {
        println!("⚠️  {} is empty, nothing to ingest.", file.display());
        return Ok(());
    }

    println!(
        "📥 Ingesting {} ({} chunks)...",
        file.display(),
        chunks.len()
    );

    let embedder = OpenAiCompatEmbedding::from_config(&config)?;
    let store = PgVectorStore::connect(url).await?;

    for (i, chunk) in chunks.iter().enumerate() {
        let embedding = embedder.embed(chunk).await?;
        store.insert(chunk, &embedding, source.as_deref()).await?;
        println!("   [{}/{}] {} chars embedded", i + 1, chunks.len(), chunk.len());
    }

    println!("✅ Ingest complete.");

    Ok(())
}

/// Split text into overlapping windows, breaking at whitespace where
/// one falls inside the window. Windows are sized in characters, so
/// multi-byte text never splits mid-codepoint.
fn chunk_text(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();

    if chars.is_empty() {
        return Vec::new();
    }
    if chars.len() <= size {
        let trimmed = text.trim();
        return if trimmed.is_empty() {
            Vec::new()
        } else {
            vec![trimmed.to_string()]
        };
    }

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let end = (start + size).min(chars.len());

        let cut = if end < chars.len() {
            chars[start..end]
                .iter()
                .rposition(|c| c.is_whitespace())
                .map(|pos| start + pos)
                .unwrap_or(end)
        } else {
            end
        };

        let chunk: String = chars[start..cut].iter().collect();
        let trimmed = chunk.trim();
        if !trimmed.is_empty() {
            chunks.push(trimmed.to_string());
        }

        if end == chars.len() {
            break;
        }

        // The next window starts `overlap` back from the cut, never past
        // it, so no text between the cut and the next window is skipped.
        let next = cut.saturating_sub(overlap);
        start = if next > start {
            next
        } else if cut > start {
            cut
        } else {
            start + 1
        };
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_one_chunk() {
        let chunks = chunk_text("hello world", CHUNK_SIZE, CHUNK_OVERLAP);
        assert_eq!(chunks, vec!["hello world"]);
    }

    #[test]
    fn empty_text_yields_nothing() {
        assert!(chunk_text("", CHUNK_SIZE, CHUNK_OVERLAP).is_empty());
        assert!(chunk_text("   \n  ", CHUNK_SIZE, CHUNK_OVERLAP).is_empty());
    }

    #[test]
    fn long_text_produces_overlapping_chunks() {
        let text = "word ".repeat(100);
        let chunks = chunk_text(&text, 50, 10);

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 50);
            assert!(!chunk.is_empty());
        }
    }

    #[test]
    fn window_ends_fall_on_word_boundaries() {
        let text = "alpha beta gamma delta epsilon ".repeat(20);
        for chunk in chunk_text(&text, 40, 8) {
            let last = chunk.split_whitespace().last().unwrap();
            assert!(
                ["alpha", "beta", "gamma", "delta", "epsilon"].contains(&last),
                "window cut mid-word: {last}"
            );
        }
    }

    #[test]
    fn unbroken_token_at_window_tail_is_not_dropped() {
        // The last whitespace of the first window sits further than
        // `overlap` before the window end; the long token must still
        // land in a later chunk intact.
        let token = "y".repeat(40);
        let text = format!("one two {token} end");
        let chunks = chunk_text(&text, 40, 8);

        assert!(
            chunks.iter().any(|c| c.contains(&token)),
            "token split or dropped: {chunks:?}"
        );
        for word in ["one", "two", "end"] {
            assert!(chunks.iter().any(|c| c.contains(word)), "dropped: {word}");
        }
    }

    #[test]
    fn multibyte_text_chunks_cleanly() {
        let text = "héllo wörld ünïcode ".repeat(30);
        let chunks = chunk_text(&text, 25, 5);
        assert!(!chunks.is_empty());
        for chunk in &chunks {
            assert!(text.contains(chunk.as_str()));
        }
    }
}
