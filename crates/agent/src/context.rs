//! Context assembly: pure string building for prompts.
//!
//! Three helpers, no side effects beyond constructing strings:
//! [`assemble_context`] renders the flat prompt used by one-shot
//! callers, [`build_system_prompt`] folds session memory into a system
//! prompt, and [`build_rag_system_prompt`] additionally grounds the
//! prompt with retrieved knowledge-base chunks.

use colloquy_core::model::ToolDefinition;
use colloquy_core::retrieval::RetrievedChunk;

/// Build a flat prompt from user input, the tools on offer, and a
/// memory string.
///
/// An empty memory string or an empty tool list contributes no line at
/// all; the user input line is always last.
pub fn assemble_context(user_input: &str, tools: &[ToolDefinition], memory: &str) -> String {
    let mut prompt = String::new();
    if !memory.is_empty() {
        prompt.push_str(&format!("Memory: {memory}\n"));
    }
    if !tools.is_empty() {
        let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        prompt.push_str(&format!("Tools available: {}\n", names.join(", ")));
    }
    prompt.push_str(&format!("User input: {user_input}"));
    prompt
}

/// Fold memory entries into a system prompt.
///
/// The base instruction, when present, comes first. A non-empty entry
/// list appends a `Past conversation:` block with the entries
/// newline-joined in order. Blocks are separated by one blank line;
/// when both inputs are absent the result is the empty string.
pub fn build_system_prompt(entries: &[String], base: Option<&str>) -> String {
    let mut blocks: Vec<String> = Vec::new();
    if let Some(base) = base
        && !base.is_empty()
    {
        blocks.push(base.to_string());
    }
    if !entries.is_empty() {
        blocks.push(format!("Past conversation:\n{}", entries.join("\n")));
    }
    blocks.join("\n\n")
}

/// Build a system prompt grounded in retrieved knowledge.
///
/// Same block rules as [`build_system_prompt`], with a `## Relevant
/// Context` block between the base instruction and the memory block.
/// Each chunk is prefixed `[<source>] ` when it carries a source;
/// chunks are separated by a blank line. Absent blocks contribute
/// nothing, including their separators.
pub fn build_rag_system_prompt(
    chunks: &[RetrievedChunk],
    entries: &[String],
    base: Option<&str>,
) -> String {
    let mut blocks: Vec<String> = Vec::new();
    if let Some(base) = base
        && !base.is_empty()
    {
        blocks.push(base.to_string());
    }
    if !chunks.is_empty() {
        let rendered: Vec<String> = chunks
            .iter()
            .map(|chunk| match &chunk.source {
                Some(source) => format!("[{source}] {}", chunk.content),
                None => chunk.content.clone(),
            })
            .collect();
        blocks.push(format!("## Relevant Context\n{}", rendered.join("\n\n")));
    }
    if !entries.is_empty() {
        blocks.push(format!("Past conversation:\n{}", entries.join("\n")));
    }
    blocks.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(name: &str) -> ToolDefinition {
        ToolDefinition {
            name: name.into(),
            description: String::new(),
            parameters: serde_json::json!({}),
        }
    }

    #[test]
    fn assemble_all_parts() {
        let tools = vec![def("get_weather"), def("current_time")];
        let prompt = assemble_context("What now?", &tools, "likes tea");
        assert_eq!(
            prompt,
            "Memory: likes tea\nTools available: get_weather, current_time\nUser input: What now?"
        );
    }

    #[test]
    fn assemble_omits_empty_sections() {
        let prompt = assemble_context("Hello", &[], "");
        assert_eq!(prompt, "User input: Hello");
    }

    #[test]
    fn assemble_memory_only() {
        let prompt = assemble_context("Hi", &[], "prefers metric units");
        assert_eq!(prompt, "Memory: prefers metric units\nUser input: Hi");
    }

    #[test]
    fn system_prompt_entries_only() {
        let entries = vec!["User: hi".to_string(), "Assistant: hello".to_string()];
        assert_eq!(
            build_system_prompt(&entries, None),
            "Past conversation:\nUser: hi\nAssistant: hello"
        );
    }

    #[test]
    fn system_prompt_base_only() {
        assert_eq!(build_system_prompt(&[], Some("Be brief.")), "Be brief.");
    }

    #[test]
    fn system_prompt_empty() {
        assert_eq!(build_system_prompt(&[], None), "");
    }

    #[test]
    fn system_prompt_base_and_entries() {
        let entries = vec!["User: hi".to_string()];
        assert_eq!(
            build_system_prompt(&entries, Some("Be brief.")),
            "Be brief.\n\nPast conversation:\nUser: hi"
        );
    }

    #[test]
    fn rag_prompt_all_blocks() {
        let chunks = vec![
            RetrievedChunk {
                content: "Rust 1.0 shipped in 2015.".into(),
                source: Some("history.md".into()),
                score: 0.9,
            },
            RetrievedChunk {
                content: "The borrow checker enforces aliasing rules.".into(),
                source: None,
                score: 0.7,
            },
        ];
        let entries = vec!["User: hi".to_string()];
        let prompt = build_rag_system_prompt(&chunks, &entries, Some("Be helpful."));
        assert_eq!(
            prompt,
            "Be helpful.\n\n## Relevant Context\n[history.md] Rust 1.0 shipped in 2015.\n\n\
             The borrow checker enforces aliasing rules.\n\nPast conversation:\nUser: hi"
        );
    }

    #[test]
    fn rag_prompt_without_chunks_matches_plain() {
        let entries = vec!["User: hi".to_string()];
        assert_eq!(
            build_rag_system_prompt(&[], &entries, Some("Be brief.")),
            build_system_prompt(&entries, Some("Be brief."))
        );
    }

    #[test]
    fn rag_prompt_chunks_only() {
        let chunks = vec![RetrievedChunk {
            content: "fact".into(),
            source: None,
            score: 1.0,
        }];
        assert_eq!(
            build_rag_system_prompt(&chunks, &[], None),
            "## Relevant Context\nfact"
        );
    }
}
