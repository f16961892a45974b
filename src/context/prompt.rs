//! Prompt Assembly
//!
//! Builds a citation-annotated prompt from a question and retrieved hits.
//! Pure: no index or network access, identical inputs give identical output.

use serde::Serialize;

use crate::documents::retriever::Hit;

/// Confidence floor for a hit to enter the context
pub const MIN_SCORE: f32 = 0.25;
/// Character cap on the assembled context, marker excluded
pub const MAX_CONTEXT_CHARS: usize = 8000;
/// Appended when the context was cut at the cap
pub const TRUNCATION_MARKER: &str = "\n… [truncated]";
/// Answer the generator is told to give when the context does not support one
pub const REFUSAL: &str = "I don't know based on the provided documents.";

/// What to use as context when no hit clears the confidence floor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackPolicy {
    /// Keep the N highest-scoring hits regardless of the floor
    TopScoring(usize),
    /// Keep nothing; the generator sees an empty context
    Disabled,
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        FallbackPolicy::TopScoring(2)
    }
}

/// Context block text plus the labels cited in it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssembledContext {
    pub text: String,
    pub citations: Vec<String>,
    pub truncated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Prompt {
    pub system_instructions: String,
    pub user_content: String,
}

impl Prompt {
    /// Single text blob with explicit section markers
    pub fn render(&self) -> String {
        format!(
            "<SYSTEM>\n{}\n</SYSTEM>\n<USER>\n{}\n</USER>",
            self.system_instructions, self.user_content
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PromptAssembler {
    pub min_score: f32,
    pub fallback: FallbackPolicy,
    pub max_context_chars: usize,
}

impl Default for PromptAssembler {
    fn default() -> Self {
        Self {
            min_score: MIN_SCORE,
            fallback: FallbackPolicy::default(),
            max_context_chars: MAX_CONTEXT_CHARS,
        }
    }
}

impl PromptAssembler {
    pub fn assemble(&self, query: &str, hits: &[Hit]) -> Prompt {
        let context = self.build_context(hits);
        Prompt {
            system_instructions: system_instructions(),
            user_content: user_content(query, &context),
        }
    }

    /// Hits at or above the floor, in their existing order, or the fallback set
    pub fn select<'h>(&self, hits: &'h [Hit]) -> Vec<&'h Hit> {
        let relevant: Vec<&Hit> = hits.iter().filter(|h| h.score >= self.min_score).collect();
        if !relevant.is_empty() {
            return relevant;
        }

        match self.fallback {
            FallbackPolicy::TopScoring(n) => {
                let mut ranked: Vec<&Hit> = hits.iter().collect();
                ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
                ranked.truncate(n);
                ranked
            }
            FallbackPolicy::Disabled => Vec::new(),
        }
    }

    pub fn build_context(&self, hits: &[Hit]) -> AssembledContext {
        let selected = self.select(hits);

        let mut blocks = Vec::with_capacity(selected.len());
        let mut citations = Vec::with_capacity(selected.len());
        for (i, hit) in selected.iter().enumerate() {
            let label = hit.label();
            blocks.push(format!("[{}] {}\n{}", i + 1, label, hit.text));
            citations.push(label);
        }

        let (text, truncated) = truncate_chars(blocks.join("\n\n"), self.max_context_chars);
        AssembledContext {
            text,
            citations,
            truncated,
        }
    }
}

/// Cut to `max` characters and mark it; never splits a code point
fn truncate_chars(text: String, max: usize) -> (String, bool) {
    match text.char_indices().nth(max) {
        Some((cut, _)) => {
            let mut out = String::with_capacity(cut + TRUNCATION_MARKER.len());
            out.push_str(&text[..cut]);
            out.push_str(TRUNCATION_MARKER);
            (out, true)
        }
        None => (text, false),
    }
}

fn system_instructions() -> String {
    format!(
        "You are an expert research assistant. Answer the user's question using only the CONTEXT provided.\n\
         - Cite your sources like (Filename p.Page) at the end of each sentence you claim.\n\
         - If the answer is not fully supported, say: \"{}\"",
        REFUSAL
    )
}

fn user_content(query: &str, context: &AssembledContext) -> String {
    format!(
        "QUESTION:\n{}\n\n\
         CONTEXT:\n{}\n\n\
         INSTRUCTIONS:\n\
         - Be concise.\n\
         - Include source references like ({}) after each supported claim.\n\
         - Use content verbatim if appropriate.",
        query,
        context.text,
        context.citations.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::chunker::ChunkMetadata;

    fn hit(file: &str, page: Option<u32>, text: &str, score: f32) -> Hit {
        Hit {
            text: text.to_string(),
            metadata: ChunkMetadata {
                source_file: file.to_string(),
                page_number: page,
            },
            score,
        }
    }

    #[test]
    fn test_assemble_is_pure() {
        let hits = vec![
            hit("a.pdf", Some(1), "alpha", 0.7),
            hit("b.pdf", Some(3), "beta", 0.4),
        ];
        let assembler = PromptAssembler::default();
        let first = assembler.assemble("What is X?", &hits);
        let second = assembler.assemble("What is X?", &hits);
        assert_eq!(first, second);
        assert_eq!(first.render(), second.render());
    }

    #[test]
    fn test_low_scoring_hit_is_filtered() {
        let hits = vec![
            hit("a.pdf", Some(2), "relevant text", 0.6),
            hit("b.pdf", Some(9), "noise", 0.1),
        ];
        let assembler = PromptAssembler::default();
        let context = assembler.build_context(&hits);

        assert_eq!(context.citations, vec!["a.pdf p.2".to_string()]);
        assert_eq!(context.text, "[1] a.pdf p.2\nrelevant text");
        assert!(!context.text.contains("noise"));

        let prompt = assembler.assemble("What is X?", &hits);
        assert!(prompt.user_content.contains("QUESTION:\nWhat is X?\n"));
        assert!(prompt.user_content.contains("(a.pdf p.2)"));
    }

    #[test]
    fn test_fallback_keeps_top_two() {
        let hits = vec![
            hit("a.pdf", Some(1), "one", 0.2),
            hit("b.pdf", Some(2), "two", 0.15),
            hit("c.pdf", Some(3), "three", -0.3),
        ];
        let context = PromptAssembler::default().build_context(&hits);

        assert!(!context.text.is_empty());
        assert_eq!(context.citations, vec!["a.pdf p.1".to_string(), "b.pdf p.2".to_string()]);
        assert!(context.text.starts_with("[1] a.pdf p.1\none\n\n[2] b.pdf p.2\ntwo"));
    }

    #[test]
    fn test_fallback_disabled_leaves_context_empty() {
        let hits = vec![hit("a.pdf", Some(1), "one", 0.1)];
        let assembler = PromptAssembler {
            fallback: FallbackPolicy::Disabled,
            ..PromptAssembler::default()
        };
        let context = assembler.build_context(&hits);
        assert!(context.text.is_empty());
        assert!(context.citations.is_empty());

        let prompt = assembler.assemble("q", &hits);
        assert!(prompt.system_instructions.contains(REFUSAL));
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let hits = vec![hit("a.pdf", Some(1), "edge", MIN_SCORE)];
        let context = PromptAssembler::default().build_context(&hits);
        assert_eq!(context.citations.len(), 1);
    }

    #[test]
    fn test_context_is_capped_with_marker() {
        let long = "é".repeat(3000);
        let hits: Vec<Hit> = (1..=4).map(|p| hit("big.pdf", Some(p), &long, 0.9)).collect();
        let context = PromptAssembler::default().build_context(&hits);

        assert!(context.truncated);
        assert!(context.text.ends_with(TRUNCATION_MARKER));
        assert_eq!(
            context.text.chars().count(),
            MAX_CONTEXT_CHARS + TRUNCATION_MARKER.chars().count()
        );
        // citations still list every block that was assembled
        assert_eq!(context.citations.len(), 4);
    }

    #[test]
    fn test_short_context_is_untouched() {
        let hits = vec![hit("a.pdf", Some(1), "short", 0.9)];
        let context = PromptAssembler::default().build_context(&hits);
        assert!(!context.truncated);
        assert!(!context.text.contains("[truncated]"));
    }

    #[test]
    fn test_unknown_page_label() {
        let hits = vec![hit("?", None, "orphan", 0.9)];
        let context = PromptAssembler::default().build_context(&hits);
        assert!(context.text.starts_with("[1] ? p.?\n"));
    }

    #[test]
    fn test_render_uses_section_markers() {
        let prompt = Prompt {
            system_instructions: "sys".to_string(),
            user_content: "usr".to_string(),
        };
        assert_eq!(prompt.render(), "<SYSTEM>\nsys\n</SYSTEM>\n<USER>\nusr\n</USER>");
    }
}
