//! Embedded basketball rules knowledge
//!
//! The rules text is pasted wholesale into the system prompt; there is no
//! retrieval step. Chunks are only used to show the user what is embedded.

use std::sync::OnceLock;

/// Assistant persona and answering rules.
pub const SYSTEM_INSTRUCTIONS: &str = include_str!("../data/system_instructions.md");

/// FIBA 2024 rules, interpretations and equipment specifications.
pub const BASKETBALL_KNOWLEDGE: &str = include_str!("../data/fiba_rules_2024.md");

pub const REFEREE_QA_INTRO: &str = include_str!("../data/referee_qa_intro.md");
pub const REFEREE_QA_SAMPLES: &str = include_str!("../data/referee_qa_samples.md");
pub const QA_SEARCH_INSTRUCTIONS: &str = include_str!("../data/qa_search_instructions.md");

/// Opening assistant message of every conversation.
pub const GREETING: &str = "Hello! I'm RefAI, your basketball rules assistant with complete knowledge of the official FIBA 2024 rules. I can help you understand any basketball rule, violation, foul, or equipment specification. What would you like to know?";

/// Chunks shorter than this are headings or separators, not content.
const MIN_CHUNK_LEN: usize = 100;

/// The full system prompt sent ahead of every conversation.
pub fn system_prompt() -> &'static str {
    static PROMPT: OnceLock<String> = OnceLock::new();
    PROMPT.get_or_init(|| {
        [
            SYSTEM_INSTRUCTIONS,
            BASKETBALL_KNOWLEDGE,
            REFEREE_QA_INTRO,
            REFEREE_QA_SAMPLES,
            QA_SEARCH_INSTRUCTIONS,
        ]
        .iter()
        .map(|part| part.trim())
        .collect::<Vec<_>>()
        .join("\n\n")
    })
}

/// Which official document a chunk of knowledge came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KnowledgeSource {
    Rules,
    Interpretations,
    Equipment,
    General,
}

impl KnowledgeSource {
    pub fn display_name(&self) -> &'static str {
        match self {
            KnowledgeSource::Rules => "Rules",
            KnowledgeSource::Interpretations => "Interpretations",
            KnowledgeSource::Equipment => "Equipment",
            KnowledgeSource::General => "General",
        }
    }
}

#[derive(Debug, Clone)]
pub struct KnowledgeChunk {
    pub id: usize,
    pub content: &'static str,
    pub source: KnowledgeSource,
}

impl KnowledgeChunk {
    /// First line of the chunk, without markdown heading markers
    pub fn title(&self) -> &'static str {
        self.content
            .lines()
            .next()
            .unwrap_or_default()
            .trim_start_matches('#')
            .trim()
    }
}

/// Split the rules text on third-level headings.
pub fn knowledge_chunks() -> Vec<KnowledgeChunk> {
    BASKETBALL_KNOWLEDGE
        .split("\n### ")
        .filter(|chunk| chunk.trim().len() > MIN_CHUNK_LEN)
        .enumerate()
        .map(|(id, content)| KnowledgeChunk {
            id,
            content,
            source: classify(content),
        })
        .collect()
}

fn classify(chunk: &str) -> KnowledgeSource {
    if chunk.contains("DOCUMENT 1") {
        KnowledgeSource::Rules
    } else if chunk.contains("DOCUMENT 2") {
        KnowledgeSource::Interpretations
    } else if chunk.contains("DOCUMENT 3") {
        KnowledgeSource::Equipment
    } else {
        KnowledgeSource::General
    }
}

/// One of the official documents the knowledge base was extracted from
#[derive(Debug, Clone, Copy)]
pub struct SourceDocument {
    pub title: &'static str,
    pub pages: u32,
    pub description: &'static str,
    pub topics: &'static [&'static str],
}

pub const SOURCE_DOCUMENTS: [SourceDocument; 3] = [
    SourceDocument {
        title: "Official Basketball Rules 2024",
        pages: 105,
        description: "Complete FIBA basketball rules including game structure, violations, fouls, and playing regulations.",
        topics: &["Game Structure", "Court & Equipment", "Teams", "Playing Regulations", "Violations", "Fouls"],
    },
    SourceDocument {
        title: "Official Interpretations 2024",
        pages: 142,
        description: "Detailed interpretations and clarifications of complex rule situations with examples.",
        topics: &["Traveling Cases", "Shot Clock Situations", "Goaltending Examples", "Foul Interpretations", "Special Situations"],
    },
    SourceDocument {
        title: "Basketball Equipment Specifications",
        pages: 31,
        description: "Technical specifications for basketball equipment including court, ball, and facilities.",
        topics: &["Court Dimensions", "Basket Specifications", "Ball Standards", "Lighting", "Safety Requirements"],
    },
];

/// Valid-as-of date shared by all three documents.
pub const VALID_AS_OF: &str = "October 1, 2024";

pub fn total_pages() -> u32 {
    SOURCE_DOCUMENTS.iter().map(|d| d.pages).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_prompt_embeds_every_part() {
        let prompt = system_prompt();
        assert!(prompt.starts_with("You are a specialized basketball rules assistant"));
        assert!(prompt.contains("Article 25"));
        assert!(prompt.contains("FIBA REFEREE Q&A DATABASE"));
        assert!(prompt.contains("When a user asks a referee situation question"));
    }

    #[test]
    fn test_chunks_are_classified_by_document() {
        let chunks = knowledge_chunks();
        assert!(!chunks.is_empty());
        assert!(chunks.iter().all(|c| c.content.trim().len() > MIN_CHUNK_LEN));
        assert!(chunks.iter().any(|c| c.source == KnowledgeSource::Rules));
        assert!(chunks.iter().any(|c| c.source == KnowledgeSource::General));
    }

    #[test]
    fn test_total_pages() {
        assert_eq!(total_pages(), 278);
    }
}
