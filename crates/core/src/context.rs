//! The per-request context bundle.
//!
//! Assembled by the memory orchestrator before routing, owned exclusively
//! by the request lifecycle, and discarded after the response is emitted.

use serde::{Deserialize, Serialize};

use crate::memory::{EpisodeEntry, SemanticFact};
use crate::request::Turn;

/// Everything the memory layers contributed for one request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextBundle {
    /// Recent turns from the session's working memory, oldest first
    pub working_snippets: Vec<Turn>,

    /// Past turns matching the request, ranked by relevance
    pub episodic_hits: Vec<EpisodeEntry>,

    /// Related facts, ranked by similarity
    pub semantic_hits: Vec<SemanticFact>,

    /// Pre-computed response from the procedural cache, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_hit: Option<String>,

    /// Signature of the active session context at read time; part of the
    /// cache fingerprint so identical text under different context does not
    /// collide
    #[serde(default)]
    pub context_signature: String,
}

impl ContextBundle {
    /// Whether no layer contributed anything.
    pub fn is_empty(&self) -> bool {
        self.working_snippets.is_empty()
            && self.episodic_hits.is_empty()
            && self.semantic_hits.is_empty()
            && self.cache_hit.is_none()
    }

    /// The best relevance score across episodic and semantic hits.
    pub fn best_relevance(&self) -> f32 {
        let episodic = self.episodic_hits.iter().map(|e| e.score);
        let semantic = self.semantic_hits.iter().map(|f| f.score);
        episodic.chain(semantic).fold(0.0, f32::max)
    }

    /// Render the bundle as a text block for prompt injection.
    pub fn render(&self) -> String {
        let mut out = String::new();

        if !self.working_snippets.is_empty() {
            out.push_str("## Recent Turns\n");
            for turn in &self.working_snippets {
                out.push_str(&format!("User: {}\n", turn.input_text));
                out.push_str(&format!("Assistant: {}\n", turn.output_text));
            }
            out.push('\n');
        }

        if !self.episodic_hits.is_empty() {
            out.push_str("## Related Past Turns\n");
            for (i, hit) in self.episodic_hits.iter().enumerate() {
                out.push_str(&format!(
                    "{}. [score={:.2}] Q: {} / A: {}\n",
                    i + 1,
                    hit.score,
                    hit.input_text,
                    hit.output_text
                ));
            }
            out.push('\n');
        }

        if !self.semantic_hits.is_empty() {
            out.push_str("## Known Facts\n");
            for fact in &self.semantic_hits {
                out.push_str(&format!("- {}\n", fact.text));
            }
            out.push('\n');
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{Request, SessionId};

    #[test]
    fn empty_bundle() {
        let bundle = ContextBundle::default();
        assert!(bundle.is_empty());
        assert_eq!(bundle.best_relevance(), 0.0);
        assert_eq!(bundle.render(), "");
    }

    #[test]
    fn best_relevance_spans_layers() {
        let mut bundle = ContextBundle::default();
        let req = Request::new(SessionId::from("s1"), "web", "q");
        let turn = Turn::completed(&req, "chat", "a");
        let mut episode = crate::memory::EpisodeEntry::from_turn(&turn, 0, vec![]);
        episode.score = 0.4;
        bundle.episodic_hits.push(episode);

        let mut fact = crate::memory::SemanticFact::new("f");
        fact.score = 0.9;
        bundle.semantic_hits.push(fact);

        assert!((bundle.best_relevance() - 0.9).abs() < f32::EPSILON);
    }

    #[test]
    fn render_includes_all_sections() {
        let req = Request::new(SessionId::from("s1"), "web", "what about tokyo");
        let turn = Turn::completed(&req, "chat", "tokyo is lovely");

        let bundle = ContextBundle {
            working_snippets: vec![turn.clone()],
            episodic_hits: vec![crate::memory::EpisodeEntry::from_turn(&turn, 0, vec![])],
            semantic_hits: vec![crate::memory::SemanticFact::new("tokyo is in japan")],
            cache_hit: None,
            context_signature: String::new(),
        };

        let rendered = bundle.render();
        assert!(rendered.contains("## Recent Turns"));
        assert!(rendered.contains("## Related Past Turns"));
        assert!(rendered.contains("## Known Facts"));
        assert!(rendered.contains("tokyo is in japan"));
    }

    #[test]
    fn cache_hit_counts_as_content() {
        let bundle = ContextBundle {
            cache_hit: Some("cached".into()),
            ..Default::default()
        };
        assert!(!bundle.is_empty());
    }
}
