//! Asynchronous fact extraction — the episodic → semantic hand-off.
//!
//! Write-back enqueues a job per completed turn; a separate consumer task
//! distills facts and upserts them into the semantic store. Episodic write
//! latency is therefore decoupled from semantic indexing cost. Extraction
//! failures are logged and never propagate.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use switchyard_core::memory::{SemanticFact, SemanticStore};
use switchyard_core::request::Turn;

/// How many salient terms become linked concept facts per turn.
const MAX_TERMS_PER_TURN: usize = 4;
/// Output text is truncated to this length inside summary facts.
const SUMMARY_OUTPUT_CHARS: usize = 200;

const STOPWORDS: &[&str] = &[
    "about", "after", "again", "all", "also", "and", "are", "because", "been", "before", "but",
    "can", "could", "did", "does", "for", "from", "had", "has", "have", "her", "him", "his",
    "how", "into", "its", "just", "like", "more", "most", "not", "now", "only", "other", "our",
    "out", "over", "please", "said", "should", "some", "than", "that", "the", "their", "them",
    "then", "there", "they", "this", "was", "were", "what", "when", "where", "which", "while",
    "who", "why", "will", "with", "would", "you", "your",
];

/// A unit of extraction work handed off at write-back.
#[derive(Debug, Clone)]
pub struct ExtractionJob {
    pub turn: Turn,
    pub tags: Vec<String>,
}

/// Pick the salient terms of a text: words of four or more characters that
/// aren't stopwords, deduplicated in order of first appearance.
pub fn extract_salient_terms(text: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut terms = Vec::new();
    for word in text.to_lowercase().split_whitespace() {
        let clean: String = word.chars().filter(|c| c.is_alphanumeric()).collect();
        if clean.len() < 4 || STOPWORDS.contains(&clean.as_str()) {
            continue;
        }
        if seen.insert(clean.clone()) {
            terms.push(clean);
            if terms.len() >= MAX_TERMS_PER_TURN {
                break;
            }
        }
    }
    terms
}

/// The background consumer that turns episodes into semantic facts.
pub struct FactExtractor {
    store: Arc<dyn SemanticStore>,
}

impl FactExtractor {
    /// Spawn the extractor. Returns the job sender and the task handle.
    ///
    /// The task exits when every sender is dropped.
    pub fn spawn(store: Arc<dyn SemanticStore>) -> (mpsc::UnboundedSender<ExtractionJob>, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<ExtractionJob>();
        let extractor = Self { store };

        let handle = tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                extractor.process(job).await;
            }
            debug!("Fact extractor drained; shutting down");
        });

        (tx, handle)
    }

    async fn process(&self, job: ExtractionJob) {
        let turn = &job.turn;

        // One summary fact per turn, carrying the source reference
        let output = truncate(&turn.output_text, SUMMARY_OUTPUT_CHARS);
        let summary_text = format!("Q: {} → A: {}", turn.input_text, output);
        let summary = SemanticFact::new(summary_text).with_source(turn.request_id.clone());

        let summary_id = match self.store.upsert_fact(summary).await {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "Fact extraction: summary upsert failed");
                return;
            }
        };

        // Concept facts from the salient terms of the exchange, all linked
        // to the summary and pairwise to each other (co-observed terms wire
        // together)
        let mut term_ids = Vec::new();
        for term in extract_salient_terms(&format!("{} {}", turn.input_text, turn.output_text)) {
            match self.store.upsert_fact(SemanticFact::new(&term)).await {
                Ok(id) => term_ids.push(id),
                Err(e) => warn!(term = %term, error = %e, "Fact extraction: term upsert failed"),
            }
        }

        for id in &term_ids {
            if let Err(e) = self.store.link(&summary_id, id).await {
                warn!(error = %e, "Fact extraction: summary link failed");
            }
        }
        for (i, a) in term_ids.iter().enumerate() {
            for b in &term_ids[i + 1..] {
                if let Err(e) = self.store.link(a, b).await {
                    warn!(error = %e, "Fact extraction: term link failed");
                }
            }
        }

        debug!(
            request_id = %turn.request_id,
            terms = term_ids.len(),
            "Extracted facts from turn"
        );
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    text.chars().take(max_chars).collect()
}
