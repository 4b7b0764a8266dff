//! Historical style retrieval.
//!
//! Branch A of the enrichment stage: embed a query built from the inbound
//! email, pull the nearest historical emails, and distill a tone label and
//! recurring phrases from them. This branch never fails a run — every error
//! path degrades to [`StyleProfile::neutral`].

use std::sync::Arc;

use regex::Regex;
use tracing::{debug, warn};

use crate::config::RetrieverConfig;
use crate::index::HistoricalEmailIndex;
use crate::llm::retry::complete_with_retries;
use crate::llm::{ChatMessage, CompletionRequest, EmbeddingProvider, LlmProvider};
use crate::pipeline::types::{EntityRecord, StyleExemplar, StyleProfile};

pub struct StyleRetriever {
    embeddings: Arc<dyn EmbeddingProvider>,
    llm: Arc<dyn LlmProvider>,
    index: Arc<dyn HistoricalEmailIndex>,
    config: RetrieverConfig,
}

impl StyleRetriever {
    pub fn new(
        embeddings: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn LlmProvider>,
        index: Arc<dyn HistoricalEmailIndex>,
        config: RetrieverConfig,
    ) -> Self {
        Self {
            embeddings,
            llm,
            index,
            config,
        }
    }

    /// Build a style profile for the inbound email. Infallible: corpus
    /// misses, embedding failures, and tone-derivation failures all
    /// degrade rather than error.
    pub async fn retrieve(&self, entity: &EntityRecord) -> StyleProfile {
        let query = build_query(entity);

        let embedding = match self.embeddings.embed(&query).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "Style retrieval degraded, query embedding failed");
                return StyleProfile::neutral(&self.config.default_tone);
            }
        };

        let hits = self.index.nearest(&embedding, self.config.top_k).await;
        if hits.is_empty() {
            debug!("Style retrieval degraded, no historical emails matched");
            return StyleProfile::neutral(&self.config.default_tone);
        }

        let mut exemplars: Vec<StyleExemplar> = hits
            .into_iter()
            .map(|hit| StyleExemplar {
                text: hit.text,
                score: hit.score,
            })
            .collect();
        // The index already orders by score; re-sort in case another
        // implementation doesn't.
        exemplars.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        exemplars.truncate(self.config.top_k);

        let tone = self.derive_tone(&exemplars).await;
        let phrases = derive_phrases(&exemplars);

        debug!(
            exemplars = exemplars.len(),
            tone = %tone,
            "Style profile assembled"
        );
        StyleProfile {
            exemplars,
            tone,
            phrases,
        }
    }

    /// Ask the model to name the tone of the exemplar set. Falls back to
    /// the default tone on any LLM failure.
    async fn derive_tone(&self, exemplars: &[StyleExemplar]) -> String {
        let samples: Vec<&str> = exemplars.iter().map(|e| e.text.as_str()).collect();
        let prompt = format!(
            "Describe the writing tone of these email responses in at most five words \
             (for example: \"warm but direct\"). Reply with the tone phrase only.\n\n{}",
            samples.join("\n---\n")
        );
        let request = CompletionRequest::new(vec![ChatMessage::user(prompt)])
            .with_temperature(0.0)
            .with_max_tokens(32);

        match complete_with_retries(&self.llm, request, 1).await {
            Ok(response) => {
                let tone = response.content.trim().trim_matches('"').to_string();
                if tone.is_empty() {
                    self.config.default_tone.clone()
                } else {
                    tone
                }
            }
            Err(e) => {
                warn!(error = %e, "Tone derivation failed, using default tone");
                self.config.default_tone.clone()
            }
        }
    }
}

/// Retrieval query: what the sender is asking about, plus their industry
/// when known. Matches on topic, not on the sender's own wording quirks.
fn build_query(entity: &EntityRecord) -> String {
    let mut parts = Vec::new();
    if let Some(industry) = &entity.industry {
        parts.push(industry.as_str());
    }
    parts.push(entity.request_summary.as_str());
    parts.join(" ")
}

/// Pull greeting and sign-off lines out of the exemplar responses.
fn derive_phrases(exemplars: &[StyleExemplar]) -> Vec<String> {
    let greeting = Regex::new(r"(?im)^\s*(Dear|Hi|Hello)\b[^\n,]*,?")
        .ok();
    let signoff = Regex::new(r"(?im)^\s*(Best regards|Kind regards|Warm regards|Sincerely|Best|Cheers)\b[^\n]*")
        .ok();

    let mut phrases = Vec::new();
    for exemplar in exemplars {
        for re in [&greeting, &signoff].into_iter().flatten() {
            if let Some(m) = re.find(&exemplar.text) {
                let phrase = m.as_str().trim().to_string();
                if !phrases.contains(&phrase) {
                    phrases.push(phrase);
                }
            }
        }
    }
    phrases
}
