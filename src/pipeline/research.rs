//! External context research.
//!
//! Branch B of the enrichment stage: one search-plus-summarize sub-query
//! per fact category, run concurrently, each under its own timeout. Like
//! style retrieval, this branch never fails a run — a category that
//! errors or times out just yields an empty bucket.

use std::sync::Arc;

use futures::future::join_all;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::ResearchConfig;
use crate::error::SearchError;
use crate::llm::retry::complete_with_retries;
use crate::llm::{self, ChatMessage, CompletionRequest, LlmProvider};
use crate::pipeline::types::{EntityRecord, ExternalContext, Fact, FactCategory};
use crate::search::{SearchHit, SearchProvider};

pub struct ContextResearcher {
    llm: Arc<dyn LlmProvider>,
    search: Arc<dyn SearchProvider>,
    config: ResearchConfig,
}

impl ContextResearcher {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        search: Arc<dyn SearchProvider>,
        config: ResearchConfig,
    ) -> Self {
        Self {
            llm,
            search,
            config,
        }
    }

    /// Research every fact category for the sender's company. Infallible:
    /// failed categories come back empty, never as errors.
    pub async fn research(&self, entity: &EntityRecord) -> ExternalContext {
        let Some(subject) = research_subject(entity) else {
            warn!("Research skipped, no company or sender name to search for");
            return ExternalContext::new();
        };

        let queries = FactCategory::ALL.map(|category| {
            let query = format!("{subject} {}", category.query_suffix());
            async move {
                let outcome = tokio::time::timeout(
                    self.config.query_timeout,
                    self.research_category(category, &query),
                )
                .await;
                let facts = match outcome {
                    Ok(facts) => facts,
                    Err(_) => {
                        warn!(category = category.label(), "Research sub-query timed out");
                        Vec::new()
                    }
                };
                (category, facts)
            }
        });

        let mut context = ExternalContext::new();
        for (category, facts) in join_all(queries).await {
            debug!(
                category = category.label(),
                facts = facts.len(),
                "Research sub-query finished"
            );
            context.insert(category, facts);
        }
        context
    }

    /// One category: search, then have the model distill the hits into
    /// attributed facts. Any failure yields an empty list.
    async fn research_category(&self, category: FactCategory, query: &str) -> Vec<Fact> {
        let hits = match self.search.search(query).await {
            Ok(hits) => hits,
            Err(e @ SearchError::Timeout(_)) => {
                warn!(category = category.label(), error = %e, "Search timed out");
                return Vec::new();
            }
            Err(e) => {
                warn!(category = category.label(), error = %e, "Search failed");
                return Vec::new();
            }
        };
        if hits.is_empty() {
            return Vec::new();
        }

        match self.summarize_hits(category, &hits).await {
            Ok(facts) => facts,
            Err(e) => {
                warn!(category = category.label(), error = %e, "Fact summarization failed");
                Vec::new()
            }
        }
    }

    async fn summarize_hits(
        &self,
        category: FactCategory,
        hits: &[SearchHit],
    ) -> Result<Vec<Fact>, crate::error::LlmError> {
        let sources: String = hits
            .iter()
            .map(|hit| format!("- [{}] {} ({})", hit.title, hit.snippet, hit.url))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "Extract up to {max} concise facts about the category \"{label}\" from \
             these search results. Only state what the results support; do not \
             speculate. Respond with a JSON array of objects with keys \"fact\" \
             and \"source\" (the source URL).\n\nSearch results:\n{sources}",
            max = self.config.max_facts,
            label = category.label(),
        );
        let request = CompletionRequest::new(vec![ChatMessage::user(prompt)])
            .with_temperature(0.0)
            .with_max_tokens(512);

        let response = complete_with_retries(&self.llm, request, 1).await?;
        let raw = llm::extract_json_array(&response.content);
        let parsed: Vec<RawFact> = serde_json::from_str(&raw)?;

        let mut facts: Vec<Fact> = parsed
            .into_iter()
            .filter(|f| !f.fact.trim().is_empty())
            .map(|f| Fact {
                text: f.fact,
                source: attribute_source(f.source, hits),
            })
            .collect();
        facts.truncate(self.config.max_facts);
        Ok(facts)
    }
}

#[derive(Debug, Deserialize)]
struct RawFact {
    #[serde(default)]
    fact: String,
    #[serde(default)]
    source: String,
}

/// What to search for: the company when known, else the sender's name.
fn research_subject(entity: &EntityRecord) -> Option<&str> {
    entity
        .company
        .as_deref()
        .or(entity.sender_name.as_deref())
        .filter(|s| !s.trim().is_empty())
}

/// Keep the model's source only if it matches a real hit URL; otherwise
/// fall back to the first hit so attribution never points nowhere.
fn attribute_source(claimed: String, hits: &[SearchHit]) -> String {
    if !claimed.is_empty() && hits.iter().any(|h| h.url == claimed) {
        return claimed;
    }
    hits.first().map(|h| h.url.clone()).unwrap_or(claimed)
}
