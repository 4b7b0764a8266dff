//! Web search providers for external context research.
//!
//! Research needs only a thin slice of search: a query in, a handful of
//! titled snippets out. The default provider is the DuckDuckGo instant
//! answer API — keyless, rate-limit friendly, good enough for company
//! lookups.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::error::SearchError;

/// Cap on hits returned per query, across abstract + related topics.
const MAX_HITS: usize = 8;

/// One search result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub title: String,
    pub snippet: String,
    pub url: String,
}

/// A source of web search results.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, SearchError>;
}

// ── DuckDuckGo ──────────────────────────────────────────────────────

/// DuckDuckGo instant answer API client.
pub struct DuckDuckGoSearch {
    client: reqwest::Client,
    api_base: String,
    request_timeout: Duration,
}

impl DuckDuckGoSearch {
    pub const DEFAULT_API_BASE: &'static str = "https://api.duckduckgo.com";

    pub fn new(api_base: impl Into<String>, request_timeout: Duration) -> Result<Self, SearchError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("reply-pilot/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SearchError::RequestFailed(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            request_timeout,
        })
    }
}

#[async_trait]
impl SearchProvider for DuckDuckGoSearch {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, SearchError> {
        let response = self
            .client
            .get(format!("{}/", self.api_base))
            .query(&[("q", query), ("format", "json"), ("no_html", "1")])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SearchError::Timeout(self.request_timeout)
                } else {
                    SearchError::RequestFailed(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(SearchError::RequestFailed(format!(
                "search returned HTTP {}",
                response.status()
            )));
        }

        let body: InstantAnswer = response
            .json()
            .await
            .map_err(|e| SearchError::InvalidResponse(format!("malformed search response: {e}")))?;

        let hits = parse_instant_answer(body);
        debug!(query, hits = hits.len(), "Search completed");
        Ok(hits)
    }
}

// ── Instant answer wire format ──────────────────────────────────────

#[derive(Debug, Deserialize)]
struct InstantAnswer {
    #[serde(rename = "Heading", default)]
    heading: String,
    #[serde(rename = "AbstractText", default)]
    abstract_text: String,
    #[serde(rename = "AbstractURL", default)]
    abstract_url: String,
    #[serde(rename = "RelatedTopics", default)]
    related_topics: Vec<RelatedTopic>,
}

/// Related topics are either leaf results or named groups of them. The
/// discriminating fields (`Text` vs `Topics`) stay required so untagged
/// deserialization picks the right variant.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RelatedTopic {
    Leaf {
        #[serde(rename = "Text")]
        text: String,
        #[serde(rename = "FirstURL", default)]
        first_url: String,
    },
    Group {
        #[serde(rename = "Name", default)]
        name: String,
        #[serde(rename = "Topics")]
        topics: Vec<RelatedTopic>,
    },
}

fn parse_instant_answer(answer: InstantAnswer) -> Vec<SearchHit> {
    let mut hits = Vec::new();

    if !answer.abstract_text.is_empty() {
        hits.push(SearchHit {
            title: if answer.heading.is_empty() {
                "Overview".to_string()
            } else {
                answer.heading.clone()
            },
            snippet: answer.abstract_text,
            url: answer.abstract_url,
        });
    }

    collect_topics(&mut hits, answer.related_topics, None);
    hits.truncate(MAX_HITS);
    hits
}

fn collect_topics(hits: &mut Vec<SearchHit>, topics: Vec<RelatedTopic>, group: Option<&str>) {
    for topic in topics {
        if hits.len() >= MAX_HITS {
            return;
        }
        match topic {
            RelatedTopic::Leaf { text, first_url } => {
                if text.is_empty() {
                    continue;
                }
                hits.push(SearchHit {
                    title: group.unwrap_or("Related").to_string(),
                    snippet: text,
                    url: first_url,
                });
            }
            RelatedTopic::Group { name, topics } => {
                let label = if name.is_empty() { None } else { Some(name) };
                collect_topics(hits, topics, label.as_deref());
            }
        }
    }
}
