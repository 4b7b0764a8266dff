//! Shared types for the response-generation pipeline.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Entity record ───────────────────────────────────────────────────

/// Structured fields extracted from unstructured email text.
///
/// Created once by the extractor, immutable afterwards, consumed by both
/// enrichment branches and the composer. `sender_email` is the only
/// mandatory field; everything the sender didn't state stays `None`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityRecord {
    pub sender_name: Option<String>,
    pub sender_email: String,
    pub company: Option<String>,
    pub industry: Option<String>,
    pub funding_stage: Option<String>,
    /// One-line summary of what the sender is asking for.
    pub request_summary: String,
    pub key_points: Vec<String>,
    /// Subject of the inbound email, when headers were present.
    pub subject: Option<String>,
    /// The full original text, kept for style retrieval queries.
    pub raw_text: String,
}

// ── Style profile ───────────────────────────────────────────────────

/// A historical email similar to the inbound one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StyleExemplar {
    pub text: String,
    /// Cosine similarity against the query, in [-1, 1].
    pub score: f32,
}

/// Tone and style guidance derived from similar historical emails.
///
/// Invariant: `exemplars` sorted by descending score (ties broken by
/// recency at retrieval time), at most K entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StyleProfile {
    pub exemplars: Vec<StyleExemplar>,
    /// Free-form tone label, e.g. "warm but direct".
    pub tone: String,
    /// Greeting/sign-off phrases lifted from the exemplars.
    pub phrases: Vec<String>,
}

impl StyleProfile {
    /// The degraded profile: no exemplars, a defined default tone.
    /// Returned when the corpus is empty or the branch fails.
    pub fn neutral(default_tone: &str) -> Self {
        Self {
            exemplars: Vec::new(),
            tone: default_tone.to_string(),
            phrases: Vec::new(),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.exemplars.is_empty()
    }
}

// ── External context ────────────────────────────────────────────────

/// Categories of externally researched facts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactCategory {
    CompanyOverview,
    RecentNews,
    FundingHistory,
}

impl FactCategory {
    pub const ALL: [FactCategory; 3] = [
        FactCategory::CompanyOverview,
        FactCategory::RecentNews,
        FactCategory::FundingHistory,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::CompanyOverview => "company_overview",
            Self::RecentNews => "recent_news",
            Self::FundingHistory => "funding_history",
        }
    }

    /// Search query suffix for this category.
    pub fn query_suffix(&self) -> &'static str {
        match self {
            Self::CompanyOverview => "company overview",
            Self::RecentNews => "recent news",
            Self::FundingHistory => "funding history",
        }
    }
}

/// A researched fact with source attribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fact {
    pub text: String,
    /// URL or provider label the fact came from.
    pub source: String,
}

/// Externally researched facts, bucketed by category.
///
/// A category that errored or timed out is simply absent (or empty) —
/// the composer treats both the same.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExternalContext {
    buckets: BTreeMap<FactCategory, Vec<Fact>>,
}

impl ExternalContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, category: FactCategory, facts: Vec<Fact>) {
        self.buckets.insert(category, facts);
    }

    pub fn facts(&self, category: FactCategory) -> &[Fact] {
        self.buckets.get(&category).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Categories that actually hold at least one fact.
    pub fn populated(&self) -> impl Iterator<Item = (FactCategory, &[Fact])> {
        self.buckets
            .iter()
            .filter(|(_, facts)| !facts.is_empty())
            .map(|(c, facts)| (*c, facts.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.values().all(Vec::is_empty)
    }
}

// ── Draft and approval ──────────────────────────────────────────────

/// What fed into the draft, best-effort.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvenanceNote {
    pub kind: ProvenanceKind,
    /// Exemplar index or fact source.
    pub source: String,
    /// Whether the element's wording visibly surfaces in the body.
    pub cited: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvenanceKind {
    StyleExemplar,
    Fact,
}

/// A composed reply awaiting human review.
///
/// Never mutated after composition: edits at the approval gate produce a
/// fresh [`ApprovedResponse`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftResponse {
    pub subject: String,
    pub body: String,
    pub recipient: String,
    pub cc: Vec<String>,
    pub provenance: Vec<ProvenanceNote>,
    /// Unsupported-claim warnings for the reviewer. A non-empty list means
    /// "read carefully", not "reject".
    pub review_flags: Vec<String>,
}

/// The reviewed, final reply. Immutable once created; sole dispatcher input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovedResponse {
    pub subject: String,
    pub body: String,
    pub recipient: String,
    pub cc: Vec<String>,
    pub approved_at: DateTime<Utc>,
}

impl ApprovedResponse {
    /// Approve a draft as-is.
    pub fn from_draft(draft: &DraftResponse) -> Self {
        Self {
            subject: draft.subject.clone(),
            body: draft.body.clone(),
            recipient: draft.recipient.clone(),
            cc: draft.cc.clone(),
            approved_at: Utc::now(),
        }
    }

    /// Approve a draft with an edited body.
    pub fn from_edited(draft: &DraftResponse, body: String) -> Self {
        Self {
            body,
            ..Self::from_draft(draft)
        }
    }
}

// ── Send result ─────────────────────────────────────────────────────

/// Terminal status of a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SendStatus {
    Sent,
    /// Simulated delivery — the transport was never contacted.
    DemoSimulated,
    Failed,
}

/// Terminal outcome of a dispatch, persisted to the send log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendResult {
    pub status: SendStatus,
    pub error_detail: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl SendResult {
    pub fn sent() -> Self {
        Self {
            status: SendStatus::Sent,
            error_detail: None,
            timestamp: Utc::now(),
        }
    }

    pub fn simulated(detail: Option<String>) -> Self {
        Self {
            status: SendStatus::DemoSimulated,
            error_detail: detail,
            timestamp: Utc::now(),
        }
    }

    pub fn failed(detail: String) -> Self {
        Self {
            status: SendStatus::Failed,
            error_detail: Some(detail),
            timestamp: Utc::now(),
        }
    }
}
