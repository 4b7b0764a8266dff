//! Historical email index — read-only nearest-neighbor search.
//!
//! The index is precomputed out-of-band and read-only during normal
//! operation; concurrent reads need no locking. The in-memory
//! implementation is enough for the bundled sample corpus; anything
//! larger sits behind the same trait.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tracing::warn;

use crate::llm::EmbeddingProvider;

/// A nearest-neighbor hit: historical email text with its similarity score.
#[derive(Debug, Clone)]
pub struct ScoredEmail {
    pub text: String,
    pub score: f32,
    pub sent_at: DateTime<Utc>,
}

/// Read interface over the historical email corpus.
#[async_trait]
pub trait HistoricalEmailIndex: Send + Sync {
    /// Top-k entries by cosine similarity, descending; equal scores break
    /// toward more recent emails. An empty corpus yields an empty list.
    async fn nearest(&self, query: &[f32], k: usize) -> Vec<ScoredEmail>;
}

/// An indexed historical email (a sent reply plus the inquiry it answered).
#[derive(Debug, Clone)]
pub struct IndexedEmail {
    pub text: String,
    pub embedding: Vec<f32>,
    pub sent_at: DateTime<Utc>,
}

/// In-memory brute-force cosine index.
#[derive(Default)]
pub struct InMemoryEmailIndex {
    entries: Vec<IndexedEmail>,
}

impl InMemoryEmailIndex {
    pub fn new(entries: Vec<IndexedEmail>) -> Self {
        Self { entries }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl HistoricalEmailIndex for InMemoryEmailIndex {
    async fn nearest(&self, query: &[f32], k: usize) -> Vec<ScoredEmail> {
        let mut scored: Vec<ScoredEmail> = self
            .entries
            .iter()
            .map(|entry| ScoredEmail {
                text: entry.text.clone(),
                score: cosine_similarity(query, &entry.embedding),
                sent_at: entry.sent_at,
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.sent_at.cmp(&a.sent_at))
        });
        scored.truncate(k);
        scored
    }
}

/// Cosine similarity; zero vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Embed a document set into an in-memory index.
///
/// Documents whose embedding call fails are skipped with a warning — a
/// thinner corpus degrades retrieval, it doesn't block startup.
pub async fn build_index(
    embeddings: &dyn EmbeddingProvider,
    docs: Vec<(String, DateTime<Utc>)>,
) -> InMemoryEmailIndex {
    let mut entries = Vec::with_capacity(docs.len());
    for (text, sent_at) in docs {
        match embeddings.embed(&text).await {
            Ok(embedding) => entries.push(IndexedEmail {
                text,
                embedding,
                sent_at,
            }),
            Err(e) => warn!(error = %e, "Skipping corpus document, embedding failed"),
        }
    }
    InMemoryEmailIndex::new(entries)
}

/// Bundled sample corpus: historical inquiry/response pairs used to seed
/// the index when no real corpus is configured.
pub fn sample_corpus() -> Vec<(String, DateTime<Utc>)> {
    let ts = |y, m, d| Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).single().unwrap_or_default();
    vec![
        (
            "EMAIL: Subject: Seed Funding for AI-Driven Fintech Startup\n\
             Dear Investment Team, my name is Sarah Chen, co-founder and CEO of BudgetIQ, \
             an AI-driven personal finance platform. We have 5,000 active users growing 15% \
             month over month and are raising a $1.5M seed round.\n\n\
             RESPONSE: Dear Sarah, thank you for reaching out about BudgetIQ. Your early \
             traction metrics are promising. Could you send over your pitch deck and financial \
             projections before our call? I'm available Tuesday at 2 PM PT or Wednesday at \
             10 AM PT. Best regards,"
                .to_string(),
            ts(2024, 11, 4),
        ),
        (
            "EMAIL: Subject: Series A Opportunity - SupplyChainAI\n\
             Hello, I'm Marcus Webb, CEO of SupplyChainAI. We provide predictive logistics \
             analytics for mid-market manufacturers, $2.1M ARR, and are raising an $8M \
             Series A led by our existing seed investors.\n\n\
             RESPONSE: Hi Marcus, thanks for the detailed introduction to SupplyChainAI. \
             Logistics analytics is a space we follow closely, and your ARR growth stands \
             out. I'd like to include my partner in a first call — could you share times \
             next week? Best regards,"
                .to_string(),
            ts(2025, 1, 21),
        ),
        (
            "EMAIL: Subject: Intro - Climate Tech Seed Round\n\
             Dear fund team, I'm Aisha Okafor, founder of GridMesh, building software for \
             distributed battery fleet coordination. We're pre-revenue with two pilot \
             utilities and raising a $2M seed round.\n\n\
             RESPONSE: Dear Aisha, thank you for thinking of us for GridMesh's seed round. \
             Pre-revenue utility pilots can be compelling when the deployment pipeline is \
             concrete — could you share more on the pilot conversion terms? Happy to find \
             time this week. Best regards,"
                .to_string(),
            ts(2025, 3, 10),
        ),
        (
            "EMAIL: Subject: Partnership inquiry from DevTools startup\n\
             Hi, Tom Ruiz here, co-founder of StackProbe. We make observability tooling for \
             platform teams and closed our seed last year. Exploring strategic investors for \
             our A round later this year.\n\n\
             RESPONSE: Hi Tom, appreciate the early heads-up on StackProbe's A round. We \
             typically engage a quarter ahead of a formal process, so the timing works. \
             Let's set up an intro call — my calendar link is below. Best regards,"
                .to_string(),
            ts(2025, 5, 2),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(text: &str, embedding: Vec<f32>, y: i32, m: u32, d: u32) -> IndexedEmail {
        IndexedEmail {
            text: text.into(),
            embedding,
            sent_at: Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn cosine_basics() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        // Mismatched or zero vectors score 0
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }

    #[tokio::test]
    async fn empty_corpus_returns_empty() {
        let index = InMemoryEmailIndex::empty();
        assert!(index.nearest(&[1.0, 0.0], 5).await.is_empty());
    }

    #[tokio::test]
    async fn nearest_sorts_by_descending_score() {
        let index = InMemoryEmailIndex::new(vec![
            entry("far", vec![0.0, 1.0], 2025, 1, 1),
            entry("close", vec![1.0, 0.1], 2025, 1, 1),
            entry("exact", vec![1.0, 0.0], 2025, 1, 1),
        ]);
        let hits = index.nearest(&[1.0, 0.0], 3).await;
        assert_eq!(hits[0].text, "exact");
        assert_eq!(hits[1].text, "close");
        assert_eq!(hits[2].text, "far");
        assert!(hits[0].score >= hits[1].score && hits[1].score >= hits[2].score);
    }

    #[tokio::test]
    async fn equal_scores_break_by_recency() {
        // Identical embeddings → identical scores; newer must come first.
        let index = InMemoryEmailIndex::new(vec![
            entry("old", vec![1.0, 0.0], 2023, 6, 1),
            entry("newest", vec![1.0, 0.0], 2025, 6, 1),
            entry("middle", vec![1.0, 0.0], 2024, 6, 1),
        ]);
        let hits = index.nearest(&[1.0, 0.0], 3).await;
        let order: Vec<&str> = hits.iter().map(|h| h.text.as_str()).collect();
        assert_eq!(order, vec!["newest", "middle", "old"]);
    }

    #[tokio::test]
    async fn k_truncates_results() {
        let index = InMemoryEmailIndex::new(vec![
            entry("a", vec![1.0, 0.0], 2025, 1, 1),
            entry("b", vec![0.9, 0.1], 2025, 1, 2),
            entry("c", vec![0.0, 1.0], 2025, 1, 3),
        ]);
        assert_eq!(index.nearest(&[1.0, 0.0], 2).await.len(), 2);
    }

    #[test]
    fn sample_corpus_has_timestamps_and_pairs() {
        let corpus = sample_corpus();
        assert!(corpus.len() >= 3);
        for (text, _ts) in &corpus {
            assert!(text.contains("EMAIL:"));
            assert!(text.contains("RESPONSE:"));
        }
    }

    #[tokio::test]
    async fn build_index_skips_failed_embeddings() {
        use crate::error::LlmError;
        use async_trait::async_trait;

        struct HalfBroken;

        #[async_trait]
        impl EmbeddingProvider for HalfBroken {
            async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
                if text.contains("bad") {
                    Err(LlmError::RequestFailed {
                        reason: "boom".into(),
                    })
                } else {
                    Ok(vec![1.0, 0.0])
                }
            }
        }

        let docs = vec![
            ("good doc".to_string(), Utc::now()),
            ("bad doc".to_string(), Utc::now()),
        ];
        let index = build_index(&HalfBroken, docs).await;
        assert_eq!(index.len(), 1);
    }
}
