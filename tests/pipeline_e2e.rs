//! End-to-end pipeline tests over mock providers.
//!
//! The LLM mock dispatches on prompt markers so one provider serves every
//! stage; transport, search, and the send log are all in-memory.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use reply_pilot::approval::{ApprovalDecision, ApprovalGate, AutoApprovalGate};
use reply_pilot::config::{
    ComposerConfig, DispatchConfig, ExtractorConfig, ResearchConfig, RetrieverConfig,
};
use reply_pilot::dispatch::{Dispatcher, SendTransport};
use reply_pilot::error::{Error, LlmError, LogError, SearchError, TransportError};
use reply_pilot::index::{InMemoryEmailIndex, IndexedEmail};
use reply_pilot::llm::{
    CompletionRequest, CompletionResponse, EmbeddingProvider, LlmProvider,
};
use reply_pilot::logsink::{LogSink, SendRecord};
use reply_pilot::pipeline::composer::ResponseComposer;
use reply_pilot::pipeline::extractor::EntityExtractor;
use reply_pilot::pipeline::research::ContextResearcher;
use reply_pilot::pipeline::retriever::StyleRetriever;
use reply_pilot::pipeline::runner::{Pipeline, RunOutcome};
use reply_pilot::pipeline::types::{ApprovedResponse, DraftResponse, SendStatus};
use reply_pilot::search::{SearchHit, SearchProvider};

const JANE_EMAIL: &str = "From: Jane Doe <jane@acme.vc>\n\
    Subject: Series A Opportunity\n\n\
    Hi, I'm Jane Doe, partner at Acme Ventures. We're leading fintech \
    Series A rounds and would love an intro call about your fund.\n\n\
    Best regards,\nJane";

// ── Mocks ───────────────────────────────────────────────────────────

/// Answers every stage by sniffing the prompt for stage markers.
#[derive(Default)]
struct StageLlm {
    extraction_calls: AtomicU32,
    tone_calls: AtomicU32,
    research_calls: AtomicU32,
    compose_calls: AtomicU32,
}

#[async_trait]
impl LlmProvider for StageLlm {
    fn model_name(&self) -> &str {
        "stage-mock"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let prompt = request
            .messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        let content = if prompt.contains("extract structured information") {
            self.extraction_calls.fetch_add(1, Ordering::SeqCst);
            r#"{"sender_name": "Jane Doe", "sender_email": "jane@acme.vc",
                "company_name": "Acme Ventures", "industry": "fintech",
                "funding_stage": "Series A",
                "request_summary": "intro call about fintech Series A rounds",
                "key_points": ["leads fintech Series A rounds"]}"#
                .to_string()
        } else if prompt.contains("Describe the writing tone") {
            self.tone_calls.fetch_add(1, Ordering::SeqCst);
            "warm but direct".to_string()
        } else if prompt.contains("Extract up to") {
            self.research_calls.fetch_add(1, Ordering::SeqCst);
            r#"[{"fact": "Acme Ventures backs early-stage fintech companies",
                 "source": "https://search.example/acme"}]"#
                .to_string()
        } else if prompt.contains("RESEARCH FINDINGS") {
            self.compose_calls.fetch_add(1, Ordering::SeqCst);
            r#"{"subject": "Re: Series A Opportunity",
                "body": "Dear Jane,\nThank you for reaching out about Acme Ventures. Happy to set up a call next week.\nBest regards,"}"#
                .to_string()
        } else {
            return Err(LlmError::InvalidResponse {
                reason: format!("unexpected prompt: {prompt}"),
            });
        };

        Ok(CompletionResponse {
            content,
            input_tokens: 10,
            output_tokens: 10,
        })
    }
}

struct FixedEmbedding {
    calls: AtomicU32,
}

#[async_trait]
impl EmbeddingProvider for FixedEmbedding {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![1.0, 0.0])
    }
}

struct StaticSearch {
    calls: AtomicU32,
}

#[async_trait]
impl SearchProvider for StaticSearch {
    async fn search(&self, _query: &str) -> Result<Vec<SearchHit>, SearchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![SearchHit {
            title: "Acme Ventures".into(),
            snippet: "Acme Ventures backs early-stage fintech companies.".into(),
            url: "https://search.example/acme".into(),
        }])
    }
}

struct ScriptedTransport {
    calls: AtomicU32,
    succeed: bool,
}

#[async_trait]
impl SendTransport for ScriptedTransport {
    async fn deliver(&self, _response: &ApprovedResponse) -> Result<(), TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.succeed {
            Ok(())
        } else {
            Err(TransportError::Transient("connection refused".into()))
        }
    }
}

#[derive(Default)]
struct MemorySink {
    records: Mutex<Vec<SendRecord>>,
}

#[async_trait]
impl LogSink for MemorySink {
    async fn append(&self, record: &SendRecord) -> Result<(), LogError> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

struct RejectAllGate;

#[async_trait]
impl ApprovalGate for RejectAllGate {
    async fn present(&self, _draft: &DraftResponse) -> ApprovalDecision {
        ApprovalDecision::Rejected
    }
}

// ── Harness ─────────────────────────────────────────────────────────

struct Harness {
    llm: Arc<StageLlm>,
    embeddings: Arc<FixedEmbedding>,
    search: Arc<StaticSearch>,
    transport: Arc<ScriptedTransport>,
    sink: Arc<MemorySink>,
}

impl Harness {
    fn new() -> Self {
        Self {
            llm: Arc::new(StageLlm::default()),
            embeddings: Arc::new(FixedEmbedding {
                calls: AtomicU32::new(0),
            }),
            search: Arc::new(StaticSearch {
                calls: AtomicU32::new(0),
            }),
            transport: Arc::new(ScriptedTransport {
                calls: AtomicU32::new(0),
                succeed: true,
            }),
            sink: Arc::new(MemorySink::default()),
        }
    }

    fn transport(mut self, succeed: bool) -> Self {
        self.transport = Arc::new(ScriptedTransport {
            calls: AtomicU32::new(0),
            succeed,
        });
        self
    }

    fn pipeline(&self, gate: Arc<dyn ApprovalGate>, dispatch: DispatchConfig) -> Pipeline {
        let index = InMemoryEmailIndex::new(vec![IndexedEmail {
            text: "Dear Sarah, thank you for reaching out about BudgetIQ.\nBest regards,".into(),
            embedding: vec![1.0, 0.0],
            sent_at: Utc::now(),
        }]);

        Pipeline::new(
            EntityExtractor::new(self.llm.clone(), ExtractorConfig::default()),
            StyleRetriever::new(
                self.embeddings.clone(),
                self.llm.clone(),
                Arc::new(index),
                RetrieverConfig::default(),
            ),
            ContextResearcher::new(
                self.llm.clone(),
                self.search.clone(),
                ResearchConfig::default(),
            ),
            ResponseComposer::new(self.llm.clone(), ComposerConfig::default()),
            gate,
            Dispatcher::new(Some(self.transport.clone()), self.sink.clone(), dispatch),
        )
    }
}

fn dispatch_config(max_attempts: u32, fallback: bool, force: bool) -> DispatchConfig {
    DispatchConfig {
        max_attempts,
        backoff: Duration::from_millis(1),
        fallback_enabled: fallback,
        force_simulation: force,
    }
}

// ── Scenarios ───────────────────────────────────────────────────────

#[tokio::test]
async fn full_run_in_simulation_mode() {
    let harness = Harness::new();
    let pipeline = harness.pipeline(
        Arc::new(AutoApprovalGate),
        dispatch_config(2, true, true),
    );

    let outcome = pipeline
        .run(JANE_EMAIL, &AtomicBool::new(false))
        .await
        .unwrap();

    let RunOutcome::Completed(result) = outcome else {
        panic!("expected a completed run");
    };
    assert_eq!(result.status, SendStatus::DemoSimulated);

    // Both enrichment branches actually ran
    assert!(harness.embeddings.calls.load(Ordering::SeqCst) >= 1);
    assert_eq!(harness.search.calls.load(Ordering::SeqCst), 3);
    assert_eq!(harness.llm.extraction_calls.load(Ordering::SeqCst), 1);
    assert_eq!(harness.llm.tone_calls.load(Ordering::SeqCst), 1);
    assert_eq!(harness.llm.research_calls.load(Ordering::SeqCst), 3);
    assert_eq!(harness.llm.compose_calls.load(Ordering::SeqCst), 1);

    // Forced simulation never touches the transport but still logs
    assert_eq!(harness.transport.calls.load(Ordering::SeqCst), 0);
    let records = harness.sink.records.lock().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].approved.recipient, "jane@acme.vc");
    assert_eq!(records[0].result.status, SendStatus::DemoSimulated);
}

#[tokio::test]
async fn full_run_with_real_send() {
    let harness = Harness::new();
    let pipeline = harness.pipeline(
        Arc::new(AutoApprovalGate),
        dispatch_config(2, true, false),
    );

    let outcome = pipeline
        .run(JANE_EMAIL, &AtomicBool::new(false))
        .await
        .unwrap();

    let RunOutcome::Completed(result) = outcome else {
        panic!("expected a completed run");
    };
    assert_eq!(result.status, SendStatus::Sent);
    assert_eq!(harness.transport.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn rejected_draft_is_never_sent_or_logged() {
    let harness = Harness::new();
    let pipeline = harness.pipeline(Arc::new(RejectAllGate), dispatch_config(2, true, false));

    let outcome = pipeline
        .run(JANE_EMAIL, &AtomicBool::new(false))
        .await
        .unwrap();

    assert!(matches!(outcome, RunOutcome::Rejected));
    assert_eq!(harness.transport.calls.load(Ordering::SeqCst), 0);
    assert!(harness.sink.records.lock().unwrap().is_empty());
}

#[tokio::test]
async fn unreachable_transport_without_fallback_fails() {
    let harness = Harness::new().transport(false);
    let pipeline = harness.pipeline(
        Arc::new(AutoApprovalGate),
        dispatch_config(2, false, false),
    );

    let outcome = pipeline
        .run(JANE_EMAIL, &AtomicBool::new(false))
        .await
        .unwrap();

    let RunOutcome::Completed(result) = outcome else {
        panic!("expected a completed run");
    };
    assert_eq!(result.status, SendStatus::Failed);
    assert_eq!(harness.transport.calls.load(Ordering::SeqCst), 2);
    // Failures are still logged
    let records = harness.sink.records.lock().unwrap();
    assert_eq!(records[0].result.status, SendStatus::Failed);
}

#[tokio::test]
async fn unreachable_transport_with_fallback_simulates() {
    let harness = Harness::new().transport(false);
    let pipeline = harness.pipeline(
        Arc::new(AutoApprovalGate),
        dispatch_config(2, true, false),
    );

    let outcome = pipeline
        .run(JANE_EMAIL, &AtomicBool::new(false))
        .await
        .unwrap();

    let RunOutcome::Completed(result) = outcome else {
        panic!("expected a completed run");
    };
    assert_eq!(result.status, SendStatus::DemoSimulated);
    assert!(result.error_detail.unwrap().contains("connection refused"));
}

#[tokio::test]
async fn email_without_sender_address_fails_extraction() {
    struct NoSenderLlm;

    #[async_trait]
    impl LlmProvider for NoSenderLlm {
        fn model_name(&self) -> &str {
            "no-sender"
        }
        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            Ok(CompletionResponse {
                content: r#"{"sender_name": "Somebody", "sender_email": "not mentioned",
                    "request_summary": "a chat"}"#
                    .to_string(),
                input_tokens: 1,
                output_tokens: 1,
            })
        }
    }

    let harness = Harness::new();
    let llm: Arc<dyn LlmProvider> = Arc::new(NoSenderLlm);
    let pipeline = Pipeline::new(
        EntityExtractor::new(llm, ExtractorConfig::default()),
        StyleRetriever::new(
            harness.embeddings.clone(),
            harness.llm.clone(),
            Arc::new(InMemoryEmailIndex::empty()),
            RetrieverConfig::default(),
        ),
        ContextResearcher::new(
            harness.llm.clone(),
            harness.search.clone(),
            ResearchConfig::default(),
        ),
        ResponseComposer::new(harness.llm.clone(), ComposerConfig::default()),
        Arc::new(AutoApprovalGate),
        Dispatcher::new(
            Some(harness.transport.clone()),
            harness.sink.clone(),
            dispatch_config(2, true, false),
        ),
    );

    let err = pipeline
        .run(
            "Hello, I'd love to chat about a partnership sometime.",
            &AtomicBool::new(false),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Extraction(_)));
    assert_eq!(harness.transport.calls.load(Ordering::SeqCst), 0);
    assert!(harness.sink.records.lock().unwrap().is_empty());
}

#[tokio::test]
async fn preset_cancel_flag_stops_before_extraction() {
    let harness = Harness::new();
    let pipeline = harness.pipeline(
        Arc::new(AutoApprovalGate),
        dispatch_config(2, true, false),
    );

    let outcome = pipeline
        .run(JANE_EMAIL, &AtomicBool::new(true))
        .await
        .unwrap();

    assert!(matches!(outcome, RunOutcome::Cancelled));
    assert_eq!(harness.llm.extraction_calls.load(Ordering::SeqCst), 0);
    assert_eq!(harness.transport.calls.load(Ordering::SeqCst), 0);
}
