//! Pipeline orchestration.
//!
//! Wires the stages together for one inbound email: extract, enrich both
//! branches concurrently, compose, review, dispatch. A cooperative cancel
//! flag is checked between stages — in-flight stage work finishes, but no
//! new stage starts once the flag is set, and nothing is ever dispatched
//! after a cancel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use crate::approval::{ApprovalDecision, ApprovalGate};
use crate::dispatch::Dispatcher;
use crate::error::Result;
use crate::pipeline::composer::ResponseComposer;
use crate::pipeline::extractor::EntityExtractor;
use crate::pipeline::research::ContextResearcher;
use crate::pipeline::retriever::StyleRetriever;
use crate::pipeline::types::SendResult;

/// How a pipeline run ended.
#[derive(Debug)]
pub enum RunOutcome {
    /// The draft was approved and dispatch reached a terminal status.
    Completed(SendResult),
    /// The reviewer rejected the draft; nothing was sent or logged.
    Rejected,
    /// Cancelled between stages; nothing was sent or logged.
    Cancelled,
}

pub struct Pipeline {
    extractor: EntityExtractor,
    retriever: StyleRetriever,
    researcher: ContextResearcher,
    composer: ResponseComposer,
    gate: Arc<dyn ApprovalGate>,
    dispatcher: Dispatcher,
}

impl Pipeline {
    pub fn new(
        extractor: EntityExtractor,
        retriever: StyleRetriever,
        researcher: ContextResearcher,
        composer: ResponseComposer,
        gate: Arc<dyn ApprovalGate>,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            extractor,
            retriever,
            researcher,
            composer,
            gate,
            dispatcher,
        }
    }

    /// Process one raw email end to end.
    ///
    /// Errors are fatal stage failures (extraction, composition); rejection
    /// and cancellation are ordinary outcomes, not errors.
    pub async fn run(&self, raw_email: &str, cancel: &AtomicBool) -> Result<RunOutcome> {
        let run_id = Uuid::new_v4();
        let span = info_span!("pipeline_run", %run_id);
        self.run_inner(raw_email, cancel).instrument(span).await
    }

    async fn run_inner(&self, raw_email: &str, cancel: &AtomicBool) -> Result<RunOutcome> {
        if cancel.load(Ordering::SeqCst) {
            return Ok(RunOutcome::Cancelled);
        }

        let entity = self.extractor.extract(raw_email).await?;
        info!(
            sender = %entity.sender_email,
            company = entity.company.as_deref().unwrap_or("-"),
            "Entities extracted"
        );

        if cancel.load(Ordering::SeqCst) {
            return Ok(RunOutcome::Cancelled);
        }

        // Both enrichment branches run concurrently; neither can fail the run
        let (style, context) = tokio::join!(
            self.retriever.retrieve(&entity),
            self.researcher.research(&entity),
        );
        info!(
            exemplars = style.exemplars.len(),
            degraded_style = style.is_degraded(),
            context_empty = context.is_empty(),
            "Enrichment finished"
        );

        if cancel.load(Ordering::SeqCst) {
            return Ok(RunOutcome::Cancelled);
        }

        let draft = self.composer.compose(&entity, &style, &context).await?;
        info!(
            recipient = %draft.recipient,
            review_flags = draft.review_flags.len(),
            "Draft composed"
        );

        if cancel.load(Ordering::SeqCst) {
            return Ok(RunOutcome::Cancelled);
        }

        let approved = match self.gate.present(&draft).await {
            ApprovalDecision::Approved(approved) => approved,
            ApprovalDecision::Rejected => {
                info!("Draft rejected at review, nothing dispatched");
                return Ok(RunOutcome::Rejected);
            }
        };

        if cancel.load(Ordering::SeqCst) {
            return Ok(RunOutcome::Cancelled);
        }

        let result = self.dispatcher.send(&approved).await;
        Ok(RunOutcome::Completed(result))
    }
}
