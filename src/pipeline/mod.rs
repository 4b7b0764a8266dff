//! The response-generation pipeline.
//!
//! One email-processing run flows through:
//! 1. `EntityExtractor::extract()` — raw text → typed entity record
//! 2. `StyleRetriever` ∥ `ContextResearcher` — concurrent enrichment
//! 3. `ResponseComposer::compose()` — merge into a draft
//! 4. `ApprovalGate::present()` — human approve/edit/reject
//! 5. `Dispatcher::send()` — retry/fallback delivery + log
//!
//! Extraction and composition failures are fatal; the enrichment branches
//! degrade to empty values and never abort a run.

pub mod composer;
pub mod extractor;
pub mod research;
pub mod retriever;
pub mod runner;
pub mod types;
