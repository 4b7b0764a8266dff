//! Reply Pilot — reviewed AI email replies.
//!
//! Inbound email text flows through entity extraction, two concurrent
//! enrichment branches (historical style retrieval, external research),
//! a composed draft, human approval, and a retry/fallback dispatcher.
//! **No email leaves without human approval.**

pub mod approval;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod index;
pub mod llm;
pub mod logsink;
pub mod pipeline;
pub mod search;
