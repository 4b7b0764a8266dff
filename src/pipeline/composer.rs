//! Response composition.
//!
//! Merges the entity record, style profile, and external context into a
//! single draft. The prompt only ever includes facts the researcher
//! actually found; a post-composition check flags wording that implies
//! research the context doesn't hold, so reviewers know where to look.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::ComposerConfig;
use crate::error::CompositionError;
use crate::llm::retry::complete_with_retries;
use crate::llm::{self, ChatMessage, CompletionRequest, LlmProvider};
use crate::pipeline::types::{
    DraftResponse, EntityRecord, ExternalContext, FactCategory, ProvenanceKind, ProvenanceNote,
    StyleProfile,
};

pub struct ResponseComposer {
    llm: Arc<dyn LlmProvider>,
    config: ComposerConfig,
}

impl ResponseComposer {
    pub fn new(llm: Arc<dyn LlmProvider>, config: ComposerConfig) -> Self {
        Self { llm, config }
    }

    /// Compose a draft reply. Fails the run if the model cannot produce a
    /// parseable draft within the re-ask bound.
    pub async fn compose(
        &self,
        entity: &EntityRecord,
        style: &StyleProfile,
        context: &ExternalContext,
    ) -> Result<DraftResponse, CompositionError> {
        let system = system_prompt();
        let user = user_prompt(entity, style, context);

        let mut last_error = String::new();
        for attempt in 1..=self.config.max_retries + 1 {
            let mut messages = vec![
                ChatMessage::system(system.clone()),
                ChatMessage::user(user.clone()),
            ];
            if attempt > 1 {
                messages.push(ChatMessage::user(format!(
                    "Your previous reply was not valid JSON ({last_error}). Respond \
                     with only a JSON object with keys \"subject\" and \"body\"."
                )));
            }
            let request = CompletionRequest::new(messages)
                .with_temperature(0.7)
                .with_max_tokens(1024);

            let response = complete_with_retries(&self.llm, request, 1).await?;
            match parse_draft(&response.content) {
                Ok(raw) => {
                    debug!(attempt, "Draft composed");
                    return Ok(assemble_draft(raw, entity, style, context));
                }
                Err(reason) => {
                    warn!(attempt, reason = %reason, "Draft output malformed, re-asking");
                    last_error = reason;
                }
            }
        }

        Err(CompositionError::Malformed {
            attempts: self.config.max_retries + 1,
            reason: last_error,
        })
    }
}

// ── Prompts ─────────────────────────────────────────────────────────

fn system_prompt() -> String {
    "You draft replies to inbound business emails on behalf of an investor. \
     Match the tone and phrasing of the style examples when given. State only \
     facts that appear in the RESEARCH FINDINGS section; if a topic has no \
     findings, do not mention researching it. Keep the reply concise and end \
     with a concrete next step. Respond with only a JSON object: \
     {\"subject\": \"...\", \"body\": \"...\"}"
        .to_string()
}

fn user_prompt(entity: &EntityRecord, style: &StyleProfile, context: &ExternalContext) -> String {
    let mut prompt = String::new();

    prompt.push_str("INBOUND EMAIL\n");
    if let Some(name) = &entity.sender_name {
        prompt.push_str(&format!("Sender: {name} <{}>\n", entity.sender_email));
    } else {
        prompt.push_str(&format!("Sender: {}\n", entity.sender_email));
    }
    if let Some(company) = &entity.company {
        prompt.push_str(&format!("Company: {company}\n"));
    }
    if let Some(industry) = &entity.industry {
        prompt.push_str(&format!("Industry: {industry}\n"));
    }
    if let Some(stage) = &entity.funding_stage {
        prompt.push_str(&format!("Funding stage: {stage}\n"));
    }
    prompt.push_str(&format!("Request: {}\n", entity.request_summary));
    if !entity.key_points.is_empty() {
        prompt.push_str("Key points:\n");
        for point in &entity.key_points {
            prompt.push_str(&format!("- {point}\n"));
        }
    }

    prompt.push_str(&format!("\nTONE: {}\n", style.tone));
    if !style.phrases.is_empty() {
        prompt.push_str(&format!("PHRASES TO FAVOR: {}\n", style.phrases.join("; ")));
    }
    if !style.exemplars.is_empty() {
        prompt.push_str("\nSTYLE EXAMPLES (match the voice, not the content):\n");
        for (i, exemplar) in style.exemplars.iter().enumerate() {
            prompt.push_str(&format!("Example {}:\n{}\n\n", i + 1, exemplar.text));
        }
    }

    // Only populated buckets make it into the prompt; the model never
    // sees a category it could fake coverage of.
    if context.is_empty() {
        prompt.push_str("\nRESEARCH FINDINGS: none available.\n");
    } else {
        prompt.push_str("\nRESEARCH FINDINGS:\n");
        for (category, facts) in context.populated() {
            prompt.push_str(&format!("{}:\n", category.label()));
            for fact in facts {
                prompt.push_str(&format!("- {} (source: {})\n", fact.text, fact.source));
            }
        }
    }

    prompt
}

// ── Parsing and assembly ────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RawDraft {
    #[serde(default)]
    subject: String,
    body: String,
}

fn parse_draft(content: &str) -> Result<RawDraft, String> {
    let raw = llm::extract_json_object(content);
    let draft: RawDraft = serde_json::from_str(&raw).map_err(|e| e.to_string())?;
    if draft.body.trim().is_empty() {
        return Err("empty body".to_string());
    }
    Ok(draft)
}

fn assemble_draft(
    raw: RawDraft,
    entity: &EntityRecord,
    style: &StyleProfile,
    context: &ExternalContext,
) -> DraftResponse {
    let subject = if raw.subject.trim().is_empty() {
        match &entity.subject {
            Some(original) => format!("Re: {original}"),
            None => "Re: Your inquiry".to_string(),
        }
    } else {
        raw.subject
    };

    let provenance = provenance_notes(&raw.body, style, context);
    let review_flags = flag_unsupported_claims(&raw.body, context);

    DraftResponse {
        subject,
        body: raw.body,
        recipient: entity.sender_email.clone(),
        cc: Vec::new(),
        provenance,
        review_flags,
    }
}

/// Record what fed the prompt, and whether each element's wording visibly
/// made it into the body (4-word shingle containment, case-insensitive).
fn provenance_notes(
    body: &str,
    style: &StyleProfile,
    context: &ExternalContext,
) -> Vec<ProvenanceNote> {
    let mut notes = Vec::new();
    for (i, exemplar) in style.exemplars.iter().enumerate() {
        notes.push(ProvenanceNote {
            kind: ProvenanceKind::StyleExemplar,
            source: format!("exemplar {}", i + 1),
            cited: shares_shingle(body, &exemplar.text),
        });
    }
    for (_, facts) in context.populated() {
        for fact in facts {
            notes.push(ProvenanceNote {
                kind: ProvenanceKind::Fact,
                source: fact.source.clone(),
                cited: shares_shingle(body, &fact.text),
            });
        }
    }
    notes
}

/// Whether any 4-word run of `source` appears in `body`.
fn shares_shingle(body: &str, source: &str) -> bool {
    const SHINGLE: usize = 4;
    let body_lower = body.to_lowercase();
    let words: Vec<&str> = source.split_whitespace().collect();
    if words.len() < SHINGLE {
        return !words.is_empty() && body_lower.contains(&source.to_lowercase());
    }
    words
        .windows(SHINGLE)
        .any(|w| body_lower.contains(&w.join(" ").to_lowercase()))
}

/// Cue phrases that imply research coverage per category. A cue in the
/// body with an empty bucket earns a review flag.
fn flag_unsupported_claims(body: &str, context: &ExternalContext) -> Vec<String> {
    const CUES: [(FactCategory, &[&str]); 2] = [
        (
            FactCategory::RecentNews,
            &[
                "recent news",
                "recently announced",
                "latest announcement",
                "in the news",
            ],
        ),
        (
            FactCategory::FundingHistory,
            &[
                "funding round",
                "raised $",
                "previous round",
                "funding history",
            ],
        ),
    ];

    let body_lower = body.to_lowercase();
    let mut flags = Vec::new();
    for (category, cues) in CUES {
        if !context.facts(category).is_empty() {
            continue;
        }
        if let Some(cue) = cues.iter().find(|cue| body_lower.contains(**cue)) {
            flags.push(format!(
                "body mentions \"{cue}\" but research found no {} facts",
                category.label()
            ));
        }
    }
    flags
}
