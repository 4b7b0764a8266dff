//! Entity extractor — raw email text → [`EntityRecord`].
//!
//! Header-derived fields (sender address, subject) come from parsing the
//! raw message; everything else comes from an LLM call validated against
//! the entity schema. Malformed model output is re-asked up to a small
//! bound, then fails the run — there is no best-effort parse.

use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::ExtractorConfig;
use crate::error::ExtractionError;
use crate::llm::{self, ChatMessage, CompletionRequest, LlmProvider};
use crate::pipeline::types::EntityRecord;

/// Max tokens for the extraction call.
const EXTRACT_MAX_TOKENS: u32 = 512;

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("static regex")
    })
}

/// Syntactic email address check.
pub fn is_valid_email(address: &str) -> bool {
    email_re().is_match(address)
}

/// Entity extractor.
pub struct EntityExtractor {
    llm: Arc<dyn LlmProvider>,
    config: ExtractorConfig,
}

impl EntityExtractor {
    pub fn new(llm: Arc<dyn LlmProvider>, config: ExtractorConfig) -> Self {
        Self { llm, config }
    }

    /// Extract a typed entity record from raw email text.
    ///
    /// A sender address found in the message headers wins over a missing
    /// or "not mentioned" model field. No address anywhere is a hard
    /// failure — the pipeline cannot reply to nobody.
    pub async fn extract(&self, raw_email_text: &str) -> Result<EntityRecord, ExtractionError> {
        if raw_email_text.trim().is_empty() {
            return Err(ExtractionError::EmptyInput);
        }

        let header_email = sender_from_headers(raw_email_text);
        let subject = subject_from_headers(raw_email_text);
        let clean_text = clean_email_text(raw_email_text);

        let mut fields = None;
        let mut last_reason = String::new();
        let attempts = self.config.max_retries + 1;

        for attempt in 1..=attempts {
            let request = CompletionRequest::new(vec![
                ChatMessage::system(build_extraction_system_prompt()),
                ChatMessage::user(format!("EMAIL:\n{clean_text}")),
            ])
            .with_temperature(0.0)
            .with_max_tokens(EXTRACT_MAX_TOKENS);

            let response = self.llm.complete(request).await?;

            match parse_entity_response(&response.content) {
                Ok(parsed) => {
                    fields = Some(parsed);
                    break;
                }
                Err(reason) => {
                    warn!(attempt, %reason, "Entity extraction output failed validation");
                    last_reason = reason;
                }
            }
        }

        let fields = fields.ok_or(ExtractionError::Malformed {
            attempts,
            reason: last_reason,
        })?;

        // Header address is authoritative when the model found none.
        let sender_email = match normalize(fields.sender_email) {
            Some(addr) => addr,
            None => header_email.ok_or(ExtractionError::MissingSenderEmail)?,
        };
        if !is_valid_email(&sender_email) {
            return Err(ExtractionError::InvalidSenderEmail(sender_email));
        }

        debug!(%sender_email, "Extracted entity record");

        Ok(EntityRecord {
            sender_name: normalize(fields.sender_name),
            sender_email,
            company: normalize(fields.company_name),
            industry: normalize(fields.industry),
            funding_stage: normalize(fields.funding_stage),
            request_summary: normalize(fields.request_summary).unwrap_or_default(),
            key_points: fields.key_points,
            subject,
            raw_text: raw_email_text.to_string(),
        })
    }
}

// ── Prompt + response schema ────────────────────────────────────────

fn build_extraction_system_prompt() -> String {
    "You extract structured information from inbound emails.\n\n\
     Respond with ONLY a JSON object with these fields (use \"not mentioned\" \
     when a piece of information is absent):\n\
     {\"sender_name\": \"full name of the sender\",\n \
      \"sender_email\": \"email address of the sender\",\n \
      \"company_name\": \"company or organization the sender represents\",\n \
      \"industry\": \"industry or sector the company operates in\",\n \
      \"funding_stage\": \"funding stage if mentioned (e.g. seed, Series A)\",\n \
      \"request_summary\": \"one-sentence summary of what the sender asks for\",\n \
      \"key_points\": [\"key points mentioned in the email\"]}"
        .to_string()
}

#[derive(Debug, Deserialize)]
struct EntityResponse {
    #[serde(default)]
    sender_name: String,
    #[serde(default)]
    sender_email: String,
    #[serde(default)]
    company_name: String,
    #[serde(default)]
    industry: String,
    #[serde(default)]
    funding_stage: String,
    #[serde(default)]
    request_summary: String,
    #[serde(default)]
    key_points: Vec<String>,
}

fn parse_entity_response(raw: &str) -> Result<EntityResponse, String> {
    let json = llm::extract_json_object(raw);
    serde_json::from_str(&json).map_err(|e| format!("JSON parse error: {e}"))
}

/// Map model placeholders ("not mentioned", "unknown", empty) to `None`.
fn normalize(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    let lower = trimmed.to_lowercase();
    if matches!(lower.as_str(), "not mentioned" | "unknown" | "n/a" | "none") {
        return None;
    }
    Some(trimmed.to_string())
}

// ── Header parsing ──────────────────────────────────────────────────

/// Pull the sender address out of the raw text, headers first.
///
/// RFC822 parsing is attempted first; the regex fallbacks handle pasted
/// email bodies that kept a `From:` line or an inline address near the top.
pub fn sender_from_headers(raw: &str) -> Option<String> {
    if let Some(parsed) = mail_parser::MessageParser::default().parse(raw.as_bytes())
        && let Some(addr) = parsed
            .from()
            .and_then(|a| a.first())
            .and_then(|a| a.address())
    {
        return Some(addr.to_string());
    }

    static FROM_RE: OnceLock<Regex> = OnceLock::new();
    static REPLY_TO_RE: OnceLock<Regex> = OnceLock::new();
    static ANY_RE: OnceLock<Regex> = OnceLock::new();

    let from_re = FROM_RE.get_or_init(|| {
        Regex::new(r"From:.*?[\[<(]?([a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,})[\])>]?")
            .expect("static regex")
    });
    if let Some(m) = from_re.captures(raw) {
        return Some(m[1].to_string());
    }

    let reply_to_re = REPLY_TO_RE.get_or_init(|| {
        Regex::new(r"Reply-To:.*?[\[<(]?([a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,})[\])>]?")
            .expect("static regex")
    });
    if let Some(m) = reply_to_re.captures(raw) {
        return Some(m[1].to_string());
    }

    // Any address in the first ten lines.
    let any_re = ANY_RE.get_or_init(|| {
        Regex::new(r"([a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,})").expect("static regex")
    });
    let first_lines: String = raw.lines().take(10).collect::<Vec<_>>().join("\n");
    any_re.captures(&first_lines).map(|m| m[1].to_string())
}

/// Pull the subject line out of the raw text, if any.
pub fn subject_from_headers(raw: &str) -> Option<String> {
    raw.lines().find_map(|line| {
        let lower = line.trim_start().to_lowercase();
        lower
            .starts_with("subject:")
            .then(|| line.trim_start()[8..].trim().to_string())
            .filter(|s| !s.is_empty())
    })
}

/// Strip header lines and trailing signatures so the model sees prose only.
pub fn clean_email_text(raw: &str) -> String {
    let mut text = raw.trim().to_string();

    // Header block followed by a blank line → keep the body only.
    static HEADER_RE: OnceLock<Regex> = OnceLock::new();
    let header_re =
        HEADER_RE.get_or_init(|| Regex::new(r"(?m)^(From|To|Subject|Date|Reply-To):").expect("static regex"));
    if header_re.is_match(&text)
        && let Some(pos) = text.find("\n\n").or_else(|| text.find("\r\n\r\n"))
    {
        text = text[pos..].trim().to_string();
    }

    static SIG_RES: OnceLock<Vec<Regex>> = OnceLock::new();
    let sig_res = SIG_RES.get_or_init(|| {
        [
            r"(?s)--\s*\n.*",
            r"(?is)Kind\s+regards,.*$",
            r"(?is)Best\s+regards,.*$",
            r"(?is)Sincerely,.*$",
            r"(?is)Thanks,.*$",
            r"(?is)Thank\s+you,.*$",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("static regex"))
        .collect()
    });
    for re in sig_res {
        text = re.replace(&text, "").to_string();
    }

    text.trim().to_string()
}
