//! Human approval gate.
//!
//! No email leaves without a human decision. The gate sits between
//! composition and dispatch: it shows the draft (with any review flags),
//! and only an explicit approve or approve-with-edits produces the
//! [`ApprovedResponse`] the dispatcher requires. Everything else — reject,
//! EOF, unreadable input — means no send.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};

use crate::pipeline::types::{ApprovedResponse, DraftResponse};

/// Outcome of a review.
#[derive(Debug, Clone)]
pub enum ApprovalDecision {
    Approved(ApprovedResponse),
    Rejected,
}

/// Presents a draft to a human and returns their decision.
#[async_trait]
pub trait ApprovalGate: Send + Sync {
    async fn present(&self, draft: &DraftResponse) -> ApprovalDecision;
}

// ── CLI gate ────────────────────────────────────────────────────────

/// Interactive terminal review: `[a]pprove / [e]dit / [r]eject`.
pub struct CliApprovalGate;

#[async_trait]
impl ApprovalGate for CliApprovalGate {
    async fn present(&self, draft: &DraftResponse) -> ApprovalDecision {
        let mut stdout = tokio::io::stdout();
        let mut reader = BufReader::new(tokio::io::stdin()).lines();

        if let Err(e) = stdout.write_all(render_draft(draft).as_bytes()).await {
            warn!(error = %e, "Could not display draft, treating as rejected");
            return ApprovalDecision::Rejected;
        }

        loop {
            if stdout
                .write_all(b"\n[a]pprove / [e]dit / [r]eject > ")
                .await
                .is_err()
                || stdout.flush().await.is_err()
            {
                return ApprovalDecision::Rejected;
            }

            let line = match reader.next_line().await {
                Ok(Some(line)) => line,
                // EOF or read failure: never send on ambiguity
                Ok(None) => {
                    warn!("Input closed during review, treating as rejected");
                    return ApprovalDecision::Rejected;
                }
                Err(e) => {
                    warn!(error = %e, "Could not read review decision, treating as rejected");
                    return ApprovalDecision::Rejected;
                }
            };

            match line.trim().to_lowercase().as_str() {
                "a" | "approve" => {
                    info!(recipient = %draft.recipient, "Draft approved as-is");
                    return ApprovalDecision::Approved(ApprovedResponse::from_draft(draft));
                }
                "e" | "edit" => {
                    let _ = stdout
                        .write_all(b"Enter the edited body; finish with a single '.' line:\n")
                        .await;
                    let mut body_lines = Vec::new();
                    loop {
                        match reader.next_line().await {
                            Ok(Some(line)) if line.trim() == "." => break,
                            Ok(Some(line)) => body_lines.push(line),
                            Ok(None) | Err(_) => {
                                warn!("Input closed mid-edit, treating as rejected");
                                return ApprovalDecision::Rejected;
                            }
                        }
                    }
                    let body = body_lines.join("\n");
                    if body.trim().is_empty() {
                        let _ = stdout.write_all(b"Empty body, draft unchanged.\n").await;
                        continue;
                    }
                    info!(recipient = %draft.recipient, "Draft approved with edits");
                    return ApprovalDecision::Approved(ApprovedResponse::from_edited(draft, body));
                }
                "r" | "reject" => {
                    info!(recipient = %draft.recipient, "Draft rejected");
                    return ApprovalDecision::Rejected;
                }
                other => {
                    let _ = stdout
                        .write_all(format!("Unrecognized option '{other}'.\n").as_bytes())
                        .await;
                }
            }
        }
    }
}

fn render_draft(draft: &DraftResponse) -> String {
    let mut out = String::new();
    out.push_str("\n━━━ Draft for review ━━━━━━━━━━━━━━━━━━━━━━━━━━━\n");
    out.push_str(&format!("To:      {}\n", draft.recipient));
    if !draft.cc.is_empty() {
        out.push_str(&format!("Cc:      {}\n", draft.cc.join(", ")));
    }
    out.push_str(&format!("Subject: {}\n", draft.subject));
    out.push_str("─────────────────────────────────────────────────\n");
    out.push_str(&draft.body);
    out.push('\n');
    if !draft.review_flags.is_empty() {
        out.push_str("\n⚠ Review flags:\n");
        for flag in &draft.review_flags {
            out.push_str(&format!("  - {flag}\n"));
        }
    }
    out.push_str("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n");
    out
}

// ── Auto gate ───────────────────────────────────────────────────────

/// Approves every draft unmodified. For tests and demos only — production
/// wiring uses [`CliApprovalGate`].
pub struct AutoApprovalGate;

#[async_trait]
impl ApprovalGate for AutoApprovalGate {
    async fn present(&self, draft: &DraftResponse) -> ApprovalDecision {
        ApprovalDecision::Approved(ApprovedResponse::from_draft(draft))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> DraftResponse {
        DraftResponse {
            subject: "Re: Series A".into(),
            body: "Hi Jane,\nThanks for reaching out.\nBest regards,".into(),
            recipient: "jane@acme.vc".into(),
            cc: vec![],
            provenance: vec![],
            review_flags: vec!["body mentions \"recent news\" but research found no recent_news facts".into()],
        }
    }

    #[tokio::test]
    async fn auto_gate_approves_unmodified() {
        let decision = AutoApprovalGate.present(&draft()).await;
        match decision {
            ApprovalDecision::Approved(approved) => {
                assert_eq!(approved.body, draft().body);
                assert_eq!(approved.recipient, "jane@acme.vc");
            }
            ApprovalDecision::Rejected => panic!("auto gate must approve"),
        }
    }

    #[test]
    fn rendered_draft_shows_flags_and_recipient() {
        let rendered = render_draft(&draft());
        assert!(rendered.contains("jane@acme.vc"));
        assert!(rendered.contains("Re: Series A"));
        assert!(rendered.contains("Review flags"));
        assert!(rendered.contains("recent_news"));
    }

    #[test]
    fn rendered_draft_omits_empty_cc() {
        let rendered = render_draft(&draft());
        assert!(!rendered.contains("Cc:"));
    }
}
