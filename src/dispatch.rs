//! Dispatch — delivery with retry, fallback, and logging.
//!
//! The dispatcher takes an [`ApprovedResponse`] (and nothing else) and
//! always reaches a terminal outcome: SENT, DEMO_SIMULATED, or FAILED.
//! Transient transport errors are retried with backoff; permanent ones
//! (bad credentials, rejected addresses) go straight to the fallback
//! decision — retrying a misconfiguration just burns time.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use rand::Rng;
use secrecy::ExposeSecret;
use tracing::{info, warn};

use crate::config::{DispatchConfig, SmtpConfig};
use crate::error::TransportError;
use crate::logsink::{LogSink, SendRecord};
use crate::pipeline::types::{ApprovedResponse, SendResult};

/// Delivery mechanism for approved responses.
#[async_trait]
pub trait SendTransport: Send + Sync {
    async fn deliver(&self, response: &ApprovedResponse) -> Result<(), TransportError>;
}

// ── SMTP transport ──────────────────────────────────────────────────

/// SMTP delivery via lettre.
pub struct SmtpSender {
    config: SmtpConfig,
}

impl SmtpSender {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SendTransport for SmtpSender {
    async fn deliver(&self, response: &ApprovedResponse) -> Result<(), TransportError> {
        let config = self.config.clone();
        let response = response.clone();

        // lettre's SmtpTransport is blocking
        tokio::task::spawn_blocking(move || send_blocking(&config, &response))
            .await
            .map_err(|e| TransportError::Transient(format!("send task failed: {e}")))?
    }
}

fn send_blocking(config: &SmtpConfig, response: &ApprovedResponse) -> Result<(), TransportError> {
    let transport = SmtpTransport::relay(&config.host)
        .map_err(|e| TransportError::Permanent(format!("SMTP relay error: {e}")))?
        .port(config.port)
        .credentials(Credentials::new(
            config.username.clone(),
            config.password.expose_secret().to_string(),
        ))
        .build();

    let mut builder = Message::builder()
        .from(config.from_address.parse().map_err(|e| {
            TransportError::Permanent(format!("invalid from address: {e}"))
        })?)
        .to(response.recipient.parse().map_err(|e| {
            TransportError::Permanent(format!("invalid recipient address: {e}"))
        })?)
        .subject(&response.subject);
    for cc in &response.cc {
        builder = builder.cc(cc.parse().map_err(|e| {
            TransportError::Permanent(format!("invalid cc address: {e}"))
        })?);
    }

    let email = builder
        .body(response.body.clone())
        .map_err(|e| TransportError::Permanent(format!("failed to build email: {e}")))?;

    transport.send(&email).map(|_| ()).map_err(|e| {
        // lettre classifies 5xx SMTP replies as permanent
        if e.is_permanent() {
            TransportError::Permanent(format!("SMTP rejected: {e}"))
        } else {
            TransportError::Transient(format!("SMTP send failed: {e}"))
        }
    })
}

// ── Dispatcher ──────────────────────────────────────────────────────

pub struct Dispatcher {
    transport: Option<Arc<dyn SendTransport>>,
    sink: Arc<dyn LogSink>,
    config: DispatchConfig,
}

impl Dispatcher {
    /// `transport: None` means no delivery path is configured; every
    /// dispatch is simulated.
    pub fn new(
        transport: Option<Arc<dyn SendTransport>>,
        sink: Arc<dyn LogSink>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            transport,
            sink,
            config,
        }
    }

    /// Deliver an approved response and log the outcome. Always returns a
    /// terminal [`SendResult`]; delivery problems surface in its status,
    /// never as an error.
    pub async fn send(&self, approved: &ApprovedResponse) -> SendResult {
        let result = self.attempt_delivery(approved).await;

        info!(
            recipient = %approved.recipient,
            status = ?result.status,
            "Dispatch finished"
        );
        let record = SendRecord {
            approved: approved.clone(),
            result: result.clone(),
        };
        if let Err(e) = self.sink.append(&record).await {
            warn!(error = %e, "Could not append to send log");
        }
        result
    }

    async fn attempt_delivery(&self, approved: &ApprovedResponse) -> SendResult {
        if self.config.force_simulation {
            return SendResult::simulated(Some("simulation forced by configuration".into()));
        }
        let Some(transport) = &self.transport else {
            return SendResult::simulated(Some("no send transport configured".into()));
        };

        let mut last_error = String::new();
        for attempt in 1..=self.config.max_attempts {
            match transport.deliver(approved).await {
                Ok(()) => return SendResult::sent(),
                Err(TransportError::Permanent(reason)) => {
                    warn!(attempt, reason = %reason, "Permanent transport error, not retrying");
                    last_error = reason;
                    break;
                }
                Err(TransportError::Transient(reason)) => {
                    warn!(attempt, reason = %reason, "Transient transport error");
                    last_error = reason;
                    if attempt < self.config.max_attempts {
                        tokio::time::sleep(retry_delay(self.config.backoff, attempt)).await;
                    }
                }
            }
        }

        if self.config.fallback_enabled {
            SendResult::simulated(Some(last_error))
        } else {
            SendResult::failed(last_error)
        }
    }
}

fn retry_delay(base: Duration, attempt: u32) -> Duration {
    let backoff = base * 2u32.saturating_pow(attempt.saturating_sub(1));
    let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..100));
    backoff + jitter
}
