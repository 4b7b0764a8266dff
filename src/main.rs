use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use reply_pilot::approval::CliApprovalGate;
use reply_pilot::config::{
    ComposerConfig, DispatchConfig, ExtractorConfig, LlmConfig, ResearchConfig, RetrieverConfig,
    SmtpConfig,
};
use reply_pilot::dispatch::{Dispatcher, SendTransport, SmtpSender};
use reply_pilot::index::{build_index, sample_corpus};
use reply_pilot::llm::OpenAiClient;
use reply_pilot::logsink::JsonlLogSink;
use reply_pilot::pipeline::composer::ResponseComposer;
use reply_pilot::pipeline::extractor::EntityExtractor;
use reply_pilot::pipeline::research::ContextResearcher;
use reply_pilot::pipeline::retriever::StyleRetriever;
use reply_pilot::pipeline::runner::{Pipeline, RunOutcome};
use reply_pilot::pipeline::types::SendStatus;
use reply_pilot::search::DuckDuckGoSearch;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("Error: failed to install rustls crypto provider");
        std::process::exit(1);
    }

    // Initialize tracing; REPLY_PILOT_TRACE_DIR adds a daily-rolling file log
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(false));
    let _trace_guard = match std::env::var("REPLY_PILOT_TRACE_DIR") {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "reply-pilot.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false),
                )
                .init();
            Some(guard)
        }
        Err(_) => {
            registry.init();
            None
        }
    };

    let llm_config = match LlmConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            eprintln!("  export OPENAI_API_KEY=sk-...");
            std::process::exit(1);
        }
    };

    let mut dispatch_config = DispatchConfig::from_env();
    let smtp_config = SmtpConfig::from_env();
    if smtp_config.is_none() && !dispatch_config.force_simulation {
        eprintln!("   SMTP_HOST not set — sends will be simulated");
        dispatch_config.force_simulation = true;
    }

    eprintln!("📧 Reply Pilot v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", llm_config.model);
    eprintln!("   Embeddings: {}", llm_config.embed_model);
    if dispatch_config.force_simulation {
        eprintln!("   Mode: simulation (no real sends)");
    }
    eprintln!();

    let client = Arc::new(OpenAiClient::new(&llm_config)?);

    // ── Historical index ─────────────────────────────────────────────
    let index = build_index(client.as_ref(), sample_corpus()).await;
    if index.is_empty() {
        eprintln!("   Warning: historical index is empty, style retrieval will degrade");
    } else {
        eprintln!("   Historical index: {} emails", index.len());
    }

    // ── Pipeline wiring ──────────────────────────────────────────────
    let extractor = EntityExtractor::new(client.clone(), ExtractorConfig::default());
    let retriever = StyleRetriever::new(
        client.clone(),
        client.clone(),
        Arc::new(index),
        RetrieverConfig::default(),
    );
    let search = Arc::new(DuckDuckGoSearch::new(
        DuckDuckGoSearch::DEFAULT_API_BASE,
        Duration::from_secs(8),
    )?);
    let researcher = ContextResearcher::new(client.clone(), search, ResearchConfig::default());
    let composer = ResponseComposer::new(client.clone(), ComposerConfig::default());

    let transport: Option<Arc<dyn SendTransport>> =
        smtp_config.map(|config| Arc::new(SmtpSender::new(config)) as Arc<dyn SendTransport>);
    let log_path = std::env::var("REPLY_PILOT_LOG_PATH")
        .unwrap_or_else(|_| "./data/send-log.jsonl".to_string());
    eprintln!("   Send log: {log_path}\n");
    let dispatcher = Dispatcher::new(transport, Arc::new(JsonlLogSink::new(log_path)), dispatch_config);

    let pipeline = Pipeline::new(
        extractor,
        retriever,
        researcher,
        composer,
        Arc::new(CliApprovalGate),
        dispatcher,
    );

    // ── Input ────────────────────────────────────────────────────────
    let raw_email = match std::env::args().nth(1) {
        Some(path) => tokio::fs::read_to_string(&path).await?,
        None => {
            eprintln!("Reading email from stdin (end with Ctrl-D)...");
            let mut buf = String::new();
            tokio::io::stdin().read_to_string(&mut buf).await?;
            buf
        }
    };

    let cancel = AtomicBool::new(false);
    match pipeline.run(&raw_email, &cancel).await? {
        RunOutcome::Completed(result) => {
            match result.status {
                SendStatus::Sent => eprintln!("✅ Sent."),
                SendStatus::DemoSimulated => eprintln!(
                    "📋 Simulated send ({}).",
                    result.error_detail.as_deref().unwrap_or("no detail")
                ),
                SendStatus::Failed => eprintln!(
                    "❌ Send failed: {}",
                    result.error_detail.as_deref().unwrap_or("unknown error")
                ),
            }
            Ok(())
        }
        RunOutcome::Rejected => {
            eprintln!("🚫 Draft rejected; nothing sent.");
            Ok(())
        }
        RunOutcome::Cancelled => {
            eprintln!("Cancelled.");
            Ok(())
        }
    }
}
