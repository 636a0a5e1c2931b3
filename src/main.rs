use std::sync::Arc;

use anyhow::Context;

use featurewatch::api::{AppState, app_routes};
use featurewatch::config::AppConfig;
use featurewatch::error::ConfigError;
use featurewatch::mail::transport::UnconfiguredTransport;
use featurewatch::mail::{MailTransport, SmtpConfig, SmtpMailTransport};
use featurewatch::store::{Database, LibSqlBackend};
use featurewatch::tasks::{HttpTaskEnqueuer, TaskEnqueuer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = Arc::new(AppConfig::from_env().context("Invalid configuration")?);

    eprintln!("⭐ Featurewatch v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   App: {}", config.mail.app_id);
    eprintln!("   HTTP: http://0.0.0.0:{}", config.port);
    eprintln!("   Inbound address: {}", config.mail.inbound_email_addr);
    eprintln!(
        "   Sending email: {}",
        if config.mail.send_email { "enabled" } else { "disabled" }
    );

    // ── Database ─────────────────────────────────────────────────────────
    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(std::path::Path::new(&config.db_path))
            .await
            .with_context(|| format!("Failed to open database at {}", config.db_path))?,
    );
    eprintln!("   Database: {}", config.db_path);

    // ── Mail transport ───────────────────────────────────────────────────
    let transport: Arc<dyn MailTransport> = match SmtpConfig::from_env() {
        Some(smtp) => {
            eprintln!("   SMTP relay: {}:{}", smtp.host, smtp.port);
            Arc::new(SmtpMailTransport::new(&smtp)?)
        }
        None if config.mail.send_email => {
            return Err(ConfigError::MissingEnvVar("FEATUREWATCH_SMTP_HOST".into()).into());
        }
        None => {
            eprintln!("   SMTP relay: not configured");
            Arc::new(UnconfiguredTransport)
        }
    };

    // ── Task queue ───────────────────────────────────────────────────────
    let enqueuer: Arc<dyn TaskEnqueuer> = Arc::new(HttpTaskEnqueuer::new(&config.task_queue_url));
    eprintln!("   Task queue: {}", config.task_queue_url);

    let state = AppState::build(Arc::clone(&config), db, transport, enqueuer)?;
    let app = app_routes(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port))
        .await
        .with_context(|| format!("Failed to bind port {}", config.port))?;
    tracing::info!(port = config.port, "HTTP server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Shutting down");
        })
        .await?;
    Ok(())
}
