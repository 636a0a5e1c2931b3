//! HTTP surface: star API, outbound mail task handler and mail webhooks.

pub mod email;
pub mod session;
pub mod stars;

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    http::HeaderName,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Serialize;
use tower_http::trace::TraceLayer;

pub use session::{SessionProvider, TrustedHeaderSession};

use crate::config::AppConfig;
use crate::error::ConfigError;
use crate::mail::inbound::MAX_BODY_SIZE;
use crate::mail::{BounceIngestor, InboundMailIngestor, MailTransport, OutboundMailDispatcher};
use crate::store::Database;
use crate::tasks::TaskEnqueuer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn Database>,
    pub session: Arc<dyn SessionProvider>,
    pub dispatcher: Arc<OutboundMailDispatcher>,
    pub bounces: Arc<BounceIngestor>,
    pub inbound: Arc<InboundMailIngestor>,
}

impl AppState {
    /// Wire the mail pipeline and session lookup around the given collaborators.
    pub fn build(
        config: Arc<AppConfig>,
        db: Arc<dyn Database>,
        transport: Arc<dyn MailTransport>,
        enqueuer: Arc<dyn TaskEnqueuer>,
    ) -> Result<Self, ConfigError> {
        let header = HeaderName::from_bytes(config.session_header.as_bytes()).map_err(|e| {
            ConfigError::InvalidValue {
                key: "FEATUREWATCH_SESSION_HEADER".into(),
                message: e.to_string(),
            }
        })?;
        let mail = Arc::new(config.mail.clone());

        Ok(Self {
            session: Arc::new(TrustedHeaderSession::new(header)),
            dispatcher: Arc::new(OutboundMailDispatcher::new(mail.clone(), transport.clone())),
            bounces: Arc::new(BounceIngestor::new(mail.clone(), db.clone(), transport)),
            inbound: Arc::new(InboundMailIngestor::new(mail, enqueuer)),
            db,
        })
    }
}

/// `{"message": ...}` acknowledgement body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ack {
    pub message: &'static str,
}

impl Ack {
    pub fn new(message: &'static str) -> Self {
        Self { message }
    }

    pub fn done() -> Self {
        Self::new("Done")
    }
}

/// Build the Axum router with every route the service exposes.
pub fn app_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/api/v0/currentuser/stars",
            get(stars::get_stars).post(stars::set_star),
        )
        .route("/tasks/outbound-email", post(email::handle_outbound_email))
        // Bounce reports quote the original message.
        .route(
            "/_ah/bounce",
            post(email::handle_bounce).layer(DefaultBodyLimit::max(MAX_BODY_SIZE)),
        )
        .route("/_ah/mail/{addr}", post(email::handle_incoming_mail))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "featurewatch"
    }))
}
