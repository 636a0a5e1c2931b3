//! Mail endpoints: outbound task handler and the transport's webhooks.

use std::collections::HashMap;

use axum::{
    Form, Json,
    body::{Body, Bytes},
    extract::{FromRequest, Multipart, Path, Request, State},
    http::{HeaderMap, header},
};
use tracing::{info, warn};

use super::{Ack, AppState};
use crate::error::ApiError;
use crate::mail::inbound::MAX_BODY_SIZE;
use crate::mail::{BounceNotification, OutboundMailTask};
use crate::tasks::QUEUE_NAME_HEADER;

/// `POST /tasks/outbound-email`
pub async fn handle_outbound_email(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Ack>, ApiError> {
    let queue_name = headers
        .get(QUEUE_NAME_HEADER)
        .and_then(|v| v.to_str().ok());
    state.dispatcher.require_task_header(queue_name)?;

    let task: OutboundMailTask = serde_json::from_slice(&body).map_err(|e| {
        warn!(error = %e, "Unreadable outbound email task");
        ApiError::BadRequest("Invalid task payload".into())
    })?;
    state.dispatcher.send(queue_name, task).await?;
    Ok(Json(Ack::done()))
}

/// `POST /_ah/bounce`
pub async fn handle_bounce(
    State(state): State<AppState>,
    BounceForm(bounce): BounceForm,
) -> Result<Json<Ack>, ApiError> {
    state.bounces.ingest(&bounce).await?;
    Ok(Json(Ack::done()))
}

/// `POST /_ah/mail/{addr}`
///
/// Soft rejections are acknowledged with 200 so the transport does not retry.
pub async fn handle_incoming_mail(
    State(state): State<AppState>,
    Path(addr): Path<String>,
    headers: HeaderMap,
    body: Body,
) -> Result<Json<Ack>, ApiError> {
    let declared_len = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    if declared_len.is_some_and(|len| len > MAX_BODY_SIZE as u64) {
        let outcome = state.inbound.reject_oversized(&addr, declared_len);
        return Ok(Json(Ack::new(outcome.message())));
    }

    let raw = match axum::body::to_bytes(body, MAX_BODY_SIZE).await {
        Ok(raw) => raw,
        Err(e) => {
            info!(error = %e, "Inbound body not read in full");
            let outcome = state.inbound.reject_oversized(&addr, None);
            return Ok(Json(Ack::new(outcome.message())));
        }
    };

    let outcome = state.inbound.ingest(&addr, &raw).await?;
    Ok(Json(Ack::new(outcome.message())))
}

/// Bounce form fields, posted either as `multipart/form-data` or urlencoded.
pub struct BounceForm(pub BounceNotification);

impl<S> FromRequest<S> for BounceForm
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_multipart = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("multipart/form-data"));

        if !is_multipart {
            let Form(fields) = Form::<HashMap<String, String>>::from_request(req, state)
                .await
                .map_err(|e| ApiError::BadRequest(format!("Invalid bounce form: {e}")))?;
            return Ok(Self(BounceNotification::from_fields(fields)));
        }

        let mut multipart = Multipart::from_request(req, state)
            .await
            .map_err(|e| ApiError::BadRequest(format!("Invalid bounce form: {e}")))?;
        let mut fields = Vec::new();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Invalid bounce form: {e}")))?
        {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };
            let value = field
                .text()
                .await
                .map_err(|e| ApiError::BadRequest(format!("Invalid bounce field {name}: {e}")))?;
            fields.push((name, value));
        }
        Ok(Self(BounceNotification::from_fields(fields)))
    }
}
