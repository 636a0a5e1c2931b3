//! Star toggles for the signed-in user.

use axum::{Json, body::Bytes, extract::State, http::HeaderMap};
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use super::{Ack, AppState};
use crate::error::ApiError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StarsResponse {
    pub feature_ids: Vec<i64>,
}

/// `GET /api/v0/currentuser/stars`
pub async fn get_stars(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<StarsResponse>, ApiError> {
    let feature_ids = match state.session.current_user(&headers) {
        Some(email) => state.db.get_user_stars(&email).await?,
        // Anonymous users cannot star features.
        None => Vec::new(),
    };
    Ok(Json(StarsResponse { feature_ids }))
}

/// `POST /api/v0/currentuser/stars`
///
/// The body is read as JSON whatever its content type.
pub async fn set_star(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Ack>, ApiError> {
    let json: Value = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid JSON body: {e}")))?;

    let feature_id = json.get("featureId").and_then(strict_int).ok_or_else(|| {
        info!(feature_id = ?json.get("featureId"), "Invalid feature_id");
        ApiError::BadRequest("Invalid featureId".into())
    })?;
    let starred = json.get("starred").is_none_or(truthy);

    if state.db.get_feature(feature_id).await?.is_none() {
        info!(feature_id, "Feature not found");
        return Err(ApiError::NotFound("Feature not found".into()));
    }

    let Some(email) = state.session.current_user(&headers) else {
        info!("User must be signed in before starring");
        return Err(ApiError::BadRequest("Sign in required".into()));
    };

    state.db.set_star(&email, feature_id, starred).await?;
    Ok(Json(Ack::done()))
}

/// Integers only: `1.0`, `"1"` and `true` are rejected.
fn strict_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        _ => None,
    }
}

/// JSON truthiness: `null`, `false`, `0`, `""`, `[]` and `{}` are false.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}
