use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::debug;

use meddle_types::api::{Claims, RegisterDeviceRequest, RegisterDeviceResponse};

use crate::error::ApiError;
use crate::state::AppState;

const MAX_TOKEN_LEN: usize = 4096;

/// `POST /devices`: remember a push token for the caller.
/// Registering a known token again answers 200 instead of 201.
pub async fn register_device(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<RegisterDeviceRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let token = req.token.trim().to_string();
    if token.is_empty() || token.len() > MAX_TOKEN_LEN {
        return Err(ApiError::BadRequest("invalid device token".into()));
    }

    let user_id = claims.sub;
    let now = state.clock.now();
    let stored = token.clone();
    let inserted = state
        .blocking(move |db| db.add_device_token(user_id, &stored, now))
        .await?;

    debug!(user_id = %user_id, inserted, "Device token registered");

    let status = if inserted {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(RegisterDeviceResponse { token, user_id })))
}
