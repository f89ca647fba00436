use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};

use crate::{
    dto::game::{PinValidation, RoomSummary},
    error::AppError,
    services::room_service,
    state::SharedState,
};

/// Routes letting clients probe a room before opening a WebSocket.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/validate-pin/{pin}", get(validate_pin))
        .route("/rooms/{pin}", get(room_summary))
}

/// Check whether a room with the given PIN currently exists.
#[utoipa::path(
    get,
    path = "/validate-pin/{pin}",
    tag = "game",
    params(("pin" = String, Path, description = "Six-digit room PIN to check")),
    responses(
        (status = 200, description = "Lookup result", body = PinValidation)
    )
)]
pub async fn validate_pin(
    State(state): State<SharedState>,
    Path(pin): Path<String>,
) -> Json<PinValidation> {
    Json(PinValidation {
        valid: state.registry().validate_pin(&pin),
    })
}

/// Fetch a read-only snapshot of a room.
#[utoipa::path(
    get,
    path = "/rooms/{pin}",
    tag = "game",
    params(("pin" = String, Path, description = "Six-digit PIN of the room")),
    responses(
        (status = 200, description = "Room snapshot", body = RoomSummary),
        (status = 404, description = "No room with that PIN")
    )
)]
pub async fn room_summary(
    State(state): State<SharedState>,
    Path(pin): Path<String>,
) -> Result<Json<RoomSummary>, AppError> {
    let summary = room_service::room_summary(&state, &pin).await?;
    Ok(Json(summary))
}
