use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Word Party Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::game::validate_pin,
        crate::routes::game::room_summary,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::game::PinValidation,
            crate::dto::game::RoomSummary,
            crate::dto::ws::ClientCommand,
            crate::dto::ws::ServerEvent,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "game", description = "Room lookup helpers"),
        (name = "ws", description = "WebSocket gateway for game clients"),
    )
)]
pub struct ApiDoc;
