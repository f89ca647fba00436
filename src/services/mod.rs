/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Room lifecycle and round progression logic.
pub mod room_service;
/// WebSocket connection and message handling service.
pub mod websocket_service;
