use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};

use crate::error::{ErrorObject, ErrorResponse};
use crate::models::AppState;

/// When MAINTENANCE_MODE is set, every /api route answers 503 so clients can
/// show their maintenance page. /health stays reachable for probes.
pub async fn maintenance_gate(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    if state.maintenance_mode && req.uri().path().starts_with("/api") {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse {
                error: ErrorObject {
                    code: "MAINTENANCE".to_string(),
                    message: "The service is down for maintenance".to_string(),
                },
            }),
        )
            .into_response();
    }
    next.run(req).await
}
