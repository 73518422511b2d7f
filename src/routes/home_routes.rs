use axum::{Json, Router, extract::State, routing::get};

use crate::error::ApiError;
use crate::middleware::auth_context::AuthContext;
use crate::models::{role_to_string, AppState};

#[derive(serde::Serialize)]
pub struct HealthResponse {
    pub data: HealthData,
}

#[derive(serde::Serialize)]
pub struct HealthData {
    pub ok: bool,
}

#[derive(serde::Serialize)]
pub struct HomeResponse {
    pub data: HomeData,
}

#[derive(serde::Serialize)]
pub struct HomeData {
    pub view: String,
    pub unread_notifications: i64,
    pub unread_messages: i64,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/home", get(home))
}

/// Unauthenticated liveness probe; also stays reachable in maintenance mode.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        data: HealthData { ok: true },
    })
}

/// Role-aware dashboard seed: which view to render plus unread counters.
pub async fn home(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<HomeResponse>, ApiError> {
    let unread_notifications: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM notification
        WHERE user_id = $1
          AND read_at IS NULL
        "#,
    )
    .bind(auth.user_id)
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::db)?;

    let unread_messages: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM message m
        JOIN conversation c ON c.conversation_id = m.conversation_id
        WHERE (c.patient_id = $1 OR c.therapist_id = $1)
          AND m.sender_id <> $1
          AND m.read_at IS NULL
        "#,
    )
    .bind(auth.user_id)
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::db)?;

    Ok(Json(HomeResponse {
        data: HomeData {
            view: role_to_string(auth.role),
            unread_notifications,
            unread_messages,
        },
    }))
}
