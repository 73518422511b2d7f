// src/routes/admin_routes.rs

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{AppState, OkData, OkResponse, ROLE_ADMIN},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/accounts", get(list_accounts))
        .route("/accounts/{user_id}/deactivate", post(deactivate_account))
        .route("/accounts/{user_id}/restore", post(restore_account))
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct AccountListItem {
    pub user_id: Uuid,
    pub username: String,
    pub display_name: String,
    pub role: i16,
    pub is_active: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize)]
pub struct AccountListResponse {
    pub data: Vec<AccountListItem>,
}

#[derive(Debug, Deserialize)]
pub struct AccountListQuery {
    pub role: Option<i16>,
    pub q: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn list_accounts(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(q): Query<AccountListQuery>,
) -> Result<Json<AccountListResponse>, ApiError> {
    auth.require_role(ROLE_ADMIN)?;

    let limit = q.limit.unwrap_or(50).clamp(1, 200);
    let offset = q.offset.unwrap_or(0).max(0);
    let needle = q
        .q
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("%{s}%"));

    let rows: Vec<AccountListItem> = sqlx::query_as::<_, AccountListItem>(
        r#"
        SELECT user_id, username, display_name, role, is_active, created_at
        FROM account
        WHERE ($1::smallint IS NULL OR role = $1)
          AND ($2::text IS NULL OR username ILIKE $2 OR display_name ILIKE $2)
        ORDER BY created_at DESC
        LIMIT $3 OFFSET $4
        "#,
    )
    .bind(q.role)
    .bind(needle)
    .bind(limit)
    .bind(offset)
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::db)?;

    Ok(Json(AccountListResponse { data: rows }))
}

/// Deactivation also revokes every active session, so the account is locked
/// out immediately rather than at next login.
pub async fn deactivate_account(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(user_id): Path<Uuid>,
) -> Result<Json<OkResponse>, ApiError> {
    auth.require_role(ROLE_ADMIN)?;

    if user_id == auth.user_id {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "you cannot deactivate your own account".into(),
        ));
    }

    let mut tx = state.db.begin().await.map_err(ApiError::db)?;

    let res = sqlx::query(
        r#"
        UPDATE account
        SET is_active = false
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .execute(&mut *tx)
    .await
    .map_err(ApiError::db)?;

    if res.rows_affected() == 0 {
        return Err(ApiError::NotFound("NOT_FOUND", "account not found".into()));
    }

    sqlx::query(
        r#"
        UPDATE session_token
        SET revoked_at = now()
        WHERE user_id = $1
          AND revoked_at IS NULL
        "#,
    )
    .bind(user_id)
    .execute(&mut *tx)
    .await
    .map_err(ApiError::db)?;

    tx.commit().await.map_err(ApiError::db)?;

    Ok(Json(OkResponse {
        data: OkData { ok: true },
    }))
}

pub async fn restore_account(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(user_id): Path<Uuid>,
) -> Result<Json<OkResponse>, ApiError> {
    auth.require_role(ROLE_ADMIN)?;

    let res = sqlx::query(
        r#"
        UPDATE account
        SET is_active = true
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .execute(&state.db)
    .await
    .map_err(ApiError::db)?;

    if res.rows_affected() == 0 {
        return Err(ApiError::NotFound("NOT_FOUND", "account not found".into()));
    }

    Ok(Json(OkResponse {
        data: OkData { ok: true },
    }))
}
