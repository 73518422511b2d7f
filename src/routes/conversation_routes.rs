// src/routes/conversation_routes.rs
//
// One conversation per (patient, therapist) pair, opened lazily by the first
// appointment request. Messages are append-only; read_at is set per message
// by the recipient, never in bulk.

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::ApiError,
    events::{AppEvent, EventKind},
    middleware::auth_context::AuthContext,
    models::{AppState, MessageRow, OkData, OkResponse},
    routes::notification_routes::notify,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/conversations", get(list_conversations))
        .route(
            "/conversations/{conversation_id}/messages",
            get(list_messages).post(send_message),
        )
        .route("/messages/{message_id}/read", post(mark_message_read))
}

/* ============================================================
   DTOs
   ============================================================ */

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct ConversationListItem {
    pub conversation_id: Uuid,
    pub patient_id: Uuid,
    pub therapist_id: Uuid,
    pub other_display_name: String,
    pub created_at: DateTime<Utc>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub last_message_preview: Option<String>,
    pub unread_count: i64,
}

#[derive(Debug, Serialize)]
pub struct ConversationListResponse {
    pub data: Vec<ConversationListItem>,
}

#[derive(Debug, Serialize)]
pub struct MessageListResponse {
    pub data: Vec<MessageRow>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub data: MessageRow,
}

/* ============================================================
   GET /conversations
   ============================================================ */

pub async fn list_conversations(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ConversationListResponse>, ApiError> {
    let rows: Vec<ConversationListItem> = sqlx::query_as::<_, ConversationListItem>(
        r#"
        SELECT
          c.conversation_id,
          c.patient_id,
          c.therapist_id,
          other.display_name AS other_display_name,
          c.created_at,
          last_msg.created_at AS last_message_at,
          last_msg.body       AS last_message_preview,
          COALESCE(unread.n, 0) AS unread_count
        FROM conversation c
        JOIN account other
          ON other.user_id = CASE WHEN c.patient_id = $1 THEN c.therapist_id ELSE c.patient_id END
        LEFT JOIN LATERAL (
          SELECT m.created_at, m.body
          FROM message m
          WHERE m.conversation_id = c.conversation_id
          ORDER BY m.created_at DESC
          LIMIT 1
        ) last_msg ON true
        LEFT JOIN LATERAL (
          SELECT COUNT(*) AS n
          FROM message m
          WHERE m.conversation_id = c.conversation_id
            AND m.sender_id <> $1
            AND m.read_at IS NULL
        ) unread ON true
        WHERE c.patient_id = $1 OR c.therapist_id = $1
        ORDER BY last_msg.created_at DESC NULLS LAST, c.created_at DESC
        "#,
    )
    .bind(auth.user_id)
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::db)?;

    Ok(Json(ConversationListResponse { data: rows }))
}

/* ============================================================
   Participants check
   ============================================================ */

#[derive(Debug, sqlx::FromRow)]
struct ConversationRow {
    patient_id: Uuid,
    therapist_id: Uuid,
}

async fn load_own_conversation(
    state: &AppState,
    conversation_id: Uuid,
    user_id: Uuid,
) -> Result<ConversationRow, ApiError> {
    sqlx::query_as::<_, ConversationRow>(
        r#"
        SELECT patient_id, therapist_id
        FROM conversation
        WHERE conversation_id = $1
          AND (patient_id = $2 OR therapist_id = $2)
        "#,
    )
    .bind(conversation_id)
    .bind(user_id)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::db)?
    .ok_or_else(|| ApiError::NotFound("NOT_FOUND", "conversation not found".into()))
}

/* ============================================================
   GET /conversations/{id}/messages
   ============================================================ */

pub async fn list_messages(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(conversation_id): Path<Uuid>,
) -> Result<Json<MessageListResponse>, ApiError> {
    load_own_conversation(&state, conversation_id, auth.user_id).await?;

    let rows: Vec<MessageRow> = sqlx::query_as::<_, MessageRow>(
        r#"
        SELECT message_id, conversation_id, sender_id, body, created_at, read_at
        FROM message
        WHERE conversation_id = $1
        ORDER BY created_at ASC
        "#,
    )
    .bind(conversation_id)
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::db)?;

    Ok(Json(MessageListResponse { data: rows }))
}

/* ============================================================
   POST /conversations/{id}/messages
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub body: String,
}

pub async fn send_message(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(conversation_id): Path<Uuid>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let body = req.body.trim();
    if body.is_empty() {
        return Err(ApiError::BadRequest("VALIDATION_ERROR", "body is required".into()));
    }
    if body.len() > 4000 {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "body is too long (max 4000)".into(),
        ));
    }

    let convo = load_own_conversation(&state, conversation_id, auth.user_id).await?;
    let recipient = if convo.patient_id == auth.user_id {
        convo.therapist_id
    } else {
        convo.patient_id
    };

    let row: MessageRow = sqlx::query_as::<_, MessageRow>(
        r#"
        INSERT INTO message (conversation_id, sender_id, body)
        VALUES ($1, $2, $3)
        RETURNING message_id, conversation_id, sender_id, body, created_at, read_at
        "#,
    )
    .bind(conversation_id)
    .bind(auth.user_id)
    .bind(body)
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::db)?;

    state.events.publish(AppEvent {
        user_id: recipient,
        kind: EventKind::MessageCreated,
        payload: serde_json::json!({
            "conversation_id": conversation_id,
            "message_id": row.message_id,
        }),
    });

    notify(&state, recipient, "New message", "You have a new message").await;

    Ok(Json(MessageResponse { data: row }))
}

/* ============================================================
   POST /messages/{id}/read
   ============================================================ */

/// Recipient marks one message read. Per-message on purpose: this mirrors how
/// the product has always advanced read state, one row at a time as messages
/// scroll into view. Senders cannot mark their own messages.
pub async fn mark_message_read(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(message_id): Path<Uuid>,
) -> Result<Json<OkResponse>, ApiError> {
    let res = sqlx::query(
        r#"
        UPDATE message m
        SET read_at = COALESCE(m.read_at, now())
        FROM conversation c
        WHERE c.conversation_id = m.conversation_id
          AND m.message_id = $1
          AND m.sender_id <> $2
          AND (c.patient_id = $2 OR c.therapist_id = $2)
        "#,
    )
    .bind(message_id)
    .bind(auth.user_id)
    .execute(&state.db)
    .await
    .map_err(ApiError::db)?;

    if res.rows_affected() == 0 {
        return Err(ApiError::NotFound(
            "NOT_FOUND",
            "message not found or not addressed to you".into(),
        ));
    }

    Ok(Json(OkResponse {
        data: OkData { ok: true },
    }))
}
