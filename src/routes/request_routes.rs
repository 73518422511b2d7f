// src/routes/request_routes.rs
//
// Appointment requests: a patient proposes a time window, the therapist
// accepts or declines. Accepting creates the appointment. The only reachable
// transitions are pending -> accepted, pending -> declined, and
// pending -> cancelled (patient); the WHERE guards below make everything
// else a 409.

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{
        request_status_to_string, AppState, AppointmentRequestRow, AppointmentRow, LocationType,
        ROLE_PATIENT, ROLE_THERAPIST,
    },
    routes::notification_routes::notify,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_request).get(list_requests))
        .route("/{request_id}", get(get_request))
        .route("/{request_id}/accept", post(accept_request))
        .route("/{request_id}/decline", post(decline_request))
        .route("/{request_id}/cancel", post(cancel_request))
}

/* ============================================================
   DTOs
   ============================================================ */

#[derive(Debug, Serialize)]
pub struct RequestResponse {
    pub data: RequestDto,
}

#[derive(Debug, Serialize)]
pub struct RequestListResponse {
    pub data: Vec<RequestDto>,
}

#[derive(Debug, Serialize)]
pub struct RequestDto {
    #[serde(flatten)]
    pub row: AppointmentRequestRow,
    pub status_label: &'static str,
}

fn into_dto(row: AppointmentRequestRow) -> RequestDto {
    let status_label = request_status_to_string(row.status);
    RequestDto { row, status_label }
}

/* ============================================================
   POST /requests  (patient)
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct CreateRequestRequest {
    pub therapist_id: Uuid,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub location_type: String,
    pub patient_note: Option<String>,
}

/// Creates the request and, on first contact, the (patient, therapist)
/// conversation. Identical resubmissions create independent rows; there is no
/// idempotency key on this path.
pub async fn create_request(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreateRequestRequest>,
) -> Result<Json<RequestResponse>, ApiError> {
    auth.require_role(ROLE_PATIENT)?;

    if req.end_at <= req.start_at {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "end_at must be > start_at".into(),
        ));
    }
    let location_type = LocationType::parse(req.location_type.trim()).ok_or_else(|| {
        ApiError::BadRequest(
            "VALIDATION_ERROR",
            "location_type must be mobile, clinic, or virtual".into(),
        )
    })?;

    // The target must be an active therapist account.
    let exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS(
            SELECT 1
            FROM account
            WHERE user_id = $1
              AND role = $2
              AND is_active = true
        )
        "#,
    )
    .bind(req.therapist_id)
    .bind(ROLE_THERAPIST)
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::db)?;

    if !exists {
        return Err(ApiError::NotFound("NOT_FOUND", "therapist not found".into()));
    }

    let mut tx = state.db.begin().await.map_err(ApiError::db)?;

    let row: AppointmentRequestRow = sqlx::query_as::<_, AppointmentRequestRow>(
        r#"
        INSERT INTO appointment_request
            (patient_id, therapist_id, start_at, end_at, location_type, patient_note)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING request_id, patient_id, therapist_id, start_at, end_at,
                  location_type, status, patient_note, created_at, decided_at
        "#,
    )
    .bind(auth.user_id)
    .bind(req.therapist_id)
    .bind(req.start_at)
    .bind(req.end_at)
    .bind(location_type.as_str())
    .bind(req.patient_note.as_deref().map(str::trim))
    .fetch_one(&mut *tx)
    .await
    .map_err(ApiError::db)?;

    // Lazily open the conversation for this pair on first contact.
    sqlx::query(
        r#"
        INSERT INTO conversation (patient_id, therapist_id)
        VALUES ($1, $2)
        ON CONFLICT (patient_id, therapist_id) DO NOTHING
        "#,
    )
    .bind(auth.user_id)
    .bind(req.therapist_id)
    .execute(&mut *tx)
    .await
    .map_err(ApiError::db)?;

    tx.commit().await.map_err(ApiError::db)?;

    notify(
        &state,
        req.therapist_id,
        "New appointment request",
        &format!(
            "A patient requested a {} visit on {}",
            location_type.as_str(),
            req.start_at.format("%Y-%m-%d %H:%M")
        ),
    )
    .await;

    Ok(Json(RequestResponse {
        data: into_dto(row),
    }))
}

/* ============================================================
   GET /requests  (own, role-scoped)
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct ListRequestsQuery {
    pub status: Option<i16>,
}

pub async fn list_requests(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(q): Query<ListRequestsQuery>,
) -> Result<Json<RequestListResponse>, ApiError> {
    if let Some(s) = q.status {
        if !(0..=3).contains(&s) {
            return Err(ApiError::BadRequest("VALIDATION_ERROR", "invalid status".into()));
        }
    }

    let rows: Vec<AppointmentRequestRow> = sqlx::query_as::<_, AppointmentRequestRow>(
        r#"
        SELECT request_id, patient_id, therapist_id, start_at, end_at,
               location_type, status, patient_note, created_at, decided_at
        FROM appointment_request
        WHERE (patient_id = $1 OR therapist_id = $1)
          AND ($2::smallint IS NULL OR status = $2)
        ORDER BY created_at DESC
        "#,
    )
    .bind(auth.user_id)
    .bind(q.status)
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::db)?;

    Ok(Json(RequestListResponse {
        data: rows.into_iter().map(into_dto).collect(),
    }))
}

/* ============================================================
   GET /requests/{id}  (participants only)
   ============================================================ */

pub async fn get_request(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(request_id): Path<Uuid>,
) -> Result<Json<RequestResponse>, ApiError> {
    let row: AppointmentRequestRow = sqlx::query_as::<_, AppointmentRequestRow>(
        r#"
        SELECT request_id, patient_id, therapist_id, start_at, end_at,
               location_type, status, patient_note, created_at, decided_at
        FROM appointment_request
        WHERE request_id = $1
          AND (patient_id = $2 OR therapist_id = $2)
        "#,
    )
    .bind(request_id)
    .bind(auth.user_id)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::db)?
    .ok_or_else(|| ApiError::NotFound("NOT_FOUND", "request not found".into()))?;

    Ok(Json(RequestResponse {
        data: into_dto(row),
    }))
}

/* ============================================================
   POST /requests/{id}/accept  (therapist)
   ============================================================ */

#[derive(Debug, Serialize)]
pub struct AcceptResponse {
    pub data: AcceptData,
}

#[derive(Debug, Serialize)]
pub struct AcceptData {
    pub request: RequestDto,
    pub appointment: AppointmentRow,
}

pub async fn accept_request(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(request_id): Path<Uuid>,
) -> Result<Json<AcceptResponse>, ApiError> {
    auth.require_role(ROLE_THERAPIST)?;

    let mut tx = state.db.begin().await.map_err(ApiError::db)?;

    // Guarded transition: only a pending request owned by this therapist moves.
    let row: Option<AppointmentRequestRow> = sqlx::query_as::<_, AppointmentRequestRow>(
        r#"
        UPDATE appointment_request
        SET status = 1,
            decided_at = now()
        WHERE request_id = $1
          AND therapist_id = $2
          AND status = 0
        RETURNING request_id, patient_id, therapist_id, start_at, end_at,
                  location_type, status, patient_note, created_at, decided_at
        "#,
    )
    .bind(request_id)
    .bind(auth.user_id)
    .fetch_optional(&mut *tx)
    .await
    .map_err(ApiError::db)?;

    let Some(row) = row else {
        return Err(not_pending(&state, request_id, auth.user_id).await);
    };

    let appointment: AppointmentRow = sqlx::query_as::<_, AppointmentRow>(
        r#"
        INSERT INTO appointment
            (patient_id, therapist_id, start_at, end_at, location_type)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING appointment_id, patient_id, therapist_id, start_at, end_at,
                  location_type, status, note, created_at, updated_at
        "#,
    )
    .bind(row.patient_id)
    .bind(row.therapist_id)
    .bind(row.start_at)
    .bind(row.end_at)
    .bind(&row.location_type)
    .fetch_one(&mut *tx)
    .await
    .map_err(ApiError::db)?;

    tx.commit().await.map_err(ApiError::db)?;

    notify(
        &state,
        row.patient_id,
        "Request accepted",
        &format!(
            "Your appointment on {} was confirmed",
            row.start_at.format("%Y-%m-%d %H:%M")
        ),
    )
    .await;

    Ok(Json(AcceptResponse {
        data: AcceptData {
            request: into_dto(row),
            appointment,
        },
    }))
}

/// Distinguish "not yours / missing" from "already decided" for a failed
/// guarded transition.
async fn not_pending(state: &AppState, request_id: Uuid, actor: Uuid) -> ApiError {
    let status: Result<Option<i16>, _> = sqlx::query_scalar(
        r#"
        SELECT status
        FROM appointment_request
        WHERE request_id = $1
          AND (patient_id = $2 OR therapist_id = $2)
        "#,
    )
    .bind(request_id)
    .bind(actor)
    .fetch_optional(&state.db)
    .await;

    match status {
        Ok(Some(s)) => ApiError::Conflict(
            "NOT_PENDING",
            format!("request is already {}", request_status_to_string(s)),
        ),
        Ok(None) => ApiError::NotFound("NOT_FOUND", "request not found".into()),
        Err(e) => ApiError::db(e),
    }
}

/* ============================================================
   POST /requests/{id}/decline  (therapist)
   ============================================================ */

pub async fn decline_request(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(request_id): Path<Uuid>,
) -> Result<Json<RequestResponse>, ApiError> {
    auth.require_role(ROLE_THERAPIST)?;

    let row: Option<AppointmentRequestRow> = sqlx::query_as::<_, AppointmentRequestRow>(
        r#"
        UPDATE appointment_request
        SET status = 2,
            decided_at = now()
        WHERE request_id = $1
          AND therapist_id = $2
          AND status = 0
        RETURNING request_id, patient_id, therapist_id, start_at, end_at,
                  location_type, status, patient_note, created_at, decided_at
        "#,
    )
    .bind(request_id)
    .bind(auth.user_id)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::db)?;

    let Some(row) = row else {
        return Err(not_pending(&state, request_id, auth.user_id).await);
    };

    notify(
        &state,
        row.patient_id,
        "Request declined",
        &format!(
            "Your request for {} could not be accommodated",
            row.start_at.format("%Y-%m-%d %H:%M")
        ),
    )
    .await;

    Ok(Json(RequestResponse {
        data: into_dto(row),
    }))
}

/* ============================================================
   POST /requests/{id}/cancel  (patient)
   ============================================================ */

pub async fn cancel_request(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(request_id): Path<Uuid>,
) -> Result<Json<RequestResponse>, ApiError> {
    auth.require_role(ROLE_PATIENT)?;

    let row: Option<AppointmentRequestRow> = sqlx::query_as::<_, AppointmentRequestRow>(
        r#"
        UPDATE appointment_request
        SET status = 3,
            decided_at = now()
        WHERE request_id = $1
          AND patient_id = $2
          AND status = 0
        RETURNING request_id, patient_id, therapist_id, start_at, end_at,
                  location_type, status, patient_note, created_at, decided_at
        "#,
    )
    .bind(request_id)
    .bind(auth.user_id)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::db)?;

    let Some(row) = row else {
        return Err(not_pending(&state, request_id, auth.user_id).await);
    };

    Ok(Json(RequestResponse {
        data: into_dto(row),
    }))
}
