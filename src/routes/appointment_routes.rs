// src/routes/appointment_routes.rs
//
// Appointments exist only through accepted requests (see request_routes);
// here they are listed, inspected, and moved through their small status set.
// Appointments are never deleted.

use axum::{
    extract::{Path, Query, State},
    routing::{get, patch, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{
        appointment_status_to_string, AppState, AppointmentRow, APPT_SCHEDULED, ROLE_THERAPIST,
    },
    routes::notification_routes::notify,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_appointments))
        .route("/{appointment_id}", get(get_appointment))
        .route("/{appointment_id}/complete", post(mark_completed))
        .route("/{appointment_id}/cancel", post(mark_cancelled))
        .route("/{appointment_id}/note", patch(patch_note))
}

/* ============================================================
   DTOs
   ============================================================ */

#[derive(Debug, Serialize)]
pub struct AppointmentResponse {
    pub data: AppointmentDto,
}

#[derive(Debug, Serialize)]
pub struct AppointmentListResponse {
    pub data: Vec<AppointmentDto>,
}

#[derive(Debug, Serialize)]
pub struct AppointmentDto {
    #[serde(flatten)]
    pub row: AppointmentRow,
    pub status_label: &'static str,
}

fn into_dto(row: AppointmentRow) -> AppointmentDto {
    let status_label = appointment_status_to_string(row.status);
    AppointmentDto { row, status_label }
}

/* ============================================================
   GET /appointments  (own, role-scoped)
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<i16>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

pub async fn list_appointments(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(q): Query<ListQuery>,
) -> Result<Json<AppointmentListResponse>, ApiError> {
    if let Some(s) = q.status {
        if !(0..=2).contains(&s) {
            return Err(ApiError::BadRequest("VALIDATION_ERROR", "invalid status".into()));
        }
    }

    let rows: Vec<AppointmentRow> = sqlx::query_as::<_, AppointmentRow>(
        r#"
        SELECT appointment_id, patient_id, therapist_id, start_at, end_at,
               location_type, status, note, created_at, updated_at
        FROM appointment
        WHERE (patient_id = $1 OR therapist_id = $1)
          AND ($2::smallint IS NULL OR status = $2)
          AND ($3::timestamptz IS NULL OR start_at >= $3)
          AND ($4::timestamptz IS NULL OR start_at < $4)
        ORDER BY start_at ASC
        "#,
    )
    .bind(auth.user_id)
    .bind(q.status)
    .bind(q.from)
    .bind(q.to)
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::db)?;

    Ok(Json(AppointmentListResponse {
        data: rows.into_iter().map(into_dto).collect(),
    }))
}

/* ============================================================
   GET /appointments/{id}  (participants only)
   ============================================================ */

async fn load_own_appointment(
    state: &AppState,
    appointment_id: Uuid,
    user_id: Uuid,
) -> Result<AppointmentRow, ApiError> {
    sqlx::query_as::<_, AppointmentRow>(
        r#"
        SELECT appointment_id, patient_id, therapist_id, start_at, end_at,
               location_type, status, note, created_at, updated_at
        FROM appointment
        WHERE appointment_id = $1
          AND (patient_id = $2 OR therapist_id = $2)
        "#,
    )
    .bind(appointment_id)
    .bind(user_id)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::db)?
    .ok_or_else(|| ApiError::NotFound("NOT_FOUND", "appointment not found".into()))
}

pub async fn get_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<AppointmentResponse>, ApiError> {
    let row = load_own_appointment(&state, appointment_id, auth.user_id).await?;
    Ok(Json(AppointmentResponse {
        data: into_dto(row),
    }))
}

/* ============================================================
   Status transitions (therapist)
   ============================================================ */

/// Single-row guarded update: only a scheduled appointment owned by this
/// therapist moves, and only the addressed row is touched.
async fn transition(
    state: &AppState,
    appointment_id: Uuid,
    therapist_id: Uuid,
    to_status: i16,
) -> Result<AppointmentRow, ApiError> {
    let row: Option<AppointmentRow> = sqlx::query_as::<_, AppointmentRow>(
        r#"
        UPDATE appointment
        SET status = $3,
            updated_at = now()
        WHERE appointment_id = $1
          AND therapist_id = $2
          AND status = $4
        RETURNING appointment_id, patient_id, therapist_id, start_at, end_at,
                  location_type, status, note, created_at, updated_at
        "#,
    )
    .bind(appointment_id)
    .bind(therapist_id)
    .bind(to_status)
    .bind(APPT_SCHEDULED)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::db)?;

    row.ok_or_else(|| {
        ApiError::Conflict(
            "NOT_SCHEDULED",
            "appointment not found, not yours, or no longer scheduled".into(),
        )
    })
}

pub async fn mark_completed(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<AppointmentResponse>, ApiError> {
    auth.require_role(ROLE_THERAPIST)?;
    let row = transition(&state, appointment_id, auth.user_id, 1).await?;
    Ok(Json(AppointmentResponse {
        data: into_dto(row),
    }))
}

pub async fn mark_cancelled(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<AppointmentResponse>, ApiError> {
    auth.require_role(ROLE_THERAPIST)?;
    let row = transition(&state, appointment_id, auth.user_id, 2).await?;

    notify(
        &state,
        row.patient_id,
        "Appointment cancelled",
        &format!(
            "Your appointment on {} was cancelled",
            row.start_at.format("%Y-%m-%d %H:%M")
        ),
    )
    .await;

    Ok(Json(AppointmentResponse {
        data: into_dto(row),
    }))
}

/* ============================================================
   PATCH /appointments/{id}/note  (therapist documentation)
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct PatchNoteRequest {
    pub note: Option<String>,
}

pub async fn patch_note(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<Uuid>,
    Json(req): Json<PatchNoteRequest>,
) -> Result<Json<AppointmentResponse>, ApiError> {
    auth.require_role(ROLE_THERAPIST)?;

    let row: Option<AppointmentRow> = sqlx::query_as::<_, AppointmentRow>(
        r#"
        UPDATE appointment
        SET note = $3,
            updated_at = now()
        WHERE appointment_id = $1
          AND therapist_id = $2
        RETURNING appointment_id, patient_id, therapist_id, start_at, end_at,
                  location_type, status, note, created_at, updated_at
        "#,
    )
    .bind(appointment_id)
    .bind(auth.user_id)
    .bind(req.note.as_deref().map(str::trim))
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::db)?;

    let row =
        row.ok_or_else(|| ApiError::NotFound("NOT_FOUND", "appointment not found".into()))?;

    Ok(Json(AppointmentResponse {
        data: into_dto(row),
    }))
}
