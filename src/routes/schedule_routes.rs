// src/routes/schedule_routes.rs

use axum::{
    extract::{Path, State},
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{AppState, OkData, OkResponse, ROLE_THERAPIST},
    scheduling::{overlapping_pairs, validate_slots, TimeSlot},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/therapists/{therapist_id}/schedules", get(list_schedules))
        .route("/therapists/me/schedules", post(create_schedule))
        .route(
            "/schedules/{schedule_id}",
            put(replace_schedule).delete(delete_schedule),
        )
}

/* ============================================================
   DTOs
   ============================================================ */

#[derive(Debug, sqlx::FromRow)]
struct ScheduleRow {
    schedule_id: Uuid,
    therapist_id: Uuid,
    schedule_date: Option<NaiveDate>,
    weekday: Option<i16>,
    slots: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ScheduleDto {
    pub schedule_id: Uuid,
    pub therapist_id: Uuid,
    pub schedule_date: Option<NaiveDate>,
    pub weekday: Option<i16>,
    pub slots: Vec<TimeSlot>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ScheduleResponse {
    pub data: ScheduleDto,
}

#[derive(Debug, Serialize)]
pub struct ScheduleListResponse {
    pub data: Vec<ScheduleDto>,
}

fn into_dto(row: ScheduleRow) -> ScheduleDto {
    let slots: Vec<TimeSlot> = serde_json::from_value(row.slots).unwrap_or_else(|e| {
        tracing::warn!("schedule {} carries malformed slots: {e}", row.schedule_id);
        vec![]
    });
    ScheduleDto {
        schedule_id: row.schedule_id,
        therapist_id: row.therapist_id,
        schedule_date: row.schedule_date,
        weekday: row.weekday,
        slots,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}

/// Shape checks on incoming slots. Overlapping slots are accepted (the product
/// has always allowed them) but logged, so contradictory schedules are at
/// least visible in operations.
fn check_slots(therapist_id: Uuid, slots: &[TimeSlot]) -> Result<serde_json::Value, ApiError> {
    validate_slots(slots)
        .map_err(|e| ApiError::BadRequest("VALIDATION_ERROR", e.to_string()))?;

    let overlaps = overlapping_pairs(slots);
    if overlaps > 0 {
        tracing::warn!("therapist {therapist_id} saved a schedule with {overlaps} overlapping slot pair(s)");
    }

    serde_json::to_value(slots).map_err(|e| ApiError::Internal(format!("slot encode error: {e}")))
}

fn check_recurrence(
    schedule_date: Option<NaiveDate>,
    weekday: Option<i16>,
) -> Result<(), ApiError> {
    match (schedule_date, weekday) {
        (Some(_), Some(_)) => Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "set schedule_date or weekday, not both".into(),
        )),
        (None, None) => Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "schedule_date or weekday is required".into(),
        )),
        (None, Some(w)) if !(0..=6).contains(&w) => Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "weekday must be 0 (Monday) through 6 (Sunday)".into(),
        )),
        _ => Ok(()),
    }
}

/* ============================================================
   GET /therapists/{id}/schedules
   ============================================================ */

pub async fn list_schedules(
    State(state): State<AppState>,
    _auth: AuthContext,
    Path(therapist_id): Path<Uuid>,
) -> Result<Json<ScheduleListResponse>, ApiError> {
    let rows: Vec<ScheduleRow> = sqlx::query_as::<_, ScheduleRow>(
        r#"
        SELECT schedule_id, therapist_id, schedule_date, weekday, slots, created_at, updated_at
        FROM therapist_schedule
        WHERE therapist_id = $1
        ORDER BY schedule_date ASC NULLS LAST, weekday ASC NULLS LAST
        "#,
    )
    .bind(therapist_id)
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::db)?;

    Ok(Json(ScheduleListResponse {
        data: rows.into_iter().map(into_dto).collect(),
    }))
}

/* ============================================================
   POST /therapists/me/schedules
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct CreateScheduleRequest {
    /// One-off date; mutually exclusive with weekday.
    pub schedule_date: Option<NaiveDate>,
    /// Recurring weekly slot day, 0 = Monday.
    pub weekday: Option<i16>,
    pub slots: Vec<TimeSlot>,
}

pub async fn create_schedule(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreateScheduleRequest>,
) -> Result<Json<ScheduleResponse>, ApiError> {
    auth.require_role(ROLE_THERAPIST)?;
    check_recurrence(req.schedule_date, req.weekday)?;
    let slots_json = check_slots(auth.user_id, &req.slots)?;

    let row: ScheduleRow = sqlx::query_as::<_, ScheduleRow>(
        r#"
        INSERT INTO therapist_schedule (therapist_id, schedule_date, weekday, slots)
        VALUES ($1, $2, $3, $4)
        RETURNING schedule_id, therapist_id, schedule_date, weekday, slots, created_at, updated_at
        "#,
    )
    .bind(auth.user_id)
    .bind(req.schedule_date)
    .bind(req.weekday)
    .bind(slots_json)
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::db)?;

    Ok(Json(ScheduleResponse {
        data: into_dto(row),
    }))
}

/* ============================================================
   PUT /schedules/{id}  (replace slots, owner only)
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct ReplaceScheduleRequest {
    pub slots: Vec<TimeSlot>,
}

pub async fn replace_schedule(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(schedule_id): Path<Uuid>,
    Json(req): Json<ReplaceScheduleRequest>,
) -> Result<Json<ScheduleResponse>, ApiError> {
    auth.require_role(ROLE_THERAPIST)?;
    let slots_json = check_slots(auth.user_id, &req.slots)?;

    let row: Option<ScheduleRow> = sqlx::query_as::<_, ScheduleRow>(
        r#"
        UPDATE therapist_schedule
        SET slots = $3,
            updated_at = now()
        WHERE schedule_id = $1
          AND therapist_id = $2
        RETURNING schedule_id, therapist_id, schedule_date, weekday, slots, created_at, updated_at
        "#,
    )
    .bind(schedule_id)
    .bind(auth.user_id)
    .bind(slots_json)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::db)?;

    let row = row.ok_or_else(|| ApiError::NotFound("NOT_FOUND", "schedule not found".into()))?;

    Ok(Json(ScheduleResponse {
        data: into_dto(row),
    }))
}

/* ============================================================
   DELETE /schedules/{id}  (owner only)
   ============================================================ */

pub async fn delete_schedule(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(schedule_id): Path<Uuid>,
) -> Result<Json<OkResponse>, ApiError> {
    auth.require_role(ROLE_THERAPIST)?;

    let res = sqlx::query(
        r#"
        DELETE FROM therapist_schedule
        WHERE schedule_id = $1
          AND therapist_id = $2
        "#,
    )
    .bind(schedule_id)
    .bind(auth.user_id)
    .execute(&state.db)
    .await
    .map_err(ApiError::db)?;

    if res.rows_affected() == 0 {
        return Err(ApiError::NotFound("NOT_FOUND", "schedule not found".into()));
    }

    Ok(Json(OkResponse {
        data: OkData { ok: true },
    }))
}
