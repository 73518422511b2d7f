// src/routes/therapist_routes.rs

use axum::{
    extract::{Path, Query, State},
    routing::{get, patch, post},
    Json, Router,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{AppState, LocationType, ROLE_THERAPIST},
    scheduling::{availability_active, schedule_applies, TimeSlot},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/search", get(search_therapists))
        .route("/me", patch(update_my_profile))
        .route("/me/availability", post(set_availability))
        .route(
            "/me/payment_info",
            get(get_payment_info).put(put_payment_info),
        )
        .route("/{therapist_id}", get(get_therapist))
}

/* ============================================================
   DTOs
   ============================================================ */

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct TherapistProfileRow {
    pub therapist_id: Uuid,
    pub display_name: String,
    pub bio: Option<String>,
    pub specialties: Vec<String>,
    pub hourly_rate_cents: i32,
    pub location_types: Vec<String>,
    pub is_available_now: bool,
    pub available_until: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct TherapistResponse {
    pub data: TherapistView,
}

#[derive(Debug, Serialize)]
pub struct TherapistView {
    #[serde(flatten)]
    pub profile: TherapistProfileRow,
    /// Toggle state evaluated against now(); never a raw flag.
    pub available_now: bool,
}

fn into_view(profile: TherapistProfileRow) -> TherapistView {
    let available_now = availability_active(
        profile.is_available_now,
        profile.available_until,
        Utc::now(),
    );
    TherapistView {
        profile,
        available_now,
    }
}

async fn load_profile(
    state: &AppState,
    therapist_id: Uuid,
) -> Result<TherapistProfileRow, ApiError> {
    sqlx::query_as::<_, TherapistProfileRow>(
        r#"
        SELECT
          tp.therapist_id,
          a.display_name,
          tp.bio,
          tp.specialties,
          tp.hourly_rate_cents,
          tp.location_types,
          tp.is_available_now,
          tp.available_until,
          tp.updated_at
        FROM therapist_profile tp
        JOIN account a ON a.user_id = tp.therapist_id
        WHERE tp.therapist_id = $1
          AND a.is_active = true
        "#,
    )
    .bind(therapist_id)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::db)?
    .ok_or_else(|| ApiError::NotFound("NOT_FOUND", "therapist not found".into()))
}

/* ============================================================
   GET /therapists/search
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    /// Requested instant, RFC 3339. Slot times are wall-clock UTC.
    pub at: DateTime<Utc>,
    pub location_type: String,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub data: Vec<TherapistMatch>,
}

#[derive(Debug, Serialize)]
pub struct TherapistMatch {
    #[serde(flatten)]
    pub therapist: TherapistView,
    pub matched_slot: TimeSlot,
}

#[derive(Debug, sqlx::FromRow)]
struct ScheduleCandidateRow {
    therapist_id: Uuid,
    schedule_date: Option<chrono::NaiveDate>,
    weekday: Option<i16>,
    slots: serde_json::Value,
}

/// Slot search: linear scan over the schedule rows of active therapists,
/// keeping those with a slot whose window contains the requested instant and
/// whose location-type set includes the requested type. Slot counts are small,
/// so no index structure is needed.
pub async fn search_therapists(
    State(state): State<AppState>,
    _auth: AuthContext,
    Query(q): Query<SearchQuery>,
) -> Result<Json<SearchResponse>, ApiError> {
    let location_type = LocationType::parse(q.location_type.trim()).ok_or_else(|| {
        ApiError::BadRequest(
            "VALIDATION_ERROR",
            "location_type must be mobile, clinic, or virtual".into(),
        )
    })?;

    let date = q.at.date_naive();
    let time = q.at.time();

    let rows: Vec<ScheduleCandidateRow> = sqlx::query_as::<_, ScheduleCandidateRow>(
        r#"
        SELECT s.therapist_id, s.schedule_date, s.weekday, s.slots
        FROM therapist_schedule s
        JOIN account a ON a.user_id = s.therapist_id
        WHERE a.is_active = true
          AND (s.schedule_date = $1 OR s.schedule_date IS NULL)
        "#,
    )
    .bind(date)
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::db)?;

    let mut matches: Vec<(Uuid, TimeSlot)> = Vec::new();
    for row in rows {
        if !schedule_applies(row.schedule_date, row.weekday, date) {
            continue;
        }
        let slots: Vec<TimeSlot> = match serde_json::from_value(row.slots) {
            Ok(s) => s,
            Err(e) => {
                // Legacy rows may carry malformed arrays; skip, don't fail the search.
                tracing::warn!(
                    "skipping malformed slot array for therapist {}: {e}",
                    row.therapist_id
                );
                continue;
            }
        };
        if matches.iter().any(|(id, _)| *id == row.therapist_id) {
            continue;
        }
        if let Some(slot) = slots.iter().find(|s| s.covers(time, location_type)) {
            matches.push((row.therapist_id, slot.clone()));
        }
    }

    let mut out = Vec::with_capacity(matches.len());
    for (therapist_id, slot) in matches {
        let profile = load_profile(&state, therapist_id).await?;
        out.push(TherapistMatch {
            therapist: into_view(profile),
            matched_slot: slot,
        });
    }

    Ok(Json(SearchResponse { data: out }))
}

/* ============================================================
   GET /therapists/{id}
   ============================================================ */

pub async fn get_therapist(
    State(state): State<AppState>,
    _auth: AuthContext,
    Path(therapist_id): Path<Uuid>,
) -> Result<Json<TherapistResponse>, ApiError> {
    let profile = load_profile(&state, therapist_id).await?;
    Ok(Json(TherapistResponse {
        data: into_view(profile),
    }))
}

/* ============================================================
   PATCH /therapists/me
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub bio: Option<String>,
    pub specialties: Option<Vec<String>>,
    pub hourly_rate_cents: Option<i32>,
    pub location_types: Option<Vec<String>>,
}

pub async fn update_my_profile(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<TherapistResponse>, ApiError> {
    auth.require_role(ROLE_THERAPIST)?;

    if let Some(rate) = req.hourly_rate_cents {
        if rate < 0 {
            return Err(ApiError::BadRequest(
                "VALIDATION_ERROR",
                "hourly_rate_cents must be >= 0".into(),
            ));
        }
    }
    if let Some(types) = &req.location_types {
        for t in types {
            if LocationType::parse(t).is_none() {
                return Err(ApiError::BadRequest(
                    "VALIDATION_ERROR",
                    format!("unknown location type: {t}"),
                ));
            }
        }
    }

    sqlx::query(
        r#"
        UPDATE therapist_profile
        SET
          bio               = COALESCE($2, bio),
          specialties       = COALESCE($3, specialties),
          hourly_rate_cents = COALESCE($4, hourly_rate_cents),
          location_types    = COALESCE($5, location_types),
          updated_at = now()
        WHERE therapist_id = $1
        "#,
    )
    .bind(auth.user_id)
    .bind(req.bio)
    .bind(req.specialties)
    .bind(req.hourly_rate_cents)
    .bind(req.location_types)
    .execute(&state.db)
    .await
    .map_err(ApiError::db)?;

    let profile = load_profile(&state, auth.user_id).await?;
    Ok(Json(TherapistResponse {
        data: into_view(profile),
    }))
}

/* ============================================================
   POST /therapists/me/availability
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct SetAvailabilityRequest {
    pub available: bool,
    /// Optional time-box, e.g. "available for 60 minutes". The expiry is
    /// persisted as a timestamp so it survives restarts and reloads.
    pub minutes: Option<i64>,
}

pub async fn set_availability(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<SetAvailabilityRequest>,
) -> Result<Json<TherapistResponse>, ApiError> {
    auth.require_role(ROLE_THERAPIST)?;

    let available_until = match req.minutes {
        Some(_) if !req.available => {
            return Err(ApiError::BadRequest(
                "VALIDATION_ERROR",
                "minutes only applies when turning availability on".into(),
            ));
        }
        Some(m) if m <= 0 || m > 24 * 60 => {
            return Err(ApiError::BadRequest(
                "VALIDATION_ERROR",
                "minutes must be between 1 and 1440".into(),
            ));
        }
        Some(m) => Some(Utc::now() + Duration::minutes(m)),
        None => None,
    };

    let updated = sqlx::query(
        r#"
        UPDATE therapist_profile
        SET is_available_now = $2,
            available_until = $3,
            updated_at = now()
        WHERE therapist_id = $1
        "#,
    )
    .bind(auth.user_id)
    .bind(req.available)
    .bind(available_until)
    .execute(&state.db)
    .await
    .map_err(ApiError::db)?;

    if updated.rows_affected() == 0 {
        return Err(ApiError::NotFound("NOT_FOUND", "therapist profile not found".into()));
    }

    let profile = load_profile(&state, auth.user_id).await?;
    Ok(Json(TherapistResponse {
        data: into_view(profile),
    }))
}

/* ============================================================
   Payment info (payout details)
   ============================================================ */

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct PaymentInfoRow {
    pub therapist_id: Uuid,
    pub payout_account: String,
    pub currency: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct PaymentInfoResponse {
    pub data: PaymentInfoRow,
}

pub async fn get_payment_info(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<PaymentInfoResponse>, ApiError> {
    auth.require_role(ROLE_THERAPIST)?;

    let row: PaymentInfoRow = sqlx::query_as::<_, PaymentInfoRow>(
        r#"
        SELECT therapist_id, payout_account, currency, updated_at
        FROM therapist_payment_info
        WHERE therapist_id = $1
        "#,
    )
    .bind(auth.user_id)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::db)?
    .ok_or_else(|| ApiError::NotFound("NOT_FOUND", "no payment info on file".into()))?;

    Ok(Json(PaymentInfoResponse { data: row }))
}

#[derive(Debug, Deserialize)]
pub struct PutPaymentInfoRequest {
    pub payout_account: String,
    pub currency: Option<String>,
}

pub async fn put_payment_info(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<PutPaymentInfoRequest>,
) -> Result<Json<PaymentInfoResponse>, ApiError> {
    auth.require_role(ROLE_THERAPIST)?;

    let payout_account = req.payout_account.trim();
    if payout_account.is_empty() {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "payout_account is required".into(),
        ));
    }
    let currency = req
        .currency
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("usd")
        .to_lowercase();

    let row: PaymentInfoRow = sqlx::query_as::<_, PaymentInfoRow>(
        r#"
        INSERT INTO therapist_payment_info (therapist_id, payout_account, currency)
        VALUES ($1, $2, $3)
        ON CONFLICT (therapist_id)
        DO UPDATE SET payout_account = EXCLUDED.payout_account,
                      currency = EXCLUDED.currency,
                      updated_at = now()
        RETURNING therapist_id, payout_account, currency, updated_at
        "#,
    )
    .bind(auth.user_id)
    .bind(payout_account)
    .bind(&currency)
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::db)?;

    Ok(Json(PaymentInfoResponse { data: row }))
}
