// src/routes/payment_routes.rs
//
// Payment surface: expose the publishable key and create a payment intent for
// an accepted request. The intent call is a pass-through to the processor;
// the client confirms it directly. No payment state is stored here and there
// is no retry on failure.

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{AppState, REQ_ACCEPTED, ROLE_PATIENT},
    payments::{PaymentError, PaymentIntent},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/config", get(payment_config))
        .route("/intent", post(create_intent))
}

/* ============================================================
   GET /payments/config
   ============================================================ */

#[derive(Debug, Serialize)]
pub struct PaymentConfigResponse {
    pub data: PaymentConfigData,
}

#[derive(Debug, Serialize)]
pub struct PaymentConfigData {
    pub publishable_key: Option<String>,
    pub enabled: bool,
}

/// Keys come from the environment, never compiled-in constants.
pub async fn payment_config(
    State(state): State<AppState>,
    _auth: AuthContext,
) -> Json<PaymentConfigResponse> {
    let enabled = state.payment_publishable_key.is_some();
    Json(PaymentConfigResponse {
        data: PaymentConfigData {
            publishable_key: state.payment_publishable_key.clone(),
            enabled,
        },
    })
}

/* ============================================================
   POST /payments/intent
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct CreateIntentRequest {
    pub request_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct CreateIntentResponse {
    pub data: PaymentIntent,
}

#[derive(Debug, sqlx::FromRow)]
struct BillableRequestRow {
    start_at: chrono::DateTime<chrono::Utc>,
    end_at: chrono::DateTime<chrono::Utc>,
    hourly_rate_cents: i32,
    currency: Option<String>,
}

pub async fn create_intent(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreateIntentRequest>,
) -> Result<Json<CreateIntentResponse>, ApiError> {
    auth.require_role(ROLE_PATIENT)?;

    let row: BillableRequestRow = sqlx::query_as::<_, BillableRequestRow>(
        r#"
        SELECT r.start_at, r.end_at, tp.hourly_rate_cents, tpi.currency
        FROM appointment_request r
        JOIN therapist_profile tp ON tp.therapist_id = r.therapist_id
        LEFT JOIN therapist_payment_info tpi ON tpi.therapist_id = r.therapist_id
        WHERE r.request_id = $1
          AND r.patient_id = $2
          AND r.status = $3
        "#,
    )
    .bind(req.request_id)
    .bind(auth.user_id)
    .bind(REQ_ACCEPTED)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::db)?
    .ok_or_else(|| {
        ApiError::NotFound("NOT_FOUND", "no accepted request to pay for".into())
    })?;

    let minutes = (row.end_at - row.start_at).num_minutes().max(0);
    let amount_cents = (row.hourly_rate_cents as i64) * minutes / 60;
    if amount_cents <= 0 {
        return Err(ApiError::BadRequest(
            "NO_RATE",
            "the therapist has not set an hourly rate".into(),
        ));
    }

    let currency = row.currency.unwrap_or_else(|| "usd".to_string());

    let intent = state
        .payments
        .create_intent(
            amount_cents,
            &currency,
            &format!("Therapy session, request {}", req.request_id),
        )
        .await
        .map_err(|e| match e {
            PaymentError::Rejected(msg) => {
                tracing::warn!("payment intent rejected: {msg}");
                ApiError::BadRequest("PAYMENT_REJECTED", "The payment was rejected".into())
            }
            other => {
                tracing::error!("payment intent failed: {other}");
                ApiError::Internal("payment processing failed".into())
            }
        })?;

    Ok(Json(CreateIntentResponse { data: intent }))
}
