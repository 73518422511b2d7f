use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::events::EventBus;
use crate::payments::PaymentGateway;

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub session_ttl_hours: i64,
    pub dev_auth_bypass: bool,
    pub maintenance_mode: bool,
    pub events: EventBus,
    pub payments: Arc<dyn PaymentGateway>,
    pub payment_publishable_key: Option<String>,
}

/* -------------------------
   Roles
--------------------------*/

pub const ROLE_PATIENT: i16 = 0;
pub const ROLE_THERAPIST: i16 = 1;
pub const ROLE_ADMIN: i16 = 2;

pub fn role_to_string(role: i16) -> String {
    match role {
        ROLE_PATIENT => "patient",
        ROLE_THERAPIST => "therapist",
        ROLE_ADMIN => "admin",
        _ => "unknown",
    }
    .to_string()
}

pub fn role_from_string(s: &str) -> Option<i16> {
    match s {
        "patient" => Some(ROLE_PATIENT),
        "therapist" => Some(ROLE_THERAPIST),
        "admin" => Some(ROLE_ADMIN),
        _ => None,
    }
}

/* -------------------------
   Location types
--------------------------*/

/// Visit modality: the therapist travels (mobile), the patient travels
/// (clinic), or the session is remote (virtual).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationType {
    Mobile,
    Clinic,
    Virtual,
}

impl LocationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LocationType::Mobile => "mobile",
            LocationType::Clinic => "clinic",
            LocationType::Virtual => "virtual",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "mobile" => Some(LocationType::Mobile),
            "clinic" => Some(LocationType::Clinic),
            "virtual" => Some(LocationType::Virtual),
            _ => None,
        }
    }
}

/* -------------------------
   Status encodings (smallint in DB)
--------------------------*/

// appointment.status
pub const APPT_SCHEDULED: i16 = 0;
pub const APPT_COMPLETED: i16 = 1;
pub const APPT_CANCELLED: i16 = 2;

// appointment_request.status
pub const REQ_PENDING: i16 = 0;
pub const REQ_ACCEPTED: i16 = 1;
pub const REQ_DECLINED: i16 = 2;
pub const REQ_CANCELLED: i16 = 3;

pub fn appointment_status_to_string(status: i16) -> &'static str {
    match status {
        APPT_SCHEDULED => "scheduled",
        APPT_COMPLETED => "completed",
        APPT_CANCELLED => "cancelled",
        _ => "unknown",
    }
}

pub fn request_status_to_string(status: i16) -> &'static str {
    match status {
        REQ_PENDING => "pending",
        REQ_ACCEPTED => "accepted",
        REQ_DECLINED => "declined",
        REQ_CANCELLED => "cancelled",
        _ => "unknown",
    }
}

/* -------------------------
   API DTOs (auth)
--------------------------*/

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    pub device_name: Option<String>,
    pub remember_me: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub data: LoginResponseData,
}

#[derive(Debug, Serialize)]
pub struct LoginResponseData {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
    pub account: AccountProfile,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub data: MeResponseData,
}

#[derive(Debug, Serialize)]
pub struct MeResponseData {
    pub account: AccountProfile,
    pub session: SessionInfo,
}

#[derive(Debug, Serialize)]
pub struct OkResponse {
    pub data: OkData,
}

#[derive(Debug, Serialize)]
pub struct OkData {
    pub ok: bool,
}

#[derive(Debug, Serialize)]
pub struct AccountProfile {
    pub user_id: Uuid,
    pub username: String,
    pub display_name: String,
    pub role: String,
}

#[derive(Debug, Serialize)]
pub struct SessionInfo {
    pub session_token_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

/* -------------------------
   DB Row Models (shared across routes)
--------------------------*/

#[derive(Debug, sqlx::FromRow)]
pub struct AccountRow {
    pub user_id: Uuid,
    pub username: String,
    pub display_name: String,
    pub password_hash: String,
    pub role: i16,
    pub is_active: bool,
}

#[derive(Debug, sqlx::FromRow)]
pub struct SessionTokenRow {
    pub session_token_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AppointmentRow {
    pub appointment_id: Uuid,
    pub patient_id: Uuid,
    pub therapist_id: Uuid,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub location_type: String,
    pub status: i16,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AppointmentRequestRow {
    pub request_id: Uuid,
    pub patient_id: Uuid,
    pub therapist_id: Uuid,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub location_type: String,
    pub status: i16,
    pub patient_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MessageRow {
    pub message_id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct NotificationRow {
    pub notification_id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_mapping_roundtrip() {
        for r in [ROLE_PATIENT, ROLE_THERAPIST, ROLE_ADMIN] {
            assert_eq!(role_from_string(&role_to_string(r)), Some(r));
        }
        assert_eq!(role_to_string(99), "unknown");
        assert_eq!(role_from_string("unknown"), None);
    }

    #[test]
    fn location_type_strings() {
        for l in [LocationType::Mobile, LocationType::Clinic, LocationType::Virtual] {
            assert_eq!(LocationType::parse(l.as_str()), Some(l));
        }
        assert_eq!(LocationType::parse("home"), None);
        // serde wire form matches as_str
        let json = serde_json::to_string(&LocationType::Virtual).unwrap();
        assert_eq!(json, "\"virtual\"");
    }

    #[test]
    fn status_labels() {
        assert_eq!(request_status_to_string(REQ_PENDING), "pending");
        assert_eq!(request_status_to_string(REQ_ACCEPTED), "accepted");
        assert_eq!(appointment_status_to_string(APPT_CANCELLED), "cancelled");
        assert_eq!(appointment_status_to_string(7), "unknown");
    }
}
