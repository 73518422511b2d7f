use crate::models::AppState;
use axum::Router;

pub mod admin_routes;
pub mod appointment_routes;
pub mod auth_routes;
pub mod conversation_routes;
pub mod event_routes;
pub mod home_routes;
pub mod notification_routes;
pub mod payment_routes;
pub mod request_routes;
pub mod schedule_routes;
pub mod therapist_routes;

pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1/auth", auth_routes::router())
        .nest("/api/v1/admin", admin_routes::router())
        .nest("/api/v1/therapists", therapist_routes::router())
        .nest("/api/v1", schedule_routes::router())
        .nest("/api/v1/requests", request_routes::router())
        .nest("/api/v1/appointments", appointment_routes::router())
        .nest("/api/v1", conversation_routes::router())
        .nest("/api/v1/notifications", notification_routes::router())
        .nest("/api/v1/payments", payment_routes::router())
        .nest("/api/v1", event_routes::router())
        .merge(home_routes::router())
        .with_state(state)
}
