// src/routes/event_routes.rs
//
// SSE stream of the caller's realtime events (new messages, new
// notifications). Best-effort: a subscriber that lags past the channel
// capacity misses events and recovers on its next list fetch.

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Router,
};
use futures::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::{wrappers::BroadcastStream, StreamExt};

use crate::{
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/events", get(event_stream))
}

pub async fn event_stream(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let user_id = auth.user_id;
    let rx = state.events.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(move |item| {
        let event = match item {
            Ok(e) if e.user_id == user_id => e,
            // Other users' events, or a lag gap; both are silently skipped.
            _ => return None,
        };
        let data = match serde_json::to_string(&event.payload) {
            Ok(d) => d,
            Err(_) => return None,
        };
        let kind = match serde_json::to_value(event.kind) {
            Ok(serde_json::Value::String(s)) => s,
            _ => "event".to_string(),
        };
        Some(Ok(Event::default().event(kind).data(data)))
    });

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    ))
}
