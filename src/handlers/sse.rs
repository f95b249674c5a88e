use axum::{
    extract::{Path, State},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
};
use chrono::Utc;
use futures::stream::{self, Stream};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

use crate::{
    error::ApiError,
    extractors::StudentId,
    metrics::SSE_CONNECTIONS_ACTIVE,
    models::timer::{TimeExpired, TimerEvent, TimerTick},
    models::SessionStatus,
    services::{session_engine::SessionEngine, AppState},
};

/// SSE endpoint for countdown events. The stream reports the engine's
/// authoritative remaining time; it does not count on its own, so a
/// reconnecting client always sees the true clock.
/// GET /api/v1/sessions/{id}/stream
pub async fn session_stream(
    State(state): State<Arc<AppState>>,
    StudentId(student_id): StudentId,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    // Verify session exists and the caller owns it before streaming.
    state.engine.timer_snapshot(&session_id, &student_id).await?;
    tracing::info!("Client connected to SSE stream: session={}", session_id);

    let stream = create_timer_stream(Arc::clone(&state.engine), session_id, student_id);
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// Decrements the active-connections gauge when the stream is dropped.
struct ConnectionGuard;

impl ConnectionGuard {
    fn new() -> Self {
        SSE_CONNECTIONS_ACTIVE.inc();
        Self
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        SSE_CONNECTIONS_ACTIVE.dec();
    }
}

fn create_timer_stream(
    engine: Arc<SessionEngine>,
    session_id: String,
    student_id: String,
) -> impl Stream<Item = Result<Event, Infallible>> {
    let guard = ConnectionGuard::new();
    stream::unfold(
        (engine, session_id, student_id, false, guard),
        move |(engine, sid, student, final_sent, guard)| async move {
            if final_sent {
                return None;
            }

            let snapshot = match engine.timer_snapshot(&sid, &student).await {
                Ok(snapshot) => snapshot,
                Err(_) => return None, // session discarded
            };

            if snapshot.status != SessionStatus::Active {
                let expired_event = TimerEvent::TimeExpired(TimeExpired {
                    session_id: sid.clone(),
                    status: snapshot.status,
                    message: if snapshot.remaining_seconds == 0 {
                        "Time limit exceeded".to_string()
                    } else {
                        "Session submitted".to_string()
                    },
                    timestamp: Utc::now(),
                });

                let event = Event::default()
                    .event(expired_event.event_name())
                    .data(expired_event.to_sse_data());

                tracing::info!("Timer stream ending: session={}", sid);
                return Some((Ok(event), (engine, sid, student, true, guard)));
            }

            let tick_event =
                TimerEvent::TimerTick(TimerTick::from_snapshot(sid.clone(), &snapshot));

            let event = Event::default()
                .event(tick_event.event_name())
                .data(tick_event.to_sse_data());

            sleep(Duration::from_secs(1)).await;

            Some((Ok(event), (engine, sid, student, false, guard)))
        },
    )
}
