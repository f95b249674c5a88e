use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::SessionStatus;

/// What the countdown stream reads from the engine each second: the
/// authoritative clock plus answer progress, taken under the session lock.
#[derive(Debug, Clone, Copy)]
pub struct TimerSnapshot {
    pub status: SessionStatus,
    pub remaining_seconds: u32,
    pub total_seconds: u32,
    pub answered_count: usize,
    pub total_questions: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum TimerEvent {
    TimerTick(TimerTick),
    TimeExpired(TimeExpired),
}

/// One-second progress report for a running attempt. Carries answer counts
/// alongside the clock so the exam UI renders countdown and progress bar
/// from a single stream.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TimerTick {
    pub session_id: String,
    pub remaining_seconds: u32,
    pub elapsed_seconds: u32,
    pub total_seconds: u32,
    pub answered_count: usize,
    pub total_questions: usize,
    pub timestamp: DateTime<Utc>,
}

/// Final event of a stream: the attempt left Active, by expiry or by
/// submission. `status` tells the client which.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TimeExpired {
    pub session_id: String,
    pub status: SessionStatus,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl TimerTick {
    pub fn from_snapshot(session_id: String, snapshot: &TimerSnapshot) -> Self {
        Self {
            session_id,
            remaining_seconds: snapshot.remaining_seconds,
            elapsed_seconds: snapshot.total_seconds.saturating_sub(snapshot.remaining_seconds),
            total_seconds: snapshot.total_seconds,
            answered_count: snapshot.answered_count,
            total_questions: snapshot.total_questions,
            timestamp: Utc::now(),
        }
    }
}

impl TimerEvent {
    pub fn to_sse_data(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn event_name(&self) -> &'static str {
        match self {
            TimerEvent::TimerTick(_) => "timer-tick",
            TimerEvent::TimeExpired(_) => "time-expired",
        }
    }
}
