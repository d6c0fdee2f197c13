// File: maitri-common/src/models/session.rs

use std::fmt;
use std::str::FromStr;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq, sqlx::Type)]
#[sqlx(type_name = "TEXT")]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Available,
    Closed,
    Booked,
    Completed,
    Cancelled,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Available => write!(f, "available"),
            SessionStatus::Closed => write!(f, "closed"),
            SessionStatus::Booked => write!(f, "booked"),
            SessionStatus::Completed => write!(f, "completed"),
            SessionStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl FromStr for SessionStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "available" => Ok(SessionStatus::Available),
            "closed" => Ok(SessionStatus::Closed),
            "booked" => Ok(SessionStatus::Booked),
            "completed" => Ok(SessionStatus::Completed),
            "cancelled" => Ok(SessionStatus::Cancelled),
            _ => Err(format!("Unknown session status: {}", s)),
        }
    }
}

/// A bookable calendar slot (not a login session). Invariant:
/// `status = Booked` exactly when `case_id` is set.
#[derive(Debug, Serialize, Deserialize, Clone, sqlx::FromRow)]
pub struct Session {
    pub session_id: Uuid,
    pub counselor_id: Option<Uuid>,
    pub room_id: Option<Uuid>,
    /// Portal-toggled slots may exist with no scheduled time at all.
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: SessionStatus,
    pub case_id: Option<Uuid>,
    /// Per-visit token `<queue_token>-<3-digit seq>`, e.g. "680001-002".
    pub session_token: Option<String>,
    pub keyword: Option<String>,
    pub note: Option<String>,
    pub followup: Option<String>,
    pub mood_score: Option<i32>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, sqlx::FromRow)]
pub struct ProblemTag {
    pub tag_id: Uuid,
    pub name: String,
}
