// File: maitri-common/src/models/case.rs

use std::fmt;
use std::str::FromStr;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq, sqlx::Type)]
#[sqlx(type_name = "TEXT")]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    WaitingConfirmation,
    Confirmed,
    Booked,
    InProgress,
    Rescheduled,
    Completed,
    Cancelled,
}

impl CaseStatus {
    /// True once the case has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CaseStatus::Completed | CaseStatus::Cancelled)
    }
}

impl fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaseStatus::WaitingConfirmation => write!(f, "waiting_confirmation"),
            CaseStatus::Confirmed => write!(f, "confirmed"),
            CaseStatus::Booked => write!(f, "booked"),
            CaseStatus::InProgress => write!(f, "in_progress"),
            CaseStatus::Rescheduled => write!(f, "rescheduled"),
            CaseStatus::Completed => write!(f, "completed"),
            CaseStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl FromStr for CaseStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "waiting_confirmation" => Ok(CaseStatus::WaitingConfirmation),
            "confirmed" => Ok(CaseStatus::Confirmed),
            "booked" => Ok(CaseStatus::Booked),
            "in_progress" => Ok(CaseStatus::InProgress),
            "rescheduled" => Ok(CaseStatus::Rescheduled),
            // Legacy alias still sent by older portal clients.
            "postponed" => Ok(CaseStatus::Rescheduled),
            "completed" => Ok(CaseStatus::Completed),
            "cancelled" => Ok(CaseStatus::Cancelled),
            _ => Err(format!("Unknown case status: {}", s)),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq, sqlx::Type)]
#[sqlx(type_name = "TEXT")]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::Low => write!(f, "low"),
            Priority::Medium => write!(f, "medium"),
            Priority::High => write!(f, "high"),
        }
    }
}

impl FromStr for Priority {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            _ => Err(format!("Unknown priority: {}", s)),
        }
    }
}

/// A client's counseling engagement, spanning one or more sessions over time.
#[derive(Debug, Serialize, Deserialize, Clone, sqlx::FromRow)]
pub struct Case {
    pub case_id: Uuid,
    pub client_id: Uuid,
    pub counselor_id: Option<Uuid>,
    pub status: CaseStatus,
    /// Year-prefixed sequential token, e.g. "680001". Assigned at most once,
    /// lazily on first need.
    pub queue_token: Option<String>,
    pub priority: Priority,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub waiting_since: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Case {
    pub fn new(client_id: Uuid) -> Self {
        Self {
            case_id: Uuid::new_v4(),
            client_id,
            counselor_id: None,
            status: CaseStatus::WaitingConfirmation,
            queue_token: None,
            priority: Priority::Medium,
            confirmed_at: None,
            waiting_since: Some(Utc::now()),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, sqlx::FromRow)]
pub struct RegistrationCode {
    pub code: String,
    pub created_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub used_by: Option<Uuid>,
}
