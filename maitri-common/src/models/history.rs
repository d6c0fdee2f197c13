// File: maitri-common/src/models/history.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::case::CaseStatus;

/// Structured audit payload, one variant per action kind. Stored as JSONB
/// with the tag duplicated into the `action` column for cheap filtering.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum HistoryDetail {
    BookingCreated {
        case_id: Uuid,
        session_token: String,
        description: Option<String>,
    },
    BookingCancelled {
        case_id: Uuid,
        cancelled_by: String,
        reason: Option<String>,
    },
    StatusChanged {
        previous_status: CaseStatus,
        new_status: CaseStatus,
        reason: Option<String>,
    },
    NoteUpdated {
        before: serde_json::Value,
        after: serde_json::Value,
    },
}

impl HistoryDetail {
    /// The tag stored in the `action` column.
    pub fn action(&self) -> &'static str {
        match self {
            HistoryDetail::BookingCreated { .. } => "booking_created",
            HistoryDetail::BookingCancelled { .. } => "booking_cancelled",
            HistoryDetail::StatusChanged { .. } => "status_changed",
            HistoryDetail::NoteUpdated { .. } => "note_updated",
        }
    }
}

/// Append-only audit record of a mutation to a session's clinical fields or
/// booking status. Never updated or deleted.
#[derive(Debug, Serialize, Deserialize, Clone, sqlx::FromRow)]
pub struct SessionHistory {
    pub history_id: Uuid,
    pub session_id: Uuid,
    pub action: String,
    pub detail: serde_json::Value,
    pub actor_user_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl SessionHistory {
    pub fn new(
        session_id: Uuid,
        actor_user_id: Uuid,
        detail: &HistoryDetail,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            history_id: Uuid::new_v4(),
            session_id,
            action: detail.action().to_string(),
            detail: serde_json::to_value(detail)?,
            actor_user_id,
            created_at: Utc::now(),
        })
    }
}
