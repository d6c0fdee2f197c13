// src/services/scheduling_service.rs

use chrono::{DateTime, Duration, Utc};
use maitri_common::models::{Actor, Session, SessionStatus};
use tracing::info;
use uuid::Uuid;

use crate::Error;
use crate::db::Database;
use crate::repositories::postgres::{SessionRepo, SessionRepository};

pub const DEFAULT_SLOT_MINUTES: i64 = 60;

/// Counselor-facing slot management: opening, closing and deleting bookable
/// time units.
pub struct SchedulingService {
    db: Database,
    sessions: SessionRepository,
}

impl SchedulingService {
    pub fn new(db: Database) -> Self {
        let sessions = SessionRepository::new(db.pool().clone());
        Self { db, sessions }
    }

    /// Creates an available slot. Rejects slots starting in the past and
    /// slots overlapping one of the counselor's existing [start, end)
    /// intervals.
    pub async fn create_slot(
        &self,
        counselor_id: Uuid,
        room_id: Option<Uuid>,
        start_time: DateTime<Utc>,
        duration_minutes: Option<i64>,
    ) -> Result<Session, Error> {
        if start_time <= Utc::now() {
            return Err(Error::InvalidInput(
                "slot start time must be in the future".to_string(),
            ));
        }
        let minutes = duration_minutes.unwrap_or(DEFAULT_SLOT_MINUTES);
        if minutes <= 0 {
            return Err(Error::InvalidInput(
                "slot duration must be positive".to_string(),
            ));
        }
        let end_time = start_time + Duration::minutes(minutes);

        let mut tx = self.db.pool().begin().await?;

        // Advisory lock keyed by counselor, so a concurrent create_slot for
        // the same window cannot slip between the check and the insert.
        SessionRepository::lock_counselor_schedule(&mut tx, counselor_id).await?;

        let overlapping =
            SessionRepository::count_overlapping_tx(&mut tx, counselor_id, start_time, end_time)
                .await?;
        if overlapping > 0 {
            return Err(Error::Conflict(
                "counselor already has a slot in that time window".to_string(),
            ));
        }

        let session = Session {
            session_id: Uuid::new_v4(),
            counselor_id: Some(counselor_id),
            room_id,
            start_time: Some(start_time),
            end_time: Some(end_time),
            status: SessionStatus::Available,
            case_id: None,
            session_token: None,
            keyword: None,
            note: None,
            followup: None,
            mood_score: None,
            created_at: Utc::now(),
        };
        SessionRepository::create_tx(&mut tx, &session).await?;
        tx.commit().await?;
        info!(
            "Counselor {} opened slot {} at {}",
            counselor_id, session.session_id, start_time
        );
        Ok(session)
    }

    /// Flips a slot between available and closed. Booked slots must be
    /// cancelled first.
    pub async fn toggle_availability(&self, session_id: Uuid) -> Result<Session, Error> {
        let mut tx = self.db.pool().begin().await?;

        let session = SessionRepository::get_tx(&mut tx, session_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("session {}", session_id)))?;

        let next = match session.status {
            SessionStatus::Available => SessionStatus::Closed,
            SessionStatus::Closed => SessionStatus::Available,
            SessionStatus::Booked => {
                return Err(Error::Conflict(
                    "slot is booked; cancel the booking first".to_string(),
                ));
            }
            other => {
                return Err(Error::Conflict(format!(
                    "slot in status '{}' cannot be toggled",
                    other
                )));
            }
        };
        SessionRepository::set_status(&mut tx, session_id, next).await?;
        tx.commit().await?;

        Ok(Session {
            status: next,
            ..session
        })
    }

    /// Deletes a slot. Only permitted while the slot is still available and
    /// its start time is unset or in the future, and only for the owner.
    pub async fn delete_slot(&self, session_id: Uuid, actor: &Actor) -> Result<(), Error> {
        let session = self
            .sessions
            .get(session_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("session {}", session_id)))?;

        if session.counselor_id.is_some() && session.counselor_id != actor.counselor_id {
            return Err(Error::Forbidden(
                "slot belongs to a different counselor".to_string(),
            ));
        }
        if session.status != SessionStatus::Available {
            return Err(Error::Conflict(format!(
                "slot in status '{}' cannot be deleted",
                session.status
            )));
        }
        if let Some(start) = session.start_time {
            if start <= Utc::now() {
                return Err(Error::Conflict(
                    "past slots cannot be deleted".to_string(),
                ));
            }
        }

        self.sessions.delete(session_id).await?;
        Ok(())
    }

    pub async fn list_for_counselor(&self, counselor_id: Uuid) -> Result<Vec<Session>, Error> {
        self.sessions.list_for_counselor(counselor_id).await
    }

    pub async fn list_available_between(
        &self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Session>, Error> {
        self.sessions.list_available_between(from, until).await
    }
}
