// src/services/case_service.rs

use chrono::Utc;
use maitri_common::models::{Actor, Case, CaseStatus, HistoryDetail, Role};
use sqlx::{Connection, PgConnection};
use tracing::{debug, info};
use uuid::Uuid;

use crate::Error;
use crate::db::Database;
use crate::repositories::postgres::{
    CaseRepository, ClientRepository, RegistrationCodeRepository, SessionHistoryRepository,
    SessionRepository,
};
use crate::services::tokens;

/// Bounded retries when two transactions race on the same year prefix and
/// collide on UNIQUE(queue_token).
const TOKEN_RETRY_ATTEMPTS: u32 = 3;

/// Owns the case state machine and coordinates it with slot changes inside
/// a single transaction.
pub struct CaseService {
    db: Database,
}

/// Counselor edit of a booked session's clinical fields.
#[derive(Debug, Clone, Default)]
pub struct ClinicalUpdate {
    pub keyword: Option<String>,
    pub note: Option<String>,
    pub followup: Option<String>,
    pub mood_score: Option<i32>,
    pub tag_ids: Vec<Uuid>,
}

impl CaseService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Redeems a registration code: creates a waiting_confirmation case for
    /// the actor's client profile and burns the code, in one transaction.
    /// The conditional update on the code row is the exactly-once guard.
    pub async fn open_case_from_code(&self, actor: &Actor, code: &str) -> Result<Case, Error> {
        let client_id = actor.client_id.ok_or_else(|| {
            Error::InvalidInput("user has no client profile".to_string())
        })?;

        let mut tx = self.db.pool().begin().await?;

        let existing = RegistrationCodeRepository::get_tx(&mut tx, code)
            .await?
            .ok_or_else(|| Error::NotFound(format!("registration code '{}'", code)))?;
        if existing.used_at.is_some() {
            return Err(Error::Conflict(format!(
                "registration code '{}' already used",
                code
            )));
        }

        let burned =
            RegistrationCodeRepository::mark_used(&mut tx, code, actor.user_id, Utc::now())
                .await?;
        if !burned {
            // Lost the race between the read above and the conditional update.
            return Err(Error::Conflict(format!(
                "registration code '{}' already used",
                code
            )));
        }

        let case = Case::new(client_id);
        CaseRepository::insert(&mut tx, &case).await?;
        ClientRepository::set_active_case(&mut tx, client_id, Some(case.case_id)).await?;

        tx.commit().await?;
        info!("Opened case {} for client {}", case.case_id, client_id);
        Ok(case)
    }

    /// Moves a case to one of {confirmed, rescheduled, cancelled}. Cancelling
    /// releases and unlinks every session on the case; each linked session
    /// gets one audit record describing the change.
    pub async fn transition_status(
        &self,
        case_id: Uuid,
        new_status: CaseStatus,
        actor: &Actor,
        reason: Option<&str>,
    ) -> Result<Case, Error> {
        if !matches!(
            new_status,
            CaseStatus::Confirmed | CaseStatus::Rescheduled | CaseStatus::Cancelled
        ) {
            return Err(Error::InvalidInput(format!(
                "'{}' is not a valid transition target",
                new_status
            )));
        }

        let mut tx = self.db.pool().begin().await?;

        let case = CaseRepository::get_tx(&mut tx, case_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("case {}", case_id)))?;

        if actor.role == Role::Counselor {
            if let (Some(assigned), Some(acting)) = (case.counselor_id, actor.counselor_id) {
                if assigned != acting {
                    return Err(Error::Forbidden(
                        "case is assigned to a different counselor".to_string(),
                    ));
                }
            }
        }

        let previous = case.status;
        CaseRepository::set_status(&mut tx, case_id, new_status).await?;
        if new_status == CaseStatus::Confirmed {
            // Idempotent: keeps the first confirmation timestamp.
            CaseRepository::set_confirmed_at_once(&mut tx, case_id, Utc::now()).await?;
        }

        let sessions = SessionRepository::list_for_case_tx(&mut tx, case_id).await?;
        for session in &sessions {
            if new_status == CaseStatus::Cancelled {
                SessionRepository::release(&mut tx, session.session_id).await?;
            }
            SessionHistoryRepository::append(
                &mut tx,
                session.session_id,
                actor.user_id,
                &HistoryDetail::StatusChanged {
                    previous_status: previous,
                    new_status,
                    reason: reason.map(String::from),
                },
            )
            .await?;
        }

        if new_status == CaseStatus::Cancelled {
            // Drop the client's active-case pointer if it still points here.
            let client = ClientRepository::get_tx(&mut tx, case.client_id).await?;
            if client.and_then(|c| c.active_case_id) == Some(case_id) {
                ClientRepository::set_active_case(&mut tx, case.client_id, None).await?;
            }
        }

        let updated = CaseRepository::get_tx(&mut tx, case_id)
            .await?
            .ok_or_else(|| Error::Internal("case vanished mid-transaction".to_string()))?;
        tx.commit().await?;

        info!(
            "Case {} transitioned {} -> {} ({} linked sessions)",
            case_id,
            previous,
            new_status,
            sessions.len()
        );
        Ok(updated)
    }

    /// Returns the case's queue token, generating and persisting it on first
    /// use. Idempotent: repeated calls return the same value with no second
    /// write.
    pub async fn get_or_create_queue_token(&self, case_id: Uuid) -> Result<String, Error> {
        let mut tx = self.db.pool().begin().await?;
        let token = Self::get_or_create_queue_token_tx(&mut tx, case_id).await?;
        tx.commit().await?;
        Ok(token)
    }

    /// Transaction-scoped variant used by the booking orchestrator. Token
    /// computation and persist run under a savepoint so a unique-violation
    /// retry does not poison the caller's transaction.
    pub async fn get_or_create_queue_token_tx(
        conn: &mut PgConnection,
        case_id: Uuid,
    ) -> Result<String, Error> {
        let case = CaseRepository::get_tx(conn, case_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("case {}", case_id)))?;
        if let Some(token) = case.queue_token {
            return Ok(token);
        }

        for attempt in 1..=TOKEN_RETRY_ATTEMPTS {
            let mut sp = conn.begin().await?;
            let token = tokens::next_queue_token(&mut sp, Utc::now()).await?;
            match CaseRepository::set_queue_token(&mut sp, case_id, &token).await {
                Ok(()) => {
                    sp.commit().await?;
                    return Ok(token);
                }
                Err(e) if e.is_unique_violation() && attempt < TOKEN_RETRY_ATTEMPTS => {
                    debug!(
                        "Queue token '{}' collided (attempt {}), retrying",
                        token, attempt
                    );
                    sp.rollback().await?;
                }
                Err(e) => return Err(e),
            }
        }
        Err(Error::Conflict(
            "queue token generation kept colliding; try again".to_string(),
        ))
    }

    /// Counselor edit of a session's clinical fields. Appends one
    /// NoteUpdated audit record carrying a before/after snapshot.
    pub async fn update_session_notes(
        &self,
        session_id: Uuid,
        actor: &Actor,
        update: ClinicalUpdate,
    ) -> Result<(), Error> {
        let counselor_id = actor.counselor_id.ok_or_else(|| {
            Error::Forbidden("only counselors may edit session notes".to_string())
        })?;

        let mut tx = self.db.pool().begin().await?;

        let session = SessionRepository::get_tx(&mut tx, session_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("session {}", session_id)))?;
        if session.counselor_id != Some(counselor_id) {
            return Err(Error::Forbidden(
                "session belongs to a different counselor".to_string(),
            ));
        }

        let before = serde_json::json!({
            "keyword": session.keyword,
            "note": session.note,
            "followup": session.followup,
            "mood_score": session.mood_score,
        });
        let after = serde_json::json!({
            "keyword": update.keyword,
            "note": update.note,
            "followup": update.followup,
            "mood_score": update.mood_score,
        });

        SessionRepository::update_clinical_fields(
            &mut tx,
            session_id,
            update.keyword.as_deref(),
            update.note.as_deref(),
            update.followup.as_deref(),
            update.mood_score,
            &update.tag_ids,
        )
        .await?;

        SessionHistoryRepository::append(
            &mut tx,
            session_id,
            actor.user_id,
            &HistoryDetail::NoteUpdated { before, after },
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }
}
