// src/services/booking_service.rs

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use maitri_common::models::{Actor, Case, CaseStatus, Client, HistoryDetail, Role, SessionStatus};
use serde::{Deserialize, Serialize};
use sqlx::PgConnection;
use tracing::{info, warn};
use uuid::Uuid;

use crate::Error;
use crate::db::Database;
use crate::repositories::postgres::{
    CaseRepository, ClientRepository, SessionHistoryRepository, SessionRepository,
};
use crate::services::case_service::CaseService;
use crate::services::tokens;

/// Minimum lead time for client-initiated cancellation. Counselor and portal
/// cancellations are exempt.
pub const CANCEL_LEAD_TIME_HOURS: i64 = 24;

/// Either an explicit slot, or match criteria the orchestrator resolves to
/// exactly one candidate.
#[derive(Debug, Clone)]
pub enum BookingTarget {
    SessionId(Uuid),
    Slot {
        start_time: DateTime<Utc>,
        counselor_name: Option<String>,
    },
}

#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub target: BookingTarget,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingConfirmation {
    pub session_id: Uuid,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub counselor_name: Option<String>,
    pub room_name: Option<String>,
    pub case_id: Uuid,
    pub queue_token: String,
    pub session_token: String,
}

/// Outbound-notification collaborator. Invoked only after the state change
/// commits; failures are logged and swallowed.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn booking_confirmed(&self, confirmation: &BookingConfirmation) -> Result<(), Error>;
    async fn booking_cancelled(&self, session_id: Uuid) -> Result<(), Error>;
}

pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn booking_confirmed(&self, _confirmation: &BookingConfirmation) -> Result<(), Error> {
        Ok(())
    }
    async fn booking_cancelled(&self, _session_id: Uuid) -> Result<(), Error> {
        Ok(())
    }
}

/// The highest-level operation: validates a booking request, reserves the
/// slot, creates or reuses a case, issues tokens and writes audit history,
/// all in one transaction.
pub struct BookingService {
    db: Database,
    notifier: Arc<dyn Notifier>,
}

impl BookingService {
    pub fn new(db: Database, notifier: Arc<dyn Notifier>) -> Self {
        Self { db, notifier }
    }

    pub async fn book(
        &self,
        actor: &Actor,
        request: BookingRequest,
    ) -> Result<BookingConfirmation, Error> {
        let client_id = actor.client_id.ok_or_else(|| {
            Error::InvalidInput("user has no client profile".to_string())
        })?;

        let mut tx = self.db.pool().begin().await?;

        // Serialize per client: the row lock makes the one-active-booking
        // check below safe against a concurrent book() by the same client.
        let client = ClientRepository::lock_tx(&mut tx, client_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("client {}", client_id)))?;

        // 1. Resolve the target slot.
        let session = match &request.target {
            BookingTarget::SessionId(id) => SessionRepository::get_tx(&mut tx, *id)
                .await?
                .ok_or_else(|| Error::NotFound(format!("session {}", id)))?,
            BookingTarget::Slot {
                start_time,
                counselor_name,
            } => {
                SessionRepository::find_candidate(&mut tx, *start_time, counselor_name.as_deref())
                    .await?
            }
        };

        // 2. One outstanding booking per client.
        let active = SessionRepository::count_active_for_client(&mut tx, client_id).await?;
        if active > 0 {
            return Err(Error::Conflict(
                "an active booking already exists for this client".to_string(),
            ));
        }

        // 3. Conditional reservation; losing the race is a Conflict, not an
        //    internal failure.
        let reserved = SessionRepository::reserve(&mut tx, session.session_id).await?;
        if !reserved {
            return Err(Error::Conflict(
                "slot no longer available, choose another time".to_string(),
            ));
        }

        // 4. Reuse the client's open case, or start a fresh one in the
        //    instant-booking state.
        let case = Self::resolve_case(&mut tx, &client).await?;

        // 5. Tokens: queue token first, then the visit token derived from it.
        let queue_token =
            CaseService::get_or_create_queue_token_tx(&mut tx, case.case_id).await?;
        let session_token =
            tokens::next_session_token(&mut tx, case.case_id, &queue_token).await?;

        // 6. Link slot to case.
        SessionRepository::attach_case(&mut tx, session.session_id, case.case_id, &session_token)
            .await?;

        // 7. Audit record.
        SessionHistoryRepository::append(
            &mut tx,
            session.session_id,
            actor.user_id,
            &HistoryDetail::BookingCreated {
                case_id: case.case_id,
                session_token: session_token.clone(),
                description: request.description.clone(),
            },
        )
        .await?;

        let (counselor_name, room_name) =
            Self::display_names(&mut tx, session.session_id).await?;

        tx.commit().await?;

        let confirmation = BookingConfirmation {
            session_id: session.session_id,
            start_time: session.start_time,
            end_time: session.end_time,
            counselor_name,
            room_name,
            case_id: case.case_id,
            queue_token,
            session_token,
        };
        info!(
            "Client {} booked session {} (token {})",
            client_id, confirmation.session_id, confirmation.session_token
        );

        // Best-effort; the booking stands even if notification fails.
        if let Err(e) = self.notifier.booking_confirmed(&confirmation).await {
            warn!("Booking notification failed: {}", e);
        }
        Ok(confirmation)
    }

    /// Cancels a booked session: case -> cancelled, slot released, one audit
    /// record, all in one transaction.
    pub async fn cancel(&self, session_id: Uuid, actor: &Actor) -> Result<(), Error> {
        let mut tx = self.db.pool().begin().await?;

        let session = SessionRepository::get_tx(&mut tx, session_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("session {}", session_id)))?;
        if session.status != SessionStatus::Booked {
            return Err(Error::Conflict(format!(
                "session is not booked (status '{}')",
                session.status
            )));
        }
        let case_id = session.case_id.ok_or_else(|| {
            Error::Internal("booked session carries no case".to_string())
        })?;
        let case = CaseRepository::get_tx(&mut tx, case_id)
            .await?
            .ok_or_else(|| Error::Internal("booked session points at a missing case".to_string()))?;

        match actor.role {
            Role::Client => {
                if actor.client_id != Some(case.client_id) {
                    return Err(Error::Forbidden(
                        "booking belongs to a different client".to_string(),
                    ));
                }
                if let Some(start) = session.start_time {
                    if !lead_time_ok(start, Utc::now()) {
                        return Err(Error::InvalidInput(format!(
                            "bookings can only be cancelled at least {} hours before the session",
                            CANCEL_LEAD_TIME_HOURS
                        )));
                    }
                }
            }
            Role::Counselor => {
                if session.counselor_id != actor.counselor_id {
                    return Err(Error::Forbidden(
                        "session belongs to a different counselor".to_string(),
                    ));
                }
            }
            Role::Admin => {}
        }

        CaseRepository::set_status(&mut tx, case_id, CaseStatus::Cancelled).await?;
        SessionRepository::release(&mut tx, session_id).await?;

        let client = ClientRepository::get_tx(&mut tx, case.client_id).await?;
        if client.and_then(|c| c.active_case_id) == Some(case_id) {
            ClientRepository::set_active_case(&mut tx, case.client_id, None).await?;
        }

        SessionHistoryRepository::append(
            &mut tx,
            session_id,
            actor.user_id,
            &HistoryDetail::BookingCancelled {
                case_id,
                cancelled_by: actor.role.to_string(),
                reason: None,
            },
        )
        .await?;

        tx.commit().await?;
        info!("Session {} cancelled by {}", session_id, actor.role);

        if let Err(e) = self.notifier.booking_cancelled(session_id).await {
            warn!("Cancellation notification failed: {}", e);
        }
        Ok(())
    }

    /// The client's current open case, or a fresh one created in the
    /// instant-booking state when none exists or the last one is terminal.
    /// Expects the caller to hold the client row lock.
    async fn resolve_case(conn: &mut PgConnection, client: &Client) -> Result<Case, Error> {
        if let Some(case_id) = client.active_case_id {
            if let Some(case) = CaseRepository::get_tx(conn, case_id).await? {
                if !case.status.is_terminal() {
                    return Ok(case);
                }
            }
        }

        let mut case = Case::new(client.client_id);
        case.status = CaseStatus::Booked;
        CaseRepository::insert(conn, &case).await?;
        ClientRepository::set_active_case(conn, client.client_id, Some(case.case_id)).await?;
        Ok(case)
    }

    async fn display_names(
        conn: &mut PgConnection,
        session_id: Uuid,
    ) -> Result<(Option<String>, Option<String>), Error> {
        let names: (Option<String>, Option<String>) = sqlx::query_as(
            r#"
            SELECT c.display_name, r.name
            FROM sessions s
            LEFT JOIN counselors c ON c.counselor_id = s.counselor_id
            LEFT JOIN rooms r ON r.room_id = s.room_id
            WHERE s.session_id = $1
            "#,
        )
            .bind(session_id)
            .fetch_one(&mut *conn)
            .await?;
        Ok(names)
    }
}

/// Both instants are truncated to whole seconds before comparing, so calls
/// at the exact 24-hour boundary do not flip on sub-second jitter.
pub(crate) fn lead_time_ok(start: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    start.timestamp() - now.timestamp() >= CANCEL_LEAD_TIME_HOURS * 3600
}
