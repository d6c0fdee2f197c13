// File: maitri-server/src/routes.rs
//
// Thin translation layer: parses request shapes, hands the resolved actor to
// the core services, and maps core error kinds onto HTTP status codes. No
// business logic lives here.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::error;
use uuid::Uuid;

use maitri_common::models::{Actor, CaseStatus, Role};
use maitri_core::Error;
use maitri_core::repositories::postgres::{SessionHistoryRepo, SessionHistoryRepository};
use maitri_core::services::{
    BookingRequest, BookingService, BookingTarget, CaseService, SchedulingService,
};

#[derive(Clone)]
pub struct AppState {
    pub booking: Arc<BookingService>,
    pub cases: Arc<CaseService>,
    pub scheduling: Arc<SchedulingService>,
    pub history: Arc<SessionHistoryRepository>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/bookings", post(create_booking))
        .route("/bookings/{session_id}", delete(cancel_booking))
        .route("/cases", post(open_case))
        .route("/cases/{case_id}/status", post(transition_case))
        .route("/cases/{case_id}/queue-token", get(queue_token))
        .route("/slots", post(create_slot))
        .route("/slots/{session_id}/toggle", post(toggle_slot))
        .route("/slots/{session_id}", delete(delete_slot))
        .route("/sessions/{session_id}/history", get(session_history))
        .with_state(state)
}

/// Identity as resolved by the (out-of-scope) auth layer; the demo server
/// takes it from the request body verbatim.
#[derive(Debug, Deserialize)]
pub struct ActorPayload {
    pub user_id: Uuid,
    pub role: String,
    pub client_id: Option<Uuid>,
    pub counselor_id: Option<Uuid>,
}

impl ActorPayload {
    fn resolve(&self) -> Result<Actor, Error> {
        let role: Role = self.role.parse().map_err(Error::InvalidInput)?;
        Ok(Actor {
            user_id: self.user_id,
            role,
            client_id: self.client_id,
            counselor_id: self.counselor_id,
        })
    }
}

struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::Forbidden(_) => StatusCode::FORBIDDEN,
            Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if !self.0.is_expected() {
            error!("Request failed: {}", self.0);
        }
        let body = Json(json!({ "error": self.0.to_string() }));
        (status, body).into_response()
    }
}

#[derive(Debug, Deserialize)]
struct BookPayload {
    actor: ActorPayload,
    session_id: Option<Uuid>,
    start_time: Option<DateTime<Utc>>,
    counselor_name: Option<String>,
    description: Option<String>,
}

async fn create_booking(
    State(state): State<AppState>,
    Json(payload): Json<BookPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = payload.actor.resolve()?;
    let target = match (payload.session_id, payload.start_time) {
        (Some(id), _) => BookingTarget::SessionId(id),
        (None, Some(start_time)) => BookingTarget::Slot {
            start_time,
            counselor_name: payload.counselor_name,
        },
        (None, None) => {
            return Err(Error::InvalidInput(
                "either session_id or start_time is required".to_string(),
            )
            .into());
        }
    };
    let confirmation = state
        .booking
        .book(
            &actor,
            BookingRequest {
                target,
                description: payload.description,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(confirmation)))
}

#[derive(Debug, Deserialize)]
struct CancelPayload {
    actor: ActorPayload,
}

async fn cancel_booking(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(payload): Json<CancelPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = payload.actor.resolve()?;
    state.booking.cancel(session_id, &actor).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct OpenCasePayload {
    actor: ActorPayload,
    code: String,
}

async fn open_case(
    State(state): State<AppState>,
    Json(payload): Json<OpenCasePayload>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = payload.actor.resolve()?;
    let case = state.cases.open_case_from_code(&actor, &payload.code).await?;
    Ok((StatusCode::CREATED, Json(case)))
}

#[derive(Debug, Deserialize)]
struct TransitionPayload {
    actor: ActorPayload,
    status: String,
    reason: Option<String>,
}

async fn transition_case(
    State(state): State<AppState>,
    Path(case_id): Path<Uuid>,
    Json(payload): Json<TransitionPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = payload.actor.resolve()?;
    // "postponed" normalizes to rescheduled here.
    let status: CaseStatus = payload.status.parse().map_err(Error::InvalidInput)?;
    let case = state
        .cases
        .transition_status(case_id, status, &actor, payload.reason.as_deref())
        .await?;
    Ok(Json(case))
}

async fn queue_token(
    State(state): State<AppState>,
    Path(case_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let token = state.cases.get_or_create_queue_token(case_id).await?;
    Ok(Json(json!({ "queue_token": token })))
}

#[derive(Debug, Deserialize)]
struct CreateSlotPayload {
    actor: ActorPayload,
    room_id: Option<Uuid>,
    start_time: DateTime<Utc>,
    duration_minutes: Option<i64>,
}

async fn create_slot(
    State(state): State<AppState>,
    Json(payload): Json<CreateSlotPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = payload.actor.resolve()?;
    let counselor_id = actor.counselor_id.ok_or_else(|| {
        Error::Forbidden("only counselors may open slots".to_string())
    })?;
    let session = state
        .scheduling
        .create_slot(
            counselor_id,
            payload.room_id,
            payload.start_time,
            payload.duration_minutes,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(session)))
}

async fn toggle_slot(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.scheduling.toggle_availability(session_id).await?;
    Ok(Json(session))
}

#[derive(Debug, Deserialize)]
struct DeleteSlotPayload {
    actor: ActorPayload,
}

async fn delete_slot(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(payload): Json<DeleteSlotPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = payload.actor.resolve()?;
    state.scheduling.delete_slot(session_id, &actor).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn session_history(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let records = state.history.get_for_session(session_id).await?;
    Ok(Json(records))
}
