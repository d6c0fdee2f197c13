// File: maitri-core/tests/integration/case_tests.rs

use std::sync::Arc;

use chrono::{Duration, Utc};
use maitri_common::models::{CaseStatus, RegistrationCode, SessionStatus};
use tokio::task::JoinSet;

use maitri_core::{
    Error,
    repositories::postgres::{
        CaseRepo, CaseRepository, ClientRepo, ClientRepository, RegistrationCodeRepo,
        RegistrationCodeRepository, SessionHistoryRepo, SessionHistoryRepository, SessionRepo,
        SessionRepository,
    },
    services::{
        BookingRequest, BookingService, BookingTarget, CaseService, NoopNotifier,
        SchedulingService,
    },
    test_utils::helpers::*,
};

async fn seed_code(db: &maitri_core::Database, code: &str) -> Result<(), Error> {
    let repo = RegistrationCodeRepository::new(db.pool().clone());
    repo.create(&RegistrationCode {
        code: code.to_string(),
        created_at: Utc::now(),
        used_at: None,
        used_by: None,
    })
    .await
}

#[tokio::test]
async fn test_open_case_from_code() -> Result<(), Error> {
    let _gate = db_gate().await;
    let db = setup_test_database().await?;
    let client = seed_client(&db, "somchai").await?;
    seed_code(&db, "REG-0001").await?;

    let service = CaseService::new(db.clone());
    let case = service.open_case_from_code(&client, "REG-0001").await?;
    assert_eq!(case.status, CaseStatus::WaitingConfirmation);
    assert_eq!(case.client_id, client.client_id.unwrap());

    // The code is burned with a timestamp.
    let codes = RegistrationCodeRepository::new(db.pool().clone());
    let code = codes.get("REG-0001").await?.expect("code exists");
    assert!(code.used_at.is_some());
    assert_eq!(code.used_by, Some(client.user_id));

    // The client now points at the open case.
    let clients = ClientRepository::new(db.pool().clone());
    let profile = clients
        .get(client.client_id.unwrap())
        .await?
        .expect("client exists");
    assert_eq!(profile.active_case_id, Some(case.case_id));

    // Re-redemption is a conflict; unknown codes are not found.
    let reused = service.open_case_from_code(&client, "REG-0001").await;
    assert!(matches!(reused, Err(Error::Conflict(_))));
    let unknown = service.open_case_from_code(&client, "REG-9999").await;
    assert!(matches!(unknown, Err(Error::NotFound(_))));

    Ok(())
}

#[tokio::test]
async fn test_code_redemption_is_exactly_once_under_concurrency() -> Result<(), Error> {
    let _gate = db_gate().await;
    let db = setup_test_database().await?;
    seed_code(&db, "REG-RACE").await?;

    let service = Arc::new(CaseService::new(db.clone()));
    let mut tasks = JoinSet::new();
    for i in 0..4 {
        let service = Arc::clone(&service);
        let actor = seed_client(&db, &format!("racer_{i}")).await?;
        tasks.spawn(async move { service.open_case_from_code(&actor, "REG-RACE").await });
    }

    let mut winners = 0;
    let mut conflicts = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined.expect("task panicked") {
            Ok(_) => winners += 1,
            Err(Error::Conflict(_)) => conflicts += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(winners, 1);
    assert_eq!(conflicts, 3);

    Ok(())
}

#[tokio::test]
async fn test_open_case_requires_client_profile() -> Result<(), Error> {
    let _gate = db_gate().await;
    let db = setup_test_database().await?;
    let counselor = seed_counselor(&db, "dr_nok").await?;
    seed_code(&db, "REG-0002").await?;

    let service = CaseService::new(db.clone());
    let result = service.open_case_from_code(&counselor, "REG-0002").await;
    assert!(matches!(result, Err(Error::InvalidInput(_))));

    Ok(())
}

#[tokio::test]
async fn test_confirmed_at_is_set_once() -> Result<(), Error> {
    let _gate = db_gate().await;
    let db = setup_test_database().await?;
    let client = seed_client(&db, "somchai").await?;
    let counselor = seed_counselor(&db, "dr_nok").await?;
    seed_code(&db, "REG-0003").await?;

    let service = CaseService::new(db.clone());
    let case = service.open_case_from_code(&client, "REG-0003").await?;

    let confirmed = service
        .transition_status(case.case_id, CaseStatus::Confirmed, &counselor, None)
        .await?;
    let first_stamp = confirmed.confirmed_at.expect("confirmed_at set");

    let confirmed_again = service
        .transition_status(case.case_id, CaseStatus::Confirmed, &counselor, None)
        .await?;
    assert_eq!(confirmed_again.confirmed_at, Some(first_stamp));

    Ok(())
}

#[tokio::test]
async fn test_postponed_normalizes_to_rescheduled() -> Result<(), Error> {
    let _gate = db_gate().await;
    let db = setup_test_database().await?;
    let client = seed_client(&db, "somchai").await?;
    let counselor = seed_counselor(&db, "dr_nok").await?;
    seed_code(&db, "REG-0004").await?;

    let service = CaseService::new(db.clone());
    let case = service.open_case_from_code(&client, "REG-0004").await?;

    // The request layer hands the raw string to the status parser.
    let target: CaseStatus = "postponed".parse().map_err(Error::InvalidInput)?;
    assert_eq!(target, CaseStatus::Rescheduled);

    let updated = service
        .transition_status(case.case_id, target, &counselor, Some("client asked"))
        .await?;
    assert_eq!(updated.status, CaseStatus::Rescheduled);

    Ok(())
}

#[tokio::test]
async fn test_invalid_transition_target_rejected() -> Result<(), Error> {
    let _gate = db_gate().await;
    let db = setup_test_database().await?;
    let client = seed_client(&db, "somchai").await?;
    let counselor = seed_counselor(&db, "dr_nok").await?;
    seed_code(&db, "REG-0005").await?;

    let service = CaseService::new(db.clone());
    let case = service.open_case_from_code(&client, "REG-0005").await?;

    let result = service
        .transition_status(case.case_id, CaseStatus::Completed, &counselor, None)
        .await;
    assert!(matches!(result, Err(Error::InvalidInput(_))));

    Ok(())
}

#[tokio::test]
async fn test_transition_forbidden_for_other_counselor() -> Result<(), Error> {
    let _gate = db_gate().await;
    let db = setup_test_database().await?;
    let client = seed_client(&db, "somchai").await?;
    let assigned = seed_counselor(&db, "dr_nok").await?;
    let other = seed_counselor(&db, "dr_lek").await?;
    seed_code(&db, "REG-0006").await?;

    let service = CaseService::new(db.clone());
    let case = service.open_case_from_code(&client, "REG-0006").await?;

    sqlx::query("UPDATE cases SET counselor_id = $2 WHERE case_id = $1")
        .bind(case.case_id)
        .bind(assigned.counselor_id.unwrap())
        .execute(db.pool())
        .await?;

    let result = service
        .transition_status(case.case_id, CaseStatus::Confirmed, &other, None)
        .await;
    assert!(matches!(result, Err(Error::Forbidden(_))));

    Ok(())
}

#[tokio::test]
async fn test_cancelling_case_releases_its_sessions() -> Result<(), Error> {
    let _gate = db_gate().await;
    let db = setup_test_database().await?;
    let client = seed_client(&db, "somchai").await?;
    let counselor = seed_counselor(&db, "dr_nok").await?;

    let scheduling = SchedulingService::new(db.clone());
    let slot = scheduling
        .create_slot(
            counselor.counselor_id.unwrap(),
            None,
            Utc::now() + Duration::days(3),
            None,
        )
        .await?;

    let booking = BookingService::new(db.clone(), Arc::new(NoopNotifier));
    let confirmation = booking
        .book(
            &client,
            BookingRequest {
                target: BookingTarget::SessionId(slot.session_id),
                description: None,
            },
        )
        .await?;

    let service = CaseService::new(db.clone());
    let cancelled = service
        .transition_status(
            confirmation.case_id,
            CaseStatus::Cancelled,
            &counselor,
            Some("no-show"),
        )
        .await?;
    assert_eq!(cancelled.status, CaseStatus::Cancelled);

    let sessions = SessionRepository::new(db.pool().clone());
    let released = sessions.get(slot.session_id).await?.expect("slot exists");
    assert_eq!(released.status, SessionStatus::Available);
    assert_eq!(released.case_id, None);

    let clients = ClientRepository::new(db.pool().clone());
    let profile = clients
        .get(client.client_id.unwrap())
        .await?
        .expect("client exists");
    assert_eq!(profile.active_case_id, None);

    // One status_changed record for the linked session, with the reason.
    let history = SessionHistoryRepository::new(db.pool().clone());
    let records = history.get_for_session(slot.session_id).await?;
    let status_changes: Vec<_> = records
        .iter()
        .filter(|r| r.action == "status_changed")
        .collect();
    assert_eq!(status_changes.len(), 1);
    assert_eq!(status_changes[0].detail["reason"], "no-show");

    Ok(())
}

#[tokio::test]
async fn test_transition_unknown_case() -> Result<(), Error> {
    let _gate = db_gate().await;
    let db = setup_test_database().await?;
    let counselor = seed_counselor(&db, "dr_nok").await?;

    let service = CaseService::new(db.clone());
    let result = service
        .transition_status(uuid::Uuid::new_v4(), CaseStatus::Confirmed, &counselor, None)
        .await;
    assert!(matches!(result, Err(Error::NotFound(_))));

    Ok(())
}

#[tokio::test]
async fn test_booked_session_belongs_to_exactly_one_case() -> Result<(), Error> {
    let _gate = db_gate().await;
    let db = setup_test_database().await?;
    let client = seed_client(&db, "somchai").await?;
    let counselor = seed_counselor(&db, "dr_nok").await?;

    let scheduling = SchedulingService::new(db.clone());
    let slot = scheduling
        .create_slot(
            counselor.counselor_id.unwrap(),
            None,
            Utc::now() + Duration::days(3),
            None,
        )
        .await?;

    let booking = BookingService::new(db.clone(), Arc::new(NoopNotifier));
    let confirmation = booking
        .book(
            &client,
            BookingRequest {
                target: BookingTarget::SessionId(slot.session_id),
                description: None,
            },
        )
        .await?;

    let cases = CaseRepository::new(db.pool().clone());
    let case = cases.get(confirmation.case_id).await?.expect("case exists");
    assert_eq!(case.status, CaseStatus::Booked);

    let sessions = SessionRepository::new(db.pool().clone());
    let linked = sessions.list_for_case(confirmation.case_id).await?;
    assert_eq!(linked.len(), 1);
    assert_eq!(linked[0].session_id, slot.session_id);

    Ok(())
}
