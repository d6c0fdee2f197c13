// File: maitri-core/tests/integration/scheduling_tests.rs

use std::sync::Arc;

use chrono::{Duration, Utc};
use maitri_common::models::SessionStatus;

use maitri_core::{
    Error,
    repositories::postgres::{SessionRepo, SessionRepository},
    services::{
        BookingRequest, BookingService, BookingTarget, NoopNotifier, SchedulingService,
    },
    test_utils::helpers::*,
};

#[tokio::test]
async fn test_create_slot_rejects_past_start() -> Result<(), Error> {
    let _gate = db_gate().await;
    let db = setup_test_database().await?;
    let counselor = seed_counselor(&db, "dr_nok").await?;

    let scheduling = SchedulingService::new(db.clone());
    let result = scheduling
        .create_slot(
            counselor.counselor_id.unwrap(),
            None,
            Utc::now() - Duration::hours(1),
            None,
        )
        .await;
    assert!(matches!(result, Err(Error::InvalidInput(_))));

    Ok(())
}

#[tokio::test]
async fn test_create_slot_rejects_overlap() -> Result<(), Error> {
    let _gate = db_gate().await;
    let db = setup_test_database().await?;
    let counselor = seed_counselor(&db, "dr_nok").await?;
    let other = seed_counselor(&db, "dr_lek").await?;

    let start = Utc::now() + Duration::days(2);
    let scheduling = SchedulingService::new(db.clone());
    scheduling
        .create_slot(counselor.counselor_id.unwrap(), None, start, Some(60))
        .await?;

    // Half-open overlap: starting mid-slot collides...
    let overlapping = scheduling
        .create_slot(
            counselor.counselor_id.unwrap(),
            None,
            start + Duration::minutes(30),
            Some(60),
        )
        .await;
    assert!(matches!(overlapping, Err(Error::Conflict(_))));

    // ...but the adjacent slot starting exactly at the end does not.
    scheduling
        .create_slot(
            counselor.counselor_id.unwrap(),
            None,
            start + Duration::minutes(60),
            Some(60),
        )
        .await?;

    // A different counselor can hold the same window.
    scheduling
        .create_slot(other.counselor_id.unwrap(), None, start, Some(60))
        .await?;

    Ok(())
}

#[tokio::test]
async fn test_concurrent_slot_creation_single_winner() -> Result<(), Error> {
    let _gate = db_gate().await;
    let db = setup_test_database().await?;
    let counselor = seed_counselor(&db, "dr_nok").await?;

    // Two simultaneous attempts at the same window for one counselor;
    // the schedule lock must let exactly one through.
    let start = Utc::now() + Duration::days(2);
    let scheduling = Arc::new(SchedulingService::new(db.clone()));
    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..2 {
        let scheduling = Arc::clone(&scheduling);
        let counselor_id = counselor.counselor_id.unwrap();
        tasks.spawn(async move {
            scheduling
                .create_slot(counselor_id, None, start, Some(60))
                .await
        });
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
    assert_eq!(conflicts, 1);

    let slots = scheduling
        .list_for_counselor(counselor.counselor_id.unwrap())
        .await?;
    assert_eq!(slots.len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_toggle_availability() -> Result<(), Error> {
    let _gate = db_gate().await;
    let db = setup_test_database().await?;
    let counselor = seed_counselor(&db, "dr_nok").await?;
    let client = seed_client(&db, "somchai").await?;

    let scheduling = SchedulingService::new(db.clone());
    let slot = scheduling
        .create_slot(
            counselor.counselor_id.unwrap(),
            None,
            Utc::now() + Duration::days(2),
            None,
        )
        .await?;

    let closed = scheduling.toggle_availability(slot.session_id).await?;
    assert_eq!(closed.status, SessionStatus::Closed);
    let reopened = scheduling.toggle_availability(slot.session_id).await?;
    assert_eq!(reopened.status, SessionStatus::Available);

    // Booked slots cannot be toggled; the booking must be cancelled first.
    let booking = BookingService::new(db.clone(), Arc::new(NoopNotifier));
    booking
        .book(
            &client,
            BookingRequest {
                target: BookingTarget::SessionId(slot.session_id),
                description: None,
            },
        )
        .await?;
    let toggled = scheduling.toggle_availability(slot.session_id).await;
    assert!(matches!(toggled, Err(Error::Conflict(_))));

    Ok(())
}

#[tokio::test]
async fn test_closed_slot_cannot_be_booked() -> Result<(), Error> {
    let _gate = db_gate().await;
    let db = setup_test_database().await?;
    let counselor = seed_counselor(&db, "dr_nok").await?;
    let client = seed_client(&db, "somchai").await?;

    let scheduling = SchedulingService::new(db.clone());
    let slot = scheduling
        .create_slot(
            counselor.counselor_id.unwrap(),
            None,
            Utc::now() + Duration::days(2),
            None,
        )
        .await?;
    scheduling.toggle_availability(slot.session_id).await?;

    let booking = BookingService::new(db.clone(), Arc::new(NoopNotifier));
    let result = booking
        .book(
            &client,
            BookingRequest {
                target: BookingTarget::SessionId(slot.session_id),
                description: None,
            },
        )
        .await;
    assert!(matches!(result, Err(Error::Conflict(_))));

    Ok(())
}

#[tokio::test]
async fn test_delete_slot_rules() -> Result<(), Error> {
    let _gate = db_gate().await;
    let db = setup_test_database().await?;
    let counselor = seed_counselor(&db, "dr_nok").await?;
    let other = seed_counselor(&db, "dr_lek").await?;
    let client = seed_client(&db, "somchai").await?;

    let scheduling = SchedulingService::new(db.clone());
    let slot = scheduling
        .create_slot(
            counselor.counselor_id.unwrap(),
            None,
            Utc::now() + Duration::days(2),
            None,
        )
        .await?;

    // Only the owner may delete.
    let foreign = scheduling.delete_slot(slot.session_id, &other).await;
    assert!(matches!(foreign, Err(Error::Forbidden(_))));

    // Booked slots may not be deleted.
    let booking = BookingService::new(db.clone(), Arc::new(NoopNotifier));
    booking
        .book(
            &client,
            BookingRequest {
                target: BookingTarget::SessionId(slot.session_id),
                description: None,
            },
        )
        .await?;
    let booked = scheduling.delete_slot(slot.session_id, &counselor).await;
    assert!(matches!(booked, Err(Error::Conflict(_))));

    // After cancellation the available, future slot can go.
    booking.cancel(slot.session_id, &counselor).await?;
    scheduling.delete_slot(slot.session_id, &counselor).await?;

    let sessions = SessionRepository::new(db.pool().clone());
    assert!(sessions.get(slot.session_id).await?.is_none());

    Ok(())
}

#[tokio::test]
async fn test_unscheduled_slots_are_null_safe_in_range_queries() -> Result<(), Error> {
    let _gate = db_gate().await;
    let db = setup_test_database().await?;
    let counselor = seed_counselor(&db, "dr_nok").await?;

    // A portal-toggled slot with no scheduled time.
    let unscheduled = uuid::Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO sessions (session_id, counselor_id, status, created_at)
        VALUES ($1, $2, 'available', $3)
        "#,
    )
        .bind(unscheduled)
        .bind(counselor.counselor_id.unwrap())
        .bind(Utc::now())
        .execute(db.pool())
        .await?;

    let scheduling = SchedulingService::new(db.clone());
    let start = Utc::now() + Duration::days(2);
    let timed = scheduling
        .create_slot(counselor.counselor_id.unwrap(), None, start, None)
        .await?;

    let listed = scheduling
        .list_available_between(Utc::now(), Utc::now() + Duration::days(7))
        .await?;
    assert!(listed.iter().any(|s| s.session_id == timed.session_id));
    assert!(listed.iter().all(|s| s.session_id != unscheduled));

    // But the unscheduled slot still shows up for its counselor.
    let mine = scheduling
        .list_for_counselor(counselor.counselor_id.unwrap())
        .await?;
    assert!(mine.iter().any(|s| s.session_id == unscheduled));

    Ok(())
}
