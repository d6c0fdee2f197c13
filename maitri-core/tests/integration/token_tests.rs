// File: maitri-core/tests/integration/token_tests.rs

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration, Utc};
use maitri_common::models::RegistrationCode;
use tokio::task::JoinSet;

use maitri_core::{
    Error,
    repositories::postgres::{RegistrationCodeRepo, RegistrationCodeRepository},
    services::{
        BookingRequest, BookingService, BookingTarget, CaseService, NoopNotifier,
        SchedulingService,
    },
    test_utils::helpers::*,
};

async fn open_case(
    db: &maitri_core::Database,
    service: &CaseService,
    name: &str,
    code: &str,
) -> Result<uuid::Uuid, Error> {
    let actor = seed_client(db, name).await?;
    let codes = RegistrationCodeRepository::new(db.pool().clone());
    codes
        .create(&RegistrationCode {
            code: code.to_string(),
            created_at: Utc::now(),
            used_at: None,
            used_by: None,
        })
        .await?;
    let case = service.open_case_from_code(&actor, code).await?;
    Ok(case.case_id)
}

#[tokio::test]
async fn test_sequential_queue_tokens_have_no_gaps() -> Result<(), Error> {
    let _gate = db_gate().await;
    let db = setup_test_database().await?;
    let service = CaseService::new(db.clone());

    let mut tokens = Vec::new();
    for i in 0..3 {
        let case_id = open_case(&db, &service, &format!("student_{i}"), &format!("REG-{i}"))
            .await?;
        tokens.push(service.get_or_create_queue_token(case_id).await?);
    }

    let prefix = &tokens[0][..2];
    for (i, token) in tokens.iter().enumerate() {
        assert_eq!(token.len(), 6);
        assert_eq!(&token[..2], prefix);
        let seq: u32 = token[2..].parse().expect("numeric sequence");
        assert_eq!(seq as usize, i + 1);
    }

    Ok(())
}

#[tokio::test]
async fn test_queue_token_fetch_is_idempotent() -> Result<(), Error> {
    let _gate = db_gate().await;
    let db = setup_test_database().await?;
    let service = CaseService::new(db.clone());

    let case_id = open_case(&db, &service, "somchai", "REG-IDEM").await?;
    let first = service.get_or_create_queue_token(case_id).await?;
    let second = service.get_or_create_queue_token(case_id).await?;
    assert_eq!(first, second);

    Ok(())
}

#[tokio::test]
async fn test_queue_token_for_unknown_case() -> Result<(), Error> {
    let _gate = db_gate().await;
    let db = setup_test_database().await?;
    let service = CaseService::new(db.clone());

    let result = service.get_or_create_queue_token(uuid::Uuid::new_v4()).await;
    assert!(matches!(result, Err(Error::NotFound(_))));

    Ok(())
}

#[tokio::test]
async fn test_concurrent_generation_never_duplicates_tokens() -> Result<(), Error> {
    let _gate = db_gate().await;
    let db = setup_test_database().await?;
    let service = Arc::new(CaseService::new(db.clone()));

    // Racing on an empty prefix is the worst case: every transaction
    // computes sequence 1 and only the unique index arbitrates.
    let mut case_ids = Vec::new();
    for i in 0..6 {
        case_ids.push(
            open_case(&db, &service, &format!("racer_{i}"), &format!("REG-R{i}")).await?,
        );
    }

    let mut tasks = JoinSet::new();
    for case_id in case_ids {
        let service = Arc::clone(&service);
        tasks.spawn(async move { service.get_or_create_queue_token(case_id).await });
    }

    let mut tokens = HashSet::new();
    while let Some(joined) = tasks.join_next().await {
        match joined.expect("task panicked") {
            Ok(token) => {
                assert!(tokens.insert(token.clone()), "duplicate token {token}");
            }
            // Bounded retry may give up under heavy contention; that is a
            // Conflict, never a duplicate.
            Err(Error::Conflict(_)) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert!(!tokens.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_session_tokens_count_visits() -> Result<(), Error> {
    let _gate = db_gate().await;
    let db = setup_test_database().await?;
    let client = seed_client(&db, "somchai").await?;
    let counselor = seed_counselor(&db, "dr_nok").await?;

    let scheduling = SchedulingService::new(db.clone());
    let booking = BookingService::new(db.clone(), Arc::new(NoopNotifier));

    let first_slot = scheduling
        .create_slot(
            counselor.counselor_id.unwrap(),
            None,
            Utc::now() + Duration::days(3),
            None,
        )
        .await?;
    let first = booking
        .book(
            &client,
            BookingRequest {
                target: BookingTarget::SessionId(first_slot.session_id),
                description: None,
            },
        )
        .await?;
    assert!(first.session_token.ends_with("-001"));

    // The first visit concludes; the session stays attached to the case.
    sqlx::query("UPDATE sessions SET status = 'completed' WHERE session_id = $1")
        .bind(first_slot.session_id)
        .execute(db.pool())
        .await?;

    let second_slot = scheduling
        .create_slot(
            counselor.counselor_id.unwrap(),
            None,
            Utc::now() + Duration::days(10),
            None,
        )
        .await?;
    let second = booking
        .book(
            &client,
            BookingRequest {
                target: BookingTarget::SessionId(second_slot.session_id),
                description: None,
            },
        )
        .await?;

    assert_eq!(second.case_id, first.case_id);
    assert_eq!(second.queue_token, first.queue_token);
    assert!(second.session_token.ends_with("-002"));

    Ok(())
}
