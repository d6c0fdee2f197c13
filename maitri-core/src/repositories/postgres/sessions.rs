// src/repositories/postgres/sessions.rs

use chrono::{DateTime, Utc};
use maitri_common::models::{Session, SessionStatus};
use sqlx::{PgConnection, Pool, Postgres};
use uuid::Uuid;
use crate::Error;

const SESSION_COLUMNS: &str = r#"
    session_id, counselor_id, room_id, start_time, end_time,
    status, case_id, session_token, keyword, note, followup,
    mood_score, created_at
"#;

#[async_trait::async_trait]
pub trait SessionRepo {
    async fn get(&self, session_id: Uuid) -> Result<Option<Session>, Error>;
    async fn delete(&self, session_id: Uuid) -> Result<(), Error>;
    async fn list_for_counselor(&self, counselor_id: Uuid) -> Result<Vec<Session>, Error>;
    async fn list_available_between(
        &self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Session>, Error>;
    async fn list_for_case(&self, case_id: Uuid) -> Result<Vec<Session>, Error>;
}

pub struct SessionRepository {
    pub pool: Pool<Postgres>,
}

impl SessionRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl SessionRepo for SessionRepository {
    async fn get(&self, session_id: Uuid) -> Result<Option<Session>, Error> {
        let row = sqlx::query_as::<_, Session>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE session_id = $1"
        ))
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn delete(&self, session_id: Uuid) -> Result<(), Error> {
        sqlx::query("DELETE FROM sessions WHERE session_id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_for_counselor(&self, counselor_id: Uuid) -> Result<Vec<Session>, Error> {
        let rows = sqlx::query_as::<_, Session>(&format!(
            r#"
            SELECT {SESSION_COLUMNS}
            FROM sessions
            WHERE counselor_id = $1
            ORDER BY start_time ASC NULLS LAST
            "#
        ))
            .bind(counselor_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn list_available_between(
        &self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Session>, Error> {
        // Unscheduled portal slots carry NULL times; the range predicate
        // filters them out implicitly.
        let rows = sqlx::query_as::<_, Session>(&format!(
            r#"
            SELECT {SESSION_COLUMNS}
            FROM sessions
            WHERE status = 'available'
              AND start_time IS NOT NULL
              AND start_time >= $1
              AND start_time < $2
            ORDER BY start_time ASC
            "#
        ))
            .bind(from)
            .bind(until)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn list_for_case(&self, case_id: Uuid) -> Result<Vec<Session>, Error> {
        let rows = sqlx::query_as::<_, Session>(&format!(
            r#"
            SELECT {SESSION_COLUMNS}
            FROM sessions
            WHERE case_id = $1
            ORDER BY start_time ASC NULLS LAST
            "#
        ))
            .bind(case_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }
}

/// Transaction-scoped operations. These take a `&mut PgConnection` so the
/// orchestrating service decides the transaction boundary.
impl SessionRepository {
    /// Takes a transaction-scoped advisory lock on the counselor's schedule.
    /// Two transactions creating slots for the same counselor serialize
    /// here, so the overlap check and insert run without interleaving.
    pub async fn lock_counselor_schedule(
        conn: &mut PgConnection,
        counselor_id: Uuid,
    ) -> Result<(), Error> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1::text, 0))")
            .bind(counselor_id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    pub async fn count_overlapping_tx(
        conn: &mut PgConnection,
        counselor_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<i64, Error> {
        // Half-open interval overlap: new.start < existing.end AND
        // new.end > existing.start.
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM sessions
            WHERE counselor_id = $1
              AND status <> 'cancelled'
              AND start_time IS NOT NULL
              AND end_time IS NOT NULL
              AND start_time < $3
              AND end_time > $2
            "#,
        )
            .bind(counselor_id)
            .bind(start)
            .bind(end)
            .fetch_one(&mut *conn)
            .await?;
        Ok(count)
    }

    pub async fn create_tx(conn: &mut PgConnection, session: &Session) -> Result<(), Error> {
        sqlx::query(
            r#"
            INSERT INTO sessions (
                session_id, counselor_id, room_id, start_time, end_time,
                status, case_id, session_token, keyword, note, followup,
                mood_score, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
            .bind(session.session_id)
            .bind(session.counselor_id)
            .bind(session.room_id)
            .bind(session.start_time)
            .bind(session.end_time)
            .bind(session.status)
            .bind(session.case_id)
            .bind(&session.session_token)
            .bind(&session.keyword)
            .bind(&session.note)
            .bind(&session.followup)
            .bind(session.mood_score)
            .bind(session.created_at)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// Conditional reservation: flips available -> booked in a single UPDATE.
    /// Returns false when the row exists but was no longer available (the
    /// race loser); the caller distinguishes that from not-found.
    pub async fn reserve(
        conn: &mut PgConnection,
        session_id: Uuid,
    ) -> Result<bool, Error> {
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET status = 'booked'
            WHERE session_id = $1
              AND status = 'available'
            "#,
        )
            .bind(session_id)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Resets a slot to available: clears the case link, session token, all
    /// clinical fields and tag associations.
    pub async fn release(conn: &mut PgConnection, session_id: Uuid) -> Result<(), Error> {
        sqlx::query("DELETE FROM session_problem_tags WHERE session_id = $1")
            .bind(session_id)
            .execute(&mut *conn)
            .await?;
        sqlx::query(
            r#"
            UPDATE sessions
            SET status = 'available',
                case_id = NULL,
                session_token = NULL,
                keyword = NULL,
                note = NULL,
                followup = NULL,
                mood_score = NULL
            WHERE session_id = $1
            "#,
        )
            .bind(session_id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// Links a freshly reserved slot to its case and stamps the visit token.
    pub async fn attach_case(
        conn: &mut PgConnection,
        session_id: Uuid,
        case_id: Uuid,
        session_token: &str,
    ) -> Result<(), Error> {
        sqlx::query(
            r#"
            UPDATE sessions
            SET case_id = $2, session_token = $3
            WHERE session_id = $1
            "#,
        )
            .bind(session_id)
            .bind(case_id)
            .bind(session_token)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    pub async fn get_tx(
        conn: &mut PgConnection,
        session_id: Uuid,
    ) -> Result<Option<Session>, Error> {
        let row = sqlx::query_as::<_, Session>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE session_id = $1"
        ))
            .bind(session_id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(row)
    }

    /// Sessions already attached to a case, oldest first. Used both for
    /// cancellation (release every linked slot) and visit-sequence counting.
    pub async fn list_for_case_tx(
        conn: &mut PgConnection,
        case_id: Uuid,
    ) -> Result<Vec<Session>, Error> {
        let rows = sqlx::query_as::<_, Session>(&format!(
            r#"
            SELECT {SESSION_COLUMNS}
            FROM sessions
            WHERE case_id = $1
            ORDER BY start_time ASC NULLS LAST
            "#
        ))
            .bind(case_id)
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows)
    }

    /// Resolves a booking request given as (date-window, counselor) instead
    /// of an explicit session id. Zero candidates is NotFound; more than one
    /// is Conflict -- never silently pick one.
    pub async fn find_candidate(
        conn: &mut PgConnection,
        start: DateTime<Utc>,
        counselor_name: Option<&str>,
    ) -> Result<Session, Error> {
        let rows = match counselor_name {
            Some(name) => {
                sqlx::query_as::<_, Session>(&format!(
                    r#"
                    SELECT {SESSION_COLUMNS}
                    FROM sessions s
                    WHERE s.start_time = $1
                      AND s.status = 'available'
                      AND s.counselor_id IN (
                          SELECT counselor_id FROM counselors WHERE display_name = $2
                      )
                    "#
                ))
                    .bind(start)
                    .bind(name)
                    .fetch_all(&mut *conn)
                    .await?
            }
            None => {
                sqlx::query_as::<_, Session>(&format!(
                    r#"
                    SELECT {SESSION_COLUMNS}
                    FROM sessions s
                    WHERE s.start_time = $1
                      AND s.status = 'available'
                    "#
                ))
                    .bind(start)
                    .fetch_all(&mut *conn)
                    .await?
            }
        };

        match rows.len() {
            0 => Err(Error::NotFound("no matching slot".to_string())),
            1 => Ok(rows.into_iter().next().ok_or_else(|| {
                Error::Internal("candidate vanished".to_string())
            })?),
            _ => Err(Error::Conflict(
                "multiple slots match the requested time".to_string(),
            )),
        }
    }

    /// Count of the client's outstanding bookings. At most one active
    /// booking per client is permitted.
    pub async fn count_active_for_client(
        conn: &mut PgConnection,
        client_id: Uuid,
    ) -> Result<i64, Error> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM sessions s
            JOIN cases c ON c.case_id = s.case_id
            WHERE c.client_id = $1
              AND s.status = 'booked'
              AND (s.start_time IS NULL OR s.start_time > now())
            "#,
        )
            .bind(client_id)
            .fetch_one(&mut *conn)
            .await?;
        Ok(count)
    }

    pub async fn set_status(
        conn: &mut PgConnection,
        session_id: Uuid,
        status: SessionStatus,
    ) -> Result<(), Error> {
        sqlx::query("UPDATE sessions SET status = $2 WHERE session_id = $1")
            .bind(session_id)
            .bind(status)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// Updates the clinical fields on a booked session and replaces its
    /// problem-tag associations.
    pub async fn update_clinical_fields(
        conn: &mut PgConnection,
        session_id: Uuid,
        keyword: Option<&str>,
        note: Option<&str>,
        followup: Option<&str>,
        mood_score: Option<i32>,
        tag_ids: &[Uuid],
    ) -> Result<(), Error> {
        sqlx::query(
            r#"
            UPDATE sessions
            SET keyword = $2, note = $3, followup = $4, mood_score = $5
            WHERE session_id = $1
            "#,
        )
            .bind(session_id)
            .bind(keyword)
            .bind(note)
            .bind(followup)
            .bind(mood_score)
            .execute(&mut *conn)
            .await?;

        sqlx::query("DELETE FROM session_problem_tags WHERE session_id = $1")
            .bind(session_id)
            .execute(&mut *conn)
            .await?;
        for tag_id in tag_ids {
            sqlx::query(
                "INSERT INTO session_problem_tags (session_id, tag_id) VALUES ($1, $2)",
            )
                .bind(session_id)
                .bind(tag_id)
                .execute(&mut *conn)
                .await?;
        }
        Ok(())
    }
}
