// src/repositories/postgres/session_history.rs

use maitri_common::models::{HistoryDetail, SessionHistory};
use sqlx::{PgConnection, Pool, Postgres};
use uuid::Uuid;
use crate::Error;

#[async_trait::async_trait]
pub trait SessionHistoryRepo {
    async fn get_for_session(&self, session_id: Uuid) -> Result<Vec<SessionHistory>, Error>;
    async fn get_for_case(&self, case_id: Uuid) -> Result<Vec<SessionHistory>, Error>;
}

pub struct SessionHistoryRepository {
    pub pool: Pool<Postgres>,
}

impl SessionHistoryRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl SessionHistoryRepo for SessionHistoryRepository {
    async fn get_for_session(&self, session_id: Uuid) -> Result<Vec<SessionHistory>, Error> {
        let rows = sqlx::query_as::<_, SessionHistory>(
            r#"
            SELECT history_id, session_id, action, detail, actor_user_id, created_at
            FROM session_history
            WHERE session_id = $1
            ORDER BY created_at DESC
            "#,
        )
            .bind(session_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn get_for_case(&self, case_id: Uuid) -> Result<Vec<SessionHistory>, Error> {
        let rows = sqlx::query_as::<_, SessionHistory>(
            r#"
            SELECT h.history_id, h.session_id, h.action, h.detail,
                   h.actor_user_id, h.created_at
            FROM session_history h
            JOIN sessions s ON s.session_id = h.session_id
            WHERE s.case_id = $1
            ORDER BY h.created_at DESC
            "#,
        )
            .bind(case_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }
}

/// Transaction-scoped operations. Append-only: there is deliberately no
/// update or delete here.
impl SessionHistoryRepository {
    pub async fn append(
        conn: &mut PgConnection,
        session_id: Uuid,
        actor_user_id: Uuid,
        detail: &HistoryDetail,
    ) -> Result<SessionHistory, Error> {
        let entry = SessionHistory::new(session_id, actor_user_id, detail)?;
        sqlx::query(
            r#"
            INSERT INTO session_history (
                history_id, session_id, action, detail, actor_user_id, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
            .bind(entry.history_id)
            .bind(entry.session_id)
            .bind(&entry.action)
            .bind(&entry.detail)
            .bind(entry.actor_user_id)
            .bind(entry.created_at)
            .execute(&mut *conn)
            .await?;
        Ok(entry)
    }
}
