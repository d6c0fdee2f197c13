// src/repositories/postgres/cases.rs

use chrono::{DateTime, Utc};
use maitri_common::models::{Case, CaseStatus};
use sqlx::{PgConnection, Pool, Postgres};
use uuid::Uuid;
use crate::Error;

const CASE_COLUMNS: &str = r#"
    case_id, client_id, counselor_id, status, queue_token,
    priority, confirmed_at, waiting_since, created_at
"#;

#[async_trait::async_trait]
pub trait CaseRepo {
    async fn get(&self, case_id: Uuid) -> Result<Option<Case>, Error>;
    async fn list_for_client(&self, client_id: Uuid) -> Result<Vec<Case>, Error>;
}

pub struct CaseRepository {
    pub pool: Pool<Postgres>,
}

impl CaseRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl CaseRepo for CaseRepository {
    async fn get(&self, case_id: Uuid) -> Result<Option<Case>, Error> {
        let row = sqlx::query_as::<_, Case>(&format!(
            "SELECT {CASE_COLUMNS} FROM cases WHERE case_id = $1"
        ))
            .bind(case_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn list_for_client(&self, client_id: Uuid) -> Result<Vec<Case>, Error> {
        let rows = sqlx::query_as::<_, Case>(&format!(
            r#"
            SELECT {CASE_COLUMNS}
            FROM cases
            WHERE client_id = $1
            ORDER BY created_at DESC
            "#
        ))
            .bind(client_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }
}

/// Transaction-scoped operations.
impl CaseRepository {
    pub async fn insert(conn: &mut PgConnection, case: &Case) -> Result<(), Error> {
        sqlx::query(
            r#"
            INSERT INTO cases (
                case_id, client_id, counselor_id, status, queue_token,
                priority, confirmed_at, waiting_since, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
            .bind(case.case_id)
            .bind(case.client_id)
            .bind(case.counselor_id)
            .bind(case.status)
            .bind(&case.queue_token)
            .bind(case.priority)
            .bind(case.confirmed_at)
            .bind(case.waiting_since)
            .bind(case.created_at)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    pub async fn get_tx(
        conn: &mut PgConnection,
        case_id: Uuid,
    ) -> Result<Option<Case>, Error> {
        let row = sqlx::query_as::<_, Case>(&format!(
            "SELECT {CASE_COLUMNS} FROM cases WHERE case_id = $1"
        ))
            .bind(case_id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(row)
    }

    pub async fn set_status(
        conn: &mut PgConnection,
        case_id: Uuid,
        status: CaseStatus,
    ) -> Result<(), Error> {
        sqlx::query("UPDATE cases SET status = $2 WHERE case_id = $1")
            .bind(case_id)
            .bind(status)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// Stamps confirmed_at only if it is not already set; repeated
    /// confirmations keep the original timestamp.
    pub async fn set_confirmed_at_once(
        conn: &mut PgConnection,
        case_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), Error> {
        sqlx::query(
            r#"
            UPDATE cases
            SET confirmed_at = $2
            WHERE case_id = $1 AND confirmed_at IS NULL
            "#,
        )
            .bind(case_id)
            .bind(at)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    pub async fn set_queue_token(
        conn: &mut PgConnection,
        case_id: Uuid,
        token: &str,
    ) -> Result<(), Error> {
        sqlx::query("UPDATE cases SET queue_token = $2 WHERE case_id = $1")
            .bind(case_id)
            .bind(token)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// Greatest queue token under the given academic-year prefix, if any.
    /// Runs inside the caller's transaction so the subsequent insert and this
    /// read share one isolation boundary.
    pub async fn max_queue_token_with_prefix(
        conn: &mut PgConnection,
        prefix: &str,
    ) -> Result<Option<String>, Error> {
        let row: Option<String> = sqlx::query_scalar(
            r#"
            SELECT MAX(queue_token)
            FROM cases
            WHERE queue_token LIKE $1 || '%'
            "#,
        )
            .bind(prefix)
            .fetch_one(&mut *conn)
            .await?;
        Ok(row)
    }
}
