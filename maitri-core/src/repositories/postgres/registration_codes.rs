// src/repositories/postgres/registration_codes.rs

use chrono::{DateTime, Utc};
use maitri_common::models::RegistrationCode;
use sqlx::{PgConnection, Pool, Postgres};
use uuid::Uuid;
use crate::Error;

#[async_trait::async_trait]
pub trait RegistrationCodeRepo {
    async fn create(&self, code: &RegistrationCode) -> Result<(), Error>;
    async fn get(&self, code: &str) -> Result<Option<RegistrationCode>, Error>;
}

pub struct RegistrationCodeRepository {
    pub pool: Pool<Postgres>,
}

impl RegistrationCodeRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl RegistrationCodeRepo for RegistrationCodeRepository {
    async fn create(&self, code: &RegistrationCode) -> Result<(), Error> {
        sqlx::query(
            r#"
            INSERT INTO registration_codes (code, created_at, used_at, used_by)
            VALUES ($1, $2, $3, $4)
            "#,
        )
            .bind(&code.code)
            .bind(code.created_at)
            .bind(code.used_at)
            .bind(code.used_by)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get(&self, code: &str) -> Result<Option<RegistrationCode>, Error> {
        let row = sqlx::query_as::<_, RegistrationCode>(
            r#"
            SELECT code, created_at, used_at, used_by
            FROM registration_codes
            WHERE code = $1
            "#,
        )
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }
}

/// Transaction-scoped operations.
impl RegistrationCodeRepository {
    pub async fn get_tx(
        conn: &mut PgConnection,
        code: &str,
    ) -> Result<Option<RegistrationCode>, Error> {
        let row = sqlx::query_as::<_, RegistrationCode>(
            r#"
            SELECT code, created_at, used_at, used_by
            FROM registration_codes
            WHERE code = $1
            "#,
        )
            .bind(code)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(row)
    }

    /// Conditionally marks the code used. The `used_at IS NULL` predicate is
    /// the exactly-once guard: of two concurrent redemptions, only one UPDATE
    /// affects a row.
    pub async fn mark_used(
        conn: &mut PgConnection,
        code: &str,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool, Error> {
        let result = sqlx::query(
            r#"
            UPDATE registration_codes
            SET used_at = $3, used_by = $2
            WHERE code = $1 AND used_at IS NULL
            "#,
        )
            .bind(code)
            .bind(user_id)
            .bind(at)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected() == 1)
    }
}
