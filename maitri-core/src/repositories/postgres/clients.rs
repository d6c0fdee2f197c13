// src/repositories/postgres/clients.rs

use maitri_common::models::Client;
use sqlx::{PgConnection, Pool, Postgres};
use uuid::Uuid;
use crate::Error;

#[async_trait::async_trait]
pub trait ClientRepo {
    async fn get(&self, client_id: Uuid) -> Result<Option<Client>, Error>;
    async fn get_by_user(&self, user_id: Uuid) -> Result<Option<Client>, Error>;
}

pub struct ClientRepository {
    pub pool: Pool<Postgres>,
}

impl ClientRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ClientRepo for ClientRepository {
    async fn get(&self, client_id: Uuid) -> Result<Option<Client>, Error> {
        let row = sqlx::query_as::<_, Client>(
            r#"
            SELECT client_id, user_id, display_name, active_case_id
            FROM clients
            WHERE client_id = $1
            "#,
        )
            .bind(client_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn get_by_user(&self, user_id: Uuid) -> Result<Option<Client>, Error> {
        let row = sqlx::query_as::<_, Client>(
            r#"
            SELECT client_id, user_id, display_name, active_case_id
            FROM clients
            WHERE user_id = $1
            "#,
        )
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }
}

/// Transaction-scoped operations.
impl ClientRepository {
    pub async fn get_tx(
        conn: &mut PgConnection,
        client_id: Uuid,
    ) -> Result<Option<Client>, Error> {
        let row = sqlx::query_as::<_, Client>(
            r#"
            SELECT client_id, user_id, display_name, active_case_id
            FROM clients
            WHERE client_id = $1
            "#,
        )
            .bind(client_id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(row)
    }

    /// Fetches the client row under FOR UPDATE. Concurrent transactions on
    /// the same client serialize here, which makes read-then-act checks
    /// against the client's bookings safe for the rest of the transaction.
    pub async fn lock_tx(
        conn: &mut PgConnection,
        client_id: Uuid,
    ) -> Result<Option<Client>, Error> {
        let row = sqlx::query_as::<_, Client>(
            r#"
            SELECT client_id, user_id, display_name, active_case_id
            FROM clients
            WHERE client_id = $1
            FOR UPDATE
            "#,
        )
            .bind(client_id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(row)
    }

    /// Points the client at its current open case (or clears the pointer).
    /// Updated in the same transaction as case creation/cancellation so the
    /// reference never dangles.
    pub async fn set_active_case(
        conn: &mut PgConnection,
        client_id: Uuid,
        case_id: Option<Uuid>,
    ) -> Result<(), Error> {
        sqlx::query("UPDATE clients SET active_case_id = $2 WHERE client_id = $1")
            .bind(client_id)
            .bind(case_id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }
}
