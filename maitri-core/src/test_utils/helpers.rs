// File: maitri-core/src/test_utils/helpers.rs

use std::sync::OnceLock;

use chrono::Utc;
use maitri_common::models::{Actor, Role};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Connection, PgConnection, Pool, Postgres};
use tokio::sync::{Mutex, MutexGuard};
use uuid::Uuid;
use crate::Error;
use crate::db::Database;

static DB_GATE: OnceLock<Mutex<()>> = OnceLock::new();

/// Integration tests share one database and truncate it on setup; hold this
/// guard for the duration of any test that touches the DB.
pub async fn db_gate() -> MutexGuard<'static, ()> {
    DB_GATE.get_or_init(|| Mutex::new(())).lock().await
}

/// Create the test database if it does not exist yet.
pub async fn ensure_test_database_exists() -> Result<(), Error> {
    let admin_url = std::env::var("DATABASE_ADMIN_URL")
        .unwrap_or_else(|_| "postgres://maitri@localhost/postgres".to_string());

    let mut conn = PgConnection::connect(&admin_url).await?;

    let test_db = "maitri_test";

    // `CREATE DATABASE IF NOT EXISTS` is non-standard; try and ignore the
    // duplicate_database error instead.
    let create_db_sql = format!("CREATE DATABASE {test_db};");
    if let Err(e) = sqlx::query(&create_db_sql).execute(&mut conn).await {
        match e.as_database_error().and_then(|db| db.code()) {
            Some(code) if code == "42P04" => {}
            _ => return Err(Error::Database(e)),
        }
    }

    Ok(())
}

/// Create a connection pool to the test DB.
/// By default looks for `TEST_DATABASE_URL` in env,
/// else uses `postgres://maitri@localhost/maitri_test`.
pub async fn create_test_db_pool() -> Result<Pool<Postgres>, Error> {
    let url = std::env::var("TEST_DATABASE_URL")
        .unwrap_or_else(|_| "postgres://maitri@localhost/maitri_test".to_string());

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await?;

    Ok(pool)
}

/// Wipes out test data so each test can start fresh.
pub async fn clean_database(pool: &Pool<Postgres>) -> Result<(), Error> {
    sqlx::query(r#"
        TRUNCATE TABLE
            session_history,
            session_problem_tags,
            problem_tags,
            sessions,
            cases,
            registration_codes,
            clients,
            rooms,
            counselors,
            users
        RESTART IDENTITY CASCADE;
    "#)
        .execute(pool)
        .await?;

    Ok(())
}

/// Returns a migrated, empty test DB handle.
pub async fn setup_test_database() -> Result<Database, Error> {
    ensure_test_database_exists().await?;

    let pool = create_test_db_pool().await?;
    let db = Database::from_pool(pool);
    db.migrate().await?;
    clean_database(db.pool()).await?;

    Ok(db)
}

/// Inserts a user + client profile pair; returns the acting identity.
pub async fn seed_client(db: &Database, name: &str) -> Result<Actor, Error> {
    let user_id = Uuid::new_v4();
    let client_id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO users (user_id, username, role, created_at) VALUES ($1, $2, $3, $4)",
    )
        .bind(user_id)
        .bind(name)
        .bind(Role::Client)
        .bind(Utc::now())
        .execute(db.pool())
        .await?;
    sqlx::query(
        "INSERT INTO clients (client_id, user_id, display_name) VALUES ($1, $2, $3)",
    )
        .bind(client_id)
        .bind(user_id)
        .bind(name)
        .execute(db.pool())
        .await?;
    Ok(Actor::client(user_id, client_id))
}

/// Inserts a user + counselor profile pair; returns the acting identity.
pub async fn seed_counselor(db: &Database, name: &str) -> Result<Actor, Error> {
    let user_id = Uuid::new_v4();
    let counselor_id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO users (user_id, username, role, created_at) VALUES ($1, $2, $3, $4)",
    )
        .bind(user_id)
        .bind(name)
        .bind(Role::Counselor)
        .bind(Utc::now())
        .execute(db.pool())
        .await?;
    sqlx::query(
        "INSERT INTO counselors (counselor_id, user_id, display_name) VALUES ($1, $2, $3)",
    )
        .bind(counselor_id)
        .bind(user_id)
        .bind(name)
        .execute(db.pool())
        .await?;
    Ok(Actor::counselor(user_id, counselor_id))
}

/// Inserts a room row.
pub async fn seed_room(db: &Database, name: &str) -> Result<Uuid, Error> {
    let room_id = Uuid::new_v4();
    sqlx::query("INSERT INTO rooms (room_id, name) VALUES ($1, $2)")
        .bind(room_id)
        .bind(name)
        .execute(db.pool())
        .await?;
    Ok(room_id)
}
