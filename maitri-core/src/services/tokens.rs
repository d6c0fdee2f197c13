// src/services/tokens.rs
//
// Sequential, year-prefixed human-readable identifiers. Queue tokens look
// like "680001" (2-digit academic-year prefix + 4-digit sequence); session
// tokens look like "680001-002" (queue token + 3-digit visit sequence).
//
// The read-max-then-increment here is only safe inside the caller's
// transaction together with the UNIQUE(queue_token) constraint; callers
// retry on unique violation (see CaseService::get_or_create_queue_token).

use chrono::{DateTime, Datelike, Utc};
use sqlx::PgConnection;
use uuid::Uuid;

use crate::Error;
use crate::repositories::postgres::CaseRepository;

/// Buddhist-calendar academic-year prefix. The academic year rolls over in
/// June; January through May still belong to the prior year.
pub fn academic_year_prefix(now: DateTime<Utc>) -> String {
    let mut year = now.year() + 543;
    if now.month0() < 5 {
        year -= 1;
    }
    format!("{:02}", year.rem_euclid(100))
}

/// Next sequence under a prefix given the current maximum token, or 1 when
/// the prefix is empty.
fn next_sequence(max_token: Option<&str>, prefix: &str) -> Result<u32, Error> {
    match max_token {
        None => Ok(1),
        Some(token) => {
            let digits = token.strip_prefix(prefix).ok_or_else(|| {
                Error::Internal(format!(
                    "queue token '{}' does not carry prefix '{}'",
                    token, prefix
                ))
            })?;
            let current: u32 = digits.parse().map_err(|_| {
                Error::Internal(format!("malformed queue token '{}'", token))
            })?;
            Ok(current + 1)
        }
    }
}

fn format_queue_token(prefix: &str, sequence: u32) -> Result<String, Error> {
    if sequence > 9999 {
        return Err(Error::Internal(format!(
            "queue token sequence exhausted for prefix '{}'",
            prefix
        )));
    }
    Ok(format!("{}{:04}", prefix, sequence))
}

/// Computes the next queue token for the current academic year. Must run in
/// the same transaction as the write that persists it.
pub async fn next_queue_token(
    conn: &mut PgConnection,
    now: DateTime<Utc>,
) -> Result<String, Error> {
    let prefix = academic_year_prefix(now);
    let max = CaseRepository::max_queue_token_with_prefix(conn, &prefix).await?;
    let sequence = next_sequence(max.as_deref(), &prefix)?;
    format_queue_token(&prefix, sequence)
}

/// Per-visit token for a session about to be attached to `case_id`. The
/// sequence is the count of sessions already on the case plus one, so it
/// must be computed before the new session is linked.
pub async fn next_session_token(
    conn: &mut PgConnection,
    case_id: Uuid,
    queue_token: &str,
) -> Result<String, Error> {
    let attached: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sessions WHERE case_id = $1",
    )
        .bind(case_id)
        .fetch_one(&mut *conn)
        .await?;
    Ok(format!("{}-{:03}", queue_token, attached + 1))
}
