// File: maitri-common/src/models/user.rs

use std::fmt;
use std::str::FromStr;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq, sqlx::Type)]
#[sqlx(type_name = "TEXT")]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Client,
    Counselor,
    Admin,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Client => write!(f, "client"),
            Role::Counselor => write!(f, "counselor"),
            Role::Admin => write!(f, "admin"),
        }
    }
}

impl FromStr for Role {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "client" => Ok(Role::Client),
            "counselor" => Ok(Role::Counselor),
            "admin" => Ok(Role::Admin),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, sqlx::FromRow)]
pub struct User {
    pub user_id: Uuid,
    pub username: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// The person seeking counseling (student/staff), distinct from a counselor.
#[derive(Debug, Serialize, Deserialize, Clone, sqlx::FromRow)]
pub struct Client {
    pub client_id: Uuid,
    pub user_id: Uuid,
    pub display_name: String,
    /// The client's current open case, if any. Maintained transactionally
    /// alongside case creation and cancellation.
    pub active_case_id: Option<Uuid>,
}

#[derive(Debug, Serialize, Deserialize, Clone, sqlx::FromRow)]
pub struct Counselor {
    pub counselor_id: Uuid,
    pub user_id: Uuid,
    pub display_name: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, sqlx::FromRow)]
pub struct Room {
    pub room_id: Uuid,
    pub name: String,
}

/// Request identity resolved by the auth layer before any core operation
/// runs. The core trusts it unconditionally.
#[derive(Debug, Clone)]
pub struct Actor {
    pub user_id: Uuid,
    pub role: Role,
    pub client_id: Option<Uuid>,
    pub counselor_id: Option<Uuid>,
}

impl Actor {
    pub fn client(user_id: Uuid, client_id: Uuid) -> Self {
        Self {
            user_id,
            role: Role::Client,
            client_id: Some(client_id),
            counselor_id: None,
        }
    }

    pub fn counselor(user_id: Uuid, counselor_id: Uuid) -> Self {
        Self {
            user_id,
            role: Role::Counselor,
            client_id: None,
            counselor_id: Some(counselor_id),
        }
    }
}
