use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "session_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    Admin,
    Member,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "admin_role", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AdminRole {
    Owner,
    Staff,
}

/// Bearer session written by the admin and LINE login adapters.
#[derive(Debug, Clone, FromRow)]
pub struct ApiSession {
    pub token_hash: String,
    pub kind: SessionKind,
    pub subject_id: Uuid,
    pub role: Option<AdminRole>,
    pub expires_at: DateTime<Utc>,
}
