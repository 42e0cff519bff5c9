use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One login session, bound to exactly one token identifier. Rows are
/// deactivated on logout or eviction, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SessionRecord {
    pub id: i64,
    pub user_id: i64,
    pub token_id: String,
    pub device_info: Option<String>,
    pub origin_address: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

/// Append-only record of a revoked token identifier.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RevocationEntry {
    pub token_id: String,
    pub user_id: i64,
    pub revoked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub id: i64,
    pub device_info: Option<String>,
    pub origin_address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

impl From<SessionRecord> for SessionSummary {
    fn from(session: SessionRecord) -> Self {
        SessionSummary {
            id: session.id,
            device_info: session.device_info,
            origin_address: session.origin_address,
            created_at: session.created_at,
            last_active: session.last_active,
        }
    }
}
