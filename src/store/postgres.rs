use async_trait::async_trait;
use sqlx::PgPool;
use tracing::info;

use crate::models::session::SessionRecord;
use crate::models::user::{NewUser, User};
use crate::store::{
    ConflictField, CredentialStore, NewSession, RevocationLedger, SessionRegistry, StoreError,
    MAX_ACTIVE_SESSIONS,
};

const USER_COLUMNS: &str = "id, username, email, mobile_number, password_hash, created_at";
const SESSION_COLUMNS: &str =
    "id, user_id, token_id, device_info, origin_address, is_active, created_at, last_active";

#[derive(Clone)]
pub struct PgAuthStore {
    pool: PgPool,
}

impl PgAuthStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for PgAuthStore {
    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users \
             WHERE username = $1 OR email = $1 OR mobile_number = $1",
        ))
        .bind(identifier)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn find_by_id(&self, user_id: i64) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1",
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn create_user(&self, new_user: NewUser) -> Result<User, StoreError> {
        // Pre-check so the conflicting field can be named; the unique
        // constraints below catch the race where two registrations slip
        // past the check together.
        let existing = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users \
             WHERE username = $1 OR email = $2 OR mobile_number = $3 LIMIT 1",
        ))
        .bind(&new_user.username)
        .bind(&new_user.email)
        .bind(&new_user.mobile_number)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(existing) = existing {
            return Err(StoreError::Conflict(conflicting_field(&existing, &new_user)));
        }

        let user = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (username, email, mobile_number, password_hash) \
             VALUES ($1, $2, $3, $4) RETURNING {USER_COLUMNS}",
        ))
        .bind(&new_user.username)
        .bind(&new_user.email)
        .bind(&new_user.mobile_number)
        .bind(&new_user.password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(map_unique_violation)?;

        Ok(user)
    }
}

#[async_trait]
impl RevocationLedger for PgAuthStore {
    async fn is_revoked(&self, token_id: &str) -> Result<bool, StoreError> {
        let (revoked,): (bool,) = sqlx::query_as(
            "SELECT EXISTS (SELECT 1 FROM revoked_tokens WHERE token_id = $1)",
        )
        .bind(token_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(revoked)
    }

    async fn revoke(&self, token_id: &str, user_id: i64) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO revoked_tokens (token_id, user_id) VALUES ($1, $2) \
             ON CONFLICT (token_id) DO NOTHING",
        )
        .bind(token_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl SessionRegistry for PgAuthStore {
    async fn count_active(&self, user_id: i64) -> Result<i64, StoreError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM sessions WHERE user_id = $1 AND is_active")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }

    async fn find_oldest_active(
        &self,
        user_id: i64,
    ) -> Result<Option<SessionRecord>, StoreError> {
        let session = sqlx::query_as::<_, SessionRecord>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions \
             WHERE user_id = $1 AND is_active \
             ORDER BY last_active ASC, created_at ASC, id ASC LIMIT 1",
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(session)
    }

    async fn create_session(
        &self,
        new_session: NewSession<'_>,
    ) -> Result<SessionRecord, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Locking the user row serializes concurrent creates for this user;
        // locking the session rows alone would not cover a user with no
        // active sessions yet.
        sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(new_session.user_id)
            .fetch_optional(&mut *tx)
            .await?;

        let active = sqlx::query_as::<_, SessionRecord>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions \
             WHERE user_id = $1 AND is_active \
             ORDER BY last_active ASC, created_at ASC, id ASC",
        ))
        .bind(new_session.user_id)
        .fetch_all(&mut *tx)
        .await?;

        if active.len() as i64 >= MAX_ACTIVE_SESSIONS {
            let excess = active.len() as i64 - MAX_ACTIVE_SESSIONS + 1;
            for victim in active.iter().take(excess as usize) {
                sqlx::query(
                    "INSERT INTO revoked_tokens (token_id, user_id) VALUES ($1, $2) \
                     ON CONFLICT (token_id) DO NOTHING",
                )
                .bind(&victim.token_id)
                .bind(victim.user_id)
                .execute(&mut *tx)
                .await?;

                sqlx::query("UPDATE sessions SET is_active = FALSE WHERE id = $1")
                    .bind(victim.id)
                    .execute(&mut *tx)
                    .await?;

                info!(
                    user_id = victim.user_id,
                    session_id = victim.id,
                    "evicted least-recently-active session"
                );
            }
        }

        let session = sqlx::query_as::<_, SessionRecord>(&format!(
            "INSERT INTO sessions (user_id, token_id, device_info, origin_address) \
             VALUES ($1, $2, $3, $4) RETURNING {SESSION_COLUMNS}",
        ))
        .bind(new_session.user_id)
        .bind(new_session.token_id)
        .bind(new_session.device_info)
        .bind(new_session.origin_address)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(session)
    }

    async fn touch(&self, token_id: &str) -> Result<bool, StoreError> {
        // GREATEST keeps last_active monotonic under clock skew.
        let result = sqlx::query(
            "UPDATE sessions SET last_active = GREATEST(last_active, NOW()) \
             WHERE token_id = $1 AND is_active",
        )
        .bind(token_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn deactivate(&self, token_id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE sessions SET is_active = FALSE WHERE token_id = $1")
            .bind(token_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_active(&self, user_id: i64) -> Result<Vec<SessionRecord>, StoreError> {
        let sessions = sqlx::query_as::<_, SessionRecord>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions \
             WHERE user_id = $1 AND is_active ORDER BY last_active DESC",
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(sessions)
    }
}

fn conflicting_field(existing: &User, new_user: &NewUser) -> ConflictField {
    if existing.username == new_user.username {
        ConflictField::Username
    } else if existing.email == new_user.email {
        ConflictField::Email
    } else {
        ConflictField::MobileNumber
    }
}

fn map_unique_violation(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        match db_err.constraint() {
            Some("users_username_key") => return StoreError::Conflict(ConflictField::Username),
            Some("users_email_key") => return StoreError::Conflict(ConflictField::Email),
            Some("users_mobile_number_key") => {
                return StoreError::Conflict(ConflictField::MobileNumber)
            }
            _ => {}
        }
    }
    err.into()
}
