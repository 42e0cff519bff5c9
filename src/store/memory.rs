//! In-memory store backend for tests. One mutex guards the whole state, so
//! every operation, including the count-check + evict + insert sequence, is
//! atomic, mirroring the transactional guarantees of the Postgres backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::models::session::{RevocationEntry, SessionRecord};
use crate::models::user::{NewUser, User};
use crate::store::{
    ConflictField, CredentialStore, NewSession, RevocationLedger, SessionRegistry, StoreError,
    MAX_ACTIVE_SESSIONS,
};

#[derive(Default)]
struct State {
    users: Vec<User>,
    sessions: Vec<SessionRecord>,
    revoked: HashMap<String, RevocationEntry>,
    next_user_id: i64,
    next_session_id: i64,
}

pub struct MemoryAuthStore {
    state: Mutex<State>,
    fail_revocations: AtomicBool,
}

impl MemoryAuthStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                next_user_id: 1,
                next_session_id: 1,
                ..State::default()
            }),
            fail_revocations: AtomicBool::new(false),
        }
    }

    /// Make every revocation write fail, for fail-closed tests.
    pub fn fail_revocations(&self, fail: bool) {
        self.fail_revocations.store(fail, Ordering::SeqCst);
    }

    /// Pin a session's timestamps, for eviction-ordering tests.
    pub fn set_session_times(
        &self,
        session_id: i64,
        created_at: DateTime<Utc>,
        last_active: DateTime<Utc>,
    ) {
        let mut state = self.state.lock().unwrap();
        let session = state
            .sessions
            .iter_mut()
            .find(|s| s.id == session_id)
            .expect("unknown session id");
        session.created_at = created_at;
        session.last_active = last_active;
    }

    fn revocation_sink_ok(&self) -> Result<(), StoreError> {
        if self.fail_revocations.load(Ordering::SeqCst) {
            return Err(StoreError::Storage("revocation ledger unavailable".to_string()));
        }
        Ok(())
    }
}

impl Default for MemoryAuthStore {
    fn default() -> Self {
        Self::new()
    }
}

fn oldest_active(sessions: &[SessionRecord], user_id: i64) -> Option<&SessionRecord> {
    sessions
        .iter()
        .filter(|s| s.user_id == user_id && s.is_active)
        .min_by_key(|s| (s.last_active, s.created_at, s.id))
}

#[async_trait]
impl CredentialStore for MemoryAuthStore {
    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<User>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .users
            .iter()
            .find(|u| {
                u.username == identifier || u.email == identifier || u.mobile_number == identifier
            })
            .cloned())
    }

    async fn find_by_id(&self, user_id: i64) -> Result<Option<User>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state.users.iter().find(|u| u.id == user_id).cloned())
    }

    async fn create_user(&self, new_user: NewUser) -> Result<User, StoreError> {
        let mut state = self.state.lock().unwrap();

        for existing in &state.users {
            if existing.username == new_user.username {
                return Err(StoreError::Conflict(ConflictField::Username));
            }
            if existing.email == new_user.email {
                return Err(StoreError::Conflict(ConflictField::Email));
            }
            if existing.mobile_number == new_user.mobile_number {
                return Err(StoreError::Conflict(ConflictField::MobileNumber));
            }
        }

        let user = User {
            id: state.next_user_id,
            username: new_user.username,
            email: new_user.email,
            mobile_number: new_user.mobile_number,
            password_hash: new_user.password_hash,
            created_at: Utc::now(),
        };
        state.next_user_id += 1;
        state.users.push(user.clone());

        Ok(user)
    }
}

#[async_trait]
impl RevocationLedger for MemoryAuthStore {
    async fn is_revoked(&self, token_id: &str) -> Result<bool, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state.revoked.contains_key(token_id))
    }

    async fn revoke(&self, token_id: &str, user_id: i64) -> Result<(), StoreError> {
        self.revocation_sink_ok()?;

        let mut state = self.state.lock().unwrap();
        state
            .revoked
            .entry(token_id.to_string())
            .or_insert_with(|| RevocationEntry {
                token_id: token_id.to_string(),
                user_id,
                revoked_at: Utc::now(),
            });

        Ok(())
    }
}

#[async_trait]
impl SessionRegistry for MemoryAuthStore {
    async fn count_active(&self, user_id: i64) -> Result<i64, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .sessions
            .iter()
            .filter(|s| s.user_id == user_id && s.is_active)
            .count() as i64)
    }

    async fn find_oldest_active(
        &self,
        user_id: i64,
    ) -> Result<Option<SessionRecord>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(oldest_active(&state.sessions, user_id).cloned())
    }

    async fn create_session(
        &self,
        new_session: NewSession<'_>,
    ) -> Result<SessionRecord, StoreError> {
        let mut state = self.state.lock().unwrap();

        loop {
            let active = state
                .sessions
                .iter()
                .filter(|s| s.user_id == new_session.user_id && s.is_active)
                .count() as i64;
            if active < MAX_ACTIVE_SESSIONS {
                break;
            }

            self.revocation_sink_ok()?;
            let victim = oldest_active(&state.sessions, new_session.user_id)
                .map(|s| (s.id, s.token_id.clone()))
                .expect("active count positive but no oldest session");

            state
                .revoked
                .entry(victim.1.clone())
                .or_insert_with(|| RevocationEntry {
                    token_id: victim.1,
                    user_id: new_session.user_id,
                    revoked_at: Utc::now(),
                });
            let session = state
                .sessions
                .iter_mut()
                .find(|s| s.id == victim.0)
                .expect("victim session disappeared");
            session.is_active = false;
        }

        let now = Utc::now();
        let session = SessionRecord {
            id: state.next_session_id,
            user_id: new_session.user_id,
            token_id: new_session.token_id.to_string(),
            device_info: new_session.device_info.map(str::to_string),
            origin_address: new_session.origin_address.map(str::to_string),
            is_active: true,
            created_at: now,
            last_active: now,
        };
        state.next_session_id += 1;
        state.sessions.push(session.clone());

        Ok(session)
    }

    async fn touch(&self, token_id: &str) -> Result<bool, StoreError> {
        let mut state = self.state.lock().unwrap();
        let now = Utc::now();
        match state
            .sessions
            .iter_mut()
            .find(|s| s.token_id == token_id && s.is_active)
        {
            Some(session) => {
                session.last_active = session.last_active.max(now);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn deactivate(&self, token_id: &str) -> Result<bool, StoreError> {
        let mut state = self.state.lock().unwrap();
        match state.sessions.iter_mut().find(|s| s.token_id == token_id) {
            Some(session) => {
                session.is_active = false;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_active(&self, user_id: i64) -> Result<Vec<SessionRecord>, StoreError> {
        let state = self.state.lock().unwrap();
        let mut sessions: Vec<SessionRecord> = state
            .sessions
            .iter()
            .filter(|s| s.user_id == user_id && s.is_active)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.last_active.cmp(&a.last_active));
        Ok(sessions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn new_session(user_id: i64, token_id: &str) -> NewSession<'_> {
        NewSession {
            user_id,
            token_id,
            device_info: Some("test-device"),
            origin_address: Some("127.0.0.1"),
        }
    }

    #[tokio::test]
    async fn unknown_token_is_not_revoked() {
        let store = MemoryAuthStore::new();
        assert!(!store.is_revoked("nope").await.unwrap());
    }

    #[tokio::test]
    async fn revoke_is_idempotent() {
        let store = MemoryAuthStore::new();
        store.revoke("t1", 1).await.unwrap();
        store.revoke("t1", 7).await.unwrap();
        assert!(store.is_revoked("t1").await.unwrap());

        let state = store.state.lock().unwrap();
        assert_eq!(state.revoked.len(), 1);
        let entry = &state.revoked["t1"];
        // The first revocation wins; the duplicate changes nothing.
        assert_eq!(entry.user_id, 1);
        assert_eq!(entry.token_id, "t1");
        assert!(entry.revoked_at <= Utc::now());
    }

    #[tokio::test]
    async fn cap_is_enforced_with_eviction() {
        let store = MemoryAuthStore::new();
        let s1 = store.create_session(new_session(1, "t1")).await.unwrap();
        store.create_session(new_session(1, "t2")).await.unwrap();
        assert_eq!(store.count_active(1).await.unwrap(), 2);

        store.create_session(new_session(1, "t3")).await.unwrap();
        assert_eq!(store.count_active(1).await.unwrap(), 2);

        // The first session was least recently active.
        assert!(store.is_revoked(&s1.token_id).await.unwrap());
        let active = store.list_active(1).await.unwrap();
        assert!(active.iter().all(|s| s.id != s1.id));
    }

    #[tokio::test]
    async fn eviction_prefers_smallest_last_active() {
        let store = MemoryAuthStore::new();
        let s1 = store.create_session(new_session(1, "t1")).await.unwrap();
        let s2 = store.create_session(new_session(1, "t2")).await.unwrap();

        let base = Utc::now();
        // s2 is older by last-active even though it was created later.
        store.set_session_times(s1.id, base, base);
        store.set_session_times(s2.id, base, base - Duration::minutes(10));

        let oldest = store.find_oldest_active(1).await.unwrap().unwrap();
        assert_eq!(oldest.id, s2.id);

        store.create_session(new_session(1, "t3")).await.unwrap();
        assert!(store.is_revoked("t2").await.unwrap());
        assert!(!store.is_revoked("t1").await.unwrap());
        assert!(store.find_oldest_active(2).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn eviction_ties_break_on_created_then_id() {
        let store = MemoryAuthStore::new();
        let s1 = store.create_session(new_session(1, "t1")).await.unwrap();
        let s2 = store.create_session(new_session(1, "t2")).await.unwrap();

        let base = Utc::now();
        store.set_session_times(s1.id, base - Duration::minutes(5), base);
        store.set_session_times(s2.id, base, base);

        // Identical last_active; s1 was created earlier.
        store.create_session(new_session(1, "t3")).await.unwrap();
        assert!(store.is_revoked("t1").await.unwrap());

        // Fully identical timestamps: the lower id goes.
        let store = MemoryAuthStore::new();
        let s1 = store.create_session(new_session(1, "t1")).await.unwrap();
        let s2 = store.create_session(new_session(1, "t2")).await.unwrap();
        store.set_session_times(s1.id, base, base);
        store.set_session_times(s2.id, base, base);

        store.create_session(new_session(1, "t3")).await.unwrap();
        assert!(store.is_revoked("t1").await.unwrap());
        assert!(!store.is_revoked("t2").await.unwrap());
    }

    #[tokio::test]
    async fn touch_is_monotonic_and_advisory() {
        let store = MemoryAuthStore::new();
        let s1 = store.create_session(new_session(1, "t1")).await.unwrap();

        let future = Utc::now() + Duration::minutes(5);
        store.set_session_times(s1.id, s1.created_at, future);
        assert!(store.touch("t1").await.unwrap());
        let listed = store.list_active(1).await.unwrap();
        assert_eq!(listed[0].last_active, future);

        assert!(!store.touch("unknown-token").await.unwrap());

        store.deactivate("t1").await.unwrap();
        assert!(!store.touch("t1").await.unwrap());
    }

    #[tokio::test]
    async fn deactivate_is_idempotent() {
        let store = MemoryAuthStore::new();
        store.create_session(new_session(1, "t1")).await.unwrap();

        assert!(store.deactivate("t1").await.unwrap());
        assert!(store.deactivate("t1").await.unwrap());
        assert!(!store.deactivate("never-existed").await.unwrap());
        assert_eq!(store.count_active(1).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn list_active_orders_most_recent_first() {
        let store = MemoryAuthStore::new();
        let s1 = store.create_session(new_session(1, "t1")).await.unwrap();
        let s2 = store.create_session(new_session(1, "t2")).await.unwrap();

        let base = Utc::now();
        store.set_session_times(s1.id, base, base);
        store.set_session_times(s2.id, base, base - Duration::minutes(1));

        let listed = store.list_active(1).await.unwrap();
        assert_eq!(listed[0].id, s1.id);
        assert_eq!(listed[1].id, s2.id);
    }

    #[tokio::test]
    async fn per_field_conflicts_are_reported() {
        let store = MemoryAuthStore::new();
        let base = NewUser {
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            mobile_number: "12025550143".to_string(),
            password_hash: "hash".to_string(),
        };
        store.create_user(base.clone()).await.unwrap();

        let mut same_username = base.clone();
        same_username.email = "other@example.com".to_string();
        same_username.mobile_number = "12025550144".to_string();
        assert!(matches!(
            store.create_user(same_username).await,
            Err(StoreError::Conflict(ConflictField::Username))
        ));

        let mut same_email = base.clone();
        same_email.username = "bob".to_string();
        same_email.mobile_number = "12025550144".to_string();
        assert!(matches!(
            store.create_user(same_email).await,
            Err(StoreError::Conflict(ConflictField::Email))
        ));

        let mut same_mobile = base;
        same_mobile.username = "bob".to_string();
        same_mobile.email = "bob@example.com".to_string();
        assert!(matches!(
            store.create_user(same_mobile).await,
            Err(StoreError::Conflict(ConflictField::MobileNumber))
        ));
    }
}
