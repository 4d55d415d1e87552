//! In-memory sessions, each behind its own mutex.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use super::model::{ReferenceNumber, SessionId, VerificationSession};

/// Handle to a single session. Holding the lock serializes operations on it.
pub type SessionHandle = Arc<Mutex<VerificationSession>>;

/// A session dropped by the sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiredSession {
    pub id: SessionId,
    pub reference_number: Option<ReferenceNumber>,
}

/// In-memory session registry.
///
/// The outer lock only guards the map; per-session work happens under the
/// session's own mutex so unrelated sessions never contend.
pub struct SessionStore {
    sessions: RwLock<HashMap<SessionId, SessionHandle>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Insert a fresh session and return its id.
    pub async fn create(&self) -> SessionId {
        let session = VerificationSession::new();
        let id = session.id;
        self.sessions
            .write()
            .await
            .insert(id, Arc::new(Mutex::new(session)));
        debug!(session_id = %id, "Session created");
        id
    }

    pub async fn get(&self, id: SessionId) -> Option<SessionHandle> {
        self.sessions.read().await.get(&id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Drop sessions idle longer than the TTL.
    ///
    /// Sessions currently locked by an in-flight operation are skipped.
    pub async fn sweep_expired(&self) -> Vec<ExpiredSession> {
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or_else(|_| chrono::Duration::weeks(5200));
        let cutoff = Utc::now() - ttl;

        let mut sessions = self.sessions.write().await;
        let mut expired = Vec::new();
        for (id, handle) in sessions.iter() {
            if let Ok(session) = handle.try_lock() {
                if session.updated_at < cutoff {
                    expired.push(ExpiredSession {
                        id: *id,
                        reference_number: session.reference_number.clone(),
                    });
                }
            }
        }
        for session in &expired {
            sessions.remove(&session.id);
        }

        if !expired.is_empty() {
            info!(count = expired.len(), "Expired idle sessions");
        }
        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_and_get() {
        let store = SessionStore::new(Duration::from_secs(60));
        assert!(store.is_empty().await);

        let id = store.create().await;
        let handle = store.get(id).await.expect("session should exist");
        assert_eq!(handle.lock().await.id, id);
        assert_eq!(store.len().await, 1);

        assert!(store.get(SessionId::new()).await.is_none());
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let store = SessionStore::new(Duration::from_secs(60));
        let a = store.create().await;
        let b = store.create().await;

        store.get(a).await.unwrap().lock().await.contact_email = Some("a@example.com".into());
        assert!(store.get(b).await.unwrap().lock().await.contact_email.is_none());
    }

    #[tokio::test]
    async fn sweep_removes_only_idle_sessions() {
        let store = SessionStore::new(Duration::from_secs(3600));
        let stale = store.create().await;
        let fresh = store.create().await;

        store.get(stale).await.unwrap().lock().await.updated_at =
            Utc::now() - chrono::Duration::hours(2);

        let removed = store.sweep_expired().await;
        assert_eq!(
            removed,
            vec![ExpiredSession {
                id: stale,
                reference_number: None
            }]
        );
        assert!(store.get(stale).await.is_none());
        assert!(store.get(fresh).await.is_some());
    }

    #[tokio::test]
    async fn sweep_skips_locked_sessions() {
        let store = SessionStore::new(Duration::from_secs(1));
        let id = store.create().await;
        let handle = store.get(id).await.unwrap();
        let mut guard = handle.lock().await;
        guard.updated_at = Utc::now() - chrono::Duration::hours(1);

        assert!(store.sweep_expired().await.is_empty());
        drop(guard);
        let removed = store.sweep_expired().await;
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].id, id);
    }
}
