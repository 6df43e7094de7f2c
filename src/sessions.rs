//! Session Triage Store
//!
//! A session is opened by a successful authentication and holds the review
//! ids the analyst has flagged for follow-up or marked resolved. Sessions
//! are dropped on logout or after sitting idle for the configured time.

use moka::future::Cache;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::auth::AuthenticatedUser;

const MAX_SESSIONS: u64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriageAction {
    Flag,
    Unflag,
    Resolve,
    Unresolve,
}

/// Point-in-time copy of one session's triage state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TriageSnapshot {
    pub user: String,
    pub role: String,
    pub flagged: Vec<String>,
    pub resolved: Vec<String>,
}

#[derive(Debug, Default)]
struct TriageSets {
    flagged: BTreeSet<String>,
    resolved: BTreeSet<String>,
}

#[derive(Debug)]
struct Session {
    user: AuthenticatedUser,
    triage: Mutex<TriageSets>,
}

impl Session {
    fn snapshot(&self) -> TriageSnapshot {
        let sets = self.triage.lock().unwrap_or_else(|e| e.into_inner());
        TriageSnapshot {
            user: self.user.user.clone(),
            role: self.user.role.clone(),
            flagged: sets.flagged.iter().cloned().collect(),
            resolved: sets.resolved.iter().cloned().collect(),
        }
    }
}

#[derive(Clone)]
pub struct SessionStore {
    sessions: Cache<String, Arc<Session>>,
}

impl SessionStore {
    pub fn new(idle_timeout: Duration) -> Self {
        let sessions = Cache::builder()
            .max_capacity(MAX_SESSIONS)
            .time_to_idle(idle_timeout)
            .build();
        Self { sessions }
    }

    /// Open a session for `user`, returning its id
    pub async fn start(&self, user: AuthenticatedUser) -> String {
        let id = hex::encode(rand::random::<[u8; 16]>());
        tracing::debug!("Session opened for '{}'", user.user);
        let session = Session {
            user,
            triage: Mutex::new(TriageSets::default()),
        };
        self.sessions.insert(id.clone(), Arc::new(session)).await;
        id
    }

    /// Close a session; `false` when it was unknown or already expired
    pub async fn end(&self, id: &str) -> bool {
        self.sessions.remove(id).await.is_some()
    }

    pub async fn snapshot(&self, id: &str) -> Option<TriageSnapshot> {
        self.sessions.get(id).await.map(|s| s.snapshot())
    }

    /// Apply `action` to `review_id` and return the updated state
    ///
    /// Flagged and resolved are independent; resolving does not unflag.
    pub async fn apply(&self, id: &str, action: TriageAction, review_id: &str) -> Option<TriageSnapshot> {
        let session = self.sessions.get(id).await?;
        {
            let mut sets = session.triage.lock().unwrap_or_else(|e| e.into_inner());
            let review_id = review_id.to_string();
            match action {
                TriageAction::Flag => {
                    sets.flagged.insert(review_id);
                }
                TriageAction::Unflag => {
                    sets.flagged.remove(&review_id);
                }
                TriageAction::Resolve => {
                    sets.resolved.insert(review_id);
                }
                TriageAction::Unresolve => {
                    sets.resolved.remove(&review_id);
                }
            }
        }
        Some(session.snapshot())
    }
}
