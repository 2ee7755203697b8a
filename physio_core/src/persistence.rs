//! Bridge between a running session and its stores.
//!
//! The same payload goes to the local store and, when configured, to the
//! remote store. The two writes are independent: a failure on one side does
//! not stop the other, and nothing reconciles them afterwards.

use crate::remote::{RemoteStore, SESSIONS_COLLECTION};
use crate::store::SessionStore;
use crate::ExerciseSession;

pub struct SessionPersistence {
    local: Box<dyn SessionStore + Send>,
    remote: Option<Box<dyn RemoteStore + Send>>,
}

impl SessionPersistence {
    pub fn new(local: impl SessionStore + Send + 'static) -> Self {
        Self {
            local: Box::new(local),
            remote: None,
        }
    }

    pub fn with_remote(mut self, remote: impl RemoteStore + Send + 'static) -> Self {
        self.remote = Some(Box::new(remote));
        self
    }

    pub fn local(&self) -> &dyn SessionStore {
        self.local.as_ref()
    }

    /// Write the session everywhere.
    ///
    /// Returns a human-readable description of what failed, if anything.
    pub fn save(&mut self, session: &ExerciseSession) -> Option<String> {
        let mut failures = Vec::new();

        if let Err(e) = self.local.upsert(session) {
            tracing::warn!("Local save of session {} failed: {}", session.id, e);
            failures.push(format!("local store: {e}"));
        }

        if let Some(remote) = self.remote.as_mut() {
            let pushed = serde_json::to_value(session)
                .map_err(crate::Error::from)
                .and_then(|doc| {
                    remote.set_document(SESSIONS_COLLECTION, &session.id.to_string(), &doc)
                });
            if let Err(e) = pushed {
                tracing::warn!("Remote save of session {} failed: {}", session.id, e);
                failures.push(format!("remote store: {e}"));
            }
        }

        if failures.is_empty() {
            None
        } else {
            Some(failures.join("; "))
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::remote::DirDocumentStore;
    use crate::store::JsonlSessionStore;
    use crate::{Error, Result};
    use chrono::Utc;
    use serde_json::Value;

    /// Remote that is always offline
    pub(crate) struct OfflineRemote;

    impl RemoteStore for OfflineRemote {
        fn set_document(&mut self, _: &str, _: &str, _: &Value) -> Result<()> {
            Err(Error::Remote("backend unreachable".into()))
        }

        fn get_document(&self, _: &str, _: &str) -> Result<Option<Value>> {
            Err(Error::Remote("backend unreachable".into()))
        }

        fn list_documents(&self, _: &str) -> Result<Vec<Value>> {
            Err(Error::Remote("backend unreachable".into()))
        }

        fn delete_document(&mut self, _: &str, _: &str) -> Result<bool> {
            Err(Error::Remote("backend unreachable".into()))
        }
    }

    #[test]
    fn test_start_then_completion_overwrites_both_stores() {
        let temp_dir = tempfile::tempdir().unwrap();
        let local_path = temp_dir.path().join("sessions.jsonl");
        let remote_root = temp_dir.path().join("remote");

        let mut persistence = SessionPersistence::new(JsonlSessionStore::new(&local_path))
            .with_remote(DirDocumentStore::new(&remote_root));

        let started = ExerciseSession::begin("u1", "chin_tuck", Utc::now());
        assert_eq!(persistence.save(&started), None);

        let mut finished = started.clone();
        finished.completed = true;
        finished.completed_sets = 2;
        finished.points_earned = 5;
        finished.end_time = Some(Utc::now());
        assert_eq!(persistence.save(&finished), None);

        let local = persistence.local().get(started.id).unwrap().unwrap();
        assert_eq!(local, finished);

        let remote = DirDocumentStore::new(&remote_root)
            .get_document(SESSIONS_COLLECTION, &started.id.to_string())
            .unwrap()
            .unwrap();
        let remote: ExerciseSession = serde_json::from_value(remote).unwrap();
        assert_eq!(remote, finished);
    }

    #[test]
    fn test_remote_failure_does_not_block_local() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut persistence =
            SessionPersistence::new(JsonlSessionStore::new(temp_dir.path().join("s.jsonl")))
                .with_remote(OfflineRemote);

        let session = ExerciseSession::begin("u1", "chin_tuck", Utc::now());
        let error = persistence.save(&session).unwrap();
        assert!(error.contains("remote store"));
        assert!(error.contains("backend unreachable"));
        assert!(!error.contains("local store"));

        assert!(persistence.local().get(session.id).unwrap().is_some());
    }
}
