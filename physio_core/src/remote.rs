//! Remote document store port.
//!
//! The backend is modelled as named collections of JSON documents keyed by
//! id. Writes overwrite the whole document; there is no conflict resolution.
//! [`DirDocumentStore`] keeps one file per document and is what the CLI uses
//! as a stand-in for a hosted backend (e.g. a synced folder).

use crate::{Error, Result, UserProfile};
use serde_json::Value;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

pub const SESSIONS_COLLECTION: &str = "exercise_sessions";
pub const USERS_COLLECTION: &str = "users";
pub const MESSAGES_COLLECTION: &str = "messages";

/// Remote persistence port
pub trait RemoteStore {
    fn set_document(&mut self, collection: &str, id: &str, document: &Value) -> Result<()>;

    fn get_document(&self, collection: &str, id: &str) -> Result<Option<Value>>;

    /// Every document in a collection, ordered by id
    fn list_documents(&self, collection: &str) -> Result<Vec<Value>>;

    /// Remove a document. Returns `false` if it did not exist.
    fn delete_document(&mut self, collection: &str, id: &str) -> Result<bool>;
}

/// Directory-backed document store: `<root>/<collection>/<id>.json`
pub struct DirDocumentStore {
    root: PathBuf,
}

impl DirDocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn document_path(&self, collection: &str, id: &str) -> Result<PathBuf> {
        validate_key(collection)?;
        validate_key(id)?;
        Ok(self.root.join(collection).join(format!("{id}.json")))
    }
}

/// Keys become path components, so only plain names are allowed
fn validate_key(key: &str) -> Result<()> {
    let valid = !key.is_empty()
        && !key.starts_with('.')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.');
    if valid {
        Ok(())
    } else {
        Err(Error::Remote(format!("invalid document key '{key}'")))
    }
}

impl RemoteStore for DirDocumentStore {
    fn set_document(&mut self, collection: &str, id: &str, document: &Value) -> Result<()> {
        let path = self.document_path(collection, id)?;
        let dir = self.root.join(collection);
        std::fs::create_dir_all(&dir)?;

        let mut temp = NamedTempFile::new_in(&dir)?;
        serde_json::to_writer_pretty(&mut temp, document)?;
        temp.write_all(b"\n")?;
        temp.as_file().sync_all()?;
        temp.persist(&path).map_err(|e| Error::Io(e.error))?;

        tracing::debug!("Wrote remote document {}/{}", collection, id);
        Ok(())
    }

    fn get_document(&self, collection: &str, id: &str) -> Result<Option<Value>> {
        let path = self.document_path(collection, id)?;
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    fn list_documents(&self, collection: &str) -> Result<Vec<Value>> {
        validate_key(collection)?;
        let dir = self.root.join(collection);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut paths: Vec<PathBuf> = std::fs::read_dir(&dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        let mut documents = Vec::with_capacity(paths.len());
        for path in paths {
            let parsed = std::fs::read_to_string(&path)
                .map_err(Error::from)
                .and_then(|c| serde_json::from_str(&c).map_err(Error::from));
            match parsed {
                Ok(doc) => documents.push(doc),
                Err(e) => tracing::warn!("Skipping unreadable document {:?}: {}", path, e),
            }
        }
        Ok(documents)
    }

    fn delete_document(&mut self, collection: &str, id: &str) -> Result<bool> {
        let path = self.document_path(collection, id)?;
        match std::fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!("Deleted remote document {}/{}", collection, id);
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Publish a user's profile so other devices can rank it
pub fn push_profile(remote: &mut dyn RemoteStore, profile: &UserProfile) -> Result<()> {
    let document = serde_json::to_value(profile)?;
    remote.set_document(USERS_COLLECTION, &profile.user_id, &document)
}

/// Every profile published to the remote, skipping malformed documents
pub fn pull_profiles(remote: &dyn RemoteStore) -> Result<Vec<UserProfile>> {
    let profiles = remote
        .list_documents(USERS_COLLECTION)?
        .into_iter()
        .filter_map(|doc| match serde_json::from_value(doc) {
            Ok(profile) => Some(profile),
            Err(e) => {
                tracing::warn!("Skipping malformed remote profile: {}", e);
                None
            }
        })
        .collect();
    Ok(profiles)
}
