//! Patient and physiotherapist messaging.
//!
//! Messages are kept in a JSONL log next to the session log, folded so the
//! last line for an id wins, and mirrored into the remote `messages`
//! collection when a remote is configured. A conversation is identified by
//! its two participants, so both sides derive the same id.

use crate::lockfile::FileLock;
use crate::remote::{RemoteStore, MESSAGES_COLLECTION};
use crate::store::{append_jsonl, fold_latest, rewrite_jsonl};
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use uuid::Uuid;

const PHYSIOTHERAPIST_PREFIX: &str = "physiotherapist_";

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    #[default]
    Text,
    Image,
    Video,
    ExerciseReport,
    Audio,
}

impl MessageType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "text" => Some(Self::Text),
            "image" => Some(Self::Image),
            "video" => Some(Self::Video),
            "exercise_report" | "report" => Some(Self::ExerciseReport),
            "audio" => Some(Self::Audio),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: Uuid,
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
    #[serde(default)]
    pub message_type: MessageType,
    #[serde(default)]
    pub attachment_url: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub is_read: bool,
    pub conversation_id: String,
}

impl Message {
    pub fn new(
        sender_id: &str,
        receiver_id: &str,
        content: impl Into<String>,
        message_type: MessageType,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender_id: sender_id.into(),
            receiver_id: receiver_id.into(),
            content: content.into(),
            message_type,
            attachment_url: None,
            timestamp: at,
            is_read: false,
            conversation_id: conversation_id(sender_id, receiver_id),
        }
    }

    pub fn involves(&self, user_id: &str) -> bool {
        self.sender_id == user_id || self.receiver_id == user_id
    }

    /// The participant that is not `user_id`
    pub fn counterpart(&self, user_id: &str) -> &str {
        if self.sender_id == user_id {
            &self.receiver_id
        } else {
            &self.sender_id
        }
    }
}

/// Order-independent id for the conversation between two users
pub fn conversation_id(a: &str, b: &str) -> String {
    if a <= b {
        format!("{a}_{b}")
    } else {
        format!("{b}_{a}")
    }
}

/// Id of the physiotherapist assigned to a patient
pub fn physiotherapist_id(user_id: &str) -> String {
    let short: String = user_id.chars().take(8).collect();
    format!("{PHYSIOTHERAPIST_PREFIX}{short}")
}

/// Latest message of a conversation plus the unread count for one user
#[derive(Clone, Debug, PartialEq)]
pub struct ConversationSummary {
    pub conversation_id: String,
    pub with: String,
    pub last: Message,
    pub unread: usize,
}

/// JSONL message log guarded by a sidecar lock
pub struct JsonlMessageStore {
    path: PathBuf,
}

impl JsonlMessageStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Latest version of every message, in first-write order
    pub fn read_all(&self) -> Result<Vec<Message>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let _lock = FileLock::shared(&self.path)?;
        self.fold()
    }

    // Callers hold the sidecar lock.
    fn fold(&self) -> Result<Vec<Message>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        fold_latest(&File::open(&self.path)?, |m: &Message| m.id)
    }

    pub fn upsert(&self, message: &Message) -> Result<()> {
        let _lock = FileLock::exclusive(&self.path)?;
        append_jsonl(&self.path, message)?;
        tracing::debug!("Stored message {} in {}", message.id, message.conversation_id);
        Ok(())
    }

    pub fn get(&self, id: Uuid) -> Result<Option<Message>> {
        Ok(self.read_all()?.into_iter().find(|m| m.id == id))
    }

    /// Messages of a conversation, oldest first
    pub fn conversation(&self, conversation_id: &str) -> Result<Vec<Message>> {
        let mut messages: Vec<_> = self
            .read_all()?
            .into_iter()
            .filter(|m| m.conversation_id == conversation_id)
            .collect();
        messages.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(messages)
    }

    /// Messages sent or received by a user, newest first
    pub fn for_user(&self, user_id: &str) -> Result<Vec<Message>> {
        let mut messages: Vec<_> = self
            .read_all()?
            .into_iter()
            .filter(|m| m.involves(user_id))
            .collect();
        messages.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(messages)
    }

    /// One entry per conversation of a user, most recent activity first
    pub fn conversations(&self, user_id: &str) -> Result<Vec<ConversationSummary>> {
        let mut by_id: BTreeMap<String, ConversationSummary> = BTreeMap::new();
        // Newest first, so the first message seen is the last one sent
        for message in self.for_user(user_id)? {
            let unread = usize::from(message.receiver_id == user_id && !message.is_read);
            match by_id.get_mut(&message.conversation_id) {
                Some(summary) => summary.unread += unread,
                None => {
                    by_id.insert(
                        message.conversation_id.clone(),
                        ConversationSummary {
                            conversation_id: message.conversation_id.clone(),
                            with: message.counterpart(user_id).to_string(),
                            last: message,
                            unread,
                        },
                    );
                }
            }
        }

        let mut summaries: Vec<_> = by_id.into_values().collect();
        summaries.sort_by(|a, b| b.last.timestamp.cmp(&a.last.timestamp));
        Ok(summaries)
    }

    /// Messages addressed to `user_id` that have not been read
    pub fn unread_count(&self, user_id: &str) -> Result<usize> {
        Ok(self
            .read_all()?
            .iter()
            .filter(|m| m.receiver_id == user_id && !m.is_read)
            .count())
    }

    /// Mark every unread message addressed to `user_id` in a conversation as
    /// read. Messages the user sent are left alone.
    ///
    /// Returns the updated messages.
    pub fn mark_read(&self, conversation_id: &str, user_id: &str) -> Result<Vec<Message>> {
        let _lock = FileLock::exclusive(&self.path)?;
        let mut updated = Vec::new();
        for mut message in self.fold()? {
            if message.conversation_id == conversation_id
                && message.receiver_id == user_id
                && !message.is_read
            {
                message.is_read = true;
                append_jsonl(&self.path, &message)?;
                updated.push(message);
            }
        }
        tracing::debug!(
            "Marked {} messages read in {} for {}",
            updated.len(),
            conversation_id,
            user_id
        );
        Ok(updated)
    }

    /// Remove a message from the log. Returns `false` if it was not there.
    pub fn delete(&self, id: Uuid) -> Result<bool> {
        if !self.path.exists() {
            return Ok(false);
        }
        let _lock = FileLock::exclusive(&self.path)?;
        let messages = self.fold()?;
        let before = messages.len();
        let kept: Vec<_> = messages.into_iter().filter(|m| m.id != id).collect();
        if kept.len() == before {
            return Ok(false);
        }
        rewrite_jsonl(&self.path, &kept)?;
        tracing::info!("Deleted message {}", id);
        Ok(true)
    }
}

/// Local message log plus an optional remote mirror.
///
/// The local write decides success. Remote failures are logged and returned
/// as a warning string, the same way session saves report them.
pub struct Messenger {
    local: JsonlMessageStore,
    remote: Option<Box<dyn RemoteStore + Send>>,
}

impl Messenger {
    pub fn new(local: JsonlMessageStore) -> Self {
        Self {
            local,
            remote: None,
        }
    }

    pub fn with_remote(mut self, remote: impl RemoteStore + Send + 'static) -> Self {
        self.remote = Some(Box::new(remote));
        self
    }

    pub fn local(&self) -> &JsonlMessageStore {
        &self.local
    }

    pub fn send(&mut self, message: &Message) -> Result<Option<String>> {
        self.local.upsert(message)?;
        Ok(self.push(std::slice::from_ref(message)))
    }

    /// Mark a conversation read for `user_id` on both sides.
    ///
    /// Returns the number of messages updated and any remote warning.
    pub fn mark_read(
        &mut self,
        conversation_id: &str,
        user_id: &str,
    ) -> Result<(usize, Option<String>)> {
        let updated = self.local.mark_read(conversation_id, user_id)?;
        let warning = self.push(&updated);
        Ok((updated.len(), warning))
    }

    pub fn delete(&mut self, id: Uuid) -> Result<(bool, Option<String>)> {
        let deleted = self.local.delete(id)?;
        let warning = self.remote.as_mut().and_then(|remote| {
            remote
                .delete_document(MESSAGES_COLLECTION, &id.to_string())
                .err()
                .map(|e| {
                    tracing::warn!("Remote delete of message {} failed: {}", id, e);
                    format!("remote store: {e}")
                })
        });
        Ok((deleted, warning))
    }

    /// Copy remote messages involving `user_id` that are missing or stale
    /// locally. Returns the number of messages written.
    pub fn sync(&mut self, user_id: &str) -> Result<usize> {
        let Some(remote) = self.remote.as_ref() else {
            return Ok(0);
        };

        let local: BTreeMap<Uuid, Message> = self
            .local
            .read_all()?
            .into_iter()
            .map(|m| (m.id, m))
            .collect();

        let mut written = 0;
        for document in remote.list_documents(MESSAGES_COLLECTION)? {
            let message: Message = match serde_json::from_value(document) {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!("Skipping malformed remote message: {}", e);
                    continue;
                }
            };
            if !message.involves(user_id) || local.get(&message.id) == Some(&message) {
                continue;
            }
            self.local.upsert(&message)?;
            written += 1;
        }

        tracing::info!("Synced {} messages for {}", written, user_id);
        Ok(written)
    }

    fn push(&mut self, messages: &[Message]) -> Option<String> {
        let remote = self.remote.as_mut()?;
        let mut failures = Vec::new();
        for message in messages {
            let pushed = serde_json::to_value(message)
                .map_err(crate::Error::from)
                .and_then(|doc| {
                    remote.set_document(MESSAGES_COLLECTION, &message.id.to_string(), &doc)
                });
            if let Err(e) = pushed {
                tracing::warn!("Remote save of message {} failed: {}", message.id, e);
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
