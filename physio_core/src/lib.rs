#![forbid(unsafe_code)]

//! Core domain model and business logic for the Physio exercise tracker.
//!
//! This crate provides:
//! - Domain types (exercises, sessions, profiles, achievements, tasks)
//! - Catalog management
//! - The session state machine and its async timer driver
//! - Persistence (local JSONL log, remote document store, profiles)
//! - Scoring, gamification and statistics
//! - Messaging between patients and their physiotherapist

pub mod types;
pub mod error;
pub mod catalog;
pub mod config;
pub mod logging;
pub mod scoring;
pub mod machine;
pub mod driver;
pub mod lockfile;
pub mod store;
pub mod remote;
pub mod persistence;
pub mod messages;
pub mod gamification;
pub mod stats;
pub mod export;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use catalog::{build_default_catalog, get_default_catalog, Catalog};
pub use config::Config;
pub use machine::{ActiveTimer, SessionMachine, SessionPhase, SessionSnapshot};
pub use driver::{spawn_session, start_session, SessionCommand, SessionHandle, SessionTiming};
pub use store::{JsonlSessionStore, SessionStore};
pub use remote::{DirDocumentStore, RemoteStore};
pub use persistence::SessionPersistence;
pub use messages::{JsonlMessageStore, Message, MessageType, Messenger};
pub use gamification::{rank_profiles, PlayerRecord, ProfileBook, SessionReward};
pub use stats::{user_stats, UserStats};
pub use export::export_csv;
