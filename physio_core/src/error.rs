//! Error types for the physio_core library.

use std::io;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for physio_core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Catalog validation error
    #[error("Catalog validation error: {0}")]
    CatalogValidation(String),

    /// The requested exercise is not in the catalog
    #[error("Exercise not found: {0}")]
    ExerciseNotFound(String),

    /// No daily task with this id exists for the user
    #[error("Daily task not found: {0}")]
    TaskNotFound(String),

    /// Daily task has not reached its target yet
    #[error("Daily task {id} is at {progress}/{target}")]
    TaskIncomplete { id: String, progress: u32, target: u32 },

    /// Remote document store error
    #[error("Remote store error: {0}")]
    Remote(String),

    /// State management error
    #[error("State error: {0}")]
    State(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}
