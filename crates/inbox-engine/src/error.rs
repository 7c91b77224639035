//! Error types for the inbox engine.
//!
//! Validation problems and permission failures are surfaced synchronously.
//! Losing a race on a session row is *not* an error: those paths return
//! outcome enums (see [`crate::assignment::ClaimOutcome`],
//! [`crate::bulk::TransferOutcome`], [`crate::resolution::ResolveOutcome`]).

use thiserror::Error;

/// Inbox engine errors
#[derive(Error, Debug)]
pub enum InboxError {
    /// Store errors
    #[error("Database error: {0}")]
    Database(String),

    /// Malformed input (missing wrap-up field, invalid date range, ...)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unknown session, agent or team (or one owned by another tenant)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Caller lacks the permission for the operation
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Operation is not allowed in the record's current state
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Collaborator failures (messaging dispatch, audit delivery)
    #[error("Integration error: {0}")]
    Integration(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for InboxError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound(err.to_string()),
            _ => Self::Database(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for InboxError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        Self::Database(format!("migration failed: {}", err))
    }
}

impl From<serde_json::Error> for InboxError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("json: {}", err))
    }
}

impl From<config::ConfigError> for InboxError {
    fn from(err: config::ConfigError) -> Self {
        Self::Configuration(err.to_string())
    }
}

impl InboxError {
    pub fn database<S: Into<String>>(msg: S) -> Self {
        Self::Database(msg.into())
    }

    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn forbidden<S: Into<String>>(msg: S) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn conflict<S: Into<String>>(msg: S) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn integration<S: Into<String>>(msg: S) -> Self {
        Self::Integration(msg.into())
    }

    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether the caller supplied bad input (never retried automatically)
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

/// Result type for inbox operations
pub type Result<T> = std::result::Result<T, InboxError>;
