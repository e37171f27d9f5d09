//! # Error Handling
//!
//! This module provides the typed error taxonomy for repository operations.
//! Every data-access boundary call is mapped explicitly to one kind so that
//! callers can tell a failed write from a failed lookup without inspecting
//! driver messages.

use std::fmt::Display;

use thiserror::Error;

/// Result type alias for repository operations.
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Errors raised by [`crate::repositories::Repository`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    /// Creating a resource failed.
    #[error("failed to store resource: {0}")]
    Store(String),

    /// Updating a resource failed.
    #[error("failed to update resource: {0}")]
    Update(String),

    /// A single or bulk delete failed.
    #[error("failed to delete resource: {0}")]
    Delete(String),

    /// An `..._or_fail` lookup found nothing.
    #[error("resource not found")]
    NotFound,

    /// A read, aggregate, chunk or pagination query failed.
    #[error("query failed: {0}")]
    Query(String),

    /// A builder call was requested by a name neither the repository nor the
    /// relay defines.
    #[error("call to undefined method {repository}::{method}()")]
    UndefinedMethod { repository: String, method: String },

    /// A builder call dispatched by name received arguments of the wrong shape.
    #[error("invalid arguments for {method}(): {reason}")]
    InvalidArgument { method: String, reason: String },
}

impl RepositoryError {
    /// Wrap a failure from the insert path.
    pub fn store(error: impl Display) -> Self {
        Self::Store(error.to_string())
    }

    /// Wrap a failure from the update path.
    pub fn update(error: impl Display) -> Self {
        Self::Update(error.to_string())
    }

    /// Wrap a failure from a delete statement.
    pub fn delete(error: impl Display) -> Self {
        Self::Delete(error.to_string())
    }

    /// Wrap a failure from a read or aggregate query.
    pub fn query(error: impl Display) -> Self {
        Self::Query(error.to_string())
    }

    pub(crate) fn undefined_method(repository: &str, method: &str) -> Self {
        Self::UndefinedMethod {
            repository: repository.to_string(),
            method: method.to_string(),
        }
    }

    pub(crate) fn invalid_argument(method: &str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            method: method.to_string(),
            reason: reason.into(),
        }
    }

    /// Returns true for [`RepositoryError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}
