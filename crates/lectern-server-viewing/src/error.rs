// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for the viewing server.

use lectern_viewing_core::ViewingError;
use thiserror::Error;

/// Errors that can occur in the viewing server.
#[derive(Debug, Error)]
pub enum ViewingServerError {
	/// Database error
	#[error("database error: {0}")]
	Database(#[from] sqlx::Error),

	/// Session not found
	#[error("session not found: {0}")]
	SessionNotFound(String),

	/// Aggregate not found
	#[error("aggregate not found: {0}")]
	AggregateNotFound(String),

	/// Session identifier already stored
	#[error("conflict: {0}")]
	Conflict(String),

	/// Invalid session data
	#[error("invalid session data: {0}")]
	InvalidData(String),

	/// JSON serialization error
	#[error("json error: {0}")]
	Json(#[from] serde_json::Error),

	/// Core error
	#[error("viewing core error: {0}")]
	Core(ViewingError),
}

impl From<ViewingError> for ViewingServerError {
	fn from(err: ViewingError) -> Self {
		match err {
			ViewingError::InvalidTelemetry(msg) => ViewingServerError::InvalidData(msg),
			other => ViewingServerError::Core(other),
		}
	}
}

impl ViewingServerError {
	/// Identifier failed format validation before reaching storage.
	#[must_use]
	pub fn is_format_error(&self) -> bool {
		matches!(self, ViewingServerError::Core(e) if e.is_format_error())
	}

	#[must_use]
	pub fn is_not_found(&self) -> bool {
		matches!(
			self,
			ViewingServerError::SessionNotFound(_) | ViewingServerError::AggregateNotFound(_)
		)
	}
}

/// Result type for viewing server operations.
pub type Result<T> = std::result::Result<T, ViewingServerError>;
