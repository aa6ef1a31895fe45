// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for the viewing analytics system.

use thiserror::Error;

/// Errors that can occur in the viewing analytics core.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ViewingError {
	/// Session identifier failed validation
	#[error("invalid session ID: {0}")]
	InvalidSessionId(String),

	/// Role-scoped learner identifier failed validation
	#[error("invalid role-scoped ID: {0}")]
	InvalidRoleScopedId(String),

	/// Role has no validator-satisfying prefix
	#[error("invalid role: {0}")]
	InvalidRole(String),

	/// Invalid device category string
	#[error("invalid device category: {0}")]
	InvalidDevice(String),

	/// Invalid access method string
	#[error("invalid access method: {0}")]
	InvalidAccessMethod(String),

	/// Invalid proficiency level string
	#[error("invalid proficiency level: {0}")]
	InvalidProficiency(String),

	/// Telemetry value out of range
	#[error("invalid telemetry: {0}")]
	InvalidTelemetry(String),

	/// Telemetry mutation attempted after the session ended
	#[error("session already ended: {0}")]
	SessionEnded(String),

	/// Aggregation requested against zero sessions
	#[error("no sessions to aggregate for {0}")]
	EmptyAggregation(String),
}

impl ViewingError {
	/// True for identifier format failures that must be rejected before storage.
	#[must_use]
	pub fn is_format_error(&self) -> bool {
		matches!(
			self,
			ViewingError::InvalidSessionId(_) | ViewingError::InvalidRoleScopedId(_)
		)
	}
}

/// Result type for viewing core operations.
pub type Result<T> = std::result::Result<T, ViewingError>;
