// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core types for Lectern video-viewing analytics.
//!
//! This crate holds everything that does not touch storage:
//!
//! - `id` - session and role-scoped learner identifiers
//! - `session` - the viewing session record, partial updates and player events
//! - `aggregate` - per-video and per-learner reductions over session history
//! - `scoring` - per-session skill scores and proficiency bands
//! - `query` - session filters, summaries and export rows
//!
//! # Example
//!
//! ```ignore
//! use lectern_viewing_core::{score_session, VideoPerformanceAggregate};
//!
//! let aggregate = VideoPerformanceAggregate::from_sessions("video-1", &sessions, Utc::now())?;
//! let scores = score_session(&sessions[0]);
//! ```

pub mod aggregate;
pub mod error;
pub mod id;
pub mod query;
pub mod scoring;
pub mod session;

pub use aggregate::{
	engagement_score, guarded_div, ProgressPoint, TrendBucket, UserAnalyticsAggregate,
	VideoPerformanceAggregate, VideoTotals,
};
pub use error::{Result, ViewingError};
pub use id::{
	generate_batch, learner_digest, raw_role_scoped_id, validate_role_scoped_id,
	validate_session_id, IdFamily, Role, RoleScopedId, SessionId,
};
pub use query::{export_csv, ExportRow, SessionDuration, SessionFilter, SessionSummary};
pub use scoring::{score_session, ProficiencyLevel, SkillScores};
pub use session::{
	AccessMethod, AppliedUpdate, DeviceCategory, NewViewingSession, SessionEvent, SessionUpdate,
	ViewingSession,
};
