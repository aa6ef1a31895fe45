// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Session filtering, summary statistics and flat export rows.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};

use crate::aggregate::guarded_div;
use crate::scoring::score_session;
use crate::session::ViewingSession;

/// AND-combined session criteria. Absent fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionFilter {
	pub user_id: Option<String>,
	pub role_scoped_id: Option<String>,
	pub video_id: Option<String>,
	/// Inclusive lower bound on `started_at`
	pub from: Option<DateTime<Utc>>,
	/// Inclusive upper bound on `started_at`
	pub to: Option<DateTime<Utc>>,
	pub skill_level: Option<String>,
	pub completed: Option<bool>,
}

impl SessionFilter {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	#[must_use]
	pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
		self.user_id = Some(user_id.into());
		self
	}

	#[must_use]
	pub fn with_role_scoped_id(mut self, role_scoped_id: impl Into<String>) -> Self {
		self.role_scoped_id = Some(role_scoped_id.into());
		self
	}

	#[must_use]
	pub fn with_video(mut self, video_id: impl Into<String>) -> Self {
		self.video_id = Some(video_id.into());
		self
	}

	#[must_use]
	pub fn with_range(mut self, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
		self.from = from;
		self.to = to;
		self
	}

	#[must_use]
	pub fn with_skill_level(mut self, skill_level: impl Into<String>) -> Self {
		self.skill_level = Some(skill_level.into());
		self
	}

	#[must_use]
	pub fn with_completed(mut self, completed: bool) -> Self {
		self.completed = Some(completed);
		self
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		*self == Self::default()
	}

	/// In-memory form of the store's filtered scan.
	#[must_use]
	pub fn matches(&self, session: &ViewingSession) -> bool {
		if let Some(user_id) = &self.user_id {
			if session.user_id != *user_id {
				return false;
			}
		}
		if let Some(role_scoped_id) = &self.role_scoped_id {
			if session.role_scoped_id.as_str() != role_scoped_id {
				return false;
			}
		}
		if let Some(video_id) = &self.video_id {
			if session.video_id != *video_id {
				return false;
			}
		}
		if let Some(from) = self.from {
			if session.started_at < from {
				return false;
			}
		}
		if let Some(to) = self.to {
			if session.started_at > to {
				return false;
			}
		}
		if let Some(skill_level) = &self.skill_level {
			if session.skill_level.as_deref() != Some(skill_level.as_str()) {
				return false;
			}
		}
		if let Some(completed) = self.completed {
			if session.completed != completed {
				return false;
			}
		}
		true
	}
}

/// Summary statistics over a filtered session set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
	pub total_sessions: u64,
	pub total_watch_time: f64,
	pub completed_sessions: u64,
	pub average_completion_rate: f64,
	pub average_engagement_score: f64,
	pub unique_videos: u64,
	/// Sessions without a skill level are not counted
	pub skill_levels: BTreeMap<String, u64>,
	pub device_types: BTreeMap<String, u64>,
}

impl SessionSummary {
	#[must_use]
	pub fn from_sessions(sessions: &[ViewingSession]) -> Self {
		let mut summary = SessionSummary::default();
		let mut videos: HashSet<&str> = HashSet::new();
		let mut completion_sum = 0.0;
		let mut engagement_sum = 0.0;

		for session in sessions {
			summary.total_sessions += 1;
			summary.total_watch_time += session.watched_seconds;
			if session.completed {
				summary.completed_sessions += 1;
			}
			completion_sum += session.completion_percentage;
			engagement_sum += session.engagement_score.unwrap_or(0.0);
			videos.insert(&session.video_id);

			if let Some(level) = &session.skill_level {
				*summary.skill_levels.entry(level.clone()).or_insert(0) += 1;
			}
			*summary
				.device_types
				.entry(session.device.to_string())
				.or_insert(0) += 1;
		}

		let count = summary.total_sessions as f64;
		summary.average_completion_rate = guarded_div(completion_sum, count);
		summary.average_engagement_score = guarded_div(engagement_sum, count);
		summary.unique_videos = videos.len() as u64;
		summary
	}
}

/// Wall-clock length of an exported session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionDuration {
	Seconds(i64),
	/// No end timestamp yet
	Open,
}

impl SessionDuration {
	pub const OPEN_SENTINEL: &'static str = "open";
}

impl From<Option<i64>> for SessionDuration {
	fn from(value: Option<i64>) -> Self {
		value.map_or(SessionDuration::Open, SessionDuration::Seconds)
	}
}

impl std::fmt::Display for SessionDuration {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			SessionDuration::Seconds(secs) => write!(f, "{secs}"),
			SessionDuration::Open => f.write_str(Self::OPEN_SENTINEL),
		}
	}
}

impl Serialize for SessionDuration {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		match self {
			SessionDuration::Seconds(secs) => serializer.serialize_i64(*secs),
			SessionDuration::Open => serializer.serialize_str(Self::OPEN_SENTINEL),
		}
	}
}

/// One flattened session, ready for columnar output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportRow {
	pub session_id: String,
	pub user_id: String,
	pub role_scoped_id: String,
	pub video_id: String,
	pub started_at: DateTime<Utc>,
	pub ended_at: Option<DateTime<Utc>>,
	pub session_duration: SessionDuration,
	pub watched_seconds: f64,
	pub video_duration_seconds: f64,
	pub completion_percentage: f64,
	pub completed: bool,
	pub pause_count: u32,
	pub seek_count: u32,
	pub replay_count: u32,
	pub playback_speed: f64,
	pub max_progress_reached: f64,
	pub device: String,
	pub access_method: String,
	pub engagement_score: Option<f64>,
	pub skill_level: Option<String>,
	pub learning_path: Option<String>,
	pub skill_score: u8,
	pub technical_score: u8,
	pub speed_score: u8,
	pub accuracy_score: u8,
}

impl ExportRow {
	#[must_use]
	pub fn from_session(session: &ViewingSession) -> Self {
		let scores = score_session(session);
		Self {
			session_id: session.id.to_string(),
			user_id: session.user_id.clone(),
			role_scoped_id: session.role_scoped_id.to_string(),
			video_id: session.video_id.clone(),
			started_at: session.started_at,
			ended_at: session.ended_at,
			session_duration: session.duration_seconds().into(),
			watched_seconds: session.watched_seconds,
			video_duration_seconds: session.video_duration_seconds,
			completion_percentage: session.completion_percentage,
			completed: session.completed,
			pause_count: session.pause_count,
			seek_count: session.seek_count,
			replay_count: session.replay_count,
			playback_speed: session.playback_speed,
			max_progress_reached: session.max_progress_reached,
			device: session.device.to_string(),
			access_method: session.access_method.to_string(),
			engagement_score: session.engagement_score,
			skill_level: session.skill_level.clone(),
			learning_path: session.learning_path.clone(),
			skill_score: scores.skill_score,
			technical_score: scores.technical_score,
			speed_score: scores.speed_score,
			accuracy_score: scores.accuracy_score,
		}
	}

	fn csv_fields(&self) -> Vec<String> {
		fn opt<T: ToString>(value: &Option<T>) -> String {
			value.as_ref().map(ToString::to_string).unwrap_or_default()
		}

		vec![
			self.session_id.clone(),
			self.user_id.clone(),
			self.role_scoped_id.clone(),
			self.video_id.clone(),
			self.started_at.to_rfc3339(),
			self.ended_at.map(|t| t.to_rfc3339()).unwrap_or_default(),
			self.session_duration.to_string(),
			self.watched_seconds.to_string(),
			self.video_duration_seconds.to_string(),
			self.completion_percentage.to_string(),
			self.completed.to_string(),
			self.pause_count.to_string(),
			self.seek_count.to_string(),
			self.replay_count.to_string(),
			self.playback_speed.to_string(),
			self.max_progress_reached.to_string(),
			self.device.clone(),
			self.access_method.clone(),
			opt(&self.engagement_score),
			opt(&self.skill_level),
			opt(&self.learning_path),
			self.skill_score.to_string(),
			self.technical_score.to_string(),
			self.speed_score.to_string(),
			self.accuracy_score.to_string(),
		]
	}
}

/// Column order of [`export_csv`].
pub const EXPORT_COLUMNS: [&str; 25] = [
	"session_id",
	"user_id",
	"role_scoped_id",
	"video_id",
	"started_at",
	"ended_at",
	"session_duration",
	"watched_seconds",
	"video_duration_seconds",
	"completion_percentage",
	"completed",
	"pause_count",
	"seek_count",
	"replay_count",
	"playback_speed",
	"max_progress_reached",
	"device",
	"access_method",
	"engagement_score",
	"skill_level",
	"learning_path",
	"skill_score",
	"technical_score",
	"speed_score",
	"accuracy_score",
];

fn csv_escape(field: &str) -> String {
	if field.contains([',', '"', '\n', '\r']) {
		format!("\"{}\"", field.replace('"', "\"\""))
	} else {
		field.to_string()
	}
}

/// Render rows as CSV with a header line. Lines end in CRLF.
#[must_use]
pub fn export_csv(rows: &[ExportRow]) -> String {
	let mut out = String::new();
	out.push_str(&EXPORT_COLUMNS.join(","));
	out.push_str("\r\n");
	for row in rows {
		let line: Vec<String> = row.csv_fields().iter().map(|f| csv_escape(f)).collect();
		out.push_str(&line.join(","));
		out.push_str("\r\n");
	}
	out
}
