// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Viewing session types for per-learner video telemetry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregate::engagement_score;
use crate::error::{Result, ViewingError};
use crate::id::{RoleScopedId, SessionId};

/// Default playback speed multiplier.
pub const DEFAULT_PLAYBACK_SPEED: f64 = 1.0;

/// One learner's interaction with one video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewingSession {
	pub id: SessionId,
	/// Primary learner identifier
	pub user_id: String,
	pub role_scoped_id: RoleScopedId,
	pub video_id: String,

	pub started_at: DateTime<Utc>,
	pub ended_at: Option<DateTime<Utc>>,

	/// Seconds actually watched; may exceed the video duration with replays
	pub watched_seconds: f64,
	pub video_duration_seconds: f64,
	/// 0-100
	pub completion_percentage: f64,
	pub completed: bool,

	pub pause_count: u32,
	pub seek_count: u32,
	pub replay_count: u32,
	pub playback_speed: f64,
	/// Highest completion percentage ever reported (never decreases)
	pub max_progress_reached: f64,

	pub device: DeviceCategory,
	pub access_method: AccessMethod,

	/// 0-100, None until computed
	pub engagement_score: Option<f64>,
	pub skill_level: Option<String>,
	pub learning_path: Option<String>,

	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

impl ViewingSession {
	#[must_use]
	pub fn is_ended(&self) -> bool {
		self.ended_at.is_some()
	}

	/// Wall-clock session length in seconds, None while the session is open.
	#[must_use]
	pub fn duration_seconds(&self) -> Option<i64> {
		self
			.ended_at
			.map(|ended| (ended - self.started_at).num_seconds())
	}

	/// Engagement of this session alone, using the video engagement formula.
	#[must_use]
	pub fn single_session_engagement(&self) -> f64 {
		let replay_rate = if self.replay_count > 0 { 100.0 } else { 0.0 };
		engagement_score(
			self.completion_percentage,
			self.watched_seconds,
			f64::from(self.pause_count),
			replay_rate,
		)
	}

	/// Check the numeric ranges of every telemetry field.
	pub fn validate(&self) -> Result<()> {
		if !(self.video_duration_seconds > 0.0) {
			return Err(invalid(format!(
				"video duration must be positive, got {}",
				self.video_duration_seconds
			)));
		}
		if !(self.playback_speed > 0.0) {
			return Err(invalid(format!(
				"playback speed must be positive, got {}",
				self.playback_speed
			)));
		}
		if !(self.watched_seconds >= 0.0) {
			return Err(invalid(format!(
				"watched seconds must not be negative, got {}",
				self.watched_seconds
			)));
		}
		check_percentage("completion percentage", self.completion_percentage)?;
		check_percentage("max progress reached", self.max_progress_reached)?;
		if let Some(score) = self.engagement_score {
			check_percentage("engagement score", score)?;
		}
		if let Some(ended) = self.ended_at {
			if ended < self.started_at {
				return Err(invalid("session cannot end before it starts".to_string()));
			}
		}
		Ok(())
	}

	/// Apply a partial update, returning whether progress telemetry changed.
	///
	/// Once a session has ended only analytics fields may change. The
	/// session is left untouched when the update is rejected.
	pub fn apply(&mut self, update: &SessionUpdate, now: DateTime<Utc>) -> Result<AppliedUpdate> {
		if self.is_ended() && update.touches_telemetry() {
			return Err(ViewingError::SessionEnded(self.id.to_string()));
		}

		let mut next = self.clone();
		if let Some(v) = update.watched_seconds {
			next.watched_seconds = v;
		}
		if let Some(v) = update.completion_percentage {
			next.completion_percentage = v;
		}
		if let Some(v) = update.completed {
			next.completed = v;
		}
		if let Some(v) = update.pause_count {
			next.pause_count = v;
		}
		if let Some(v) = update.seek_count {
			next.seek_count = v;
		}
		if let Some(v) = update.replay_count {
			next.replay_count = v;
		}
		if let Some(v) = update.playback_speed {
			next.playback_speed = v;
		}
		if let Some(v) = update.device {
			next.device = v;
		}
		if let Some(v) = update.access_method {
			next.access_method = v;
		}
		if let Some(v) = update.ended_at {
			next.ended_at = Some(v);
		}
		if let Some(v) = update.engagement_score {
			next.engagement_score = Some(v);
		}
		if let Some(v) = &update.skill_level {
			next.skill_level = Some(v.clone());
		}
		if let Some(v) = &update.learning_path {
			next.learning_path = Some(v.clone());
		}

		let reported_max = update.max_progress_reached.unwrap_or(0.0);
		next.max_progress_reached = next
			.max_progress_reached
			.max(reported_max)
			.max(next.completion_percentage);

		if next.is_ended() && next.engagement_score.is_none() {
			next.engagement_score = Some(next.single_session_engagement());
		}
		next.updated_at = now;
		next.validate()?;

		let progress_changed = next.watched_seconds != self.watched_seconds
			|| next.completion_percentage != self.completion_percentage
			|| next.completed != self.completed;

		*self = next;
		Ok(AppliedUpdate { progress_changed })
	}
}

fn invalid(message: String) -> ViewingError {
	ViewingError::InvalidTelemetry(message)
}

fn check_percentage(field: &str, value: f64) -> Result<()> {
	if (0.0..=100.0).contains(&value) {
		Ok(())
	} else {
		Err(invalid(format!("{field} must be within 0-100, got {value}")))
	}
}

/// Outcome of [`ViewingSession::apply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppliedUpdate {
	/// Watched seconds or completion changed, so aggregates are stale
	pub progress_changed: bool,
}

/// Input for creating a session at session start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewViewingSession {
	/// Unvalidated session identifier
	pub id: String,
	pub user_id: String,
	/// Unvalidated role-scoped learner identifier
	pub role_scoped_id: String,
	pub video_id: String,
	#[serde(default)]
	pub started_at: Option<DateTime<Utc>>,
	pub video_duration_seconds: f64,
	#[serde(default)]
	pub playback_speed: Option<f64>,
	#[serde(default)]
	pub device: Option<DeviceCategory>,
	#[serde(default)]
	pub access_method: Option<AccessMethod>,
	#[serde(default)]
	pub skill_level: Option<String>,
	#[serde(default)]
	pub learning_path: Option<String>,
}

impl NewViewingSession {
	/// Validate identifiers and build a session with zeroed counters.
	///
	/// # Errors
	/// Identifier format errors are reported before any range check.
	pub fn into_session(self, now: DateTime<Utc>) -> Result<ViewingSession> {
		let id: SessionId = self.id.try_into()?;
		let role_scoped_id: RoleScopedId = self.role_scoped_id.try_into()?;

		let session = ViewingSession {
			id,
			user_id: self.user_id,
			role_scoped_id,
			video_id: self.video_id,
			started_at: self.started_at.unwrap_or(now),
			ended_at: None,
			watched_seconds: 0.0,
			video_duration_seconds: self.video_duration_seconds,
			completion_percentage: 0.0,
			completed: false,
			pause_count: 0,
			seek_count: 0,
			replay_count: 0,
			playback_speed: self.playback_speed.unwrap_or(DEFAULT_PLAYBACK_SPEED),
			max_progress_reached: 0.0,
			device: self.device.unwrap_or(DeviceCategory::Other),
			access_method: self.access_method.unwrap_or(AccessMethod::Web),
			engagement_score: None,
			skill_level: self.skill_level,
			learning_path: self.learning_path,
			created_at: now,
			updated_at: now,
		};
		session.validate()?;
		Ok(session)
	}
}

/// Partial mutation of a session keyed by its identifier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionUpdate {
	pub watched_seconds: Option<f64>,
	pub completion_percentage: Option<f64>,
	pub completed: Option<bool>,
	pub pause_count: Option<u32>,
	pub seek_count: Option<u32>,
	pub replay_count: Option<u32>,
	pub playback_speed: Option<f64>,
	pub max_progress_reached: Option<f64>,
	pub device: Option<DeviceCategory>,
	pub access_method: Option<AccessMethod>,
	pub ended_at: Option<DateTime<Utc>>,

	// Analytics fields, writable after the session ends
	pub engagement_score: Option<f64>,
	pub skill_level: Option<String>,
	pub learning_path: Option<String>,
}

impl SessionUpdate {
	/// True when any client-reported telemetry field is set.
	#[must_use]
	pub fn touches_telemetry(&self) -> bool {
		self.watched_seconds.is_some()
			|| self.completion_percentage.is_some()
			|| self.completed.is_some()
			|| self.pause_count.is_some()
			|| self.seek_count.is_some()
			|| self.replay_count.is_some()
			|| self.playback_speed.is_some()
			|| self.max_progress_reached.is_some()
			|| self.device.is_some()
			|| self.access_method.is_some()
			|| self.ended_at.is_some()
	}
}

/// Client-reported player event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
	Pause,
	Seek,
	Replay,
	Progress {
		watched_seconds: f64,
		completion_percentage: f64,
	},
	End {
		at: DateTime<Utc>,
		completed: bool,
	},
}

impl SessionEvent {
	/// Translate the event into an additive update against the current session.
	#[must_use]
	pub fn to_update(&self, current: &ViewingSession) -> SessionUpdate {
		match self {
			SessionEvent::Pause => SessionUpdate {
				pause_count: Some(current.pause_count.saturating_add(1)),
				..Default::default()
			},
			SessionEvent::Seek => SessionUpdate {
				seek_count: Some(current.seek_count.saturating_add(1)),
				..Default::default()
			},
			SessionEvent::Replay => SessionUpdate {
				replay_count: Some(current.replay_count.saturating_add(1)),
				..Default::default()
			},
			SessionEvent::Progress {
				watched_seconds,
				completion_percentage,
			} => SessionUpdate {
				watched_seconds: Some(*watched_seconds),
				completion_percentage: Some(*completion_percentage),
				..Default::default()
			},
			SessionEvent::End { at, completed } => SessionUpdate {
				ended_at: Some(*at),
				completed: Some(*completed),
				..Default::default()
			},
		}
	}
}

/// Device category the session was watched on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceCategory {
	Desktop,
	Mobile,
	Tablet,
	Tv,
	Other,
}

impl std::fmt::Display for DeviceCategory {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			DeviceCategory::Desktop => write!(f, "desktop"),
			DeviceCategory::Mobile => write!(f, "mobile"),
			DeviceCategory::Tablet => write!(f, "tablet"),
			DeviceCategory::Tv => write!(f, "tv"),
			DeviceCategory::Other => write!(f, "other"),
		}
	}
}

impl std::str::FromStr for DeviceCategory {
	type Err = ViewingError;

	fn from_str(s: &str) -> Result<Self> {
		match s {
			"desktop" => Ok(DeviceCategory::Desktop),
			"mobile" => Ok(DeviceCategory::Mobile),
			"tablet" => Ok(DeviceCategory::Tablet),
			"tv" => Ok(DeviceCategory::Tv),
			"other" => Ok(DeviceCategory::Other),
			_ => Err(ViewingError::InvalidDevice(s.to_string())),
		}
	}
}

/// How the learner reached the video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMethod {
	Web,
	MobileApp,
	Embed,
	Api,
	Other,
}

impl std::fmt::Display for AccessMethod {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			AccessMethod::Web => write!(f, "web"),
			AccessMethod::MobileApp => write!(f, "mobile_app"),
			AccessMethod::Embed => write!(f, "embed"),
			AccessMethod::Api => write!(f, "api"),
			AccessMethod::Other => write!(f, "other"),
		}
	}
}

impl std::str::FromStr for AccessMethod {
	type Err = ViewingError;

	fn from_str(s: &str) -> Result<Self> {
		match s {
			"web" => Ok(AccessMethod::Web),
			"mobile_app" => Ok(AccessMethod::MobileApp),
			"embed" => Ok(AccessMethod::Embed),
			"api" => Ok(AccessMethod::Api),
			"other" => Ok(AccessMethod::Other),
			_ => Err(ViewingError::InvalidAccessMethod(s.to_string())),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::TimeZone;
	use proptest::prelude::*;

	fn new_session() -> NewViewingSession {
		NewViewingSession {
			id: "SABCDEFGHIJK".to_string(),
			user_id: "user-1".to_string(),
			role_scoped_id: "1LABCDE".to_string(),
			video_id: "video-1".to_string(),
			started_at: Some(Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap()),
			video_duration_seconds: 600.0,
			playback_speed: None,
			device: Some(DeviceCategory::Desktop),
			access_method: None,
			skill_level: None,
			learning_path: None,
		}
	}

	fn now() -> DateTime<Utc> {
		Utc.with_ymd_and_hms(2026, 3, 1, 10, 5, 0).unwrap()
	}

	proptest! {
		#[test]
		fn device_roundtrip(device in prop_oneof![
			Just(DeviceCategory::Desktop),
			Just(DeviceCategory::Mobile),
			Just(DeviceCategory::Tablet),
			Just(DeviceCategory::Tv),
			Just(DeviceCategory::Other),
		]) {
			let s = device.to_string();
			let parsed: DeviceCategory = s.parse().unwrap();
			prop_assert_eq!(device, parsed);
		}

		#[test]
		fn access_method_roundtrip(method in prop_oneof![
			Just(AccessMethod::Web),
			Just(AccessMethod::MobileApp),
			Just(AccessMethod::Embed),
			Just(AccessMethod::Api),
			Just(AccessMethod::Other),
		]) {
			let s = method.to_string();
			let parsed: AccessMethod = s.parse().unwrap();
			prop_assert_eq!(method, parsed);
		}

		#[test]
		fn max_progress_never_decreases(steps in proptest::collection::vec(0.0f64..=100.0, 1..20)) {
			let mut session = new_session().into_session(now()).unwrap();
			let mut previous_max = session.max_progress_reached;
			for pct in steps {
				let update = SessionUpdate {
					completion_percentage: Some(pct),
					..Default::default()
				};
				session.apply(&update, now()).unwrap();
				prop_assert!(session.max_progress_reached >= previous_max);
				prop_assert!(session.completion_percentage <= session.max_progress_reached);
				previous_max = session.max_progress_reached;
			}
		}
	}

	#[test]
	fn test_into_session_defaults() {
		let session = new_session().into_session(now()).unwrap();
		assert_eq!(session.pause_count, 0);
		assert_eq!(session.playback_speed, DEFAULT_PLAYBACK_SPEED);
		assert_eq!(session.access_method, AccessMethod::Web);
		assert!(session.engagement_score.is_none());
		assert!(!session.is_ended());
		assert_eq!(session.duration_seconds(), None);
	}

	#[test]
	fn test_into_session_rejects_bad_ids() {
		let mut input = new_session();
		input.id = "bad".to_string();
		let err = input.into_session(now()).unwrap_err();
		assert!(err.is_format_error());

		let mut input = new_session();
		input.role_scoped_id = "1UABCDE".to_string();
		let err = input.into_session(now()).unwrap_err();
		assert!(matches!(err, ViewingError::InvalidRoleScopedId(_)));
	}

	#[test]
	fn test_into_session_rejects_zero_duration() {
		let mut input = new_session();
		input.video_duration_seconds = 0.0;
		assert!(matches!(
			input.into_session(now()),
			Err(ViewingError::InvalidTelemetry(_))
		));
	}

	#[test]
	fn test_events_are_additive() {
		let mut session = new_session().into_session(now()).unwrap();
		for event in [SessionEvent::Pause, SessionEvent::Pause, SessionEvent::Seek, SessionEvent::Replay] {
			let update = event.to_update(&session);
			let applied = session.apply(&update, now()).unwrap();
			assert!(!applied.progress_changed);
		}
		assert_eq!(session.pause_count, 2);
		assert_eq!(session.seek_count, 1);
		assert_eq!(session.replay_count, 1);
	}

	#[test]
	fn test_progress_marks_change() {
		let mut session = new_session().into_session(now()).unwrap();
		let update = SessionEvent::Progress {
			watched_seconds: 120.0,
			completion_percentage: 20.0,
		}
		.to_update(&session);
		let applied = session.apply(&update, now()).unwrap();
		assert!(applied.progress_changed);
		assert_eq!(session.max_progress_reached, 20.0);
	}

	#[test]
	fn test_end_computes_engagement_and_freezes() {
		let mut session = new_session().into_session(now()).unwrap();
		session
			.apply(
				&SessionUpdate {
					watched_seconds: Some(600.0),
					completion_percentage: Some(100.0),
					..Default::default()
				},
				now(),
			)
			.unwrap();

		let ended_at = Utc.with_ymd_and_hms(2026, 3, 1, 10, 12, 0).unwrap();
		let update = SessionEvent::End {
			at: ended_at,
			completed: true,
		}
		.to_update(&session);
		session.apply(&update, now()).unwrap();

		assert_eq!(session.duration_seconds(), Some(720));
		// 0.4*100 + 30*1 + 20 + 0 = 90
		assert_eq!(session.engagement_score, Some(90.0));

		let err = session.apply(&SessionEvent::Pause.to_update(&session), now()).unwrap_err();
		assert!(matches!(err, ViewingError::SessionEnded(_)));
		assert_eq!(session.pause_count, 0);

		let analytics_only = SessionUpdate {
			skill_level: Some("intermediate".to_string()),
			engagement_score: Some(75.0),
			..Default::default()
		};
		session.apply(&analytics_only, now()).unwrap();
		assert_eq!(session.skill_level.as_deref(), Some("intermediate"));
		assert_eq!(session.engagement_score, Some(75.0));
	}

	#[test]
	fn test_rejected_update_leaves_session_untouched() {
		let mut session = new_session().into_session(now()).unwrap();
		let before = session.clone();
		let update = SessionUpdate {
			completion_percentage: Some(140.0),
			..Default::default()
		};
		assert!(session.apply(&update, now()).is_err());
		assert_eq!(session, before);
	}

	#[test]
	fn test_watched_may_exceed_duration() {
		let mut session = new_session().into_session(now()).unwrap();
		let update = SessionUpdate {
			watched_seconds: Some(1500.0),
			..Default::default()
		};
		session.apply(&update, now()).unwrap();
		assert_eq!(session.watched_seconds, 1500.0);
	}
}
