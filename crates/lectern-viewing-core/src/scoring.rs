// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Deterministic skill scoring for a single viewing session.

use serde::{Deserialize, Serialize};

use crate::aggregate::guarded_div;
use crate::error::ViewingError;
use crate::session::ViewingSession;

/// Upper bound on the watched/duration ratio.
pub const MAX_WATCH_RATIO: f64 = 1.5;

/// Four 0-100 scores derived from one session's telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SkillScores {
	pub skill_score: u8,
	pub technical_score: u8,
	pub speed_score: u8,
	pub accuracy_score: u8,
}

impl SkillScores {
	#[must_use]
	pub fn proficiency(&self) -> ProficiencyLevel {
		ProficiencyLevel::from_score(f64::from(self.skill_score))
	}
}

fn clamp_score(value: f64) -> f64 {
	value.clamp(0.0, 100.0)
}

fn to_u8(value: f64) -> u8 {
	clamp_score(value).round() as u8
}

/// Score one session.
///
/// Sub-scores are clamped before the weighted skill score is formed; all four
/// are rounded half away from zero at the end. A missing engagement score
/// counts as 0.
#[must_use]
pub fn score_session(session: &ViewingSession) -> SkillScores {
	let engagement = session.engagement_score.unwrap_or(0.0);
	let technical = clamp_score(0.7 * session.completion_percentage + 0.3 * engagement);

	let watch_ratio =
		guarded_div(session.watched_seconds, session.video_duration_seconds).min(MAX_WATCH_RATIO);
	let pause_penalty = (2.0 * f64::from(session.pause_count)).min(20.0);
	let seek_penalty = (1.5 * f64::from(session.seek_count)).min(15.0);
	let speed = clamp_score(100.0 - pause_penalty - seek_penalty - 10.0 * (watch_ratio - 1.0));

	let replay_penalty = (5.0 * f64::from(session.replay_count)).min(25.0);
	let accuracy = clamp_score(100.0 - replay_penalty - 2.0 * f64::from(session.seek_count));

	let skill = 0.4 * technical + 0.3 * speed + 0.3 * accuracy;

	SkillScores {
		skill_score: to_u8(skill),
		technical_score: to_u8(technical),
		speed_score: to_u8(speed),
		accuracy_score: to_u8(accuracy),
	}
}

/// Five ordered proficiency bands over a skill score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProficiencyLevel {
	Novice,
	Beginner,
	Intermediate,
	Advanced,
	Expert,
}

impl ProficiencyLevel {
	/// Bucket a skill score: novice <40, beginner <60, intermediate <80,
	/// advanced <90, expert otherwise.
	#[must_use]
	pub fn from_score(score: f64) -> Self {
		if score >= 90.0 {
			ProficiencyLevel::Expert
		} else if score >= 80.0 {
			ProficiencyLevel::Advanced
		} else if score >= 60.0 {
			ProficiencyLevel::Intermediate
		} else if score >= 40.0 {
			ProficiencyLevel::Beginner
		} else {
			ProficiencyLevel::Novice
		}
	}
}

impl std::fmt::Display for ProficiencyLevel {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			ProficiencyLevel::Novice => write!(f, "novice"),
			ProficiencyLevel::Beginner => write!(f, "beginner"),
			ProficiencyLevel::Intermediate => write!(f, "intermediate"),
			ProficiencyLevel::Advanced => write!(f, "advanced"),
			ProficiencyLevel::Expert => write!(f, "expert"),
		}
	}
}

impl std::str::FromStr for ProficiencyLevel {
	type Err = ViewingError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"novice" => Ok(ProficiencyLevel::Novice),
			"beginner" => Ok(ProficiencyLevel::Beginner),
			"intermediate" => Ok(ProficiencyLevel::Intermediate),
			"advanced" => Ok(ProficiencyLevel::Advanced),
			"expert" => Ok(ProficiencyLevel::Expert),
			_ => Err(ViewingError::InvalidProficiency(s.to_string())),
		}
	}
}
