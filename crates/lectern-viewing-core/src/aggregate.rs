// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Per-video and per-learner aggregates derived from session history.
//!
//! Aggregates hold nothing that cannot be rebuilt from sessions. They are
//! always recomputed from the full session set and replaced wholesale.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ViewingError};
use crate::scoring::score_session;
use crate::session::ViewingSession;

/// Watch time (seconds) that earns full watch-time credit.
pub const FULL_CREDIT_WATCH_SECONDS: f64 = 600.0;

/// Divide, returning 0 for a zero denominator.
#[must_use]
pub fn guarded_div(numerator: f64, denominator: f64) -> f64 {
	if denominator == 0.0 {
		0.0
	} else {
		numerator / denominator
	}
}

/// Composite 0-100 engagement score.
///
/// `0.4 * completion_rate + 30 * min(avg_watch / 600, 1)
///  + max(0, 20 - 2 * avg_pauses) + 0.1 * replay_rate`, clamped to 0-100.
#[must_use]
pub fn engagement_score(
	completion_rate: f64,
	average_watch_time: f64,
	average_pause_count: f64,
	replay_rate: f64,
) -> f64 {
	let watch_credit = 30.0 * (average_watch_time / FULL_CREDIT_WATCH_SECONDS).min(1.0);
	let pause_credit = (20.0 - 2.0 * average_pause_count).max(0.0);
	let raw = 0.4 * completion_rate + watch_credit + pause_credit + 0.1 * replay_rate;
	raw.clamp(0.0, 100.0)
}

/// Performance metrics for one video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoPerformanceAggregate {
	pub video_id: String,
	/// Session count
	pub total_views: u64,
	/// Distinct learners
	pub unique_viewers: u64,
	/// Mean watched seconds
	pub average_watch_time: f64,
	/// Completed sessions / views * 100
	pub completion_rate: f64,
	pub average_pause_count: f64,
	pub average_seek_count: f64,
	/// Sessions with a replay / views * 100
	pub replay_rate: f64,
	/// 0-100
	pub engagement_score: f64,
	pub last_recomputed_at: DateTime<Utc>,
}

impl VideoPerformanceAggregate {
	/// Compute the aggregate for a video from all of its sessions.
	///
	/// # Errors
	/// Returns `ViewingError::EmptyAggregation` when `sessions` is empty.
	pub fn from_sessions(
		video_id: &str,
		sessions: &[ViewingSession],
		now: DateTime<Utc>,
	) -> Result<Self> {
		let mut totals = VideoTotals::default();
		for session in sessions {
			totals.push(session);
		}
		totals.finish(video_id, now)
	}

	/// Same metrics with the timestamp ignored.
	#[must_use]
	pub fn same_metrics(&self, other: &Self) -> bool {
		Self {
			last_recomputed_at: other.last_recomputed_at,
			..self.clone()
		} == *other
	}
}

/// Running sums for a video aggregate.
///
/// Folding sessions one at a time yields exactly the figures of a full
/// recompute, so an incremental maintainer can reuse it.
#[derive(Debug, Clone, Default)]
pub struct VideoTotals {
	sessions: u64,
	viewers: HashSet<String>,
	watch_seconds: f64,
	completed: u64,
	pauses: u64,
	seeks: u64,
	replayed: u64,
}

impl VideoTotals {
	pub fn push(&mut self, session: &ViewingSession) {
		self.sessions += 1;
		self.viewers.insert(session.user_id.clone());
		self.watch_seconds += session.watched_seconds;
		if session.completed {
			self.completed += 1;
		}
		self.pauses += u64::from(session.pause_count);
		self.seeks += u64::from(session.seek_count);
		if session.replay_count > 0 {
			self.replayed += 1;
		}
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.sessions == 0
	}

	/// Derive the aggregate from the accumulated sums.
	///
	/// # Errors
	/// Returns `ViewingError::EmptyAggregation` if no session was pushed.
	pub fn finish(&self, video_id: &str, now: DateTime<Utc>) -> Result<VideoPerformanceAggregate> {
		if self.is_empty() {
			return Err(ViewingError::EmptyAggregation(format!("video {video_id}")));
		}

		let views = self.sessions as f64;
		let average_watch_time = guarded_div(self.watch_seconds, views);
		let completion_rate = guarded_div(self.completed as f64, views) * 100.0;
		let average_pause_count = guarded_div(self.pauses as f64, views);
		let average_seek_count = guarded_div(self.seeks as f64, views);
		let replay_rate = guarded_div(self.replayed as f64, views) * 100.0;

		Ok(VideoPerformanceAggregate {
			video_id: video_id.to_string(),
			total_views: self.sessions,
			unique_viewers: self.viewers.len() as u64,
			average_watch_time,
			completion_rate,
			average_pause_count,
			average_seek_count,
			replay_rate,
			engagement_score: engagement_score(
				completion_rate,
				average_watch_time,
				average_pause_count,
				replay_rate,
			),
			last_recomputed_at: now,
		})
	}
}

/// One session on a learner's progression timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressPoint {
	pub session_id: String,
	pub video_id: String,
	pub started_at: DateTime<Utc>,
	pub completion_percentage: f64,
	pub skill_score: u8,
}

/// Per-day activity bucket for a learner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendBucket {
	/// YYYY-MM-DD (UTC)
	pub date: String,
	pub sessions: u32,
	pub watch_time: f64,
	pub completions: u32,
}

/// Cumulative analytics for one learner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserAnalyticsAggregate {
	pub user_id: String,
	pub total_sessions: u64,
	/// Sum of watched seconds
	pub total_watch_time: f64,
	/// Distinct videos with at least one session
	pub videos_watched: u64,
	/// Distinct videos with at least one completed session
	pub videos_completed: u64,
	/// Mean completion percentage
	pub average_completion_rate: f64,
	/// Mean over sessions that have an engagement score
	pub average_engagement_score: f64,
	#[serde(default)]
	pub progression: Vec<ProgressPoint>,
	#[serde(default)]
	pub trend: Vec<TrendBucket>,
	pub last_recomputed_at: DateTime<Utc>,
}

impl UserAnalyticsAggregate {
	/// Compute a learner's aggregate from all of their sessions.
	///
	/// # Errors
	/// Returns `ViewingError::EmptyAggregation` when `sessions` is empty.
	pub fn from_sessions(
		user_id: &str,
		sessions: &[ViewingSession],
		now: DateTime<Utc>,
	) -> Result<Self> {
		if sessions.is_empty() {
			return Err(ViewingError::EmptyAggregation(format!("user {user_id}")));
		}

		let mut ordered: Vec<&ViewingSession> = sessions.iter().collect();
		ordered.sort_by(|a, b| {
			a.started_at
				.cmp(&b.started_at)
				.then_with(|| a.id.cmp(&b.id))
		});

		let mut videos_watched: HashSet<&str> = HashSet::new();
		let mut videos_completed: HashSet<&str> = HashSet::new();
		let mut total_watch_time = 0.0;
		let mut completion_sum = 0.0;
		let mut engagement_sum = 0.0;
		let mut engagement_count = 0u64;
		let mut daily: BTreeMap<String, TrendBucket> = BTreeMap::new();
		let mut progression = Vec::with_capacity(ordered.len());

		for session in &ordered {
			videos_watched.insert(&session.video_id);
			if session.completed {
				videos_completed.insert(&session.video_id);
			}
			total_watch_time += session.watched_seconds;
			completion_sum += session.completion_percentage;
			if let Some(score) = session.engagement_score {
				engagement_sum += score;
				engagement_count += 1;
			}

			let date = session.started_at.format("%Y-%m-%d").to_string();
			let bucket = daily.entry(date.clone()).or_insert_with(|| TrendBucket {
				date,
				sessions: 0,
				watch_time: 0.0,
				completions: 0,
			});
			bucket.sessions += 1;
			bucket.watch_time += session.watched_seconds;
			if session.completed {
				bucket.completions += 1;
			}

			progression.push(ProgressPoint {
				session_id: session.id.to_string(),
				video_id: session.video_id.clone(),
				started_at: session.started_at,
				completion_percentage: session.completion_percentage,
				skill_score: score_session(session).skill_score,
			});
		}

		let total_sessions = ordered.len() as u64;
		Ok(Self {
			user_id: user_id.to_string(),
			total_sessions,
			total_watch_time,
			videos_watched: videos_watched.len() as u64,
			videos_completed: videos_completed.len() as u64,
			average_completion_rate: guarded_div(completion_sum, total_sessions as f64),
			average_engagement_score: guarded_div(engagement_sum, engagement_count as f64),
			progression,
			trend: daily.into_values().collect(),
			last_recomputed_at: now,
		})
	}
}
