// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Session ingestion, aggregation and query service.

use std::sync::Arc;

use chrono::Utc;
use tracing::instrument;

use lectern_viewing_core::{
	score_session, ExportRow, NewViewingSession, SessionEvent, SessionFilter, SessionId,
	SessionSummary, SessionUpdate, SkillScores, UserAnalyticsAggregate, VideoPerformanceAggregate,
	ViewingError, ViewingSession,
};

use crate::error::{Result, ViewingServerError};
use crate::locks::EntityLocks;
use crate::repository::ViewingRepository;
use crate::tracker::SessionTracker;

/// When aggregates are refreshed after session writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregationPolicy {
	pub recompute_on_write: bool,
	pub recompute_user_on_write: bool,
}

impl Default for AggregationPolicy {
	fn default() -> Self {
		Self {
			recompute_on_write: true,
			recompute_user_on_write: true,
		}
	}
}

#[derive(Clone)]
pub struct ViewingService {
	repo: Arc<dyn ViewingRepository>,
	policy: AggregationPolicy,
	session_locks: EntityLocks,
	video_locks: EntityLocks,
	user_locks: EntityLocks,
}

impl ViewingService {
	pub fn new(repo: Arc<dyn ViewingRepository>, policy: AggregationPolicy) -> Self {
		Self {
			repo,
			policy,
			session_locks: EntityLocks::new("session"),
			video_locks: EntityLocks::new("video"),
			user_locks: EntityLocks::new("user"),
		}
	}

	pub fn policy(&self) -> AggregationPolicy {
		self.policy
	}

	/// Store a new session. Identifier format errors are returned before
	/// anything reaches storage.
	#[instrument(skip(self, input), fields(session_id = %input.id, video_id = %input.video_id))]
	pub async fn create_session(&self, input: NewViewingSession) -> Result<ViewingSession> {
		let session = input.into_session(Utc::now())?;
		self.repo.create_session(&session).await?;
		tracing::info!(
			user_id = %session.user_id,
			role_scoped_id = %session.role_scoped_id,
			"viewing session created"
		);

		self.refresh_aggregates(&session).await;
		Ok(session)
	}

	/// Apply a partial update to a stored session.
	#[instrument(skip(self, update), fields(session_id = %id))]
	pub async fn update_session(
		&self,
		id: &SessionId,
		update: SessionUpdate,
	) -> Result<ViewingSession> {
		self.mutate(id, |_| update).await
	}

	/// Apply one player event to a stored session.
	#[instrument(skip(self), fields(session_id = %id))]
	pub async fn record_event(&self, id: &SessionId, event: SessionEvent) -> Result<ViewingSession> {
		self.mutate(id, |current| event.to_update(current)).await
	}

	async fn mutate<F>(&self, id: &SessionId, build: F) -> Result<ViewingSession>
	where
		F: FnOnce(&ViewingSession) -> SessionUpdate + Send,
	{
		let (session, progress_changed) = {
			let _guard = self.session_locks.acquire(id.as_str()).await;
			let mut session = self
				.repo
				.get_session_by_id(id)
				.await?
				.ok_or_else(|| ViewingServerError::SessionNotFound(id.to_string()))?;

			let update = build(&session);
			let applied = session.apply(&update, Utc::now())?;
			self.repo.update_session(&session).await?;
			(session, applied.progress_changed)
		};

		tracing::debug!(progress_changed, ended = session.is_ended(), "viewing session updated");
		if progress_changed {
			self.refresh_aggregates(&session).await;
		}
		Ok(session)
	}

	/// Best-effort recompute after a session write. Failures never fail the write.
	async fn refresh_aggregates(&self, session: &ViewingSession) {
		if self.policy.recompute_on_write {
			if let Err(e) = self.recompute_video_aggregate(&session.video_id).await {
				tracing::warn!(
					video_id = %session.video_id,
					error = %e,
					"video aggregate recompute failed"
				);
			}
		}
		if self.policy.recompute_user_on_write {
			if let Err(e) = self.recompute_user_aggregate(&session.user_id).await {
				tracing::warn!(
					user_id = %session.user_id,
					error = %e,
					"user aggregate recompute failed"
				);
			}
		}
	}

	#[instrument(skip(self), fields(session_id = %id))]
	pub async fn get_session(&self, id: &SessionId) -> Result<ViewingSession> {
		self
			.repo
			.get_session_by_id(id)
			.await?
			.ok_or_else(|| ViewingServerError::SessionNotFound(id.to_string()))
	}

	pub async fn list_sessions_by_video(&self, video_id: &str) -> Result<Vec<ViewingSession>> {
		self.repo.list_sessions_by_video(video_id).await
	}

	pub async fn list_sessions_by_user(&self, user_id: &str) -> Result<Vec<ViewingSession>> {
		self.repo.list_sessions_by_user(user_id).await
	}

	pub async fn list_sessions_filtered(&self, filter: &SessionFilter) -> Result<Vec<ViewingSession>> {
		self.repo.list_sessions(filter).await
	}

	#[instrument(skip(self), fields(video_id = %video_id))]
	pub async fn get_video_aggregate(&self, video_id: &str) -> Result<VideoPerformanceAggregate> {
		self
			.repo
			.get_video_aggregate(video_id)
			.await?
			.ok_or_else(|| ViewingServerError::AggregateNotFound(format!("video {video_id}")))
	}

	/// Rebuild a video's aggregate from all of its sessions and replace the
	/// stored row. With no sessions the stored row is removed and
	/// `EmptyAggregation` is returned.
	#[instrument(skip(self), fields(video_id = %video_id))]
	pub async fn recompute_video_aggregate(
		&self,
		video_id: &str,
	) -> Result<VideoPerformanceAggregate> {
		let _guard = self.video_locks.acquire(video_id).await;

		let sessions = self.repo.list_sessions_by_video(video_id).await?;
		if sessions.is_empty() {
			let removed = self.repo.delete_video_aggregate(video_id).await?;
			tracing::debug!(removed, "no sessions for video");
			return Err(ViewingError::EmptyAggregation(format!("video {video_id}")).into());
		}

		let aggregate = VideoPerformanceAggregate::from_sessions(video_id, &sessions, Utc::now())?;
		self.repo.upsert_video_aggregate(&aggregate).await?;

		tracing::info!(
			total_views = aggregate.total_views,
			engagement_score = aggregate.engagement_score,
			"video aggregate recomputed"
		);
		Ok(aggregate)
	}

	#[instrument(skip(self), fields(user_id = %user_id))]
	pub async fn get_user_aggregate(&self, user_id: &str) -> Result<UserAnalyticsAggregate> {
		self
			.repo
			.get_user_aggregate(user_id)
			.await?
			.ok_or_else(|| ViewingServerError::AggregateNotFound(format!("user {user_id}")))
	}

	#[instrument(skip(self), fields(user_id = %user_id))]
	pub async fn recompute_user_aggregate(&self, user_id: &str) -> Result<UserAnalyticsAggregate> {
		let _guard = self.user_locks.acquire(user_id).await;

		let sessions = self.repo.list_sessions_by_user(user_id).await?;
		if sessions.is_empty() {
			let removed = self.repo.delete_user_aggregate(user_id).await?;
			tracing::debug!(removed, "no sessions for user");
			return Err(ViewingError::EmptyAggregation(format!("user {user_id}")).into());
		}

		let aggregate = UserAnalyticsAggregate::from_sessions(user_id, &sessions, Utc::now())?;
		self.repo.upsert_user_aggregate(&aggregate).await?;

		tracing::info!(
			total_sessions = aggregate.total_sessions,
			videos_completed = aggregate.videos_completed,
			"user aggregate recomputed"
		);
		Ok(aggregate)
	}

	#[instrument(skip(self), fields(session_id = %id))]
	pub async fn score_session(&self, id: &SessionId) -> Result<SkillScores> {
		let session = self.get_session(id).await?;
		Ok(score_session(&session))
	}

	#[instrument(skip(self, filter))]
	pub async fn summarize(&self, filter: &SessionFilter) -> Result<SessionSummary> {
		let sessions = self.repo.list_sessions(filter).await?;
		Ok(SessionSummary::from_sessions(&sessions))
	}

	#[instrument(skip(self, filter))]
	pub async fn export(&self, filter: &SessionFilter) -> Result<Vec<ExportRow>> {
		let sessions = self.repo.list_sessions(filter).await?;
		Ok(sessions.iter().map(ExportRow::from_session).collect())
	}

	/// Handle for a player reporting events against one session.
	pub fn tracker(&self, id: SessionId) -> SessionTracker {
		SessionTracker::new(self.clone(), id)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::repository::SqliteViewingRepository;
	use crate::testing::{base_time, create_test_pool, new_session};
	use async_trait::async_trait;
	use chrono::Duration;

	async fn make_service(policy: AggregationPolicy) -> ViewingService {
		let pool = create_test_pool().await;
		ViewingService::new(Arc::new(SqliteViewingRepository::new(pool)), policy)
	}

	fn manual() -> AggregationPolicy {
		AggregationPolicy {
			recompute_on_write: false,
			recompute_user_on_write: false,
		}
	}

	#[tokio::test]
	async fn test_create_rejects_bad_ids_before_storage() {
		let service = make_service(AggregationPolicy::default()).await;

		let mut input = new_session("bad-id", "user-1", "video-1");
		let err = service.create_session(input.clone()).await.unwrap_err();
		assert!(err.is_format_error());

		input.id = "SGOODSESSION1".to_string();
		input.role_scoped_id = "1UABCDE".to_string();
		let err = service.create_session(input).await.unwrap_err();
		assert!(err.is_format_error());

		assert!(service.list_sessions_by_video("video-1").await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_create_rejects_bad_ranges() {
		let service = make_service(AggregationPolicy::default()).await;
		let mut input = new_session("SRANGECHECK01", "user-1", "video-1");
		input.video_duration_seconds = 0.0;
		let err = service.create_session(input).await.unwrap_err();
		assert!(matches!(err, ViewingServerError::InvalidData(_)));
	}

	#[tokio::test]
	async fn test_create_duplicate_conflicts() {
		let service = make_service(manual()).await;
		let input = new_session("SDUPLICATE001", "user-1", "video-1");
		service.create_session(input.clone()).await.unwrap();
		let err = service.create_session(input).await.unwrap_err();
		assert!(matches!(err, ViewingServerError::Conflict(_)));
	}

	#[tokio::test]
	async fn test_create_triggers_recompute() {
		let service = make_service(AggregationPolicy::default()).await;
		service
			.create_session(new_session("STRIGGER00001", "user-1", "video-1"))
			.await
			.unwrap();

		let video = service.get_video_aggregate("video-1").await.unwrap();
		assert_eq!(video.total_views, 1);
		let user = service.get_user_aggregate("user-1").await.unwrap();
		assert_eq!(user.total_sessions, 1);
	}

	#[tokio::test]
	async fn test_manual_policy_leaves_aggregates_absent() {
		let service = make_service(manual()).await;
		service
			.create_session(new_session("SMANUAL000001", "user-1", "video-1"))
			.await
			.unwrap();

		let err = service.get_video_aggregate("video-1").await.unwrap_err();
		assert!(err.is_not_found());
	}

	#[tokio::test]
	async fn test_update_missing_session() {
		let service = make_service(manual()).await;
		let id: SessionId = "SMISSING00001".parse().unwrap();
		let err = service
			.update_session(&id, SessionUpdate::default())
			.await
			.unwrap_err();
		assert!(matches!(err, ViewingServerError::SessionNotFound(_)));
	}

	#[tokio::test]
	async fn test_events_accumulate_and_refresh() {
		let service = make_service(AggregationPolicy::default()).await;
		let created = service
			.create_session(new_session("SEVENTS000001", "user-1", "video-1"))
			.await
			.unwrap();
		let id = created.id.clone();

		service.record_event(&id, SessionEvent::Pause).await.unwrap();
		service.record_event(&id, SessionEvent::Pause).await.unwrap();
		service.record_event(&id, SessionEvent::Seek).await.unwrap();
		service
			.record_event(
				&id,
				SessionEvent::Progress {
					watched_seconds: 600.0,
					completion_percentage: 100.0,
				},
			)
			.await
			.unwrap();
		let ended = service
			.record_event(
				&id,
				SessionEvent::End {
					at: base_time() + Duration::minutes(12),
					completed: true,
				},
			)
			.await
			.unwrap();

		assert_eq!(ended.pause_count, 2);
		assert_eq!(ended.seek_count, 1);
		assert_eq!(ended.max_progress_reached, 100.0);
		assert!(ended.engagement_score.is_some());
		assert_eq!(ended.duration_seconds(), Some(720));

		let video = service.get_video_aggregate("video-1").await.unwrap();
		assert_eq!(video.completion_rate, 100.0);
		assert_eq!(video.average_pause_count, 2.0);

		let err = service
			.record_event(&id, SessionEvent::Replay)
			.await
			.unwrap_err();
		assert!(matches!(
			err,
			ViewingServerError::Core(ViewingError::SessionEnded(_))
		));

		let update = SessionUpdate {
			skill_level: Some("advanced".to_string()),
			..Default::default()
		};
		let tagged = service.update_session(&id, update).await.unwrap();
		assert_eq!(tagged.skill_level.as_deref(), Some("advanced"));
	}

	#[tokio::test]
	async fn test_counter_events_do_not_recompute() {
		let service = make_service(AggregationPolicy::default()).await;
		let created = service
			.create_session(new_session("SCOUNTERS0001", "user-1", "video-1"))
			.await
			.unwrap();
		let before = service.get_video_aggregate("video-1").await.unwrap();

		service
			.record_event(&created.id, SessionEvent::Pause)
			.await
			.unwrap();

		let after = service.get_video_aggregate("video-1").await.unwrap();
		assert_eq!(after, before);
	}

	#[tokio::test]
	async fn test_entity_locks_released_after_writes() {
		let service = make_service(AggregationPolicy::default()).await;
		for i in 0..50 {
			let created = service
				.create_session(new_session(
					&format!("SLOCKS{i:06}"),
					&format!("user-{i}"),
					&format!("video-{i}"),
				))
				.await
				.unwrap();
			service
				.record_event(&created.id, SessionEvent::Pause)
				.await
				.unwrap();
			service
				.record_event(
					&created.id,
					SessionEvent::Progress {
						watched_seconds: 30.0,
						completion_percentage: 5.0,
					},
				)
				.await
				.unwrap();
		}

		assert_eq!(service.session_locks.tracked_keys(), 0);
		assert_eq!(service.video_locks.tracked_keys(), 0);
		assert_eq!(service.user_locks.tracked_keys(), 0);
	}

	#[tokio::test]
	async fn test_recompute_empty_removes_row() {
		let service = make_service(manual()).await;
		let err = service
			.recompute_video_aggregate("video-none")
			.await
			.unwrap_err();
		assert!(matches!(
			err,
			ViewingServerError::Core(ViewingError::EmptyAggregation(_))
		));
		assert!(service.get_video_aggregate("video-none").await.is_err());

		let err = service.recompute_user_aggregate("user-none").await.unwrap_err();
		assert!(matches!(
			err,
			ViewingServerError::Core(ViewingError::EmptyAggregation(_))
		));
	}

	#[tokio::test]
	async fn test_concurrent_recomputes_converge() {
		let service = make_service(manual()).await;
		for i in 0..8u32 {
			let mut input = new_session(
				&format!("SCONCURRENT{i:02}"),
				&format!("user-{}", i % 3),
				"video-1",
			);
			input.started_at = Some(base_time() + Duration::minutes(i64::from(i)));
			let created = service.create_session(input).await.unwrap();
			service
				.update_session(
					&created.id,
					SessionUpdate {
						watched_seconds: Some(f64::from(i) * 75.0),
						completion_percentage: Some(f64::from(i) * 12.5),
						completed: Some(i % 2 == 0),
						pause_count: Some(i),
						..Default::default()
					},
				)
				.await
				.unwrap();
		}

		let (a, b) = tokio::join!(
			service.recompute_video_aggregate("video-1"),
			service.recompute_video_aggregate("video-1"),
		);
		let a = a.unwrap();
		let b = b.unwrap();
		assert!(a.same_metrics(&b));

		let stored = service.get_video_aggregate("video-1").await.unwrap();
		assert!(stored.same_metrics(&a));
		assert_eq!(stored.total_views, 8);
		assert_eq!(stored.unique_viewers, 3);
	}

	#[tokio::test]
	async fn test_summarize_export_and_score() {
		let service = make_service(manual()).await;
		let mut first = new_session("SSUMMARY00001", "user-1", "video-1");
		first.skill_level = Some("beginner".to_string());
		let first = service.create_session(first).await.unwrap();
		service
			.create_session(new_session("SSUMMARY00002", "user-2", "video-2"))
			.await
			.unwrap();

		let summary = service.summarize(&SessionFilter::new()).await.unwrap();
		assert_eq!(summary.total_sessions, 2);
		assert_eq!(summary.unique_videos, 2);
		assert_eq!(summary.skill_levels.get("beginner"), Some(&1));

		let empty = service
			.summarize(&SessionFilter::new().with_user("nobody"))
			.await
			.unwrap();
		assert_eq!(empty.average_completion_rate, 0.0);
		assert_eq!(empty.average_engagement_score, 0.0);

		let rows = service
			.export(&SessionFilter::new().with_video("video-1"))
			.await
			.unwrap();
		assert_eq!(rows.len(), 1);
		assert_eq!(rows[0].session_id, "SSUMMARY00001");

		let scores = service.score_session(&first.id).await.unwrap();
		assert_eq!(scores, score_session(&first));
	}

	struct FailingAggregates(SqliteViewingRepository);

	#[async_trait]
	impl ViewingRepository for FailingAggregates {
		async fn create_session(&self, session: &ViewingSession) -> Result<()> {
			self.0.create_session(session).await
		}
		async fn get_session_by_id(&self, id: &SessionId) -> Result<Option<ViewingSession>> {
			self.0.get_session_by_id(id).await
		}
		async fn update_session(&self, session: &ViewingSession) -> Result<()> {
			self.0.update_session(session).await
		}
		async fn list_sessions_by_video(&self, video_id: &str) -> Result<Vec<ViewingSession>> {
			self.0.list_sessions_by_video(video_id).await
		}
		async fn list_sessions_by_user(&self, user_id: &str) -> Result<Vec<ViewingSession>> {
			self.0.list_sessions_by_user(user_id).await
		}
		async fn list_sessions(&self, filter: &SessionFilter) -> Result<Vec<ViewingSession>> {
			self.0.list_sessions(filter).await
		}
		async fn upsert_video_aggregate(&self, _aggregate: &VideoPerformanceAggregate) -> Result<()> {
			Err(ViewingServerError::InvalidData("aggregate store offline".into()))
		}
		async fn get_video_aggregate(&self, id: &str) -> Result<Option<VideoPerformanceAggregate>> {
			self.0.get_video_aggregate(id).await
		}
		async fn delete_video_aggregate(&self, id: &str) -> Result<bool> {
			self.0.delete_video_aggregate(id).await
		}
		async fn upsert_user_aggregate(&self, _aggregate: &UserAnalyticsAggregate) -> Result<()> {
			Err(ViewingServerError::InvalidData("aggregate store offline".into()))
		}
		async fn get_user_aggregate(&self, id: &str) -> Result<Option<UserAnalyticsAggregate>> {
			self.0.get_user_aggregate(id).await
		}
		async fn delete_user_aggregate(&self, id: &str) -> Result<bool> {
			self.0.delete_user_aggregate(id).await
		}
	}

	#[tokio::test]
	async fn test_recompute_failure_does_not_fail_write() {
		let pool = create_test_pool().await;
		let repo = FailingAggregates(SqliteViewingRepository::new(pool));
		let service = ViewingService::new(Arc::new(repo), AggregationPolicy::default());

		let created = service
			.create_session(new_session("SBESTEFFORT01", "user-1", "video-1"))
			.await
			.unwrap();
		assert_eq!(service.get_session(&created.id).await.unwrap(), created);
		assert!(service.get_video_aggregate("video-1").await.is_err());
	}
}
