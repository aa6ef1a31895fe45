// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Repository layer for viewing session and aggregate storage.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::SqlitePool;
use tracing::instrument;

use lectern_viewing_core::{
	SessionFilter, SessionId, UserAnalyticsAggregate, VideoPerformanceAggregate, ViewingSession,
};

use crate::error::{Result, ViewingServerError};

/// Repository trait for viewing analytics storage.
#[async_trait]
pub trait ViewingRepository: Send + Sync {
	// Session operations
	async fn create_session(&self, session: &ViewingSession) -> Result<()>;
	async fn get_session_by_id(&self, id: &SessionId) -> Result<Option<ViewingSession>>;
	async fn update_session(&self, session: &ViewingSession) -> Result<()>;
	async fn list_sessions_by_video(&self, video_id: &str) -> Result<Vec<ViewingSession>>;
	async fn list_sessions_by_user(&self, user_id: &str) -> Result<Vec<ViewingSession>>;
	async fn list_sessions(&self, filter: &SessionFilter) -> Result<Vec<ViewingSession>>;

	// Video aggregate operations
	async fn upsert_video_aggregate(&self, aggregate: &VideoPerformanceAggregate) -> Result<()>;
	async fn get_video_aggregate(&self, video_id: &str)
		-> Result<Option<VideoPerformanceAggregate>>;
	async fn delete_video_aggregate(&self, video_id: &str) -> Result<bool>;

	// User aggregate operations
	async fn upsert_user_aggregate(&self, aggregate: &UserAnalyticsAggregate) -> Result<()>;
	async fn get_user_aggregate(&self, user_id: &str) -> Result<Option<UserAnalyticsAggregate>>;
	async fn delete_user_aggregate(&self, user_id: &str) -> Result<bool>;
}

/// SQLite implementation of the viewing repository.
#[derive(Clone)]
pub struct SqliteViewingRepository {
	pool: SqlitePool,
}

impl SqliteViewingRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}
}

const SESSION_COLUMNS: &str = "id, user_id, role_scoped_id, video_id, started_at, ended_at, \
	 watched_seconds, video_duration_seconds, completion_percentage, completed, \
	 pause_count, seek_count, replay_count, playback_speed, max_progress_reached, \
	 device, access_method, engagement_score, skill_level, learning_path, \
	 created_at, updated_at";

/// Fixed-width RFC 3339 so stored timestamps sort lexically.
fn format_ts(dt: &DateTime<Utc>) -> String {
	dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_ts(field: &str, value: &str) -> Result<DateTime<Utc>> {
	DateTime::parse_from_rfc3339(value)
		.map(|dt| dt.with_timezone(&Utc))
		.map_err(|e| ViewingServerError::InvalidData(format!("invalid {field}: {e}")))
}

fn count_from_db(field: &str, value: i64) -> Result<u32> {
	u32::try_from(value)
		.map_err(|_| ViewingServerError::InvalidData(format!("invalid {field}: {value}")))
}

// Database row structs for mapping
#[derive(sqlx::FromRow)]
struct SessionRow {
	id: String,
	user_id: String,
	role_scoped_id: String,
	video_id: String,
	started_at: String,
	ended_at: Option<String>,
	watched_seconds: f64,
	video_duration_seconds: f64,
	completion_percentage: f64,
	completed: i32,
	pause_count: i64,
	seek_count: i64,
	replay_count: i64,
	playback_speed: f64,
	max_progress_reached: f64,
	device: String,
	access_method: String,
	engagement_score: Option<f64>,
	skill_level: Option<String>,
	learning_path: Option<String>,
	created_at: String,
	updated_at: String,
}

impl TryFrom<SessionRow> for ViewingSession {
	type Error = ViewingServerError;

	fn try_from(row: SessionRow) -> Result<Self> {
		Ok(ViewingSession {
			id: row
				.id
				.parse()
				.map_err(|e| ViewingServerError::InvalidData(format!("stored session ID: {e}")))?,
			user_id: row.user_id,
			role_scoped_id: row.role_scoped_id.parse().map_err(|e| {
				ViewingServerError::InvalidData(format!("stored role-scoped ID: {e}"))
			})?,
			video_id: row.video_id,
			started_at: parse_ts("started_at", &row.started_at)?,
			ended_at: row
				.ended_at
				.map(|s| parse_ts("ended_at", &s))
				.transpose()?,
			watched_seconds: row.watched_seconds,
			video_duration_seconds: row.video_duration_seconds,
			completion_percentage: row.completion_percentage,
			completed: row.completed != 0,
			pause_count: count_from_db("pause_count", row.pause_count)?,
			seek_count: count_from_db("seek_count", row.seek_count)?,
			replay_count: count_from_db("replay_count", row.replay_count)?,
			playback_speed: row.playback_speed,
			max_progress_reached: row.max_progress_reached,
			device: row
				.device
				.parse()
				.map_err(|e| ViewingServerError::InvalidData(format!("invalid device: {e}")))?,
			access_method: row
				.access_method
				.parse()
				.map_err(|e| ViewingServerError::InvalidData(format!("invalid access method: {e}")))?,
			engagement_score: row.engagement_score,
			skill_level: row.skill_level,
			learning_path: row.learning_path,
			created_at: parse_ts("created_at", &row.created_at)?,
			updated_at: parse_ts("updated_at", &row.updated_at)?,
		})
	}
}

#[derive(sqlx::FromRow)]
struct VideoAggregateRow {
	video_id: String,
	total_views: i64,
	unique_viewers: i64,
	average_watch_time: f64,
	completion_rate: f64,
	average_pause_count: f64,
	average_seek_count: f64,
	replay_rate: f64,
	engagement_score: f64,
	last_recomputed_at: String,
}

impl TryFrom<VideoAggregateRow> for VideoPerformanceAggregate {
	type Error = ViewingServerError;

	fn try_from(row: VideoAggregateRow) -> Result<Self> {
		Ok(VideoPerformanceAggregate {
			video_id: row.video_id,
			total_views: row.total_views as u64,
			unique_viewers: row.unique_viewers as u64,
			average_watch_time: row.average_watch_time,
			completion_rate: row.completion_rate,
			average_pause_count: row.average_pause_count,
			average_seek_count: row.average_seek_count,
			replay_rate: row.replay_rate,
			engagement_score: row.engagement_score,
			last_recomputed_at: parse_ts("last_recomputed_at", &row.last_recomputed_at)?,
		})
	}
}

#[derive(sqlx::FromRow)]
struct UserAggregateRow {
	user_id: String,
	total_sessions: i64,
	total_watch_time: f64,
	videos_watched: i64,
	videos_completed: i64,
	average_completion_rate: f64,
	average_engagement_score: f64,
	progression: String,
	trend: String,
	last_recomputed_at: String,
}

impl TryFrom<UserAggregateRow> for UserAnalyticsAggregate {
	type Error = ViewingServerError;

	fn try_from(row: UserAggregateRow) -> Result<Self> {
		Ok(UserAnalyticsAggregate {
			user_id: row.user_id,
			total_sessions: row.total_sessions as u64,
			total_watch_time: row.total_watch_time,
			videos_watched: row.videos_watched as u64,
			videos_completed: row.videos_completed as u64,
			average_completion_rate: row.average_completion_rate,
			average_engagement_score: row.average_engagement_score,
			progression: serde_json::from_str(&row.progression)?,
			trend: serde_json::from_str(&row.trend)?,
			last_recomputed_at: parse_ts("last_recomputed_at", &row.last_recomputed_at)?,
		})
	}
}

#[async_trait]
impl ViewingRepository for SqliteViewingRepository {
	#[instrument(skip(self, session), fields(session_id = %session.id, video_id = %session.video_id))]
	async fn create_session(&self, session: &ViewingSession) -> Result<()> {
		let result = sqlx::query(
			r#"
			INSERT INTO viewing_sessions (
				id, user_id, role_scoped_id, video_id,
				started_at, ended_at,
				watched_seconds, video_duration_seconds, completion_percentage, completed,
				pause_count, seek_count, replay_count,
				playback_speed, max_progress_reached,
				device, access_method,
				engagement_score, skill_level, learning_path,
				created_at, updated_at
			)
			VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(session.id.as_str())
		.bind(&session.user_id)
		.bind(session.role_scoped_id.as_str())
		.bind(&session.video_id)
		.bind(format_ts(&session.started_at))
		.bind(session.ended_at.as_ref().map(format_ts))
		.bind(session.watched_seconds)
		.bind(session.video_duration_seconds)
		.bind(session.completion_percentage)
		.bind(if session.completed { 1 } else { 0 })
		.bind(i64::from(session.pause_count))
		.bind(i64::from(session.seek_count))
		.bind(i64::from(session.replay_count))
		.bind(session.playback_speed)
		.bind(session.max_progress_reached)
		.bind(session.device.to_string())
		.bind(session.access_method.to_string())
		.bind(session.engagement_score)
		.bind(&session.skill_level)
		.bind(&session.learning_path)
		.bind(format_ts(&session.created_at))
		.bind(format_ts(&session.updated_at))
		.execute(&self.pool)
		.await;

		match result {
			Ok(_) => Ok(()),
			Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => Err(
				ViewingServerError::Conflict(format!("session {} already exists", session.id)),
			),
			Err(e) => Err(e.into()),
		}
	}

	#[instrument(skip(self), fields(session_id = %id))]
	async fn get_session_by_id(&self, id: &SessionId) -> Result<Option<ViewingSession>> {
		let sql = format!("SELECT {SESSION_COLUMNS} FROM viewing_sessions WHERE id = ?");
		let row = sqlx::query_as::<_, SessionRow>(&sql)
			.bind(id.as_str())
			.fetch_optional(&self.pool)
			.await?;

		row.map(TryInto::try_into).transpose()
	}

	#[instrument(skip(self, session), fields(session_id = %session.id))]
	async fn update_session(&self, session: &ViewingSession) -> Result<()> {
		let result = sqlx::query(
			r#"
			UPDATE viewing_sessions SET
				ended_at = ?,
				watched_seconds = ?,
				completion_percentage = ?,
				completed = ?,
				pause_count = ?,
				seek_count = ?,
				replay_count = ?,
				playback_speed = ?,
				max_progress_reached = ?,
				device = ?,
				access_method = ?,
				engagement_score = ?,
				skill_level = ?,
				learning_path = ?,
				updated_at = ?
			WHERE id = ?
			"#,
		)
		.bind(session.ended_at.as_ref().map(format_ts))
		.bind(session.watched_seconds)
		.bind(session.completion_percentage)
		.bind(if session.completed { 1 } else { 0 })
		.bind(i64::from(session.pause_count))
		.bind(i64::from(session.seek_count))
		.bind(i64::from(session.replay_count))
		.bind(session.playback_speed)
		.bind(session.max_progress_reached)
		.bind(session.device.to_string())
		.bind(session.access_method.to_string())
		.bind(session.engagement_score)
		.bind(&session.skill_level)
		.bind(&session.learning_path)
		.bind(format_ts(&session.updated_at))
		.bind(session.id.as_str())
		.execute(&self.pool)
		.await?;

		if result.rows_affected() == 0 {
			return Err(ViewingServerError::SessionNotFound(session.id.to_string()));
		}
		Ok(())
	}

	#[instrument(skip(self), fields(video_id = %video_id))]
	async fn list_sessions_by_video(&self, video_id: &str) -> Result<Vec<ViewingSession>> {
		self
			.list_sessions(&SessionFilter::new().with_video(video_id))
			.await
	}

	#[instrument(skip(self), fields(user_id = %user_id))]
	async fn list_sessions_by_user(&self, user_id: &str) -> Result<Vec<ViewingSession>> {
		self
			.list_sessions(&SessionFilter::new().with_user(user_id))
			.await
	}

	#[instrument(skip(self, filter))]
	async fn list_sessions(&self, filter: &SessionFilter) -> Result<Vec<ViewingSession>> {
		let mut conditions: Vec<&str> = Vec::new();
		if filter.user_id.is_some() {
			conditions.push("user_id = ?");
		}
		if filter.role_scoped_id.is_some() {
			conditions.push("role_scoped_id = ?");
		}
		if filter.video_id.is_some() {
			conditions.push("video_id = ?");
		}
		if filter.from.is_some() {
			conditions.push("started_at >= ?");
		}
		if filter.to.is_some() {
			conditions.push("started_at <= ?");
		}
		if filter.skill_level.is_some() {
			conditions.push("skill_level = ?");
		}
		if filter.completed.is_some() {
			conditions.push("completed = ?");
		}

		let where_clause = if filter.is_empty() {
			String::new()
		} else {
			format!("WHERE {} ", conditions.join(" AND "))
		};
		let sql = format!(
			"SELECT {SESSION_COLUMNS} FROM viewing_sessions {where_clause}ORDER BY started_at ASC, id ASC"
		);

		let mut query = sqlx::query_as::<_, SessionRow>(&sql);
		if let Some(v) = &filter.user_id {
			query = query.bind(v);
		}
		if let Some(v) = &filter.role_scoped_id {
			query = query.bind(v);
		}
		if let Some(v) = &filter.video_id {
			query = query.bind(v);
		}
		if let Some(v) = &filter.from {
			query = query.bind(format_ts(v));
		}
		if let Some(v) = &filter.to {
			query = query.bind(format_ts(v));
		}
		if let Some(v) = &filter.skill_level {
			query = query.bind(v);
		}
		if let Some(v) = filter.completed {
			query = query.bind(if v { 1 } else { 0 });
		}

		let rows = query.fetch_all(&self.pool).await?;
		tracing::debug!(count = rows.len(), "listed viewing sessions");

		rows.into_iter().map(TryInto::try_into).collect()
	}

	#[instrument(skip(self, aggregate), fields(video_id = %aggregate.video_id))]
	async fn upsert_video_aggregate(&self, aggregate: &VideoPerformanceAggregate) -> Result<()> {
		sqlx::query(
			r#"
			INSERT INTO video_performance_aggregates (
				video_id, total_views, unique_viewers,
				average_watch_time, completion_rate,
				average_pause_count, average_seek_count,
				replay_rate, engagement_score,
				last_recomputed_at
			)
			VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
			ON CONFLICT(video_id) DO UPDATE SET
				total_views = excluded.total_views,
				unique_viewers = excluded.unique_viewers,
				average_watch_time = excluded.average_watch_time,
				completion_rate = excluded.completion_rate,
				average_pause_count = excluded.average_pause_count,
				average_seek_count = excluded.average_seek_count,
				replay_rate = excluded.replay_rate,
				engagement_score = excluded.engagement_score,
				last_recomputed_at = excluded.last_recomputed_at
			"#,
		)
		.bind(&aggregate.video_id)
		.bind(aggregate.total_views as i64)
		.bind(aggregate.unique_viewers as i64)
		.bind(aggregate.average_watch_time)
		.bind(aggregate.completion_rate)
		.bind(aggregate.average_pause_count)
		.bind(aggregate.average_seek_count)
		.bind(aggregate.replay_rate)
		.bind(aggregate.engagement_score)
		.bind(format_ts(&aggregate.last_recomputed_at))
		.execute(&self.pool)
		.await?;

		Ok(())
	}

	#[instrument(skip(self), fields(video_id = %video_id))]
	async fn get_video_aggregate(
		&self,
		video_id: &str,
	) -> Result<Option<VideoPerformanceAggregate>> {
		let row = sqlx::query_as::<_, VideoAggregateRow>(
			r#"
			SELECT video_id, total_views, unique_viewers,
				   average_watch_time, completion_rate,
				   average_pause_count, average_seek_count,
				   replay_rate, engagement_score,
				   last_recomputed_at
			FROM video_performance_aggregates
			WHERE video_id = ?
			"#,
		)
		.bind(video_id)
		.fetch_optional(&self.pool)
		.await?;

		row.map(TryInto::try_into).transpose()
	}

	#[instrument(skip(self), fields(video_id = %video_id))]
	async fn delete_video_aggregate(&self, video_id: &str) -> Result<bool> {
		let result = sqlx::query("DELETE FROM video_performance_aggregates WHERE video_id = ?")
			.bind(video_id)
			.execute(&self.pool)
			.await?;

		Ok(result.rows_affected() > 0)
	}

	#[instrument(skip(self, aggregate), fields(user_id = %aggregate.user_id))]
	async fn upsert_user_aggregate(&self, aggregate: &UserAnalyticsAggregate) -> Result<()> {
		let progression = serde_json::to_string(&aggregate.progression)?;
		let trend = serde_json::to_string(&aggregate.trend)?;

		sqlx::query(
			r#"
			INSERT INTO user_analytics_aggregates (
				user_id, total_sessions, total_watch_time,
				videos_watched, videos_completed,
				average_completion_rate, average_engagement_score,
				progression, trend,
				last_recomputed_at
			)
			VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
			ON CONFLICT(user_id) DO UPDATE SET
				total_sessions = excluded.total_sessions,
				total_watch_time = excluded.total_watch_time,
				videos_watched = excluded.videos_watched,
				videos_completed = excluded.videos_completed,
				average_completion_rate = excluded.average_completion_rate,
				average_engagement_score = excluded.average_engagement_score,
				progression = excluded.progression,
				trend = excluded.trend,
				last_recomputed_at = excluded.last_recomputed_at
			"#,
		)
		.bind(&aggregate.user_id)
		.bind(aggregate.total_sessions as i64)
		.bind(aggregate.total_watch_time)
		.bind(aggregate.videos_watched as i64)
		.bind(aggregate.videos_completed as i64)
		.bind(aggregate.average_completion_rate)
		.bind(aggregate.average_engagement_score)
		.bind(progression)
		.bind(trend)
		.bind(format_ts(&aggregate.last_recomputed_at))
		.execute(&self.pool)
		.await?;

		Ok(())
	}

	#[instrument(skip(self), fields(user_id = %user_id))]
	async fn get_user_aggregate(&self, user_id: &str) -> Result<Option<UserAnalyticsAggregate>> {
		let row = sqlx::query_as::<_, UserAggregateRow>(
			r#"
			SELECT user_id, total_sessions, total_watch_time,
				   videos_watched, videos_completed,
				   average_completion_rate, average_engagement_score,
				   progression, trend,
				   last_recomputed_at
			FROM user_analytics_aggregates
			WHERE user_id = ?
			"#,
		)
		.bind(user_id)
		.fetch_optional(&self.pool)
		.await?;

		row.map(TryInto::try_into).transpose()
	}

	#[instrument(skip(self), fields(user_id = %user_id))]
	async fn delete_user_aggregate(&self, user_id: &str) -> Result<bool> {
		let result = sqlx::query("DELETE FROM user_analytics_aggregates WHERE user_id = ?")
			.bind(user_id)
			.execute(&self.pool)
			.await?;

		Ok(result.rows_affected() > 0)
	}
}
