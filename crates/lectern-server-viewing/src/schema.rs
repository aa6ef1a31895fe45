// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Table definitions for viewing sessions and aggregates.

use sqlx::sqlite::SqlitePool;

use crate::error::Result;

const STATEMENTS: &[&str] = &[
	r#"
	CREATE TABLE IF NOT EXISTS viewing_sessions (
		id TEXT PRIMARY KEY NOT NULL,
		user_id TEXT NOT NULL,
		role_scoped_id TEXT NOT NULL,
		video_id TEXT NOT NULL,
		started_at TEXT NOT NULL,
		ended_at TEXT,
		watched_seconds REAL NOT NULL DEFAULT 0,
		video_duration_seconds REAL NOT NULL CHECK (video_duration_seconds > 0),
		completion_percentage REAL NOT NULL DEFAULT 0
			CHECK (completion_percentage >= 0 AND completion_percentage <= 100),
		completed INTEGER NOT NULL DEFAULT 0,
		pause_count INTEGER NOT NULL DEFAULT 0,
		seek_count INTEGER NOT NULL DEFAULT 0,
		replay_count INTEGER NOT NULL DEFAULT 0,
		playback_speed REAL NOT NULL DEFAULT 1.0 CHECK (playback_speed > 0),
		max_progress_reached REAL NOT NULL DEFAULT 0,
		device TEXT NOT NULL,
		access_method TEXT NOT NULL,
		engagement_score REAL,
		skill_level TEXT,
		learning_path TEXT,
		created_at TEXT NOT NULL,
		updated_at TEXT NOT NULL
	)
	"#,
	"CREATE INDEX IF NOT EXISTS idx_viewing_sessions_video ON viewing_sessions(video_id, started_at)",
	"CREATE INDEX IF NOT EXISTS idx_viewing_sessions_user ON viewing_sessions(user_id, started_at)",
	"CREATE INDEX IF NOT EXISTS idx_viewing_sessions_role_scoped ON viewing_sessions(role_scoped_id)",
	r#"
	CREATE TABLE IF NOT EXISTS video_performance_aggregates (
		video_id TEXT PRIMARY KEY NOT NULL,
		total_views INTEGER NOT NULL,
		unique_viewers INTEGER NOT NULL,
		average_watch_time REAL NOT NULL,
		completion_rate REAL NOT NULL,
		average_pause_count REAL NOT NULL,
		average_seek_count REAL NOT NULL,
		replay_rate REAL NOT NULL,
		engagement_score REAL NOT NULL,
		last_recomputed_at TEXT NOT NULL
	)
	"#,
	r#"
	CREATE TABLE IF NOT EXISTS user_analytics_aggregates (
		user_id TEXT PRIMARY KEY NOT NULL,
		total_sessions INTEGER NOT NULL,
		total_watch_time REAL NOT NULL,
		videos_watched INTEGER NOT NULL,
		videos_completed INTEGER NOT NULL,
		average_completion_rate REAL NOT NULL,
		average_engagement_score REAL NOT NULL,
		progression TEXT NOT NULL DEFAULT '[]',
		trend TEXT NOT NULL DEFAULT '[]',
		last_recomputed_at TEXT NOT NULL
	)
	"#,
];

/// Create tables and indexes. Safe to run repeatedly.
#[tracing::instrument(skip(pool))]
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
	for statement in STATEMENTS {
		sqlx::query(statement).execute(pool).await?;
	}
	tracing::debug!(statements = STATEMENTS.len(), "viewing schema ready");
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::create_test_pool;

	#[tokio::test]
	async fn test_migrations_are_idempotent() {
		let pool = create_test_pool().await;
		run_migrations(&pool).await.unwrap();

		let tables: Vec<(String,)> = sqlx::query_as(
			"SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
		)
		.fetch_all(&pool)
		.await
		.unwrap();
		let names: Vec<String> = tables.into_iter().map(|(n,)| n).collect();
		assert_eq!(
			names,
			vec![
				"user_analytics_aggregates",
				"video_performance_aggregates",
				"viewing_sessions"
			]
		);
	}
}
