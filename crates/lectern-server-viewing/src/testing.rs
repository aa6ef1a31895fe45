// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use chrono::{DateTime, TimeZone, Utc};
use lectern_viewing_core::{DeviceCategory, NewViewingSession, RoleScopedId, Role};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::schema::run_migrations;

/// In-memory pool. A single long-lived connection keeps every query on the
/// same database.
pub async fn create_test_pool() -> SqlitePool {
	let pool = SqlitePoolOptions::new()
		.max_connections(1)
		.idle_timeout(None)
		.max_lifetime(None)
		.connect("sqlite::memory:")
		.await
		.unwrap();
	run_migrations(&pool).await.unwrap();
	pool
}

pub fn base_time() -> DateTime<Utc> {
	Utc.with_ymd_and_hms(2026, 5, 4, 9, 0, 0).unwrap()
}

pub fn new_session(id: &str, user: &str, video: &str) -> NewViewingSession {
	NewViewingSession {
		id: id.to_string(),
		user_id: user.to_string(),
		role_scoped_id: RoleScopedId::generate(user, Role::Learner)
			.unwrap()
			.to_string(),
		video_id: video.to_string(),
		started_at: Some(base_time()),
		video_duration_seconds: 600.0,
		playback_speed: None,
		device: Some(DeviceCategory::Desktop),
		access_method: None,
		skill_level: None,
		learning_path: None,
	}
}
