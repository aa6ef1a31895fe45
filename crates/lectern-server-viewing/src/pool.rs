// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqliteSynchronous};

use crate::error::{Result, ViewingServerError};
use crate::schema::run_migrations;

/// Open the viewing store and bring its schema up to date.
///
/// Connections wait up to `busy_timeout` on a locked database, which covers
/// overlapping aggregate writes from concurrent recomputes.
///
/// # Errors
/// Returns `ViewingServerError::InvalidData` if the URL is not a SQLite URL,
/// or `ViewingServerError::Database` if connecting or migrating fails.
#[tracing::instrument(skip(database_url, busy_timeout), fields(busy_timeout_ms = busy_timeout.as_millis() as u64))]
pub async fn create_pool(database_url: &str, busy_timeout: Duration) -> Result<SqlitePool> {
	let options = SqliteConnectOptions::from_str(database_url)
		.map_err(|e| ViewingServerError::InvalidData(format!("invalid database URL: {e}")))?
		.journal_mode(SqliteJournalMode::Wal)
		.synchronous(SqliteSynchronous::Normal)
		.busy_timeout(busy_timeout)
		.create_if_missing(true);

	let pool = SqlitePool::connect_with(options).await?;
	run_migrations(&pool).await?;

	tracing::debug!("viewing store ready");
	Ok(pool)
}
