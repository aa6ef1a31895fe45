// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Per-session event handle given to the player.

use chrono::{DateTime, Utc};
use tracing::instrument;

use lectern_viewing_core::{SessionEvent, SessionId, ViewingSession};

use crate::error::Result;
use crate::service::ViewingService;

/// Reports player events for exactly one session.
#[derive(Clone)]
pub struct SessionTracker {
	service: ViewingService,
	session_id: SessionId,
}

impl SessionTracker {
	pub(crate) fn new(service: ViewingService, session_id: SessionId) -> Self {
		Self {
			service,
			session_id,
		}
	}

	pub fn session_id(&self) -> &SessionId {
		&self.session_id
	}

	#[instrument(skip(self), fields(session_id = %self.session_id))]
	pub async fn record(&self, event: SessionEvent) -> Result<ViewingSession> {
		self.service.record_event(&self.session_id, event).await
	}

	pub async fn pause(&self) -> Result<ViewingSession> {
		self.record(SessionEvent::Pause).await
	}

	pub async fn seek(&self) -> Result<ViewingSession> {
		self.record(SessionEvent::Seek).await
	}

	pub async fn replay(&self) -> Result<ViewingSession> {
		self.record(SessionEvent::Replay).await
	}

	pub async fn progress(
		&self,
		watched_seconds: f64,
		completion_percentage: f64,
	) -> Result<ViewingSession> {
		self
			.record(SessionEvent::Progress {
				watched_seconds,
				completion_percentage,
			})
			.await
	}

	pub async fn end(&self, at: DateTime<Utc>, completed: bool) -> Result<ViewingSession> {
		self.record(SessionEvent::End { at, completed }).await
	}
}
