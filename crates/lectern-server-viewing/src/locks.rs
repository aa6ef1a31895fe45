// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Per-entity async locks serializing session updates and aggregate rebuilds.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::instrument;

type LockMap = HashMap<String, Arc<AsyncMutex<()>>>;

/// One async mutex per entity key (session, video or user ID).
///
/// The map itself sits behind a std mutex that is never held across an
/// `.await`. Entries are removed by the last guard to release them.
#[derive(Clone)]
pub struct EntityLocks {
	name: &'static str,
	locks: Arc<Mutex<LockMap>>,
}

/// Exclusive access to one entity. Dropping it releases the key and forgets
/// the entry when nobody else holds or waits on it.
pub struct EntityGuard {
	name: &'static str,
	key: String,
	locks: Arc<Mutex<LockMap>>,
	guard: Option<OwnedMutexGuard<()>>,
}

fn lock_map(locks: &Mutex<LockMap>) -> MutexGuard<'_, LockMap> {
	locks.lock().unwrap_or_else(PoisonError::into_inner)
}

impl EntityLocks {
	pub fn new(name: &'static str) -> Self {
		Self {
			name,
			locks: Arc::new(Mutex::new(HashMap::new())),
		}
	}

	/// Wait for exclusive access to `key`. Access ends when the guard drops.
	#[instrument(skip(self), fields(locks = self.name))]
	pub async fn acquire(&self, key: &str) -> EntityGuard {
		let entry = lock_map(&self.locks)
			.entry(key.to_string())
			.or_insert_with(|| Arc::new(AsyncMutex::new(())))
			.clone();

		let guard = entry.lock_owned().await;
		EntityGuard {
			name: self.name,
			key: key.to_string(),
			locks: Arc::clone(&self.locks),
			guard: Some(guard),
		}
	}

	#[cfg(test)]
	pub(crate) fn tracked_keys(&self) -> usize {
		lock_map(&self.locks).len()
	}
}

impl Drop for EntityGuard {
	fn drop(&mut self) {
		// Release first so the map holds the only remaining reference when idle.
		drop(self.guard.take());

		let mut locks = lock_map(&self.locks);
		let idle = locks
			.get(&self.key)
			.is_some_and(|entry| Arc::strong_count(entry) == 1);
		if idle {
			locks.remove(&self.key);
			tracing::trace!(locks = self.name, key = %self.key, "released idle entity lock");
		}
	}
}
