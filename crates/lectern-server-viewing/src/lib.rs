// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Viewing session storage and aggregation service for Lectern.
//!
//! # Architecture
//!
//! - `repository` - SQLite storage for sessions and aggregates
//! - `schema` - table creation
//! - `service` - ingestion, recomputation, summaries and export
//! - `tracker` - per-session event handle for players
//! - `locks` - per-entity serialization of aggregate rebuilds
//!
//! # Example
//!
//! ```ignore
//! use lectern_server_viewing::{create_pool, AggregationPolicy, SqliteViewingRepository, ViewingService};
//!
//! let pool = create_pool("sqlite:./lectern.db", Duration::from_secs(5)).await?;
//! let service = ViewingService::new(Arc::new(SqliteViewingRepository::new(pool)), AggregationPolicy::default());
//!
//! let session = service.create_session(input).await?;
//! let tracker = service.tracker(session.id.clone());
//! tracker.pause().await?;
//! ```

pub mod error;
pub mod locks;
pub mod pool;
pub mod repository;
pub mod schema;
pub mod service;
pub mod tracker;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{Result, ViewingServerError};
pub use locks::{EntityGuard, EntityLocks};
pub use pool::create_pool;
pub use repository::{SqliteViewingRepository, ViewingRepository};
pub use schema::run_migrations;
pub use service::{AggregationPolicy, ViewingService};
pub use tracker::SessionTracker;
