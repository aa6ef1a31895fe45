// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sections.

mod aggregation;
mod database;
mod logging;

pub use aggregation::{AggregationConfig, AggregationConfigLayer};
pub use database::{
	DatabaseConfig, DatabaseConfigLayer, DEFAULT_BUSY_TIMEOUT_MS, DEFAULT_DATABASE_URL,
};
pub use logging::{LoggingConfig, LoggingConfigLayer};
