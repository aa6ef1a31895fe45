// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Layered configuration for Lectern viewing analytics.
//!
//! This crate provides:
//! - Layered configuration from multiple sources (defaults, TOML file, environment)
//! - Type-safe configuration with validation
//! - Consistent environment variable naming (`LECTERN_*`)
//!
//! # Usage
//!
//! ```ignore
//! use lectern_server_config::load_config;
//!
//! let config = load_config()?;
//! println!("Database at {}", config.database.url);
//! ```

pub mod error;
pub mod layer;
pub mod sections;
pub mod sources;

pub use error::ConfigError;
pub use layer::ServerConfigLayer;
pub use sections::*;
pub use sources::{
	ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource, SYSTEM_CONFIG_PATH,
};

use tracing::{debug, info};

/// Fully resolved configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerConfig {
	pub database: DatabaseConfig,
	pub logging: LoggingConfig,
	pub aggregation: AggregationConfig,
}

/// Load configuration from all sources with standard precedence.
///
/// Precedence (highest to lowest):
/// 1. Environment variables (`LECTERN_*`)
/// 2. Config file (`/etc/lectern/viewing.toml`)
/// 3. Built-in defaults
pub fn load_config() -> Result<ServerConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::system()),
		Box::new(EnvSource),
	])
}

/// Load configuration with a custom config file path.
pub fn load_config_with_file(
	config_path: impl Into<std::path::PathBuf>,
) -> Result<ServerConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(config_path)),
		Box::new(EnvSource),
	])
}

/// Merge sources in precedence order and resolve.
pub fn load_from_sources(
	mut sources: Vec<Box<dyn ConfigSource>>,
) -> Result<ServerConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = ServerConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		let layer = source.load()?;
		merged.merge(layer);
	}

	finalize(merged)
}

/// Finalize configuration layer into resolved config.
fn finalize(layer: ServerConfigLayer) -> Result<ServerConfig, ConfigError> {
	let database = layer.database.unwrap_or_default().finalize();
	let logging = layer.logging.unwrap_or_default().finalize();
	let aggregation = layer.aggregation.unwrap_or_default().finalize();

	validate_config(&database, &logging)?;

	info!(
		database = %database.url,
		busy_timeout_ms = database.busy_timeout_ms,
		log_level = %logging.level,
		recompute_on_write = aggregation.recompute_on_write,
		recompute_user_on_write = aggregation.recompute_user_on_write,
		"Viewing configuration loaded"
	);

	Ok(ServerConfig {
		database,
		logging,
		aggregation,
	})
}

/// Validate cross-field configuration rules.
fn validate_config(database: &DatabaseConfig, logging: &LoggingConfig) -> Result<(), ConfigError> {
	if !database.url.starts_with("sqlite:") {
		return Err(ConfigError::Validation(format!(
			"LECTERN_DATABASE_URL must be a sqlite: URL, got '{}'",
			database.url
		)));
	}
	if logging.level.trim().is_empty() {
		return Err(ConfigError::Validation(
			"LECTERN_LOG_LEVEL must not be blank".to_string(),
		));
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;

	struct FixedSource(ServerConfigLayer);

	impl ConfigSource for FixedSource {
		fn name(&self) -> &'static str {
			"fixed"
		}

		fn precedence(&self) -> Precedence {
			Precedence::Environment
		}

		fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
			Ok(self.0.clone())
		}
	}

	#[test]
	fn test_defaults() {
		let config = load_from_sources(vec![Box::new(DefaultsSource)]).unwrap();
		assert_eq!(config, ServerConfig::default());
		assert_eq!(config.database.url, DEFAULT_DATABASE_URL);
		assert_eq!(config.logging.level, "info");
	}

	#[test]
	fn test_higher_precedence_wins_regardless_of_order() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(
			file,
			"[database]\nurl = \"sqlite:./from-file.db\"\n[logging]\nlevel = \"debug\""
		)
		.unwrap();

		let env = FixedSource(ServerConfigLayer {
			database: Some(DatabaseConfigLayer {
				url: Some("sqlite:./from-env.db".to_string()),
				..Default::default()
			}),
			..Default::default()
		});

		let config = load_from_sources(vec![
			Box::new(env),
			Box::new(TomlSource::new(file.path())),
			Box::new(DefaultsSource),
		])
		.unwrap();

		assert_eq!(config.database.url, "sqlite:./from-env.db");
		assert_eq!(config.logging.level, "debug");
		assert!(config.aggregation.recompute_on_write);
	}

	#[test]
	fn test_rejects_non_sqlite_url() {
		let database = DatabaseConfig {
			url: "postgres://localhost/lectern".to_string(),
			..Default::default()
		};
		let err = validate_config(&database, &LoggingConfig::default()).unwrap_err();
		assert!(matches!(err, ConfigError::Validation(_)));
	}

	#[test]
	fn test_rejects_blank_level() {
		let logging = LoggingConfig {
			level: "  ".to_string(),
		};
		let err = validate_config(&DatabaseConfig::default(), &logging).unwrap_err();
		assert!(matches!(err, ConfigError::Validation(_)));
	}
}
