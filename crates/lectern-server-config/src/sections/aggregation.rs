// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Aggregate recomputation settings.

use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregationConfig {
	/// Rebuild the video aggregate after session writes
	pub recompute_on_write: bool,
	/// Rebuild the learner aggregate after session writes
	pub recompute_user_on_write: bool,
}

impl Default for AggregationConfig {
	fn default() -> Self {
		Self {
			recompute_on_write: true,
			recompute_user_on_write: true,
		}
	}
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct AggregationConfigLayer {
	#[serde(default)]
	pub recompute_on_write: Option<bool>,
	#[serde(default)]
	pub recompute_user_on_write: Option<bool>,
}

impl AggregationConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.recompute_on_write.is_some() {
			self.recompute_on_write = other.recompute_on_write;
		}
		if other.recompute_user_on_write.is_some() {
			self.recompute_user_on_write = other.recompute_user_on_write;
		}
	}

	pub fn finalize(self) -> AggregationConfig {
		AggregationConfig {
			recompute_on_write: self.recompute_on_write.unwrap_or(true),
			recompute_user_on_write: self.recompute_user_on_write.unwrap_or(true),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_defaults_enable_recompute() {
		let config = AggregationConfigLayer::default().finalize();
		assert_eq!(config, AggregationConfig::default());
		assert!(config.recompute_on_write);
		assert!(config.recompute_user_on_write);
	}

	#[test]
	fn test_partial_merge() {
		let mut layer = AggregationConfigLayer {
			recompute_on_write: Some(false),
			recompute_user_on_write: Some(false),
		};
		layer.merge(AggregationConfigLayer {
			recompute_on_write: None,
			recompute_user_on_write: Some(true),
		});
		let config = layer.finalize();
		assert!(!config.recompute_on_write);
		assert!(config.recompute_user_on_write);
	}
}
