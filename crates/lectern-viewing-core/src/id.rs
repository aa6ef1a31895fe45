// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Identifier families for viewing sessions and role-scoped learners.
//!
//! Session IDs look like `S` + base-36 millisecond timestamp + 6 random
//! base-36 characters (e.g. `SM5X2K9QZ4F7A1B`). Role-scoped IDs are a
//! two-character role prefix followed by a 5-character digest of the learner
//! ID (e.g. `1LFDP00`). The digest depends only on the learner, so one
//! learner shares the same digest across every role.

use std::collections::HashSet;
use std::sync::LazyLock;

use chrono::Utc;
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ViewingError};

/// Family tag prefixed to every session identifier.
pub const SESSION_FAMILY_TAG: char = 'S';

/// Length of the role-scoped learner digest.
pub const DIGEST_LEN: usize = 5;

const RANDOM_SUFFIX_LEN: usize = 6;
const BASE36_DIGITS: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

static SESSION_ID_REGEX: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"^[A-Z][A-Z0-9]{10,}$").unwrap());

static ROLE_SCOPED_ID_REGEX: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"^1[LERA][A-Z0-9]{5}$").unwrap());

/// One family letter followed by 10 or more upper-case alphanumerics.
pub fn validate_session_id(s: &str) -> bool {
	SESSION_ID_REGEX.is_match(s)
}

/// `1`, one of `L`/`E`/`R`/`A`, then exactly 5 upper-case alphanumerics.
pub fn validate_role_scoped_id(s: &str) -> bool {
	ROLE_SCOPED_ID_REGEX.is_match(s)
}

fn to_base36(mut n: u64) -> String {
	if n == 0 {
		return "0".to_string();
	}
	let mut digits = Vec::new();
	while n > 0 {
		digits.push(BASE36_DIGITS[(n % 36) as usize]);
		n /= 36;
	}
	digits.iter().rev().map(|&b| char::from(b)).collect()
}

fn session_id_at<R: Rng + ?Sized>(millis: i64, rng: &mut R) -> String {
	let mut id = String::with_capacity(16);
	id.push(SESSION_FAMILY_TAG);
	id.push_str(&to_base36(millis.max(0) as u64));
	for _ in 0..RANDOM_SUFFIX_LEN {
		id.push(char::from(BASE36_DIGITS[rng.gen_range(0..36)]));
	}
	id
}

/// Unique identifier for a viewing session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
	/// Generate a fresh session ID from the current time and a random suffix.
	///
	/// Two calls within the same millisecond may collide; use
	/// [`generate_batch`] when distinct IDs are required.
	#[must_use]
	pub fn generate() -> Self {
		Self(session_id_at(
			Utc::now().timestamp_millis(),
			&mut rand::thread_rng(),
		))
	}

	#[must_use]
	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl std::fmt::Display for SessionId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(&self.0)
	}
}

impl std::str::FromStr for SessionId {
	type Err = ViewingError;

	fn from_str(s: &str) -> Result<Self> {
		if validate_session_id(s) {
			Ok(Self(s.to_string()))
		} else {
			Err(ViewingError::InvalidSessionId(s.to_string()))
		}
	}
}

impl TryFrom<String> for SessionId {
	type Error = ViewingError;

	fn try_from(s: String) -> Result<Self> {
		if validate_session_id(&s) {
			Ok(Self(s))
		} else {
			Err(ViewingError::InvalidSessionId(s))
		}
	}
}

impl From<SessionId> for String {
	fn from(id: SessionId) -> Self {
		id.0
	}
}

/// Platform role a learner identifier is scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
	Learner,
	Evaluator,
	Researcher,
	Admin,
	/// Any unrecognized role name
	Unknown,
}

impl Role {
	/// Two-character identifier prefix for this role.
	///
	/// `Unknown` maps to `1U`, which the role-scoped validator rejects.
	#[must_use]
	pub fn prefix(&self) -> &'static str {
		match self {
			Role::Learner => "1L",
			Role::Evaluator => "1E",
			Role::Researcher => "1R",
			Role::Admin => "1A",
			Role::Unknown => "1U",
		}
	}

	fn from_tag(tag: char) -> Self {
		match tag {
			'L' => Role::Learner,
			'E' => Role::Evaluator,
			'R' => Role::Researcher,
			'A' => Role::Admin,
			_ => Role::Unknown,
		}
	}
}

impl std::fmt::Display for Role {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Role::Learner => write!(f, "learner"),
			Role::Evaluator => write!(f, "evaluator"),
			Role::Researcher => write!(f, "researcher"),
			Role::Admin => write!(f, "admin"),
			Role::Unknown => write!(f, "unknown"),
		}
	}
}

impl From<&str> for Role {
	fn from(s: &str) -> Self {
		match s.trim().to_ascii_lowercase().as_str() {
			"learner" => Role::Learner,
			"evaluator" => Role::Evaluator,
			"researcher" => Role::Researcher,
			"admin" => Role::Admin,
			_ => Role::Unknown,
		}
	}
}

/// Deterministic 5-character digest of a learner identifier.
///
/// Shift-and-subtract string hash over UTF-16 code units in wrapping 32-bit
/// arithmetic, absolute value, base-36 upper-case. Shorter encodings are
/// left-padded with `0`; longer ones keep their trailing 5 characters.
#[must_use]
pub fn learner_digest(learner_id: &str) -> String {
	let mut hash: i32 = 0;
	for unit in learner_id.encode_utf16() {
		hash = hash
			.wrapping_shl(5)
			.wrapping_sub(hash)
			.wrapping_add(i32::from(unit));
	}

	let encoded = to_base36(u64::from(hash.unsigned_abs()));
	if encoded.len() >= DIGEST_LEN {
		encoded[encoded.len() - DIGEST_LEN..].to_string()
	} else {
		format!("{:0>width$}", encoded, width = DIGEST_LEN)
	}
}

/// Build a role-scoped identifier string without validating it.
///
/// Unknown roles produce the `1U` prefix, which never passes
/// [`validate_role_scoped_id`].
#[must_use]
pub fn raw_role_scoped_id(learner_id: &str, role: Role) -> String {
	format!("{}{}", role.prefix(), learner_digest(learner_id))
}

/// Learner identifier bound to a platform role.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoleScopedId(String);

impl RoleScopedId {
	/// Derive the role-scoped ID for a learner.
	///
	/// # Errors
	/// Returns `ViewingError::InvalidRole` for [`Role::Unknown`].
	pub fn generate(learner_id: &str, role: Role) -> Result<Self> {
		if role == Role::Unknown {
			return Err(ViewingError::InvalidRole(role.to_string()));
		}
		Ok(Self(raw_role_scoped_id(learner_id, role)))
	}

	#[must_use]
	pub fn role(&self) -> Role {
		self.0.chars().nth(1).map_or(Role::Unknown, Role::from_tag)
	}

	#[must_use]
	pub fn digest(&self) -> &str {
		&self.0[2..]
	}

	#[must_use]
	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl std::fmt::Display for RoleScopedId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(&self.0)
	}
}

impl std::str::FromStr for RoleScopedId {
	type Err = ViewingError;

	fn from_str(s: &str) -> Result<Self> {
		if validate_role_scoped_id(s) {
			Ok(Self(s.to_string()))
		} else {
			Err(ViewingError::InvalidRoleScopedId(s.to_string()))
		}
	}
}

impl TryFrom<String> for RoleScopedId {
	type Error = ViewingError;

	fn try_from(s: String) -> Result<Self> {
		if validate_role_scoped_id(&s) {
			Ok(Self(s))
		} else {
			Err(ViewingError::InvalidRoleScopedId(s))
		}
	}
}

impl From<RoleScopedId> for String {
	fn from(id: RoleScopedId) -> Self {
		id.0
	}
}

/// Which identifier family a batch should be drawn from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdFamily {
	Session,
	/// Role-scoped IDs for learners named `{learner_prefix}-{n}`
	RoleScoped { learner_prefix: String, role: Role },
}

/// Generate `count` distinct identifiers of one family.
///
/// Candidates are drawn until the set holds `count` entries; duplicates are
/// dropped and retried. IDs are returned in generation order.
///
/// # Errors
/// Returns `ViewingError::InvalidRole` for a role-scoped batch with an
/// unknown role.
pub fn generate_batch(count: usize, family: &IdFamily) -> Result<Vec<String>> {
	let mut seen = HashSet::with_capacity(count);
	let mut ids = Vec::with_capacity(count);
	let mut attempt: u64 = 0;

	while ids.len() < count {
		let candidate: String = match family {
			IdFamily::Session => SessionId::generate().into(),
			IdFamily::RoleScoped {
				learner_prefix,
				role,
			} => RoleScopedId::generate(&format!("{learner_prefix}-{attempt}"), *role)?.into(),
		};
		attempt += 1;

		if seen.insert(candidate.clone()) {
			ids.push(candidate);
		}
	}

	Ok(ids)
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;
	use rand::rngs::StdRng;
	use rand::SeedableRng;

	const KNOWN_ROLES: [Role; 4] = [Role::Learner, Role::Evaluator, Role::Researcher, Role::Admin];

	proptest! {
		#[test]
		fn session_id_always_validates(millis in 1_000_000_000_000i64..4_000_000_000_000i64, seed in any::<u64>()) {
			let mut rng = StdRng::seed_from_u64(seed);
			let id = session_id_at(millis, &mut rng);
			prop_assert!(validate_session_id(&id), "{}", id);
		}

		#[test]
		fn role_scoped_id_validates_for_known_roles(learner in ".{0,64}", idx in 0usize..4) {
			let id = RoleScopedId::generate(&learner, KNOWN_ROLES[idx]).unwrap();
			prop_assert!(validate_role_scoped_id(id.as_str()), "{}", id);
			prop_assert_eq!(id.role(), KNOWN_ROLES[idx]);
		}

		#[test]
		fn unknown_role_fallback_never_validates(learner in ".{0,64}") {
			let raw = raw_role_scoped_id(&learner, Role::Unknown);
			prop_assert!(raw.starts_with("1U"));
			prop_assert!(!validate_role_scoped_id(&raw));
		}

		#[test]
		fn digest_is_role_independent(learner in "[a-z0-9-]{1,32}") {
			let digests: HashSet<String> = KNOWN_ROLES
				.iter()
				.map(|role| RoleScopedId::generate(&learner, *role).unwrap().digest().to_string())
				.collect();
			prop_assert_eq!(digests.len(), 1);
		}

		#[test]
		fn session_id_roundtrip(millis in 1_000_000_000_000i64..4_000_000_000_000i64, seed in any::<u64>()) {
			let mut rng = StdRng::seed_from_u64(seed);
			let raw = session_id_at(millis, &mut rng);
			let id: SessionId = raw.parse().unwrap();
			prop_assert_eq!(id.to_string(), raw);
		}
	}

	#[test]
	fn test_generate_session_id() {
		let id = SessionId::generate();
		assert!(id.as_str().starts_with(SESSION_FAMILY_TAG));
		assert!(validate_session_id(id.as_str()));
	}

	#[test]
	fn test_known_digests() {
		assert_eq!(learner_digest("user-123"), "FDP00");
		assert_eq!(learner_digest("alice"), "JB8G0");
		assert_eq!(learner_digest("a"), "0002P");
		assert_eq!(learner_digest(""), "00000");
	}

	#[test]
	fn test_role_prefixes() {
		assert_eq!(RoleScopedId::generate("alice", Role::Learner).unwrap().as_str(), "1LJB8G0");
		assert_eq!(RoleScopedId::generate("alice", Role::Evaluator).unwrap().as_str(), "1EJB8G0");
		assert_eq!(RoleScopedId::generate("alice", Role::Researcher).unwrap().as_str(), "1RJB8G0");
		assert_eq!(RoleScopedId::generate("alice", Role::Admin).unwrap().as_str(), "1AJB8G0");
	}

	#[test]
	fn test_unknown_role_rejected() {
		assert_eq!(Role::from("moderator"), Role::Unknown);
		let err = RoleScopedId::generate("alice", Role::from("moderator")).unwrap_err();
		assert!(matches!(err, ViewingError::InvalidRole(_)));
		assert_eq!(raw_role_scoped_id("alice", Role::Unknown), "1UJB8G0");
		assert!(!validate_role_scoped_id("1UJB8G0"));
	}

	#[test]
	fn test_role_parse_is_case_insensitive() {
		assert_eq!(Role::from("Learner"), Role::Learner);
		assert_eq!(Role::from(" ADMIN "), Role::Admin);
	}

	#[test]
	fn test_validate_session_id() {
		assert!(validate_session_id("SABCDEFGHIJ"));
		assert!(!validate_session_id("SABCDEFGHI"));
		assert!(!validate_session_id("sABCDEFGHIJ"));
		assert!(!validate_session_id("1ABCDEFGHIJ"));
		assert!(!validate_session_id("SABCDEFGHIj"));
		assert!(!validate_session_id(""));
	}

	#[test]
	fn test_validate_role_scoped_id() {
		assert!(validate_role_scoped_id("1LABC12"));
		assert!(!validate_role_scoped_id("1LABC1"));
		assert!(!validate_role_scoped_id("1LABC123"));
		assert!(!validate_role_scoped_id("2LABC12"));
		assert!(!validate_role_scoped_id("1XABC12"));
		assert!(!validate_role_scoped_id("1Labc12"));
	}

	#[test]
	fn test_parse_rejects_invalid() {
		assert!(matches!(
			"not-an-id".parse::<SessionId>(),
			Err(ViewingError::InvalidSessionId(_))
		));
		assert!(matches!(
			"1UABCDE".parse::<RoleScopedId>(),
			Err(ViewingError::InvalidRoleScopedId(_))
		));
	}

	#[test]
	fn test_serde_validates() {
		let ok: SessionId = serde_json::from_str("\"SABCDEFGHIJ\"").unwrap();
		assert_eq!(ok.as_str(), "SABCDEFGHIJ");
		assert!(serde_json::from_str::<SessionId>("\"short\"").is_err());
		assert!(serde_json::from_str::<RoleScopedId>("\"1UABCDE\"").is_err());
	}

	#[test]
	fn test_session_batch_is_distinct_and_valid() {
		let ids = generate_batch(50, &IdFamily::Session).unwrap();
		assert_eq!(ids.len(), 50);
		assert_eq!(ids.iter().collect::<HashSet<_>>().len(), 50);
		assert!(ids.iter().all(|id| validate_session_id(id)));
	}

	#[test]
	fn test_role_scoped_batch_is_distinct_and_valid() {
		let family = IdFamily::RoleScoped {
			learner_prefix: "cohort".to_string(),
			role: Role::Learner,
		};
		let ids = generate_batch(50, &family).unwrap();
		assert_eq!(ids.len(), 50);
		assert_eq!(ids.iter().collect::<HashSet<_>>().len(), 50);
		assert!(ids.iter().all(|id| validate_role_scoped_id(id)));
	}

	#[test]
	fn test_role_scoped_batch_unknown_role() {
		let family = IdFamily::RoleScoped {
			learner_prefix: "cohort".to_string(),
			role: Role::Unknown,
		};
		assert!(generate_batch(3, &family).is_err());
		assert!(generate_batch(0, &family).unwrap().is_empty());
	}
}
