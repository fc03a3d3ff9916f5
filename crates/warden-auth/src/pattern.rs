// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Compiled path patterns scoping role permissions to secret keys.
//!
//! A role's pattern is compiled once at creation time into one of three
//! shapes instead of being re-parsed on every access check:
//!
//! - [`PathPattern::Exact`]: no `*` present, plain string equality
//! - [`PathPattern::Prefix`]: single trailing `*`, prefix comparison
//! - [`PathPattern::Wildcard`]: `*` anywhere else, anchored regex with each
//!   `*` converted to `.*` and all other segments literal-escaped
//!
//! The whole key must match; there are no partial matches.

use std::fmt;

use regex::Regex;

use crate::error::AuthError;

/// A compiled glob-like pattern over secret keys.
#[derive(Debug, Clone)]
pub enum PathPattern {
	Exact(String),
	Prefix(String),
	Wildcard(Regex),
}

impl PathPattern {
	/// Compile a pattern string.
	///
	/// # Errors
	/// Returns `AuthError::InvalidPattern` for empty patterns or patterns
	/// whose escaped regex form fails to compile.
	pub fn compile(pattern: &str) -> Result<Self, AuthError> {
		if pattern.is_empty() {
			return Err(AuthError::InvalidPattern("empty pattern".to_string()));
		}

		let star_count = pattern.matches('*').count();
		if star_count == 0 {
			return Ok(PathPattern::Exact(pattern.to_string()));
		}

		if star_count == 1 && pattern.ends_with('*') {
			return Ok(PathPattern::Prefix(
				pattern[..pattern.len() - 1].to_string(),
			));
		}

		let escaped = pattern
			.split('*')
			.map(regex::escape)
			.collect::<Vec<_>>()
			.join(".*");
		let anchored = format!("^{escaped}$");
		let regex = Regex::new(&anchored)
			.map_err(|e| AuthError::InvalidPattern(format!("{pattern}: {e}")))?;
		Ok(PathPattern::Wildcard(regex))
	}

	/// Whether `key` is in scope for this pattern.
	pub fn matches(&self, key: &str) -> bool {
		match self {
			PathPattern::Exact(p) => p == key,
			PathPattern::Prefix(p) => key.starts_with(p.as_str()),
			PathPattern::Wildcard(re) => re.is_match(key),
		}
	}

	/// The original pattern text, for storage and display.
	pub fn as_str(&self) -> String {
		match self {
			PathPattern::Exact(p) => p.clone(),
			PathPattern::Prefix(p) => format!("{p}*"),
			PathPattern::Wildcard(re) => {
				// Recover the glob from the anchored regex form.
				re.as_str()
					.trim_start_matches('^')
					.trim_end_matches('$')
					.replace(".*", "*")
					.replace('\\', "")
			}
		}
	}
}

impl fmt::Display for PathPattern {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.as_str())
	}
}
