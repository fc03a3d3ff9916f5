// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Role entity and role-spec validation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AuthError;
use crate::pattern::PathPattern;
use crate::types::{Permission, RoleId, UserId};

/// A named bundle of permissions held by one user, optionally scoped to a
/// path pattern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
	pub id: RoleId,
	pub user_id: UserId,
	pub name: String,
	pub permissions: Vec<Permission>,
	pub path_pattern: Option<String>,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

impl Role {
	/// Compile the stored pattern text, if present.
	pub fn compiled_pattern(&self) -> Result<Option<PathPattern>, AuthError> {
		self.path_pattern
			.as_deref()
			.map(PathPattern::compile)
			.transpose()
	}

	pub fn grants_admin(&self) -> bool {
		self.permissions.contains(&Permission::Admin)
	}
}

/// Validated input for role creation.
#[derive(Debug, Clone)]
pub struct RoleSpec {
	pub name: String,
	pub permissions: Vec<Permission>,
	pub path_pattern: Option<String>,
}

impl RoleSpec {
	/// Validate a prospective role: name charset/length, non-empty
	/// deduplicated permissions, compilable pattern.
	pub fn new(
		name: &str,
		permissions: Vec<Permission>,
		path_pattern: Option<&str>,
	) -> Result<Self, AuthError> {
		let name = name.trim();
		if name.is_empty() || name.len() > 100 {
			return Err(AuthError::InvalidRoleName(
				"must be 1-100 characters".to_string(),
			));
		}
		if !name
			.chars()
			.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/' | '*' | ' '))
		{
			return Err(AuthError::InvalidRoleName(format!(
				"'{name}' contains forbidden characters"
			)));
		}

		if permissions.is_empty() {
			return Err(AuthError::EmptyPermissions);
		}
		let mut deduped: Vec<Permission> = Vec::with_capacity(permissions.len());
		for p in permissions {
			if !deduped.contains(&p) {
				deduped.push(p);
			}
		}

		if let Some(p) = path_pattern {
			PathPattern::compile(p)?;
		}

		Ok(Self {
			name: name.to_string(),
			permissions: deduped,
			path_pattern: path_pattern.map(str::to_string),
		})
	}
}
