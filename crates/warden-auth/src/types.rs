// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core type definitions for authentication and authorization.
//!
//! This module defines the foundational types used throughout the vault:
//!
//! - **ID newtypes**: Type-safe wrappers around UUIDs ([`UserId`], [`RoleId`],
//!   [`ShareId`], [`SecretId`]) preventing accidental mixing
//! - **[`Permission`]**: the closed action set roles may grant
//! - **[`SecretType`]**: discriminant between personally-owned and
//!   role-scoped secrets
//! - **[`PermissionLevel`]**: access level carried by a sharing grant
//!
//! All ID types implement transparent serde serialization (as UUID strings)
//! and provide conversion to/from [`uuid::Uuid`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::AuthError;

// =============================================================================
// ID Newtypes
// =============================================================================

macro_rules! define_id_type {
	($name:ident, $doc:expr) => {
		#[doc = $doc]
		#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
		#[serde(transparent)]
		pub struct $name(Uuid);

		impl $name {
			/// Create a new ID from a UUID.
			pub fn new(id: Uuid) -> Self {
				Self(id)
			}

			/// Generate a new random ID.
			pub fn generate() -> Self {
				Self(Uuid::new_v4())
			}

			/// Get the inner UUID value.
			pub fn into_inner(self) -> Uuid {
				self.0
			}

			/// Get a reference to the inner UUID.
			pub fn as_uuid(&self) -> &Uuid {
				&self.0
			}
		}

		impl fmt::Display for $name {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				write!(f, "{}", self.0)
			}
		}

		impl From<Uuid> for $name {
			fn from(id: Uuid) -> Self {
				Self(id)
			}
		}

		impl From<$name> for Uuid {
			fn from(id: $name) -> Self {
				id.0
			}
		}
	};
}

define_id_type!(UserId, "Unique identifier for a user.");
define_id_type!(RoleId, "Unique identifier for a role.");
define_id_type!(ShareId, "Unique identifier for a sharing grant.");
define_id_type!(SecretId, "Unique identifier for a single secret version row.");

// =============================================================================
// Permissions
// =============================================================================

/// Actions a role may grant on secrets.
///
/// `Admin` implies all others and bypasses path-pattern checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
	Read,
	Write,
	Delete,
	Admin,
}

impl Permission {
	/// Returns all members of the closed permission set.
	pub fn all() -> &'static [Permission] {
		&[
			Permission::Read,
			Permission::Write,
			Permission::Delete,
			Permission::Admin,
		]
	}

	/// Whether `self`, held by a role, satisfies a requested action.
	///
	/// Admin satisfies everything; otherwise an exact match is required.
	pub fn satisfies(&self, action: Permission) -> bool {
		*self == Permission::Admin || *self == action
	}
}

impl fmt::Display for Permission {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			Permission::Read => "read",
			Permission::Write => "write",
			Permission::Delete => "delete",
			Permission::Admin => "admin",
		};
		write!(f, "{s}")
	}
}

impl FromStr for Permission {
	type Err = AuthError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"read" => Ok(Permission::Read),
			"write" => Ok(Permission::Write),
			"delete" => Ok(Permission::Delete),
			"admin" => Ok(Permission::Admin),
			other => Err(AuthError::InvalidPermission(other.to_string())),
		}
	}
}

// =============================================================================
// Secret classification
// =============================================================================

/// Discriminant between personally-owned and role-scoped secrets.
///
/// Immutable after creation: a personal secret never becomes role-scoped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretType {
	/// Exclusively owned by one user; visible to others only via shares.
	Personal,
	/// Visibility governed by role permissions and path patterns.
	RoleBased,
}

impl fmt::Display for SecretType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SecretType::Personal => write!(f, "personal"),
			SecretType::RoleBased => write!(f, "role_based"),
		}
	}
}

impl FromStr for SecretType {
	type Err = AuthError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"personal" => Ok(SecretType::Personal),
			"role_based" => Ok(SecretType::RoleBased),
			other => Err(AuthError::InvalidSecretType(other.to_string())),
		}
	}
}

/// Access level carried by a sharing grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionLevel {
	ReadOnly,
	Editable,
}

impl fmt::Display for PermissionLevel {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			PermissionLevel::ReadOnly => write!(f, "read_only"),
			PermissionLevel::Editable => write!(f, "editable"),
		}
	}
}

impl FromStr for PermissionLevel {
	type Err = AuthError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"read_only" => Ok(PermissionLevel::ReadOnly),
			"editable" => Ok(PermissionLevel::Editable),
			other => Err(AuthError::InvalidPermission(other.to_string())),
		}
	}
}
