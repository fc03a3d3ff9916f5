// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Pure access-decision engine for secret operations.
//!
//! [`is_allowed`] evaluates a subject's attributes against a resource with no
//! side effects or I/O, making the decision order easy to test in isolation.
//! The service layer is responsible for loading attributes from storage and
//! for audit logging.
//!
//! Decision order:
//!
//! 1. Any held role granting `admin` allows everything, bypassing patterns.
//! 2. The owner of a personal secret may perform any action on it.
//! 3. A live sharing grant on a personal secret allows `read`, and `write`
//!    when the grant is `editable`. Delete is never reachable via sharing.
//! 4. For role-scoped secrets, the first role whose permission set satisfies
//!    the action and whose pattern matches the key allows it.
//! 5. Otherwise the action is denied.

use chrono::{DateTime, Utc};
use tracing::instrument;

use crate::pattern::PathPattern;
use crate::types::{Permission, PermissionLevel, SecretType, UserId};

/// One held role, reduced to what the decision needs.
#[derive(Debug, Clone)]
pub struct RoleAttr {
	pub permissions: Vec<Permission>,
	/// `None` scopes the role to nothing except via `admin`.
	pub pattern: Option<PathPattern>,
}

impl RoleAttr {
	pub fn grants_admin(&self) -> bool {
		self.permissions.contains(&Permission::Admin)
	}
}

/// A sharing grant as seen by the decision, expiry included.
#[derive(Debug, Clone)]
pub struct ShareAttr {
	pub level: PermissionLevel,
	pub expires_at: Option<DateTime<Utc>>,
}

impl ShareAttr {
	/// An expired grant counts as no grant at all.
	pub fn is_live(&self, now: DateTime<Utc>) -> bool {
		match self.expires_at {
			Some(expiry) => now <= expiry,
			None => true,
		}
	}
}

/// Attributes of the principal requesting access.
#[derive(Debug, Clone)]
pub struct SubjectAttrs {
	pub user_id: UserId,
	pub roles: Vec<RoleAttr>,
	/// The active grant for (secret_key, user), if any.
	pub share: Option<ShareAttr>,
}

impl SubjectAttrs {
	pub fn new(user_id: UserId) -> Self {
		Self {
			user_id,
			roles: Vec::new(),
			share: None,
		}
	}

	pub fn is_admin(&self) -> bool {
		self.roles.iter().any(RoleAttr::grants_admin)
	}
}

/// Attributes of the secret being accessed.
#[derive(Debug, Clone)]
pub struct ResourceAttrs {
	pub secret_key: String,
	pub secret_type: SecretType,
	pub owner_id: Option<UserId>,
}

/// Evaluates whether a subject may perform `action` on a secret.
///
/// # Tracing
///
/// Instrumented at debug level with the subject, action and key; attribute
/// contents are skipped.
#[instrument(
	level = "debug",
	skip(subject, resource),
	fields(user_id = %subject.user_id, action = %action, secret_key = %resource.secret_key)
)]
pub fn is_allowed(subject: &SubjectAttrs, action: Permission, resource: &ResourceAttrs) -> bool {
	is_allowed_at(subject, action, resource, Utc::now())
}

/// [`is_allowed`] with an explicit clock, for deterministic expiry tests.
pub fn is_allowed_at(
	subject: &SubjectAttrs,
	action: Permission,
	resource: &ResourceAttrs,
	now: DateTime<Utc>,
) -> bool {
	if subject.is_admin() {
		return true;
	}

	if resource.secret_type == SecretType::Personal {
		if resource.owner_id == Some(subject.user_id) {
			return true;
		}

		if let Some(share) = &subject.share {
			if share.is_live(now) {
				return match action {
					Permission::Read => true,
					Permission::Write => share.level == PermissionLevel::Editable,
					// Only the owner or an admin may delete.
					Permission::Delete | Permission::Admin => false,
				};
			}
		}
		return false;
	}

	subject.roles.iter().any(|role| {
		role.permissions.iter().any(|p| p.satisfies(action))
			&& role
				.pattern
				.as_ref()
				.map(|pat| pat.matches(&resource.secret_key))
				.unwrap_or(false)
	})
}
