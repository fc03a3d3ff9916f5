// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Account registration, authentication and deactivation.
//!
//! Authentication failures are deliberately uniform: unknown username, wrong
//! password and deactivated account all come back as `InvalidCredentials`,
//! with the distinction preserved only in the audit trail.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;

use warden_audit::{AuditAction, AuditTrail};
use warden_auth::{
	hash_password, validate_email, validate_username, verify_password, Role, User, UserId,
};
use warden_db::{DbError, RoleRepository, UserRepository};

use crate::error::{Result, SecretsError};
use crate::record_audit;

const MIN_PASSWORD_LEN: usize = 8;
const MAX_PASSWORD_LEN: usize = 128;

pub struct AccountManager {
	users: UserRepository,
	roles: RoleRepository,
	audit: Arc<dyn AuditTrail>,
}

impl AccountManager {
	pub fn new(users: UserRepository, roles: RoleRepository, audit: Arc<dyn AuditTrail>) -> Self {
		Self {
			users,
			roles,
			audit,
		}
	}

	/// Register a new account. Usernames are normalized to lowercase and
	/// checked against the reserved list; the password is stored as an
	/// Argon2id hash.
	#[tracing::instrument(skip(self, password, email))]
	pub async fn register_user(&self, username: &str, email: &str, password: &str) -> Result<User> {
		let username = validate_username(username)?;
		let email = validate_email(email)?;
		if password.len() < MIN_PASSWORD_LEN || password.len() > MAX_PASSWORD_LEN {
			return Err(SecretsError::InvalidPassword);
		}
		let password_hash = hash_password(password)?;

		let now = Utc::now();
		let user = User {
			id: UserId::generate(),
			username,
			email,
			password_hash,
			active: true,
			created_at: now,
			updated_at: now,
		};

		match self.users.insert(&user).await {
			Ok(()) => Ok(user),
			Err(DbError::Conflict(_)) => Err(SecretsError::AlreadyRegistered),
			Err(e) => Err(e.into()),
		}
	}

	/// Verify credentials and return the account.
	///
	/// Audited as `authenticate` on success and `failed_authentication`
	/// otherwise; the failure entry keeps the attempted username in metadata
	/// and attributes the entry to the account only when one exists.
	#[tracing::instrument(skip(self, password))]
	pub async fn authenticate(&self, username: &str, password: &str) -> Result<User> {
		let normalized = username.trim().to_lowercase();
		let user = self.users.get_by_username(&normalized).await?;

		match user {
			Some(user) if user.active && verify_password(password, &user.password_hash) => {
				record_audit(
					self.audit.as_ref(),
					Some(user.id),
					AuditAction::Authenticate,
					"",
					json!({ "username": user.username }),
				)
				.await;
				Ok(user)
			}
			other => {
				record_audit(
					self.audit.as_ref(),
					other.map(|u| u.id),
					AuditAction::FailedAuthentication,
					"",
					json!({ "username": normalized }),
				)
				.await;
				Err(SecretsError::InvalidCredentials)
			}
		}
	}

	/// Active accounts a user may share with, excluding themselves.
	pub async fn list_sharing_targets(&self, user_id: UserId) -> Result<Vec<User>> {
		Ok(self
			.users
			.list_active()
			.await?
			.into_iter()
			.filter(|u| u.id != user_id)
			.collect())
	}

	/// Deactivate an account. Admin-only; the account stops authenticating
	/// and disappears from sharing-target listings, but its data remains.
	#[tracing::instrument(skip(self))]
	pub async fn deactivate_user(&self, actor: UserId, target: UserId) -> Result<()> {
		let actor_is_admin = self
			.roles
			.list_for_user(actor)
			.await?
			.iter()
			.any(Role::grants_admin);
		if !actor_is_admin {
			return Err(SecretsError::Unauthorized);
		}

		if !self.users.set_active(target, false).await? {
			return Err(SecretsError::UserNotFound(target.to_string()));
		}

		record_audit(
			self.audit.as_ref(),
			Some(actor),
			AuditAction::System,
			"",
			json!({ "event": "user_deactivated", "user_id": target }),
		)
		.await;

		Ok(())
	}
}
