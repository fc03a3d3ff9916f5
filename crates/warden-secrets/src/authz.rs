// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Storage-backed authorization and role management.
//!
//! [`AuthorizationEngine`] loads a principal's roles and sharing grant from
//! the repositories, then defers the actual decision to the pure
//! [`warden_auth::is_allowed`] function. Access checks themselves are never
//! audited here; the calling operation owns the audit entry so each request
//! produces exactly one. Role management operations, which are requests in
//! their own right, are audited directly.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;

use warden_audit::{AuditAction, AuditTrail};
use warden_auth::{
	is_allowed, AuthError, Permission, ResourceAttrs, Role, RoleAttr, RoleId, RoleSpec, SecretType,
	ShareAttr, SubjectAttrs, UserId,
};
use warden_db::{RoleRepository, SecretRecord, SecretRepository, ShareRepository};

use crate::error::{Result, SecretsError};
use crate::record_audit;

/// Resource attributes of a stored secret, as the decision engine sees them.
pub(crate) fn resource_attrs(record: &SecretRecord) -> ResourceAttrs {
	ResourceAttrs {
		secret_key: record.key.clone(),
		secret_type: record.secret_type,
		owner_id: record.owner_id,
	}
}

pub struct AuthorizationEngine {
	secrets: SecretRepository,
	roles: RoleRepository,
	shares: ShareRepository,
	audit: Arc<dyn AuditTrail>,
}

impl AuthorizationEngine {
	pub fn new(
		secrets: SecretRepository,
		roles: RoleRepository,
		shares: ShareRepository,
		audit: Arc<dyn AuditTrail>,
	) -> Self {
		Self {
			secrets,
			roles,
			shares,
			audit,
		}
	}

	/// The principal's roles reduced to decision attributes.
	pub(crate) async fn role_attrs(&self, user_id: UserId) -> Result<Vec<RoleAttr>> {
		let mut attrs = Vec::new();
		for role in self.roles.list_for_user(user_id).await? {
			let pattern = role.compiled_pattern()?;
			attrs.push(RoleAttr {
				permissions: role.permissions,
				pattern,
			});
		}
		Ok(attrs)
	}

	/// Load the full subject for a decision against `resource`.
	///
	/// The sharing grant is only consulted for personal secrets the principal
	/// does not own; everything else decides on roles alone.
	pub(crate) async fn subject_attrs(
		&self,
		user_id: UserId,
		resource: &ResourceAttrs,
	) -> Result<SubjectAttrs> {
		let mut subject = SubjectAttrs::new(user_id);
		subject.roles = self.role_attrs(user_id).await?;

		if resource.secret_type == SecretType::Personal && resource.owner_id != Some(user_id) {
			if let Some(share) = self
				.shares
				.get_active(&resource.secret_key, user_id)
				.await?
			{
				subject.share = Some(ShareAttr {
					level: share.permission_level,
					expires_at: share.expires_at,
				});
			}
		}

		Ok(subject)
	}

	/// Whether `user_id` may perform `action` on an already-loaded secret.
	pub(crate) async fn allows(
		&self,
		user_id: UserId,
		resource: &ResourceAttrs,
		action: Permission,
	) -> Result<bool> {
		let subject = self.subject_attrs(user_id, resource).await?;
		Ok(is_allowed(&subject, action, resource))
	}

	/// Standalone access check by key.
	///
	/// A missing or deleted key is `NotFound`; an existing key the principal
	/// may not touch is `Unauthorized`. Not audited; see the module docs.
	#[tracing::instrument(skip(self), fields(user_id = %user_id, action = %action))]
	pub async fn check_access(
		&self,
		user_id: UserId,
		secret_key: &str,
		action: Permission,
	) -> Result<()> {
		let record = self
			.secrets
			.get_latest(secret_key)
			.await?
			.ok_or(SecretsError::NotFound)?;
		let resource = resource_attrs(&record);
		if self.allows(user_id, &resource, action).await? {
			Ok(())
		} else {
			Err(SecretsError::Unauthorized)
		}
	}

	/// Attach a validated role to a user.
	#[tracing::instrument(skip(self, spec), fields(user_id = %user_id, role_name = %spec.name))]
	pub async fn assign_role(&self, user_id: UserId, spec: RoleSpec) -> Result<Role> {
		let now = Utc::now();
		let role = Role {
			id: RoleId::generate(),
			user_id,
			name: spec.name,
			permissions: spec.permissions,
			path_pattern: spec.path_pattern,
			created_at: now,
			updated_at: now,
		};
		self.roles.insert(&role).await?;

		record_audit(
			self.audit.as_ref(),
			Some(user_id),
			AuditAction::AssignRole,
			"",
			json!({
				"role_id": role.id,
				"role_name": role.name,
				"permissions": role.permissions,
				"path_pattern": role.path_pattern,
			}),
		)
		.await;

		Ok(role)
	}

	/// Convenience wrapper for the common pattern-scoped role.
	pub async fn create_path_role(
		&self,
		user_id: UserId,
		name: &str,
		permissions: Vec<Permission>,
		path_pattern: &str,
	) -> Result<Role> {
		let spec = RoleSpec::new(name, permissions, Some(path_pattern))?;
		self.assign_role(user_id, spec).await
	}

	/// Replace a role's permission set.
	#[tracing::instrument(skip(self, permissions))]
	pub async fn update_role_permissions(
		&self,
		role_id: RoleId,
		permissions: Vec<Permission>,
	) -> Result<Role> {
		if permissions.is_empty() {
			return Err(AuthError::EmptyPermissions.into());
		}
		let mut deduped: Vec<Permission> = Vec::with_capacity(permissions.len());
		for p in permissions {
			if !deduped.contains(&p) {
				deduped.push(p);
			}
		}

		let role = self
			.roles
			.get_by_id(role_id)
			.await?
			.ok_or(SecretsError::RoleNotFound)?;
		if !self.roles.update_permissions(role_id, &deduped).await? {
			return Err(SecretsError::RoleNotFound);
		}

		record_audit(
			self.audit.as_ref(),
			Some(role.user_id),
			AuditAction::UpdateRole,
			"",
			json!({
				"role_id": role_id,
				"role_name": role.name,
				"permissions": deduped,
			}),
		)
		.await;

		self.roles
			.get_by_id(role_id)
			.await?
			.ok_or(SecretsError::RoleNotFound)
	}

	/// Detach and delete a role.
	#[tracing::instrument(skip(self))]
	pub async fn remove_role(&self, role_id: RoleId) -> Result<()> {
		let role = self
			.roles
			.get_by_id(role_id)
			.await?
			.ok_or(SecretsError::RoleNotFound)?;
		if !self.roles.delete(role_id).await? {
			return Err(SecretsError::RoleNotFound);
		}

		record_audit(
			self.audit.as_ref(),
			Some(role.user_id),
			AuditAction::RevokeRole,
			"",
			json!({ "role_id": role_id, "role_name": role.name }),
		)
		.await;

		Ok(())
	}

	/// Union of permissions across the user's roles, in canonical order.
	///
	/// Informational only; authoritative decisions always go through
	/// [`check_access`](Self::check_access), which applies path patterns.
	pub async fn get_user_permissions(&self, user_id: UserId) -> Result<Vec<Permission>> {
		let roles = self.roles.list_for_user(user_id).await?;
		Ok(Permission::all()
			.iter()
			.copied()
			.filter(|p| roles.iter().any(|r| r.permissions.contains(p)))
			.collect())
	}

	pub async fn is_admin(&self, user_id: UserId) -> Result<bool> {
		Ok(self
			.roles
			.list_for_user(user_id)
			.await?
			.iter()
			.any(Role::grants_admin))
	}
}
