// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The secret store: encrypted, versioned CRUD with authorization and audit.
//!
//! Every public operation resolves to exactly one audit entry, success or
//! failure, with the outcome in the entry metadata. Audit append failures are
//! logged and never change the business result.
//!
//! Error policy: a key that does not exist (or is deleted) is `NotFound`; a
//! key that exists but the principal may not act on is `Unauthorized`. The
//! existence of a key is therefore visible to unauthorized principals; the
//! keys themselves carry no secret material.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use zeroize::Zeroizing;

use warden_audit::{AuditAction, AuditTrail};
use warden_auth::{Permission, PermissionLevel, ResourceAttrs, RoleAttr, SecretType, UserId};
use warden_crypto::CryptoBox;
use warden_db::{SecretRecord, SecretRepository, ShareRepository};

use crate::authz::{resource_attrs, AuthorizationEngine};
use crate::error::{Result, SecretsError};
use crate::record_audit;
use crate::validate::{sanitize_metadata, validate_key, validate_value};

const DEFAULT_PAGE_SIZE: i64 = 100;
const MAX_PAGE_SIZE: i64 = 1000;

/// Reference to a stored secret version, returned by writes.
#[derive(Debug, Clone)]
pub struct SecretHandle {
	pub key: String,
	pub version: i64,
	pub secret_type: SecretType,
	pub created_at: DateTime<Utc>,
}

/// How the sharing grant reached the principal, attached to reads/listings
/// of personal secrets the principal does not own.
#[derive(Debug, Clone)]
pub struct ShareInfo {
	pub shared_by: UserId,
	pub level: PermissionLevel,
	pub shared_at: DateTime<Utc>,
}

/// A decrypted secret as returned to an authorized caller.
///
/// `value` zeroizes on drop; callers should not copy it out longer than
/// needed.
#[derive(Debug)]
pub struct SecretView {
	pub key: String,
	pub value: Zeroizing<Vec<u8>>,
	pub version: i64,
	pub metadata: Map<String, Value>,
	pub secret_type: SecretType,
	pub share: Option<ShareInfo>,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

/// Why a secret appears in a principal's listing.
#[derive(Debug, Clone)]
pub enum SecretAccess {
	Owned,
	Shared(ShareInfo),
	Role,
	Admin,
}

/// One row of a listing; no plaintext, latest version only.
#[derive(Debug, Clone)]
pub struct SecretSummary {
	pub key: String,
	pub version: i64,
	pub secret_type: SecretType,
	pub owner_id: Option<UserId>,
	pub access: SecretAccess,
	pub updated_at: DateTime<Utc>,
}

/// One entry of a key's version history; no plaintext.
#[derive(Debug, Clone)]
pub struct VersionSummary {
	pub version: i64,
	pub metadata: Map<String, Value>,
	pub created_at: DateTime<Utc>,
}

pub struct SecretStore {
	crypto: Arc<CryptoBox>,
	secrets: SecretRepository,
	shares: ShareRepository,
	authz: Arc<AuthorizationEngine>,
	audit: Arc<dyn AuditTrail>,
}

impl SecretStore {
	pub fn new(
		crypto: Arc<CryptoBox>,
		secrets: SecretRepository,
		shares: ShareRepository,
		authz: Arc<AuthorizationEngine>,
		audit: Arc<dyn AuditTrail>,
	) -> Self {
		Self {
			crypto,
			secrets,
			shares,
			authz,
			audit,
		}
	}

	/// Store a new secret, or a new version when the key already exists.
	///
	/// A brand-new personal secret is owned by the principal. Writing under
	/// an existing key requires write authorization on it and keeps its
	/// stored type and owner; `secret_type` only applies to new keys.
	#[tracing::instrument(skip(self, plaintext, metadata), fields(principal = %principal))]
	pub async fn create(
		&self,
		key: &str,
		plaintext: &[u8],
		principal: UserId,
		metadata: &Map<String, Value>,
		secret_type: SecretType,
	) -> Result<SecretHandle> {
		let result = self
			.create_inner(key, plaintext, principal, metadata, secret_type)
			.await;
		self.audit_outcome(principal, AuditAction::Create, key, &result, |handle| {
			json!({ "version": handle.version, "secret_type": handle.secret_type })
		})
		.await;
		result
	}

	async fn create_inner(
		&self,
		key: &str,
		plaintext: &[u8],
		principal: UserId,
		metadata: &Map<String, Value>,
		secret_type: SecretType,
	) -> Result<SecretHandle> {
		validate_key(key)?;
		validate_value(plaintext)?;
		let metadata_json = sanitize_metadata(metadata)?;

		// Writing under a live key is an update in disguise; the stored type
		// and owner are immutable.
		let (secret_type, owner_id) = match self.secrets.get_latest(key).await? {
			Some(existing) => {
				self.require(principal, &resource_attrs(&existing), Permission::Write)
					.await?;
				(existing.secret_type, existing.owner_id)
			}
			None => match secret_type {
				SecretType::Personal => (SecretType::Personal, Some(principal)),
				SecretType::RoleBased => {
					let resource = ResourceAttrs {
						secret_key: key.to_string(),
						secret_type: SecretType::RoleBased,
						owner_id: None,
					};
					self.require(principal, &resource, Permission::Write).await?;
					(SecretType::RoleBased, None)
				}
			},
		};

		let blob = self.crypto.encrypt(plaintext)?;
		let record = self
			.secrets
			.insert_version(key, &blob, &metadata_json, secret_type, owner_id)
			.await?;

		Ok(handle_of(&record))
	}

	/// Fetch and decrypt a secret, latest version unless one is requested.
	#[tracing::instrument(skip(self), fields(principal = %principal))]
	pub async fn get(
		&self,
		key: &str,
		principal: UserId,
		version: Option<i64>,
	) -> Result<SecretView> {
		let result = self.get_inner(key, principal, version).await;
		self.audit_outcome(principal, AuditAction::Read, key, &result, |view| {
			json!({ "version": view.version })
		})
		.await;
		result
	}

	async fn get_inner(
		&self,
		key: &str,
		principal: UserId,
		version: Option<i64>,
	) -> Result<SecretView> {
		validate_key(key)?;

		let latest = self
			.secrets
			.get_latest(key)
			.await?
			.ok_or(SecretsError::NotFound)?;
		let resource = resource_attrs(&latest);
		self.require(principal, &resource, Permission::Read).await?;

		let record = match version {
			None => latest,
			Some(v) => self
				.secrets
				.get_version(key, v)
				.await?
				.ok_or(SecretsError::NotFound)?,
		};

		let plaintext = self
			.crypto
			.decrypt(&record.value)
			.map_err(SecretsError::DecryptionFailed)?;

		let share = if resource.secret_type == SecretType::Personal
			&& resource.owner_id != Some(principal)
		{
			self.share_info(key, principal).await?
		} else {
			None
		};

		Ok(SecretView {
			key: record.key,
			value: plaintext,
			version: record.version,
			metadata: parse_metadata(&record.metadata),
			secret_type: record.secret_type,
			share,
			created_at: record.created_at,
			updated_at: record.updated_at,
		})
	}

	/// Write a new version of an existing secret.
	#[tracing::instrument(skip(self, plaintext, metadata), fields(principal = %principal))]
	pub async fn update(
		&self,
		key: &str,
		plaintext: &[u8],
		principal: UserId,
		metadata: &Map<String, Value>,
	) -> Result<SecretHandle> {
		let result = self.update_inner(key, plaintext, principal, metadata).await;
		self.audit_outcome(principal, AuditAction::Update, key, &result, |handle| {
			json!({ "version": handle.version })
		})
		.await;
		result
	}

	async fn update_inner(
		&self,
		key: &str,
		plaintext: &[u8],
		principal: UserId,
		metadata: &Map<String, Value>,
	) -> Result<SecretHandle> {
		validate_key(key)?;
		validate_value(plaintext)?;
		let metadata_json = sanitize_metadata(metadata)?;

		let latest = self
			.secrets
			.get_latest(key)
			.await?
			.ok_or(SecretsError::NotFound)?;
		self.require(principal, &resource_attrs(&latest), Permission::Write)
			.await?;

		let blob = self.crypto.encrypt(plaintext)?;
		let record = self
			.secrets
			.insert_version(key, &blob, &metadata_json, latest.secret_type, latest.owner_id)
			.await?;

		Ok(handle_of(&record))
	}

	/// Soft-delete every version of a secret and drop its sharing grants.
	/// Returns the number of versions deleted.
	#[tracing::instrument(skip(self), fields(principal = %principal))]
	pub async fn delete(&self, key: &str, principal: UserId) -> Result<u64> {
		let result = self.delete_inner(key, principal).await;
		self.audit_outcome(principal, AuditAction::Delete, key, &result, |n| {
			json!({ "versions_deleted": n })
		})
		.await;
		result
	}

	async fn delete_inner(&self, key: &str, principal: UserId) -> Result<u64> {
		validate_key(key)?;

		let latest = self
			.secrets
			.get_latest(key)
			.await?
			.ok_or(SecretsError::NotFound)?;
		self.require(principal, &resource_attrs(&latest), Permission::Delete)
			.await?;

		let deleted = self.secrets.soft_delete_all(key).await?;
		if deleted == 0 {
			// Raced with another delete.
			return Err(SecretsError::NotFound);
		}
		self.shares.deactivate_all_for_key(key).await?;

		Ok(deleted)
	}

	/// Every secret the principal can read, latest version only, no
	/// plaintext, annotated with how access is held.
	#[tracing::instrument(skip(self), fields(principal = %principal))]
	pub async fn list(
		&self,
		principal: UserId,
		limit: Option<i64>,
		offset: Option<i64>,
	) -> Result<Vec<SecretSummary>> {
		let result = self.list_inner(principal, limit, offset).await;
		self.audit_outcome(principal, AuditAction::List, "", &result, |page| {
			json!({
				"count": page.len(),
				"keys": page.iter().map(|s| s.key.clone()).collect::<Vec<_>>(),
			})
		})
		.await;
		result
	}

	async fn list_inner(
		&self,
		principal: UserId,
		limit: Option<i64>,
		offset: Option<i64>,
	) -> Result<Vec<SecretSummary>> {
		let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE) as usize;
		let offset = offset.unwrap_or(0).max(0) as usize;

		let roles = self.authz.role_attrs(principal).await?;
		let is_admin = roles.iter().any(RoleAttr::grants_admin);

		let now = Utc::now();
		let mut live_shares = HashMap::new();
		for share in self.shares.list_for_target(principal).await? {
			let expired = share.expires_at.map(|e| now > e).unwrap_or(false);
			if !expired {
				live_shares.insert(share.secret_key.clone(), share);
			}
		}

		let mut visible = Vec::new();
		for record in self.secrets.list_latest().await? {
			let access = match record.secret_type {
				SecretType::Personal if record.owner_id == Some(principal) => {
					Some(SecretAccess::Owned)
				}
				_ if is_admin => Some(SecretAccess::Admin),
				SecretType::Personal => live_shares.get(&record.key).map(|s| {
					SecretAccess::Shared(ShareInfo {
						shared_by: s.owner_id,
						level: s.permission_level,
						shared_at: s.shared_at,
					})
				}),
				SecretType::RoleBased => roles
					.iter()
					.any(|role| {
						role.permissions.iter().any(|p| p.satisfies(Permission::Read))
							&& role
								.pattern
								.as_ref()
								.map(|pat| pat.matches(&record.key))
								.unwrap_or(false)
					})
					.then_some(SecretAccess::Role),
			};

			if let Some(access) = access {
				visible.push(SecretSummary {
					key: record.key,
					version: record.version,
					secret_type: record.secret_type,
					owner_id: record.owner_id,
					access,
					updated_at: record.updated_at,
				});
			}
		}

		Ok(visible.into_iter().skip(offset).take(limit).collect())
	}

	/// The live version history of a secret, newest first. Requires read
	/// access and is audited as a read.
	#[tracing::instrument(skip(self), fields(principal = %principal))]
	pub async fn get_versions(&self, key: &str, principal: UserId) -> Result<Vec<VersionSummary>> {
		let result = self.get_versions_inner(key, principal).await;
		self.audit_outcome(principal, AuditAction::Read, key, &result, |versions| {
			json!({ "versions": versions.len() })
		})
		.await;
		result
	}

	async fn get_versions_inner(
		&self,
		key: &str,
		principal: UserId,
	) -> Result<Vec<VersionSummary>> {
		validate_key(key)?;

		let latest = self
			.secrets
			.get_latest(key)
			.await?
			.ok_or(SecretsError::NotFound)?;
		self.require(principal, &resource_attrs(&latest), Permission::Read)
			.await?;

		let versions = self.secrets.list_versions(key).await?;
		Ok(versions
			.into_iter()
			.map(|record| VersionSummary {
				version: record.version,
				metadata: parse_metadata(&record.metadata),
				created_at: record.created_at,
			})
			.collect())
	}

	async fn require(
		&self,
		principal: UserId,
		resource: &ResourceAttrs,
		action: Permission,
	) -> Result<()> {
		if self.authz.allows(principal, resource, action).await? {
			Ok(())
		} else {
			Err(SecretsError::Unauthorized)
		}
	}

	async fn share_info(&self, key: &str, principal: UserId) -> Result<Option<ShareInfo>> {
		Ok(self
			.shares
			.get_active(key, principal)
			.await?
			.map(|s| ShareInfo {
				shared_by: s.owner_id,
				level: s.permission_level,
				shared_at: s.shared_at,
			}))
	}

	/// One audit entry per operation, success or failure; failures carry the
	/// error kind instead of operation detail.
	async fn audit_outcome<T>(
		&self,
		principal: UserId,
		action: AuditAction,
		key: &str,
		result: &Result<T>,
		success_metadata: impl FnOnce(&T) -> Value,
	) {
		let metadata = match result {
			Ok(value) => {
				let mut metadata = success_metadata(value);
				metadata["outcome"] = json!("success");
				metadata
			}
			Err(e) => json!({ "outcome": "failure", "error": e.kind() }),
		};
		record_audit(self.audit.as_ref(), Some(principal), action, key, metadata).await;
	}
}

fn handle_of(record: &SecretRecord) -> SecretHandle {
	SecretHandle {
		key: record.key.clone(),
		version: record.version,
		secret_type: record.secret_type,
		created_at: record.created_at,
	}
}

fn parse_metadata(raw: &str) -> Map<String, Value> {
	match serde_json::from_str(raw) {
		Ok(Value::Object(map)) => map,
		_ => Map::new(),
	}
}
