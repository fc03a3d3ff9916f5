// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Sharing grants on personal secrets.
//!
//! Only the owner of a live personal secret may share it, never with
//! themselves, and never on role-scoped secrets. Grants carry a
//! read-only/editable level and an optional expiry; an expired grant stays in
//! storage but confers nothing.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;

use warden_audit::{AuditAction, AuditTrail};
use warden_auth::{PermissionLevel, SecretType, ShareId, User, UserId};
use warden_db::{SecretRepository, ShareRecord, ShareRepository, UserRepository};

use crate::error::{Result, SecretsError};
use crate::record_audit;

/// A grant joined with the usernames on both ends, for listings.
#[derive(Debug, Clone)]
pub struct ShareView {
	pub id: ShareId,
	pub secret_key: String,
	pub owner_id: UserId,
	pub owner_username: String,
	pub shared_with_id: UserId,
	pub shared_with_username: String,
	pub permission_level: PermissionLevel,
	pub shared_at: DateTime<Utc>,
	pub expires_at: Option<DateTime<Utc>>,
}

pub struct SharingManager {
	secrets: SecretRepository,
	shares: ShareRepository,
	users: UserRepository,
	audit: Arc<dyn AuditTrail>,
}

impl SharingManager {
	pub fn new(
		secrets: SecretRepository,
		shares: ShareRepository,
		users: UserRepository,
		audit: Arc<dyn AuditTrail>,
	) -> Self {
		Self {
			secrets,
			shares,
			users,
			audit,
		}
	}

	/// Grant `target_username` access to the owner's personal secret.
	///
	/// Re-sharing with the same target refreshes the existing grant in place,
	/// updating level and expiry.
	#[tracing::instrument(skip(self), fields(owner = %owner, target = %target_username))]
	pub async fn share(
		&self,
		secret_key: &str,
		owner: UserId,
		target_username: &str,
		level: PermissionLevel,
		expires_at: Option<DateTime<Utc>>,
	) -> Result<ShareRecord> {
		let target = self.resolve_target(target_username).await?;
		if !target.active {
			return Err(SecretsError::UserNotFound(target_username.to_string()));
		}
		if target.id == owner {
			return Err(SecretsError::CannotShareWithSelf);
		}

		let record = self
			.secrets
			.get_latest(secret_key)
			.await?
			.ok_or(SecretsError::NotFound)?;
		if record.secret_type != SecretType::Personal || record.owner_id != Some(owner) {
			return Err(SecretsError::Unauthorized);
		}

		let share = self
			.shares
			.upsert(secret_key, owner, target.id, level, expires_at)
			.await?;

		record_audit(
			self.audit.as_ref(),
			Some(owner),
			AuditAction::SecretShare,
			secret_key,
			json!({
				"shared_with": target.username,
				"shared_with_id": target.id,
				"permission_level": level,
				"expires_at": expires_at,
			}),
		)
		.await;

		Ok(share)
	}

	/// Revoke the owner's grant to `target_username`.
	#[tracing::instrument(skip(self), fields(owner = %owner, target = %target_username))]
	pub async fn revoke(
		&self,
		secret_key: &str,
		owner: UserId,
		target_username: &str,
	) -> Result<()> {
		let target = self.resolve_target(target_username).await?;

		if !self.shares.deactivate(secret_key, owner, target.id).await? {
			return Err(SecretsError::ShareNotFound);
		}

		record_audit(
			self.audit.as_ref(),
			Some(owner),
			AuditAction::SecretRevoke,
			secret_key,
			json!({
				"shared_with": target.username,
				"shared_with_id": target.id,
			}),
		)
		.await;

		Ok(())
	}

	/// The level `user_id` currently holds on `secret_key` via sharing.
	pub async fn permission_for(
		&self,
		secret_key: &str,
		user_id: UserId,
	) -> Result<PermissionLevel> {
		let share = self
			.shares
			.get_active(secret_key, user_id)
			.await?
			.ok_or(SecretsError::NotShared)?;

		if let Some(expiry) = share.expires_at {
			if Utc::now() > expiry {
				return Err(SecretsError::ShareExpired);
			}
		}
		Ok(share.permission_level)
	}

	/// Live grants extended to `user_id`, joined with usernames.
	pub async fn list_shared_with(&self, user_id: UserId) -> Result<Vec<ShareView>> {
		let now = Utc::now();
		let records = self.shares.list_for_target(user_id).await?;
		self.join_views(records, now).await
	}

	/// Live grants created by `owner`, joined with usernames.
	pub async fn list_created_by(&self, owner: UserId) -> Result<Vec<ShareView>> {
		let now = Utc::now();
		let records = self.shares.list_for_owner(owner).await?;
		self.join_views(records, now).await
	}

	async fn resolve_target(&self, username: &str) -> Result<User> {
		let normalized = username.trim().to_lowercase();
		self.users
			.get_by_username(&normalized)
			.await?
			.ok_or_else(|| SecretsError::UserNotFound(username.to_string()))
	}

	async fn join_views(
		&self,
		records: Vec<ShareRecord>,
		now: DateTime<Utc>,
	) -> Result<Vec<ShareView>> {
		let mut views = Vec::with_capacity(records.len());
		for record in records {
			if let Some(expiry) = record.expires_at {
				if now > expiry {
					continue;
				}
			}
			views.push(ShareView {
				id: record.id,
				secret_key: record.secret_key,
				owner_id: record.owner_id,
				owner_username: self.username_of(record.owner_id).await?,
				shared_with_id: record.shared_with_id,
				shared_with_username: self.username_of(record.shared_with_id).await?,
				permission_level: record.permission_level,
				shared_at: record.shared_at,
				expires_at: record.expires_at,
			});
		}
		Ok(views)
	}

	async fn username_of(&self, id: UserId) -> Result<String> {
		Ok(self
			.users
			.get_by_id(id)
			.await?
			.map(|u| u.username)
			.unwrap_or_else(|| "unknown".to_string()))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Duration;
	use warden_audit::SqliteAuditTrail;
	use warden_db::testing::create_vault_test_pool;

	struct Fixture {
		manager: SharingManager,
		secrets: SecretRepository,
		users: UserRepository,
	}

	async fn fixture() -> Fixture {
		let pool = create_vault_test_pool().await;
		let secrets = SecretRepository::new(pool.clone());
		let users = UserRepository::new(pool.clone());
		let manager = SharingManager::new(
			secrets.clone(),
			ShareRepository::new(pool.clone()),
			users.clone(),
			Arc::new(SqliteAuditTrail::new(pool)),
		);
		Fixture {
			manager,
			secrets,
			users,
		}
	}

	async fn add_user(fixture: &Fixture, username: &str) -> UserId {
		let now = Utc::now();
		let user = User {
			id: UserId::generate(),
			username: username.to_string(),
			email: format!("{username}@example.com"),
			password_hash: "$argon2id$stub".to_string(),
			active: true,
			created_at: now,
			updated_at: now,
		};
		fixture.users.insert(&user).await.unwrap();
		user.id
	}

	async fn add_personal_secret(fixture: &Fixture, key: &str, owner: UserId) {
		fixture
			.secrets
			.insert_version(key, b"blob", "{}", SecretType::Personal, Some(owner))
			.await
			.unwrap();
	}

	#[tokio::test]
	async fn share_and_check_level() {
		let f = fixture().await;
		let alice = add_user(&f, "alice").await;
		let bob = add_user(&f, "bob").await;
		add_personal_secret(&f, "alice/notes", alice).await;

		f.manager
			.share("alice/notes", alice, "bob", PermissionLevel::ReadOnly, None)
			.await
			.unwrap();

		assert_eq!(
			f.manager.permission_for("alice/notes", bob).await.unwrap(),
			PermissionLevel::ReadOnly
		);
	}

	#[tokio::test]
	async fn self_share_is_rejected() {
		let f = fixture().await;
		let alice = add_user(&f, "alice").await;
		add_personal_secret(&f, "alice/notes", alice).await;

		assert!(matches!(
			f.manager
				.share("alice/notes", alice, "alice", PermissionLevel::Editable, None)
				.await,
			Err(SecretsError::CannotShareWithSelf)
		));
	}

	#[tokio::test]
	async fn only_the_owner_may_share() {
		let f = fixture().await;
		let alice = add_user(&f, "alice").await;
		let bob = add_user(&f, "bob").await;
		let carol = add_user(&f, "carol").await;
		add_personal_secret(&f, "alice/notes", alice).await;

		let result = f
			.manager
			.share("alice/notes", bob, "carol", PermissionLevel::ReadOnly, None)
			.await;
		assert!(matches!(result, Err(SecretsError::Unauthorized)));
		let _ = carol;
	}

	#[tokio::test]
	async fn role_scoped_secrets_are_not_shareable() {
		let f = fixture().await;
		let alice = add_user(&f, "alice").await;
		add_user(&f, "bob").await;
		f.secrets
			.insert_version("api/db", b"blob", "{}", SecretType::RoleBased, None)
			.await
			.unwrap();

		assert!(matches!(
			f.manager
				.share("api/db", alice, "bob", PermissionLevel::ReadOnly, None)
				.await,
			Err(SecretsError::Unauthorized)
		));
	}

	#[tokio::test]
	async fn unknown_or_inactive_target_is_user_not_found() {
		let f = fixture().await;
		let alice = add_user(&f, "alice").await;
		let bob = add_user(&f, "bob").await;
		add_personal_secret(&f, "alice/notes", alice).await;
		f.users.set_active(bob, false).await.unwrap();

		assert!(matches!(
			f.manager
				.share("alice/notes", alice, "ghost", PermissionLevel::ReadOnly, None)
				.await,
			Err(SecretsError::UserNotFound(_))
		));
		assert!(matches!(
			f.manager
				.share("alice/notes", alice, "bob", PermissionLevel::ReadOnly, None)
				.await,
			Err(SecretsError::UserNotFound(_))
		));
	}

	#[tokio::test]
	async fn revoke_ends_the_grant() {
		let f = fixture().await;
		let alice = add_user(&f, "alice").await;
		let bob = add_user(&f, "bob").await;
		add_personal_secret(&f, "alice/notes", alice).await;

		f.manager
			.share("alice/notes", alice, "bob", PermissionLevel::Editable, None)
			.await
			.unwrap();
		f.manager.revoke("alice/notes", alice, "bob").await.unwrap();

		assert!(matches!(
			f.manager.permission_for("alice/notes", bob).await,
			Err(SecretsError::NotShared)
		));
		assert!(matches!(
			f.manager.revoke("alice/notes", alice, "bob").await,
			Err(SecretsError::ShareNotFound)
		));
	}

	#[tokio::test]
	async fn expired_grants_confer_nothing_and_leave_listings() {
		let f = fixture().await;
		let alice = add_user(&f, "alice").await;
		let bob = add_user(&f, "bob").await;
		add_personal_secret(&f, "alice/notes", alice).await;

		let past = Utc::now() - Duration::hours(1);
		f.manager
			.share("alice/notes", alice, "bob", PermissionLevel::ReadOnly, Some(past))
			.await
			.unwrap();

		assert!(matches!(
			f.manager.permission_for("alice/notes", bob).await,
			Err(SecretsError::ShareExpired)
		));
		assert!(f.manager.list_shared_with(bob).await.unwrap().is_empty());
		assert!(f.manager.list_created_by(alice).await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn listings_join_usernames() {
		let f = fixture().await;
		let alice = add_user(&f, "alice").await;
		let bob = add_user(&f, "bob").await;
		add_personal_secret(&f, "alice/notes", alice).await;

		f.manager
			.share("alice/notes", alice, "bob", PermissionLevel::Editable, None)
			.await
			.unwrap();

		let incoming = f.manager.list_shared_with(bob).await.unwrap();
		assert_eq!(incoming.len(), 1);
		assert_eq!(incoming[0].owner_username, "alice");
		assert_eq!(incoming[0].shared_with_username, "bob");
		assert_eq!(incoming[0].permission_level, PermissionLevel::Editable);

		let outgoing = f.manager.list_created_by(alice).await.unwrap();
		assert_eq!(outgoing.len(), 1);
		assert_eq!(outgoing[0].secret_key, "alice/notes");
	}
}
