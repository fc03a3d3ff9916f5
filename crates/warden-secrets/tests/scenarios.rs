// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! End-to-end vault behavior over a fully wired service stack: real
//! encryption, real SQLite storage, real audit trail.

use std::sync::Arc;

use serde_json::Map;

use warden_audit::{AuditAction, AuditFilter, AuditTrail, SqliteAuditTrail};
use warden_auth::{Permission, PermissionLevel, SecretType, User};
use warden_crypto::CryptoBox;
use warden_db::testing::create_vault_test_pool;
use warden_db::{RoleRepository, SecretRepository, ShareRepository, UserRepository};
use warden_secrets::{
	AccountManager, AuthorizationEngine, SecretStore, SecretsError, SharingManager,
};

struct Vault {
	store: SecretStore,
	authz: Arc<AuthorizationEngine>,
	sharing: SharingManager,
	accounts: AccountManager,
	audit: Arc<SqliteAuditTrail>,
}

async fn vault() -> Vault {
	let pool = create_vault_test_pool().await;
	let audit = Arc::new(SqliteAuditTrail::new(pool.clone()));
	let secrets = SecretRepository::new(pool.clone());
	let roles = RoleRepository::new(pool.clone());
	let shares = ShareRepository::new(pool.clone());
	let users = UserRepository::new(pool);

	let authz = Arc::new(AuthorizationEngine::new(
		secrets.clone(),
		roles.clone(),
		shares.clone(),
		audit.clone(),
	));
	let store = SecretStore::new(
		Arc::new(CryptoBox::new("scenario key material").unwrap()),
		secrets.clone(),
		shares.clone(),
		authz.clone(),
		audit.clone(),
	);
	let sharing = SharingManager::new(secrets, shares, users.clone(), audit.clone());
	let accounts = AccountManager::new(users, roles, audit.clone());

	Vault {
		store,
		authz,
		sharing,
		accounts,
		audit,
	}
}

async fn register(vault: &Vault, username: &str) -> User {
	vault
		.accounts
		.register_user(username, &format!("{username}@example.com"), "long enough pw")
		.await
		.unwrap()
}

fn no_meta() -> Map<String, serde_json::Value> {
	Map::new()
}

#[tokio::test]
async fn personal_secret_is_invisible_to_strangers() {
	let v = vault().await;
	let a = register(&v, "alice").await;
	let b = register(&v, "bob").await;

	let handle = v
		.store
		.create("notes", b"hello", a.id, &no_meta(), SecretType::Personal)
		.await
		.unwrap();
	assert_eq!(handle.version, 1);

	let view = v.store.get("notes", a.id, None).await.unwrap();
	assert_eq!(&view.value[..], b"hello");
	assert_eq!(view.version, 1);

	assert!(matches!(
		v.store.get("notes", b.id, None).await,
		Err(SecretsError::Unauthorized)
	));
}

#[tokio::test]
async fn read_only_share_grants_read_but_not_write() {
	let v = vault().await;
	let a = register(&v, "alice").await;
	let b = register(&v, "bob").await;

	v.store
		.create("notes", b"hello", a.id, &no_meta(), SecretType::Personal)
		.await
		.unwrap();
	v.sharing
		.share("notes", a.id, "bob", PermissionLevel::ReadOnly, None)
		.await
		.unwrap();

	let view = v.store.get("notes", b.id, None).await.unwrap();
	assert_eq!(&view.value[..], b"hello");
	let info = view.share.expect("share annotation");
	assert_eq!(info.shared_by, a.id);
	assert_eq!(info.level, PermissionLevel::ReadOnly);

	assert!(matches!(
		v.store.update("notes", b"x", b.id, &no_meta()).await,
		Err(SecretsError::Unauthorized)
	));
}

#[tokio::test]
async fn updates_version_and_history_stays_reachable() {
	let v = vault().await;
	let a = register(&v, "alice").await;

	v.store
		.create("notes", b"hello", a.id, &no_meta(), SecretType::Personal)
		.await
		.unwrap();
	let updated = v
		.store
		.update("notes", b"world", a.id, &no_meta())
		.await
		.unwrap();
	assert_eq!(updated.version, 2);

	let versions = v.store.get_versions("notes", a.id).await.unwrap();
	assert_eq!(
		versions.iter().map(|s| s.version).collect::<Vec<_>>(),
		vec![2, 1]
	);

	let pinned = v.store.get("notes", a.id, Some(1)).await.unwrap();
	assert_eq!(&pinned.value[..], b"hello");
	let latest = v.store.get("notes", a.id, None).await.unwrap();
	assert_eq!(&latest.value[..], b"world");
}

#[tokio::test]
async fn path_scoped_role_bounds_what_a_user_may_create() {
	let v = vault().await;
	let c = register(&v, "carol").await;

	v.authz
		.create_path_role(
			c.id,
			"dev",
			vec![Permission::Read, Permission::Write],
			"api/dev/*",
		)
		.await
		.unwrap();

	v.store
		.create("api/dev/key1", b"dev pw", c.id, &no_meta(), SecretType::RoleBased)
		.await
		.unwrap();
	let view = v.store.get("api/dev/key1", c.id, None).await.unwrap();
	assert_eq!(&view.value[..], b"dev pw");

	assert!(matches!(
		v.store
			.create("api/prod/key1", b"prod pw", c.id, &no_meta(), SecretType::RoleBased)
			.await,
		Err(SecretsError::Unauthorized)
	));
}

#[tokio::test]
async fn delete_hides_every_version_and_listing() {
	let v = vault().await;
	let a = register(&v, "alice").await;

	v.store
		.create("notes", b"hello", a.id, &no_meta(), SecretType::Personal)
		.await
		.unwrap();
	v.store
		.update("notes", b"world", a.id, &no_meta())
		.await
		.unwrap();

	assert_eq!(v.store.delete("notes", a.id).await.unwrap(), 2);

	assert!(matches!(
		v.store.get("notes", a.id, None).await,
		Err(SecretsError::NotFound)
	));
	assert!(matches!(
		v.store.get("notes", a.id, Some(1)).await,
		Err(SecretsError::NotFound)
	));
	assert!(v
		.store
		.list(a.id, None, None)
		.await
		.unwrap()
		.iter()
		.all(|s| s.key != "notes"));
}

#[tokio::test]
async fn purging_everything_resets_statistics() {
	let v = vault().await;
	let a = register(&v, "alice").await;

	v.store
		.create("notes", b"hello", a.id, &no_meta(), SecretType::Personal)
		.await
		.unwrap();
	v.store.get("notes", a.id, None).await.unwrap();

	let before = v.audit.statistics(None, None).await.unwrap();
	assert!(before.total_logs >= 2);

	let purged = v.audit.purge_older_than(0).await.unwrap();
	assert_eq!(purged, before.total_logs as u64);

	// Only the purge's own entry, appended after the sweep, remains.
	let after = v.audit.statistics(None, None).await.unwrap();
	assert_eq!(after.total_logs, 1);
	assert_eq!(after.actions.get(&AuditAction::PurgeLogs), Some(&1));
}

#[tokio::test]
async fn every_operation_leaves_exactly_one_audit_entry() {
	let v = vault().await;
	let a = register(&v, "alice").await;
	let b = register(&v, "bob").await;

	v.store
		.create("notes", b"hello", a.id, &no_meta(), SecretType::Personal)
		.await
		.unwrap();
	v.store.get("notes", a.id, None).await.unwrap();
	let _ = v.store.get("notes", b.id, None).await; // denied
	let _ = v.store.get("ghost", a.id, None).await; // not found
	v.store
		.update("notes", b"world", a.id, &no_meta())
		.await
		.unwrap();
	v.sharing
		.share("notes", a.id, "bob", PermissionLevel::Editable, None)
		.await
		.unwrap();
	v.sharing.revoke("notes", a.id, "bob").await.unwrap();
	v.store.delete("notes", a.id).await.unwrap();
	v.store.list(a.id, None, None).await.unwrap();

	let entries = v
		.audit
		.query(&AuditFilter::default(), Some(100), None)
		.await
		.unwrap();
	assert_eq!(entries.len(), 9);

	let count = |action: AuditAction| entries.iter().filter(|e| e.action == action).count();
	assert_eq!(count(AuditAction::Create), 1);
	assert_eq!(count(AuditAction::Read), 3);
	assert_eq!(count(AuditAction::Update), 1);
	assert_eq!(count(AuditAction::SecretShare), 1);
	assert_eq!(count(AuditAction::SecretRevoke), 1);
	assert_eq!(count(AuditAction::Delete), 1);
	assert_eq!(count(AuditAction::List), 1);

	let denied = entries
		.iter()
		.find(|e| e.action == AuditAction::Read && e.user_id == Some(b.id))
		.unwrap();
	assert_eq!(denied.metadata["outcome"], "failure");
	assert_eq!(denied.metadata["error"], "unauthorized");
}

#[tokio::test]
async fn admin_sees_and_reaches_everything() {
	let v = vault().await;
	let a = register(&v, "alice").await;
	let op = register(&v, "operator").await;

	v.store
		.create("alice/diary", b"dear diary", a.id, &no_meta(), SecretType::Personal)
		.await
		.unwrap();
	v.authz
		.create_path_role(op.id, "ops", vec![Permission::Admin], "*")
		.await
		.unwrap();

	let view = v.store.get("alice/diary", op.id, None).await.unwrap();
	assert_eq!(&view.value[..], b"dear diary");

	let listing = v.store.list(op.id, None, None).await.unwrap();
	assert!(listing.iter().any(|s| s.key == "alice/diary"));
}

#[tokio::test]
async fn expired_share_denies_while_fresh_share_works() {
	let v = vault().await;
	let a = register(&v, "alice").await;
	let b = register(&v, "bob").await;

	v.store
		.create("notes", b"hello", a.id, &no_meta(), SecretType::Personal)
		.await
		.unwrap();

	let past = chrono::Utc::now() - chrono::Duration::minutes(5);
	v.sharing
		.share("notes", a.id, "bob", PermissionLevel::ReadOnly, Some(past))
		.await
		.unwrap();
	assert!(matches!(
		v.store.get("notes", b.id, None).await,
		Err(SecretsError::Unauthorized)
	));

	let future = chrono::Utc::now() + chrono::Duration::hours(1);
	v.sharing
		.share("notes", a.id, "bob", PermissionLevel::ReadOnly, Some(future))
		.await
		.unwrap();
	assert!(v.store.get("notes", b.id, None).await.is_ok());
}
