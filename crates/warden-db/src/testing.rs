// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Shared in-memory schema helpers for tests across the workspace.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

/// Single-connection in-memory pool. One connection keeps every statement on
/// the same in-memory database.
pub async fn create_test_pool() -> SqlitePool {
	let options = SqliteConnectOptions::from_str(":memory:")
		.unwrap()
		.create_if_missing(true);

	SqlitePoolOptions::new()
		.max_connections(1)
		.connect_with(options)
		.await
		.expect("Failed to create test pool")
}

pub async fn create_secrets_table(pool: &SqlitePool) {
	sqlx::query(
		r#"
		CREATE TABLE IF NOT EXISTS secrets (
			id TEXT PRIMARY KEY,
			key TEXT NOT NULL,
			value BLOB NOT NULL,
			version INTEGER NOT NULL,
			metadata TEXT NOT NULL DEFAULT '{}',
			secret_type TEXT NOT NULL CHECK (secret_type IN ('personal', 'role_based')),
			owner_id TEXT,
			deleted_at TEXT,
			created_at TEXT NOT NULL,
			updated_at TEXT NOT NULL,
			UNIQUE (key, version)
		)
		"#,
	)
	.execute(pool)
	.await
	.unwrap();

	sqlx::query("CREATE INDEX IF NOT EXISTS idx_secrets_key ON secrets(key)")
		.execute(pool)
		.await
		.unwrap();
}

pub async fn create_roles_table(pool: &SqlitePool) {
	sqlx::query(
		r#"
		CREATE TABLE IF NOT EXISTS roles (
			id TEXT PRIMARY KEY,
			user_id TEXT NOT NULL,
			name TEXT NOT NULL,
			permissions TEXT NOT NULL,
			path_pattern TEXT,
			created_at TEXT NOT NULL,
			updated_at TEXT NOT NULL
		)
		"#,
	)
	.execute(pool)
	.await
	.unwrap();

	sqlx::query("CREATE INDEX IF NOT EXISTS idx_roles_user_id ON roles(user_id)")
		.execute(pool)
		.await
		.unwrap();
}

pub async fn create_users_table(pool: &SqlitePool) {
	sqlx::query(
		r#"
		CREATE TABLE IF NOT EXISTS users (
			id TEXT PRIMARY KEY,
			username TEXT NOT NULL UNIQUE,
			email TEXT NOT NULL UNIQUE,
			password_hash TEXT NOT NULL,
			active INTEGER NOT NULL DEFAULT 1,
			created_at TEXT NOT NULL,
			updated_at TEXT NOT NULL
		)
		"#,
	)
	.execute(pool)
	.await
	.unwrap();
}

pub async fn create_secret_shares_table(pool: &SqlitePool) {
	sqlx::query(
		r#"
		CREATE TABLE IF NOT EXISTS secret_shares (
			id TEXT PRIMARY KEY,
			secret_key TEXT NOT NULL,
			owner_id TEXT NOT NULL,
			shared_with_id TEXT NOT NULL,
			permission_level TEXT NOT NULL CHECK (permission_level IN ('read_only', 'editable')),
			shared_at TEXT NOT NULL,
			expires_at TEXT,
			active INTEGER NOT NULL DEFAULT 1,
			UNIQUE (secret_key, shared_with_id)
		)
		"#,
	)
	.execute(pool)
	.await
	.unwrap();
}

pub async fn create_audit_logs_table(pool: &SqlitePool) {
	sqlx::query(
		r#"
		CREATE TABLE IF NOT EXISTS audit_logs (
			id TEXT PRIMARY KEY,
			user_id TEXT,
			action TEXT NOT NULL,
			secret_key TEXT NOT NULL,
			timestamp TEXT NOT NULL,
			metadata TEXT NOT NULL
		)
		"#,
	)
	.execute(pool)
	.await
	.unwrap();

	sqlx::query("CREATE INDEX IF NOT EXISTS idx_audit_logs_timestamp ON audit_logs(timestamp)")
		.execute(pool)
		.await
		.unwrap();
}

pub async fn create_secrets_test_pool() -> SqlitePool {
	let pool = create_test_pool().await;
	create_secrets_table(&pool).await;
	pool
}

pub async fn create_roles_test_pool() -> SqlitePool {
	let pool = create_test_pool().await;
	create_roles_table(&pool).await;
	pool
}

pub async fn create_users_test_pool() -> SqlitePool {
	let pool = create_test_pool().await;
	create_users_table(&pool).await;
	pool
}

pub async fn create_shares_test_pool() -> SqlitePool {
	let pool = create_test_pool().await;
	create_secret_shares_table(&pool).await;
	pool
}

/// Every table the vault needs, for end-to-end tests.
pub async fn create_vault_test_pool() -> SqlitePool {
	let pool = create_test_pool().await;
	create_secrets_table(&pool).await;
	create_roles_table(&pool).await;
	create_users_table(&pool).await;
	create_secret_shares_table(&pool).await;
	create_audit_logs_table(&pool).await;
	pool
}
