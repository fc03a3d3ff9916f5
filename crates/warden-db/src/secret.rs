// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Versioned ciphertext storage.
//!
//! One row per (key, version); rows are never mutated once written except to
//! stamp `deleted_at`. The `UNIQUE(key, version)` index plus a transactional
//! read-max-then-insert gives serialized version assignment; concurrent
//! writers that collide are retried a bounded number of times.
//!
//! Soft deletion stamps every live row of a key in a single statement, so a
//! concurrent reader never observes a partially-deleted key.

use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqlitePool, Row};
use uuid::Uuid;

use warden_auth::{SecretId, SecretType, UserId};

use crate::error::{is_unique_violation, DbError, Result};

/// Attempts before a version-number collision is surfaced to the caller.
const VERSION_INSERT_RETRIES: u32 = 3;

/// One persisted secret version. `value` is the CryptoBox blob.
#[derive(Debug, Clone)]
pub struct SecretRecord {
	pub id: SecretId,
	pub key: String,
	pub value: Vec<u8>,
	pub version: i64,
	/// Serialized JSON object.
	pub metadata: String,
	pub secret_type: SecretType,
	pub owner_id: Option<UserId>,
	pub deleted_at: Option<DateTime<Utc>>,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct SecretRepository {
	pool: SqlitePool,
}

impl SecretRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	/// Insert the next version for `key`.
	///
	/// The next version is `max(version) + 1` over every row of the key,
	/// deleted rows included, so version numbers are never reused even after
	/// a delete/recreate cycle. Runs read-max and insert inside one
	/// transaction; a UNIQUE collision from a concurrent writer re-reads and
	/// re-inserts up to [`VERSION_INSERT_RETRIES`] times.
	#[tracing::instrument(skip(self, value, metadata))]
	pub async fn insert_version(
		&self,
		key: &str,
		value: &[u8],
		metadata: &str,
		secret_type: SecretType,
		owner_id: Option<UserId>,
	) -> Result<SecretRecord> {
		let mut last_err: Option<sqlx::Error> = None;

		for attempt in 0..VERSION_INSERT_RETRIES {
			let mut tx = self.pool.begin().await?;

			let row = sqlx::query("SELECT COALESCE(MAX(version), 0) as v FROM secrets WHERE key = ?")
				.bind(key)
				.fetch_one(&mut *tx)
				.await?;
			let next_version: i64 = row.get::<i64, _>("v") + 1;

			let now = Utc::now();
			let record = SecretRecord {
				id: SecretId::generate(),
				key: key.to_string(),
				value: value.to_vec(),
				version: next_version,
				metadata: metadata.to_string(),
				secret_type,
				owner_id,
				deleted_at: None,
				created_at: now,
				updated_at: now,
			};

			let insert = sqlx::query(
				r#"
				INSERT INTO secrets (id, key, value, version, metadata, secret_type, owner_id, deleted_at, created_at, updated_at)
				VALUES (?, ?, ?, ?, ?, ?, ?, NULL, ?, ?)
				"#,
			)
			.bind(record.id.to_string())
			.bind(&record.key)
			.bind(&record.value)
			.bind(record.version)
			.bind(&record.metadata)
			.bind(record.secret_type.to_string())
			.bind(record.owner_id.map(|u| u.to_string()))
			.bind(now.to_rfc3339())
			.bind(now.to_rfc3339())
			.execute(&mut *tx)
			.await;

			match insert {
				Ok(_) => {
					tx.commit().await?;
					return Ok(record);
				}
				Err(e) if is_unique_violation(&e) => {
					tx.rollback().await?;
					tracing::debug!(key, attempt, "version collision, retrying");
					last_err = Some(e);
				}
				Err(e) => return Err(e.into()),
			}
		}

		Err(DbError::Conflict(format!(
			"version assignment for '{key}' kept colliding: {}",
			last_err.map(|e| e.to_string()).unwrap_or_default()
		)))
	}

	/// Latest live version of `key`, if any.
	pub async fn get_latest(&self, key: &str) -> Result<Option<SecretRecord>> {
		let row = sqlx::query(
			r#"
			SELECT id, key, value, version, metadata, secret_type, owner_id, deleted_at, created_at, updated_at
			FROM secrets
			WHERE key = ? AND deleted_at IS NULL
			ORDER BY version DESC
			LIMIT 1
			"#,
		)
		.bind(key)
		.fetch_optional(&self.pool)
		.await?;

		row.map(row_to_record).transpose()
	}

	/// A specific live version of `key`.
	pub async fn get_version(&self, key: &str, version: i64) -> Result<Option<SecretRecord>> {
		let row = sqlx::query(
			r#"
			SELECT id, key, value, version, metadata, secret_type, owner_id, deleted_at, created_at, updated_at
			FROM secrets
			WHERE key = ? AND version = ? AND deleted_at IS NULL
			"#,
		)
		.bind(key)
		.bind(version)
		.fetch_optional(&self.pool)
		.await?;

		row.map(row_to_record).transpose()
	}

	/// Full live version history of `key`, newest first.
	pub async fn list_versions(&self, key: &str) -> Result<Vec<SecretRecord>> {
		let rows = sqlx::query(
			r#"
			SELECT id, key, value, version, metadata, secret_type, owner_id, deleted_at, created_at, updated_at
			FROM secrets
			WHERE key = ? AND deleted_at IS NULL
			ORDER BY version DESC
			"#,
		)
		.bind(key)
		.fetch_all(&self.pool)
		.await?;

		rows.into_iter().map(row_to_record).collect()
	}

	/// Latest live version of every key. The caller filters for visibility.
	pub async fn list_latest(&self) -> Result<Vec<SecretRecord>> {
		let rows = sqlx::query(
			r#"
			SELECT s.id, s.key, s.value, s.version, s.metadata, s.secret_type, s.owner_id, s.deleted_at, s.created_at, s.updated_at
			FROM secrets s
			JOIN (
				SELECT key, MAX(version) AS max_version
				FROM secrets
				WHERE deleted_at IS NULL
				GROUP BY key
			) latest ON s.key = latest.key AND s.version = latest.max_version
			WHERE s.deleted_at IS NULL
			ORDER BY s.key
			"#,
		)
		.fetch_all(&self.pool)
		.await?;

		rows.into_iter().map(row_to_record).collect()
	}

	/// Stamp `deleted_at` on every live row of `key`. Returns rows affected;
	/// a single UPDATE keeps the multi-version delete atomic.
	#[tracing::instrument(skip(self))]
	pub async fn soft_delete_all(&self, key: &str) -> Result<u64> {
		let now = Utc::now().to_rfc3339();
		let result = sqlx::query(
			"UPDATE secrets SET deleted_at = ?, updated_at = ? WHERE key = ? AND deleted_at IS NULL",
		)
		.bind(&now)
		.bind(&now)
		.bind(key)
		.execute(&self.pool)
		.await?;

		Ok(result.rows_affected())
	}
}

fn row_to_record(row: sqlx::sqlite::SqliteRow) -> Result<SecretRecord> {
	let id_str: String = row.get("id");
	let id = Uuid::parse_str(&id_str)
		.map(SecretId::new)
		.map_err(|e| DbError::Internal(format!("bad secret id '{id_str}': {e}")))?;

	let type_str: String = row.get("secret_type");
	let secret_type = type_str
		.parse::<SecretType>()
		.map_err(|e| DbError::Internal(e.to_string()))?;

	let owner_id: Option<String> = row.get("owner_id");
	let owner_id = owner_id
		.map(|s| {
			Uuid::parse_str(&s)
				.map(UserId::new)
				.map_err(|e| DbError::Internal(format!("bad owner id '{s}': {e}")))
		})
		.transpose()?;

	Ok(SecretRecord {
		id,
		key: row.get("key"),
		value: row.get("value"),
		version: row.get("version"),
		metadata: row.get("metadata"),
		secret_type,
		owner_id,
		deleted_at: parse_optional_ts(row.get("deleted_at")),
		created_at: parse_ts(row.get("created_at")),
		updated_at: parse_ts(row.get("updated_at")),
	})
}

fn parse_ts(s: String) -> DateTime<Utc> {
	DateTime::parse_from_rfc3339(&s)
		.map(|dt| dt.with_timezone(&Utc))
		.unwrap_or_else(|_| Utc::now())
}

fn parse_optional_ts(s: Option<String>) -> Option<DateTime<Utc>> {
	s.and_then(|s| {
		DateTime::parse_from_rfc3339(&s)
			.map(|dt| dt.with_timezone(&Utc))
			.ok()
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::create_secrets_test_pool;

	fn owner() -> UserId {
		UserId::generate()
	}

	#[tokio::test]
	async fn versions_are_contiguous_from_one() {
		let repo = SecretRepository::new(create_secrets_test_pool().await);

		for expected in 1..=4 {
			let rec = repo
				.insert_version("k", b"blob", "{}", SecretType::RoleBased, None)
				.await
				.unwrap();
			assert_eq!(rec.version, expected);
		}

		let versions = repo.list_versions("k").await.unwrap();
		assert_eq!(
			versions.iter().map(|r| r.version).collect::<Vec<_>>(),
			vec![4, 3, 2, 1]
		);
	}

	#[tokio::test]
	async fn keys_version_independently() {
		let repo = SecretRepository::new(create_secrets_test_pool().await);

		repo.insert_version("a", b"1", "{}", SecretType::RoleBased, None)
			.await
			.unwrap();
		let rec = repo
			.insert_version("b", b"1", "{}", SecretType::RoleBased, None)
			.await
			.unwrap();
		assert_eq!(rec.version, 1);
	}

	#[tokio::test]
	async fn get_latest_returns_max_version() {
		let repo = SecretRepository::new(create_secrets_test_pool().await);
		let uid = owner();

		repo.insert_version("k", b"v1", "{}", SecretType::Personal, Some(uid))
			.await
			.unwrap();
		repo.insert_version("k", b"v2", "{}", SecretType::Personal, Some(uid))
			.await
			.unwrap();

		let latest = repo.get_latest("k").await.unwrap().unwrap();
		assert_eq!(latest.version, 2);
		assert_eq!(latest.value, b"v2");
		assert_eq!(latest.owner_id, Some(uid));
		assert_eq!(latest.secret_type, SecretType::Personal);
	}

	#[tokio::test]
	async fn get_version_pins_history() {
		let repo = SecretRepository::new(create_secrets_test_pool().await);

		repo.insert_version("k", b"old", "{}", SecretType::RoleBased, None)
			.await
			.unwrap();
		repo.insert_version("k", b"new", "{}", SecretType::RoleBased, None)
			.await
			.unwrap();

		let pinned = repo.get_version("k", 1).await.unwrap().unwrap();
		assert_eq!(pinned.value, b"old");
		assert!(repo.get_version("k", 3).await.unwrap().is_none());
	}

	#[tokio::test]
	async fn soft_delete_hides_every_version_atomically() {
		let repo = SecretRepository::new(create_secrets_test_pool().await);

		repo.insert_version("k", b"v1", "{}", SecretType::RoleBased, None)
			.await
			.unwrap();
		repo.insert_version("k", b"v2", "{}", SecretType::RoleBased, None)
			.await
			.unwrap();

		let deleted = repo.soft_delete_all("k").await.unwrap();
		assert_eq!(deleted, 2);

		assert!(repo.get_latest("k").await.unwrap().is_none());
		assert!(repo.get_version("k", 1).await.unwrap().is_none());
		assert!(repo.list_versions("k").await.unwrap().is_empty());

		// Second delete finds nothing live.
		assert_eq!(repo.soft_delete_all("k").await.unwrap(), 0);
	}

	#[tokio::test]
	async fn versions_continue_after_delete_and_recreate() {
		let repo = SecretRepository::new(create_secrets_test_pool().await);

		repo.insert_version("k", b"v1", "{}", SecretType::RoleBased, None)
			.await
			.unwrap();
		repo.insert_version("k", b"v2", "{}", SecretType::RoleBased, None)
			.await
			.unwrap();
		repo.soft_delete_all("k").await.unwrap();

		let rec = repo
			.insert_version("k", b"fresh", "{}", SecretType::RoleBased, None)
			.await
			.unwrap();
		// Numbering never reuses a version, even across a delete.
		assert_eq!(rec.version, 3);
		assert_eq!(repo.list_versions("k").await.unwrap().len(), 1);
	}

	#[tokio::test]
	async fn list_latest_is_one_row_per_live_key() {
		let repo = SecretRepository::new(create_secrets_test_pool().await);

		repo.insert_version("a", b"1", "{}", SecretType::RoleBased, None)
			.await
			.unwrap();
		repo.insert_version("a", b"2", "{}", SecretType::RoleBased, None)
			.await
			.unwrap();
		repo.insert_version("b", b"1", "{}", SecretType::RoleBased, None)
			.await
			.unwrap();
		repo.insert_version("gone", b"1", "{}", SecretType::RoleBased, None)
			.await
			.unwrap();
		repo.soft_delete_all("gone").await.unwrap();

		let latest = repo.list_latest().await.unwrap();
		assert_eq!(latest.len(), 2);
		assert_eq!(latest[0].key, "a");
		assert_eq!(latest[0].version, 2);
		assert_eq!(latest[1].key, "b");
	}

	#[tokio::test]
	async fn concurrent_updates_never_skip_or_duplicate_versions() {
		let repo = SecretRepository::new(create_secrets_test_pool().await);
		repo.insert_version("k", b"v1", "{}", SecretType::RoleBased, None)
			.await
			.unwrap();

		let mut handles = Vec::new();
		for i in 0..8u32 {
			let repo = repo.clone();
			handles.push(tokio::spawn(async move {
				repo.insert_version("k", format!("v{i}").as_bytes(), "{}", SecretType::RoleBased, None)
					.await
			}));
		}

		let mut succeeded = 1; // the initial insert
		for handle in handles {
			if handle.await.unwrap().is_ok() {
				succeeded += 1;
			}
		}

		let versions = repo.list_versions("k").await.unwrap();
		let max = versions.iter().map(|r| r.version).max().unwrap();
		assert_eq!(max, succeeded as i64);
		assert_eq!(versions.len(), succeeded);
	}
}
