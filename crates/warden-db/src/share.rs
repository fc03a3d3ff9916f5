// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Sharing-grant persistence.
//!
//! `UNIQUE(secret_key, shared_with_id)` plus a reactivating upsert keeps one
//! row per (key, target) across repeated share/revoke cycles instead of
//! accumulating dead rows.

use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqlitePool, Row};
use uuid::Uuid;

use warden_auth::{PermissionLevel, ShareId, UserId};

use crate::error::{DbError, Result};

/// One persisted sharing grant.
#[derive(Debug, Clone)]
pub struct ShareRecord {
	pub id: ShareId,
	pub secret_key: String,
	pub owner_id: UserId,
	pub shared_with_id: UserId,
	pub permission_level: PermissionLevel,
	pub shared_at: DateTime<Utc>,
	pub expires_at: Option<DateTime<Utc>>,
	pub active: bool,
}

#[derive(Clone)]
pub struct ShareRepository {
	pool: SqlitePool,
}

impl ShareRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	/// Create or reactivate the grant for `(secret_key, shared_with_id)`.
	///
	/// An existing row (active or revoked) is refreshed in place with the new
	/// level, expiry and `shared_at`; otherwise a row is inserted. Runs in a
	/// transaction so a concurrent revoke cannot interleave.
	#[tracing::instrument(skip(self))]
	pub async fn upsert(
		&self,
		secret_key: &str,
		owner_id: UserId,
		shared_with_id: UserId,
		permission_level: PermissionLevel,
		expires_at: Option<DateTime<Utc>>,
	) -> Result<ShareRecord> {
		let mut tx = self.pool.begin().await?;
		let now = Utc::now();

		let existing = sqlx::query("SELECT id FROM secret_shares WHERE secret_key = ? AND shared_with_id = ?")
			.bind(secret_key)
			.bind(shared_with_id.to_string())
			.fetch_optional(&mut *tx)
			.await?;

		let id = match existing {
			Some(row) => {
				let id_str: String = row.get("id");
				let id = Uuid::parse_str(&id_str)
					.map(ShareId::new)
					.map_err(|e| DbError::Internal(format!("bad share id '{id_str}': {e}")))?;
				sqlx::query(
					r#"
					UPDATE secret_shares
					SET owner_id = ?, permission_level = ?, shared_at = ?, expires_at = ?, active = 1
					WHERE id = ?
					"#,
				)
				.bind(owner_id.to_string())
				.bind(permission_level.to_string())
				.bind(now.to_rfc3339())
				.bind(expires_at.map(|d| d.to_rfc3339()))
				.bind(id.to_string())
				.execute(&mut *tx)
				.await?;
				id
			}
			None => {
				let id = ShareId::generate();
				sqlx::query(
					r#"
					INSERT INTO secret_shares (id, secret_key, owner_id, shared_with_id, permission_level, shared_at, expires_at, active)
					VALUES (?, ?, ?, ?, ?, ?, ?, 1)
					"#,
				)
				.bind(id.to_string())
				.bind(secret_key)
				.bind(owner_id.to_string())
				.bind(shared_with_id.to_string())
				.bind(permission_level.to_string())
				.bind(now.to_rfc3339())
				.bind(expires_at.map(|d| d.to_rfc3339()))
				.execute(&mut *tx)
				.await?;
				id
			}
		};

		tx.commit().await?;

		Ok(ShareRecord {
			id,
			secret_key: secret_key.to_string(),
			owner_id,
			shared_with_id,
			permission_level,
			shared_at: now,
			expires_at,
			active: true,
		})
	}

	/// The active grant for `(secret_key, user)`, expiry not considered here.
	pub async fn get_active(&self, secret_key: &str, user_id: UserId) -> Result<Option<ShareRecord>> {
		let row = sqlx::query(
			r#"
			SELECT id, secret_key, owner_id, shared_with_id, permission_level, shared_at, expires_at, active
			FROM secret_shares
			WHERE secret_key = ? AND shared_with_id = ? AND active = 1
			"#,
		)
		.bind(secret_key)
		.bind(user_id.to_string())
		.fetch_optional(&self.pool)
		.await?;

		row.map(row_to_record).transpose()
	}

	/// Soft-revoke the active grant owned by `owner_id` for `shared_with_id`.
	/// Returns false when no active grant matches.
	#[tracing::instrument(skip(self))]
	pub async fn deactivate(
		&self,
		secret_key: &str,
		owner_id: UserId,
		shared_with_id: UserId,
	) -> Result<bool> {
		let result = sqlx::query(
			r#"
			UPDATE secret_shares SET active = 0
			WHERE secret_key = ? AND owner_id = ? AND shared_with_id = ? AND active = 1
			"#,
		)
		.bind(secret_key)
		.bind(owner_id.to_string())
		.bind(shared_with_id.to_string())
		.execute(&self.pool)
		.await?;
		Ok(result.rows_affected() > 0)
	}

	/// Active grants extended to `user_id`.
	pub async fn list_for_target(&self, user_id: UserId) -> Result<Vec<ShareRecord>> {
		let rows = sqlx::query(
			r#"
			SELECT id, secret_key, owner_id, shared_with_id, permission_level, shared_at, expires_at, active
			FROM secret_shares
			WHERE shared_with_id = ? AND active = 1
			ORDER BY shared_at DESC
			"#,
		)
		.bind(user_id.to_string())
		.fetch_all(&self.pool)
		.await?;

		rows.into_iter().map(row_to_record).collect()
	}

	/// Active grants created by `owner_id`.
	pub async fn list_for_owner(&self, owner_id: UserId) -> Result<Vec<ShareRecord>> {
		let rows = sqlx::query(
			r#"
			SELECT id, secret_key, owner_id, shared_with_id, permission_level, shared_at, expires_at, active
			FROM secret_shares
			WHERE owner_id = ? AND active = 1
			ORDER BY shared_at DESC
			"#,
		)
		.bind(owner_id.to_string())
		.fetch_all(&self.pool)
		.await?;

		rows.into_iter().map(row_to_record).collect()
	}

	/// Deactivate every active grant for `secret_key`. Used when the
	/// underlying secret is deleted so grants do not dangle.
	#[tracing::instrument(skip(self))]
	pub async fn deactivate_all_for_key(&self, secret_key: &str) -> Result<u64> {
		let result = sqlx::query("UPDATE secret_shares SET active = 0 WHERE secret_key = ? AND active = 1")
			.bind(secret_key)
			.execute(&self.pool)
			.await?;
		Ok(result.rows_affected())
	}
}

fn row_to_record(row: sqlx::sqlite::SqliteRow) -> Result<ShareRecord> {
	let id_str: String = row.get("id");
	let owner_str: String = row.get("owner_id");
	let target_str: String = row.get("shared_with_id");
	let level_str: String = row.get("permission_level");
	let shared_at_str: String = row.get("shared_at");
	let expires_str: Option<String> = row.get("expires_at");
	let active: i64 = row.get("active");

	Ok(ShareRecord {
		id: Uuid::parse_str(&id_str)
			.map(ShareId::new)
			.map_err(|e| DbError::Internal(format!("bad share id '{id_str}': {e}")))?,
		secret_key: row.get("secret_key"),
		owner_id: Uuid::parse_str(&owner_str)
			.map(UserId::new)
			.map_err(|e| DbError::Internal(format!("bad owner id '{owner_str}': {e}")))?,
		shared_with_id: Uuid::parse_str(&target_str)
			.map(UserId::new)
			.map_err(|e| DbError::Internal(format!("bad target id '{target_str}': {e}")))?,
		permission_level: level_str
			.parse::<PermissionLevel>()
			.map_err(|e| DbError::Internal(e.to_string()))?,
		shared_at: DateTime::parse_from_rfc3339(&shared_at_str)
			.map(|dt| dt.with_timezone(&Utc))
			.unwrap_or_else(|_| Utc::now()),
		expires_at: expires_str.and_then(|s| {
			DateTime::parse_from_rfc3339(&s)
				.map(|dt| dt.with_timezone(&Utc))
				.ok()
		}),
		active: active != 0,
	})
}
