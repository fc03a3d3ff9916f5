// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! User persistence.

use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqlitePool, Row};
use uuid::Uuid;

use warden_auth::{User, UserId};

use crate::error::{is_unique_violation, DbError, Result};

#[derive(Clone)]
pub struct UserRepository {
	pool: SqlitePool,
}

impl UserRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	/// Insert a user. Duplicate username or email surfaces as `Conflict`.
	#[tracing::instrument(skip(self, user), fields(username = %user.username))]
	pub async fn insert(&self, user: &User) -> Result<()> {
		let result = sqlx::query(
			r#"
			INSERT INTO users (id, username, email, password_hash, active, created_at, updated_at)
			VALUES (?, ?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(user.id.to_string())
		.bind(&user.username)
		.bind(&user.email)
		.bind(&user.password_hash)
		.bind(i64::from(user.active))
		.bind(user.created_at.to_rfc3339())
		.bind(user.updated_at.to_rfc3339())
		.execute(&self.pool)
		.await;

		match result {
			Ok(_) => Ok(()),
			Err(e) if is_unique_violation(&e) => Err(DbError::Conflict(format!(
				"username or email already taken: {}",
				user.username
			))),
			Err(e) => Err(e.into()),
		}
	}

	pub async fn get_by_id(&self, id: UserId) -> Result<Option<User>> {
		let row = sqlx::query(
			r#"
			SELECT id, username, email, password_hash, active, created_at, updated_at
			FROM users WHERE id = ?
			"#,
		)
		.bind(id.to_string())
		.fetch_optional(&self.pool)
		.await?;

		row.map(row_to_user).transpose()
	}

	pub async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
		let row = sqlx::query(
			r#"
			SELECT id, username, email, password_hash, active, created_at, updated_at
			FROM users WHERE username = ?
			"#,
		)
		.bind(username)
		.fetch_optional(&self.pool)
		.await?;

		row.map(row_to_user).transpose()
	}

	/// Active users, for sharing-target listings.
	pub async fn list_active(&self) -> Result<Vec<User>> {
		let rows = sqlx::query(
			r#"
			SELECT id, username, email, password_hash, active, created_at, updated_at
			FROM users WHERE active = 1 ORDER BY username
			"#,
		)
		.fetch_all(&self.pool)
		.await?;

		rows.into_iter().map(row_to_user).collect()
	}

	/// Flip the active flag. Returns false when the user does not exist.
	#[tracing::instrument(skip(self))]
	pub async fn set_active(&self, id: UserId, active: bool) -> Result<bool> {
		let result = sqlx::query("UPDATE users SET active = ?, updated_at = ? WHERE id = ?")
			.bind(i64::from(active))
			.bind(Utc::now().to_rfc3339())
			.bind(id.to_string())
			.execute(&self.pool)
			.await?;
		Ok(result.rows_affected() > 0)
	}
}

fn row_to_user(row: sqlx::sqlite::SqliteRow) -> Result<User> {
	let id_str: String = row.get("id");
	let active: i64 = row.get("active");

	Ok(User {
		id: Uuid::parse_str(&id_str)
			.map(UserId::new)
			.map_err(|e| DbError::Internal(format!("bad user id '{id_str}': {e}")))?,
		username: row.get("username"),
		email: row.get("email"),
		password_hash: row.get("password_hash"),
		active: active != 0,
		created_at: parse_ts(row.get("created_at")),
		updated_at: parse_ts(row.get("updated_at")),
	})
}

fn parse_ts(s: String) -> DateTime<Utc> {
	DateTime::parse_from_rfc3339(&s)
		.map(|dt| dt.with_timezone(&Utc))
		.unwrap_or_else(|_| Utc::now())
}
