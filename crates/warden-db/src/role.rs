// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Role persistence. Permission sets are stored as JSON arrays of the
//! snake_case permission names.

use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqlitePool, Row};
use uuid::Uuid;

use warden_auth::{Permission, Role, RoleId, UserId};

use crate::error::{DbError, Result};

#[derive(Clone)]
pub struct RoleRepository {
	pool: SqlitePool,
}

impl RoleRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	#[tracing::instrument(skip(self, role), fields(role_name = %role.name))]
	pub async fn insert(&self, role: &Role) -> Result<()> {
		let permissions = serde_json::to_string(&role.permissions)?;
		sqlx::query(
			r#"
			INSERT INTO roles (id, user_id, name, permissions, path_pattern, created_at, updated_at)
			VALUES (?, ?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(role.id.to_string())
		.bind(role.user_id.to_string())
		.bind(&role.name)
		.bind(permissions)
		.bind(&role.path_pattern)
		.bind(role.created_at.to_rfc3339())
		.bind(role.updated_at.to_rfc3339())
		.execute(&self.pool)
		.await?;
		Ok(())
	}

	pub async fn get_by_id(&self, id: RoleId) -> Result<Option<Role>> {
		let row = sqlx::query(
			r#"
			SELECT id, user_id, name, permissions, path_pattern, created_at, updated_at
			FROM roles WHERE id = ?
			"#,
		)
		.bind(id.to_string())
		.fetch_optional(&self.pool)
		.await?;

		row.map(row_to_role).transpose()
	}

	pub async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Role>> {
		let rows = sqlx::query(
			r#"
			SELECT id, user_id, name, permissions, path_pattern, created_at, updated_at
			FROM roles WHERE user_id = ? ORDER BY created_at
			"#,
		)
		.bind(user_id.to_string())
		.fetch_all(&self.pool)
		.await?;

		rows.into_iter().map(row_to_role).collect()
	}

	/// Replace a role's permission set. Returns false when the role is gone.
	#[tracing::instrument(skip(self, permissions))]
	pub async fn update_permissions(&self, id: RoleId, permissions: &[Permission]) -> Result<bool> {
		let permissions = serde_json::to_string(permissions)?;
		let result = sqlx::query("UPDATE roles SET permissions = ?, updated_at = ? WHERE id = ?")
			.bind(permissions)
			.bind(Utc::now().to_rfc3339())
			.bind(id.to_string())
			.execute(&self.pool)
			.await?;
		Ok(result.rows_affected() > 0)
	}

	#[tracing::instrument(skip(self))]
	pub async fn delete(&self, id: RoleId) -> Result<bool> {
		let result = sqlx::query("DELETE FROM roles WHERE id = ?")
			.bind(id.to_string())
			.execute(&self.pool)
			.await?;
		Ok(result.rows_affected() > 0)
	}
}

fn row_to_role(row: sqlx::sqlite::SqliteRow) -> Result<Role> {
	let id_str: String = row.get("id");
	let user_str: String = row.get("user_id");
	let permissions_str: String = row.get("permissions");

	let permissions: Vec<Permission> = serde_json::from_str(&permissions_str)?;

	Ok(Role {
		id: Uuid::parse_str(&id_str)
			.map(RoleId::new)
			.map_err(|e| DbError::Internal(format!("bad role id '{id_str}': {e}")))?,
		user_id: Uuid::parse_str(&user_str)
			.map(UserId::new)
			.map_err(|e| DbError::Internal(format!("bad user id '{user_str}': {e}")))?,
		name: row.get("name"),
		permissions,
		path_pattern: row.get("path_pattern"),
		created_at: parse_ts(row.get("created_at")),
		updated_at: parse_ts(row.get("updated_at")),
	})
}

fn parse_ts(s: String) -> DateTime<Utc> {
	DateTime::parse_from_rfc3339(&s)
		.map(|dt| dt.with_timezone(&Utc))
		.unwrap_or_else(|_| Utc::now())
}
