// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! SQLite-backed audit trail.
//!
//! Appends are independent single-row inserts with server-assigned
//! timestamps; concurrent appends interleave freely. Queries build a dynamic
//! conjunctive WHERE clause and order by `timestamp DESC`.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{sqlite::SqlitePool, Row};
use uuid::Uuid;

use warden_auth::UserId;

use crate::error::{AuditError, AuditResult};
use crate::event::{AuditAction, AuditFilter, AuditLogEntry, AuditStats};

/// How many top secrets [`AuditTrail::statistics`] reports.
const TOP_SECRETS_LIMIT: i64 = 10;

/// Hard cap on page size, matching the repository convention elsewhere.
const MAX_PAGE_SIZE: i64 = 1000;

#[async_trait]
pub trait AuditTrail: Send + Sync {
	/// Append one entry with a server-assigned timestamp.
	async fn log(
		&self,
		user_id: Option<UserId>,
		action: AuditAction,
		secret_key: &str,
		metadata: serde_json::Value,
	) -> AuditResult<()>;

	/// Query entries matching `filter`, newest first.
	async fn query(
		&self,
		filter: &AuditFilter,
		limit: Option<i64>,
		offset: Option<i64>,
	) -> AuditResult<Vec<AuditLogEntry>>;

	/// Aggregate statistics over an optional inclusive time range.
	async fn statistics(
		&self,
		start_date: Option<DateTime<Utc>>,
		end_date: Option<DateTime<Utc>>,
	) -> AuditResult<AuditStats>;

	/// Delete entries older than `now - days_to_keep`. Returns the count
	/// removed. The purge itself is logged system-attributed, after the
	/// deletion completes, so its own entry is never swept.
	async fn purge_older_than(&self, days_to_keep: u32) -> AuditResult<u64>;
}

pub struct SqliteAuditTrail {
	pool: SqlitePool,
}

impl SqliteAuditTrail {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}
}

#[async_trait]
impl AuditTrail for SqliteAuditTrail {
	#[tracing::instrument(skip(self, metadata), fields(action = %action))]
	async fn log(
		&self,
		user_id: Option<UserId>,
		action: AuditAction,
		secret_key: &str,
		metadata: serde_json::Value,
	) -> AuditResult<()> {
		let metadata_json = serde_json::to_string(&metadata)?;
		sqlx::query(
			r#"
			INSERT INTO audit_logs (id, user_id, action, secret_key, timestamp, metadata)
			VALUES (?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(Uuid::new_v4().to_string())
		.bind(user_id.map(|u| u.to_string()))
		.bind(action.to_string())
		.bind(secret_key)
		.bind(Utc::now().to_rfc3339())
		.bind(metadata_json)
		.execute(&self.pool)
		.await?;

		Ok(())
	}

	#[tracing::instrument(skip(self, filter))]
	async fn query(
		&self,
		filter: &AuditFilter,
		limit: Option<i64>,
		offset: Option<i64>,
	) -> AuditResult<Vec<AuditLogEntry>> {
		let limit = limit.unwrap_or(50).clamp(1, MAX_PAGE_SIZE);
		let offset = offset.unwrap_or(0).max(0);

		let mut conditions = vec!["1=1".to_string()];
		if filter.action.is_some() {
			conditions.push("action = ?".to_string());
		}
		if filter.user_id.is_some() {
			conditions.push("user_id = ?".to_string());
		}
		if filter.secret_key.is_some() {
			conditions.push("secret_key = ?".to_string());
		}
		if filter.secret_key_contains.is_some() {
			conditions.push("instr(secret_key, ?) > 0".to_string());
		}
		if filter.start_date.is_some() {
			conditions.push("timestamp >= ?".to_string());
		}
		if filter.end_date.is_some() {
			conditions.push("timestamp <= ?".to_string());
		}

		let sql = format!(
			"SELECT id, user_id, action, secret_key, timestamp, metadata \
			 FROM audit_logs WHERE {} ORDER BY timestamp DESC LIMIT ? OFFSET ?",
			conditions.join(" AND ")
		);

		let mut query = sqlx::query(&sql);
		if let Some(v) = filter.action {
			query = query.bind(v.to_string());
		}
		if let Some(v) = filter.user_id {
			query = query.bind(v.to_string());
		}
		if let Some(v) = &filter.secret_key {
			query = query.bind(v);
		}
		if let Some(v) = &filter.secret_key_contains {
			query = query.bind(v);
		}
		if let Some(v) = filter.start_date {
			query = query.bind(v.to_rfc3339());
		}
		if let Some(v) = filter.end_date {
			query = query.bind(v.to_rfc3339());
		}
		query = query.bind(limit).bind(offset);

		let rows = query.fetch_all(&self.pool).await?;
		Ok(rows.into_iter().filter_map(row_to_entry).collect())
	}

	#[tracing::instrument(skip(self))]
	async fn statistics(
		&self,
		start_date: Option<DateTime<Utc>>,
		end_date: Option<DateTime<Utc>>,
	) -> AuditResult<AuditStats> {
		let mut conditions = vec!["1=1".to_string()];
		if start_date.is_some() {
			conditions.push("timestamp >= ?".to_string());
		}
		if end_date.is_some() {
			conditions.push("timestamp <= ?".to_string());
		}
		let where_clause = conditions.join(" AND ");

		let total_sql = format!("SELECT COUNT(*) as cnt FROM audit_logs WHERE {where_clause}");
		let total_row = bind_range(sqlx::query(&total_sql), start_date, end_date)
			.fetch_one(&self.pool)
			.await?;
		let total_logs: i64 = total_row.get("cnt");

		let actions_sql = format!(
			"SELECT action, COUNT(*) as cnt FROM audit_logs WHERE {where_clause} GROUP BY action"
		);
		let action_rows = bind_range(sqlx::query(&actions_sql), start_date, end_date)
			.fetch_all(&self.pool)
			.await?;
		let mut actions = std::collections::HashMap::new();
		for row in action_rows {
			let action_str: String = row.get("action");
			if let Ok(action) = action_str.parse::<AuditAction>() {
				actions.insert(action, row.get::<i64, _>("cnt"));
			}
		}

		let top_sql = format!(
			"SELECT secret_key, COUNT(*) as cnt FROM audit_logs \
			 WHERE {where_clause} AND secret_key != '' \
			 GROUP BY secret_key ORDER BY cnt DESC LIMIT ?"
		);
		let top_rows = bind_range(sqlx::query(&top_sql), start_date, end_date)
			.bind(TOP_SECRETS_LIMIT)
			.fetch_all(&self.pool)
			.await?;
		let top_secrets = top_rows
			.into_iter()
			.map(|row| (row.get::<String, _>("secret_key"), row.get::<i64, _>("cnt")))
			.collect();

		let users_sql = format!(
			"SELECT COUNT(DISTINCT user_id) as cnt FROM audit_logs \
			 WHERE {where_clause} AND user_id IS NOT NULL"
		);
		let users_row = bind_range(sqlx::query(&users_sql), start_date, end_date)
			.fetch_one(&self.pool)
			.await?;
		let active_users: i64 = users_row.get("cnt");

		Ok(AuditStats {
			total_logs,
			actions,
			top_secrets,
			active_users,
		})
	}

	#[tracing::instrument(skip(self))]
	async fn purge_older_than(&self, days_to_keep: u32) -> AuditResult<u64> {
		let cutoff = Utc::now() - Duration::days(i64::from(days_to_keep));

		let result = sqlx::query("DELETE FROM audit_logs WHERE timestamp < ?")
			.bind(cutoff.to_rfc3339())
			.execute(&self.pool)
			.await?;
		let deleted = result.rows_affected();

		// Logged after deletion so the purge record survives its own sweep.
		// The rows are already gone at this point; a failed self-log must
		// not turn the completed purge into an error.
		if let Err(e) = self
			.log(
				None,
				AuditAction::PurgeLogs,
				"",
				serde_json::json!({ "deleted_count": deleted, "days_to_keep": days_to_keep }),
			)
			.await
		{
			tracing::warn!(error = %e, deleted, "failed to record purge in audit trail");
		}

		tracing::debug!(deleted, days_to_keep, "audit logs purged");
		Ok(deleted)
	}
}

fn bind_range<'q>(
	mut query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
	start_date: Option<DateTime<Utc>>,
	end_date: Option<DateTime<Utc>>,
) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
	if let Some(v) = start_date {
		query = query.bind(v.to_rfc3339());
	}
	if let Some(v) = end_date {
		query = query.bind(v.to_rfc3339());
	}
	query
}

fn row_to_entry(row: sqlx::sqlite::SqliteRow) -> Option<AuditLogEntry> {
	let id_str: String = row.get("id");
	let id = Uuid::parse_str(&id_str).ok()?;

	let ts_str: String = row.get("timestamp");
	let timestamp = DateTime::parse_from_rfc3339(&ts_str)
		.map(|dt| dt.with_timezone(&Utc))
		.ok()?;

	let action_str: String = row.get("action");
	let action = action_str.parse().ok()?;

	let user_id: Option<String> = row.get("user_id");
	let metadata_str: Option<String> = row.get("metadata");

	Some(AuditLogEntry {
		id,
		user_id: user_id
			.and_then(|s| Uuid::parse_str(&s).ok())
			.map(UserId::new),
		action,
		secret_key: row.get("secret_key"),
		timestamp,
		metadata: metadata_str
			.and_then(|s| serde_json::from_str(&s).ok())
			.unwrap_or(serde_json::Value::Null),
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	// One connection keeps every statement on the same in-memory database.
	async fn create_trail_test_pool() -> SqlitePool {
		let pool = sqlx::sqlite::SqlitePoolOptions::new()
			.max_connections(1)
			.connect(":memory:")
			.await
			.unwrap();
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
		.execute(&pool)
		.await
		.unwrap();
		pool
	}

	async fn insert_entry_at(
		trail: &SqliteAuditTrail,
		timestamp: DateTime<Utc>,
		user_id: Option<UserId>,
		action: AuditAction,
		secret_key: &str,
	) {
		sqlx::query(
			r#"
			INSERT INTO audit_logs (id, user_id, action, secret_key, timestamp, metadata)
			VALUES (?, ?, ?, ?, ?, '{}')
			"#,
		)
		.bind(Uuid::new_v4().to_string())
		.bind(user_id.map(|u| u.to_string()))
		.bind(action.to_string())
		.bind(secret_key)
		.bind(timestamp.to_rfc3339())
		.execute(&trail.pool)
		.await
		.unwrap();
	}

	#[tokio::test]
	async fn log_and_query_roundtrip() {
		let trail = SqliteAuditTrail::new(create_trail_test_pool().await);
		let user = UserId::generate();

		trail
			.log(
				Some(user),
				AuditAction::Create,
				"api/dev/db",
				serde_json::json!({"version": 1}),
			)
			.await
			.unwrap();

		let entries = trail
			.query(&AuditFilter::default(), None, None)
			.await
			.unwrap();
		assert_eq!(entries.len(), 1);
		assert_eq!(entries[0].action, AuditAction::Create);
		assert_eq!(entries[0].secret_key, "api/dev/db");
		assert_eq!(entries[0].user_id, Some(user));
		assert_eq!(entries[0].metadata["version"], 1);
	}

	#[tokio::test]
	async fn system_entries_have_no_user() {
		let trail = SqliteAuditTrail::new(create_trail_test_pool().await);
		trail
			.log(None, AuditAction::System, "", serde_json::Value::Null)
			.await
			.unwrap();

		let entries = trail
			.query(&AuditFilter::default(), None, None)
			.await
			.unwrap();
		assert_eq!(entries[0].user_id, None);
	}

	#[tokio::test]
	async fn filters_are_conjunctive() {
		let trail = SqliteAuditTrail::new(create_trail_test_pool().await);
		let alice = UserId::generate();
		let bob = UserId::generate();
		let now = Utc::now();

		insert_entry_at(&trail, now, Some(alice), AuditAction::Read, "api/dev/db").await;
		insert_entry_at(&trail, now, Some(alice), AuditAction::Update, "api/dev/db").await;
		insert_entry_at(&trail, now, Some(bob), AuditAction::Read, "api/prod/db").await;

		let filter = AuditFilter {
			action: Some(AuditAction::Read),
			user_id: Some(alice),
			..Default::default()
		};
		let entries = trail.query(&filter, None, None).await.unwrap();
		assert_eq!(entries.len(), 1);
		assert_eq!(entries[0].secret_key, "api/dev/db");
	}

	#[tokio::test]
	async fn substring_filter_matches_contained_keys() {
		let trail = SqliteAuditTrail::new(create_trail_test_pool().await);
		let now = Utc::now();

		insert_entry_at(&trail, now, None, AuditAction::Read, "api/dev/db").await;
		insert_entry_at(&trail, now, None, AuditAction::Read, "web/token").await;

		let filter = AuditFilter {
			secret_key_contains: Some("dev".to_string()),
			..Default::default()
		};
		let entries = trail.query(&filter, None, None).await.unwrap();
		assert_eq!(entries.len(), 1);
		assert_eq!(entries[0].secret_key, "api/dev/db");
	}

	#[tokio::test]
	async fn date_range_is_inclusive_and_ordering_is_newest_first() {
		let trail = SqliteAuditTrail::new(create_trail_test_pool().await);
		let now = Utc::now();

		insert_entry_at(&trail, now - Duration::hours(3), None, AuditAction::Read, "old").await;
		insert_entry_at(&trail, now - Duration::hours(1), None, AuditAction::Read, "mid").await;
		insert_entry_at(&trail, now, None, AuditAction::Read, "new").await;

		let filter = AuditFilter {
			start_date: Some(now - Duration::hours(2)),
			..Default::default()
		};
		let entries = trail.query(&filter, None, None).await.unwrap();
		assert_eq!(entries.len(), 2);
		assert_eq!(entries[0].secret_key, "new");
		assert_eq!(entries[1].secret_key, "mid");

		let filter = AuditFilter {
			end_date: Some(now - Duration::hours(2)),
			..Default::default()
		};
		let entries = trail.query(&filter, None, None).await.unwrap();
		assert_eq!(entries.len(), 1);
		assert_eq!(entries[0].secret_key, "old");
	}

	#[tokio::test]
	async fn pagination() {
		let trail = SqliteAuditTrail::new(create_trail_test_pool().await);
		let now = Utc::now();
		for i in 0..5 {
			insert_entry_at(
				&trail,
				now - Duration::minutes(i),
				None,
				AuditAction::Read,
				&format!("key-{i}"),
			)
			.await;
		}

		let page = trail
			.query(&AuditFilter::default(), Some(2), None)
			.await
			.unwrap();
		assert_eq!(page.len(), 2);
		assert_eq!(page[0].secret_key, "key-0");

		let page = trail
			.query(&AuditFilter::default(), Some(2), Some(4))
			.await
			.unwrap();
		assert_eq!(page.len(), 1);
		assert_eq!(page[0].secret_key, "key-4");
	}

	#[tokio::test]
	async fn statistics_aggregate() {
		let trail = SqliteAuditTrail::new(create_trail_test_pool().await);
		let alice = UserId::generate();
		let bob = UserId::generate();
		let now = Utc::now();

		insert_entry_at(&trail, now, Some(alice), AuditAction::Read, "hot").await;
		insert_entry_at(&trail, now, Some(alice), AuditAction::Read, "hot").await;
		insert_entry_at(&trail, now, Some(bob), AuditAction::Create, "hot").await;
		insert_entry_at(&trail, now, Some(bob), AuditAction::Create, "cold").await;
		insert_entry_at(&trail, now, None, AuditAction::System, "").await;

		let stats = trail.statistics(None, None).await.unwrap();
		assert_eq!(stats.total_logs, 5);
		assert_eq!(stats.actions[&AuditAction::Read], 2);
		assert_eq!(stats.actions[&AuditAction::Create], 2);
		assert_eq!(stats.actions[&AuditAction::System], 1);
		assert_eq!(stats.active_users, 2);
		assert_eq!(stats.top_secrets[0], ("hot".to_string(), 3));
	}

	#[tokio::test]
	async fn statistics_respect_time_range() {
		let trail = SqliteAuditTrail::new(create_trail_test_pool().await);
		let now = Utc::now();

		insert_entry_at(&trail, now - Duration::days(10), None, AuditAction::Read, "old").await;
		insert_entry_at(&trail, now, None, AuditAction::Read, "new").await;

		let stats = trail
			.statistics(Some(now - Duration::days(1)), None)
			.await
			.unwrap();
		assert_eq!(stats.total_logs, 1);
	}

	#[tokio::test]
	async fn purge_removes_old_entries_and_logs_itself_afterwards() {
		let trail = SqliteAuditTrail::new(create_trail_test_pool().await);
		let now = Utc::now();

		insert_entry_at(&trail, now - Duration::days(5), None, AuditAction::Read, "a").await;
		insert_entry_at(&trail, now - Duration::days(4), None, AuditAction::Read, "b").await;
		insert_entry_at(&trail, now, None, AuditAction::Read, "c").await;

		let deleted = trail.purge_older_than(1).await.unwrap();
		assert_eq!(deleted, 2);

		let entries = trail
			.query(&AuditFilter::default(), None, None)
			.await
			.unwrap();
		// Survivor plus the purge's own record.
		assert_eq!(entries.len(), 2);
		assert_eq!(entries[0].action, AuditAction::PurgeLogs);
		assert_eq!(entries[0].user_id, None);
		assert_eq!(entries[0].metadata["deleted_count"], 2);
	}

	#[tokio::test]
	async fn purge_reports_deleted_count_even_when_its_own_record_cannot_be_written() {
		let trail = SqliteAuditTrail::new(create_trail_test_pool().await);
		let now = Utc::now();

		insert_entry_at(&trail, now - Duration::days(5), None, AuditAction::Read, "a").await;
		insert_entry_at(&trail, now - Duration::days(4), None, AuditAction::Read, "b").await;

		// Reject the purge's own append while leaving the deletion intact.
		sqlx::query(
			r#"
			CREATE TRIGGER reject_purge_record BEFORE INSERT ON audit_logs
			WHEN NEW.action = 'purge_logs'
			BEGIN
				SELECT RAISE(ABORT, 'audit trail unavailable');
			END
			"#,
		)
		.execute(&trail.pool)
		.await
		.unwrap();

		let deleted = trail.purge_older_than(1).await.unwrap();
		assert_eq!(deleted, 2);

		let stats = trail.statistics(None, None).await.unwrap();
		assert_eq!(stats.total_logs, 0);
	}

	#[tokio::test]
	async fn purge_with_zero_days_clears_everything() {
		let trail = SqliteAuditTrail::new(create_trail_test_pool().await);
		let now = Utc::now();

		insert_entry_at(&trail, now - Duration::seconds(5), None, AuditAction::Read, "a").await;
		insert_entry_at(&trail, now - Duration::seconds(3), None, AuditAction::List, "b").await;

		let deleted = trail.purge_older_than(0).await.unwrap();
		assert_eq!(deleted, 2);

		let stats = trail.statistics(None, None).await.unwrap();
		// Only the purge's own entry remains.
		assert_eq!(stats.total_logs, 1);
		assert_eq!(stats.actions[&AuditAction::PurgeLogs], 1);
	}
}
