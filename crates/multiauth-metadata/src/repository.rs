//! SQLite account repository

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use multiauth_core::{Error, GroupKind, GroupStore, LocalGroup, Result, UserRecord, UserStore};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::collections::BTreeMap;
use tracing::{debug, info};

pub struct SqliteStore {
    pool: SqlitePool,
}

type UserRow = (String, String, Option<String>, Option<String>);

impl SqliteStore {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| Error::DatabaseError(e.to_string()))?;

        let store = Self { pool };
        store.init().await?;

        Ok(store)
    }

    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS accounts (
                login TEXT PRIMARY KEY,
                password TEXT NOT NULL,
                fields TEXT,
                created_at TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| Error::DatabaseError(e.to_string()))?;

        // kind: 0 normal, 1 default, 2 private
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS groups (
                name TEXT PRIMARY KEY,
                kind INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| Error::DatabaseError(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS user_groups (
                login TEXT NOT NULL,
                group_name TEXT NOT NULL,
                PRIMARY KEY (login, group_name)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| Error::DatabaseError(e.to_string()))?;

        info!("Account database initialized");
        Ok(())
    }

    /// Create or replace a local group
    pub async fn create_group(&self, name: &str, kind: GroupKind) -> Result<()> {
        sqlx::query(r#"INSERT OR REPLACE INTO groups (name, kind) VALUES (?, ?)"#)
            .bind(name)
            .bind(kind.as_i64())
            .execute(&self.pool)
            .await
            .map_err(|e| Error::DatabaseError(e.to_string()))?;
        Ok(())
    }

    fn row_to_user(row: UserRow) -> Result<UserRecord> {
        let fields: BTreeMap<String, String> = match row.2 {
            Some(json) if !json.is_empty() => serde_json::from_str(&json)
                .map_err(|e| Error::DatabaseError(format!("Corrupt fields for {}: {}", row.0, e)))?,
            _ => BTreeMap::new(),
        };
        let created_at = row
            .3
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|d| d.with_timezone(&Utc));

        Ok(UserRecord {
            login: row.0,
            password: row.1,
            fields,
            created_at,
        })
    }

    fn encode_fields(user: &UserRecord) -> Result<String> {
        serde_json::to_string(&user.fields).map_err(|e| Error::DatabaseError(e.to_string()))
    }
}

#[async_trait]
impl UserStore for SqliteStore {
    async fn get_by_login(&self, login: &str) -> Result<Option<UserRecord>> {
        let row: Option<UserRow> = sqlx::query_as(
            r#"SELECT login, password, fields, created_at FROM accounts WHERE login = ?"#,
        )
        .bind(login)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::DatabaseError(e.to_string()))?;

        row.map(Self::row_to_user).transpose()
    }

    async fn find_all(&self) -> Result<Vec<UserRecord>> {
        let rows: Vec<UserRow> = sqlx::query_as(
            r#"SELECT login, password, fields, created_at FROM accounts ORDER BY login"#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::DatabaseError(e.to_string()))?;

        rows.into_iter().map(Self::row_to_user).collect()
    }

    async fn find_by_login(&self, pattern: &str) -> Result<Vec<UserRecord>> {
        let rows: Vec<UserRow> = sqlx::query_as(
            r#"
            SELECT login, password, fields, created_at FROM accounts
            WHERE login LIKE ? ORDER BY login
            "#,
        )
        .bind(pattern)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::DatabaseError(e.to_string()))?;

        rows.into_iter().map(Self::row_to_user).collect()
    }

    async fn insert(&self, user: &UserRecord) -> Result<()> {
        let created_at = user.created_at.unwrap_or_else(Utc::now).to_rfc3339();

        sqlx::query(
            r#"INSERT INTO accounts (login, password, fields, created_at) VALUES (?, ?, ?, ?)"#,
        )
        .bind(&user.login)
        .bind(&user.password)
        .bind(Self::encode_fields(user)?)
        .bind(created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::DatabaseError(e.to_string()))?;

        debug!("Created account: {}", user.login);
        Ok(())
    }

    async fn update(&self, user: &UserRecord) -> Result<()> {
        let result = sqlx::query(r#"UPDATE accounts SET password = ?, fields = ? WHERE login = ?"#)
            .bind(&user.password)
            .bind(Self::encode_fields(user)?)
            .bind(&user.login)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::DatabaseError(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(Error::UserNotFound(user.login.clone()));
        }
        debug!("Updated account: {}", user.login);
        Ok(())
    }

    async fn update_password(&self, login: &str, password: &str) -> Result<()> {
        let result = sqlx::query(r#"UPDATE accounts SET password = ? WHERE login = ?"#)
            .bind(password)
            .bind(login)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::DatabaseError(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(Error::UserNotFound(login.to_string()));
        }
        Ok(())
    }

    async fn delete_by_login(&self, login: &str) -> Result<()> {
        sqlx::query(r#"DELETE FROM accounts WHERE login = ?"#)
            .bind(login)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::DatabaseError(e.to_string()))?;

        sqlx::query(r#"DELETE FROM user_groups WHERE login = ?"#)
            .bind(login)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::DatabaseError(e.to_string()))?;

        debug!("Deleted account: {}", login);
        Ok(())
    }
}

#[async_trait]
impl GroupStore for SqliteStore {
    async fn get_group(&self, name: &str) -> Result<Option<LocalGroup>> {
        let row: Option<(String, i64)> =
            sqlx::query_as(r#"SELECT name, kind FROM groups WHERE name = ?"#)
                .bind(name)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| Error::DatabaseError(e.to_string()))?;

        Ok(row.map(|r| LocalGroup::new(r.0, GroupKind::from_i64(r.1))))
    }

    async fn default_groups(&self) -> Result<Vec<LocalGroup>> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as(r#"SELECT name, kind FROM groups WHERE kind = ? ORDER BY name"#)
                .bind(GroupKind::Default.as_i64())
                .fetch_all(&self.pool)
                .await
                .map_err(|e| Error::DatabaseError(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|r| LocalGroup::new(r.0, GroupKind::from_i64(r.1)))
            .collect())
    }

    async fn groups_of_user(&self, login: &str) -> Result<Vec<LocalGroup>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT g.name, g.kind FROM groups g
            INNER JOIN user_groups ug ON ug.group_name = g.name
            WHERE ug.login = ?
            ORDER BY g.name
            "#,
        )
        .bind(login)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::DatabaseError(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|r| LocalGroup::new(r.0, GroupKind::from_i64(r.1)))
            .collect())
    }

    async fn add_user_to_group(&self, login: &str, group: &str) -> Result<()> {
        sqlx::query(r#"INSERT OR IGNORE INTO user_groups (login, group_name) VALUES (?, ?)"#)
            .bind(login)
            .bind(group)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::DatabaseError(e.to_string()))?;
        Ok(())
    }

    async fn remove_user_from_group(&self, login: &str, group: &str) -> Result<()> {
        sqlx::query(r#"DELETE FROM user_groups WHERE login = ? AND group_name = ?"#)
            .bind(login)
            .bind(group)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::DatabaseError(e.to_string()))?;
        Ok(())
    }
}
