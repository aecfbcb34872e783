// src/database.rs
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::path::PathBuf;
use tracing::info;
use uuid::Uuid;

pub const ROLE_USER: &str = "user";
pub const ROLE_ADMIN: &str = "admin";
pub const STATUS_ACTIVE: &str = "active";
pub const STATUS_OFFLINE: &str = "offline";

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub role: String,
    pub status: String,
    pub last_login: Option<DateTime<Utc>>,
    pub profiles_processed: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == ROLE_ADMIN
    }
}

/// Aggregate counters shown on the admin portal.
#[derive(Debug, Clone, Serialize)]
pub struct DirectoryStats {
    pub total_users: i64,
    pub active_users: i64,
    pub total_profiles_processed: i64,
}

#[derive(Debug)]
pub struct DatabaseConfig {
    pub database_path: PathBuf,
    pub pool: Option<SqlitePool>,
}

impl DatabaseConfig {
    pub fn new(database_path: PathBuf) -> Self {
        Self {
            database_path,
            pool: None,
        }
    }

    /// Initialize the database connection pool
    pub async fn init_pool(&mut self) -> Result<()> {
        if let Some(parent) = self.database_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create database directory")?;
        }

        let database_url = format!("sqlite:{}?mode=rwc", self.database_path.display());

        let pool = SqlitePool::connect(&database_url)
            .await
            .context("Failed to connect to SQLite database")?;
        self.pool = Some(pool);

        info!("Database connection pool initialized: {}", database_url);
        Ok(())
    }

    /// Get the database pool
    pub fn pool(&self) -> Result<&SqlitePool> {
        self.pool
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("Database pool not initialized. Call init_pool() first."))
    }

    /// Run database migrations
    pub async fn migrate(&self) -> Result<()> {
        let pool = self.pool()?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                password TEXT NOT NULL,
                role TEXT NOT NULL DEFAULT 'user',
                status TEXT NOT NULL DEFAULT 'offline',
                last_login TEXT,
                profiles_processed INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_users_email
            ON users(email);
            "#,
        )
        .execute(pool)
        .await?;

        info!("Database migrations completed successfully");
        Ok(())
    }
}

pub struct UserRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> UserRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Find user by email (case-insensitive)
    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, name, password, role, status, last_login,
                   profiles_processed, created_at, updated_at
            FROM users
            WHERE lower(email) = lower(?)
            "#,
        )
        .bind(email)
        .fetch_optional(self.pool)
        .await?;

        Ok(user)
    }

    /// Append a new user to the directory
    pub async fn create(&self, name: &str, email: &str, password: &str, role: &str) -> Result<User> {
        let now = Utc::now();
        let id = Uuid::new_v4().to_string();

        sqlx::query(
            r#"
            INSERT INTO users (id, email, name, password, role, status,
                               profiles_processed, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, 0, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(email)
        .bind(name)
        .bind(password)
        .bind(role)
        .bind(STATUS_ACTIVE)
        .bind(now)
        .bind(now)
        .execute(self.pool)
        .await?;

        let user = User {
            id,
            email: email.to_string(),
            name: name.to_string(),
            password: password.to_string(),
            role: role.to_string(),
            status: STATUS_ACTIVE.to_string(),
            last_login: None,
            profiles_processed: 0,
            created_at: now,
            updated_at: now,
        };

        info!("Created {} account for email: {}", role, email);
        Ok(user)
    }

    /// List all users, newest first
    pub async fn list_all(&self) -> Result<Vec<User>> {
        let users = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, name, password, role, status, last_login,
                   profiles_processed, created_at, updated_at
            FROM users
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(self.pool)
        .await?;

        Ok(users)
    }

    /// Mark a user active or offline
    pub async fn set_status(&self, email: &str, status: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET status = ?, updated_at = ?
            WHERE lower(email) = lower(?)
            "#,
        )
        .bind(status)
        .bind(Utc::now())
        .bind(email)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Stamp a successful sign-in: active status plus last_login
    pub async fn touch_login(&self, email: &str) -> Result<bool> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE users
            SET status = ?, last_login = ?, updated_at = ?
            WHERE lower(email) = lower(?)
            "#,
        )
        .bind(STATUS_ACTIVE)
        .bind(now)
        .bind(now)
        .bind(email)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Bump the per-user usage counter after a completed pipeline run
    pub async fn increment_profiles_processed(&self, email: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET profiles_processed = profiles_processed + 1, updated_at = ?
            WHERE lower(email) = lower(?)
            "#,
        )
        .bind(Utc::now())
        .bind(email)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Remove a user from the directory
    pub async fn remove(&self, email: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM users WHERE lower(email) = lower(?)
            "#,
        )
        .bind(email)
        .execute(self.pool)
        .await?;

        let removed = result.rows_affected() > 0;
        if removed {
            info!("Removed account for email: {}", email);
        }

        Ok(removed)
    }
}

/// Directory-level operations built on the repository
pub struct UserDirectory<'a> {
    repo: UserRepository<'a>,
    pool: &'a SqlitePool,
}

impl<'a> UserDirectory<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self {
            repo: UserRepository::new(pool),
            pool,
        }
    }

    pub fn repo(&self) -> &UserRepository<'a> {
        &self.repo
    }

    /// Aggregate counters for the admin portal
    pub async fn stats(&self) -> Result<DirectoryStats> {
        let (total_users, active_users, total_profiles_processed): (i64, i64, i64) =
            sqlx::query_as(
                r#"
                SELECT COUNT(*),
                       COALESCE(SUM(CASE WHEN status = 'active' THEN 1 ELSE 0 END), 0),
                       COALESCE(SUM(profiles_processed), 0)
                FROM users
                "#,
            )
            .fetch_one(self.pool)
            .await?;

        Ok(DirectoryStats {
            total_users,
            active_users,
            total_profiles_processed,
        })
    }

    /// Seed the reserved admin account when it does not exist yet
    pub async fn ensure_admin(&self, email: &str, password: &str) -> Result<()> {
        if self.repo.find_by_email(email).await?.is_none() {
            self.repo
                .create("Administrator", email, password, ROLE_ADMIN)
                .await?;
        }
        Ok(())
    }
}
