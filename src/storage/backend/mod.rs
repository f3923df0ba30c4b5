//! SeaORM storage backend
//!
//! This module provides database storage using SeaORM,
//! supporting SQLite, MySQL/MariaDB, and PostgreSQL.

mod connection;
pub mod retry;

use sea_orm::{ConnectionTrait, DatabaseBackend, DatabaseConnection};
use tracing::warn;

use crate::errors::{LabdeskError, Result};

pub use connection::{connect_generic, connect_sqlite, run_migrations};

/// 从数据库 URL 推断数据库类型
pub fn infer_backend_from_url(database_url: &str) -> Result<String> {
    if database_url.starts_with("sqlite:")
        || database_url.ends_with(".db")
        || database_url.ends_with(".sqlite")
    {
        Ok("sqlite".to_string())
    } else if database_url.starts_with("mysql://") || database_url.starts_with("mariadb://") {
        Ok("mysql".to_string())
    } else if database_url.starts_with("postgres://") || database_url.starts_with("postgresql://") {
        Ok("postgres".to_string())
    } else {
        Err(LabdeskError::database_config(format!(
            "无法从 URL 推断数据库类型: {}. 支持的 URL 格式: sqlite://, mysql://, mariadb://, postgres://",
            database_url
        )))
    }
}

/// SeaORM-based storage backend
///
/// Owns the connection pool. Services borrow the connection and open their
/// own transactions.
#[derive(Clone)]
pub struct SeaOrmStorage {
    db: DatabaseConnection,
    backend_name: String,
    retry_config: retry::RetryConfig,
}

impl SeaOrmStorage {
    pub async fn new(database_url: &str, backend_name: &str) -> Result<Self> {
        if database_url.is_empty() {
            return Err(LabdeskError::database_config("DATABASE_URL 未设置"));
        }

        let db = if backend_name == "sqlite" {
            connect_sqlite(database_url).await?
        } else {
            connect_generic(database_url, backend_name).await?
        };

        let storage = Self::from_connection(db, backend_name);
        run_migrations(&storage.db).await?;

        warn!(
            "{} Storage initialized.",
            storage.backend_name.to_uppercase()
        );
        Ok(storage)
    }

    /// Wrap an already-migrated connection
    pub fn from_connection(db: DatabaseConnection, backend_name: &str) -> Self {
        let config = crate::config::get_config();
        Self {
            db,
            backend_name: backend_name.to_string(),
            retry_config: retry::RetryConfig {
                max_retries: config.database.retry_count,
                base_delay_ms: config.database.retry_base_delay_ms,
                max_delay_ms: config.database.retry_max_delay_ms,
            },
        }
    }

    pub fn get_db(&self) -> &DatabaseConnection {
        &self.db
    }

    pub fn backend_name(&self) -> &str {
        &self.backend_name
    }

    /// Postgres is the only backend with advisory locks
    pub fn is_postgres(&self) -> bool {
        self.db.get_database_backend() == DatabaseBackend::Postgres
    }

    /// Round-trip to the database, retrying transient failures
    pub async fn ping(&self) -> Result<()> {
        retry::with_retry("ping", self.retry_config, || self.db.ping()).await?;
        Ok(())
    }

    pub async fn close(&self) -> Result<()> {
        self.db.clone().close().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_backend_from_url() {
        assert_eq!(
            infer_backend_from_url("sqlite://data/lab.db?mode=rwc").unwrap(),
            "sqlite"
        );
        assert_eq!(infer_backend_from_url("lab.sqlite").unwrap(), "sqlite");
        assert_eq!(
            infer_backend_from_url("mariadb://root@localhost/lab").unwrap(),
            "mysql"
        );
        assert_eq!(
            infer_backend_from_url("postgresql://lab@localhost/lab").unwrap(),
            "postgres"
        );
        assert!(infer_backend_from_url("redis://localhost").is_err());
    }
}
