//! 站点登记表
//!
//! `sites` 表是已开通站点的持久记录。domain 和 username 的唯一性由
//! SQLite 的 UNIQUE 约束保证：检查与插入在同一条语句内完成，并发的两个
//! 相同请求最多只有一个成功，另一个得到 `Duplicate`。

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use tracing::{debug, info};

use crate::domain::provision::Site;
use crate::error::{DuplicateField, ProvisionError};

/// 连接池大小
const MAX_CONNECTIONS: u32 = 5;

const CREATE_SITES_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS sites (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        domain TEXT NOT NULL UNIQUE,
        username TEXT NOT NULL UNIQUE,
        created_at DATETIME DEFAULT CURRENT_TIMESTAMP
    )";

/// 站点登记表
#[derive(Clone)]
pub struct SiteRegistry {
    pool: SqlitePool,
}

impl SiteRegistry {
    /// 连接数据库并确保 `sites` 表存在
    ///
    /// 支持 `sqlite://app.db`、`sqlite:///abs/path.db` 等 URL，文件不存在时创建。
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await?;

        let registry = Self { pool };
        registry.migrate().await?;
        info!(url = %database_url, "Site registry ready");
        Ok(registry)
    }

    /// 内存数据库，单连接（每个 SQLite 内存连接是独立的库）
    pub async fn in_memory() -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let registry = Self { pool };
        registry.migrate().await?;
        Ok(registry)
    }

    /// 创建 `sites` 表（如果不存在）
    pub async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::query(CREATE_SITES_TABLE).execute(&self.pool).await?;
        Ok(())
    }

    /// 登记站点
    ///
    /// 返回前记录已持久化。违反唯一约束时返回 `Duplicate`，并尽量指出是哪一列。
    pub async fn record_site(&self, domain: &str, username: &str) -> Result<Site, ProvisionError> {
        let created_at = Utc::now();
        let result = sqlx::query("INSERT INTO sites (domain, username, created_at) VALUES (?, ?, ?)")
            .bind(domain)
            .bind(username)
            .bind(created_at)
            .execute(&self.pool)
            .await;

        match result {
            Ok(done) => {
                debug!(domain = %domain, username = %username, "Site recorded");
                Ok(Site {
                    id: done.last_insert_rowid(),
                    domain: domain.to_string(),
                    username: username.to_string(),
                    created_at,
                })
            }
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(ProvisionError::Duplicate(duplicate_field(db_err.message())))
            }
            Err(e) => Err(ProvisionError::Storage(e)),
        }
    }

    /// 按域名查找
    pub async fn find_by_domain(&self, domain: &str) -> Result<Option<Site>, sqlx::Error> {
        let row = sqlx::query("SELECT id, domain, username, created_at FROM sites WHERE domain = ?")
            .bind(domain)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(site_from_row).transpose()
    }

    /// 所有站点，新的在前
    pub async fn list_sites(&self) -> Result<Vec<Site>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT id, domain, username, created_at FROM sites ORDER BY created_at DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(site_from_row).collect()
    }

    /// 只读预检：domain 或 username 是否已被占用
    ///
    /// 不提供原子性保证，最终以 `record_site` 的约束为准。
    pub async fn is_taken(
        &self,
        domain: &str,
        username: &str,
    ) -> Result<Option<DuplicateField>, sqlx::Error> {
        let row = sqlx::query("SELECT domain FROM sites WHERE domain = ? OR username = ? LIMIT 1")
            .bind(domain)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;

        Ok(match row {
            Some(row) => {
                let existing: String = row.try_get("domain")?;
                if existing == domain {
                    Some(DuplicateField::Domain)
                } else {
                    Some(DuplicateField::Username)
                }
            }
            None => None,
        })
    }
}

fn site_from_row(row: &SqliteRow) -> Result<Site, sqlx::Error> {
    let created_at: DateTime<Utc> = row.try_get("created_at")?;
    Ok(Site {
        id: row.try_get("id")?,
        domain: row.try_get("domain")?,
        username: row.try_get("username")?,
        created_at,
    })
}

/// 从 SQLite 的约束错误信息判断冲突列
///
/// 形如 `UNIQUE constraint failed: sites.domain`
fn duplicate_field(message: &str) -> DuplicateField {
    if message.contains("sites.domain") {
        DuplicateField::Domain
    } else if message.contains("sites.username") {
        DuplicateField::Username
    } else {
        DuplicateField::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_record_and_find() {
        let registry = SiteRegistry::in_memory().await.unwrap();

        let site = registry.record_site("site1.test", "user_1").await.unwrap();
        assert_eq!(site.domain, "site1.test");
        assert_eq!(site.username, "user_1");

        let found = registry.find_by_domain("site1.test").await.unwrap().unwrap();
        assert_eq!(found.id, site.id);
        assert_eq!(found.username, "user_1");
        assert_eq!(found.created_at.timestamp(), site.created_at.timestamp());

        assert!(registry.find_by_domain("other.test").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_domain() {
        let registry = SiteRegistry::in_memory().await.unwrap();
        registry.record_site("site1.test", "user_1").await.unwrap();

        let err = registry.record_site("site1.test", "user_2").await.unwrap_err();
        assert!(matches!(err, ProvisionError::Duplicate(DuplicateField::Domain)));

        // 第一条记录不受影响
        let found = registry.find_by_domain("site1.test").await.unwrap().unwrap();
        assert_eq!(found.username, "user_1");
        assert_eq!(registry.list_sites().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_username() {
        let registry = SiteRegistry::in_memory().await.unwrap();
        registry.record_site("site1.test", "user_1").await.unwrap();

        let err = registry.record_site("site2.test", "user_1").await.unwrap_err();
        assert!(matches!(err, ProvisionError::Duplicate(DuplicateField::Username)));
        assert!(registry.find_by_domain("site2.test").await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_same_domain_only_one_wins() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("race.db").display());
        let registry = SiteRegistry::connect(&url).await.unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = registry.clone();
                tokio::spawn(async move {
                    registry.record_site("race.test", &format!("racer_{i}")).await
                })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => winners += 1,
                Err(ProvisionError::Duplicate(DuplicateField::Domain)) => {}
                Err(other) => panic!("loser got {other:?} instead of Duplicate"),
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(registry.list_sites().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_sites_newest_first() {
        let registry = SiteRegistry::in_memory().await.unwrap();
        registry.record_site("first.test", "first").await.unwrap();
        registry.record_site("second.test", "second").await.unwrap();

        let sites = registry.list_sites().await.unwrap();
        let domains: Vec<&str> = sites.iter().map(|s| s.domain.as_str()).collect();
        assert_eq!(domains, ["second.test", "first.test"]);
    }

    #[tokio::test]
    async fn test_is_taken() {
        let registry = SiteRegistry::in_memory().await.unwrap();
        registry.record_site("site1.test", "user_1").await.unwrap();

        assert_eq!(
            registry.is_taken("site1.test", "fresh").await.unwrap(),
            Some(DuplicateField::Domain)
        );
        assert_eq!(
            registry.is_taken("fresh.test", "user_1").await.unwrap(),
            Some(DuplicateField::Username)
        );
        assert_eq!(registry.is_taken("fresh.test", "fresh").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_migrate_is_idempotent() {
        let registry = SiteRegistry::in_memory().await.unwrap();
        registry.migrate().await.unwrap();
        registry.record_site("site1.test", "user_1").await.unwrap();
        registry.migrate().await.unwrap();
        assert_eq!(registry.list_sites().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_connect_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("app.db").display());

        let registry = SiteRegistry::connect(&url).await.unwrap();
        registry.record_site("site1.test", "user_1").await.unwrap();
        drop(registry);

        let reopened = SiteRegistry::connect(&url).await.unwrap();
        assert!(reopened.find_by_domain("site1.test").await.unwrap().is_some());
    }

    #[test]
    fn test_duplicate_field_from_message() {
        assert_eq!(
            duplicate_field("UNIQUE constraint failed: sites.domain"),
            DuplicateField::Domain
        );
        assert_eq!(
            duplicate_field("UNIQUE constraint failed: sites.username"),
            DuplicateField::Username
        );
        assert_eq!(duplicate_field("something else"), DuplicateField::Unknown);
    }
}
