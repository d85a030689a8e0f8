//! SQLite persistence for cafes and users.
//!
//! The schema lives in `migrations/` and is applied on startup. Queries are
//! plain runtime queries mapped through `sqlx::FromRow`.

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use thiserror::Error;
use tracing::debug;

use crate::cafe::{Cafe, NewCafe};
use crate::user::{username_candidates, NewUser, User};

const CAFE_COLUMNS: &str = "id, name, map_url, city, country, currency, coffee_price, \
     wifi_strength, seats, has_sockets, has_toilet, images, full_review, full_rating";

const USER_COLUMNS: &str = "id, username, email, password_hash, is_admin";

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

/// Open a pool for `database_url`, creating the database file if needed.
/// In-memory databases are pinned to a single connection so every query sees the same data.
pub async fn connect(database_url: &str) -> Result<SqlitePool, RepositoryError> {
    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
    let in_memory = database_url.contains(":memory:") || database_url.contains("mode=memory");

    let pool_options = SqlitePoolOptions::new().acquire_timeout(Duration::from_secs(10));
    let pool_options = if in_memory {
        pool_options
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        pool_options.max_connections(5)
    };

    Ok(pool_options.connect_with(options).await?)
}

pub async fn migrate(pool: &SqlitePool) -> Result<(), RepositoryError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(db) if db.is_unique_violation())
}

pub struct CafeRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> CafeRepository<'a> {
    pub const fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn list(&self) -> Result<Vec<Cafe>, RepositoryError> {
        let sql = format!("SELECT {CAFE_COLUMNS} FROM cafe ORDER BY id");
        Ok(sqlx::query_as::<_, Cafe>(&sql).fetch_all(self.pool).await?)
    }

    pub async fn count(&self) -> Result<i64, RepositoryError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM cafe")
            .fetch_one(self.pool)
            .await?;
        Ok(count)
    }

    pub async fn get(&self, id: i64) -> Result<Option<Cafe>, RepositoryError> {
        let sql = format!("SELECT {CAFE_COLUMNS} FROM cafe WHERE id = ?");
        Ok(sqlx::query_as::<_, Cafe>(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await?)
    }

    pub async fn find_by_name(&self, name: &str) -> Result<Option<Cafe>, RepositoryError> {
        let sql = format!("SELECT {CAFE_COLUMNS} FROM cafe WHERE name = ?");
        Ok(sqlx::query_as::<_, Cafe>(&sql)
            .bind(name)
            .fetch_optional(self.pool)
            .await?)
    }

    /// Insert a cafe. A name already in use yields `RepositoryError::Conflict`.
    pub async fn create(&self, cafe: &NewCafe) -> Result<Cafe, RepositoryError> {
        let sql = format!(
            "INSERT INTO cafe (name, map_url, city, country, currency, coffee_price, \
             wifi_strength, seats, has_sockets, has_toilet, images, full_review, full_rating) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING {CAFE_COLUMNS}"
        );
        let created = sqlx::query_as::<_, Cafe>(&sql)
            .bind(&cafe.name)
            .bind(&cafe.map_url)
            .bind(&cafe.city)
            .bind(&cafe.country)
            .bind(&cafe.currency)
            .bind(&cafe.coffee_price)
            .bind(cafe.wifi_strength)
            .bind(cafe.seats)
            .bind(cafe.has_sockets)
            .bind(cafe.has_toilet)
            .bind(&cafe.images)
            .bind(&cafe.full_review)
            .bind(cafe.full_rating)
            .fetch_one(self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    RepositoryError::Conflict(cafe.name.clone())
                } else {
                    RepositoryError::Database(e)
                }
            })?;
        debug!(cafe_id = created.id, name = %created.name, "cafe inserted");
        Ok(created)
    }

    /// Persist every column of `cafe`. Returns `false` when the row no longer exists.
    pub async fn update(&self, cafe: &Cafe) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE cafe SET name = ?, map_url = ?, city = ?, country = ?, currency = ?, \
             coffee_price = ?, wifi_strength = ?, seats = ?, has_sockets = ?, has_toilet = ?, \
             images = ?, full_review = ?, full_rating = ? WHERE id = ?",
        )
        .bind(&cafe.name)
        .bind(&cafe.map_url)
        .bind(&cafe.city)
        .bind(&cafe.country)
        .bind(&cafe.currency)
        .bind(&cafe.coffee_price)
        .bind(cafe.wifi_strength)
        .bind(cafe.seats)
        .bind(cafe.has_sockets)
        .bind(cafe.has_toilet)
        .bind(&cafe.images)
        .bind(&cafe.full_review)
        .bind(cafe.full_rating)
        .bind(cafe.id)
        .execute(self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                RepositoryError::Conflict(cafe.name.clone())
            } else {
                RepositoryError::Database(e)
            }
        })?;
        Ok(result.rows_affected() > 0)
    }

    /// Returns `false` when no cafe had that id.
    pub async fn delete(&self, id: i64) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM cafe WHERE id = ?")
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

pub struct UserRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> UserRepository<'a> {
    pub const fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, id: i64) -> Result<Option<User>, RepositoryError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?");
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await?)
    }

    /// Lookup by email. Callers pass the already lower-cased address.
    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?");
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(self.pool)
            .await?)
    }

    pub async fn username_taken(&self, username: &str) -> Result<bool, RepositoryError> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(self.pool)
            .await?;
        Ok(row.is_some())
    }

    /// First free username among `base`, `base1`, `base2`, ...
    pub async fn available_username(&self, base: &str) -> Result<String, RepositoryError> {
        for candidate in username_candidates(base) {
            if !self.username_taken(&candidate).await? {
                return Ok(candidate);
            }
        }
        unreachable!("username candidates are unbounded")
    }

    /// Insert a user. A duplicate email or username yields `RepositoryError::Conflict`.
    pub async fn create(&self, user: &NewUser) -> Result<User, RepositoryError> {
        let sql = format!(
            "INSERT INTO users (username, email, password_hash, is_admin) \
             VALUES (?, ?, ?, 0) RETURNING {USER_COLUMNS}"
        );
        let created = sqlx::query_as::<_, User>(&sql)
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.password_hash)
            .fetch_one(self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    RepositoryError::Conflict(user.email.clone())
                } else {
                    RepositoryError::Database(e)
                }
            })?;
        debug!(user_id = created.id, username = %created.username, "user inserted");
        Ok(created)
    }

    /// Set the admin flag for the account with this email. Returns `false` if there is none.
    pub async fn set_admin(&self, email: &str, is_admin: bool) -> Result<bool, RepositoryError> {
        let result = sqlx::query("UPDATE users SET is_admin = ? WHERE email = ?")
            .bind(is_admin)
            .bind(email)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;

    use super::{connect, migrate, CafeRepository, RepositoryError, UserRepository};
    use crate::cafe::fixtures::new_cafe;
    use crate::user::NewUser;

    async fn memory_pool() -> Result<sqlx::SqlitePool> {
        let pool = connect("sqlite::memory:").await?;
        migrate(&pool).await?;
        Ok(pool)
    }

    #[tokio::test]
    async fn duplicate_cafe_name_is_a_conflict_and_not_inserted() -> Result<()> {
        let pool = memory_pool().await?;
        let cafes = CafeRepository::new(&pool);

        cafes
            .create(&new_cafe("Grind", "London", "United Kingdom (UK)"))
            .await?;
        let second = cafes
            .create(&new_cafe("Grind", "Paris", "France (FR)"))
            .await;

        assert!(matches!(second, Err(RepositoryError::Conflict(_))));
        assert_eq!(cafes.count().await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn update_and_delete_report_missing_rows() -> Result<()> {
        let pool = memory_pool().await?;
        let cafes = CafeRepository::new(&pool);

        let mut created = cafes
            .create(&new_cafe("Grind", "London", "United Kingdom (UK)"))
            .await?;
        created.seats = 3;
        assert!(cafes.update(&created).await?);
        assert_eq!(cafes.get(created.id).await?.map(|c| c.seats), Some(3));

        assert!(cafes.delete(created.id).await?);
        assert!(!cafes.delete(created.id).await?);
        created.id = 999;
        assert!(!cafes.update(&created).await?);
        Ok(())
    }

    #[tokio::test]
    async fn available_username_skips_taken_names() -> Result<()> {
        let pool = memory_pool().await?;
        let users = UserRepository::new(&pool);

        users
            .create(&NewUser {
                username: String::from("a"),
                email: String::from("a@y.com"),
                password_hash: String::from("hash"),
            })
            .await?;

        assert_eq!(users.available_username("a").await?, "a1");
        assert_eq!(users.available_username("b").await?, "b");
        Ok(())
    }

    #[tokio::test]
    async fn set_admin_toggles_flag() -> Result<()> {
        let pool = memory_pool().await?;
        let users = UserRepository::new(&pool);
        let created = users
            .create(&NewUser {
                username: String::from("boss"),
                email: String::from("boss@x.com"),
                password_hash: String::from("hash"),
            })
            .await?;
        assert!(!created.is_admin);

        assert!(users.set_admin("boss@x.com", true).await?);
        assert!(!users.set_admin("nobody@x.com", true).await?);
        let reloaded = users.find_by_email("boss@x.com").await?;
        assert_eq!(reloaded.map(|u| u.is_admin), Some(true));
        Ok(())
    }
}
