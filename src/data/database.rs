//! SQLite database operations
//!
//! All database access goes through this module.

use chrono::{DateTime, Utc};
use sqlx::{Pool, Sqlite, SqlitePool};
use std::path::Path;
use std::time::Instant;

use super::models::*;
use crate::error::AppError;
use crate::metrics::{DB_QUERIES_TOTAL, DB_QUERY_DURATION_SECONDS};

/// Database connection pool wrapper.
pub struct Database {
    pool: Pool<Sqlite>,
}

/// Row shape of the `sessions` table; flashes are stored as JSON text
#[derive(sqlx::FromRow)]
struct SessionRow {
    id: String,
    user_id: Option<String>,
    oauth_state: Option<String>,
    flash: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl TryFrom<SessionRow> for Session {
    type Error = AppError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        let flash = serde_json::from_str(&row.flash).map_err(|e| AppError::Internal(e.into()))?;
        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            oauth_state: row.oauth_state,
            flash,
            created_at: row.created_at,
            expires_at: row.expires_at,
        })
    }
}

fn observe_query(operation: &str, table: &str, started: Instant) {
    DB_QUERIES_TOTAL
        .with_label_values(&[operation, table])
        .inc();
    DB_QUERY_DURATION_SECONDS
        .with_label_values(&[operation, table])
        .observe(started.elapsed().as_secs_f64());
}

impl Database {
    /// Connect to the SQLite file at `path` and run migrations.
    ///
    /// The parent directory is created when missing.
    pub async fn connect(path: &Path) -> Result<Self, AppError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AppError::Database(sqlx::Error::Io(e)))?;
        }

        let connection_string = format!("sqlite:{}?mode=rwc", path.display());
        let pool = SqlitePool::connect(&connection_string).await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| {
                tracing::error!("Migration failed: {}", e);
                AppError::Internal(anyhow::anyhow!("Migration failed: {}", e))
            })?;

        tracing::info!(path = %path.display(), "Database connected and migrated successfully");

        Ok(Self { pool })
    }

    // =========================================================================
    // Users
    // =========================================================================

    /// Get a user by local id
    pub async fn get_user(&self, id: &str) -> Result<Option<User>, AppError> {
        let started = Instant::now();
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        observe_query("select", "users", started);

        Ok(user)
    }

    /// Get a user by the identity provider's id
    pub async fn get_user_by_provider_id(
        &self,
        provider_id: &str,
    ) -> Result<Option<User>, AppError> {
        let started = Instant::now();
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE provider_id = ?")
            .bind(provider_id)
            .fetch_optional(&self.pool)
            .await?;
        observe_query("select", "users", started);

        Ok(user)
    }

    /// Find the user for a provider identity, creating it on first login.
    ///
    /// The insert ignores conflicts on `provider_id`, so concurrent first
    /// logins for the same identity still end up with a single row. Profile
    /// fields of an existing user are refreshed from the identity.
    ///
    /// # Returns
    /// The stored user and whether it was created by this call
    pub async fn find_or_create_user(
        &self,
        identity: &ProviderIdentity,
    ) -> Result<(User, bool), AppError> {
        let now = Utc::now();
        let started = Instant::now();
        let inserted = sqlx::query(
            r#"
            INSERT INTO users (
                id, provider_id, display_name, first_name, last_name, email,
                image_url, online, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?, ?)
            ON CONFLICT(provider_id) DO NOTHING
            "#,
        )
        .bind(EntityId::new().0)
        .bind(&identity.provider_id)
        .bind(&identity.display_name)
        .bind(&identity.first_name)
        .bind(&identity.last_name)
        .bind(&identity.email)
        .bind(&identity.image_url)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?
        .rows_affected()
            > 0;
        observe_query("insert", "users", started);

        if !inserted {
            let started = Instant::now();
            sqlx::query(
                r#"
                UPDATE users
                SET display_name = ?, first_name = ?, last_name = ?, email = ?,
                    image_url = ?, updated_at = ?
                WHERE provider_id = ?
                "#,
            )
            .bind(&identity.display_name)
            .bind(&identity.first_name)
            .bind(&identity.last_name)
            .bind(&identity.email)
            .bind(&identity.image_url)
            .bind(now)
            .bind(&identity.provider_id)
            .execute(&self.pool)
            .await?;
            observe_query("update", "users", started);
        }

        let user = self
            .get_user_by_provider_id(&identity.provider_id)
            .await?
            .ok_or_else(|| {
                AppError::Internal(anyhow::anyhow!(
                    "user for provider id {} vanished after insert",
                    identity.provider_id
                ))
            })?;

        Ok((user, inserted))
    }

    /// Set the online flag of a user
    ///
    /// # Returns
    /// The updated user, or `None` if no user has this id
    pub async fn set_user_online(&self, id: &str, online: bool) -> Result<Option<User>, AppError> {
        let started = Instant::now();
        let result = sqlx::query("UPDATE users SET online = ?, updated_at = ? WHERE id = ?")
            .bind(online)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        observe_query("update", "users", started);

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.get_user(id).await
    }

    /// Count registered users
    pub async fn count_users(&self) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    // =========================================================================
    // Messages
    // =========================================================================

    /// Store a contact form submission timestamped now
    pub async fn insert_message(&self, new_message: &NewMessage) -> Result<Message, AppError> {
        let message = Message {
            id: EntityId::new().0,
            fullname: new_message.fullname.clone(),
            email: new_message.email.clone(),
            message: new_message.message.clone(),
            created_at: Utc::now(),
        };

        let started = Instant::now();
        sqlx::query(
            r#"
            INSERT INTO messages (id, fullname, email, message, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&message.id)
        .bind(&message.fullname)
        .bind(&message.email)
        .bind(&message.message)
        .bind(message.created_at)
        .execute(&self.pool)
        .await?;
        observe_query("insert", "messages", started);

        Ok(message)
    }

    /// List every stored message, oldest first
    pub async fn list_messages(&self) -> Result<Vec<Message>, AppError> {
        let started = Instant::now();
        let messages =
            sqlx::query_as::<_, Message>("SELECT * FROM messages ORDER BY created_at ASC, id ASC")
                .fetch_all(&self.pool)
                .await?;
        observe_query("select", "messages", started);

        Ok(messages)
    }

    // =========================================================================
    // Sessions
    // =========================================================================

    /// Load a live session
    ///
    /// # Returns
    /// `None` if the row was deleted or has expired
    pub async fn get_session(&self, id: &str) -> Result<Option<Session>, AppError> {
        let started = Instant::now();
        let row = sqlx::query_as::<_, SessionRow>("SELECT * FROM sessions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        observe_query("select", "sessions", started);

        let session = row.map(Session::try_from).transpose()?;
        Ok(session.filter(|session| !session.is_expired()))
    }

    /// Insert or replace a session row
    pub async fn save_session(&self, session: &Session) -> Result<(), AppError> {
        let flash =
            serde_json::to_string(&session.flash).map_err(|e| AppError::Internal(e.into()))?;

        let started = Instant::now();
        sqlx::query(
            r#"
            INSERT INTO sessions (id, user_id, oauth_state, flash, created_at, expires_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                user_id = excluded.user_id,
                oauth_state = excluded.oauth_state,
                flash = excluded.flash,
                expires_at = excluded.expires_at
            "#,
        )
        .bind(&session.id)
        .bind(&session.user_id)
        .bind(&session.oauth_state)
        .bind(flash)
        .bind(session.created_at)
        .bind(session.expires_at)
        .execute(&self.pool)
        .await?;
        observe_query("upsert", "sessions", started);

        Ok(())
    }

    /// Delete a session row; deleting a missing row is not an error
    pub async fn delete_session(&self, id: &str) -> Result<(), AppError> {
        let started = Instant::now();
        sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        observe_query("delete", "sessions", started);

        Ok(())
    }

    /// Delete every session past its expiry
    ///
    /// # Returns
    /// Number of rows removed
    pub async fn delete_expired_sessions(&self) -> Result<u64, AppError> {
        let started = Instant::now();
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at < ?")
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        observe_query("delete", "sessions", started);

        Ok(result.rows_affected())
    }
}
