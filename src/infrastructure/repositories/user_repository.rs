//! User Repository Implementation
//!
//! PostgreSQL implementation of the UserRepository trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{AuthProvider, User, UserRepository};
use crate::shared::error::AppError;

/// Database row representation of the users table.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct UserRow {
    id: Uuid,
    username: String,
    email: String,
    phone: Option<String>,
    password_hash: Option<String>,
    display_name: Option<String>,
    avatar_url: Option<String>,
    about: Option<String>,
    is_active: bool,
    last_seen_at: Option<DateTime<Utc>>,
    auth_provider: String,
    provider_id: Option<String>,
    email_verified: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl UserRow {
    /// Convert database row to domain User entity.
    pub(crate) fn into_user(self) -> User {
        User {
            id: self.id,
            username: self.username,
            email: self.email,
            phone: self.phone,
            password_hash: self.password_hash,
            display_name: self.display_name,
            avatar_url: self.avatar_url,
            about: self.about,
            is_active: self.is_active,
            last_seen_at: self.last_seen_at,
            auth_provider: AuthProvider::from_str(&self.auth_provider).unwrap_or_default(),
            provider_id: self.provider_id,
            email_verified: self.email_verified,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// PostgreSQL user repository implementation.
#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    /// Create a new PgUserRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, username, email, phone, password_hash, display_name, avatar_url,
                   about, is_active, last_seen_at, auth_provider, provider_id,
                   email_verified, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into_user()))
    }

    async fn find_by_ids(&self, ids: &[Uuid]) -> Result<Vec<User>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, username, email, phone, password_hash, display_name, avatar_url,
                   about, is_active, last_seen_at, auth_provider, provider_id,
                   email_verified, created_at, updated_at
            FROM users
            WHERE id = ANY($1)
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into_user()).collect())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, username, email, phone, password_hash, display_name, avatar_url,
                   about, is_active, last_seen_at, auth_provider, provider_id,
                   email_verified, created_at, updated_at
            FROM users
            WHERE LOWER(email) = LOWER($1)
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into_user()))
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, username, email, phone, password_hash, display_name, avatar_url,
                   about, is_active, last_seen_at, auth_provider, provider_id,
                   email_verified, created_at, updated_at
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into_user()))
    }

    async fn find_by_provider(
        &self,
        provider: AuthProvider,
        provider_id: &str,
    ) -> Result<Option<User>, AppError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, username, email, phone, password_hash, display_name, avatar_url,
                   about, is_active, last_seen_at, auth_provider, provider_id,
                   email_verified, created_at, updated_at
            FROM users
            WHERE auth_provider = $1 AND provider_id = $2
            "#,
        )
        .bind(provider.as_str())
        .bind(provider_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into_user()))
    }

    async fn create(&self, user: &User) -> Result<User, AppError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO users (id, username, email, phone, password_hash, display_name,
                               avatar_url, about, is_active, auth_provider, provider_id,
                               email_verified, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $13)
            RETURNING id, username, email, phone, password_hash, display_name, avatar_url,
                      about, is_active, last_seen_at, auth_provider, provider_id,
                      email_verified, created_at, updated_at
            "#,
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.phone)
        .bind(&user.password_hash)
        .bind(&user.display_name)
        .bind(&user.avatar_url)
        .bind(&user.about)
        .bind(user.is_active)
        .bind(user.auth_provider.as_str())
        .bind(&user.provider_id)
        .bind(user.email_verified)
        .bind(user.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::from_unique(e, "User with this email or username already exists"))?;

        Ok(row.into_user())
    }

    async fn update_profile(&self, user: &User) -> Result<User, AppError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            UPDATE users
            SET display_name = $2, avatar_url = $3, about = $4, phone = $5, updated_at = NOW()
            WHERE id = $1
            RETURNING id, username, email, phone, password_hash, display_name, avatar_url,
                      about, is_active, last_seen_at, auth_provider, provider_id,
                      email_verified, created_at, updated_at
            "#,
        )
        .bind(user.id)
        .bind(&user.display_name)
        .bind(&user.avatar_url)
        .bind(&user.about)
        .bind(&user.phone)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

        Ok(row.into_user())
    }

    async fn link_provider(
        &self,
        id: Uuid,
        provider: AuthProvider,
        provider_id: &str,
        email_verified: bool,
    ) -> Result<User, AppError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            UPDATE users
            SET auth_provider = $2, provider_id = $3,
                email_verified = email_verified OR $4, updated_at = NOW()
            WHERE id = $1
            RETURNING id, username, email, phone, password_hash, display_name, avatar_url,
                      about, is_active, last_seen_at, auth_provider, provider_id,
                      email_verified, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(provider.as_str())
        .bind(provider_id)
        .bind(email_verified)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::from_unique(e, "Identity is already linked to another account"))?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

        Ok(row.into_user())
    }

    async fn email_exists(&self, email: &str) -> Result<bool, AppError> {
        let exists: (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM users WHERE LOWER(email) = LOWER($1))")
                .bind(email)
                .fetch_one(&self.pool)
                .await?;

        Ok(exists.0)
    }

    async fn username_exists(&self, username: &str) -> Result<bool, AppError> {
        let exists: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM users WHERE username = $1)")
            .bind(username)
            .fetch_one(&self.pool)
            .await?;

        Ok(exists.0)
    }

    async fn touch_last_seen(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET last_seen_at = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn search_non_friends(
        &self,
        user_id: Uuid,
        query: Option<String>,
        limit: i64,
    ) -> Result<Vec<User>, AppError> {
        let pattern = query.map(|q| format!("%{}%", escape_like(&q)));

        let rows = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT u.id, u.username, u.email, u.phone, u.password_hash, u.display_name,
                   u.avatar_url, u.about, u.is_active, u.last_seen_at, u.auth_provider,
                   u.provider_id, u.email_verified, u.created_at, u.updated_at
            FROM users u
            WHERE u.id <> $1
              AND u.is_active
              AND NOT EXISTS (
                  SELECT 1 FROM friendships f
                  WHERE (f.user1_id = LEAST($1, u.id) AND f.user2_id = GREATEST($1, u.id))
              )
              AND ($2::TEXT IS NULL
                   OR u.username ILIKE $2
                   OR u.display_name ILIKE $2
                   OR u.email ILIKE $2)
            ORDER BY u.username
            LIMIT $3
            "#,
        )
        .bind(user_id)
        .bind(pattern)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into_user()).collect())
    }
}

/// Escape `%`, `_` and `\` so user input matches literally inside ILIKE.
pub(crate) fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("bob"), "bob");
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
    }

    #[test]
    fn test_row_with_unknown_provider_falls_back_to_local() {
        let now = Utc::now();
        let row = UserRow {
            id: Uuid::now_v7(),
            username: "alice".into(),
            email: "alice@example.com".into(),
            phone: None,
            password_hash: None,
            display_name: None,
            avatar_url: None,
            about: None,
            is_active: true,
            last_seen_at: None,
            auth_provider: "myspace".into(),
            provider_id: None,
            email_verified: false,
            created_at: now,
            updated_at: now,
        };
        assert_eq!(row.into_user().auth_provider, AuthProvider::Local);
    }
}
