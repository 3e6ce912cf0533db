//! User entity and repository trait.
//!
//! Maps to the `users` table in the database schema.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::shared::error::AppError;

/// Where the account's identity comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AuthProvider {
    #[default]
    Local,
    Google,
    Facebook,
}

impl AuthProvider {
    /// Convert from database string representation.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "local" => Some(Self::Local),
            "google" => Some(Self::Google),
            "facebook" => Some(Self::Facebook),
            _ => None,
        }
    }

    /// Convert to database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Google => "google",
            Self::Facebook => "facebook",
        }
    }

    pub fn is_external(&self) -> bool {
        !matches!(self, Self::Local)
    }
}

impl std::fmt::Display for AuthProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Represents a user account.
///
/// Maps to the `users` table:
/// - id: UUID PRIMARY KEY
/// - username: VARCHAR(50) NOT NULL UNIQUE
/// - email: VARCHAR(255) NOT NULL UNIQUE
/// - phone: VARCHAR(32) NULL
/// - password_hash: VARCHAR(255) NULL (absent for OAuth-only accounts)
/// - display_name: VARCHAR(100) NULL
/// - avatar_url: TEXT NULL
/// - about: TEXT NULL
/// - is_active: BOOLEAN NOT NULL DEFAULT TRUE
/// - last_seen_at: TIMESTAMPTZ NULL
/// - auth_provider: VARCHAR(20) NOT NULL DEFAULT 'local'
/// - provider_id: VARCHAR(255) NULL
/// - email_verified: BOOLEAN NOT NULL DEFAULT FALSE
/// - created_at / updated_at: TIMESTAMPTZ NOT NULL DEFAULT NOW()
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,

    /// Username (3-50 characters, unique)
    pub username: String,

    /// Email address (unique, stored lowercase)
    pub email: String,

    pub phone: Option<String>,

    /// Argon2 password hash
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,

    pub display_name: Option<String>,

    pub avatar_url: Option<String>,

    /// Free-form profile text
    pub about: Option<String>,

    /// Deactivated accounts cannot sign in
    pub is_active: bool,

    /// Last time the user was seen online
    pub last_seen_at: Option<DateTime<Utc>>,

    pub auth_provider: AuthProvider,

    /// Subject identifier at the external provider
    pub provider_id: Option<String>,

    pub email_verified: bool,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Create a local account with a hashed password.
    pub fn new_local(username: String, email: String, password_hash: String) -> Self {
        Self {
            username,
            email: email.to_lowercase(),
            password_hash: Some(password_hash),
            ..Self::default()
        }
    }

    /// Get the user's display name, falling back to username if not set.
    pub fn display_name_or_username(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.username)
    }

    /// Whether this account can sign in with a password.
    pub fn has_password(&self) -> bool {
        self.password_hash.is_some()
    }
}

impl Default for User {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            username: String::new(),
            email: String::new(),
            phone: None,
            password_hash: None,
            display_name: None,
            avatar_url: None,
            about: None,
            is_active: true,
            last_seen_at: None,
            auth_provider: AuthProvider::default(),
            provider_id: None,
            email_verified: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Repository trait for User data access operations.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError>;

    /// Fetch several users at once; missing ids are skipped.
    async fn find_by_ids(&self, ids: &[Uuid]) -> Result<Vec<User>, AppError>;

    /// Case-insensitive lookup by email.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError>;

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AppError>;

    /// Find an account by its external identity.
    async fn find_by_provider(
        &self,
        provider: AuthProvider,
        provider_id: &str,
    ) -> Result<Option<User>, AppError>;

    /// Insert a new user. Duplicate email or username yields `Conflict`.
    async fn create(&self, user: &User) -> Result<User, AppError>;

    /// Persist profile fields (display name, avatar, about, phone).
    async fn update_profile(&self, user: &User) -> Result<User, AppError>;

    /// Attach an external identity to an existing account.
    async fn link_provider(
        &self,
        id: Uuid,
        provider: AuthProvider,
        provider_id: &str,
        email_verified: bool,
    ) -> Result<User, AppError>;

    async fn email_exists(&self, email: &str) -> Result<bool, AppError>;

    async fn username_exists(&self, username: &str) -> Result<bool, AppError>;

    async fn touch_last_seen(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), AppError>;

    /// Users other than `user_id` who are not yet friends with them,
    /// optionally filtered by a case-insensitive name/email query.
    async fn search_non_friends(
        &self,
        user_id: Uuid,
        query: Option<String>,
        limit: i64,
    ) -> Result<Vec<User>, AppError>;
}
