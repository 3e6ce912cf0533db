//! Authentication Service
//!
//! Handles signup/login, JWT access tokens, refresh-token rotation and
//! OAuth identity assertions.

use std::sync::Arc;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::application::dto::response::TokenResponse;
use crate::config::{JwtSettings, OAuthSettings};
use crate::domain::{AuthProvider, RefreshToken, RefreshTokenRepository, User, UserRepository};
use crate::shared::error::AppError;

/// Authentication service trait for dependency injection
#[async_trait]
pub trait AuthService: Send + Sync {
    /// Register a local account and sign it in
    async fn signup(
        &self,
        username: &str,
        email: &str,
        password: &str,
        display_name: Option<String>,
    ) -> Result<(User, TokenResponse), AuthError>;

    /// Authenticate with email and password
    async fn login(&self, email: &str, password: &str) -> Result<(User, TokenResponse), AuthError>;

    /// Whether an email address is still free
    async fn check_email(&self, email: &str) -> Result<bool, AuthError>;

    /// Exchange a refresh token for a new token pair (rotation)
    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, AuthError>;

    /// Revoke a refresh token; unknown tokens are ignored
    async fn logout(&self, refresh_token: &str) -> Result<(), AuthError>;

    /// Find-or-create an account from a signed provider assertion
    async fn oauth_login(
        &self,
        provider: AuthProvider,
        assertion: &str,
    ) -> Result<(User, TokenResponse), AuthError>;

    /// Validate an access token and extract the user id
    fn validate_token(&self, access_token: &str) -> Result<Uuid, AuthError>;

    /// Delete expired and revoked refresh tokens
    async fn purge_expired_tokens(&self) -> Result<u64, AuthError>;
}

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at time (Unix timestamp)
    pub iat: i64,
    /// JWT ID
    pub jti: String,
}

/// Claims of an OAuth identity assertion
#[derive(Debug, Serialize, Deserialize)]
pub struct OAuthAssertion {
    /// Provider-side user id
    pub sub: String,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
    #[serde(default)]
    pub email_verified: bool,
    pub exp: i64,
}

/// Authentication errors
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account is disabled")]
    AccountDisabled,

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Invalid refresh token")]
    InvalidRefreshToken,

    #[error("Email already exists")]
    EmailExists,

    #[error("Username already exists")]
    UsernameExists,

    #[error("OAuth login is not configured")]
    OAuthDisabled,

    #[error("Unsupported OAuth provider: {0}")]
    UnsupportedProvider(String),

    #[error("Invalid identity assertion")]
    InvalidAssertion,

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Store(#[from] AppError),
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials
            | AuthError::AccountDisabled
            | AuthError::TokenExpired
            | AuthError::InvalidToken
            | AuthError::InvalidRefreshToken
            | AuthError::InvalidAssertion => AppError::Unauthorized(err.to_string()),
            AuthError::EmailExists | AuthError::UsernameExists => AppError::Conflict(err.to_string()),
            AuthError::OAuthDisabled | AuthError::UnsupportedProvider(_) => {
                AppError::BadRequest(err.to_string())
            }
            AuthError::Internal(msg) => AppError::Internal(msg),
            AuthError::Store(e) => e,
        }
    }
}

/// Stateless access-token verifier shared by the HTTP middleware and the
/// WebSocket CONNECT handshake.
#[derive(Clone)]
pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    pub fn decode(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(token, &self.key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::InvalidToken,
            })
    }

    /// Validate and return the subject as a user id
    pub fn verify(&self, token: &str) -> Result<Uuid, AuthError> {
        let claims = self.decode(token)?;
        Uuid::parse_str(&claims.sub).map_err(|_| AuthError::InvalidToken)
    }
}

/// Hash a refresh token for storage
pub fn hash_refresh_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Opaque refresh token: 32 random bytes, hex encoded
fn generate_refresh_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Username candidate derived from an email local part
fn username_from_email(email: &str) -> String {
    let local = email.split('@').next().unwrap_or_default();
    let mut base: String = local
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '.')
        .take(40)
        .collect::<String>()
        .to_lowercase();
    while base.len() < 3 {
        base.push('_');
    }
    base
}

/// AuthService implementation
pub struct AuthServiceImpl<U, T>
where
    U: UserRepository,
    T: RefreshTokenRepository,
{
    user_repo: Arc<U>,
    token_repo: Arc<T>,
    jwt_settings: JwtSettings,
    oauth_settings: OAuthSettings,
    verifier: TokenVerifier,
}

impl<U, T> AuthServiceImpl<U, T>
where
    U: UserRepository,
    T: RefreshTokenRepository,
{
    pub fn new(
        user_repo: Arc<U>,
        token_repo: Arc<T>,
        jwt_settings: JwtSettings,
        oauth_settings: OAuthSettings,
    ) -> Self {
        let verifier = TokenVerifier::new(&jwt_settings.secret);
        Self {
            user_repo,
            token_repo,
            jwt_settings,
            oauth_settings,
            verifier,
        }
    }

    /// Hash a password using Argon2id
    fn hash_password(&self, password: &str) -> Result<String, AuthError> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| AuthError::Internal(format!("Password hashing failed: {}", e)))
    }

    fn verify_password(&self, password: &str, hash: &str) -> Result<bool, AuthError> {
        let parsed_hash = PasswordHash::new(hash)
            .map_err(|e| AuthError::Internal(format!("Invalid password hash: {}", e)))?;

        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok())
    }

    fn refresh_lifetime(&self) -> Duration {
        Duration::days(self.jwt_settings.refresh_token_expiry_days)
    }

    /// Sign an access token and mint an opaque refresh token
    fn generate_tokens(&self, user_id: Uuid) -> Result<(TokenResponse, String), AuthError> {
        let now = Utc::now();
        let access_expiry = now + Duration::minutes(self.jwt_settings.access_token_expiry_minutes);

        let claims = Claims {
            sub: user_id.to_string(),
            exp: access_expiry.timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        let access_token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.jwt_settings.secret.as_bytes()),
        )
        .map_err(|e| AuthError::Internal(format!("Token generation failed: {}", e)))?;

        let refresh_token = generate_refresh_token();
        let token_hash = hash_refresh_token(&refresh_token);

        Ok((
            TokenResponse {
                access_token,
                refresh_token,
                expires_in: self.jwt_settings.access_token_expiry_minutes * 60,
                token_type: "Bearer".to_string(),
            },
            token_hash,
        ))
    }

    /// Issue a token pair and persist the refresh token
    async fn issue_tokens(&self, user_id: Uuid) -> Result<TokenResponse, AuthError> {
        let (tokens, token_hash) = self.generate_tokens(user_id)?;
        let row = RefreshToken::new(user_id, token_hash, self.refresh_lifetime());
        self.token_repo.create(&row).await?;
        Ok(tokens)
    }

    fn decode_assertion(&self, assertion: &str) -> Result<OAuthAssertion, AuthError> {
        let secret = self
            .oauth_settings
            .assertion_secret
            .as_deref()
            .ok_or(AuthError::OAuthDisabled)?;

        decode::<OAuthAssertion>(
            assertion,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::new(Algorithm::HS256),
        )
        .map(|data| data.claims)
        .map_err(|e| {
            tracing::debug!(error = %e, "Rejected OAuth assertion");
            AuthError::InvalidAssertion
        })
    }

    /// Pick a free username based on the email local part
    async fn unique_username(&self, email: &str) -> Result<String, AuthError> {
        let base = username_from_email(email);
        if !self.user_repo.username_exists(&base).await? {
            return Ok(base);
        }
        for _ in 0..10 {
            let candidate = format!("{}{}", base, rand::random_range(1000..10000));
            if !self.user_repo.username_exists(&candidate).await? {
                return Ok(candidate);
            }
        }
        let suffix = Uuid::now_v7().simple().to_string();
        Ok(format!("{}_{}", base, &suffix[suffix.len() - 8..]))
    }
}

#[async_trait]
impl<U, T> AuthService for AuthServiceImpl<U, T>
where
    U: UserRepository + 'static,
    T: RefreshTokenRepository + 'static,
{
    async fn signup(
        &self,
        username: &str,
        email: &str,
        password: &str,
        display_name: Option<String>,
    ) -> Result<(User, TokenResponse), AuthError> {
        let email = email.trim().to_lowercase();
        let username = username.trim();

        if self.user_repo.email_exists(&email).await? {
            return Err(AuthError::EmailExists);
        }
        if self.user_repo.username_exists(username).await? {
            return Err(AuthError::UsernameExists);
        }

        let password_hash = self.hash_password(password)?;
        let mut user = User::new_local(username.to_string(), email, password_hash);
        user.display_name = display_name.filter(|d| !d.trim().is_empty());

        let created = self.user_repo.create(&user).await?;
        let tokens = self.issue_tokens(created.id).await?;

        tracing::info!(user_id = %created.id, "User signed up");
        Ok((created, tokens))
    }

    async fn login(&self, email: &str, password: &str) -> Result<(User, TokenResponse), AuthError> {
        let mut user = self
            .user_repo
            .find_by_email(email.trim())
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        let hash = user
            .password_hash
            .as_deref()
            .ok_or(AuthError::InvalidCredentials)?;
        if !self.verify_password(password, hash)? {
            return Err(AuthError::InvalidCredentials);
        }
        if !user.is_active {
            return Err(AuthError::AccountDisabled);
        }

        let now = Utc::now();
        self.user_repo.touch_last_seen(user.id, now).await?;
        user.last_seen_at = Some(now);

        let tokens = self.issue_tokens(user.id).await?;
        Ok((user, tokens))
    }

    async fn check_email(&self, email: &str) -> Result<bool, AuthError> {
        Ok(!self.user_repo.email_exists(&email.trim().to_lowercase()).await?)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, AuthError> {
        let token_hash = hash_refresh_token(refresh_token);

        let stored = self
            .token_repo
            .find_by_hash(&token_hash)
            .await?
            .ok_or(AuthError::InvalidRefreshToken)?;

        if !stored.is_usable() {
            return Err(AuthError::InvalidRefreshToken);
        }

        let (tokens, new_hash) = self.generate_tokens(stored.user_id)?;
        let replacement = RefreshToken::new(stored.user_id, new_hash, self.refresh_lifetime());

        // A concurrent refresh with the same token loses the race here
        self.token_repo
            .rotate(stored.id, &replacement)
            .await
            .map_err(|e| match e {
                AppError::Unauthorized(_) => AuthError::InvalidRefreshToken,
                other => AuthError::Store(other),
            })?;

        Ok(tokens)
    }

    async fn logout(&self, refresh_token: &str) -> Result<(), AuthError> {
        let revoked = self
            .token_repo
            .revoke_by_hash(&hash_refresh_token(refresh_token))
            .await?;
        if !revoked {
            tracing::debug!("Logout with unknown refresh token");
        }
        Ok(())
    }

    async fn oauth_login(
        &self,
        provider: AuthProvider,
        assertion: &str,
    ) -> Result<(User, TokenResponse), AuthError> {
        if !provider.is_external() {
            return Err(AuthError::UnsupportedProvider(provider.to_string()));
        }
        let identity = self.decode_assertion(assertion)?;
        let email = identity.email.trim().to_lowercase();

        let user = match self.user_repo.find_by_provider(provider, &identity.sub).await? {
            Some(user) => user,
            None => match self.user_repo.find_by_email(&email).await? {
                Some(existing) => {
                    tracing::info!(user_id = %existing.id, provider = %provider, "Linking external identity");
                    self.user_repo
                        .link_provider(existing.id, provider, &identity.sub, identity.email_verified)
                        .await?
                }
                None => {
                    let username = self.unique_username(&email).await?;
                    let user = User {
                        username,
                        email,
                        display_name: identity.name,
                        avatar_url: identity.picture,
                        auth_provider: provider,
                        provider_id: Some(identity.sub),
                        email_verified: identity.email_verified,
                        ..User::default()
                    };
                    let created = self.user_repo.create(&user).await?;
                    tracing::info!(user_id = %created.id, provider = %provider, "User created from OAuth identity");
                    created
                }
            },
        };

        if !user.is_active {
            return Err(AuthError::AccountDisabled);
        }

        self.user_repo.touch_last_seen(user.id, Utc::now()).await?;
        let tokens = self.issue_tokens(user.id).await?;
        Ok((user, tokens))
    }

    fn validate_token(&self, access_token: &str) -> Result<Uuid, AuthError> {
        self.verifier.verify(access_token)
    }

    async fn purge_expired_tokens(&self) -> Result<u64, AuthError> {
        Ok(self.token_repo.delete_expired().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_settings;
    use crate::domain::{MockRefreshTokenRepository, MockUserRepository};
    use mockall::predicate::*;
    use pretty_assertions::assert_eq;

    const ASSERTION_SECRET: &str = "assertion-secret-that-is-at-least-32-chars";

    fn service(
        users: MockUserRepository,
        tokens: MockRefreshTokenRepository,
    ) -> AuthServiceImpl<MockUserRepository, MockRefreshTokenRepository> {
        let settings = test_settings();
        AuthServiceImpl::new(
            Arc::new(users),
            Arc::new(tokens),
            settings.jwt,
            OAuthSettings {
                assertion_secret: Some(ASSERTION_SECRET.into()),
            },
        )
    }

    fn accept_token_create(tokens: &mut MockRefreshTokenRepository) {
        tokens
            .expect_create()
            .returning(|token| Ok(token.clone()));
    }

    // ==========================================================================
    // Token Tests
    // ==========================================================================

    #[test]
    fn test_refresh_token_shape() {
        let token = generate_refresh_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(token, generate_refresh_token());
    }

    #[test]
    fn test_hash_is_stable() {
        assert_eq!(hash_refresh_token("abc"), hash_refresh_token("abc"));
        assert_eq!(hash_refresh_token("abc").len(), 64);
    }

    #[test]
    fn test_access_token_roundtrip() {
        let svc = service(MockUserRepository::new(), MockRefreshTokenRepository::new());
        let user_id = Uuid::now_v7();
        let (tokens, _) = svc.generate_tokens(user_id).unwrap();

        assert_eq!(svc.validate_token(&tokens.access_token).unwrap(), user_id);
        assert_eq!(tokens.expires_in, 15 * 60);
        assert_eq!(tokens.token_type, "Bearer");
    }

    #[test]
    fn test_foreign_token_rejected() {
        let other = TokenVerifier::new("another-secret-that-is-at-least-32-chars!!");
        let svc = service(MockUserRepository::new(), MockRefreshTokenRepository::new());
        let (tokens, _) = svc.generate_tokens(Uuid::now_v7()).unwrap();

        assert!(matches!(other.verify(&tokens.access_token), Err(AuthError::InvalidToken)));
        assert!(matches!(svc.validate_token("garbage"), Err(AuthError::InvalidToken)));
    }

    #[test]
    fn test_username_from_email() {
        assert_eq!(username_from_email("John.Doe+spam@example.com"), "john.doespam");
        assert_eq!(username_from_email("a@b.c"), "a__");
    }

    // ==========================================================================
    // Signup / Login Tests
    // ==========================================================================

    #[tokio::test]
    async fn test_signup_rejects_taken_email() {
        let mut users = MockUserRepository::new();
        users
            .expect_email_exists()
            .with(eq("taken@example.com"))
            .returning(|_| Ok(true));

        let svc = service(users, MockRefreshTokenRepository::new());
        let result = svc
            .signup("newbie", "Taken@Example.com", "password123", None)
            .await;

        assert!(matches!(result, Err(AuthError::EmailExists)));
    }

    #[tokio::test]
    async fn test_signup_then_login() {
        let stored: Arc<parking_lot::Mutex<Option<User>>> = Arc::default();

        let mut users = MockUserRepository::new();
        users.expect_email_exists().returning(|_| Ok(false));
        users.expect_username_exists().returning(|_| Ok(false));
        let sink = stored.clone();
        users.expect_create().returning(move |user| {
            *sink.lock() = Some(user.clone());
            Ok(user.clone())
        });
        let source = stored.clone();
        users
            .expect_find_by_email()
            .returning(move |_| Ok(source.lock().clone()));
        users.expect_touch_last_seen().returning(|_, _| Ok(()));

        let mut tokens = MockRefreshTokenRepository::new();
        accept_token_create(&mut tokens);

        let svc = service(users, tokens);
        let (user, _) = svc
            .signup("alice", "alice@example.com", "correct-horse", Some("Alice".into()))
            .await
            .unwrap();
        assert_eq!(user.display_name.as_deref(), Some("Alice"));
        assert!(user.password_hash.as_deref().unwrap().starts_with("$argon2"));

        let (logged_in, tokens) = svc.login("alice@example.com", "correct-horse").await.unwrap();
        assert_eq!(logged_in.id, user.id);
        assert!(logged_in.last_seen_at.is_some());
        assert_eq!(svc.validate_token(&tokens.access_token).unwrap(), user.id);

        let wrong = svc.login("alice@example.com", "wrong-password").await;
        assert!(matches!(wrong, Err(AuthError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn test_login_rejects_oauth_only_account() {
        let mut users = MockUserRepository::new();
        users.expect_find_by_email().returning(|_| {
            Ok(Some(User {
                auth_provider: AuthProvider::Google,
                password_hash: None,
                ..User::default()
            }))
        });

        let svc = service(users, MockRefreshTokenRepository::new());
        let result = svc.login("g@example.com", "whatever").await;
        assert!(matches!(result, Err(AuthError::InvalidCredentials)));
    }

    // ==========================================================================
    // Refresh Tests
    // ==========================================================================

    #[tokio::test]
    async fn test_refresh_rotates_token() {
        let user_id = Uuid::now_v7();
        let old = RefreshToken::new(user_id, hash_refresh_token("old-token"), Duration::days(7));
        let old_id = old.id;

        let mut tokens = MockRefreshTokenRepository::new();
        tokens
            .expect_find_by_hash()
            .with(eq(hash_refresh_token("old-token")))
            .returning(move |_| Ok(Some(old.clone())));
        tokens
            .expect_rotate()
            .withf(move |id, replacement| *id == old_id && replacement.user_id == user_id)
            .times(1)
            .returning(|_, replacement| Ok(replacement.clone()));

        let svc = service(MockUserRepository::new(), tokens);
        let pair = svc.refresh("old-token").await.unwrap();
        assert_ne!(pair.refresh_token, "old-token");
        assert_eq!(svc.validate_token(&pair.access_token).unwrap(), user_id);
    }

    #[tokio::test]
    async fn test_reused_refresh_token_fails() {
        let mut tokens = MockRefreshTokenRepository::new();
        tokens.expect_find_by_hash().returning(|_| Ok(None));

        let svc = service(MockUserRepository::new(), tokens);
        let result = svc.refresh("rotated-away").await;
        assert!(matches!(result, Err(AuthError::InvalidRefreshToken)));
    }

    #[tokio::test]
    async fn test_refresh_race_maps_to_invalid_token() {
        let stored = RefreshToken::new(Uuid::now_v7(), hash_refresh_token("t"), Duration::days(1));
        let mut tokens = MockRefreshTokenRepository::new();
        tokens
            .expect_find_by_hash()
            .returning(move |_| Ok(Some(stored.clone())));
        tokens
            .expect_rotate()
            .returning(|_, _| Err(AppError::Unauthorized("consumed".into())));

        let svc = service(MockUserRepository::new(), tokens);
        assert!(matches!(svc.refresh("t").await, Err(AuthError::InvalidRefreshToken)));
    }

    #[tokio::test]
    async fn test_logout_unknown_token_is_ok() {
        let mut tokens = MockRefreshTokenRepository::new();
        tokens.expect_revoke_by_hash().returning(|_| Ok(false));

        let svc = service(MockUserRepository::new(), tokens);
        assert!(svc.logout("unknown").await.is_ok());
    }

    // ==========================================================================
    // OAuth Tests
    // ==========================================================================

    fn assertion(sub: &str, email: &str) -> String {
        let claims = OAuthAssertion {
            sub: sub.into(),
            email: email.into(),
            name: Some("Gina".into()),
            picture: None,
            email_verified: true,
            exp: (Utc::now() + Duration::minutes(5)).timestamp(),
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(ASSERTION_SECRET.as_bytes()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_oauth_links_existing_email() {
        let existing = User::new_local("gina".into(), "gina@example.com".into(), "hash".into());
        let existing_id = existing.id;

        let mut users = MockUserRepository::new();
        users.expect_find_by_provider().returning(|_, _| Ok(None));
        let found = existing.clone();
        users
            .expect_find_by_email()
            .with(eq("gina@example.com"))
            .returning(move |_| Ok(Some(found.clone())));
        users
            .expect_link_provider()
            .withf(move |id, provider, provider_id, verified| {
                *id == existing_id && *provider == AuthProvider::Google && provider_id == "g-123" && *verified
            })
            .times(1)
            .returning(move |_, _, _, _| Ok(existing.clone()));
        users.expect_touch_last_seen().returning(|_, _| Ok(()));

        let mut tokens = MockRefreshTokenRepository::new();
        accept_token_create(&mut tokens);

        let svc = service(users, tokens);
        let (user, _) = svc
            .oauth_login(AuthProvider::Google, &assertion("g-123", "Gina@Example.com"))
            .await
            .unwrap();
        assert_eq!(user.id, existing_id);
    }

    #[tokio::test]
    async fn test_oauth_creates_account() {
        let mut users = MockUserRepository::new();
        users.expect_find_by_provider().returning(|_, _| Ok(None));
        users.expect_find_by_email().returning(|_| Ok(None));
        users.expect_username_exists().returning(|_| Ok(false));
        users
            .expect_create()
            .withf(|user| {
                user.username == "newcomer"
                    && user.auth_provider == AuthProvider::Facebook
                    && user.password_hash.is_none()
            })
            .returning(|user| Ok(user.clone()));
        users.expect_touch_last_seen().returning(|_, _| Ok(()));

        let mut tokens = MockRefreshTokenRepository::new();
        accept_token_create(&mut tokens);

        let svc = service(users, tokens);
        let (user, _) = svc
            .oauth_login(AuthProvider::Facebook, &assertion("fb-9", "newcomer@example.com"))
            .await
            .unwrap();
        assert_eq!(user.provider_id.as_deref(), Some("fb-9"));
        assert!(user.email_verified);
    }

    #[tokio::test]
    async fn test_oauth_rejects_bad_signature() {
        let svc = service(MockUserRepository::new(), MockRefreshTokenRepository::new());
        let forged = encode(
            &Header::new(Algorithm::HS256),
            &serde_json::json!({ "sub": "x", "email": "x@example.com", "exp": Utc::now().timestamp() + 60 }),
            &EncodingKey::from_secret(b"not-the-assertion-secret-at-all-32+"),
        )
        .unwrap();

        let result = svc.oauth_login(AuthProvider::Google, &forged).await;
        assert!(matches!(result, Err(AuthError::InvalidAssertion)));

        let local = svc.oauth_login(AuthProvider::Local, &forged).await;
        assert!(matches!(local, Err(AuthError::UnsupportedProvider(_))));
    }
}
