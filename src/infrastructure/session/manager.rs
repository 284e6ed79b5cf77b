//! Session manager - registration, login and token lifecycle

use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::domain::revocation::RevocationStore;
use crate::domain::token::{NewRefreshToken, RefreshToken, RefreshTokenRepository, TokenKind};
use crate::domain::user::{
    validate_email, validate_username, NewUser, Role, User, UserId, UserRepository,
    UserValidationError,
};
use crate::domain::{Clock, DomainError};
use crate::infrastructure::auth::TokenCodec;
use crate::infrastructure::user::PasswordHasher;

use super::error::{AuthError, RefreshRejection};
use super::types::{
    AuthenticatedSession, HealthReport, LoginRequest, PurgeReport, RegisterRequest,
    SessionConfig, TokenPair,
};

const TOKEN_TYPE: &str = "Bearer";

/// Orchestrates the credential store, refresh token ledger, revocation
/// store, password hasher and token codec.
///
/// Holds no per-session state; every call reads the clock once and uses
/// that instant for all of its checks and writes.
#[derive(Clone)]
pub struct SessionManager {
    users: Arc<dyn UserRepository>,
    refresh_tokens: Arc<dyn RefreshTokenRepository>,
    revocation: Arc<dyn RevocationStore>,
    hasher: Arc<dyn PasswordHasher>,
    codec: Arc<dyn TokenCodec>,
    clock: Arc<dyn Clock>,
    config: SessionConfig,
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("users", &self.users)
            .field("refresh_tokens", &self.refresh_tokens)
            .field("revocation", &"<RevocationStore>")
            .field("hasher", &self.hasher)
            .field("codec", &self.codec)
            .field("config", &self.config)
            .finish()
    }
}

impl SessionManager {
    pub fn new(
        users: Arc<dyn UserRepository>,
        refresh_tokens: Arc<dyn RefreshTokenRepository>,
        revocation: Arc<dyn RevocationStore>,
        hasher: Arc<dyn PasswordHasher>,
        codec: Arc<dyn TokenCodec>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            users,
            refresh_tokens,
            revocation,
            hasher,
            codec,
            clock,
            config: SessionConfig::default(),
        }
    }

    /// Sets the login rate limiting policy
    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Create an account and open its first session
    pub async fn register(
        &self,
        request: RegisterRequest,
    ) -> Result<AuthenticatedSession, AuthError> {
        let email = request.email.trim();
        let username = request.username.trim();

        validate_email(email)?;
        validate_username(username)?;
        self.hasher
            .validate_strength(&request.password)
            .map_err(UserValidationError::from)?;

        if self.users.email_exists(email).await? {
            debug!("Registration rejected: email already registered");
            return Err(AuthError::DuplicateEmail);
        }
        if self.users.username_exists(username).await? {
            debug!("Registration rejected: username={} already taken", username);
            return Err(AuthError::DuplicateUsername);
        }

        let password_hash = self.hash_password(&request.password).await?;
        let now = self.clock.now();

        let user = match self
            .users
            .create(NewUser {
                email: email.to_string(),
                username: username.to_string(),
                password_hash,
                role: Role::User,
                created_at: now,
            })
            .await
        {
            Ok(user) => user,
            // Lost a race with a concurrent registration
            Err(e) if e.is_conflict() => return Err(self.duplicate_identity(email).await?),
            Err(e) => return Err(e.into()),
        };

        let tokens = match self.issue_token_pair(&user, now, None, None).await {
            Ok(tokens) => tokens,
            Err(e) => {
                self.discard_registration(user.id(), now).await;
                return Err(e);
            }
        };

        info!("Registered user id={} username={}", user.id(), user.username());
        Ok(AuthenticatedSession { user, tokens })
    }

    /// Authenticate by email or username and open a new session
    ///
    /// Other sessions of the same user stay valid.
    pub async fn login(&self, request: LoginRequest) -> Result<AuthenticatedSession, AuthError> {
        let identifier = request.identifier.trim();

        if self.revocation.get_attempts(identifier).await? >= self.config.max_login_attempts {
            warn!("Login rate limited for identifier={}", identifier);
            return Err(AuthError::TooManyAttempts {
                retry_after: self.config.attempt_window,
            });
        }

        let Some(mut user) = self.users.find_by_email_or_username(identifier).await? else {
            let attempts = self.revocation.increment_attempts(identifier).await?;
            debug!(
                "Login failed: unknown identifier={} attempts={}",
                identifier, attempts
            );
            return Err(AuthError::InvalidCredentials);
        };

        if !user.is_active() {
            warn!("Login rejected for inactive user id={}", user.id());
            return Err(AuthError::AccountInactive);
        }

        if !self.verify_password(user.password_hash(), &request.password).await? {
            let attempts = self.revocation.increment_attempts(identifier).await?;
            debug!(
                "Login failed: wrong password for user id={} attempts={}",
                user.id(),
                attempts
            );
            if attempts >= self.config.max_login_attempts {
                warn!("Login attempt limit reached for identifier={}", identifier);
            }
            return Err(AuthError::InvalidCredentials);
        }

        // The ledger row is written first; later failures undo earlier steps
        let now = self.clock.now();
        let tokens = self
            .issue_token_pair(&user, now, request.ip_address, request.user_agent)
            .await?;

        let previous = user.clone();
        user.record_login(now);
        let user = match self.users.update(&user).await {
            Ok(user) => user,
            Err(e) => {
                self.discard_session(&tokens.refresh_token, now).await;
                return Err(e.into());
            }
        };

        if let Err(e) = self.revocation.reset_attempts(identifier).await {
            self.discard_session(&tokens.refresh_token, now).await;
            if let Err(restore) = self.users.update(&previous).await {
                warn!(
                    "Failed to restore last login of user id={}: {}",
                    user.id(),
                    restore
                );
            }
            return Err(e.into());
        }

        info!("User logged in id={} username={}", user.id(), user.username());
        Ok(AuthenticatedSession { user, tokens })
    }

    /// Exchange a refresh token for a new access token
    ///
    /// The refresh token itself is left untouched and stays usable.
    pub async fn refresh_access_token(&self, refresh_token: &str) -> Result<String, AuthError> {
        let now = self.clock.now();
        let (_, user) = self.usable_refresh_token(refresh_token, now).await?;

        let access_token = self
            .codec
            .issue_access_token(&user, now)
            .map_err(AuthError::signing)?;

        debug!("Issued access token for user id={}", user.id());
        Ok(access_token)
    }

    /// Exchange a refresh token for a new pair, revoking the presented one
    ///
    /// Presenting a token that was already revoked revokes every session of
    /// its owner, since only a copy of a rotated token can be replayed.
    pub async fn rotate_refresh_token(
        &self,
        refresh_token: &str,
        ip_address: Option<IpAddr>,
        user_agent: Option<String>,
    ) -> Result<TokenPair, AuthError> {
        let now = self.clock.now();

        let (record, user) = match self.usable_refresh_token(refresh_token, now).await {
            Ok(found) => found,
            Err(AuthError::InvalidRefreshToken {
                reason: RefreshRejection::Revoked,
            }) => {
                self.revoke_on_reuse(refresh_token, now).await?;
                return Err(AuthError::invalid_refresh(RefreshRejection::Revoked));
            }
            Err(e) => return Err(e),
        };

        if !self.refresh_tokens.revoke(&record.token, now).await? {
            // A concurrent rotation or logout got there first
            debug!("Refresh token of user id={} revoked concurrently", user.id());
            return Err(AuthError::invalid_refresh(RefreshRejection::Revoked));
        }

        let tokens = self
            .issue_token_pair(&user, now, ip_address, user_agent)
            .await?;

        info!("Rotated refresh token for user id={}", user.id());
        Ok(tokens)
    }

    /// End one session
    ///
    /// Always succeeds for unknown or already revoked refresh tokens. A
    /// still-valid access token is blacklisted for the rest of its life.
    pub async fn logout(&self, refresh_token: &str, access_token: &str) -> Result<(), AuthError> {
        let now = self.clock.now();

        let revoked = self.refresh_tokens.revoke(refresh_token, now).await?;

        if let Some(remaining) = self
            .codec
            .remaining_validity(access_token, now)
            .and_then(|remaining| remaining.to_std().ok())
        {
            self.revocation.blacklist(access_token, remaining).await?;
        }

        info!(
            "Logged out user_hint={} refresh_revoked={}",
            self.subject_hint(refresh_token),
            revoked
        );
        Ok(())
    }

    /// Revoke every refresh token of a user; returns how many were active
    ///
    /// Access tokens already handed out stay valid until they expire.
    pub async fn logout_all(&self, user_id: UserId) -> Result<u64, AuthError> {
        let revoked = self
            .refresh_tokens
            .revoke_all_for_user(user_id, self.clock.now())
            .await?;

        info!("Revoked all sessions for user id={} count={}", user_id, revoked);
        Ok(revoked)
    }

    /// Replace a password and end every session of the user
    pub async fn change_password(
        &self,
        user_id: UserId,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        let mut user = self.find_user(user_id).await?;

        if !self.verify_password(user.password_hash(), current_password).await? {
            warn!("Password change rejected for user id={}", user_id);
            return Err(AuthError::InvalidCurrentPassword);
        }

        self.hasher
            .validate_strength(new_password)
            .map_err(UserValidationError::from)?;

        let password_hash = self.hash_password(new_password).await?;
        let now = self.clock.now();

        user.set_password_hash(password_hash, now);
        self.users.update(&user).await?;

        let revoked = self.refresh_tokens.revoke_all_for_user(user_id, now).await?;

        info!(
            "Password changed for user id={} sessions_revoked={}",
            user_id, revoked
        );
        Ok(())
    }

    /// Resolve an access token to its current user
    ///
    /// The user is re-read on every call so that deactivation and deletion
    /// apply from the next request on.
    pub async fn validate_token(&self, access_token: &str) -> Result<User, AuthError> {
        if self.revocation.is_blacklisted(access_token).await? {
            warn!(
                "Blacklisted access token presented user_hint={}",
                self.subject_hint(access_token)
            );
            return Err(AuthError::TokenRevoked);
        }

        let now = self.clock.now();
        let claims = self
            .codec
            .verify(access_token, TokenKind::Access, now)
            .map_err(|source| {
                debug!(
                    "Access token rejected user_hint={} reason={}",
                    self.subject_hint(access_token),
                    source
                );
                AuthError::InvalidToken { source }
            })?;

        let user = self.token_subject(claims.user_id()).await?;

        if !user.is_active() {
            debug!("Access token of inactive user id={} rejected", user.id());
            return Err(AuthError::AccountInactive);
        }

        Ok(user)
    }

    /// Resolve an access token and require the user to hold `role`
    ///
    /// The role is read from the stored user, not the token, so a role
    /// change applies from the next request on.
    pub async fn authorize(&self, access_token: &str, role: Role) -> Result<User, AuthError> {
        let user = self.validate_token(access_token).await?;

        if user.role() != role {
            warn!(
                "Access denied for user id={} role={} required={}",
                user.id(),
                user.role(),
                role
            );
            return Err(AuthError::InsufficientRole { required: role });
        }

        Ok(user)
    }

    /// Probe every backing store
    ///
    /// A store that errors counts as unhealthy; the error is logged.
    pub async fn health_check(&self) -> HealthReport {
        let report = HealthReport {
            credential_store: healthy("credential store", self.users.health_check().await),
            token_ledger: healthy("token ledger", self.refresh_tokens.health_check().await),
            revocation_store: healthy(
                "revocation store",
                self.revocation.health_check().await,
            ),
        };

        debug!("Health check {:?}", report);
        report
    }

    /// Active refresh tokens of a user, newest first
    pub async fn active_sessions(&self, user_id: UserId) -> Result<Vec<RefreshToken>, AuthError> {
        Ok(self
            .refresh_tokens
            .find_active_by_user(user_id, self.clock.now())
            .await?)
    }

    /// Delete expired ledger rows and rows revoked longer ago than
    /// `revoked_older_than`
    pub async fn purge_tokens(
        &self,
        revoked_older_than: chrono::Duration,
    ) -> Result<PurgeReport, AuthError> {
        let now = self.clock.now();

        let report = PurgeReport {
            expired: self.refresh_tokens.purge_expired(now).await?,
            revoked: self
                .refresh_tokens
                .purge_revoked_older_than(revoked_older_than, now)
                .await?,
        };

        info!(
            "Purged refresh tokens expired={} revoked={}",
            report.expired, report.revoked
        );
        Ok(report)
    }

    /// Block a user from logging in and end their sessions
    pub async fn deactivate_user(&self, user_id: UserId) -> Result<User, AuthError> {
        let mut user = self.find_user(user_id).await?;
        let now = self.clock.now();

        user.deactivate(now);
        let user = self.users.update(&user).await?;
        let revoked = self.refresh_tokens.revoke_all_for_user(user_id, now).await?;

        info!("Deactivated user id={} sessions_revoked={}", user_id, revoked);
        Ok(user)
    }

    /// Soft-delete a user and end their sessions
    pub async fn delete_user(&self, user_id: UserId) -> Result<(), AuthError> {
        let now = self.clock.now();

        if !self.users.soft_delete(user_id, now).await? {
            return Err(AuthError::UserNotFound);
        }
        let revoked = self.refresh_tokens.revoke_all_for_user(user_id, now).await?;

        info!("Deleted user id={} sessions_revoked={}", user_id, revoked);
        Ok(())
    }

    /// Checks shared by refresh and rotation: signature and kind, ledger
    /// state, then the owner's current state
    async fn usable_refresh_token(
        &self,
        refresh_token: &str,
        now: DateTime<Utc>,
    ) -> Result<(RefreshToken, User), AuthError> {
        let claims = self
            .codec
            .verify(refresh_token, TokenKind::Refresh, now)
            .map_err(|e| {
                debug!(
                    "Refresh token rejected user_hint={} reason={}",
                    self.subject_hint(refresh_token),
                    e
                );
                AuthError::invalid_refresh(RefreshRejection::Token(e))
            })?;

        let record = match self.refresh_tokens.find_by_token(refresh_token).await {
            Ok(record) => record,
            Err(e) if e.is_not_found() => {
                warn!(
                    "Refresh token missing from ledger user_id={}",
                    claims.user_id()
                );
                return Err(AuthError::invalid_refresh(RefreshRejection::NotFound));
            }
            Err(e) => return Err(e.into()),
        };

        if record.is_revoked {
            debug!("Revoked refresh token presented user_id={}", record.user_id);
            return Err(AuthError::invalid_refresh(RefreshRejection::Revoked));
        }
        if record.is_expired_at(now) {
            debug!("Expired refresh token presented user_id={}", record.user_id);
            return Err(AuthError::invalid_refresh(RefreshRejection::Expired));
        }
        if record.user_id != claims.user_id() {
            warn!(
                "Refresh token subject mismatch claims_user_id={} ledger_user_id={}",
                claims.user_id(),
                record.user_id
            );
            return Err(AuthError::invalid_refresh(RefreshRejection::NotFound));
        }

        let user = self.token_subject(record.user_id).await?;
        if !user.is_active() {
            debug!("Refresh rejected for inactive user id={}", user.id());
            return Err(AuthError::AccountInactive);
        }

        Ok((record, user))
    }

    async fn revoke_on_reuse(
        &self,
        refresh_token: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        let record = self.refresh_tokens.find_by_token(refresh_token).await?;
        let revoked = self
            .refresh_tokens
            .revoke_all_for_user(record.user_id, now)
            .await?;

        warn!(
            "Revoked refresh token reused user_id={} sessions_revoked={}",
            record.user_id, revoked
        );
        Ok(())
    }

    async fn issue_token_pair(
        &self,
        user: &User,
        now: DateTime<Utc>,
        ip_address: Option<IpAddr>,
        user_agent: Option<String>,
    ) -> Result<TokenPair, AuthError> {
        let access_token = self
            .codec
            .issue_access_token(user, now)
            .map_err(AuthError::signing)?;
        let (refresh_token, refresh_expires_at) = self
            .codec
            .issue_refresh_token(user, now)
            .map_err(AuthError::signing)?;

        self.refresh_tokens
            .store(NewRefreshToken {
                user_id: user.id(),
                token: refresh_token.clone(),
                expires_at: refresh_expires_at,
                ip_address: ip_address.map(|ip| ip.to_string()),
                user_agent,
                created_at: now,
            })
            .await?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            token_type: TOKEN_TYPE.to_string(),
            expires_in: self.codec.access_ttl().num_seconds(),
            refresh_expires_at,
        })
    }

    async fn find_user(&self, user_id: UserId) -> Result<User, AuthError> {
        self.users
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    /// The user a verified token was issued to, which may since be gone
    async fn token_subject(&self, user_id: UserId) -> Result<User, AuthError> {
        self.users.find_by_id(user_id).await?.ok_or_else(|| {
            debug!("Token subject user id={} no longer exists", user_id);
            AuthError::UnknownSubject
        })
    }

    /// Map a store conflict back to the identity that collided
    async fn duplicate_identity(&self, email: &str) -> Result<AuthError, AuthError> {
        if self.users.email_exists(email).await? {
            Ok(AuthError::DuplicateEmail)
        } else {
            Ok(AuthError::DuplicateUsername)
        }
    }

    async fn discard_registration(&self, user_id: UserId, now: DateTime<Utc>) {
        if let Err(e) = self.users.soft_delete(user_id, now).await {
            warn!(
                "Failed to roll back registration of user id={}: {}",
                user_id, e
            );
        }
    }

    async fn discard_session(&self, refresh_token: &str, now: DateTime<Utc>) {
        if let Err(e) = self.refresh_tokens.revoke(refresh_token, now).await {
            warn!("Failed to revoke refresh token of an aborted login: {}", e);
        }
    }

    async fn hash_password(&self, password: &str) -> Result<String, AuthError> {
        let hasher = Arc::clone(&self.hasher);
        let password = password.to_string();

        let hash = tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| DomainError::internal(format!("Password hashing task failed: {}", e)))??;

        Ok(hash)
    }

    async fn verify_password(&self, hash: &str, password: &str) -> Result<bool, AuthError> {
        let hasher = Arc::clone(&self.hasher);
        let hash = hash.to_string();
        let password = password.to_string();

        let verified = tokio::task::spawn_blocking(move || hasher.verify(&hash, &password))
            .await
            .map_err(|e| {
                DomainError::internal(format!("Password verification task failed: {}", e))
            })?;

        Ok(verified)
    }

    fn subject_hint(&self, token: &str) -> String {
        self.codec
            .extract_unverified_subject(token)
            .map(|id| id.to_string())
            .unwrap_or_else(|_| "unknown".to_string())
    }
}

fn healthy(component: &str, result: Result<bool, DomainError>) -> bool {
    match result {
        Ok(healthy) => healthy,
        Err(e) => {
            warn!("Health check of {} failed: {}", component, e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::TimeZone;

    use super::*;
    use crate::domain::cache::Cache;
    use crate::domain::revocation::MockRevocationStore;
    use crate::domain::ManualClock;
    use crate::infrastructure::auth::{JwtConfig, JwtService, TokenError};
    use crate::infrastructure::cache::InMemoryCache;
    use crate::infrastructure::revocation::CacheRevocationStore;
    use crate::infrastructure::session::ErrorCategory;
    use crate::infrastructure::token::InMemoryRefreshTokenRepository;
    use crate::infrastructure::user::{Argon2Hasher, HashingParams, InMemoryUserRepository};

    const SECRET: &str = "0123456789abcdef0123456789abcdef";
    const PASSWORD: &str = "Str0ng!Pass";

    struct Harness {
        manager: SessionManager,
        clock: Arc<ManualClock>,
        users: Arc<InMemoryUserRepository>,
        refresh_tokens: Arc<InMemoryRefreshTokenRepository>,
        codec: Arc<JwtService>,
    }

    fn cheap_hasher() -> Arc<Argon2Hasher> {
        Arc::new(
            Argon2Hasher::with_params(HashingParams {
                memory_kib: 1024,
                iterations: 1,
                parallelism: 1,
            })
            .unwrap(),
        )
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
    }

    fn harness_with(
        revocation: impl FnOnce(Arc<ManualClock>) -> Arc<dyn RevocationStore>,
    ) -> Harness {
        let clock = Arc::new(ManualClock::at(start()));
        let users = Arc::new(InMemoryUserRepository::new());
        let refresh_tokens = Arc::new(InMemoryRefreshTokenRepository::new());
        let codec = Arc::new(JwtService::new(JwtConfig::new(SECRET)).unwrap());

        let manager = SessionManager::new(
            users.clone(),
            refresh_tokens.clone(),
            revocation(clock.clone()),
            cheap_hasher(),
            codec.clone(),
            clock.clone(),
        );

        Harness {
            manager,
            clock,
            users,
            refresh_tokens,
            codec,
        }
    }

    fn harness() -> Harness {
        harness_with(|clock| {
            let cache: Arc<dyn Cache> = Arc::new(InMemoryCache::with_clock(clock));
            Arc::new(CacheRevocationStore::new(cache))
        })
    }

    fn harness_with_mock(store: MockRevocationStore) -> Harness {
        harness_with(|_| Arc::new(store))
    }

    async fn register_alice(h: &Harness) -> AuthenticatedSession {
        h.manager
            .register(RegisterRequest::new("alice@example.com", "alice", PASSWORD))
            .await
            .unwrap()
    }

    async fn login(
        h: &Harness,
        identifier: &str,
        password: &str,
    ) -> Result<AuthenticatedSession, AuthError> {
        h.manager.login(LoginRequest::new(identifier, password)).await
    }

    fn refresh_reason(err: AuthError) -> RefreshRejection {
        match err {
            AuthError::InvalidRefreshToken { reason } => reason,
            other => panic!("expected InvalidRefreshToken, got {:?}", other),
        }
    }

    // Registration

    #[tokio::test]
    async fn test_register_returns_user_and_token_pair() {
        let h = harness();

        let session = register_alice(&h).await;

        assert_eq!(session.user.id(), UserId::new(1));
        assert_eq!(session.user.role(), Role::User);
        assert!(session.user.is_active());
        assert_ne!(session.user.password_hash(), PASSWORD);
        assert_eq!(session.tokens.token_type, "Bearer");
        assert_eq!(session.tokens.expires_in, 15 * 60);
        assert_eq!(
            session.tokens.refresh_expires_at,
            start() + chrono::Duration::days(7)
        );

        let claims = h
            .codec
            .verify(&session.tokens.access_token, TokenKind::Access, start())
            .unwrap();
        assert_eq!(claims.user_id(), UserId::new(1));
        assert_eq!(claims.email, "alice@example.com");
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.role, Role::User);

        let record = h
            .refresh_tokens
            .find_by_token(&session.tokens.refresh_token)
            .await
            .unwrap();
        assert_eq!(record.user_id, UserId::new(1));
        assert!(record.ip_address.is_none());
        assert!(record.user_agent.is_none());
    }

    #[tokio::test]
    async fn test_register_duplicate_email() {
        let h = harness();
        register_alice(&h).await;

        let err = h
            .manager
            .register(RegisterRequest::new("Alice@Example.com", "alice2", PASSWORD))
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::DuplicateEmail));
        assert_eq!(err.category(), ErrorCategory::Conflict);
    }

    #[tokio::test]
    async fn test_register_duplicate_username() {
        let h = harness();
        register_alice(&h).await;

        let err = h
            .manager
            .register(RegisterRequest::new("other@example.com", "ALICE", PASSWORD))
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::DuplicateUsername));
    }

    #[tokio::test]
    async fn test_register_validation_reasons_are_distinct() {
        let h = harness();

        let err = h
            .manager
            .register(RegisterRequest::new("not-an-email", "alice", PASSWORD))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AuthError::Validation(UserValidationError::InvalidEmail)
        ));

        let err = h
            .manager
            .register(RegisterRequest::new("alice@example.com", "1alice", PASSWORD))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AuthError::Validation(UserValidationError::InvalidUsernameStart)
        ));

        let err = h
            .manager
            .register(RegisterRequest::new("alice@example.com", "alice", "short1!"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AuthError::Validation(UserValidationError::WeakPassword(_))
        ));
        assert_eq!(err.category(), ErrorCategory::Validation);

        assert!(!h.users.email_exists("alice@example.com").await.unwrap());
    }

    #[tokio::test]
    async fn test_register_after_delete_reuses_identity() {
        let h = harness();
        let first = register_alice(&h).await;

        h.manager.delete_user(first.user.id()).await.unwrap();
        let second = register_alice(&h).await;

        assert_ne!(first.user.id(), second.user.id());
    }

    // Login

    #[tokio::test]
    async fn test_login_with_email_or_username() {
        let h = harness();
        register_alice(&h).await;

        let by_username = login(&h, "alice", PASSWORD).await.unwrap();
        let by_email = login(&h, "ALICE@example.com", PASSWORD).await.unwrap();

        assert_eq!(by_username.user.id(), by_email.user.id());
        assert_eq!(by_email.user.last_login_at(), Some(start()));
    }

    #[tokio::test]
    async fn test_login_records_client_on_ledger_row() {
        let h = harness();
        register_alice(&h).await;

        let request = LoginRequest::new("alice", PASSWORD)
            .with_client(IpAddr::from([10, 0, 0, 1]), "curl/8.0");
        let session = h.manager.login(request).await.unwrap();

        let record = h
            .refresh_tokens
            .find_by_token(&session.tokens.refresh_token)
            .await
            .unwrap();
        assert_eq!(record.ip_address.as_deref(), Some("10.0.0.1"));
        assert_eq!(record.user_agent.as_deref(), Some("curl/8.0"));
    }

    #[tokio::test]
    async fn test_login_keeps_other_sessions() {
        let h = harness();
        let registered = register_alice(&h).await;

        login(&h, "alice", PASSWORD).await.unwrap();

        assert!(h
            .manager
            .refresh_access_token(&registered.tokens.refresh_token)
            .await
            .is_ok());
        assert_eq!(
            h.manager.active_sessions(registered.user.id()).await.unwrap().len(),
            2
        );
    }

    #[tokio::test]
    async fn test_login_failures_are_indistinguishable() {
        let h = harness();
        register_alice(&h).await;

        let wrong_password = login(&h, "alice", "Wr0ng!Pass").await.unwrap_err();
        let unknown_user = login(&h, "bob", PASSWORD).await.unwrap_err();

        assert!(matches!(wrong_password, AuthError::InvalidCredentials));
        assert!(matches!(unknown_user, AuthError::InvalidCredentials));
        assert_eq!(wrong_password.to_string(), unknown_user.to_string());
        assert_eq!(wrong_password.category(), ErrorCategory::Unauthorized);
    }

    #[tokio::test]
    async fn test_login_rate_limit_and_window_expiry() {
        let h = harness();
        register_alice(&h).await;

        for _ in 0..5 {
            let err = login(&h, "alice", "Wr0ng!Pass").await.unwrap_err();
            assert!(matches!(err, AuthError::InvalidCredentials));
        }

        let err = login(&h, "alice", PASSWORD).await.unwrap_err();
        match &err {
            AuthError::TooManyAttempts { retry_after } => {
                assert_eq!(*retry_after, Duration::from_secs(15 * 60));
            }
            other => panic!("expected TooManyAttempts, got {:?}", other),
        }
        assert_eq!(err.category(), ErrorCategory::RateLimited);
        assert!(err.to_string().contains("15 minutes"));

        h.clock.advance(chrono::Duration::minutes(15));
        assert!(login(&h, "alice", PASSWORD).await.is_ok());
    }

    #[tokio::test]
    async fn test_login_rate_limit_counts_unknown_identifiers() {
        let h = harness();

        for _ in 0..5 {
            login(&h, "ghost", PASSWORD).await.unwrap_err();
        }

        let err = login(&h, "  GHOST ", PASSWORD).await.unwrap_err();
        assert!(matches!(err, AuthError::TooManyAttempts { .. }));
    }

    #[tokio::test]
    async fn test_successful_login_resets_attempts() {
        let h = harness();
        register_alice(&h).await;

        for _ in 0..4 {
            login(&h, "alice", "Wr0ng!Pass").await.unwrap_err();
        }
        login(&h, "alice", PASSWORD).await.unwrap();

        for _ in 0..4 {
            login(&h, "alice", "Wr0ng!Pass").await.unwrap_err();
        }
        assert!(login(&h, "alice", PASSWORD).await.is_ok());
    }

    #[tokio::test]
    async fn test_inactive_login_does_not_count_attempt() {
        let mut store = MockRevocationStore::new();
        store.expect_get_attempts().returning(|_| Ok(0));
        store.expect_increment_attempts().never();
        store.expect_reset_attempts().never();

        let h = harness_with_mock(store);
        let session = register_alice(&h).await;
        h.manager.deactivate_user(session.user.id()).await.unwrap();

        let err = login(&h, "alice", PASSWORD).await.unwrap_err();
        assert!(matches!(err, AuthError::AccountInactive));
        assert_eq!(err.category(), ErrorCategory::Unauthorized);
    }

    #[tokio::test]
    async fn test_rate_limited_login_skips_everything_else() {
        let mut store = MockRevocationStore::new();
        store.expect_get_attempts().returning(|_| Ok(5));
        store.expect_increment_attempts().never();
        store.expect_reset_attempts().never();

        let h = harness_with_mock(store);
        register_alice(&h).await;

        let err = login(&h, "alice", PASSWORD).await.unwrap_err();
        assert!(matches!(err, AuthError::TooManyAttempts { .. }));
        assert!(h
            .users
            .find_by_username("alice")
            .await
            .unwrap()
            .unwrap()
            .last_login_at()
            .is_none());
    }

    #[tokio::test]
    async fn test_login_cache_failure_is_infrastructure() {
        let mut store = MockRevocationStore::new();
        store
            .expect_get_attempts()
            .returning(|_| Err(DomainError::cache("connection refused")));

        let h = harness_with_mock(store);
        register_alice(&h).await;

        let err = login(&h, "alice", PASSWORD).await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Infrastructure);
    }

    #[tokio::test]
    async fn test_concurrent_logins_all_succeed() {
        let h = harness();
        let registered = register_alice(&h).await;
        let manager = Arc::new(h.manager.clone());

        let mut handles = Vec::new();
        for _ in 0..5 {
            let manager = manager.clone();
            handles.push(tokio::spawn(async move {
                manager.login(LoginRequest::new("alice", PASSWORD)).await
            }));
        }

        let mut refresh_tokens = Vec::new();
        for handle in handles {
            refresh_tokens.push(handle.await.unwrap().unwrap().tokens.refresh_token);
        }
        refresh_tokens.sort();
        refresh_tokens.dedup();

        assert_eq!(refresh_tokens.len(), 5);
        assert_eq!(
            h.manager.active_sessions(registered.user.id()).await.unwrap().len(),
            6
        );
    }

    // Refresh

    #[tokio::test]
    async fn test_refresh_issues_new_access_token() {
        let h = harness();
        let session = register_alice(&h).await;

        h.clock.advance(chrono::Duration::minutes(20));
        let access_token = h
            .manager
            .refresh_access_token(&session.tokens.refresh_token)
            .await
            .unwrap();

        let user = h.manager.validate_token(&access_token).await.unwrap();
        assert_eq!(user.id(), session.user.id());

        // Not rotated; the same refresh token works again
        assert!(h
            .manager
            .refresh_access_token(&session.tokens.refresh_token)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_refresh_rejects_access_token() {
        let h = harness();
        let session = register_alice(&h).await;

        let err = h
            .manager
            .refresh_access_token(&session.tokens.access_token)
            .await
            .unwrap_err();

        assert!(matches!(
            refresh_reason(err),
            RefreshRejection::Token(TokenError::WrongTokenKind { .. })
        ));
    }

    #[tokio::test]
    async fn test_refresh_rejects_token_missing_from_ledger() {
        let h = harness();
        let session = register_alice(&h).await;

        let (unrecorded, _) = h.codec.issue_refresh_token(&session.user, start()).unwrap();
        let err = h.manager.refresh_access_token(&unrecorded).await.unwrap_err();

        assert_eq!(refresh_reason(err), RefreshRejection::NotFound);
    }

    #[tokio::test]
    async fn test_refresh_honours_ledger_expiry() {
        let h = harness();
        let session = register_alice(&h).await;

        let (token, _) = h.codec.issue_refresh_token(&session.user, start()).unwrap();
        h.refresh_tokens
            .store(NewRefreshToken {
                user_id: session.user.id(),
                token: token.clone(),
                expires_at: start() + chrono::Duration::minutes(1),
                ip_address: None,
                user_agent: None,
                created_at: start(),
            })
            .await
            .unwrap();

        h.clock.advance(chrono::Duration::minutes(2));
        let err = h.manager.refresh_access_token(&token).await.unwrap_err();

        assert_eq!(refresh_reason(err), RefreshRejection::Expired);
    }

    #[tokio::test]
    async fn test_refresh_rejects_expired_token() {
        let h = harness();
        let session = register_alice(&h).await;

        h.clock.advance(chrono::Duration::days(8));
        let err = h
            .manager
            .refresh_access_token(&session.tokens.refresh_token)
            .await
            .unwrap_err();

        assert_eq!(refresh_reason(err), RefreshRejection::Token(TokenError::Expired));
    }

    #[tokio::test]
    async fn test_refresh_rejects_inactive_user() {
        let h = harness();
        let session = register_alice(&h).await;

        let mut user = session.user.clone();
        user.deactivate(start());
        h.users.update(&user).await.unwrap();

        let err = h
            .manager
            .refresh_access_token(&session.tokens.refresh_token)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::AccountInactive));
    }

    // Logout

    #[tokio::test]
    async fn test_logout_revokes_refresh_token() {
        let h = harness();
        register_alice(&h).await;
        let session = login(&h, "alice", PASSWORD).await.unwrap();

        h.manager
            .logout(&session.tokens.refresh_token, &session.tokens.access_token)
            .await
            .unwrap();

        let err = h
            .manager
            .refresh_access_token(&session.tokens.refresh_token)
            .await
            .unwrap_err();
        assert_eq!(refresh_reason(err), RefreshRejection::Revoked);
    }

    #[tokio::test]
    async fn test_logout_twice_succeeds() {
        let h = harness();
        let session = register_alice(&h).await;

        for _ in 0..2 {
            h.manager
                .logout(&session.tokens.refresh_token, &session.tokens.access_token)
                .await
                .unwrap();
        }

        h.manager.logout("unknown", "garbage").await.unwrap();
    }

    #[tokio::test]
    async fn test_logout_blacklists_access_token() {
        let h = harness();
        let session = register_alice(&h).await;

        assert!(h.manager.validate_token(&session.tokens.access_token).await.is_ok());

        h.manager
            .logout(&session.tokens.refresh_token, &session.tokens.access_token)
            .await
            .unwrap();

        let err = h
            .manager
            .validate_token(&session.tokens.access_token)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::TokenRevoked));
        assert_eq!(err.category(), ErrorCategory::Unauthorized);
    }

    #[tokio::test]
    async fn test_logout_blacklists_for_remaining_validity() {
        let mut store = MockRevocationStore::new();
        store
            .expect_blacklist()
            .withf(|_, ttl| *ttl == Duration::from_secs(10 * 60))
            .times(1)
            .returning(|_, _| Ok(()));

        let h = harness_with_mock(store);
        let session = register_alice(&h).await;

        h.clock.advance(chrono::Duration::minutes(5));
        h.manager
            .logout(&session.tokens.refresh_token, &session.tokens.access_token)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_logout_skips_blacklist_for_expired_access_token() {
        let mut store = MockRevocationStore::new();
        store.expect_blacklist().never();

        let h = harness_with_mock(store);
        let session = register_alice(&h).await;

        h.clock.advance(chrono::Duration::minutes(16));
        h.manager
            .logout(&session.tokens.refresh_token, &session.tokens.access_token)
            .await
            .unwrap();

        let record = h
            .refresh_tokens
            .find_by_token(&session.tokens.refresh_token)
            .await
            .unwrap();
        assert!(record.is_revoked);
    }

    #[tokio::test]
    async fn test_logout_all_revokes_every_session() {
        let h = harness();
        let registered = register_alice(&h).await;
        let second = login(&h, "alice", PASSWORD).await.unwrap();

        let revoked = h.manager.logout_all(registered.user.id()).await.unwrap();
        assert_eq!(revoked, 2);

        for token in [&registered.tokens.refresh_token, &second.tokens.refresh_token] {
            assert!(h.manager.refresh_access_token(token).await.is_err());
        }

        // Access tokens are not blacklisted by logout_all
        assert!(h.manager.validate_token(&second.tokens.access_token).await.is_ok());
        assert_eq!(h.manager.logout_all(registered.user.id()).await.unwrap(), 0);
    }

    // Password change

    #[tokio::test]
    async fn test_change_password_revokes_refresh_tokens_only() {
        let h = harness();
        let session = register_alice(&h).await;

        h.manager
            .change_password(session.user.id(), PASSWORD, "N3w!Passw0rd")
            .await
            .unwrap();

        let err = h
            .manager
            .refresh_access_token(&session.tokens.refresh_token)
            .await
            .unwrap_err();
        assert_eq!(refresh_reason(err), RefreshRejection::Revoked);

        // Issued access tokens stay valid until they expire
        assert!(h.manager.validate_token(&session.tokens.access_token).await.is_ok());
        h.clock.advance(chrono::Duration::minutes(15));
        assert!(h.manager.validate_token(&session.tokens.access_token).await.is_err());

        assert!(login(&h, "alice", PASSWORD).await.is_err());
        assert!(login(&h, "alice", "N3w!Passw0rd").await.is_ok());
    }

    #[tokio::test]
    async fn test_change_password_wrong_current() {
        let h = harness();
        let session = register_alice(&h).await;

        let err = h
            .manager
            .change_password(session.user.id(), "Wr0ng!Pass", "N3w!Passw0rd")
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::InvalidCurrentPassword));
        assert!(h
            .manager
            .refresh_access_token(&session.tokens.refresh_token)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_change_password_weak_new_password() {
        let h = harness();
        let session = register_alice(&h).await;

        let err = h
            .manager
            .change_password(session.user.id(), PASSWORD, "weak")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            AuthError::Validation(UserValidationError::WeakPassword(_))
        ));
        assert!(login(&h, "alice", PASSWORD).await.is_ok());
    }

    #[tokio::test]
    async fn test_change_password_unknown_user() {
        let h = harness();

        let err = h
            .manager
            .change_password(UserId::new(99), PASSWORD, "N3w!Passw0rd")
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::UserNotFound));
        assert_eq!(err.category(), ErrorCategory::NotFound);
    }

    // Validation

    #[tokio::test]
    async fn test_validate_token_rejects_expired() {
        let h = harness();
        let session = register_alice(&h).await;

        h.clock.advance(chrono::Duration::minutes(15));
        let err = h
            .manager
            .validate_token(&session.tokens.access_token)
            .await
            .unwrap_err();

        match err {
            AuthError::InvalidToken { source } => assert!(source.is_expired()),
            other => panic!("expected InvalidToken, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_validate_token_rejects_refresh_and_garbage() {
        let h = harness();
        let session = register_alice(&h).await;

        let err = h
            .manager
            .validate_token(&session.tokens.refresh_token)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AuthError::InvalidToken {
                source: TokenError::WrongTokenKind { .. }
            }
        ));

        let err = h.manager.validate_token("not.a.jwt").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken { .. }));
    }

    #[tokio::test]
    async fn test_validate_token_sees_deactivation_and_deletion() {
        let h = harness();
        let session = register_alice(&h).await;

        h.manager.deactivate_user(session.user.id()).await.unwrap();
        let err = h
            .manager
            .validate_token(&session.tokens.access_token)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::AccountInactive));

        h.manager.delete_user(session.user.id()).await.unwrap();
        let err = h
            .manager
            .validate_token(&session.tokens.access_token)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::UnknownSubject));
        assert_eq!(err.category(), ErrorCategory::Unauthorized);
    }

    #[tokio::test]
    async fn test_validate_token_checks_blacklist_first() {
        let mut store = MockRevocationStore::new();
        store.expect_is_blacklisted().returning(|_| Ok(true));

        let h = harness_with_mock(store);

        let err = h.manager.validate_token("not.a.jwt").await.unwrap_err();
        assert!(matches!(err, AuthError::TokenRevoked));
    }

    #[tokio::test]
    async fn test_validate_token_cache_failure_is_infrastructure() {
        let mut store = MockRevocationStore::new();
        store
            .expect_is_blacklisted()
            .returning(|_| Err(DomainError::cache("timeout")));

        let h = harness_with_mock(store);
        let session = register_alice(&h).await;

        let err = h
            .manager
            .validate_token(&session.tokens.access_token)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Infrastructure(_)));
    }

    // Rotation

    #[tokio::test]
    async fn test_rotate_refresh_token() {
        let h = harness();
        let session = register_alice(&h).await;

        let rotated = h
            .manager
            .rotate_refresh_token(&session.tokens.refresh_token, None, None)
            .await
            .unwrap();

        assert_ne!(rotated.refresh_token, session.tokens.refresh_token);
        assert!(h.manager.refresh_access_token(&rotated.refresh_token).await.is_ok());

        let err = h
            .manager
            .refresh_access_token(&session.tokens.refresh_token)
            .await
            .unwrap_err();
        assert_eq!(refresh_reason(err), RefreshRejection::Revoked);
    }

    #[tokio::test]
    async fn test_rotate_reuse_revokes_all_sessions() {
        let h = harness();
        let session = register_alice(&h).await;
        let other = login(&h, "alice", PASSWORD).await.unwrap();

        let rotated = h
            .manager
            .rotate_refresh_token(&session.tokens.refresh_token, None, None)
            .await
            .unwrap();

        let err = h
            .manager
            .rotate_refresh_token(&session.tokens.refresh_token, None, None)
            .await
            .unwrap_err();
        assert_eq!(refresh_reason(err), RefreshRejection::Revoked);

        assert!(h.manager.refresh_access_token(&rotated.refresh_token).await.is_err());
        assert!(h.manager.refresh_access_token(&other.tokens.refresh_token).await.is_err());
        assert!(h
            .manager
            .active_sessions(session.user.id())
            .await
            .unwrap()
            .is_empty());
    }

    // Maintenance

    #[tokio::test]
    async fn test_active_sessions_newest_first() {
        let h = harness();
        let registered = register_alice(&h).await;

        h.clock.advance(chrono::Duration::minutes(1));
        let later = login(&h, "alice", PASSWORD).await.unwrap();

        let sessions = h.manager.active_sessions(registered.user.id()).await.unwrap();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].token, later.tokens.refresh_token);
        assert_eq!(sessions[1].token, registered.tokens.refresh_token);
    }

    #[tokio::test]
    async fn test_purge_tokens() {
        let h = harness();
        let registered = register_alice(&h).await;
        let revoked = login(&h, "alice", PASSWORD).await.unwrap();

        h.manager
            .logout(&revoked.tokens.refresh_token, &revoked.tokens.access_token)
            .await
            .unwrap();

        h.clock.advance(chrono::Duration::days(2));
        let report = h
            .manager
            .purge_tokens(chrono::Duration::days(1))
            .await
            .unwrap();
        assert_eq!(report, PurgeReport { expired: 0, revoked: 1 });

        h.clock.advance(chrono::Duration::days(6));
        let report = h
            .manager
            .purge_tokens(chrono::Duration::days(1))
            .await
            .unwrap();
        assert_eq!(report, PurgeReport { expired: 1, revoked: 0 });

        assert!(h
            .refresh_tokens
            .find_by_token(&registered.tokens.refresh_token)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_delete_unknown_user() {
        let h = harness();

        let err = h.manager.delete_user(UserId::new(42)).await.unwrap_err();
        assert!(matches!(err, AuthError::UserNotFound));
    }

    #[tokio::test]
    async fn test_debug_omits_store_internals() {
        let h = harness();
        let debug = format!("{:?}", h.manager);

        assert!(debug.contains("SessionManager"));
        assert!(!debug.contains(SECRET));
    }

    /// Ledger whose writes fail the way an oversized column does
    #[derive(Debug, Default)]
    struct RejectingLedger {
        inner: InMemoryRefreshTokenRepository,
    }

    #[async_trait::async_trait]
    impl RefreshTokenRepository for RejectingLedger {
        async fn store(&self, _token: NewRefreshToken) -> Result<RefreshToken, DomainError> {
            Err(DomainError::storage(
                "value too long for type character varying(45)",
            ))
        }

        async fn find_by_token(&self, token: &str) -> Result<RefreshToken, DomainError> {
            self.inner.find_by_token(token).await
        }

        async fn find_active_by_user(
            &self,
            user_id: UserId,
            now: DateTime<Utc>,
        ) -> Result<Vec<RefreshToken>, DomainError> {
            self.inner.find_active_by_user(user_id, now).await
        }

        async fn revoke(&self, token: &str, now: DateTime<Utc>) -> Result<bool, DomainError> {
            self.inner.revoke(token, now).await
        }

        async fn revoke_all_for_user(
            &self,
            user_id: UserId,
            now: DateTime<Utc>,
        ) -> Result<u64, DomainError> {
            self.inner.revoke_all_for_user(user_id, now).await
        }

        async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, DomainError> {
            self.inner.purge_expired(now).await
        }

        async fn purge_revoked_older_than(
            &self,
            older_than: chrono::Duration,
            now: DateTime<Utc>,
        ) -> Result<u64, DomainError> {
            self.inner.purge_revoked_older_than(older_than, now).await
        }

        async fn health_check(&self) -> Result<bool, DomainError> {
            Err(DomainError::storage("connection refused"))
        }
    }

    async fn seed_user(users: &InMemoryUserRepository, username: &str, role: Role) -> User {
        users
            .create(NewUser {
                email: format!("{}@example.com", username),
                username: username.to_string(),
                password_hash: cheap_hasher().hash(PASSWORD).unwrap(),
                role,
                created_at: start(),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_login_ledger_failure_leaves_no_trace() {
        let clock = Arc::new(ManualClock::at(start()));
        let users = Arc::new(InMemoryUserRepository::new());
        let cache: Arc<dyn Cache> = Arc::new(InMemoryCache::with_clock(clock.clone()));
        let revocation = Arc::new(CacheRevocationStore::new(cache));
        let manager = SessionManager::new(
            users.clone(),
            Arc::new(RejectingLedger::default()),
            revocation.clone(),
            cheap_hasher(),
            Arc::new(JwtService::new(JwtConfig::new(SECRET)).unwrap()),
            clock.clone(),
        );

        seed_user(&users, "alice", Role::User).await;
        revocation.increment_attempts("alice").await.unwrap();

        let err = manager
            .login(LoginRequest::new("alice", PASSWORD))
            .await
            .unwrap_err();

        assert_eq!(err.category(), ErrorCategory::Infrastructure);
        assert_eq!(revocation.get_attempts("alice").await.unwrap(), 1);
        let user = users.find_by_username("alice").await.unwrap().unwrap();
        assert!(user.last_login_at().is_none());
    }

    #[tokio::test]
    async fn test_login_reset_failure_undoes_session_and_last_login() {
        let mut store = MockRevocationStore::new();
        store.expect_get_attempts().returning(|_| Ok(0));
        store
            .expect_reset_attempts()
            .returning(|_| Err(DomainError::cache("connection reset")));

        let h = harness_with_mock(store);
        let user = seed_user(&h.users, "alice", Role::User).await;

        let err = login(&h, "alice", PASSWORD).await.unwrap_err();

        assert_eq!(err.category(), ErrorCategory::Infrastructure);
        assert!(h.manager.active_sessions(user.id()).await.unwrap().is_empty());
        let stored = h.users.find_by_id(user.id()).await.unwrap().unwrap();
        assert!(stored.last_login_at().is_none());
    }

    #[tokio::test]
    async fn test_refresh_for_vanished_user_is_unauthorized() {
        let h = harness();
        let session = register_alice(&h).await;

        // Removed behind the manager's back, so the ledger row is still live
        h.users.soft_delete(session.user.id(), start()).await.unwrap();

        let err = h
            .manager
            .refresh_access_token(&session.tokens.refresh_token)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::UnknownSubject));
        assert_eq!(err.category(), ErrorCategory::Unauthorized);
    }

    // Authorization

    #[tokio::test]
    async fn test_authorize_requires_matching_role() {
        let h = harness();
        let session = register_alice(&h).await;

        let user = h
            .manager
            .authorize(&session.tokens.access_token, Role::User)
            .await
            .unwrap();
        assert_eq!(user.id(), session.user.id());

        let err = h
            .manager
            .authorize(&session.tokens.access_token, Role::Admin)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AuthError::InsufficientRole {
                required: Role::Admin
            }
        ));
        assert_eq!(err.category(), ErrorCategory::Forbidden);
    }

    #[tokio::test]
    async fn test_authorize_admin() {
        let h = harness();
        seed_user(&h.users, "root", Role::Admin).await;
        let session = login(&h, "root", PASSWORD).await.unwrap();

        let user = h
            .manager
            .authorize(&session.tokens.access_token, Role::Admin)
            .await
            .unwrap();
        assert_eq!(user.role(), Role::Admin);
    }

    #[tokio::test]
    async fn test_authorize_still_rejects_invalid_tokens() {
        let h = harness();
        let session = register_alice(&h).await;
        h.manager
            .logout(&session.tokens.refresh_token, &session.tokens.access_token)
            .await
            .unwrap();

        let err = h
            .manager
            .authorize(&session.tokens.access_token, Role::User)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::TokenRevoked));

        let err = h.manager.authorize("garbage", Role::User).await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Unauthorized);
    }

    // Health

    #[tokio::test]
    async fn test_health_check_in_memory() {
        let h = harness();

        let report = h.manager.health_check().await;
        assert!(report.is_healthy());
    }

    #[tokio::test]
    async fn test_health_check_reports_failing_store() {
        let mut store = MockRevocationStore::new();
        store
            .expect_health_check()
            .returning(|| Err(DomainError::cache("connection refused")));

        let h = harness_with_mock(store);
        let report = h.manager.health_check().await;

        assert!(report.credential_store);
        assert!(report.token_ledger);
        assert!(!report.revocation_store);
        assert!(!report.is_healthy());
    }
}
