//! JWT token generation and validation

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{
    decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use std::fmt::Debug;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::token::{TokenClaims, TokenKind};
use crate::domain::user::{User, UserId};
use crate::domain::DomainError;

/// Minimum length of the shared signing secret, in bytes
pub const MIN_SECRET_LEN: usize = 32;

/// HMAC algorithms accepted on verification; tokens are always signed HS256
const ACCEPTED_ALGORITHMS: [Algorithm; 3] = [Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];

/// Why a token was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("Token has expired")]
    Expired,

    #[error("Token is not valid yet")]
    NotYetValid,

    #[error("Token signature is invalid")]
    InvalidSignature,

    #[error("Unsupported signing algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Token issuer is not trusted")]
    InvalidIssuer,

    #[error("Expected {expected} token, got {found} token")]
    WrongTokenKind { expected: TokenKind, found: TokenKind },

    #[error("Malformed token: {0}")]
    Malformed(String),

    #[error("Failed to sign token: {0}")]
    Signing(String),
}

impl TokenError {
    pub fn is_expired(&self) -> bool {
        matches!(self, Self::Expired)
    }
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        match e.kind() {
            ErrorKind::InvalidSignature => Self::InvalidSignature,
            ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
                Self::UnsupportedAlgorithm(e.to_string())
            }
            ErrorKind::InvalidIssuer => Self::InvalidIssuer,
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::ImmatureSignature => Self::NotYetValid,
            _ => Self::Malformed(e.to_string()),
        }
    }
}

/// Configuration for JWT service
#[derive(Clone)]
pub struct JwtConfig {
    /// Shared HMAC secret
    pub secret: String,
    /// Value of the `iss` claim, checked on verification
    pub issuer: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"[hidden]")
            .field("issuer", &self.issuer)
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish()
    }
}

impl JwtConfig {
    /// Create a configuration with default issuer and lifetimes
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            issuer: "inkstack-auth".to_string(),
            access_ttl: Duration::minutes(15),
            refresh_ttl: Duration::days(7),
        }
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self
    }

    pub fn with_access_ttl(mut self, ttl: Duration) -> Self {
        self.access_ttl = ttl;
        self
    }

    pub fn with_refresh_ttl(mut self, ttl: Duration) -> Self {
        self.refresh_ttl = ttl;
        self
    }
}

/// Encodes and verifies signed session tokens
pub trait TokenCodec: Send + Sync + Debug {
    /// Sign a short-lived access token for a user
    fn issue_access_token(&self, user: &User, now: DateTime<Utc>) -> Result<String, TokenError>;

    /// Sign a refresh token; returns it with its expiry so a ledger row can
    /// be written
    fn issue_refresh_token(
        &self,
        user: &User,
        now: DateTime<Utc>,
    ) -> Result<(String, DateTime<Utc>), TokenError>;

    /// Verify signature, algorithm, issuer, validity window and kind
    fn verify(
        &self,
        token: &str,
        kind: TokenKind,
        now: DateTime<Utc>,
    ) -> Result<TokenClaims, TokenError>;

    /// Lifetime of newly issued access tokens
    fn access_ttl(&self) -> Duration;

    /// Read the subject without checking the signature.
    /// Only for diagnostics, never for authorization.
    fn extract_unverified_subject(&self, token: &str) -> Result<UserId, TokenError>;

    /// Time left on a genuine access token; `None` if it is expired or
    /// fails verification
    fn remaining_validity(&self, token: &str, now: DateTime<Utc>) -> Option<Duration> {
        self.verify(token, TokenKind::Access, now)
            .ok()
            .and_then(|claims| claims.remaining_validity(now))
    }
}

/// HMAC-SHA256 JWT service
#[derive(Clone)]
pub struct JwtService {
    config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl Debug for JwtService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtService")
            .field("config", &self.config)
            .field("encoding_key", &"[hidden]")
            .field("decoding_key", &"[hidden]")
            .finish()
    }
}

impl JwtService {
    /// Create a new JWT service, rejecting secrets shorter than
    /// [`MIN_SECRET_LEN`] bytes and non-positive lifetimes
    pub fn new(config: JwtConfig) -> Result<Self, DomainError> {
        if config.secret.len() < MIN_SECRET_LEN {
            return Err(DomainError::configuration(format!(
                "JWT secret must be at least {} bytes",
                MIN_SECRET_LEN
            )));
        }

        if config.access_ttl <= Duration::zero() || config.refresh_ttl <= Duration::zero() {
            return Err(DomainError::configuration("Token lifetimes must be positive"));
        }

        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());

        Ok(Self {
            config,
            encoding_key,
            decoding_key,
        })
    }

    pub fn config(&self) -> &JwtConfig {
        &self.config
    }

    fn claims_for(
        &self,
        user: &User,
        kind: TokenKind,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> TokenClaims {
        TokenClaims::for_user(
            user,
            kind,
            &self.config.issuer,
            Uuid::new_v4().to_string(),
            now,
            ttl,
        )
    }

    fn encode_claims(&self, claims: &TokenClaims) -> Result<String, TokenError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    fn validation(&self, algorithm: Algorithm) -> Validation {
        let mut validation = Validation::new(algorithm);
        validation.algorithms = ACCEPTED_ALGORITHMS.to_vec();
        // Time is checked against the caller's clock below
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.leeway = 0;
        validation.set_issuer(&[self.config.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "nbf", "iat", "iss", "sub"]);
        validation
    }
}

impl TokenCodec for JwtService {
    fn issue_access_token(&self, user: &User, now: DateTime<Utc>) -> Result<String, TokenError> {
        let claims = self.claims_for(user, TokenKind::Access, now, self.config.access_ttl);
        self.encode_claims(&claims)
    }

    fn issue_refresh_token(
        &self,
        user: &User,
        now: DateTime<Utc>,
    ) -> Result<(String, DateTime<Utc>), TokenError> {
        let claims = self.claims_for(user, TokenKind::Refresh, now, self.config.refresh_ttl);
        let token = self.encode_claims(&claims)?;
        Ok((token, claims.expires_at()))
    }

    fn verify(
        &self,
        token: &str,
        kind: TokenKind,
        now: DateTime<Utc>,
    ) -> Result<TokenClaims, TokenError> {
        let header = decode_header(token)?;
        if !ACCEPTED_ALGORITHMS.contains(&header.alg) {
            return Err(TokenError::UnsupportedAlgorithm(format!("{:?}", header.alg)));
        }

        let claims = decode::<TokenClaims>(token, &self.decoding_key, &self.validation(header.alg))?
            .claims;

        if claims.is_not_yet_valid_at(now) {
            return Err(TokenError::NotYetValid);
        }

        if claims.is_expired_at(now) {
            return Err(TokenError::Expired);
        }

        if claims.typ != kind {
            return Err(TokenError::WrongTokenKind {
                expected: kind,
                found: claims.typ,
            });
        }

        Ok(claims)
    }

    fn access_ttl(&self) -> Duration {
        self.config.access_ttl
    }

    fn extract_unverified_subject(&self, token: &str) -> Result<UserId, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.set_required_spec_claims::<&str>(&[]);

        let claims = decode::<TokenClaims>(token, &DecodingKey::from_secret(&[]), &validation)?
            .claims;

        Ok(claims.user_id())
    }
}
