/// JWT Token Generation and Validation
///
/// `TokenCodec` signs and verifies HS256 tokens with the configured secret
/// and issuer. It is built once from `JwtSettings` and shared.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

use crate::auth::claims::{Claims, TokenKind};
use crate::configuration::JwtSettings;
use crate::error::{AppError, ConfigError, TokenError};

const MIN_SECRET_LENGTH: usize = 32;

/// A signed token together with the claims it carries
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub claims: Claims,
}

#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: String,
}

impl TokenCodec {
    pub fn new(config: &JwtSettings) -> Result<Self, AppError> {
        if config.secret.is_empty() {
            return Err(ConfigError::MissingRequired("jwt.secret".to_string()).into());
        }

        if config.secret.len() < MIN_SECRET_LENGTH {
            return Err(ConfigError::InvalidValue(format!(
                "jwt.secret must be at least {} bytes",
                MIN_SECRET_LENGTH
            ))
            .into());
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&config.issuer]);
        validation.set_required_spec_claims(&["exp", "sub", "iss"]);
        // Expiry is checked against `Claims::is_expired` with zero leeway
        validation.validate_exp = false;
        validation.leeway = 0;

        Ok(Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
            issuer: config.issuer.clone(),
        })
    }

    /// Issue a token of `kind` for `user_id`, valid for `ttl_seconds`
    pub fn issue(&self, user_id: i64, kind: TokenKind, ttl_seconds: i64) -> Result<IssuedToken, TokenError> {
        let claims = Claims::new(user_id, kind, ttl_seconds, &self.issuer);
        let token = self.encode(&claims)?;
        Ok(IssuedToken { token, claims })
    }

    pub fn encode(&self, claims: &Claims) -> Result<String, TokenError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| TokenError::Encoding(e.to_string()))
    }

    /// Verify signature, issuer and expiry and return the claims.
    ///
    /// # Errors
    /// * `Malformed` - not a JWT, bad encoding, missing claims, wrong issuer
    /// * `InvalidSignature` - signed with another key or tampered with
    /// * `Expired` - `exp` is now or in the past
    pub fn parse(&self, token: &str) -> Result<Claims, TokenError> {
        let claims = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature => TokenError::InvalidSignature,
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => {
                    tracing::debug!(error = %e, "JWT rejected");
                    TokenError::Malformed
                }
            })?;

        if claims.is_expired() {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }

    /// `parse` plus a check that the token is of the expected kind
    pub fn parse_kind(&self, token: &str, kind: TokenKind) -> Result<Claims, TokenError> {
        let claims = self.parse(token)?;
        if claims.kind != kind {
            return Err(TokenError::UnexpectedKind);
        }
        Ok(claims)
    }
}
