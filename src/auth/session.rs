/// Session Manager
///
/// Orchestrates the token lifecycle:
/// Anonymous -> Authenticated (login) -> Refreshed* -> LoggedOut.
///
/// Access tokens are stateless. Refresh tokens are additionally checked
/// against the revocation registry, and with rotation enabled every
/// refresh consumes the presented token.

use std::sync::Arc;

use crate::auth::claims::{Claims, TokenKind};
use crate::auth::jwt::{IssuedToken, TokenCodec};
use crate::auth::password::PasswordHasher;
use crate::auth::revocation::{RevocationRegistry, RevokeOutcome};
use crate::configuration::JwtSettings;
use crate::error::{AppError, AuthError, StoreError, TokenError};
use crate::store::{User, UserStore};

/// Token lifetimes and the rotation switch
#[derive(Debug, Clone, Copy)]
pub struct SessionPolicy {
    pub access_ttl: i64,
    pub refresh_ttl: i64,
    pub rotate_refresh_tokens: bool,
}

impl From<&JwtSettings> for SessionPolicy {
    fn from(config: &JwtSettings) -> Self {
        Self {
            access_ttl: config.access_token_expiry,
            refresh_ttl: config.refresh_token_expiry,
            rotate_refresh_tokens: config.rotate_refresh_tokens,
        }
    }
}

#[derive(Debug)]
pub struct LoginOutcome {
    pub user: User,
    pub access: IssuedToken,
    pub refresh: IssuedToken,
}

#[derive(Debug)]
pub struct RefreshOutcome {
    pub user_id: i64,
    pub access: IssuedToken,
    /// Present when rotation is enabled; replaces the client's refresh token
    pub refresh: Option<IssuedToken>,
}

/// Best-effort result of a logout. Logged, never surfaced to the client.
#[derive(Debug, PartialEq)]
pub enum LogoutOutcome {
    Revoked,
    AlreadyRevoked,
    NoToken,
    /// The token could not be parsed, so there was nothing to revoke
    Ignored(TokenError),
    /// The registry failed; the client is logged out regardless
    Failed(StoreError),
}

pub struct SessionManager {
    users: Arc<dyn UserStore>,
    revocations: Arc<dyn RevocationRegistry>,
    codec: TokenCodec,
    hasher: PasswordHasher,
    policy: SessionPolicy,
}

impl SessionManager {
    pub fn new(
        users: Arc<dyn UserStore>,
        revocations: Arc<dyn RevocationRegistry>,
        codec: TokenCodec,
        hasher: PasswordHasher,
        policy: SessionPolicy,
    ) -> Self {
        Self {
            users,
            revocations,
            codec,
            hasher,
            policy,
        }
    }

    pub fn policy(&self) -> SessionPolicy {
        self.policy
    }

    /// Verify credentials and issue an access/refresh pair.
    ///
    /// # Errors
    /// * `InvalidCredentials` - unknown email, wrong password, no usable
    ///   password or inactive account; the cases are indistinguishable
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginOutcome, AppError> {
        let record = match self.users.find_by_email(email).await? {
            Some(record) => record,
            None => {
                self.hasher.verify_dummy(password).await;
                return Err(AuthError::InvalidCredentials.into());
            }
        };

        if !self.hasher.verify(password, &record.credential).await {
            tracing::debug!(user_id = record.user.id, "Password mismatch");
            return Err(AuthError::InvalidCredentials.into());
        }

        if !record.user.is_active {
            tracing::info!(user_id = record.user.id, "Login attempt on inactive account");
            return Err(AuthError::InvalidCredentials.into());
        }

        let user_id = record.user.id;
        let access = self.codec.issue(user_id, TokenKind::Access, self.policy.access_ttl)?;
        let refresh = self.codec.issue(user_id, TokenKind::Refresh, self.policy.refresh_ttl)?;

        tracing::info!(user_id = user_id, refresh_jti = %refresh.claims.jti, "Session started");

        Ok(LoginOutcome {
            user: record.user,
            access,
            refresh,
        })
    }

    /// Exchange a refresh token for a new access token.
    ///
    /// With rotation on, the presented token id is revoked and a new refresh
    /// token is returned. Of concurrent refreshes with the same token only
    /// one succeeds; the others see `Revoked`.
    pub async fn refresh(&self, refresh_token: Option<&str>) -> Result<RefreshOutcome, AppError> {
        let token = refresh_token
            .filter(|token| !token.is_empty())
            .ok_or(TokenError::Missing)?;

        let claims = self.codec.parse_kind(token, TokenKind::Refresh)?;
        let user_id = claims.user_id()?;

        if self.revocations.is_revoked(&claims.jti).await? {
            tracing::warn!(user_id = user_id, jti = %claims.jti, "Revoked refresh token presented");
            return Err(TokenError::Revoked.into());
        }

        let refresh = if self.policy.rotate_refresh_tokens {
            match self
                .revocations
                .revoke(&claims.jti, user_id, claims.expires_at())
                .await?
            {
                RevokeOutcome::Revoked => Some(self.codec.issue(
                    user_id,
                    TokenKind::Refresh,
                    self.policy.refresh_ttl,
                )?),
                RevokeOutcome::AlreadyRevoked => {
                    tracing::warn!(user_id = user_id, jti = %claims.jti, "Lost refresh rotation race");
                    return Err(TokenError::Revoked.into());
                }
            }
        } else {
            None
        };

        let access = self.codec.issue(user_id, TokenKind::Access, self.policy.access_ttl)?;

        tracing::info!(
            user_id = user_id,
            rotated = refresh.is_some(),
            "Access token refreshed"
        );

        Ok(RefreshOutcome {
            user_id,
            access,
            refresh,
        })
    }

    /// Revoke the refresh token if there is one. Never fails.
    pub async fn logout(&self, refresh_token: Option<&str>) -> LogoutOutcome {
        let token = match refresh_token.filter(|token| !token.is_empty()) {
            Some(token) => token,
            None => return LogoutOutcome::NoToken,
        };

        let claims = match self.codec.parse_kind(token, TokenKind::Refresh) {
            Ok(claims) => claims,
            Err(e) => return LogoutOutcome::Ignored(e),
        };

        let user_id = match claims.user_id() {
            Ok(user_id) => user_id,
            Err(e) => return LogoutOutcome::Ignored(e),
        };

        match self
            .revocations
            .revoke(&claims.jti, user_id, claims.expires_at())
            .await
        {
            Ok(RevokeOutcome::Revoked) => LogoutOutcome::Revoked,
            Ok(RevokeOutcome::AlreadyRevoked) => LogoutOutcome::AlreadyRevoked,
            Err(e) => LogoutOutcome::Failed(e),
        }
    }

    /// Validate a bearer access token
    pub fn authenticate(&self, access_token: &str) -> Result<Claims, TokenError> {
        self.codec.parse_kind(access_token, TokenKind::Access)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Credential;
    use crate::store::{InMemoryRevocationRegistry, InMemoryUserStore, NewUser, UserChanges};

    struct Fixture {
        manager: Arc<SessionManager>,
        users: Arc<InMemoryUserStore>,
        revocations: Arc<InMemoryRevocationRegistry>,
        codec: TokenCodec,
        hasher: PasswordHasher,
    }

    fn jwt_settings(rotate: bool) -> JwtSettings {
        JwtSettings {
            secret: "test-secret-key-at-least-32-characters-long".to_string(),
            access_token_expiry: 1800,
            refresh_token_expiry: 604800,
            issuer: "test".to_string(),
            rotate_refresh_tokens: rotate,
        }
    }

    fn fixture(rotate: bool) -> Fixture {
        let settings = jwt_settings(rotate);
        let users = Arc::new(InMemoryUserStore::new());
        let revocations = Arc::new(InMemoryRevocationRegistry::new());
        let codec = TokenCodec::new(&settings).unwrap();
        let hasher = PasswordHasher::new(4).unwrap();
        let manager = Arc::new(SessionManager::new(
            users.clone(),
            revocations.clone(),
            codec.clone(),
            hasher.clone(),
            SessionPolicy::from(&settings),
        ));

        Fixture {
            manager,
            users,
            revocations,
            codec,
            hasher,
        }
    }

    async fn register(fixture: &Fixture, email: &str, password: Option<&str>) -> User {
        let credential = Credential::set(&fixture.hasher, password).await.unwrap();
        fixture
            .users
            .insert(NewUser {
                email: email.to_string(),
                user_name: "Test".to_string(),
                phone: None,
                location: "yourcity".to_string(),
                credential,
                is_staff: false,
                is_superuser: false,
            })
            .await
            .unwrap()
    }

    fn token_error(result: Result<RefreshOutcome, AppError>) -> TokenError {
        match result {
            Err(AppError::Token(e)) => e,
            other => panic!("Expected token error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_login_issues_tokens_for_user() {
        let fixture = fixture(true);
        let user = register(&fixture, "a@x.com", Some("secret123")).await;

        let outcome = fixture.manager.login("A@X.com", "secret123").await.unwrap();
        let access = fixture.manager.authenticate(&outcome.access.token).unwrap();

        assert_eq!(access.user_id().unwrap(), user.id);
        assert_eq!(outcome.refresh.claims.kind, TokenKind::Refresh);
        assert_eq!(outcome.user.id, user.id);
    }

    #[tokio::test]
    async fn test_concurrent_logins_mint_distinct_tokens() {
        let fixture = fixture(true);
        register(&fixture, "a@x.com", Some("secret123")).await;

        let (first, second) = tokio::join!(
            fixture.manager.login("a@x.com", "secret123"),
            fixture.manager.login("a@x.com", "secret123"),
        );

        assert_ne!(first.unwrap().refresh.claims.jti, second.unwrap().refresh.claims.jti);
    }

    #[tokio::test]
    async fn test_bad_credentials_are_indistinguishable() {
        let fixture = fixture(true);
        register(&fixture, "a@x.com", Some("secret123")).await;
        register(&fixture, "nopass@x.com", None).await;

        for (email, password) in [
            ("a@x.com", "wrong-password"),
            ("nobody@x.com", "secret123"),
            ("nopass@x.com", ""),
            ("nopass@x.com", "secret123"),
        ] {
            let err = fixture.manager.login(email, password).await.unwrap_err();
            assert!(
                matches!(err, AppError::Auth(AuthError::InvalidCredentials)),
                "{} / {} gave {:?}",
                email,
                password,
                err
            );
        }
    }

    #[tokio::test]
    async fn test_wrong_password_sharing_72_byte_prefix_is_rejected() {
        let fixture = fixture(true);
        let password = "a".repeat(72);
        register(&fixture, "a@x.com", Some(&password)).await;

        let wrong = format!("{}totally-wrong", password);
        assert!(matches!(
            fixture.manager.login("a@x.com", &wrong).await,
            Err(AppError::Auth(AuthError::InvalidCredentials))
        ));
        assert!(fixture.manager.login("a@x.com", &password).await.is_ok());
    }

    #[tokio::test]
    async fn test_inactive_user_cannot_login() {
        let fixture = fixture(true);
        let user = register(&fixture, "a@x.com", Some("secret123")).await;
        fixture
            .users
            .update(
                user.id,
                UserChanges {
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(fixture.manager.login("a@x.com", "secret123").await.is_err());
    }

    #[tokio::test]
    async fn test_refresh_rotates_and_revokes_old_token() {
        let fixture = fixture(true);
        register(&fixture, "a@x.com", Some("secret123")).await;
        let login = fixture.manager.login("a@x.com", "secret123").await.unwrap();
        let r1 = login.refresh.token.clone();

        let refreshed = fixture.manager.refresh(Some(&r1)).await.unwrap();
        let r2 = refreshed.refresh.expect("rotation enabled").token;

        assert_ne!(refreshed.access.token, login.access.token);
        assert_ne!(r1, r2);
        assert_eq!(
            token_error(fixture.manager.refresh(Some(&r1)).await),
            TokenError::Revoked
        );
        assert!(fixture.manager.refresh(Some(&r2)).await.is_ok());
    }

    #[tokio::test]
    async fn test_refresh_without_rotation_keeps_token() {
        let fixture = fixture(false);
        register(&fixture, "a@x.com", Some("secret123")).await;
        let login = fixture.manager.login("a@x.com", "secret123").await.unwrap();

        let first = fixture.manager.refresh(Some(&login.refresh.token)).await.unwrap();
        let second = fixture.manager.refresh(Some(&login.refresh.token)).await.unwrap();

        assert!(first.refresh.is_none());
        assert!(second.refresh.is_none());
        assert!(fixture.revocations.is_empty());
    }

    #[tokio::test]
    async fn test_refresh_rejections() {
        let fixture = fixture(true);

        assert_eq!(token_error(fixture.manager.refresh(None).await), TokenError::Missing);
        assert_eq!(token_error(fixture.manager.refresh(Some("")).await), TokenError::Missing);
        assert_eq!(
            token_error(fixture.manager.refresh(Some("garbage")).await),
            TokenError::Malformed
        );

        let access = fixture.codec.issue(1, TokenKind::Access, 60).unwrap();
        assert_eq!(
            token_error(fixture.manager.refresh(Some(&access.token)).await),
            TokenError::UnexpectedKind
        );

        let expired = fixture.codec.issue(1, TokenKind::Refresh, 0).unwrap();
        assert_eq!(
            token_error(fixture.manager.refresh(Some(&expired.token)).await),
            TokenError::Expired
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_rotation_has_one_winner() {
        let fixture = fixture(true);
        register(&fixture, "a@x.com", Some("secret123")).await;
        let token = fixture.manager.login("a@x.com", "secret123").await.unwrap().refresh.token;

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let manager = fixture.manager.clone();
                let token = token.clone();
                tokio::spawn(async move { manager.refresh(Some(&token)).await })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => winners += 1,
                Err(AppError::Token(TokenError::Revoked)) => {}
                Err(other) => panic!("Unexpected error {:?}", other),
            }
        }

        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_logout_is_idempotent() {
        let fixture = fixture(true);
        register(&fixture, "a@x.com", Some("secret123")).await;
        let token = fixture.manager.login("a@x.com", "secret123").await.unwrap().refresh.token;

        assert_eq!(fixture.manager.logout(Some(&token)).await, LogoutOutcome::Revoked);
        assert_eq!(fixture.manager.logout(Some(&token)).await, LogoutOutcome::AlreadyRevoked);
        assert_eq!(
            token_error(fixture.manager.refresh(Some(&token)).await),
            TokenError::Revoked
        );
    }

    #[tokio::test]
    async fn test_logout_swallows_bad_input() {
        let fixture = fixture(true);

        assert_eq!(fixture.manager.logout(None).await, LogoutOutcome::NoToken);
        assert_eq!(
            fixture.manager.logout(Some("garbage")).await,
            LogoutOutcome::Ignored(TokenError::Malformed)
        );
        assert!(fixture.revocations.is_empty());
    }

    #[tokio::test]
    async fn test_authenticate_rejects_refresh_tokens() {
        let fixture = fixture(true);
        let refresh = fixture.codec.issue(1, TokenKind::Refresh, 60).unwrap();

        assert_eq!(
            fixture.manager.authenticate(&refresh.token).unwrap_err(),
            TokenError::UnexpectedKind
        );
    }
}
