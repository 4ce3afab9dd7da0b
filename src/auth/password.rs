/// Password Hashing and Verification
///
/// bcrypt hashing with a configurable work factor. Hashing happens in exactly
/// one place, `Credential::set`, and never inside a store's save path.

use std::fmt;
use std::sync::Arc;

use crate::error::{AppError, ConfigError, ValidationError};
use crate::validators::{validate_password, MAX_PASSWORD_BYTES};

const MIN_COST: u32 = 4;
const MAX_COST: u32 = 31;

/// A bcrypt digest. Only `PasswordHasher` and the store loader can build one.
#[derive(Clone, PartialEq, Eq)]
pub struct PasswordHash(String);

impl PasswordHash {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PasswordHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PasswordHash(<redacted>)")
    }
}

/// The persisted credential of a user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    Usable(PasswordHash),
    /// No password was ever set; login must be impossible
    Unusable,
}

impl Credential {
    /// The single entry point that turns plaintext into a stored credential.
    ///
    /// `None` yields `Unusable`. A supplied password must satisfy the policy.
    pub async fn set(hasher: &PasswordHasher, plaintext: Option<&str>) -> Result<Self, AppError> {
        match plaintext {
            None => Ok(Credential::Unusable),
            Some(password) => {
                validate_password(password)?;
                Ok(Credential::Usable(hasher.hash(password).await?))
            }
        }
    }

    /// Rebuild a credential from the nullable `password_hash` column
    pub fn from_stored(stored: Option<String>) -> Self {
        match stored {
            Some(hash) if !hash.is_empty() => Credential::Usable(PasswordHash(hash)),
            _ => Credential::Unusable,
        }
    }

    pub fn as_stored(&self) -> Option<&str> {
        match self {
            Credential::Usable(hash) => Some(hash.as_str()),
            Credential::Unusable => None,
        }
    }
}

/// bcrypt hasher with a fixed cost
#[derive(Clone)]
pub struct PasswordHasher {
    cost: u32,
    // Verified against when there is no real digest, so that unknown emails
    // and unusable credentials cost the same as a wrong password.
    dummy_hash: Arc<str>,
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Result<Self, AppError> {
        if !(MIN_COST..=MAX_COST).contains(&cost) {
            return Err(ConfigError::InvalidValue(format!(
                "password.hash_cost must be between {} and {}",
                MIN_COST, MAX_COST
            ))
            .into());
        }

        let dummy_hash = bcrypt::hash("dummy-password-for-timing", cost)
            .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))?;

        Ok(Self {
            cost,
            dummy_hash: Arc::from(dummy_hash),
        })
    }

    /// Hash a plaintext password on the blocking pool.
    ///
    /// Input longer than bcrypt's 72 bytes is refused rather than truncated.
    pub async fn hash(&self, plaintext: &str) -> Result<PasswordHash, AppError> {
        if plaintext.len() > MAX_PASSWORD_BYTES {
            return Err(ValidationError::TooLong("password".to_string(), MAX_PASSWORD_BYTES).into());
        }

        let plaintext = plaintext.to_owned();
        let cost = self.cost;

        let hash = tokio::task::spawn_blocking(move || bcrypt::hash(plaintext, cost))
            .await?
            .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))?;

        Ok(PasswordHash(hash))
    }

    /// Verify a plaintext password against a stored credential.
    ///
    /// Never fails: malformed digests, unusable credentials, input over
    /// 72 bytes and worker failures all count as a mismatch.
    pub async fn verify(&self, plaintext: &str, credential: &Credential) -> bool {
        match credential {
            // bcrypt would compare only the 72-byte prefix
            Credential::Usable(_) if plaintext.len() > MAX_PASSWORD_BYTES => {
                self.verify_dummy(plaintext).await;
                false
            }
            Credential::Usable(hash) => {
                let digest = hash.as_str().to_owned();
                self.verify_blocking(plaintext, digest).await
            }
            Credential::Unusable => {
                self.verify_dummy(plaintext).await;
                false
            }
        }
    }

    /// Burn one verification against the dummy digest
    pub async fn verify_dummy(&self, plaintext: &str) {
        let digest = self.dummy_hash.to_string();
        let _ = self.verify_blocking(plaintext, digest).await;
    }

    async fn verify_blocking(&self, plaintext: &str, digest: String) -> bool {
        let plaintext = plaintext.to_owned();

        match tokio::task::spawn_blocking(move || verify_digest(&plaintext, &digest)).await {
            Ok(matches) => matches,
            Err(e) => {
                tracing::error!(error = %e, "Password verification task failed");
                false
            }
        }
    }
}

/// Compare a plaintext password with a bcrypt digest.
///
/// bcrypt compares in constant time; a malformed digest yields `false`.
pub fn verify_digest(plaintext: &str, digest: &str) -> bool {
    bcrypt::verify(plaintext, digest).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher() -> PasswordHasher {
        PasswordHasher::new(4).expect("Failed to build hasher")
    }

    #[tokio::test]
    async fn test_hash_password() {
        let hash = hasher().hash("secret123").await.expect("Failed to hash password");

        assert_ne!(hash.as_str(), "secret123");
        assert!(hash.as_str().starts_with("$2"));
    }

    #[tokio::test]
    async fn test_hashes_are_salted() {
        let hasher = hasher();
        let first = hasher.hash("secret123").await.unwrap();
        let second = hasher.hash("secret123").await.unwrap();

        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_verify_password() {
        let hasher = hasher();
        let credential = Credential::set(&hasher, Some("secret123")).await.unwrap();

        assert!(hasher.verify("secret123", &credential).await);
        assert!(!hasher.verify("secret124", &credential).await);
    }

    #[tokio::test]
    async fn test_unusable_credential_never_verifies() {
        let hasher = hasher();
        let credential = Credential::set(&hasher, None).await.unwrap();

        assert_eq!(credential, Credential::Unusable);
        assert!(!hasher.verify("", &credential).await);
        assert!(!hasher.verify("anything", &credential).await);
    }

    #[tokio::test]
    async fn test_policy_is_enforced_on_set() {
        let result = Credential::set(&hasher(), Some("short")).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_input_past_72_bytes_is_never_truncated() {
        let hasher = hasher();
        let base = "a".repeat(72);
        let credential = Credential::set(&hasher, Some(&base)).await.unwrap();

        assert!(hasher.verify(&base, &credential).await);
        assert!(!hasher.verify(&format!("{}totally-wrong", base), &credential).await);

        let too_long = format!("{}REAL-SUFFIX", base);
        assert!(matches!(
            Credential::set(&hasher, Some(&too_long)).await,
            Err(AppError::Validation(ValidationError::TooLong(_, 72)))
        ));
        assert!(hasher.hash(&too_long).await.is_err());
    }

    #[test]
    fn test_malformed_digest_is_a_mismatch() {
        assert!(!verify_digest("secret123", "not-a-bcrypt-hash"));
        assert!(!verify_digest("secret123", ""));
    }

    #[test]
    fn test_stored_round_trip() {
        assert_eq!(Credential::from_stored(None), Credential::Unusable);
        assert_eq!(Credential::from_stored(Some(String::new())), Credential::Unusable);

        let credential = Credential::from_stored(Some("$2b$04$abc".to_string()));
        assert_eq!(credential.as_stored(), Some("$2b$04$abc"));
    }

    #[test]
    fn test_hash_is_redacted_in_debug() {
        let credential = Credential::from_stored(Some("$2b$04$abc".to_string()));
        assert!(!format!("{:?}", credential).contains("abc"));
    }

    #[test]
    fn test_cost_bounds() {
        assert!(PasswordHasher::new(3).is_err());
        assert!(PasswordHasher::new(32).is_err());
    }
}
