/// Account management
///
/// Registration and CRUD over user records. Every request type is
/// validated field by field into a store command before anything is
/// persisted; passwords only ever reach the store through `Credential::set`.

use std::sync::Arc;

use serde::{Deserialize, Deserializer};

use crate::auth::{Credential, PasswordHasher};
use crate::error::{AppError, StoreError, ValidationError};
use crate::store::{NewUser, User, UserChanges, UserStore};
use crate::validators::{
    is_valid_email, is_valid_location, is_valid_name, is_valid_phone, validate_password,
    DEFAULT_LOCATION,
};

/// POST /register and POST /users payload
#[derive(Debug, Default, Deserialize)]
pub struct RegisterRequest {
    pub email: Option<String>,
    #[serde(rename = "userName", alias = "user_name")]
    pub user_name: Option<String>,
    pub password: Option<String>,
    #[serde(alias = "userPhone")]
    pub phone: Option<String>,
    #[serde(alias = "userLocation")]
    pub location: Option<String>,
}

/// PUT /users/{id} payload; every field is optional.
///
/// `phone` distinguishes an absent key (unchanged) from `null` or `""`
/// (cleared).
#[derive(Debug, Default, Deserialize)]
pub struct UpdateUserRequest {
    pub email: Option<String>,
    #[serde(rename = "userName", alias = "user_name")]
    pub user_name: Option<String>,
    pub password: Option<String>,
    #[serde(default, alias = "userPhone", deserialize_with = "present_key")]
    pub phone: Option<Option<String>>,
    #[serde(alias = "userLocation")]
    pub location: Option<String>,
}

/// A registration that passed validation; the password is still plaintext
#[derive(Debug)]
pub struct ValidRegistration {
    pub email: String,
    pub user_name: String,
    pub phone: Option<String>,
    pub location: String,
    pub password: Option<String>,
}

// Blank optional strings are treated as absent
fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

// A key that is present maps to `Some`, even when its value is `null`
fn present_key<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

impl RegisterRequest {
    pub fn validate(self) -> Result<ValidRegistration, ValidationError> {
        let email = present(&self.email)
            .ok_or_else(|| ValidationError::EmptyField("email".to_string()))
            .and_then(is_valid_email)?;
        let user_name = present(&self.user_name)
            .ok_or_else(|| ValidationError::EmptyField("userName".to_string()))
            .and_then(is_valid_name)?;
        let phone = present(&self.phone).map(is_valid_phone).transpose()?;
        let location = present(&self.location)
            .map(is_valid_location)
            .transpose()?
            .unwrap_or_else(|| DEFAULT_LOCATION.to_string());

        if let Some(password) = &self.password {
            validate_password(password)?;
        }

        Ok(ValidRegistration {
            email,
            user_name,
            phone,
            location,
            password: self.password,
        })
    }
}

impl UpdateUserRequest {
    /// Validate every supplied field. A supplied but blank email, name or
    /// location is an error; a blank phone clears it. The credential is
    /// filled in later, once the password has been hashed.
    pub fn validate(&self) -> Result<UserChanges, ValidationError> {
        if let Some(password) = &self.password {
            validate_password(password)?;
        }

        Ok(UserChanges {
            email: self.email.as_deref().map(is_valid_email).transpose()?,
            user_name: self.user_name.as_deref().map(is_valid_name).transpose()?,
            phone: self
                .phone
                .as_ref()
                .map(|phone| present(phone).map(is_valid_phone).transpose())
                .transpose()?,
            location: self.location.as_deref().map(is_valid_location).transpose()?,
            credential: None,
            is_active: None,
        })
    }
}

pub struct AccountService {
    users: Arc<dyn UserStore>,
    hasher: PasswordHasher,
}

impl AccountService {
    pub fn new(users: Arc<dyn UserStore>, hasher: PasswordHasher) -> Self {
        Self { users, hasher }
    }

    /// Create a user. Without a password the account has no usable credential.
    pub async fn register(&self, request: RegisterRequest) -> Result<User, AppError> {
        let registration = request.validate()?;
        let credential = Credential::set(&self.hasher, registration.password.as_deref()).await?;

        let user = self
            .users
            .insert(NewUser {
                email: registration.email,
                user_name: registration.user_name,
                phone: registration.phone,
                location: registration.location,
                credential,
                is_staff: false,
                is_superuser: false,
            })
            .await?;

        tracing::info!(user_id = user.id, "User registered");
        Ok(user)
    }

    pub async fn list(&self) -> Result<Vec<User>, AppError> {
        Ok(self.users.list().await?)
    }

    pub async fn get(&self, id: i64) -> Result<User, AppError> {
        self.users
            .find_by_id(id)
            .await?
            .ok_or_else(|| StoreError::NotFound("User".to_string()).into())
    }

    pub async fn update(&self, id: i64, request: UpdateUserRequest) -> Result<User, AppError> {
        let mut changes = request.validate()?;
        if let Some(password) = request.password.as_deref() {
            changes.credential = Some(Credential::set(&self.hasher, Some(password)).await?);
        }

        let user = self.users.update(id, changes).await?;
        tracing::info!(user_id = user.id, "User updated");
        Ok(user)
    }

    pub async fn delete(&self, id: i64) -> Result<(), AppError> {
        self.users.delete(id).await?;
        tracing::info!(user_id = id, "User deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryUserStore;

    fn service() -> (AccountService, Arc<InMemoryUserStore>) {
        let users = Arc::new(InMemoryUserStore::new());
        let service = AccountService::new(users.clone(), PasswordHasher::new(4).unwrap());
        (service, users)
    }

    fn request(email: &str, password: Option<&str>) -> RegisterRequest {
        RegisterRequest {
            email: Some(email.to_string()),
            user_name: Some("Test User".to_string()),
            password: password.map(str::to_string),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_register_hashes_once() {
        let (service, users) = service();
        let user = service.register(request("a@x.com", Some("secret123"))).await.unwrap();

        let record = users.find_by_email("a@x.com").await.unwrap().unwrap();
        let stored = record.credential.as_stored().unwrap();

        assert_eq!(user.location, DEFAULT_LOCATION);
        assert_ne!(stored, "secret123");
        assert!(crate::auth::verify_digest("secret123", stored));
    }

    #[tokio::test]
    async fn test_register_without_password_is_unusable() {
        let (service, users) = service();
        service.register(request("a@x.com", None)).await.unwrap();

        let record = users.find_by_email("a@x.com").await.unwrap().unwrap();
        assert_eq!(record.credential, Credential::Unusable);
    }

    #[test]
    fn test_register_requires_email_and_name() {
        let missing_email = RegisterRequest {
            user_name: Some("Test".to_string()),
            ..Default::default()
        };
        assert_eq!(
            missing_email.validate().unwrap_err(),
            ValidationError::EmptyField("email".to_string())
        );

        let missing_name = RegisterRequest {
            email: Some("a@x.com".to_string()),
            ..Default::default()
        };
        assert_eq!(
            missing_name.validate().unwrap_err(),
            ValidationError::EmptyField("userName".to_string())
        );
    }

    #[test]
    fn test_blank_phone_is_absent() {
        let registration = RegisterRequest {
            phone: Some("  ".to_string()),
            ..request("a@x.com", None)
        }
        .validate()
        .unwrap();

        assert_eq!(registration.phone, None);
    }

    #[test]
    fn test_update_rejects_blank_required_fields() {
        for body in [
            r#"{"userName": ""}"#,
            r#"{"email": "  "}"#,
            r#"{"location": ""}"#,
            r#"{"password": ""}"#,
        ] {
            let request: UpdateUserRequest = serde_json::from_str(body).unwrap();
            assert!(
                matches!(request.validate(), Err(ValidationError::EmptyField(_))),
                "{} should be rejected",
                body
            );
        }
    }

    #[test]
    fn test_update_phone_absent_null_and_blank() {
        let absent: UpdateUserRequest = serde_json::from_str(r#"{"userName": "X"}"#).unwrap();
        assert_eq!(absent.validate().unwrap().phone, None);

        let null: UpdateUserRequest = serde_json::from_str(r#"{"phone": null}"#).unwrap();
        assert_eq!(null.validate().unwrap().phone, Some(None));

        let blank: UpdateUserRequest = serde_json::from_str(r#"{"userPhone": ""}"#).unwrap();
        assert_eq!(blank.validate().unwrap().phone, Some(None));

        let set: UpdateUserRequest = serde_json::from_str(r#"{"phone": "123"}"#).unwrap();
        assert_eq!(set.validate().unwrap().phone, Some(Some("123".to_string())));
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts() {
        let (service, _) = service();
        service.register(request("a@x.com", None)).await.unwrap();

        let err = service.register(request("A@x.com", None)).await.unwrap_err();
        assert!(matches!(err, AppError::Store(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_update_password_rehashes() {
        let (service, users) = service();
        let user = service.register(request("a@x.com", Some("secret123"))).await.unwrap();

        let update = UpdateUserRequest {
            password: Some("another-secret".to_string()),
            ..Default::default()
        };
        service.update(user.id, update).await.unwrap();

        let record = users.find_by_email("a@x.com").await.unwrap().unwrap();
        let stored = record.credential.as_stored().unwrap();
        assert!(crate::auth::verify_digest("another-secret", stored));
        assert!(!crate::auth::verify_digest("secret123", stored));
    }

    #[tokio::test]
    async fn test_missing_user_is_not_found() {
        let (service, _) = service();

        for err in [
            service.get(7).await.unwrap_err(),
            service.delete(7).await.unwrap_err(),
            service.update(7, UpdateUserRequest::default()).await.unwrap_err(),
        ] {
            assert!(matches!(err, AppError::Store(StoreError::NotFound(_))), "{:?}", err);
        }
    }
}
