/// Credential store
///
/// Persisted user records and their credentials. The store never hashes:
/// it receives a ready `Credential` built by `Credential::set`.

mod memory;
mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::auth::Credential;
use crate::error::StoreError;

pub use memory::{InMemoryRevocationRegistry, InMemoryUserStore};
pub use postgres::{PostgresRevocationRegistry, PostgresUserStore};

/// A user as exposed to the rest of the service (no credential)
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub user_name: String,
    pub phone: Option<String>,
    pub location: String,
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A user together with the stored credential, for login only
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub user: User,
    pub credential: Credential,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub user_name: String,
    pub phone: Option<String>,
    pub location: String,
    pub credential: Credential,
    pub is_staff: bool,
    pub is_superuser: bool,
}

/// Partial update; `None` leaves the field untouched
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub email: Option<String>,
    pub user_name: Option<String>,
    /// `Some(None)` clears the phone
    pub phone: Option<Option<String>>,
    pub location: Option<String>,
    pub credential: Option<Credential>,
    pub is_active: Option<bool>,
}

#[async_trait]
pub trait UserStore: Send + Sync + 'static {
    /// # Errors
    /// * `Conflict` - email (case-insensitive) or phone already taken
    async fn insert(&self, new_user: NewUser) -> Result<User, StoreError>;

    /// Case-insensitive lookup on the whole address
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, StoreError>;

    async fn list(&self) -> Result<Vec<User>, StoreError>;

    /// # Errors
    /// * `NotFound` - no user with this id
    /// * `Conflict` - the new email or phone belongs to another user
    async fn update(&self, id: i64, changes: UserChanges) -> Result<User, StoreError>;

    /// # Errors
    /// * `NotFound` - no user with this id
    async fn delete(&self, id: i64) -> Result<(), StoreError>;
}
