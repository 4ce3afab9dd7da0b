/// In-process store backends
///
/// Same contracts as the Postgres backends, guarded by a mutex. Used by the
/// test suites and for running the service without a database.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::auth::{RevocationRegistry, RevokeOutcome};
use crate::error::StoreError;
use crate::store::{NewUser, User, UserChanges, UserRecord, UserStore};

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Unexpected("in-memory store lock poisoned".to_string())
}

#[derive(Default)]
struct UserTable {
    next_id: i64,
    rows: HashMap<i64, UserRecord>,
}

impl UserTable {
    fn check_unique(&self, email: &str, phone: Option<&str>, except: Option<i64>) -> Result<(), StoreError> {
        let email_key = email.to_lowercase();
        for (id, record) in &self.rows {
            if Some(*id) == except {
                continue;
            }
            if record.user.email.to_lowercase() == email_key {
                return Err(StoreError::Conflict("email".to_string()));
            }
            // NULL phones never conflict
            if let (Some(phone), Some(existing)) = (phone, record.user.phone.as_deref()) {
                if phone == existing {
                    return Err(StoreError::Conflict("phone".to_string()));
                }
            }
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryUserStore {
    table: Mutex<UserTable>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn insert(&self, new_user: NewUser) -> Result<User, StoreError> {
        let mut table = self.table.lock().map_err(poisoned)?;
        table.check_unique(&new_user.email, new_user.phone.as_deref(), None)?;

        table.next_id += 1;
        let now = Utc::now();
        let user = User {
            id: table.next_id,
            email: new_user.email,
            user_name: new_user.user_name,
            phone: new_user.phone,
            location: new_user.location,
            is_active: true,
            is_staff: new_user.is_staff,
            is_superuser: new_user.is_superuser,
            created_at: now,
            updated_at: now,
        };

        table.rows.insert(
            user.id,
            UserRecord {
                user: user.clone(),
                credential: new_user.credential,
            },
        );
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        let table = self.table.lock().map_err(poisoned)?;
        let key = email.trim().to_lowercase();
        Ok(table
            .rows
            .values()
            .find(|record| record.user.email.to_lowercase() == key)
            .cloned())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, StoreError> {
        let table = self.table.lock().map_err(poisoned)?;
        Ok(table.rows.get(&id).map(|record| record.user.clone()))
    }

    async fn list(&self) -> Result<Vec<User>, StoreError> {
        let table = self.table.lock().map_err(poisoned)?;
        let mut users: Vec<User> = table.rows.values().map(|record| record.user.clone()).collect();
        users.sort_by_key(|user| user.id);
        Ok(users)
    }

    async fn update(&self, id: i64, changes: UserChanges) -> Result<User, StoreError> {
        let mut table = self.table.lock().map_err(poisoned)?;

        let current = table
            .rows
            .get(&id)
            .ok_or_else(|| StoreError::NotFound("User".to_string()))?
            .user
            .clone();

        let email = changes.email.clone().unwrap_or_else(|| current.email.clone());
        let phone = match &changes.phone {
            Some(phone) => phone.clone(),
            None => current.phone.clone(),
        };
        table.check_unique(&email, phone.as_deref(), Some(id))?;

        let record = table
            .rows
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound("User".to_string()))?;

        record.user.email = email;
        record.user.phone = phone;
        if let Some(user_name) = changes.user_name {
            record.user.user_name = user_name;
        }
        if let Some(location) = changes.location {
            record.user.location = location;
        }
        if let Some(is_active) = changes.is_active {
            record.user.is_active = is_active;
        }
        if let Some(credential) = changes.credential {
            record.credential = credential;
        }
        record.user.updated_at = Utc::now();

        Ok(record.user.clone())
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        let mut table = self.table.lock().map_err(poisoned)?;
        table
            .rows
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound("User".to_string()))
    }
}

#[derive(Default)]
pub struct InMemoryRevocationRegistry {
    // jti -> (revoked_at, expires_at)
    entries: Mutex<HashMap<String, (DateTime<Utc>, DateTime<Utc>)>>,
}

impl InMemoryRevocationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RevocationRegistry for InMemoryRevocationRegistry {
    async fn revoke(
        &self,
        jti: &str,
        _user_id: i64,
        expires_at: DateTime<Utc>,
    ) -> Result<RevokeOutcome, StoreError> {
        let mut entries = self.entries.lock().map_err(poisoned)?;
        if entries.contains_key(jti) {
            return Ok(RevokeOutcome::AlreadyRevoked);
        }
        entries.insert(jti.to_string(), (Utc::now(), expires_at));
        Ok(RevokeOutcome::Revoked)
    }

    async fn is_revoked(&self, jti: &str) -> Result<bool, StoreError> {
        let entries = self.entries.lock().map_err(poisoned)?;
        Ok(entries.contains_key(jti))
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut entries = self.entries.lock().map_err(poisoned)?;
        let before = entries.len();
        entries.retain(|_, (_, expires_at)| *expires_at >= now);
        Ok((before - entries.len()) as u64)
    }
}
