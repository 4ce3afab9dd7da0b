/// PostgreSQL store backends
///
/// Uniqueness and the exactly-once revocation transition are enforced by
/// the database (see `migrations/`), not by in-process locks. Every call is
/// bounded by the configured timeout.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::auth::{Credential, RevocationRegistry, RevokeOutcome};
use crate::error::StoreError;
use crate::store::{NewUser, User, UserChanges, UserRecord, UserStore};

const USER_COLUMNS: &str = "id, email, user_name, phone, location, password_hash, \
                            is_active, is_staff, is_superuser, created_at, updated_at";

async fn with_timeout<T, F>(timeout: Duration, query: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    match tokio::time::timeout(timeout, query).await {
        Ok(result) => result.map_err(StoreError::from),
        Err(_) => {
            tracing::warn!(timeout_ms = timeout.as_millis() as u64, "Store call timed out");
            Err(StoreError::Timeout)
        }
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    email: String,
    user_name: String,
    phone: Option<String>,
    location: String,
    password_hash: Option<String>,
    is_active: bool,
    is_staff: bool,
    is_superuser: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<UserRow> for UserRecord {
    fn from(row: UserRow) -> Self {
        UserRecord {
            credential: Credential::from_stored(row.password_hash),
            user: User {
                id: row.id,
                email: row.email,
                user_name: row.user_name,
                phone: row.phone,
                location: row.location,
                is_active: row.is_active,
                is_staff: row.is_staff,
                is_superuser: row.is_superuser,
                created_at: row.created_at,
                updated_at: row.updated_at,
            },
        }
    }
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        UserRecord::from(row).user
    }
}

#[derive(Clone)]
pub struct PostgresUserStore {
    pool: PgPool,
    timeout: Duration,
}

impl PostgresUserStore {
    pub fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }
}

#[async_trait]
impl UserStore for PostgresUserStore {
    async fn insert(&self, new_user: NewUser) -> Result<User, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO users (email, user_name, phone, location, password_hash,
                               is_active, is_staff, is_superuser, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, true, $6, $7, $8, $8)
            RETURNING {}
            "#,
            USER_COLUMNS
        );

        let row = with_timeout(
            self.timeout,
            sqlx::query_as::<_, UserRow>(&sql)
                .bind(&new_user.email)
                .bind(&new_user.user_name)
                .bind(&new_user.phone)
                .bind(&new_user.location)
                .bind(new_user.credential.as_stored())
                .bind(new_user.is_staff)
                .bind(new_user.is_superuser)
                .bind(Utc::now())
                .fetch_one(&self.pool),
        )
        .await?;

        Ok(row.into())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        let sql = format!("SELECT {} FROM users WHERE lower(email) = lower($1)", USER_COLUMNS);

        let row = with_timeout(
            self.timeout,
            sqlx::query_as::<_, UserRow>(&sql)
                .bind(email.trim())
                .fetch_optional(&self.pool),
        )
        .await?;

        Ok(row.map(UserRecord::from))
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);

        let row = with_timeout(
            self.timeout,
            sqlx::query_as::<_, UserRow>(&sql).bind(id).fetch_optional(&self.pool),
        )
        .await?;

        Ok(row.map(User::from))
    }

    async fn list(&self) -> Result<Vec<User>, StoreError> {
        let sql = format!("SELECT {} FROM users ORDER BY id", USER_COLUMNS);

        let rows = with_timeout(
            self.timeout,
            sqlx::query_as::<_, UserRow>(&sql).fetch_all(&self.pool),
        )
        .await?;

        Ok(rows.into_iter().map(User::from).collect())
    }

    async fn update(&self, id: i64, changes: UserChanges) -> Result<User, StoreError> {
        let sql = format!(
            r#"
            UPDATE users SET
                email = COALESCE($2, email),
                user_name = COALESCE($3, user_name),
                phone = CASE WHEN $4 THEN $5 ELSE phone END,
                location = COALESCE($6, location),
                password_hash = CASE WHEN $7 THEN $8 ELSE password_hash END,
                is_active = COALESCE($9, is_active),
                updated_at = $10
            WHERE id = $1
            RETURNING {}
            "#,
            USER_COLUMNS
        );

        let credential_changed = changes.credential.is_some();
        let password_hash = changes
            .credential
            .as_ref()
            .and_then(|credential| credential.as_stored().map(str::to_string));

        let row = with_timeout(
            self.timeout,
            sqlx::query_as::<_, UserRow>(&sql)
                .bind(id)
                .bind(&changes.email)
                .bind(&changes.user_name)
                .bind(changes.phone.is_some())
                .bind(changes.phone.clone().flatten())
                .bind(&changes.location)
                .bind(credential_changed)
                .bind(password_hash)
                .bind(changes.is_active)
                .bind(Utc::now())
                .fetch_optional(&self.pool),
        )
        .await?;

        row.map(User::from)
            .ok_or_else(|| StoreError::NotFound("User".to_string()))
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        let result = with_timeout(
            self.timeout,
            sqlx::query("DELETE FROM users WHERE id = $1")
                .bind(id)
                .execute(&self.pool),
        )
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("User".to_string()));
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct PostgresRevocationRegistry {
    pool: PgPool,
    timeout: Duration,
}

impl PostgresRevocationRegistry {
    pub fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }
}

#[async_trait]
impl RevocationRegistry for PostgresRevocationRegistry {
    async fn revoke(
        &self,
        jti: &str,
        user_id: i64,
        expires_at: DateTime<Utc>,
    ) -> Result<RevokeOutcome, StoreError> {
        let result = with_timeout(
            self.timeout,
            sqlx::query(
                r#"
                INSERT INTO revoked_tokens (jti, user_id, revoked_at, expires_at)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (jti) DO NOTHING
                "#,
            )
            .bind(jti)
            .bind(user_id)
            .bind(Utc::now())
            .bind(expires_at)
            .execute(&self.pool),
        )
        .await?;

        if result.rows_affected() == 1 {
            Ok(RevokeOutcome::Revoked)
        } else {
            Ok(RevokeOutcome::AlreadyRevoked)
        }
    }

    async fn is_revoked(&self, jti: &str) -> Result<bool, StoreError> {
        with_timeout(
            self.timeout,
            sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS (SELECT 1 FROM revoked_tokens WHERE jti = $1)",
            )
            .bind(jti)
            .fetch_one(&self.pool),
        )
        .await
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = with_timeout(
            self.timeout,
            sqlx::query("DELETE FROM revoked_tokens WHERE expires_at < $1")
                .bind(now)
                .execute(&self.pool),
        )
        .await?;

        Ok(result.rows_affected())
    }
}
