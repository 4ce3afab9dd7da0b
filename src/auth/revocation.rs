/// Refresh Token Revocation
///
/// Tracks token ids (`jti`) that must no longer be accepted. Entries are
/// written on rotation and on logout and can be purged once the token they
/// describe has expired on its own.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;

/// Result of a `revoke` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevokeOutcome {
    /// This call performed the transition
    Revoked,
    /// Someone revoked the token earlier
    AlreadyRevoked,
}

#[async_trait]
pub trait RevocationRegistry: Send + Sync + 'static {
    /// Mark `jti` as revoked.
    ///
    /// The transition is atomic: of several concurrent callers for the same
    /// `jti`, exactly one observes `Revoked`.
    async fn revoke(
        &self,
        jti: &str,
        user_id: i64,
        expires_at: DateTime<Utc>,
    ) -> Result<RevokeOutcome, StoreError>;

    async fn is_revoked(&self, jti: &str) -> Result<bool, StoreError>;

    /// Drop records whose token expired before `now`; returns how many went
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;
}

const MIN_PURGE_INTERVAL: Duration = Duration::from_secs(1);

/// Run `purge_expired` every `interval` for the lifetime of the process.
///
/// The first purge runs immediately. Intervals below one second are raised
/// to one second.
pub fn spawn_purge_task(
    registry: Arc<dyn RevocationRegistry>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    let interval = interval.max(MIN_PURGE_INTERVAL);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match registry.purge_expired(Utc::now()).await {
                Ok(0) => tracing::debug!("No expired revocation records to purge"),
                Ok(purged) => tracing::info!(purged = purged, "Purged expired revocation records"),
                Err(e) => tracing::warn!(error = %e, "Failed to purge revocation records"),
            }
        }
    })
}
