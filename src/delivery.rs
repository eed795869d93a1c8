//! Delivery coordination
//!
//! The [`DeliveryCoordinator`] owns the device-facing protocol: session
//! authentication, the availability listing, claiming deliveries, and
//! recording outcomes. All state transitions go through the database's
//! compare-and-set updates, so concurrent requests for the same
//! (device, artifact) pair resolve to exactly one winner.

use std::collections::HashMap;
use std::sync::Arc;

use rand::Rng;
use sha2::{Digest, Sha256};
use tokio::sync::{RwLock, broadcast};

use crate::blob::BlobStore;
use crate::config::DeliveryConfig;
use crate::db::{ArtifactRow, Database, SyncLogRow};
use crate::error::{DeliveryError, Error, Result};
use crate::retry::backoff_delay;
use crate::types::{ArtifactId, AvailableArtifact, DeliveryOutcome, Event, SyncState};

/// An authenticated device session
#[derive(Debug, Clone)]
struct Session {
    device_id: String,
    expires_at: i64,
}

/// A claimed delivery: the artifact metadata plus a reader over its bytes
#[derive(Debug)]
pub struct DeliveryStream {
    /// The artifact being delivered
    pub artifact: ArtifactRow,
    /// Reader over the artifact bytes
    pub reader: tokio::fs::File,
}

/// Coordinates deliveries to registered devices
#[derive(Clone)]
pub struct DeliveryCoordinator {
    db: Arc<Database>,
    blobs: Arc<dyn BlobStore>,
    config: DeliveryConfig,
    sessions: Arc<RwLock<HashMap<String, Session>>>,
    events: broadcast::Sender<Event>,
}

impl DeliveryCoordinator {
    /// Create a coordinator
    pub fn new(
        db: Arc<Database>,
        blobs: Arc<dyn BlobStore>,
        config: DeliveryConfig,
        events: broadcast::Sender<Event>,
    ) -> Self {
        Self {
            db,
            blobs,
            config,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            events,
        }
    }

    /// Authenticate a device and mint a session token
    ///
    /// Unknown devices and bad secrets produce the same error, so the
    /// response does not reveal which ids are registered.
    pub async fn authenticate(&self, device_id: &str, secret: &str) -> Result<String> {
        let auth_err = || Error::Auth {
            device_id: device_id.to_string(),
        };

        let device = self.db.get_device(device_id).await?.ok_or_else(auth_err)?;

        let presented = hash_secret(secret);
        if !constant_time_eq(presented.as_bytes(), device.secret_hash.as_bytes()) {
            tracing::warn!(device_id, "Device authentication failed");
            return Err(auth_err());
        }

        let now = chrono::Utc::now().timestamp();
        self.db.touch_device_seen(device_id, now).await?;

        let token = generate_token();
        let expires_at = now + self.config.session_ttl.as_secs() as i64;
        {
            let mut sessions = self.sessions.write().await;
            // Sweep dead tokens here so the map never outgrows the set of
            // devices that authenticated within one TTL
            sessions.retain(|_, s| s.expires_at > now);
            sessions.insert(
                token.clone(),
                Session {
                    device_id: device_id.to_string(),
                    expires_at,
                },
            );
        }

        tracing::info!(device_id, "Device authenticated");
        Ok(token)
    }

    /// Resolve a session token to its device id
    ///
    /// Expired tokens are removed and rejected.
    pub async fn resolve_session(&self, token: &str) -> Result<String> {
        let now = chrono::Utc::now().timestamp();

        {
            let sessions = self.sessions.read().await;
            match sessions.get(token) {
                Some(session) if session.expires_at > now => {
                    return Ok(session.device_id.clone());
                }
                Some(_) => {}
                None => return Err(Error::Delivery(DeliveryError::InvalidSession)),
            }
        }

        // Expired: drop it under the write lock
        self.sessions.write().await.remove(token);
        Err(Error::Delivery(DeliveryError::InvalidSession))
    }

    /// Artifacts the device can download right now
    ///
    /// A pure read: listing never changes any delivery state.
    pub async fn list_available(&self, device_id: &str) -> Result<Vec<AvailableArtifact>> {
        let now = chrono::Utc::now().timestamp();
        self.db.list_available_artifacts(device_id, now).await
    }

    /// Claim a delivery and open the artifact for streaming
    ///
    /// Transitions the (device, artifact) ledger row to IN_FLIGHT. Exactly
    /// one concurrent caller wins the claim; losers get an error naming the
    /// actual state they lost to.
    pub async fn begin_delivery(
        &self,
        device_id: &str,
        artifact_id: ArtifactId,
    ) -> Result<DeliveryStream> {
        let artifact = self
            .db
            .get_artifact(artifact_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("artifact {artifact_id}")))?;

        self.db.ensure_sync_log(device_id, artifact_id).await?;

        let now = chrono::Utc::now().timestamp();
        if !self.db.try_begin_delivery(device_id, artifact_id, now).await? {
            return Err(self.claim_failure(device_id, artifact_id).await?);
        }

        let reader = match self.blobs.open(&artifact.content_hash).await {
            Ok(reader) => reader,
            Err(e) => {
                // Undo the claim so the artifact stays deliverable
                let retry_at = now + backoff_delay(&self.config, 1).as_secs() as i64;
                self.db
                    .fail_delivery(
                        device_id,
                        artifact_id,
                        SyncState::Failed,
                        "blob unavailable",
                        Some(retry_at),
                        now,
                    )
                    .await?;
                return Err(e);
            }
        };

        let attempt = self
            .db
            .get_sync_log(device_id, artifact_id)
            .await?
            .map(|r| r.attempts as u32 + 1)
            .unwrap_or(1);

        tracing::info!(device_id, artifact_id = %artifact_id, attempt, "Delivery started");
        let _ = self.events.send(Event::DeliveryStarted {
            device_id: device_id.to_string(),
            artifact_id,
            attempt,
        });

        Ok(DeliveryStream { artifact, reader })
    }

    /// Map a lost claim to the precise protocol error
    async fn claim_failure(&self, device_id: &str, artifact_id: ArtifactId) -> Result<Error> {
        let row = self
            .db
            .get_sync_log(device_id, artifact_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("sync log for artifact {artifact_id}")))?;

        let err = match SyncState::from_i32(row.state) {
            SyncState::InFlight => DeliveryError::AlreadyInFlight {
                device_id: device_id.to_string(),
                artifact_id,
            },
            SyncState::Delivered => DeliveryError::AlreadyDelivered {
                device_id: device_id.to_string(),
                artifact_id,
            },
            SyncState::Abandoned => DeliveryError::Abandoned {
                device_id: device_id.to_string(),
                artifact_id,
                attempts: row.attempts as u32,
            },
            SyncState::Failed => DeliveryError::BackoffPending {
                device_id: device_id.to_string(),
                artifact_id,
                retry_at: row.next_retry_at.unwrap_or(i64::MAX),
            },
            // PENDING rows are always claimable, so losing to one means the
            // row changed between the claim and this read. Report it as-is.
            SyncState::Pending => DeliveryError::InvalidState {
                device_id: device_id.to_string(),
                artifact_id,
                operation: "begin delivery".to_string(),
                state: SyncState::Pending.to_string(),
            },
        };

        Ok(Error::Delivery(err))
    }

    /// Record the outcome of an IN_FLIGHT delivery
    ///
    /// Success transitions to DELIVERED. Failure and timeout transition to
    /// FAILED with a backoff, or ABANDONED once the attempt budget is spent.
    /// Returns the resulting state.
    pub async fn report_outcome(
        &self,
        device_id: &str,
        artifact_id: ArtifactId,
        outcome: DeliveryOutcome,
    ) -> Result<SyncState> {
        let row = self
            .db
            .get_sync_log(device_id, artifact_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("sync log for artifact {artifact_id}")))?;

        if SyncState::from_i32(row.state) != SyncState::InFlight {
            return Err(Error::Delivery(DeliveryError::InvalidState {
                device_id: device_id.to_string(),
                artifact_id,
                operation: "report outcome".to_string(),
                state: SyncState::from_i32(row.state).to_string(),
            }));
        }

        let now = chrono::Utc::now().timestamp();

        match outcome {
            DeliveryOutcome::Success => {
                if !self.db.complete_delivery(device_id, artifact_id, now).await? {
                    return Err(Error::Delivery(DeliveryError::InvalidState {
                        device_id: device_id.to_string(),
                        artifact_id,
                        operation: "report outcome".to_string(),
                        state: "changed concurrently".to_string(),
                    }));
                }
                tracing::info!(device_id, artifact_id = %artifact_id, "Delivery completed");
                let _ = self.events.send(Event::Delivered {
                    device_id: device_id.to_string(),
                    artifact_id,
                });
                Ok(SyncState::Delivered)
            }
            outcome => {
                let message = outcome
                    .error_message()
                    .unwrap_or_else(|| "delivery failed".to_string());
                self.fail_in_flight(&row, &message, now).await
            }
        }
    }

    /// Fail an IN_FLIGHT row: FAILED with backoff, or ABANDONED at the cap
    async fn fail_in_flight(&self, row: &SyncLogRow, message: &str, now: i64) -> Result<SyncState> {
        let artifact_id = ArtifactId(row.artifact_id);
        let attempts_after = row.attempts as u32 + 1;

        let (new_state, next_retry_at) = if attempts_after >= self.config.max_attempts {
            (SyncState::Abandoned, None)
        } else {
            let delay = backoff_delay(&self.config, attempts_after);
            (SyncState::Failed, Some(now + delay.as_secs() as i64))
        };

        let applied = self
            .db
            .fail_delivery(
                &row.device_id,
                artifact_id,
                new_state,
                message,
                next_retry_at,
                now,
            )
            .await?;
        if !applied {
            return Err(Error::Delivery(DeliveryError::InvalidState {
                device_id: row.device_id.clone(),
                artifact_id,
                operation: "fail delivery".to_string(),
                state: "changed concurrently".to_string(),
            }));
        }

        match new_state {
            SyncState::Abandoned => {
                tracing::warn!(
                    device_id = %row.device_id,
                    artifact_id = %artifact_id,
                    attempts = attempts_after,
                    "Delivery abandoned"
                );
                let _ = self.events.send(Event::DeliveryAbandoned {
                    device_id: row.device_id.clone(),
                    artifact_id,
                    attempts: attempts_after,
                });
            }
            _ => {
                tracing::info!(
                    device_id = %row.device_id,
                    artifact_id = %artifact_id,
                    attempts = attempts_after,
                    error = message,
                    "Delivery failed, will retry"
                );
                let _ = self.events.send(Event::DeliveryFailed {
                    device_id: row.device_id.clone(),
                    artifact_id,
                    attempts: attempts_after,
                    error: message.to_string(),
                });
            }
        }

        Ok(new_state)
    }

    /// Fail IN_FLIGHT deliveries whose lease expired before `now`
    ///
    /// Called by the retry sweep. Returns how many leases were expired.
    pub async fn expire_stale_leases(&self, now: i64) -> Result<usize> {
        let cutoff = now - self.config.lease.as_secs() as i64;
        let stale = self.db.list_expired_leases(cutoff).await?;
        let count = stale.len();

        for row in stale {
            tracing::warn!(
                device_id = %row.device_id,
                artifact_id = row.artifact_id,
                "Expiring stale delivery lease"
            );
            // A concurrent outcome report may beat the sweep to the row;
            // fail_in_flight's CAS makes that race harmless, so the error
            // for this row is logged and the sweep moves on.
            if let Err(e) = self.fail_in_flight(&row, "delivery lease expired", now).await {
                tracing::debug!(error = %e, "Lease already resolved");
            }
        }

        Ok(count)
    }
}

fn hash_secret(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Hash a device secret for storage
pub fn secret_hash_for_storage(secret: &str) -> String {
    hash_secret(secret)
}

/// Random 32-hex session token
fn generate_token() -> String {
    let mut rng = rand::thread_rng();
    (0..32)
        .map(|_| format!("{:x}", rng.gen_range(0..16)))
        .collect()
}

/// Constant-time byte comparison, so timing doesn't leak how much of a
/// credential matched
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tempfile::NamedTempFile;

    use super::*;
    use crate::blob::FsBlobStore;
    use crate::db::NewArtifact;

    struct Fixture {
        coordinator: DeliveryCoordinator,
        db: Arc<Database>,
        _db_file: NamedTempFile,
        _blob_dir: tempfile::TempDir,
    }

    async fn fixture(config: DeliveryConfig) -> Fixture {
        let db_file = NamedTempFile::new().unwrap();
        let blob_dir = tempfile::tempdir().unwrap();
        let db = Arc::new(Database::new(db_file.path()).await.unwrap());
        let blobs = Arc::new(FsBlobStore::new(blob_dir.path()).await.unwrap());
        let (events, _) = broadcast::channel(64);

        let coordinator =
            DeliveryCoordinator::new(db.clone(), blobs.clone(), config, events);
        Fixture {
            coordinator,
            db,
            _db_file: db_file,
            _blob_dir: blob_dir,
        }
    }

    async fn register_artifact(f: &Fixture, bytes: &[u8]) -> ArtifactId {
        let hash = FsBlobStore::hash_bytes(bytes);
        f.coordinator.blobs.put(bytes).await.unwrap();
        f.db.insert_artifact(&NewArtifact {
            kind: 1,
            title: "Digest".to_string(),
            author: None,
            content_hash: hash,
            size_bytes: bytes.len() as i64,
        })
        .await
        .unwrap()
    }

    async fn register_device(f: &Fixture, id: &str, secret: &str) {
        f.db.insert_device(id, None, &hash_secret(secret))
            .await
            .unwrap();
    }

    fn fast_config() -> DeliveryConfig {
        DeliveryConfig {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(60),
            max_backoff: Duration::from_secs(600),
            backoff_multiplier: 2.0,
            jitter: false,
            lease: Duration::from_secs(300),
            ..DeliveryConfig::default()
        }
    }

    #[tokio::test]
    async fn test_authenticate_and_resolve() {
        let f = fixture(fast_config()).await;
        register_device(&f, "kindle-1", "hunter2").await;

        let token = f.coordinator.authenticate("kindle-1", "hunter2").await.unwrap();
        assert_eq!(token.len(), 32);

        let device = f.coordinator.resolve_session(&token).await.unwrap();
        assert_eq!(device, "kindle-1");

        let seen = f.db.get_device("kindle-1").await.unwrap().unwrap();
        assert!(seen.last_seen_at.is_some());
    }

    #[tokio::test]
    async fn test_bad_credentials_rejected_uniformly() {
        let f = fixture(fast_config()).await;
        register_device(&f, "kindle-1", "hunter2").await;

        let wrong = f.coordinator.authenticate("kindle-1", "wrong").await.unwrap_err();
        let unknown = f.coordinator.authenticate("ghost", "hunter2").await.unwrap_err();

        assert!(matches!(wrong, Error::Auth { .. }));
        assert!(matches!(unknown, Error::Auth { .. }));
        assert_eq!(wrong.to_string().replace("kindle-1", "ghost"), unknown.to_string());
    }

    #[tokio::test]
    async fn test_authenticate_sweeps_expired_sessions() {
        let f = fixture(fast_config()).await;
        register_device(&f, "kindle-1", "s").await;

        f.coordinator.sessions.write().await.insert(
            "stale".to_string(),
            Session {
                device_id: "kindle-1".to_string(),
                expires_at: 0,
            },
        );

        let token = f.coordinator.authenticate("kindle-1", "s").await.unwrap();

        let sessions = f.coordinator.sessions.read().await;
        assert!(sessions.contains_key(&token));
        // The dead token is gone without ever being looked up
        assert!(!sessions.contains_key("stale"));
        assert_eq!(sessions.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_token_rejected() {
        let f = fixture(fast_config()).await;
        let err = f.coordinator.resolve_session("deadbeef").await.unwrap_err();
        assert!(matches!(
            err,
            Error::Delivery(DeliveryError::InvalidSession)
        ));
    }

    #[tokio::test]
    async fn test_full_delivery_round_trip() {
        let f = fixture(fast_config()).await;
        register_device(&f, "kindle-1", "s").await;
        let artifact = register_artifact(&f, b"digest content").await;

        let available = f.coordinator.list_available("kindle-1").await.unwrap();
        assert_eq!(available.len(), 1);

        let stream = f.coordinator.begin_delivery("kindle-1", artifact).await.unwrap();
        assert_eq!(stream.artifact.id, artifact.0);

        // In flight: hidden from the listing
        assert!(f.coordinator.list_available("kindle-1").await.unwrap().is_empty());

        let state = f
            .coordinator
            .report_outcome("kindle-1", artifact, DeliveryOutcome::Success)
            .await
            .unwrap();
        assert_eq!(state, SyncState::Delivered);

        // Delivered: permanently gone from this device's listing
        assert!(f.coordinator.list_available("kindle-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_begin_has_one_winner() {
        let f = fixture(fast_config()).await;
        register_device(&f, "kindle-1", "s").await;
        let artifact = register_artifact(&f, b"digest content").await;

        let (a, b) = tokio::join!(
            f.coordinator.begin_delivery("kindle-1", artifact),
            f.coordinator.begin_delivery("kindle-1", artifact),
        );

        let wins = [a.is_ok(), b.is_ok()];
        assert_eq!(wins.iter().filter(|w| **w).count(), 1);

        let loser = if a.is_ok() { b } else { a };
        assert!(matches!(
            loser.unwrap_err(),
            Error::Delivery(DeliveryError::AlreadyInFlight { .. })
        ));
    }

    #[tokio::test]
    async fn test_failure_backs_off_then_abandons() {
        let f = fixture(fast_config()).await;
        register_device(&f, "kindle-1", "s").await;
        let artifact = register_artifact(&f, b"digest content").await;

        // Attempt 1: fail
        f.coordinator.begin_delivery("kindle-1", artifact).await.unwrap();
        let state = f
            .coordinator
            .report_outcome(
                "kindle-1",
                artifact,
                DeliveryOutcome::Failure {
                    message: "connection dropped".to_string(),
                },
            )
            .await
            .unwrap();
        assert_eq!(state, SyncState::Failed);

        let row = f.db.get_sync_log("kindle-1", artifact).await.unwrap().unwrap();
        assert_eq!(row.attempts, 1);
        let retry_at = row.next_retry_at.unwrap();
        assert!(retry_at > chrono::Utc::now().timestamp());

        // Not yet claimable; backoff is in the future
        let err = f.coordinator.begin_delivery("kindle-1", artifact).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Delivery(DeliveryError::BackoffPending { .. })
        ));

        // Force eligibility and burn the remaining attempts
        for expected_attempts in 2..=3 {
            sqlx::query("UPDATE sync_logs SET next_retry_at = 0 WHERE artifact_id = ?")
                .bind(artifact)
                .execute(f.db.pool())
                .await
                .unwrap();

            f.coordinator.begin_delivery("kindle-1", artifact).await.unwrap();
            let state = f
                .coordinator
                .report_outcome("kindle-1", artifact, DeliveryOutcome::Timeout)
                .await
                .unwrap();

            if expected_attempts < 3 {
                assert_eq!(state, SyncState::Failed);
            } else {
                assert_eq!(state, SyncState::Abandoned);
            }
        }

        // Abandoned is terminal
        let err = f.coordinator.begin_delivery("kindle-1", artifact).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Delivery(DeliveryError::Abandoned { attempts: 3, .. })
        ));
        assert!(f.coordinator.list_available("kindle-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_outcome_without_claim_is_invalid_state() {
        let f = fixture(fast_config()).await;
        register_device(&f, "kindle-1", "s").await;
        let artifact = register_artifact(&f, b"digest content").await;

        f.db.ensure_sync_log("kindle-1", artifact).await.unwrap();
        let err = f
            .coordinator
            .report_outcome("kindle-1", artifact, DeliveryOutcome::Success)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Delivery(DeliveryError::InvalidState { .. })
        ));
    }

    #[tokio::test]
    async fn test_lease_expiry_fails_stale_delivery() {
        let f = fixture(fast_config()).await;
        register_device(&f, "kindle-1", "s").await;
        let artifact = register_artifact(&f, b"digest content").await;

        f.coordinator.begin_delivery("kindle-1", artifact).await.unwrap();

        // Lease is 300s; pretend 10 minutes pass
        let future = chrono::Utc::now().timestamp() + 600;
        let expired = f.coordinator.expire_stale_leases(future).await.unwrap();
        assert_eq!(expired, 1);

        let row = f.db.get_sync_log("kindle-1", artifact).await.unwrap().unwrap();
        assert_eq!(row.state, SyncState::Failed.to_i32());
        assert_eq!(row.attempts, 1);
        assert_eq!(row.last_error, Some("delivery lease expired".to_string()));

        // Nothing stale on a second sweep
        assert_eq!(f.coordinator.expire_stale_leases(future).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_second_device_unaffected() {
        let f = fixture(fast_config()).await;
        register_device(&f, "kindle-1", "s").await;
        register_device(&f, "kindle-2", "s").await;
        let artifact = register_artifact(&f, b"digest content").await;

        f.coordinator.begin_delivery("kindle-1", artifact).await.unwrap();
        f.coordinator
            .report_outcome("kindle-1", artifact, DeliveryOutcome::Success)
            .await
            .unwrap();

        // Device 2 has its own independent ledger row
        assert_eq!(f.coordinator.list_available("kindle-2").await.unwrap().len(), 1);
        f.coordinator.begin_delivery("kindle-2", artifact).await.unwrap();
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
        assert!(constant_time_eq(b"", b""));
    }
}
