//! Synchronizes the resolved identity into the store's request context.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::client::{StoreClientError, StoreTransport};

/// What to do when the store rate-limits a synchronization call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RateLimitPolicy {
    /// Record the sync as trusted-but-unconfirmed and report success, so
    /// repeated rate-limit responses do not retry on every trigger. Only
    /// safe while the store's row-level authorization is not enforcing.
    #[default]
    TrustUnconfirmed,
    /// Treat a rate-limited call like any other hard failure.
    Fail,
}

impl RateLimitPolicy {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TrustUnconfirmed => "trust_unconfirmed",
            Self::Fail => "fail",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BridgeConfig {
    pub rate_limit_policy: RateLimitPolicy,
}

/// Outcome of a synchronization pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The store's request identity matches the resolved user.
    /// `confirmed` is false when the store rate-limited the call and the
    /// bridge trusted it without confirmation.
    Authenticated { confirmed: bool },
    /// No resolved user; the store call was skipped and any prior sync
    /// state dropped.
    Unauthenticated,
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("identity synchronization failed: {0}")]
    Store(#[from] StoreClientError),
}

#[derive(Debug, Clone, Default)]
struct SyncState {
    last_synced_id: Option<String>,
    synced_at: Option<DateTime<Utc>>,
    confirmed: bool,
}

/// Observable bridge state for the application shell.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BridgeHealth {
    pub is_authenticated: bool,
    pub is_syncing: bool,
    pub last_synced_id: Option<String>,
    pub synced_at: Option<DateTime<Utc>>,
    pub confirmed: bool,
    pub last_error: Option<String>,
}

/// Keeps the store's request-scoped identity variable aligned with the
/// resolved user id while minimizing remote calls.
///
/// At most one remote call is issued per distinct id, per forced refresh.
/// Calls serialize on the sync state in arrival order, so a duplicate
/// trigger for the same id waits for the in-flight call and then
/// short-circuits against the updated state instead of issuing another;
/// a sign-out trigger queued behind an in-flight sign-in lands after it
/// and wins.
pub struct AuthSyncBridge {
    transport: Arc<dyn StoreTransport>,
    config: BridgeConfig,
    state: Mutex<SyncState>,
    health: RwLock<BridgeHealth>,
}

impl AuthSyncBridge {
    pub fn new(transport: Arc<dyn StoreTransport>, config: BridgeConfig) -> Self {
        Self {
            transport,
            config,
            state: Mutex::new(SyncState::default()),
            health: RwLock::new(BridgeHealth::default()),
        }
    }

    /// Aligns the store's request identity with `current_id`.
    pub async fn synchronize(
        &self,
        current_id: Option<&str>,
        force: bool,
    ) -> Result<SyncOutcome, SyncError> {
        let mut state = self.state.lock().await;

        let Some(user_id) = current_id else {
            if state.last_synced_id.is_some() {
                tracing::debug!("no resolved user, dropping sync state");
            }
            *state = SyncState::default();
            self.publish_health(&state, false, None);
            return Ok(SyncOutcome::Unauthenticated);
        };

        if !force && state.last_synced_id.as_deref() == Some(user_id) {
            return Ok(SyncOutcome::Authenticated {
                confirmed: state.confirmed,
            });
        }

        self.mark_syncing();
        let result = self.transport.set_request_identity(user_id).await;
        match result {
            Ok(()) => {
                *state = SyncState {
                    last_synced_id: Some(user_id.to_string()),
                    synced_at: Some(Utc::now()),
                    confirmed: true,
                };
                self.publish_health(&state, true, None);
                Ok(SyncOutcome::Authenticated { confirmed: true })
            }
            Err(error)
                if error.is_rate_limited()
                    && self.config.rate_limit_policy == RateLimitPolicy::TrustUnconfirmed =>
            {
                tracing::warn!(error = %error, user = %user_id, "store rate-limited identity sync, trusting unconfirmed");
                *state = SyncState {
                    last_synced_id: Some(user_id.to_string()),
                    synced_at: Some(Utc::now()),
                    confirmed: false,
                };
                self.publish_health(&state, true, Some(error.to_string()));
                Ok(SyncOutcome::Authenticated { confirmed: false })
            }
            Err(error) => {
                // Sync state stays untouched so the next attempt retries.
                self.publish_health(&state, false, Some(error.to_string()));
                Err(SyncError::Store(error))
            }
        }
    }

    /// Manual recovery: one remote call for `current_id` regardless of the
    /// de-duplication state.
    pub async fn force_refresh(&self, current_id: Option<&str>) -> Result<SyncOutcome, SyncError> {
        self.synchronize(current_id, true).await
    }

    #[must_use]
    pub fn health(&self) -> BridgeHealth {
        self.health
            .read()
            .map_or_else(|_| BridgeHealth::default(), |health| health.clone())
    }

    fn mark_syncing(&self) {
        if let Ok(mut health) = self.health.write() {
            health.is_syncing = true;
        }
    }

    fn publish_health(&self, state: &SyncState, is_authenticated: bool, last_error: Option<String>) {
        if let Ok(mut health) = self.health.write() {
            *health = BridgeHealth {
                is_authenticated,
                is_syncing: false,
                last_synced_id: state.last_synced_id.clone(),
                synced_at: state.synced_at,
                confirmed: state.confirmed,
                last_error,
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;

    use async_trait::async_trait;
    use reqwest::StatusCode;
    use tokio::sync::Mutex;

    use super::{AuthSyncBridge, BridgeConfig, RateLimitPolicy, SyncOutcome};
    use crate::activity::ActivityRecord;
    use crate::client::{StoreClientError, StoreTransport};

    #[derive(Default)]
    struct RecordingTransport {
        identity_calls: Mutex<Vec<String>>,
        /// Scripted failures consumed in order; absence means success.
        failures: Mutex<VecDeque<StoreClientError>>,
    }

    impl RecordingTransport {
        fn with_failures(failures: Vec<StoreClientError>) -> Self {
            Self {
                identity_calls: Mutex::new(Vec::new()),
                failures: Mutex::new(failures.into()),
            }
        }

        async fn calls(&self) -> Vec<String> {
            self.identity_calls.lock().await.clone()
        }
    }

    #[async_trait]
    impl StoreTransport for RecordingTransport {
        async fn set_request_identity(&self, user_id: &str) -> Result<(), StoreClientError> {
            self.identity_calls.lock().await.push(user_id.to_string());
            match self.failures.lock().await.pop_front() {
                Some(error) => Err(error),
                None => Ok(()),
            }
        }

        async fn record_activity(&self, _record: &ActivityRecord) -> Result<(), StoreClientError> {
            Ok(())
        }
    }

    fn rate_limited() -> StoreClientError {
        StoreClientError::RateLimited {
            status: StatusCode::TOO_MANY_REQUESTS,
        }
    }

    fn server_error() -> StoreClientError {
        StoreClientError::Http {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: "boom".to_string(),
        }
    }

    fn bridge_over(transport: Arc<RecordingTransport>) -> AuthSyncBridge {
        AuthSyncBridge::new(transport, BridgeConfig::default())
    }

    #[tokio::test]
    async fn repeated_syncs_for_same_user_issue_one_call() {
        let transport = Arc::new(RecordingTransport::default());
        let bridge = bridge_over(Arc::clone(&transport));

        for _ in 0..3 {
            let outcome = bridge.synchronize(Some("user_1"), false).await;
            assert!(matches!(
                outcome,
                Ok(SyncOutcome::Authenticated { confirmed: true })
            ));
        }
        assert_eq!(transport.calls().await, vec!["user_1".to_string()]);
    }

    #[tokio::test]
    async fn missing_user_short_circuits_and_drops_state() {
        let transport = Arc::new(RecordingTransport::default());
        let bridge = bridge_over(Arc::clone(&transport));

        bridge
            .synchronize(Some("user_1"), false)
            .await
            .expect("first sync");
        let outcome = bridge.synchronize(None, false).await.expect("signed out");
        assert_eq!(outcome, SyncOutcome::Unauthenticated);
        assert!(!bridge.health().is_authenticated);

        // Same user again is a fresh sync, not a cache hit.
        bridge
            .synchronize(Some("user_1"), false)
            .await
            .expect("re-sync");
        assert_eq!(transport.calls().await.len(), 2);
    }

    #[tokio::test]
    async fn user_switch_issues_exactly_one_new_call() {
        let transport = Arc::new(RecordingTransport::default());
        let bridge = bridge_over(Arc::clone(&transport));

        bridge
            .synchronize(Some("user_a"), false)
            .await
            .expect("sync a");
        bridge
            .synchronize(Some("user_b"), false)
            .await
            .expect("sync b");
        bridge
            .synchronize(Some("user_b"), false)
            .await
            .expect("repeat b");
        assert_eq!(
            transport.calls().await,
            vec!["user_a".to_string(), "user_b".to_string()]
        );
    }

    #[tokio::test]
    async fn force_bypasses_deduplication() {
        let transport = Arc::new(RecordingTransport::default());
        let bridge = bridge_over(Arc::clone(&transport));

        bridge
            .synchronize(Some("user_1"), false)
            .await
            .expect("sync");
        bridge.force_refresh(Some("user_1")).await.expect("refresh");
        assert_eq!(transport.calls().await.len(), 2);
    }

    #[tokio::test]
    async fn rate_limit_reads_as_trusted_unconfirmed_success() {
        let transport = Arc::new(RecordingTransport::with_failures(vec![rate_limited()]));
        let bridge = bridge_over(Arc::clone(&transport));

        let outcome = bridge
            .synchronize(Some("user_1"), false)
            .await
            .expect("rate-limited sync");
        assert_eq!(outcome, SyncOutcome::Authenticated { confirmed: false });

        // Subsequent non-forced calls do not retry.
        let repeat = bridge
            .synchronize(Some("user_1"), false)
            .await
            .expect("repeat");
        assert_eq!(repeat, SyncOutcome::Authenticated { confirmed: false });
        assert_eq!(transport.calls().await.len(), 1);

        let health = bridge.health();
        assert!(health.is_authenticated);
        assert!(!health.confirmed);
        assert!(health.last_error.is_some());
    }

    #[tokio::test]
    async fn rate_limit_fails_under_fail_policy() {
        let transport = Arc::new(RecordingTransport::with_failures(vec![rate_limited()]));
        let bridge = AuthSyncBridge::new(
            Arc::clone(&transport) as Arc<dyn StoreTransport>,
            BridgeConfig {
                rate_limit_policy: RateLimitPolicy::Fail,
            },
        );

        assert!(bridge.synchronize(Some("user_1"), false).await.is_err());
        assert!(!bridge.health().is_authenticated);

        // State untouched, so the next trigger retries and can recover.
        bridge
            .synchronize(Some("user_1"), false)
            .await
            .expect("recovery");
        assert_eq!(transport.calls().await.len(), 2);
        assert!(bridge.health().is_authenticated);
    }

    #[tokio::test]
    async fn hard_failure_leaves_state_for_retry() {
        let transport = Arc::new(RecordingTransport::with_failures(vec![server_error()]));
        let bridge = bridge_over(Arc::clone(&transport));

        assert!(bridge.synchronize(Some("user_1"), false).await.is_err());
        let degraded = bridge.health();
        assert!(!degraded.is_authenticated);
        assert!(degraded.last_synced_id.is_none());

        let outcome = bridge
            .synchronize(Some("user_1"), false)
            .await
            .expect("recovery");
        assert_eq!(outcome, SyncOutcome::Authenticated { confirmed: true });
        assert_eq!(transport.calls().await.len(), 2);
        assert!(bridge.health().is_authenticated);
    }

    #[tokio::test]
    async fn concurrent_triggers_for_same_user_collapse() {
        let transport = Arc::new(RecordingTransport::default());
        let bridge = bridge_over(Arc::clone(&transport));

        let (first, second) = tokio::join!(
            bridge.synchronize(Some("user_1"), false),
            bridge.synchronize(Some("user_1"), false),
        );
        assert!(first.is_ok());
        assert!(second.is_ok());
        assert_eq!(transport.calls().await, vec!["user_1".to_string()]);
    }
}
