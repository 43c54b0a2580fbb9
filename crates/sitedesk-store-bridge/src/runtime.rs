//! Wires the identity context to the store bridge under the trigger policy.

use std::sync::Arc;

use sitedesk_identity::{
    IdentityContext, IdentityProvider, ProviderError, ProviderSignals, ResolvedAuthState,
};
use tokio::sync::Mutex;

use crate::activity::ActivityRecorder;
use crate::bridge::{AuthSyncBridge, BridgeHealth, SyncError, SyncOutcome};

/// Application-facing session surface: one identity context, one bridge,
/// one activity recorder.
///
/// Synchronization fires only when the provider-resolved user id
/// transitions, never per render and never on a timer; periodic
/// re-synchronization is deliberately absent to respect the store's rate
/// limits. Manual recovery goes through [`refresh`](SessionRuntime::refresh).
pub struct SessionRuntime<P: IdentityProvider> {
    context: Arc<IdentityContext<P>>,
    bridge: AuthSyncBridge,
    activity: ActivityRecorder,
    last_triggered_id: Mutex<Option<String>>,
}

impl<P: IdentityProvider> SessionRuntime<P> {
    pub fn new(
        context: Arc<IdentityContext<P>>,
        bridge: AuthSyncBridge,
        activity: ActivityRecorder,
    ) -> Self {
        Self {
            context,
            bridge,
            activity,
            last_triggered_id: Mutex::new(None),
        }
    }

    /// Bootstraps the context from the session cache. Call once at startup.
    pub async fn bootstrap(&self) -> ResolvedAuthState {
        self.context.bootstrap().await
    }

    /// Feeds one provider signal change through reconciliation and, when
    /// the resolved id transitioned, through synchronization.
    pub async fn handle_signals(
        &self,
        signals: &ProviderSignals,
    ) -> Result<ResolvedAuthState, SyncError> {
        let outcome = self.context.apply_signals(signals).await;
        if !outcome.state.is_loaded {
            return Ok(outcome.state);
        }

        let current = outcome.state.user_id().map(str::to_string);
        let previous = {
            let mut last = self.last_triggered_id.lock().await;
            if *last == current {
                return Ok(outcome.state);
            }
            std::mem::replace(&mut *last, current.clone())
        };

        // Emit the logout for the outgoing user before the store's request
        // identity is repointed, while its rows are still writable.
        if let Some(user) = previous.as_deref() {
            self.activity.logout(user).await;
        }

        if let Err(error) = self.bridge.synchronize(current.as_deref(), false).await {
            // Roll the trigger memory back so the next signal event
            // retries instead of silently staying degraded.
            let mut last = self.last_triggered_id.lock().await;
            if *last == current {
                *last = previous;
            }
            return Err(error);
        }

        if let Some(user) = current.as_deref() {
            self.activity.login(user).await;
        }
        Ok(outcome.state)
    }

    /// Manual recovery: forces one resynchronization for the currently
    /// resolved user.
    pub async fn refresh(&self) -> Result<SyncOutcome, SyncError> {
        let state = self.context.state().await;
        let current = state.user_id().map(str::to_string);
        {
            let mut last = self.last_triggered_id.lock().await;
            *last = current.clone();
        }
        self.bridge.force_refresh(current.as_deref()).await
    }

    /// Clears the local session, drops the store-side sync state, and
    /// delegates sign-out to the provider.
    ///
    /// The provider's resulting signal change drives the signed-out state
    /// through [`handle_signals`](SessionRuntime::handle_signals).
    pub async fn sign_out(&self) -> Result<(), ProviderError> {
        let state = self.context.state().await;
        if let Some(user) = state.user_id() {
            self.activity.logout(user).await;
        }
        {
            let mut last = self.last_triggered_id.lock().await;
            *last = None;
        }
        let _ = self.bridge.synchronize(None, false).await;
        self.context.sign_out().await
    }

    /// Records a page view for the signed-in user; a no-op while signed
    /// out.
    pub async fn record_page_view(&self, route: &str) {
        if let Some(user) = self.context.state().await.user_id() {
            self.activity.page_view(user, route).await;
        }
    }

    /// Caller-driven session heartbeat; a no-op while signed out.
    pub async fn heartbeat(&self) {
        if let Some(user) = self.context.state().await.user_id() {
            self.activity.heartbeat(user).await;
        }
    }

    pub async fn auth_state(&self) -> ResolvedAuthState {
        self.context.state().await
    }

    #[must_use]
    pub fn bridge_health(&self) -> BridgeHealth {
        self.bridge.health()
    }

    pub async fn token(&self) -> Option<String> {
        self.context.token().await
    }
}
