//! Process-wide identity state: reconciles the provider with the cache.

use tokio::sync::Mutex;

use crate::cache::SessionCache;
use crate::provider::{IdentityProvider, ProviderError};
use crate::snapshot::{IdentitySnapshot, ProviderSignals};

/// Where the context sits between cold start and a provider resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPhase {
    Bootstrapping,
    CachedOptimistic,
    WaitingOnProvider,
    SignedIn,
    SignedOut,
}

impl AuthPhase {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bootstrapping => "bootstrapping",
            Self::CachedOptimistic => "cached_optimistic",
            Self::WaitingOnProvider => "waiting_on_provider",
            Self::SignedIn => "signed_in",
            Self::SignedOut => "signed_out",
        }
    }

    #[must_use]
    pub fn is_resolved(self) -> bool {
        matches!(self, Self::SignedIn | Self::SignedOut)
    }
}

/// The single coherent auth view vended to the rest of the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAuthState {
    pub phase: AuthPhase,
    pub snapshot: Option<IdentitySnapshot>,
    pub is_loading: bool,
    pub is_loaded: bool,
}

impl ResolvedAuthState {
    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.snapshot.as_ref().map(|user| user.id.as_str())
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.snapshot.is_some()
    }
}

/// Result of one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub state: ResolvedAuthState,
    /// True when the provider-resolved user id transitioned: none to some,
    /// some to none, or a different id. Downstream synchronization keys
    /// off this, not off the number of reconciliation passes.
    pub identity_changed: bool,
}

#[derive(Debug)]
struct ContextState {
    phase: AuthPhase,
    snapshot: Option<IdentitySnapshot>,
    /// Id from the most recent provider-resolved reconciliation. Distinct
    /// from the held snapshot, which may have come from the cache.
    resolved_id: Option<String>,
    provider_loaded: bool,
    bootstrapped: bool,
}

/// Single source of truth for "who is signed in".
///
/// All reconciliation runs as a reaction to discrete events: the one-time
/// [`bootstrap`](IdentityContext::bootstrap) cache read, and
/// [`apply_signals`](IdentityContext::apply_signals) calls as the
/// provider's state changes. No timers, no background refresh.
pub struct IdentityContext<P: IdentityProvider> {
    provider: P,
    cache: SessionCache,
    inner: Mutex<ContextState>,
}

impl<P: IdentityProvider> IdentityContext<P> {
    pub fn new(provider: P, cache: SessionCache) -> Self {
        Self {
            provider,
            cache,
            inner: Mutex::new(ContextState {
                phase: AuthPhase::Bootstrapping,
                snapshot: None,
                resolved_id: None,
                provider_loaded: false,
                bootstrapped: false,
            }),
        }
    }

    /// One-time cache read, before any provider-driven reconciliation.
    ///
    /// A fresh cached snapshot is shown optimistically while the provider
    /// keeps loading; repeated calls are no-ops.
    pub async fn bootstrap(&self) -> ResolvedAuthState {
        let mut state = self.inner.lock().await;
        if !state.bootstrapped {
            state.bootstrapped = true;
            match self.cache.load() {
                Some(user) => {
                    tracing::debug!(user = %user.id, "identity restored from cache");
                    state.snapshot = Some(user);
                    state.phase = AuthPhase::CachedOptimistic;
                }
                None => {
                    state.phase = AuthPhase::WaitingOnProvider;
                }
            }
        }
        resolved_view(&state)
    }

    /// Applies a provider signal change.
    ///
    /// Idempotent: re-applying unchanged signals produces no cache writes
    /// and reports `identity_changed = false`. The cache write lands
    /// before the outcome is returned, so no reader of the outcome can
    /// observe a resolved id ahead of the cache.
    pub async fn apply_signals(&self, signals: &ProviderSignals) -> ReconcileOutcome {
        let mut state = self.inner.lock().await;
        if !state.bootstrapped {
            // Signals arriving before bootstrap() still reconcile; the
            // cache read is simply forfeited.
            state.bootstrapped = true;
            state.phase = AuthPhase::WaitingOnProvider;
        }

        if !signals.resolved() {
            state.provider_loaded = false;
            if state.snapshot.is_none() {
                state.phase = AuthPhase::WaitingOnProvider;
            }
            return ReconcileOutcome {
                state: resolved_view(&state),
                identity_changed: false,
            };
        }

        state.provider_loaded = true;
        if signals.signed_in {
            let Some(user) = signals.current_user.as_ref() else {
                // Provider claims a signed-in session without a user
                // record. Fail safe: keep the previous resolved state.
                tracing::warn!("provider reported signed-in without a user, keeping prior state");
                return ReconcileOutcome {
                    state: resolved_view(&state),
                    identity_changed: false,
                };
            };
            let held_id = state.snapshot.as_ref().map(|held| held.id.clone());
            if held_id.as_deref() != Some(user.id.as_str()) {
                state.snapshot = Some(user.clone());
                self.cache.save(Some(user));
            }
            let identity_changed = state.resolved_id.as_deref() != Some(user.id.as_str());
            state.resolved_id = Some(user.id.clone());
            state.phase = AuthPhase::SignedIn;
            ReconcileOutcome {
                state: resolved_view(&state),
                identity_changed,
            }
        } else {
            if state.snapshot.is_some() || state.phase != AuthPhase::SignedOut {
                state.snapshot = None;
                self.cache.clear();
            }
            let identity_changed = state.resolved_id.is_some();
            state.resolved_id = None;
            state.phase = AuthPhase::SignedOut;
            ReconcileOutcome {
                state: resolved_view(&state),
                identity_changed,
            }
        }
    }

    /// Clears the cache, then delegates sign-out to the provider.
    ///
    /// The cache is empty before the provider call starts, so no stale
    /// identity is readable even momentarily. The provider's resulting
    /// signal change drives the signed-out transition through the normal
    /// reconciliation path.
    pub async fn sign_out(&self) -> Result<(), ProviderError> {
        {
            // Hold the lock so a concurrent reconciliation cannot re-write
            // the cache between the clear and the provider call.
            let _state = self.inner.lock().await;
            self.cache.clear();
        }
        self.provider.sign_out().await
    }

    /// Fetches a short-lived token from the provider.
    ///
    /// Failure reads as `None`: callers merely attaching credentials to a
    /// request must not crash on a provider hiccup.
    pub async fn token(&self) -> Option<String> {
        match self.provider.fetch_token().await {
            Ok(token) => Some(token),
            Err(error) => {
                tracing::warn!(error = %error, "token fetch failed");
                None
            }
        }
    }

    /// Current auth view.
    pub async fn state(&self) -> ResolvedAuthState {
        resolved_view(&*self.inner.lock().await)
    }
}

fn resolved_view(state: &ContextState) -> ResolvedAuthState {
    ResolvedAuthState {
        phase: state.phase,
        snapshot: state.snapshot.clone(),
        is_loading: !state.provider_loaded && state.snapshot.is_none(),
        is_loaded: state.provider_loaded,
    }
}
