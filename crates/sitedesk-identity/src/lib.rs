//! Identity/session core for the Sitedesk dashboard client.
//!
//! Reconciles the external identity provider's slow, multi-stage
//! initialization with a durable, time-limited local cache, and vends one
//! coherent auth view to the rest of the application.
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod cache;
pub mod context;
pub mod provider;
pub mod snapshot;

pub use cache::{SESSION_CACHE_TTL_MS, SessionCache};
pub use context::{AuthPhase, IdentityContext, ReconcileOutcome, ResolvedAuthState};
pub use provider::{IdentityProvider, ProviderError};
pub use snapshot::{IdentitySnapshot, ProviderSignals};
