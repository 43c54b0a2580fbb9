//! Backing-store synchronization for the Sitedesk dashboard client.
//!
//! Observes the identity context's resolved user and keeps the store's
//! request-scoped authorization variable aligned with it, de-duplicating
//! remote calls and degrading gracefully under rate limiting.
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod activity;
pub mod bridge;
pub mod client;
pub mod runtime;

pub use activity::{ActivityKind, ActivityRecord, ActivityRecorder, PAGE_VIEW_DEBOUNCE_MS};
pub use bridge::{
    AuthSyncBridge, BridgeConfig, BridgeHealth, RateLimitPolicy, SyncError, SyncOutcome,
};
pub use client::{
    DEFAULT_REQUEST_ATTEMPTS, DEFAULT_TIMEOUT_MS, ENV_STORE_API_KEY, ENV_STORE_URL, StoreClient,
    StoreClientConfig, StoreClientError, StoreTransport,
};
pub use runtime::SessionRuntime;
