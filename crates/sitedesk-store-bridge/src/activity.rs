//! Best-effort user activity telemetry.
//!
//! At-least-once emission into the store's activity table: failures are
//! logged and dropped, never surfaced. Nothing here schedules itself;
//! heartbeats and page views fire only when the embedding application
//! calls in.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::client::StoreTransport;

/// Minimum spacing between page-view records for the same route.
pub const PAGE_VIEW_DEBOUNCE_MS: i64 = 30_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Login,
    Logout,
    PageView,
    Heartbeat,
    Action,
}

impl ActivityKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Logout => "logout",
            Self::PageView => "page_view",
            Self::Heartbeat => "heartbeat",
            Self::Action => "action",
        }
    }
}

/// One activity row as posted to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub user_id: String,
    pub session_id: String,
    pub kind: ActivityKind,
    pub description: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug)]
struct PageViewState {
    route: String,
    emitted_at_ms: i64,
}

/// Emits activity rows for the current client session.
///
/// Page views are single-flight per route: a repeat of the same route
/// inside the debounce window is dropped at the call site, a route change
/// always emits.
pub struct ActivityRecorder {
    transport: Arc<dyn StoreTransport>,
    session_id: String,
    last_page_view: Mutex<Option<PageViewState>>,
}

impl ActivityRecorder {
    pub fn new(transport: Arc<dyn StoreTransport>) -> Self {
        Self {
            transport,
            session_id: format!("sess_{}", Uuid::new_v4().simple()),
            last_page_view: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn session_id(&self) -> &str {
        self.session_id.as_str()
    }

    pub async fn login(&self, user_id: &str) {
        self.emit(user_id, ActivityKind::Login, "user signed in", serde_json::Value::Null)
            .await;
    }

    pub async fn logout(&self, user_id: &str) {
        self.emit(user_id, ActivityKind::Logout, "user signed out", serde_json::Value::Null)
            .await;
    }

    pub async fn heartbeat(&self, user_id: &str) {
        self.emit(user_id, ActivityKind::Heartbeat, "session heartbeat", serde_json::Value::Null)
            .await;
    }

    pub async fn action(&self, user_id: &str, description: &str) {
        self.emit(user_id, ActivityKind::Action, description, serde_json::Value::Null)
            .await;
    }

    /// Records a page view, coalescing repeats of the same route inside
    /// the debounce window.
    pub async fn page_view(&self, user_id: &str, route: &str) {
        self.page_view_at(user_id, route, Utc::now().timestamp_millis())
            .await;
    }

    async fn page_view_at(&self, user_id: &str, route: &str, now_ms: i64) {
        {
            let mut last = self.last_page_view.lock().await;
            if let Some(state) = last.as_ref()
                && state.route == route
                && now_ms.saturating_sub(state.emitted_at_ms) < PAGE_VIEW_DEBOUNCE_MS
            {
                return;
            }
            // Claimed before the emit so a concurrent duplicate inside the
            // window drops instead of double-sending.
            *last = Some(PageViewState {
                route: route.to_string(),
                emitted_at_ms: now_ms,
            });
        }
        self.emit(
            user_id,
            ActivityKind::PageView,
            &format!("viewed {route}"),
            serde_json::json!({ "route": route }),
        )
        .await;
    }

    async fn emit(
        &self,
        user_id: &str,
        kind: ActivityKind,
        description: &str,
        metadata: serde_json::Value,
    ) {
        let record = ActivityRecord {
            user_id: user_id.to_string(),
            session_id: self.session_id.clone(),
            kind,
            description: description.to_string(),
            metadata,
            recorded_at: Utc::now(),
        };
        if let Err(error) = self.transport.record_activity(&record).await {
            tracing::debug!(error = %error, kind = kind.as_str(), "activity record dropped");
        }
    }
}
