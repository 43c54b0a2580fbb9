use serde::{Deserialize, Serialize};

/// Minimal projection of the provider's user record.
///
/// Holds only what the dashboard needs to render who is signed in; never
/// tokens or other provider secrets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentitySnapshot {
    /// Stable external identifier assigned by the identity provider.
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl IdentitySnapshot {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: None,
            primary_email: None,
            avatar_url: None,
        }
    }
}

/// Point-in-time view of the identity provider's load and sign-in state.
///
/// The provider loads its session and user records independently;
/// reconciliation only trusts `signed_in`/`current_user` once both flags
/// are set.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProviderSignals {
    pub session_loaded: bool,
    pub user_loaded: bool,
    pub signed_in: bool,
    pub current_user: Option<IdentitySnapshot>,
}

impl ProviderSignals {
    /// True once the provider has finished both load stages.
    #[must_use]
    pub fn resolved(&self) -> bool {
        self.session_loaded && self.user_loaded
    }
}

#[cfg(test)]
mod tests {
    use super::{IdentitySnapshot, ProviderSignals};

    #[test]
    fn snapshot_omits_absent_optional_fields() {
        let encoded =
            serde_json::to_string(&IdentitySnapshot::new("user_1")).expect("encode snapshot");
        assert_eq!(encoded, r#"{"id":"user_1"}"#);
    }

    #[test]
    fn snapshot_roundtrips_full_projection() {
        let snapshot = IdentitySnapshot {
            id: "user_2".to_string(),
            display_name: Some("Dana Reyes".to_string()),
            primary_email: Some("dana@example.com".to_string()),
            avatar_url: Some("https://img.example.com/dana.png".to_string()),
        };
        let encoded = serde_json::to_string(&snapshot).expect("encode snapshot");
        let decoded = serde_json::from_str::<IdentitySnapshot>(&encoded).expect("decode snapshot");
        assert_eq!(decoded, snapshot);
    }

    #[test]
    fn signals_resolve_only_after_both_load_stages() {
        let mut signals = ProviderSignals {
            session_loaded: true,
            ..Default::default()
        };
        assert!(!signals.resolved());
        signals.user_loaded = true;
        assert!(signals.resolved());
    }
}
