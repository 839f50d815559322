//! Wire types exchanged with the control plane.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A newly created organization.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    /// Long-lived API key for the organization.
    pub api_key: String,
}

impl fmt::Debug for Organization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Organization").field("api_key", &"[REDACTED]").finish()
    }
}

/// Bearer token for authenticated calls.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthToken(String);

impl AuthToken {
    /// Wraps a raw token string.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the token is blank.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AuthToken([REDACTED])")
    }
}

impl From<&str> for AuthToken {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for AuthToken {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Availability of a node as reported by the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    /// Accepting new clients.
    Active,
    /// Not accepting clients.
    Inactive,
    /// A status this client does not understand; treated as ineligible.
    #[serde(other)]
    Unknown,
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// A tunnel endpoint node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Node identifier used for provisioning.
    pub id: String,
    /// Current availability.
    pub status: NodeStatus,
    /// Human-readable name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Location label, e.g. a city or region.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl Node {
    /// Creates a node with only an id and status.
    #[must_use]
    pub fn new(id: impl Into<String>, status: NodeStatus) -> Self {
        Self {
            id: id.into(),
            status,
            name: None,
            location: None,
        }
    }

    /// Returns `true` if the node accepts new clients.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == NodeStatus::Active
    }
}

/// `GET /nodes` body: either a bare array or `{"nodes": [...]}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum NodeList {
    Bare(Vec<Node>),
    Wrapped { nodes: Vec<Node> },
}

impl NodeList {
    pub(crate) fn into_nodes(self) -> Vec<Node> {
        match self {
            Self::Bare(nodes) | Self::Wrapped { nodes } => nodes,
        }
    }
}

/// `POST /auth/token` request body.
#[derive(Serialize)]
pub(crate) struct AuthRequest<'a> {
    pub api_key: &'a str,
}

/// `POST /auth/token` response body.
#[derive(Deserialize)]
pub(crate) struct AuthResponse {
    pub token: String,
}

/// `POST /nodes/{id}/clients` request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionRequest {
    /// Client public key, base64.
    pub public_key: String,
    /// Preshared key, base64.
    pub preshared_key: String,
}

/// Peer parameters assigned to this client by a node.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionedPeer {
    /// Tunnel address for this client.
    #[serde(default)]
    pub client_address: String,
    /// Server public key, base64.
    #[serde(default)]
    pub server_public_key: String,
    /// Preshared key echoed by the server, if any.
    #[serde(default)]
    pub server_preshared_key: String,
    /// Server endpoint, `host` or `host:port`.
    #[serde(default)]
    pub endpoint: String,
}

impl ProvisionedPeer {
    /// Returns `true` if the server sent none of the peer fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        [&self.client_address, &self.server_public_key, &self.endpoint]
            .iter()
            .all(|s| s.trim().is_empty())
    }
}

impl fmt::Debug for ProvisionedPeer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProvisionedPeer")
            .field("client_address", &self.client_address)
            .field("server_public_key", &self.server_public_key)
            .field("server_preshared_key", &"[REDACTED]")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

/// Subscription state of the authenticated organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionStatus {
    /// Whether the subscription currently allows connections.
    pub active: bool,
    /// Plan name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
    /// Expiry timestamp as sent by the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_status_parses_known_and_unknown_values() {
        let nodes: Vec<Node> = serde_json::from_str(
            r#"[
                {"id": "node-a", "status": "active"},
                {"id": "node-b", "status": "inactive"},
                {"id": "node-c", "status": "maintenance", "name": "Frankfurt 3"}
            ]"#,
        )
        .expect("valid json");

        assert_eq!(nodes[0].status, NodeStatus::Active);
        assert_eq!(nodes[1].status, NodeStatus::Inactive);
        assert_eq!(nodes[2].status, NodeStatus::Unknown);
        assert_eq!(nodes[2].name.as_deref(), Some("Frankfurt 3"));
        assert!(nodes[0].is_active());
        assert!(!nodes[2].is_active());
    }

    #[test]
    fn node_list_accepts_both_shapes() {
        let bare: NodeList = serde_json::from_str(r#"[{"id": "a", "status": "active"}]"#).expect("bare");
        let wrapped: NodeList =
            serde_json::from_str(r#"{"nodes": [{"id": "a", "status": "active"}]}"#).expect("wrapped");
        assert_eq!(bare.into_nodes(), wrapped.into_nodes());
    }

    #[test]
    fn provisioned_peer_defaults_missing_fields() {
        let peer: ProvisionedPeer =
            serde_json::from_str(r#"{"client_address": "10.0.0.2"}"#).expect("valid json");
        assert_eq!(peer.client_address, "10.0.0.2");
        assert!(peer.server_public_key.is_empty());
        assert!(!peer.is_empty());

        let empty: ProvisionedPeer = serde_json::from_str("{}").expect("valid json");
        assert!(empty.is_empty());
    }

    #[test]
    fn secrets_redacted_in_debug() {
        let token = AuthToken::new("super-secret");
        assert!(!format!("{token:?}").contains("super-secret"));

        let org = Organization {
            api_key: "org-secret".to_string(),
        };
        assert!(!format!("{org:?}").contains("org-secret"));

        let peer = ProvisionedPeer {
            client_address: "10.0.0.2".into(),
            server_public_key: "pk".into(),
            server_preshared_key: "psk-secret".into(),
            endpoint: "vpn:51820".into(),
        };
        assert!(!format!("{peer:?}").contains("psk-secret"));
    }

    #[test]
    fn auth_token_serializes_transparently() {
        let token = AuthToken::new("abc");
        assert_eq!(serde_json::to_string(&token).expect("serialize"), "\"abc\"");
    }

    #[test]
    fn provision_request_shape() {
        let body = serde_json::to_value(ProvisionRequest {
            public_key: "pub".into(),
            preshared_key: "psk".into(),
        })
        .expect("serialize");
        assert_eq!(body, serde_json::json!({"public_key": "pub", "preshared_key": "psk"}));
    }
}
