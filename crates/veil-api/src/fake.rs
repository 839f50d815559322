//! In-memory control plane.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::client::ControlPlane;
use crate::error::{ApiError, Result};
use crate::types::{AuthToken, Node, Organization, ProvisionedPeer, SubscriptionStatus};

/// One recorded call to [`ControlPlane::provision_client`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionCall {
    /// Node the client asked to join.
    pub node_id: String,
    /// Public key that was sent.
    pub public_key: String,
    /// Preshared key that was sent.
    pub preshared_key: String,
}

#[derive(Debug)]
struct FakeState {
    nodes: Vec<Node>,
    peer: ProvisionedPeer,
    echo_preshared_key: bool,
    directory_error: Option<String>,
    provisioning_error: Option<String>,
    api_keys: HashMap<String, String>,
    next_org: u32,
    subscription: SubscriptionStatus,
    provision_calls: Vec<ProvisionCall>,
    directory_calls: usize,
}

impl Default for FakeState {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            peer: ProvisionedPeer {
                client_address: "10.8.0.2".to_string(),
                server_public_key: String::new(),
                server_preshared_key: String::new(),
                endpoint: "vpn.example.com".to_string(),
            },
            echo_preshared_key: false,
            directory_error: None,
            provisioning_error: None,
            api_keys: HashMap::new(),
            next_org: 1,
            subscription: SubscriptionStatus {
                active: true,
                plan: Some("standard".to_string()),
                expires_at: None,
            },
            provision_calls: Vec::new(),
            directory_calls: 0,
        }
    }
}

/// A [`ControlPlane`] backed by in-memory state.
///
/// Any non-empty token is accepted for authenticated calls. Provisioning
/// returns the configured peer template, optionally echoing the preshared
/// key that was sent.
#[derive(Debug, Clone, Default)]
pub struct FakeControlPlane {
    state: Arc<Mutex<FakeState>>,
}

impl FakeControlPlane {
    /// Creates an empty control plane.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the node directory.
    #[must_use]
    pub fn with_nodes(self, nodes: Vec<Node>) -> Self {
        self.state.lock().nodes = nodes;
        self
    }

    /// Sets the peer returned by provisioning.
    #[must_use]
    pub fn with_peer(self, peer: ProvisionedPeer) -> Self {
        self.state.lock().peer = peer;
        self
    }

    /// Makes provisioning echo the preshared key it received.
    #[must_use]
    pub fn echoing_preshared_key(self) -> Self {
        self.state.lock().echo_preshared_key = true;
        self
    }

    /// Makes directory listing fail.
    pub fn fail_directory(&self, message: impl Into<String>) {
        self.state.lock().directory_error = Some(message.into());
    }

    /// Makes provisioning fail.
    pub fn fail_provisioning(&self, message: impl Into<String>) {
        self.state.lock().provisioning_error = Some(message.into());
    }

    /// Registers an API key that authenticates to `token`.
    pub fn add_api_key(&self, api_key: impl Into<String>, token: impl Into<String>) {
        self.state.lock().api_keys.insert(api_key.into(), token.into());
    }

    /// Provisioning calls received so far.
    #[must_use]
    pub fn provision_calls(&self) -> Vec<ProvisionCall> {
        self.state.lock().provision_calls.clone()
    }

    /// Number of directory listings received so far.
    #[must_use]
    pub fn directory_calls(&self) -> usize {
        self.state.lock().directory_calls
    }

    fn check_token(endpoint: &str, token: &AuthToken) -> Result<()> {
        if token.is_empty() {
            Err(ApiError::status(endpoint, 401, "missing bearer token"))
        } else {
            Ok(())
        }
    }
}

impl ControlPlane for FakeControlPlane {
    async fn create_organization(&self) -> Result<Organization> {
        let mut state = self.state.lock();
        let api_key = format!("org-key-{}", state.next_org);
        let token = format!("token-{}", state.next_org);
        state.next_org += 1;
        state.api_keys.insert(api_key.clone(), token);
        Ok(Organization { api_key })
    }

    async fn authenticate(&self, api_key: &str) -> Result<AuthToken> {
        self.state
            .lock()
            .api_keys
            .get(api_key)
            .map(|token| AuthToken::new(token.clone()))
            .ok_or_else(|| ApiError::status("/auth/token", 401, "unknown api key"))
    }

    async fn list_active_nodes(&self, token: &AuthToken) -> Result<Vec<Node>> {
        Self::check_token("/nodes", token)?;
        let mut state = self.state.lock();
        state.directory_calls += 1;
        match &state.directory_error {
            Some(message) => Err(ApiError::http("/nodes", message.clone())),
            None => Ok(state.nodes.clone()),
        }
    }

    async fn provision_client(
        &self,
        token: &AuthToken,
        node_id: &str,
        public_key: &str,
        preshared_key: &str,
    ) -> Result<ProvisionedPeer> {
        let endpoint = format!("/nodes/{node_id}/clients");
        Self::check_token(&endpoint, token)?;

        let mut state = self.state.lock();
        state.provision_calls.push(ProvisionCall {
            node_id: node_id.to_string(),
            public_key: public_key.to_string(),
            preshared_key: preshared_key.to_string(),
        });

        if let Some(message) = &state.provisioning_error {
            return Err(ApiError::status(&endpoint, 500, message.clone()));
        }
        if !state.nodes.iter().any(|n| n.id == node_id) {
            return Err(ApiError::status(&endpoint, 404, "no such node"));
        }

        let mut peer = state.peer.clone();
        if state.echo_preshared_key {
            peer.server_preshared_key = preshared_key.to_string();
        }
        if peer.is_empty() {
            return Err(ApiError::empty(&endpoint));
        }
        Ok(peer)
    }

    async fn subscription_status(&self, token: &AuthToken) -> Result<SubscriptionStatus> {
        Self::check_token("/subscription", token)?;
        Ok(self.state.lock().subscription.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NodeStatus;

    #[tokio::test]
    async fn organization_key_authenticates() {
        let api = FakeControlPlane::new();
        let org = api.create_organization().await.expect("org");

        let token = api.authenticate(&org.api_key).await.expect("auth");
        assert!(!token.is_empty());

        let err = api.authenticate("nope").await.expect_err("unknown key");
        assert!(err.is_unauthorized());
    }

    #[tokio::test]
    async fn provisioning_is_recorded() {
        let api = FakeControlPlane::new()
            .with_nodes(vec![Node::new("node-a", NodeStatus::Active)])
            .echoing_preshared_key();
        let token = AuthToken::new("t");

        let peer = api
            .provision_client(&token, "node-a", "pub", "psk")
            .await
            .expect("provision");

        assert_eq!(peer.server_preshared_key, "psk");
        assert_eq!(
            api.provision_calls(),
            vec![ProvisionCall {
                node_id: "node-a".into(),
                public_key: "pub".into(),
                preshared_key: "psk".into(),
            }]
        );
    }

    #[tokio::test]
    async fn unknown_node_is_not_found() {
        let api = FakeControlPlane::new();
        let err = api
            .provision_client(&AuthToken::new("t"), "ghost", "pub", "psk")
            .await
            .expect_err("must fail");
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn directory_failure_and_blank_token() {
        let api = FakeControlPlane::new();
        assert!(api.list_active_nodes(&AuthToken::new("")).await.is_err_and(|e| e.is_unauthorized()));

        api.fail_directory("connection reset");
        assert!(matches!(
            api.list_active_nodes(&AuthToken::new("t")).await,
            Err(ApiError::Http { .. })
        ));
        assert_eq!(api.directory_calls(), 1);
    }
}
