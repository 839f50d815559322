//! HTTP implementation of the control-plane collaborator.

use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};
use url::Url;

use crate::error::{ApiError, Result};
use crate::types::{
    AuthRequest, AuthResponse, AuthToken, Node, NodeList, Organization, ProvisionRequest,
    ProvisionedPeer, SubscriptionStatus,
};

/// Default request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Calls made by the connection core against the control plane.
///
/// Tokens and keys are passed as plain strings so this crate stays
/// independent of the tunnel key types.
#[allow(async_fn_in_trait)]
pub trait ControlPlane {
    /// Creates an organization and returns its API key.
    async fn create_organization(&self) -> Result<Organization>;

    /// Exchanges an API key for a bearer token.
    async fn authenticate(&self, api_key: &str) -> Result<AuthToken>;

    /// Lists nodes known to the directory, active or not.
    async fn list_active_nodes(&self, token: &AuthToken) -> Result<Vec<Node>>;

    /// Registers a client public key and preshared key with a node.
    async fn provision_client(
        &self,
        token: &AuthToken,
        node_id: &str,
        public_key: &str,
        preshared_key: &str,
    ) -> Result<ProvisionedPeer>;

    /// Returns the subscription state of the token's organization.
    async fn subscription_status(&self, token: &AuthToken) -> Result<SubscriptionStatus>;
}

/// [`ControlPlane`] over HTTPS with JSON bodies.
#[derive(Debug, Clone)]
pub struct HttpControlPlane {
    client: Client,
    base_url: Url,
}

impl HttpControlPlane {
    /// Creates a client for `base_url` with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns `InvalidUrl` if the URL cannot serve as a base, and `Http` if
    /// the underlying client cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url).map_err(|e| ApiError::InvalidUrl(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() || !matches!(base_url.scheme(), "http" | "https") {
            return Err(ApiError::InvalidUrl(format!("{base_url}: not an http(s) base URL")));
        }

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("veilguard/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ApiError::http(base_url.as_str(), e.to_string()))?;

        Ok(Self { client, base_url })
    }

    /// The base URL requests are resolved against.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Builds the URL for a path below the base, percent-encoding each segment.
    ///
    /// # Errors
    ///
    /// Returns `InvalidUrl` if the base URL cannot take path segments.
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ApiError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send<T: DeserializeOwned>(&self, url: &Url, request: RequestBuilder) -> Result<T> {
        let endpoint = url.path().to_string();
        let response = request
            .send()
            .await
            .map_err(|e| ApiError::http(&endpoint, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::status(&endpoint, status.as_u16(), body.trim()));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ApiError::http(&endpoint, e.to_string()))?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Err(ApiError::empty(&endpoint));
        }

        debug!(endpoint = %endpoint, status = status.as_u16(), "control-plane response");
        serde_json::from_slice(&bytes).map_err(|e| ApiError::decode(&endpoint, e.to_string()))
    }
}

impl ControlPlane for HttpControlPlane {
    #[instrument(skip(self))]
    async fn create_organization(&self) -> Result<Organization> {
        let url = self.endpoint(&["organizations"])?;
        let org: Organization = self.send(&url, self.client.post(url.clone())).await?;
        if org.api_key.trim().is_empty() {
            return Err(ApiError::empty(url.path()));
        }
        Ok(org)
    }

    #[instrument(skip_all)]
    async fn authenticate(&self, api_key: &str) -> Result<AuthToken> {
        let url = self.endpoint(&["auth", "token"])?;
        let request = self.client.post(url.clone()).json(&AuthRequest { api_key });
        let response: AuthResponse = self.send(&url, request).await?;
        let token = AuthToken::new(response.token);
        if token.is_empty() {
            return Err(ApiError::empty(url.path()));
        }
        Ok(token)
    }

    #[instrument(skip_all)]
    async fn list_active_nodes(&self, token: &AuthToken) -> Result<Vec<Node>> {
        let url = self.endpoint(&["nodes"])?;
        let request = self.client.get(url.clone()).bearer_auth(token.as_str());
        let list: NodeList = self.send(&url, request).await?;
        Ok(list.into_nodes())
    }

    #[instrument(skip(self, token, public_key, preshared_key))]
    async fn provision_client(
        &self,
        token: &AuthToken,
        node_id: &str,
        public_key: &str,
        preshared_key: &str,
    ) -> Result<ProvisionedPeer> {
        let url = self.endpoint(&["nodes", node_id, "clients"])?;
        let body = ProvisionRequest {
            public_key: public_key.to_string(),
            preshared_key: preshared_key.to_string(),
        };
        let request = self
            .client
            .post(url.clone())
            .bearer_auth(token.as_str())
            .json(&body);
        let peer: ProvisionedPeer = self.send(&url, request).await?;
        if peer.is_empty() {
            return Err(ApiError::empty(url.path()));
        }
        Ok(peer)
    }

    #[instrument(skip_all)]
    async fn subscription_status(&self, token: &AuthToken) -> Result<SubscriptionStatus> {
        let url = self.endpoint(&["subscription"])?;
        let request = self.client.get(url.clone()).bearer_auth(token.as_str());
        self.send(&url, request).await
    }
}
