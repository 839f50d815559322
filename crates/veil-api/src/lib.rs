//! Control-plane collaborator for Veilguard.
//!
//! The connection core only needs four calls: create an organization,
//! authenticate, list nodes and provision a client on a node. They are
//! expressed by the [`ControlPlane`] trait, implemented over HTTP by
//! [`HttpControlPlane`] and in memory by [`FakeControlPlane`].

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod error;
pub mod fake;
pub mod types;

pub use client::{ControlPlane, HttpControlPlane, DEFAULT_REQUEST_TIMEOUT};
pub use error::{ApiError, Result};
pub use fake::{FakeControlPlane, ProvisionCall};
pub use types::{
    AuthToken, Node, NodeStatus, Organization, ProvisionRequest, ProvisionedPeer,
    SubscriptionStatus,
};
