// DomainCast: Trust-Domain Overlay Multicast Simulator written in Rust
// Copyright 2024-2026 The DomainCast Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Module containing all type definitions

use ordered_float::NotNan;
use petgraph::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub(crate) type IndexType = u32;
/// Node identification (and index into the topology graph). Every device, regardless of its
/// role, is referenced by its `NodeId`; all relationships between devices (neighborships, RIB
/// edges, trust-domain parents) are stored as id-to-id mappings.
pub type NodeId = NodeIndex<IndexType>;

/// The physical topology graph. Nodes carry no payload (all per-device state lives in the
/// registry); edges carry their link cost.
pub type Topology = StableGraph<(), LinkWeight, Undirected, IndexType>;

/// Cost of a single link. Costs are at least [`MIN_LINK_WEIGHT`].
pub type LinkWeight = f64;

/// The smallest allowed link cost.
pub const MIN_LINK_WEIGHT: LinkWeight = 1.0;

/// The link cost used when none is given explicitly.
pub const DEFAULT_LINK_WEIGHT: LinkWeight = 1.0;

/// The role a device plays in the fabric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NodeRole {
    /// Owns a RIB and roots a trust domain.
    Router,
    /// Pure forwarding element inside a trust domain.
    Switch,
    /// Leaf endpoint that sends and receives application messages.
    Client,
}

impl std::fmt::Display for NodeRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeRole::Router => f.write_str("router"),
            NodeRole::Switch => f.write_str("switch"),
            NodeRole::Client => f.write_str("client"),
        }
    }
}

/// An undirected, weighted edge as stored in a RIB or a multicast tree. The endpoints are
/// normalized (`a <= b`) so that equal links inserted from either side collapse to the same
/// set element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RibEdge {
    /// The endpoint with the smaller index.
    pub a: NodeId,
    /// The endpoint with the larger index.
    pub b: NodeId,
    /// The link cost.
    pub cost: NotNan<LinkWeight>,
}

impl RibEdge {
    /// Create a new edge, normalizing the endpoint order.
    pub fn new(a: NodeId, b: NodeId, cost: NotNan<LinkWeight>) -> Self {
        if a.index() <= b.index() {
            Self { a, b, cost }
        } else {
            Self { a: b, b: a, cost }
        }
    }

    /// Whether `n` is one of the two endpoints.
    pub fn incident(&self, n: NodeId) -> bool {
        self.a == n || self.b == n
    }

    /// The endpoint opposite to `n`, or `None` if `n` is not an endpoint.
    pub fn other(&self, n: NodeId) -> Option<NodeId> {
        if self.a == n {
            Some(self.b)
        } else if self.b == n {
            Some(self.a)
        } else {
            None
        }
    }

    /// The link cost as a plain float.
    pub fn cost(&self) -> LinkWeight {
        self.cost.into_inner()
    }
}

/// A single unicast routing-table row: the neighbor to forward through and the distance of the
/// path it was learned on. The table always contains the self-entry `(None, 0)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoutingEntry {
    /// The neighbor to forward through. `None` only for the self-entry.
    pub next_hop: Option<NodeId>,
    /// Distance of the path this entry was learned on.
    pub distance: LinkWeight,
}

impl RoutingEntry {
    /// The self-entry present in every routing table.
    pub fn to_self() -> Self {
        Self {
            next_hop: None,
            distance: 0.0,
        }
    }

    /// An entry learned from a RIB query or a neighbor addition.
    pub fn via(next_hop: NodeId, distance: LinkWeight) -> Self {
        Self {
            next_hop: Some(next_hop),
            distance,
        }
    }
}

/// Network Errors
#[derive(Error, Debug)]
pub enum NetworkError {
    /// Device is not present in the topology
    #[error("Network device was not found in topology: {0:?}")]
    DeviceNotFound(NodeId),
    /// Device name is not present in the topology
    #[error("Network device name was not found in topology: {0}")]
    DeviceNameNotFound(String),
    /// Device must be a router
    #[error("Network device is not a router: {0:?}")]
    NotARouter(NodeId),
    /// Device must be a client
    #[error("Network device is not a client: {0:?}")]
    NotAClient(NodeId),
    /// A non-router device has no enclosing trust domain.
    #[error("Network device has no trust-domain router: {0:?}")]
    NoTrustDomain(NodeId),
    /// Links must connect two distinct devices.
    #[error("Cannot link device {0:?} to itself")]
    SelfLink(NodeId),
    /// Link weights must be finite and at least [`MIN_LINK_WEIGHT`].
    #[error("Invalid link weight between {0:?} and {1:?}: {2}")]
    InvalidLinkWeight(NodeId, NodeId, LinkWeight),
    /// No path exists between two devices.
    #[error("No route from {origin:?} towards {destination:?}")]
    NoRoute {
        /// Where the lookup started.
        origin: NodeId,
        /// The unreachable destination.
        destination: NodeId,
    },
    /// Forwarding loop detected: a message visited more hops than there are devices.
    #[error("Forwarding loop occurred while delivering from {origin:?} to {destination:?}")]
    ForwardingLoop {
        /// The original sender.
        origin: NodeId,
        /// The destination the message never reached.
        destination: NodeId,
    },
    /// The multicast group is not known anywhere up the trust-domain tree.
    #[error("Multicast group '{0}' was not found")]
    GroupNotFound(String),
    /// The group entry carries no owner although one is required.
    #[error("The owner of multicast group '{0}' is not known")]
    GroupOwnerUnknown(String),
    /// An LCA transfer was requested from a router that does not hold the external tree.
    #[error("Router {1:?} is not the LCA of multicast group '{0}'")]
    NotGroupLca(String, NodeId),
    /// Credentials were requested from a client that did not create the group.
    #[error("Client {1:?} is not the owner of multicast group '{0}'")]
    NotGroupOwner(String, NodeId),
    /// A multicast splice found no path between the joining node and the tree.
    #[error("No path from {node:?} to the tree of multicast group '{group}'")]
    SpliceFailed {
        /// The group whose tree was being extended.
        group: String,
        /// The node that could not be connected.
        node: NodeId,
    },
    /// A query returned a response of an unexpected shape.
    #[error("Unexpected response for a {0} request")]
    UnexpectedResponse(&'static str),
    /// Json error
    #[error("{0}")]
    JsonError(Box<serde_json::Error>),
}

impl From<serde_json::Error> for NetworkError {
    fn from(value: serde_json::Error) -> Self {
        Self::JsonError(Box::new(value))
    }
}

impl PartialEq for NetworkError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::DeviceNotFound(l0), Self::DeviceNotFound(r0)) => l0 == r0,
            (Self::DeviceNameNotFound(l0), Self::DeviceNameNotFound(r0)) => l0 == r0,
            (Self::NotARouter(l0), Self::NotARouter(r0)) => l0 == r0,
            (Self::NotAClient(l0), Self::NotAClient(r0)) => l0 == r0,
            (Self::NoTrustDomain(l0), Self::NoTrustDomain(r0)) => l0 == r0,
            (Self::SelfLink(l0), Self::SelfLink(r0)) => l0 == r0,
            (Self::InvalidLinkWeight(l0, l1, l2), Self::InvalidLinkWeight(r0, r1, r2)) => {
                l0 == r0 && l1 == r1 && l2 == r2
            }
            (
                Self::NoRoute {
                    origin: l0,
                    destination: l1,
                },
                Self::NoRoute {
                    origin: r0,
                    destination: r1,
                },
            ) => l0 == r0 && l1 == r1,
            (
                Self::ForwardingLoop {
                    origin: l0,
                    destination: l1,
                },
                Self::ForwardingLoop {
                    origin: r0,
                    destination: r1,
                },
            ) => l0 == r0 && l1 == r1,
            (Self::GroupNotFound(l0), Self::GroupNotFound(r0)) => l0 == r0,
            (Self::GroupOwnerUnknown(l0), Self::GroupOwnerUnknown(r0)) => l0 == r0,
            (Self::NotGroupLca(l0, l1), Self::NotGroupLca(r0, r1)) => l0 == r0 && l1 == r1,
            (Self::NotGroupOwner(l0, l1), Self::NotGroupOwner(r0, r1)) => l0 == r0 && l1 == r1,
            (
                Self::SpliceFailed {
                    group: l0,
                    node: l1,
                },
                Self::SpliceFailed {
                    group: r0,
                    node: r1,
                },
            ) => l0 == r0 && l1 == r1,
            (Self::UnexpectedResponse(l0), Self::UnexpectedResponse(r0)) => l0 == r0,
            (Self::JsonError(l), Self::JsonError(r)) => l.to_string() == r.to_string(),
            _ => false,
        }
    }
}
