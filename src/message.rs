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

//! Module defining the message envelope that is handed between devices, and the in-band
//! responses that queries produce.
//!
//! Messages addressed "toward the parent router" are regular unicast messages whose
//! destination happens to be the sender's trust-domain parent; they are forwarded hop-by-hop
//! through the fabric like any other message. Since delivery is synchronous (see
//! [`crate::network::Network::send_message`]), the handler's return value is the response the
//! sender observes.

use serde::{Deserialize, Serialize};

use crate::{
    router::GroupTree,
    types::{LinkWeight, NetworkError, NodeId},
};

/// A message envelope. The variants mirror the protocol between devices and their
/// trust-domain routers; only [`Message::Ping`] and the credential kinds are handled by
/// switches and clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    /// Opaque application payload, delivered to the destination's handler.
    Ping(String),
    /// A new link `(a, b)` with the given cost, reported toward the parent router.
    RibAddLink {
        /// One endpoint of the link.
        a: NodeId,
        /// The other endpoint of the link.
        b: NodeId,
        /// The link cost.
        cost: LinkWeight,
    },
    /// The subtree rooted at `router` owns `node`, reported toward the parent router.
    RibAddOwnership {
        /// The child router whose subtree owns the node.
        router: NodeId,
        /// The owned node.
        node: NodeId,
    },
    /// Ask the parent RIB for the first hop from `start` toward `destination`. Answered with
    /// [`Response::NextHop`].
    RibQueryNextHop {
        /// Where the path starts.
        start: NodeId,
        /// The destination to resolve.
        destination: NodeId,
    },
    /// Ask the parent RIB for the multicast next hops of the message source. Answered with
    /// [`Response::MulticastHops`].
    RibQueryNextMulticastHops {
        /// The group to resolve.
        group: String,
    },
    /// Record a newly created group together with its LCA and owner, propagated toward the
    /// root router.
    AddMulticastGroup {
        /// The group name.
        group: String,
        /// The router elected as the group's LCA.
        lca: NodeId,
        /// The creator client, acting as the credentials authority.
        owner: NodeId,
    },
    /// A client (the message source) creates a new group at its trust-domain router.
    ClientCreateMulticastGroup {
        /// The group name.
        group: String,
    },
    /// A client (the message source) joins a group at its trust-domain router. Answered with
    /// [`Response::Owner`].
    ClientJoinMulticastGroup {
        /// The group name.
        group: String,
    },
    /// A router (the message source) joins a group at an ancestor router. Answered with
    /// [`Response::Owner`].
    RouterJoinMulticastGroup {
        /// The group name.
        group: String,
    },
    /// The new LCA (the message source) takes the external tree over from the old LCA (the
    /// destination). Answered with [`Response::ExternalTree`].
    MulticastGroupTransferLca {
        /// The group name.
        group: String,
    },
    /// Announce the router that now acts as the group's LCA.
    MulticastGroupSetLca {
        /// The group name.
        group: String,
        /// The new LCA.
        lca: NodeId,
    },
    /// A joined client (the message source) asks the group owner for credentials. The owner
    /// answers out-of-band with a [`Message::MulticastGroupSendCredentials`] message.
    MulticastGroupRequestCredentials {
        /// The group name.
        group: String,
    },
    /// The opaque credential token sent from the group owner to a joined client.
    MulticastGroupSendCredentials(GroupCredentials),
}

/// An opaque credential token for a multicast group. The concrete credential scheme is not
/// modeled; the token only records which authority issued it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupCredentials {
    /// The group the token is valid for.
    pub group: String,
    /// The client that issued the token.
    pub issuer: NodeId,
}

/// The in-band response produced by handling a message. Mutating kinds answer with
/// [`Response::None`]; queries answer with their respective payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Response {
    /// The message required no answer.
    None,
    /// Answer to [`Message::RibQueryNextHop`]: the first hop and the path distance, or `None`
    /// if no route exists.
    NextHop(Option<(NodeId, LinkWeight)>),
    /// Answer to [`Message::RibQueryNextMulticastHops`]: the tree neighbors of the querying
    /// node.
    MulticastHops(Vec<NodeId>),
    /// Answer to the join kinds: the group owner.
    Owner(NodeId),
    /// Answer to [`Message::MulticastGroupTransferLca`]: the external tree the old LCA gave
    /// up.
    ExternalTree(GroupTree),
}

impl Response {
    /// Extract the next-hop answer, or fail with [`NetworkError::UnexpectedResponse`].
    pub fn into_next_hop(self) -> Result<Option<(NodeId, LinkWeight)>, NetworkError> {
        match self {
            Self::NextHop(x) => Ok(x),
            _ => Err(NetworkError::UnexpectedResponse("next-hop")),
        }
    }

    /// Extract the multicast-hops answer, or fail with [`NetworkError::UnexpectedResponse`].
    pub fn into_multicast_hops(self) -> Result<Vec<NodeId>, NetworkError> {
        match self {
            Self::MulticastHops(x) => Ok(x),
            _ => Err(NetworkError::UnexpectedResponse("multicast-hops")),
        }
    }

    /// Extract the group owner, or fail with [`NetworkError::UnexpectedResponse`].
    pub fn into_owner(self) -> Result<NodeId, NetworkError> {
        match self {
            Self::Owner(x) => Ok(x),
            _ => Err(NetworkError::UnexpectedResponse("group-join")),
        }
    }

    /// Extract the transferred external tree, or fail with
    /// [`NetworkError::UnexpectedResponse`].
    pub fn into_external_tree(self) -> Result<GroupTree, NetworkError> {
        match self {
            Self::ExternalTree(x) => Ok(x),
            _ => Err(NetworkError::UnexpectedResponse("LCA transfer")),
        }
    }

    /// Check that the message required no answer, or fail with
    /// [`NetworkError::UnexpectedResponse`].
    pub fn into_none(self) -> Result<(), NetworkError> {
        match self {
            Self::None => Ok(()),
            _ => Err(NetworkError::UnexpectedResponse("fire-and-forget")),
        }
    }
}
