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

//! Module defining the devices of the fabric: the state shared by every node, the switch and
//! client roles, and the [`Device`] dispatch enum. The router role lives in [`crate::router`].

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_with::serde_as;

use crate::{
    message::GroupCredentials,
    router::Router,
    types::{NodeId, NodeRole, RoutingEntry},
};

/// State shared by every device, regardless of its role.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeAttrs {
    /// Name of the device
    pub(crate) name: String,
    /// ID of the device
    pub(crate) id: NodeId,
    /// The router of the enclosing trust domain. `None` only for the root router.
    pub(crate) parent_router: Option<NodeId>,
    /// The directly linked devices.
    pub(crate) neighbors: BTreeSet<NodeId>,
    /// The unicast routing cache. Always contains the self-entry; other rows are learned from
    /// neighbor additions and RIB queries.
    #[serde_as(as = "Vec<(_, _)>")]
    pub(crate) routing_table: BTreeMap<NodeId, RoutingEntry>,
    /// The multicast routing cache, filled from RIB queries.
    pub(crate) multicast_routing_table: BTreeMap<String, Vec<NodeId>>,
}

impl NodeAttrs {
    pub(crate) fn new(name: String, id: NodeId, parent_router: Option<NodeId>) -> Self {
        let mut routing_table = BTreeMap::new();
        routing_table.insert(id, RoutingEntry::to_self());
        Self {
            name,
            id,
            parent_router,
            neighbors: BTreeSet::new(),
            routing_table,
            multicast_routing_table: BTreeMap::new(),
        }
    }

    /// Return the name of the device
    pub fn name(&self) -> &str {
        self.name.as_ref()
    }

    /// Return the id of the device
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Return the trust-domain parent router, or `None` for the root router.
    pub fn parent_router(&self) -> Option<NodeId> {
        self.parent_router
    }

    /// Return the set of directly linked devices.
    pub fn neighbors(&self) -> &BTreeSet<NodeId> {
        &self.neighbors
    }

    /// Return the unicast routing cache.
    pub fn routing_table(&self) -> &BTreeMap<NodeId, RoutingEntry> {
        &self.routing_table
    }

    /// Return the multicast routing cache.
    pub fn multicast_routing_table(&self) -> &BTreeMap<String, Vec<NodeId>> {
        &self.multicast_routing_table
    }
}

/// A pure forwarding element inside a trust domain. A switch carries no state beyond the
/// shared node attributes; it exists to extend the intra-domain topology.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Switch {
    pub(crate) attrs: NodeAttrs,
}

impl Switch {
    pub(crate) fn new(name: String, id: NodeId, parent_router: NodeId) -> Self {
        Self {
            attrs: NodeAttrs::new(name, id, Some(parent_router)),
        }
    }

    /// Return the shared node attributes.
    pub fn attrs(&self) -> &NodeAttrs {
        &self.attrs
    }
}

/// An application payload that was delivered to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivedPing {
    /// The original sender.
    pub source: NodeId,
    /// The delivered payload.
    pub payload: String,
}

/// A leaf endpoint. Clients attach to exactly one switch or router, may join and create
/// multicast groups, and record every application payload delivered to them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Client {
    pub(crate) attrs: NodeAttrs,
    /// The switch or router the client attaches to.
    pub(crate) attachment: NodeId,
    /// The groups the client is a member of.
    pub(crate) multicast_groups: BTreeSet<String>,
    /// The groups the client created (and issues credentials for).
    pub(crate) owned_groups: BTreeSet<String>,
    /// The owner learned for each joined group.
    pub(crate) group_owners: BTreeMap<String, NodeId>,
    /// Credential tokens received from group owners.
    pub(crate) credentials: BTreeMap<String, GroupCredentials>,
    /// Application payloads delivered to this client.
    pub(crate) inbox: Vec<ReceivedPing>,
}

impl Client {
    pub(crate) fn new(name: String, id: NodeId, parent_router: NodeId, attachment: NodeId) -> Self {
        Self {
            attrs: NodeAttrs::new(name, id, Some(parent_router)),
            attachment,
            multicast_groups: BTreeSet::new(),
            owned_groups: BTreeSet::new(),
            group_owners: BTreeMap::new(),
            credentials: BTreeMap::new(),
            inbox: Vec::new(),
        }
    }

    /// Return the shared node attributes.
    pub fn attrs(&self) -> &NodeAttrs {
        &self.attrs
    }

    /// The switch or router the client attaches to.
    pub fn attachment(&self) -> NodeId {
        self.attachment
    }

    /// The groups the client is a member of.
    pub fn multicast_groups(&self) -> &BTreeSet<String> {
        &self.multicast_groups
    }

    /// Whether the client is a member of the given group.
    pub fn is_member(&self, group: &str) -> bool {
        self.multicast_groups.contains(group)
    }

    /// The credential token received for the given group, if any.
    pub fn credentials(&self, group: &str) -> Option<&GroupCredentials> {
        self.credentials.get(group)
    }

    /// Application payloads delivered to this client, oldest first.
    pub fn inbox(&self) -> &[ReceivedPing] {
        &self.inbox
    }
}

/// Static dispatch over the three device roles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Device {
    /// A router, rooting a trust domain.
    Router(Router),
    /// A switch.
    Switch(Switch),
    /// A client.
    Client(Client),
}

impl Device {
    /// Return the role of the device.
    pub fn role(&self) -> NodeRole {
        match self {
            Device::Router(_) => NodeRole::Router,
            Device::Switch(_) => NodeRole::Switch,
            Device::Client(_) => NodeRole::Client,
        }
    }

    /// Return the shared node attributes.
    pub fn attrs(&self) -> &NodeAttrs {
        match self {
            Device::Router(r) => &r.attrs,
            Device::Switch(s) => &s.attrs,
            Device::Client(c) => &c.attrs,
        }
    }

    pub(crate) fn attrs_mut(&mut self) -> &mut NodeAttrs {
        match self {
            Device::Router(r) => &mut r.attrs,
            Device::Switch(s) => &mut s.attrs,
            Device::Client(c) => &mut c.attrs,
        }
    }

    /// Return the name of the device.
    pub fn name(&self) -> &str {
        self.attrs().name()
    }

    /// Return the trust-domain parent router, or `None` for the root router.
    pub fn parent_router(&self) -> Option<NodeId> {
        self.attrs().parent_router()
    }

    /// Returns true if and only if self contains a router.
    pub fn is_router(&self) -> bool {
        matches!(self, Self::Router(_))
    }

    /// Maps the device to an option, with `Some(r)` only if self is a router.
    pub fn router(&self) -> Option<&Router> {
        match self {
            Device::Router(r) => Some(r),
            _ => None,
        }
    }

    pub(crate) fn router_mut(&mut self) -> Option<&mut Router> {
        match self {
            Device::Router(r) => Some(r),
            _ => None,
        }
    }

    /// Maps the device to an option, with `Some(c)` only if self is a client.
    pub fn client(&self) -> Option<&Client> {
        match self {
            Device::Client(c) => Some(c),
            _ => None,
        }
    }

    pub(crate) fn client_mut(&mut self) -> Option<&mut Client> {
        match self {
            Device::Client(c) => Some(c),
            _ => None,
        }
    }
}
