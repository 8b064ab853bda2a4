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

//! # Top-level Network module
//!
//! This module holds the device registry, builds the topology, and delivers messages between
//! devices. All devices are referenced by their [`NodeId`]; the registry is the only owner of
//! device state, so the cyclic relationships of the fabric (parent routers, neighbor sets,
//! RIB edges) are plain id-to-id mappings.
//!
//! Delivery is synchronous and single-threaded: [`Network::send_message`] returns only after
//! the message has been forwarded hop-by-hop, handled at its destination, and every nested
//! query it triggered has completed. The handler's return value is the response the sender
//! observes.

use std::collections::{BTreeMap, BTreeSet};

use itertools::Itertools;
use log::*;
use ordered_float::NotNan;
use serde::{Deserialize, Serialize};
use serde_with::serde_as;

use crate::{
    device::{Client, Device, ReceivedPing, Switch},
    message::{GroupCredentials, Message, Response},
    router::{GroupEntry, GroupTree, Router},
    types::{
        LinkWeight, NetworkError, NodeId, NodeRole, RoutingEntry, Topology, DEFAULT_LINK_WEIGHT,
        MIN_LINK_WEIGHT,
    },
};

/// # Network struct
/// The struct contains the topology graph, manages all devices, and delivers the messages
/// between them.
///
/// ```rust
/// use domaincast::prelude::*;
///
/// fn main() -> Result<(), NetworkError> {
///     // create an empty network with a root router and two child domains.
///     let mut net = Network::new();
///     let root = net.add_router("root", None)?;
///     let ra = net.add_router("ra", Some(root))?;
///     net.add_link(ra, root, 1.0)?;
///     let rb = net.add_router("rb", Some(root))?;
///     net.add_link(rb, root, 1.0)?;
///     let ca = net.add_client("ca", ra)?;
///     let cb = net.add_client("cb", rb)?;
///
///     // unicast across the two domains
///     net.ping(ca, cb, "hi")?;
///     assert_eq!(net.get_client(cb)?.inbox().len(), 1);
///     Ok(())
/// }
/// ```
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Network {
    pub(crate) net: Topology,
    #[serde_as(as = "Vec<(_, _)>")]
    pub(crate) devices: BTreeMap<NodeId, Device>,
}

impl Default for Network {
    fn default() -> Self {
        Self::new()
    }
}

impl Network {
    /// Generate an empty Network
    pub fn new() -> Self {
        Self {
            net: Topology::default(),
            devices: BTreeMap::new(),
        }
    }

    /*
     * Topology construction
     */

    /// Add a new router to the topology. `parent = None` marks the root router; otherwise,
    /// `parent` must reference a router, and the new router forms a subordinate trust domain.
    /// This only creates the device; links are added explicitly with [`Network::add_link`].
    pub fn add_router(
        &mut self,
        name: impl Into<String>,
        parent: Option<NodeId>,
    ) -> Result<NodeId, NetworkError> {
        if let Some(p) = parent {
            if !self.get_device(p)?.is_router() {
                return Err(NetworkError::NotARouter(p));
            }
        }
        let id = self.net.add_node(());
        self.devices
            .insert(id, Device::Router(Router::new(name.into(), id, parent)));
        Ok(id)
    }

    /// Add a new switch inside the trust domain of `parent_router`. This only creates the
    /// device; links are added explicitly with [`Network::add_link`].
    pub fn add_switch(
        &mut self,
        name: impl Into<String>,
        parent_router: NodeId,
    ) -> Result<NodeId, NetworkError> {
        if !self.get_device(parent_router)?.is_router() {
            return Err(NetworkError::NotARouter(parent_router));
        }
        let id = self.net.add_node(());
        self.devices
            .insert(id, Device::Switch(Switch::new(name.into(), id, parent_router)));
        Ok(id)
    }

    /// Add a new client attached to `attachment` (a switch or a router) with a link of cost
    /// [`DEFAULT_LINK_WEIGHT`]. The client belongs to the attachment's trust domain.
    pub fn add_client(
        &mut self,
        name: impl Into<String>,
        attachment: NodeId,
    ) -> Result<NodeId, NetworkError> {
        let attach = self.get_device(attachment)?;
        let parent = if attach.is_router() {
            attachment
        } else {
            attach
                .parent_router()
                .ok_or(NetworkError::NoTrustDomain(attachment))?
        };
        let id = self.net.add_node(());
        self.devices.insert(
            id,
            Device::Client(Client::new(name.into(), id, parent, attachment)),
        );
        self.add_link(id, attachment, DEFAULT_LINK_WEIGHT)?;
        Ok(id)
    }

    /// Add a link between `a` and `b`. Both sides record the neighborship and merge the
    /// peer's routing table (keeping strictly better entries); the initiating side `a`
    /// reports the link to its RIB, which triggers the propagation up the trust-domain tree.
    /// Re-adding an existing link is a no-op.
    pub fn add_link(
        &mut self,
        a: NodeId,
        b: NodeId,
        cost: LinkWeight,
    ) -> Result<(), NetworkError> {
        if a == b {
            return Err(NetworkError::SelfLink(a));
        }
        self.get_device(a)?;
        self.get_device(b)?;
        if !(cost >= MIN_LINK_WEIGHT) || !cost.is_finite() {
            return Err(NetworkError::InvalidLinkWeight(a, b, cost));
        }
        if self.net.find_edge(a, b).is_none() {
            self.net.add_edge(a, b, cost);
        }
        self.half_link(a, b, cost)?;
        self.half_link(b, a, cost)?;
        // a router applies the RIB update itself; everyone else reports toward the parent
        if self.get_device(a)?.is_router() {
            self.rib_add_link(a, a, b, cost)?;
        } else {
            let parent = self
                .get_device(a)?
                .parent_router()
                .ok_or(NetworkError::NoTrustDomain(a))?;
            self.send_message(a, parent, Message::RibAddLink { a, b, cost })?
                .into_none()?;
        }
        Ok(())
    }

    /// One direction of a neighbor addition: `n` records `other` and relaxes its routing
    /// table over the entries `other` currently has.
    fn half_link(&mut self, n: NodeId, other: NodeId, cost: LinkWeight) -> Result<(), NetworkError> {
        let snapshot: Vec<(NodeId, LinkWeight)> = self
            .get_device(other)?
            .attrs()
            .routing_table()
            .iter()
            .map(|(dst, e)| (*dst, e.distance))
            .collect();
        let attrs = self.device_mut(n)?.attrs_mut();
        attrs.neighbors.insert(other);
        if attrs
            .routing_table
            .get(&other)
            .map_or(true, |e| cost < e.distance)
        {
            attrs
                .routing_table
                .insert(other, RoutingEntry::via(other, cost));
        }
        for (dst, distance) in snapshot {
            let through = distance + cost;
            if attrs
                .routing_table
                .get(&dst)
                .map_or(true, |e| through < e.distance)
            {
                attrs
                    .routing_table
                    .insert(dst, RoutingEntry::via(other, through));
            }
        }
        Ok(())
    }

    /*
     * Get devices and device IDs
     */

    /// Return an iterator over all device indices.
    pub fn indices(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.devices.keys().copied()
    }

    /// Return an iterator over all devices.
    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }

    /// Returns the number of devices in the topology
    pub fn num_devices(&self) -> usize {
        self.devices.len()
    }

    /// Returns a reference to the topology graph.
    pub fn topology(&self) -> &Topology {
        &self.net
    }

    /// Returns a reference to a device.
    pub fn get_device(&self, id: NodeId) -> Result<&Device, NetworkError> {
        self.devices
            .get(&id)
            .ok_or(NetworkError::DeviceNotFound(id))
    }

    fn device_mut(&mut self, id: NodeId) -> Result<&mut Device, NetworkError> {
        self.devices
            .get_mut(&id)
            .ok_or(NetworkError::DeviceNotFound(id))
    }

    /// Returns a reference to a router.
    pub fn get_router(&self, id: NodeId) -> Result<&Router, NetworkError> {
        self.get_device(id)?
            .router()
            .ok_or(NetworkError::NotARouter(id))
    }

    fn router_mut(&mut self, id: NodeId) -> Result<&mut Router, NetworkError> {
        self.device_mut(id)?
            .router_mut()
            .ok_or(NetworkError::NotARouter(id))
    }

    /// Returns a reference to a client.
    pub fn get_client(&self, id: NodeId) -> Result<&Client, NetworkError> {
        self.get_device(id)?
            .client()
            .ok_or(NetworkError::NotAClient(id))
    }

    fn client_mut(&mut self, id: NodeId) -> Result<&mut Client, NetworkError> {
        self.device_mut(id)?
            .client_mut()
            .ok_or(NetworkError::NotAClient(id))
    }

    /// Get the NodeId with the given name. If multiple devices have the same name, then the
    /// first occurrence of this name is returned. If the name was not found, an error is
    /// returned.
    pub fn get_node_id(&self, name: impl AsRef<str>) -> Result<NodeId, NetworkError> {
        self.devices
            .iter()
            .filter(|(_, d)| d.name() == name.as_ref())
            .map(|(id, _)| *id)
            .next()
            .ok_or_else(|| NetworkError::DeviceNameNotFound(name.as_ref().to_string()))
    }

    /// The router of the trust domain `node` belongs to: the node itself if it is a router,
    /// its parent router otherwise.
    pub fn trust_domain_router(&self, node: NodeId) -> Result<NodeId, NetworkError> {
        let device = self.get_device(node)?;
        if device.is_router() {
            Ok(node)
        } else {
            device
                .parent_router()
                .ok_or(NetworkError::NoTrustDomain(node))
        }
    }

    /// Whether `ancestor` appears strictly above `node` in the trust-domain tree.
    fn is_strict_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = node;
        while let Some(parent) = self
            .get_device(current)
            .ok()
            .and_then(|d| d.parent_router())
        {
            if parent == ancestor {
                return true;
            }
            current = parent;
        }
        false
    }

    /*
     * Unicast messaging
     */

    /// Send a message from `source` to `destination` and return the destination's response.
    /// The message is forwarded hop-by-hop; intermediate nodes resolve the next hop from
    /// their routing table, querying their trust-domain RIB on a miss.
    pub fn send_message(
        &mut self,
        source: NodeId,
        destination: NodeId,
        message: Message,
    ) -> Result<Response, NetworkError> {
        self.get_device(source)?;
        self.get_device(destination)?;
        self.send_from(source, source, destination, message)
    }

    /// Send an application payload from `source` to `destination`.
    pub fn ping(
        &mut self,
        source: NodeId,
        destination: NodeId,
        payload: impl Into<String>,
    ) -> Result<(), NetworkError> {
        self.send_message(source, destination, Message::Ping(payload.into()))?
            .into_none()
    }

    /// Forward a message that currently sits at `at` towards `destination`, keeping the
    /// original `source`. A message never needs more hops than there are devices.
    fn send_from(
        &mut self,
        at: NodeId,
        source: NodeId,
        destination: NodeId,
        message: Message,
    ) -> Result<Response, NetworkError> {
        let mut current = at;
        let mut hops = 0_usize;
        loop {
            if current == destination {
                return self.handle_message(current, source, message);
            }
            let next = self.next_hop(current, destination)?;
            trace!(
                "[{}] forward {:?} towards {}",
                self.name_of(current),
                message,
                self.name_of(destination)
            );
            current = next;
            hops += 1;
            if hops > self.devices.len() {
                return Err(NetworkError::ForwardingLoop {
                    origin: source,
                    destination,
                });
            }
        }
    }

    /// Resolve the next hop from `at` towards `destination`. A cache miss is answered by the
    /// RIB: a router queries its own, everyone else queries the trust-domain parent; the
    /// answer is cached before it is used.
    fn next_hop(&mut self, at: NodeId, destination: NodeId) -> Result<NodeId, NetworkError> {
        if let Some(entry) = self.get_device(at)?.attrs().routing_table().get(&destination) {
            if let Some(next_hop) = entry.next_hop {
                return Ok(next_hop);
            }
        }
        let resolved = if self.get_device(at)?.is_router() {
            self.rib_query_next_hop(at, at, destination)?
        } else {
            let parent = self
                .get_device(at)?
                .parent_router()
                .ok_or(NetworkError::NoTrustDomain(at))?;
            // the query itself travels toward the parent; without a cached route to the
            // parent there is nothing to ask
            if !self
                .get_device(at)?
                .attrs()
                .routing_table()
                .contains_key(&parent)
            {
                return Err(NetworkError::NoRoute {
                    origin: at,
                    destination,
                });
            }
            self.send_from(
                at,
                at,
                parent,
                Message::RibQueryNextHop {
                    start: at,
                    destination,
                },
            )?
            .into_next_hop()?
        };
        let (next_hop, distance) = resolved.ok_or(NetworkError::NoRoute {
            origin: at,
            destination,
        })?;
        self.device_mut(at)?
            .attrs_mut()
            .routing_table
            .insert(destination, RoutingEntry::via(next_hop, distance));
        Ok(next_hop)
    }

    /*
     * Message handlers
     */

    fn handle_message(
        &mut self,
        at: NodeId,
        source: NodeId,
        message: Message,
    ) -> Result<Response, NetworkError> {
        match self.get_device(at)?.role() {
            NodeRole::Router => self.handle_router_message(at, source, message),
            NodeRole::Switch => self.handle_switch_message(at, source, message),
            NodeRole::Client => self.handle_client_message(at, source, message),
        }
    }

    /// The dispatch table of a router: binds message kinds to RIB mutations and queries.
    fn handle_router_message(
        &mut self,
        at: NodeId,
        source: NodeId,
        message: Message,
    ) -> Result<Response, NetworkError> {
        match message {
            Message::Ping(payload) => {
                debug!("[{}] ping from {}: {}", self.name_of(at), self.name_of(source), payload);
                Ok(Response::None)
            }
            Message::RibAddLink { a, b, cost } => {
                self.rib_add_link(at, a, b, cost)?;
                Ok(Response::None)
            }
            Message::RibAddOwnership { router, node } => {
                self.rib_add_ownership(at, router, node)?;
                Ok(Response::None)
            }
            Message::RibQueryNextHop { start, destination } => Ok(Response::NextHop(
                self.rib_query_next_hop(at, start, destination)?,
            )),
            Message::RibQueryNextMulticastHops { group } => Ok(Response::MulticastHops(
                self.rib_query_next_multicast_hops(at, source, &group)?,
            )),
            Message::AddMulticastGroup { group, lca, owner } => {
                self.rib_add_multicast_group(at, &group, lca, owner)?;
                Ok(Response::None)
            }
            Message::ClientCreateMulticastGroup { group } => {
                self.rib_create_multicast_group(at, source, &group)?;
                Ok(Response::None)
            }
            Message::ClientJoinMulticastGroup { group } => Ok(Response::Owner(
                self.rib_client_join_multicast_group(at, source, &group)?,
            )),
            Message::RouterJoinMulticastGroup { group } => Ok(Response::Owner(
                self.rib_router_join_multicast_group(at, source, &group)?,
            )),
            Message::MulticastGroupTransferLca { group } => Ok(Response::ExternalTree(
                self.rib_transfer_lca(at, &group)?,
            )),
            Message::MulticastGroupSetLca { group, lca } => {
                self.rib_set_lca(at, &group, lca)?;
                Ok(Response::None)
            }
            Message::MulticastGroupRequestCredentials { .. }
            | Message::MulticastGroupSendCredentials(_) => {
                warn!(
                    "[{}] router cannot act as a credentials endpoint",
                    self.name_of(at)
                );
                Ok(Response::None)
            }
        }
    }

    fn handle_switch_message(
        &mut self,
        at: NodeId,
        source: NodeId,
        message: Message,
    ) -> Result<Response, NetworkError> {
        match message {
            Message::Ping(payload) => {
                debug!("[{}] ping from {}: {}", self.name_of(at), self.name_of(source), payload);
                Ok(Response::None)
            }
            other => {
                warn!("[{}] switch cannot handle {:?}", self.name_of(at), other);
                Ok(Response::None)
            }
        }
    }

    fn handle_client_message(
        &mut self,
        at: NodeId,
        source: NodeId,
        message: Message,
    ) -> Result<Response, NetworkError> {
        match message {
            Message::Ping(payload) => {
                debug!("[{}] ping from {}: {}", self.name_of(at), self.name_of(source), payload);
                self.client_mut(at)?.inbox.push(ReceivedPing {
                    source,
                    payload,
                });
                Ok(Response::None)
            }
            Message::MulticastGroupRequestCredentials { group } => {
                if !self.get_client(at)?.owned_groups.contains(&group) {
                    return Err(NetworkError::NotGroupOwner(group, at));
                }
                let token = GroupCredentials {
                    group,
                    issuer: at,
                };
                self.send_message(at, source, Message::MulticastGroupSendCredentials(token))?
                    .into_none()?;
                Ok(Response::None)
            }
            Message::MulticastGroupSendCredentials(token) => {
                self.client_mut(at)?
                    .credentials
                    .insert(token.group.clone(), token);
                Ok(Response::None)
            }
            other => {
                warn!("[{}] client cannot handle {:?}", self.name_of(at), other);
                Ok(Response::None)
            }
        }
    }

    /*
     * RIB maintenance
     */

    /// Record a link in the RIB of router `at` and propagate towards the ancestors: the link
    /// itself if it crosses a trust-domain boundary, coarse ownership of both endpoints
    /// otherwise.
    fn rib_add_link(
        &mut self,
        at: NodeId,
        a: NodeId,
        b: NodeId,
        cost: LinkWeight,
    ) -> Result<(), NetworkError> {
        let cost = NotNan::new(cost).map_err(|_| NetworkError::InvalidLinkWeight(a, b, cost))?;
        self.router_mut(at)?.rib.add_link(a, b, cost);
        let Some(parent) = self.get_device(at)?.parent_router() else {
            return Ok(());
        };
        let root_a = self.trust_domain_router(a)?;
        let root_b = self.trust_domain_router(b)?;
        if root_a != root_b {
            self.send_from(
                at,
                at,
                parent,
                Message::RibAddLink {
                    a,
                    b,
                    cost: cost.into_inner(),
                },
            )?
            .into_none()?;
        } else {
            self.send_from(at, at, parent, Message::RibAddOwnership { router: root_a, node: a })?
                .into_none()?;
            self.send_from(at, at, parent, Message::RibAddOwnership { router: root_b, node: b })?
                .into_none()?;
        }
        Ok(())
    }

    /// Record an ownership pointer and propagate it one level further up, re-rooted at this
    /// router, so every ancestor's ownership map is keyed by its direct children.
    fn rib_add_ownership(
        &mut self,
        at: NodeId,
        router: NodeId,
        node: NodeId,
    ) -> Result<(), NetworkError> {
        if at != router {
            self.router_mut(at)?.rib.add_ownership(router, node);
        }
        if let Some(parent) = self.get_device(at)?.parent_router() {
            self.send_from(at, at, parent, Message::RibAddOwnership { router: at, node })?
                .into_none()?;
        }
        Ok(())
    }

    /// Resolve the first hop from `start` towards `destination` at router `at`, escalating to
    /// the parent RIB if the local view cannot answer. Returns `None` if no route exists
    /// anywhere up the chain.
    pub fn rib_query_next_hop(
        &mut self,
        at: NodeId,
        start: NodeId,
        destination: NodeId,
    ) -> Result<Option<(NodeId, LinkWeight)>, NetworkError> {
        if self.get_device(destination)?.parent_router() == Some(at) {
            // the destination lives in this domain
            if let Some(hit) = self.get_router(at)?.rib.first_hop(start, destination) {
                return Ok(Some(hit));
            }
        } else if !self.get_device(start)?.is_router() {
            // a non-router can only ever step towards its own trust-domain router
            if let Some(domain) = self.get_device(start)?.parent_router() {
                if let Some(hit) = self.get_router(at)?.rib.first_hop(start, domain) {
                    return Ok(Some(hit));
                }
            }
        } else {
            // aim for the router of the destination's trust domain
            let target = self.trust_domain_router(destination)?;
            if let Some(hit) = self.get_router(at)?.rib.first_hop(start, target) {
                return Ok(Some(hit));
            }
        }
        // the destination may be owned by a child subtree this RIB cannot see into
        if let Some(child) = self.get_router(at)?.rib.owner_of(destination) {
            if child != destination {
                return self.rib_query_next_hop(at, start, child);
            }
        }
        match self.get_device(at)?.parent_router() {
            Some(parent) => self
                .send_from(at, at, parent, Message::RibQueryNextHop { start, destination })?
                .into_next_hop(),
            None => Ok(None),
        }
    }

    /*
     * Multicast group maintenance
     */

    /// Install (or refresh) the group entry at router `at` and propagate the creation towards
    /// the root, so that any ancestor can locate the LCA via lookup.
    fn rib_add_multicast_group(
        &mut self,
        at: NodeId,
        group: &str,
        lca: NodeId,
        owner: NodeId,
    ) -> Result<(), NetworkError> {
        {
            let router = self.router_mut(at)?;
            match router.rib.multicast_groups.get_mut(group) {
                Some(entry) => {
                    entry.lca = Some(lca);
                    entry.owner.get_or_insert(owner);
                }
                None => {
                    router
                        .rib
                        .multicast_groups
                        .insert(group.to_string(), GroupEntry::known(lca, owner));
                }
            }
        }
        if let Some(parent) = self.get_device(at)?.parent_router() {
            self.send_from(
                at,
                at,
                parent,
                Message::AddMulticastGroup {
                    group: group.to_string(),
                    lca,
                    owner,
                },
            )?
            .into_none()?;
        }
        Ok(())
    }

    /// Create a group at the creator's trust-domain router: install the entry with this
    /// router as the LCA, join the router itself, then attach the creator to the internal
    /// tree.
    fn rib_create_multicast_group(
        &mut self,
        at: NodeId,
        creator: NodeId,
        group: &str,
    ) -> Result<(), NetworkError> {
        debug!(
            "[{}] create multicast group '{}' for {}",
            self.name_of(at),
            group,
            self.name_of(creator)
        );
        self.rib_add_multicast_group(at, group, at, creator)?;
        self.rib_router_join_multicast_group(at, at, group)?;
        self.rib_client_join_multicast_group(at, creator, group)?;
        Ok(())
    }

    /// Join router `joining` into the group at router `at`. Ensures the local entry exists,
    /// demotes a subordinate LCA if necessary, and either splices the joining router into the
    /// external tree (if this router is the LCA) or escalates the join towards the parent.
    /// Returns the group owner.
    fn rib_router_join_multicast_group(
        &mut self,
        at: NodeId,
        joining: NodeId,
        group: &str,
    ) -> Result<NodeId, NetworkError> {
        let parent = self.get_device(at)?.parent_router();
        {
            let router = self.router_mut(at)?;
            match router.rib.multicast_groups.get_mut(group) {
                None => {
                    if parent.is_none() {
                        return Err(NetworkError::GroupNotFound(group.to_string()));
                    }
                    router
                        .rib
                        .multicast_groups
                        .insert(group.to_string(), GroupEntry::internal_only(at));
                }
                Some(entry) => {
                    if entry.internal.is_none() {
                        entry.internal = Some(GroupTree::seeded(at));
                    }
                }
            }
        }
        // LCA re-election: a known LCA strictly below this router must hand its external
        // tree over
        if let Some(old_lca) = self.group_entry(at, group)?.lca {
            if old_lca != at && self.is_strict_ancestor(at, old_lca) {
                debug!(
                    "[{}] taking over as LCA of '{}' from {}",
                    self.name_of(at),
                    group,
                    self.name_of(old_lca)
                );
                let tree = self
                    .send_from(
                        at,
                        at,
                        old_lca,
                        Message::MulticastGroupTransferLca {
                            group: group.to_string(),
                        },
                    )?
                    .into_external_tree()?;
                {
                    let entry = self.group_entry_mut(at, group)?;
                    entry.external = Some(tree);
                    entry.lca = Some(at);
                }
                self.splice_external(at, group, old_lca, false)?;
                self.announce_lca(at, group)?;
            }
        }
        if self.group_entry(at, group)?.lca == Some(at) {
            self.splice_external(at, group, joining, true)?;
            self.ensure_internal_self(at, group)?;
            self.group_entry(at, group)?
                .owner
                .ok_or_else(|| NetworkError::GroupOwnerUnknown(group.to_string()))
        } else {
            let parent = parent.ok_or_else(|| NetworkError::GroupNotFound(group.to_string()))?;
            let owner = self
                .send_from(
                    at,
                    joining,
                    parent,
                    Message::RouterJoinMulticastGroup {
                        group: group.to_string(),
                    },
                )?
                .into_owner()?;
            self.group_entry_mut(at, group)?.owner = Some(owner);
            Ok(owner)
        }
    }

    /// Join `client` into the group at its trust-domain router `at`: join the router itself
    /// first, then splice the client into the internal tree. Returns the group owner.
    fn rib_client_join_multicast_group(
        &mut self,
        at: NodeId,
        client: NodeId,
        group: &str,
    ) -> Result<NodeId, NetworkError> {
        let owner = self.rib_router_join_multicast_group(at, at, group)?;
        let targets = match &self.group_entry(at, group)?.internal {
            Some(tree) if !tree.nodes.is_empty() && !tree.nodes.contains(&client) => {
                Some(tree.nodes.clone())
            }
            _ => None,
        };
        let path = match targets {
            Some(targets) => Some(
                self.get_router(at)?
                    .rib
                    .path_to_any(client, &targets)
                    .ok_or_else(|| NetworkError::SpliceFailed {
                        group: group.to_string(),
                        node: client,
                    })?,
            ),
            None => None,
        };
        let touched = path.as_ref().map(|(nodes, _)| nodes.clone());
        {
            let entry = self.group_entry_mut(at, group)?;
            if let Some(internal) = entry.internal.as_mut() {
                if let Some((nodes, edges)) = path {
                    internal.absorb(nodes, edges);
                }
                internal.nodes.insert(client);
                internal.members.insert(client);
            }
        }
        // nodes on the spliced path may hold multicast hops cached before the tree grew
        if let Some(touched) = touched {
            self.invalidate_multicast_hops(touched, group);
        }
        Ok(owner)
    }

    /// Hand the external tree of the group over to a new LCA. The old LCA keeps its internal
    /// tree and splices itself into it, so external traffic still reaches its local members.
    fn rib_transfer_lca(&mut self, at: NodeId, group: &str) -> Result<GroupTree, NetworkError> {
        let tree = {
            let entry = self.group_entry_mut(at, group)?;
            let tree = entry
                .external
                .take()
                .ok_or_else(|| NetworkError::NotGroupLca(group.to_string(), at))?;
            entry.lca = None;
            tree
        };
        self.ensure_internal_self(at, group)?;
        Ok(tree)
    }

    /// Record the announced LCA, drop the group's cached multicast hops, and pass the
    /// announcement one level further up.
    fn rib_set_lca(&mut self, at: NodeId, group: &str, lca: NodeId) -> Result<(), NetworkError> {
        let updated = match self.router_mut(at)?.rib.multicast_groups.get_mut(group) {
            Some(entry) => {
                entry.lca = Some(lca);
                true
            }
            None => false,
        };
        if updated {
            self.device_mut(at)?
                .attrs_mut()
                .multicast_routing_table
                .remove(group);
            if let Some(parent) = self.get_device(at)?.parent_router() {
                self.send_from(
                    at,
                    at,
                    parent,
                    Message::MulticastGroupSetLca {
                        group: group.to_string(),
                        lca,
                    },
                )?
                .into_none()?;
            }
        }
        Ok(())
    }

    /// Announce this router as the group's LCA to every router it knows in its RIB, and up
    /// the parent chain.
    fn announce_lca(&mut self, at: NodeId, group: &str) -> Result<(), NetworkError> {
        let peers: Vec<NodeId> = self
            .get_router(at)?
            .rib
            .nodes()
            .iter()
            .copied()
            .filter(|n| *n != at && self.get_device(*n).map(|d| d.is_router()).unwrap_or(false))
            .collect();
        for peer in peers {
            self.send_from(
                at,
                at,
                peer,
                Message::MulticastGroupSetLca {
                    group: group.to_string(),
                    lca: at,
                },
            )?
            .into_none()?;
        }
        if let Some(parent) = self.get_device(at)?.parent_router() {
            self.send_from(
                at,
                at,
                parent,
                Message::MulticastGroupSetLca {
                    group: group.to_string(),
                    lca: at,
                },
            )?
            .into_none()?;
        }
        Ok(())
    }

    /// Splice `node` into the external tree of the group at the LCA `at`: connect it to the
    /// nearest tree node over this RIB and union the path in. A splice that finds no path
    /// aborts without touching the tree.
    fn splice_external(
        &mut self,
        at: NodeId,
        group: &str,
        node: NodeId,
        as_member: bool,
    ) -> Result<(), NetworkError> {
        let targets = match &self.group_entry(at, group)?.external {
            Some(tree) if !tree.nodes.is_empty() && !tree.nodes.contains(&node) => {
                Some(tree.nodes.clone())
            }
            _ => None,
        };
        let path = match targets {
            Some(targets) => Some(
                self.get_router(at)?
                    .rib
                    .path_to_any(node, &targets)
                    .ok_or_else(|| NetworkError::SpliceFailed {
                        group: group.to_string(),
                        node,
                    })?,
            ),
            None => None,
        };
        let entry = self.group_entry_mut(at, group)?;
        let external = entry.external.get_or_insert_with(GroupTree::default);
        if let Some((nodes, edges)) = path {
            external.absorb(nodes, edges);
        }
        external.nodes.insert(node);
        if as_member {
            external.members.insert(node);
        }
        Ok(())
    }

    /// Make sure router `at` itself is part of its internal tree (if one exists), splicing it
    /// in over the RIB if necessary.
    fn ensure_internal_self(&mut self, at: NodeId, group: &str) -> Result<(), NetworkError> {
        let targets = match &self.group_entry(at, group)?.internal {
            None => return Ok(()),
            Some(tree) if tree.nodes.is_empty() || tree.nodes.contains(&at) => None,
            Some(tree) => Some(tree.nodes.clone()),
        };
        let path = match targets {
            Some(targets) => Some(
                self.get_router(at)?
                    .rib
                    .path_to_any(at, &targets)
                    .ok_or_else(|| NetworkError::SpliceFailed {
                        group: group.to_string(),
                        node: at,
                    })?,
            ),
            None => None,
        };
        let touched = path.as_ref().map(|(nodes, _)| nodes.clone());
        {
            let entry = self.group_entry_mut(at, group)?;
            if let Some(internal) = entry.internal.as_mut() {
                if let Some((nodes, edges)) = path {
                    internal.absorb(nodes, edges);
                }
                internal.nodes.insert(at);
            }
        }
        if let Some(touched) = touched {
            self.invalidate_multicast_hops(touched, group);
        }
        Ok(())
    }

    /// Resolve the multicast tree neighbors of `start` for the group at router `at`: the
    /// internal edges incident to `start`, plus, for routers, the external edges at the LCA
    /// or the answer escalated towards it.
    pub fn rib_query_next_multicast_hops(
        &mut self,
        at: NodeId,
        start: NodeId,
        group: &str,
    ) -> Result<Vec<NodeId>, NetworkError> {
        let parent = self.get_device(at)?.parent_router();
        if !self
            .get_router(at)?
            .rib
            .multicast_groups
            .contains_key(group)
        {
            return match parent {
                Some(parent) => self
                    .send_from(
                        at,
                        start,
                        parent,
                        Message::RibQueryNextMulticastHops {
                            group: group.to_string(),
                        },
                    )?
                    .into_multicast_hops(),
                None => {
                    warn!(
                        "[{}] could not find multicast group '{}'",
                        self.name_of(at),
                        group
                    );
                    Ok(Vec::new())
                }
            };
        }
        let (mut hops, escalate) = {
            let entry = self.group_entry(at, group)?;
            let mut hops: Vec<NodeId> = entry
                .internal
                .as_ref()
                .map(|tree| tree.neighbors_of(start))
                .unwrap_or_default();
            let mut escalate = false;
            if self.get_device(start)?.is_router() {
                if entry.lca == Some(at) {
                    if let Some(external) = &entry.external {
                        hops.extend(external.neighbors_of(start));
                    }
                } else if parent.is_some() {
                    escalate = true;
                }
            }
            (hops, escalate)
        };
        if escalate {
            if let Some(parent) = parent {
                hops.extend(
                    self.send_from(
                        at,
                        start,
                        parent,
                        Message::RibQueryNextMulticastHops {
                            group: group.to_string(),
                        },
                    )?
                    .into_multicast_hops()?,
                );
            }
        }
        Ok(hops.into_iter().unique().collect())
    }

    fn group_entry(&self, at: NodeId, group: &str) -> Result<&GroupEntry, NetworkError> {
        self.get_router(at)?
            .rib
            .multicast_groups
            .get(group)
            .ok_or_else(|| NetworkError::GroupNotFound(group.to_string()))
    }

    fn group_entry_mut(&mut self, at: NodeId, group: &str) -> Result<&mut GroupEntry, NetworkError> {
        self.router_mut(at)?
            .rib
            .multicast_groups
            .get_mut(group)
            .ok_or_else(|| NetworkError::GroupNotFound(group.to_string()))
    }

    /// Drop the cached multicast hops for `group` at every given node.
    fn invalidate_multicast_hops(&mut self, nodes: impl IntoIterator<Item = NodeId>, group: &str) {
        for node in nodes {
            if let Some(device) = self.devices.get_mut(&node) {
                device.attrs_mut().multicast_routing_table.remove(group);
            }
        }
    }

    /*
     * Multicast forwarding
     */

    /// Create a new multicast group owned by `client`.
    pub fn create_multicast_group(
        &mut self,
        client: NodeId,
        group: impl Into<String>,
    ) -> Result<(), NetworkError> {
        let group = group.into();
        let parent = self
            .get_client(client)?
            .attrs()
            .parent_router()
            .ok_or(NetworkError::NoTrustDomain(client))?;
        self.send_message(
            client,
            parent,
            Message::ClientCreateMulticastGroup {
                group: group.clone(),
            },
        )?
        .into_none()?;
        let c = self.client_mut(client)?;
        c.multicast_groups.insert(group.clone());
        c.owned_groups.insert(group.clone());
        c.group_owners.insert(group, client);
        Ok(())
    }

    /// Join `client` into an existing multicast group and return the group owner.
    pub fn join_multicast_group(
        &mut self,
        client: NodeId,
        group: impl Into<String>,
    ) -> Result<NodeId, NetworkError> {
        let group = group.into();
        let parent = self
            .get_client(client)?
            .attrs()
            .parent_router()
            .ok_or(NetworkError::NoTrustDomain(client))?;
        let owner = self
            .send_message(
                client,
                parent,
                Message::ClientJoinMulticastGroup {
                    group: group.clone(),
                },
            )?
            .into_owner()?;
        let c = self.client_mut(client)?;
        c.multicast_groups.insert(group.clone());
        c.group_owners.insert(group, owner);
        Ok(owner)
    }

    /// Ask the group owner for credentials. The owner answers with a
    /// [`Message::MulticastGroupSendCredentials`] message; the received token is returned and
    /// kept in the client's credential store.
    pub fn request_group_credentials(
        &mut self,
        client: NodeId,
        group: impl Into<String>,
    ) -> Result<GroupCredentials, NetworkError> {
        let group = group.into();
        let owner = self
            .get_client(client)?
            .group_owners
            .get(&group)
            .copied()
            .ok_or_else(|| NetworkError::GroupNotFound(group.clone()))?;
        self.send_message(
            client,
            owner,
            Message::MulticastGroupRequestCredentials {
                group: group.clone(),
            },
        )?
        .into_none()?;
        self.get_client(client)?
            .credentials(&group)
            .cloned()
            .ok_or(NetworkError::UnexpectedResponse("credential request"))
    }

    /// Send an application payload into a multicast group. The payload is flooded along the
    /// distribution trees and delivered exactly once to every joined client except the
    /// sender.
    pub fn send_multicast_message(
        &mut self,
        source: NodeId,
        group: &str,
        payload: impl Into<String>,
    ) -> Result<(), NetworkError> {
        self.get_device(source)?;
        let payload = payload.into();
        let mut visited = BTreeSet::new();
        self.multicast_from(source, source, group, &payload, &mut visited)
    }

    /// Forward a multicast payload sitting at `at` to all tree neighbors that were not
    /// visited yet. Joined clients consume the payload; everyone else forwards it further.
    fn multicast_from(
        &mut self,
        at: NodeId,
        source: NodeId,
        group: &str,
        payload: &str,
        visited: &mut BTreeSet<NodeId>,
    ) -> Result<(), NetworkError> {
        let hops = self.next_multicast_hops(at, group)?;
        visited.insert(at);
        for hop in hops {
            if visited.contains(&hop) {
                continue;
            }
            let deliver = self
                .get_device(hop)?
                .client()
                .map_or(false, |c| c.is_member(group));
            if deliver {
                visited.insert(hop);
                debug!(
                    "[{}] multicast '{}' from {}: {}",
                    self.name_of(hop),
                    group,
                    self.name_of(source),
                    payload
                );
                self.client_mut(hop)?.inbox.push(ReceivedPing {
                    source,
                    payload: payload.to_string(),
                });
            } else {
                self.multicast_from(hop, source, group, payload, visited)?;
            }
        }
        Ok(())
    }

    /// The multicast tree neighbors of `at`. Routers resolve them from their RIB on every
    /// call; other nodes cache the answer of their trust-domain router.
    fn next_multicast_hops(&mut self, at: NodeId, group: &str) -> Result<Vec<NodeId>, NetworkError> {
        if self.get_device(at)?.is_router() {
            return self.rib_query_next_multicast_hops(at, at, group);
        }
        if let Some(cached) = self
            .get_device(at)?
            .attrs()
            .multicast_routing_table()
            .get(group)
        {
            return Ok(cached.clone());
        }
        let parent = self
            .get_device(at)?
            .parent_router()
            .ok_or(NetworkError::NoTrustDomain(at))?;
        let hops = self
            .send_from(
                at,
                at,
                parent,
                Message::RibQueryNextMulticastHops {
                    group: group.to_string(),
                },
            )?
            .into_multicast_hops()?;
        self.device_mut(at)?
            .attrs_mut()
            .multicast_routing_table
            .insert(group.to_string(), hops.clone());
        Ok(hops)
    }

    /// The device name, for log output.
    fn name_of(&self, id: NodeId) -> &str {
        self.devices.get(&id).map(|d| d.name()).unwrap_or("?")
    }
}
