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

//! Module defining the per-router multicast group state.
//!
//! A [`GroupEntry`] holds two conceptually separate spanning subgraphs: the *internal* tree,
//! connecting the joined clients of this router's own domain to the router, and the
//! *external* tree, connecting all joined subordinate routers inside the LCA's RIB. The
//! internal tree exists if and only if the router has at least one local member; the external
//! tree exists only at the router that currently acts as the group's LCA.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::types::{NodeId, RibEdge};

/// One spanning subgraph of a multicast group: the joined endpoints, the Steiner nodes that
/// connect them, and the tree edges.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GroupTree {
    /// The endpoints that joined (clients in an internal tree, routers in an external tree).
    pub members: BTreeSet<NodeId>,
    /// All nodes spanned by the tree, members and Steiner nodes alike.
    pub nodes: BTreeSet<NodeId>,
    /// The tree edges.
    pub edges: BTreeSet<RibEdge>,
}

impl GroupTree {
    /// A tree spanning a single node, with no members yet.
    pub(crate) fn seeded(node: NodeId) -> Self {
        Self {
            members: BTreeSet::new(),
            nodes: BTreeSet::from([node]),
            edges: BTreeSet::new(),
        }
    }

    /// The tree neighbors of `node`: the opposite endpoint of every tree edge incident to it.
    pub fn neighbors_of(&self, node: NodeId) -> Vec<NodeId> {
        self.edges.iter().filter_map(|e| e.other(node)).collect()
    }

    /// Union a splice path into the tree.
    pub(crate) fn absorb(&mut self, nodes: impl IntoIterator<Item = NodeId>, edges: impl IntoIterator<Item = RibEdge>) {
        self.nodes.extend(nodes);
        self.edges.extend(edges);
    }
}

/// The state a router keeps for one multicast group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupEntry {
    /// The router currently elected as the group's lowest common ancestor. `None` if this
    /// router learned of the group only through a join escalating through it.
    pub(crate) lca: Option<NodeId>,
    /// The creator client, acting as the credentials authority. Learned at creation or cached
    /// from a join response.
    pub(crate) owner: Option<NodeId>,
    /// The internal tree. Present if and only if this router has at least one local member.
    pub(crate) internal: Option<GroupTree>,
    /// The external tree. Present only while this router is the group's LCA.
    pub(crate) external: Option<GroupTree>,
}

impl GroupEntry {
    /// The entry installed at creation time and propagated to all ancestors of the creating
    /// router.
    pub(crate) fn known(lca: NodeId, owner: NodeId) -> Self {
        Self {
            lca: Some(lca),
            owner: Some(owner),
            internal: None,
            external: None,
        }
    }

    /// The entry installed at a router that a join escalates through without the group being
    /// known there. The router becomes part of the distribution structure but does not learn
    /// the LCA.
    pub(crate) fn internal_only(router: NodeId) -> Self {
        Self {
            lca: None,
            owner: None,
            internal: Some(GroupTree::seeded(router)),
            external: None,
        }
    }

    /// The router this entry believes to be the group's LCA.
    pub fn lca(&self) -> Option<NodeId> {
        self.lca
    }

    /// The group owner, if known at this router.
    pub fn owner(&self) -> Option<NodeId> {
        self.owner
    }

    /// Whether this router has at least one local member.
    pub fn is_member(&self) -> bool {
        self.internal.is_some()
    }

    /// The internal tree, present if and only if [`GroupEntry::is_member`].
    pub fn internal(&self) -> Option<&GroupTree> {
        self.internal.as_ref()
    }

    /// The external tree, present only at the group's current LCA.
    pub fn external(&self) -> Option<&GroupTree> {
        self.external.as_ref()
    }
}
