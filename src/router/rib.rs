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

//! Module defining the Routing Information Base of a single router and its shortest-path
//! queries.
//!
//! A RIB knows the links of its own trust domain plus the boundary links of subordinate
//! domains, and records which child subtree owns which node. It never learns the internal
//! edges of a subordinate domain. Both shortest-path queries relax over [`crate::types::RibEdge`]
//! triples by linear scan; the edge sets of a single domain are small enough that an adjacency
//! index would not pay for itself.

use std::{
    cmp::Ordering,
    collections::{BTreeMap, BTreeSet, BinaryHeap},
};

use ordered_float::NotNan;
use serde::{Deserialize, Serialize};
use serde_with::serde_as;

use super::GroupEntry;
use crate::types::{LinkWeight, NodeId, RibEdge};

/// The Routing Information Base of a single router: the topology the router is entitled to
/// see, the ownership pointers to subordinate domains, and the multicast group entries.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Rib {
    /// The nodes this router knows to exist (own domain plus boundary links).
    pub(crate) nodes: BTreeSet<NodeId>,
    /// The links between known nodes.
    pub(crate) edges: BTreeSet<RibEdge>,
    /// Which nodes are owned by which direct child router's subtree.
    #[serde_as(as = "Vec<(_, _)>")]
    pub(crate) child_ownerships: BTreeMap<NodeId, BTreeSet<NodeId>>,
    /// The multicast groups this router knows about.
    pub(crate) multicast_groups: BTreeMap<String, GroupEntry>,
}

/// Entry of the Dijkstra priority queue. The ordering is reversed on the distance so that the
/// `BinaryHeap` pops the closest node first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct HeapEntry {
    node: NodeId,
    distance: NotNan<LinkWeight>,
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .distance
            .cmp(&self.distance)
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl Rib {
    /// The nodes this router knows to exist.
    pub fn nodes(&self) -> &BTreeSet<NodeId> {
        &self.nodes
    }

    /// The links between known nodes.
    pub fn edges(&self) -> &BTreeSet<RibEdge> {
        &self.edges
    }

    /// Which nodes are owned by which direct child router's subtree.
    pub fn child_ownerships(&self) -> &BTreeMap<NodeId, BTreeSet<NodeId>> {
        &self.child_ownerships
    }

    /// The multicast groups this router knows about.
    pub fn multicast_groups(&self) -> &BTreeMap<String, GroupEntry> {
        &self.multicast_groups
    }

    /// Record a link and its endpoints.
    pub(crate) fn add_link(&mut self, a: NodeId, b: NodeId, cost: NotNan<LinkWeight>) {
        self.nodes.insert(a);
        self.nodes.insert(b);
        self.edges.insert(RibEdge::new(a, b, cost));
    }

    /// Record that the subtree rooted at `router` owns `node`.
    pub(crate) fn add_ownership(&mut self, router: NodeId, node: NodeId) {
        self.child_ownerships.entry(router).or_default().insert(node);
    }

    /// The direct child router whose subtree owns `node`, if any.
    pub(crate) fn owner_of(&self, node: NodeId) -> Option<NodeId> {
        self.child_ownerships
            .iter()
            .find(|(_, owned)| owned.contains(&node))
            .map(|(child, _)| *child)
    }

    /// Shortest path from `start` to `destination`, returning the *first hop out of `start`*
    /// and the total distance. `None` if `destination` is unreachable over this RIB, or if
    /// `start == destination`.
    pub(crate) fn first_hop(
        &self,
        start: NodeId,
        destination: NodeId,
    ) -> Option<(NodeId, LinkWeight)> {
        if start == destination {
            return None;
        }
        let (_, distance, predecessors) = self.run_dijkstra(start, |n| n == destination)?;
        // backtrack from the destination until the predecessor is the start
        let mut hop = destination;
        while let Some((prev, _)) = predecessors.get(&hop) {
            if *prev == start {
                return Some((hop, distance.into_inner()));
            }
            hop = *prev;
        }
        None
    }

    /// Shortest path from `start` to the nearest node of `targets`, returning all nodes on the
    /// path and its edges in start-to-target order. `None` if no target is reachable. If
    /// `start` itself is a target, the path is trivially empty.
    pub(crate) fn path_to_any(
        &self,
        start: NodeId,
        targets: &BTreeSet<NodeId>,
    ) -> Option<(BTreeSet<NodeId>, Vec<RibEdge>)> {
        if targets.contains(&start) {
            return Some((BTreeSet::from([start]), Vec::new()));
        }
        let (reached, _, predecessors) = self.run_dijkstra(start, |n| targets.contains(&n))?;
        let mut nodes = BTreeSet::from([start, reached]);
        let mut edges = Vec::new();
        let mut node = reached;
        while let Some((prev, edge)) = predecessors.get(&node) {
            nodes.insert(*prev);
            edges.push(*edge);
            if *prev == start {
                break;
            }
            node = *prev;
        }
        edges.reverse();
        Some((nodes, edges))
    }

    /// The shared relaxation loop. Terminates as soon as a node satisfying `done` is popped
    /// and returns that node and its distance together with the predecessor chain
    /// (predecessor node and the edge towards it, per relaxed node). `None` if the search ran
    /// dry first.
    fn run_dijkstra<F: Fn(NodeId) -> bool>(
        &self,
        start: NodeId,
        done: F,
    ) -> Option<(NodeId, NotNan<LinkWeight>, BTreeMap<NodeId, (NodeId, RibEdge)>)> {
        let zero = NotNan::new(0.0).expect("0.0 is not NaN");
        let mut distances: BTreeMap<NodeId, NotNan<LinkWeight>> = BTreeMap::from([(start, zero)]);
        let mut predecessors: BTreeMap<NodeId, (NodeId, RibEdge)> = BTreeMap::new();
        let mut visited: BTreeSet<NodeId> = BTreeSet::new();
        let mut queue = BinaryHeap::from([HeapEntry {
            node: start,
            distance: zero,
        }]);

        while let Some(HeapEntry { node, distance }) = queue.pop() {
            if !visited.insert(node) {
                continue;
            }
            if done(node) {
                return Some((node, distance, predecessors));
            }
            for edge in self.edges.iter().filter(|e| e.incident(node)) {
                let neighbor = edge.other(node).expect("edge is incident to node");
                if visited.contains(&neighbor) {
                    continue;
                }
                let next_distance = distance + edge.cost;
                if distances
                    .get(&neighbor)
                    .map_or(true, |d| next_distance < *d)
                {
                    distances.insert(neighbor, next_distance);
                    predecessors.insert(neighbor, (node, *edge));
                    queue.push(HeapEntry {
                        node: neighbor,
                        distance: next_distance,
                    });
                }
            }
        }

        None
    }
}
