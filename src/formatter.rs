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

//! Module to format identifiers and collections of identifiers with their device names. Ids
//! alone (`NodeIndex(3)`) make poor log and assertion output; this trait renders them against
//! the registry.

use std::collections::BTreeSet;

use itertools::Itertools;

use crate::{
    network::Network,
    types::{NodeId, RibEdge},
};

/// Render `self` against the device registry of a network.
pub trait NetworkFormatter {
    /// Return a human-readable string using the device names of `net`.
    fn fmt(&self, net: &Network) -> String;
}

impl NetworkFormatter for NodeId {
    fn fmt(&self, net: &Network) -> String {
        net.get_device(*self)
            .map(|d| d.name().to_string())
            .unwrap_or_else(|_| format!("{:?}", self))
    }
}

impl NetworkFormatter for Option<NodeId> {
    fn fmt(&self, net: &Network) -> String {
        match self {
            Some(id) => id.fmt(net),
            None => String::from("None"),
        }
    }
}

impl NetworkFormatter for &[NodeId] {
    fn fmt(&self, net: &Network) -> String {
        format!("[{}]", self.iter().map(|id| id.fmt(net)).join(", "))
    }
}

impl NetworkFormatter for Vec<NodeId> {
    fn fmt(&self, net: &Network) -> String {
        self.as_slice().fmt(net)
    }
}

impl NetworkFormatter for BTreeSet<NodeId> {
    fn fmt(&self, net: &Network) -> String {
        format!("{{{}}}", self.iter().map(|id| id.fmt(net)).join(", "))
    }
}

impl NetworkFormatter for RibEdge {
    fn fmt(&self, net: &Network) -> String {
        format!("{} -- {} ({})", self.a.fmt(net), self.b.fmt(net), self.cost())
    }
}

impl NetworkFormatter for BTreeSet<RibEdge> {
    fn fmt(&self, net: &Network) -> String {
        format!("{{{}}}", self.iter().map(|e| e.fmt(net)).join(", "))
    }
}
