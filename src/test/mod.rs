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

//! Test module

use crate::network::Network;
use crate::types::NodeId;

mod test_multicast;
mod test_network;

/// Two sibling domains below a root router, one client each:
///
/// ```text
///      root
///     /    \
///    ra    rb
///    |      |
///    ca    cb
/// ```
pub struct TwoDomains {
    pub root: NodeId,
    pub ra: NodeId,
    pub rb: NodeId,
    pub ca: NodeId,
    pub cb: NodeId,
}

pub fn two_domains() -> (Network, TwoDomains) {
    let mut net = Network::new();
    let root = net.add_router("root", None).unwrap();
    let ra = net.add_router("ra", Some(root)).unwrap();
    net.add_link(ra, root, 1.0).unwrap();
    let rb = net.add_router("rb", Some(root)).unwrap();
    net.add_link(rb, root, 1.0).unwrap();
    let ca = net.add_client("ca", ra).unwrap();
    let cb = net.add_client("cb", rb).unwrap();
    (net, TwoDomains { root, ra, rb, ca, cb })
}

/// A chain of trust domains `root -> r1 -> ... -> r<depth>`, each deep router carrying one
/// client.
pub struct DomainChain {
    pub root: NodeId,
    pub routers: Vec<NodeId>,
    pub clients: Vec<NodeId>,
}

pub fn domain_chain(depth: usize) -> (Network, DomainChain) {
    let mut net = Network::new();
    let root = net.add_router("root", None).unwrap();
    let mut routers = Vec::new();
    let mut clients = Vec::new();
    let mut parent = root;
    for i in 1..=depth {
        let router = net.add_router(format!("r{i}"), Some(parent)).unwrap();
        net.add_link(router, parent, 1.0).unwrap();
        let client = net.add_client(format!("c{i}"), router).unwrap();
        routers.push(router);
        clients.push(client);
        parent = router;
    }
    (net, DomainChain { root, routers, clients })
}
