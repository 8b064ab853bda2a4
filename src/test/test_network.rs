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

use pretty_assertions::assert_eq;

use super::two_domains;
use crate::{network::Network, types::NetworkError};

#[test]
fn test_intra_domain_ping() {
    let mut net = Network::new();
    let r = net.add_router("r", None).unwrap();
    let s = net.add_switch("s", r).unwrap();
    net.add_link(s, r, 1.0).unwrap();
    let c1 = net.add_client("c1", s).unwrap();
    let c2 = net.add_client("c2", s).unwrap();

    net.ping(c1, c2, "hi").unwrap();

    let inbox = net.get_client(c2).unwrap().inbox();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].source, c1);
    assert_eq!(inbox[0].payload, "hi");
    assert!(net.get_client(c1).unwrap().inbox().is_empty());
}

#[test]
fn test_two_level_unicast() {
    let _ = env_logger::builder().is_test(true).try_init();
    let (mut net, t) = two_domains();

    net.ping(t.ca, t.cb, "x").unwrap();

    let inbox = net.get_client(t.cb).unwrap().inbox();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].source, t.ca);

    // the message took the path ca -> ra -> root -> rb -> cb; each hop cached its decision
    let hop = |at, to| {
        net.get_device(at)
            .unwrap()
            .attrs()
            .routing_table()
            .get(&to)
            .unwrap()
            .next_hop
    };
    assert_eq!(hop(t.ca, t.cb), Some(t.ra));
    assert_eq!(hop(t.ra, t.cb), Some(t.root));
    assert_eq!(hop(t.root, t.cb), Some(t.rb));
    assert_eq!(hop(t.rb, t.cb), Some(t.cb));
}

#[test]
fn test_forwarding_through_switch_chain() {
    let mut net = Network::new();
    let r = net.add_router("r", None).unwrap();
    let s1 = net.add_switch("s1", r).unwrap();
    net.add_link(s1, r, 1.0).unwrap();
    let s2 = net.add_switch("s2", r).unwrap();
    net.add_link(s2, s1, 1.0).unwrap();
    let c1 = net.add_client("c1", s2).unwrap();
    let c2 = net.add_client("c2", s1).unwrap();

    net.ping(c1, c2, "over two switches").unwrap();
    net.ping(c2, c1, "and back").unwrap();

    assert_eq!(net.get_client(c2).unwrap().inbox().len(), 1);
    assert_eq!(net.get_client(c1).unwrap().inbox().len(), 1);
}

#[test]
fn test_link_symmetry() {
    let (mut net, _) = two_domains();
    let s = net.add_switch("s", net.get_node_id("ra").unwrap()).unwrap();
    net.add_link(s, net.get_node_id("ra").unwrap(), 2.0).unwrap();

    for id in net.indices().collect::<Vec<_>>() {
        for neighbor in net.get_device(id).unwrap().attrs().neighbors().clone() {
            assert!(
                net.get_device(neighbor)
                    .unwrap()
                    .attrs()
                    .neighbors()
                    .contains(&id),
                "link {:?} -- {:?} is not symmetric",
                id,
                neighbor
            );
        }
    }
}

#[test]
fn test_routing_table_invariant() {
    let (net, _) = two_domains();

    for id in net.indices() {
        let attrs = net.get_device(id).unwrap().attrs();
        let self_entry = attrs.routing_table().get(&id).unwrap();
        assert_eq!(self_entry.next_hop, None);
        assert_eq!(self_entry.distance, 0.0);
        for (destination, entry) in attrs.routing_table() {
            if *destination == id {
                continue;
            }
            let hop = entry.next_hop.expect("non-self entries carry a next hop");
            assert!(attrs.neighbors().contains(&hop));
            assert!(entry.distance >= 1.0);
        }
    }
}

#[test]
fn test_add_link_idempotent() {
    let build = |twice: bool| {
        let mut net = Network::new();
        let root = net.add_router("root", None).unwrap();
        let ra = net.add_router("ra", Some(root)).unwrap();
        net.add_link(ra, root, 1.0).unwrap();
        if twice {
            net.add_link(ra, root, 1.0).unwrap();
        }
        let ca = net.add_client("ca", ra).unwrap();
        (net, root, ra, ca)
    };
    let (once, root, ra, _) = build(false);
    let (twice, ..) = build(true);

    assert_eq!(
        once.get_device(ra).unwrap().attrs().routing_table(),
        twice.get_device(ra).unwrap().attrs().routing_table()
    );
    assert_eq!(
        once.get_router(root).unwrap().rib(),
        twice.get_router(root).unwrap().rib()
    );
    assert_eq!(
        once.get_router(ra).unwrap().rib(),
        twice.get_router(ra).unwrap().rib()
    );
}

#[test]
fn test_no_route_between_disjoint_trees() {
    let mut net = Network::new();
    let root_a = net.add_router("root_a", None).unwrap();
    let ca = net.add_client("ca", root_a).unwrap();
    let root_b = net.add_router("root_b", None).unwrap();
    let cb = net.add_client("cb", root_b).unwrap();

    let result = net.ping(ca, cb, "into the void");
    assert!(matches!(result, Err(NetworkError::NoRoute { .. })));
    assert!(net.get_client(cb).unwrap().inbox().is_empty());
}

#[test]
fn test_invalid_topology_input() {
    let mut net = Network::new();
    let root = net.add_router("root", None).unwrap();
    let ra = net.add_router("ra", Some(root)).unwrap();

    assert_eq!(net.add_link(ra, ra, 1.0), Err(NetworkError::SelfLink(ra)));
    assert_eq!(
        net.add_link(ra, root, 0.5),
        Err(NetworkError::InvalidLinkWeight(ra, root, 0.5))
    );
    assert!(matches!(
        net.add_link(ra, root, f64::NAN),
        Err(NetworkError::InvalidLinkWeight(..))
    ));
    let ca = net.add_client("ca", ra).unwrap();
    assert_eq!(net.add_switch("s", ca), Err(NetworkError::NotARouter(ca)));
}

#[test]
fn test_name_lookup() {
    let (net, t) = two_domains();
    assert_eq!(net.get_node_id("root").unwrap(), t.root);
    assert_eq!(net.get_node_id("cb").unwrap(), t.cb);
    assert_eq!(
        net.get_node_id("nobody"),
        Err(NetworkError::DeviceNameNotFound("nobody".to_string()))
    );
    assert_eq!(net.num_devices(), 5);
}

#[test]
fn test_serde_roundtrip() {
    let (mut net, t) = two_domains();
    net.ping(t.ca, t.cb, "state to keep").unwrap();

    let json = serde_json::to_string(&net).unwrap();
    let restored: Network = serde_json::from_str(&json).unwrap();

    assert_eq!(net.devices, restored.devices);
}
