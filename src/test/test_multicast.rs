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

use std::collections::BTreeSet;

use maplit::btreeset;
use pretty_assertions::assert_eq;

use super::{domain_chain, two_domains};
use crate::{
    message::Message,
    network::Network,
    types::{NetworkError, NodeId},
};

/// All nodes reachable from `from` by traversing the internal tree edges of `group` at
/// `router` only.
fn internal_reach(net: &Network, router: NodeId, group: &str, from: NodeId) -> BTreeSet<NodeId> {
    let tree = net
        .get_router(router)
        .unwrap()
        .multicast_group(group)
        .unwrap()
        .internal()
        .unwrap();
    let mut reached = btreeset! {from};
    let mut frontier = vec![from];
    while let Some(node) = frontier.pop() {
        for next in tree.neighbors_of(node) {
            if reached.insert(next) {
                frontier.push(next);
            }
        }
    }
    reached
}

/// The routers currently holding a non-empty external tree for `group`.
fn external_holders(net: &Network, group: &str) -> Vec<NodeId> {
    net.indices()
        .filter(|id| {
            net.get_device(*id)
                .unwrap()
                .router()
                .and_then(|r| r.multicast_group(group))
                .and_then(|e| e.external())
                .map(|t| !t.nodes.is_empty())
                .unwrap_or(false)
        })
        .collect()
}

#[test]
fn test_create_elects_creating_router_as_lca() {
    let (mut net, t) = two_domains();
    net.create_multicast_group(t.ca, "g").unwrap();

    let ra_entry = net.get_router(t.ra).unwrap().multicast_group("g").unwrap();
    assert_eq!(ra_entry.lca(), Some(t.ra));
    assert_eq!(ra_entry.owner(), Some(t.ca));
    assert!(ra_entry.is_member());
    assert_eq!(&ra_entry.internal().unwrap().members, &btreeset! {t.ca});
    assert_eq!(&ra_entry.external().unwrap().members, &btreeset! {t.ra});

    // every ancestor stores the same LCA, without becoming a member itself
    let root_entry = net.get_router(t.root).unwrap().multicast_group("g").unwrap();
    assert_eq!(root_entry.lca(), Some(t.ra));
    assert_eq!(root_entry.owner(), Some(t.ca));
    assert!(!root_entry.is_member());
    assert!(root_entry.external().is_none());

    // the sibling domain never hears about the group
    assert!(net.get_router(t.rb).unwrap().multicast_group("g").is_none());
}

#[test]
fn test_join_from_sibling_domain_transfers_lca() {
    let (mut net, t) = two_domains();
    net.create_multicast_group(t.ca, "g").unwrap();
    let owner = net.join_multicast_group(t.cb, "g").unwrap();
    assert_eq!(owner, t.ca);

    // the old LCA gave its external tree up
    let ra_entry = net.get_router(t.ra).unwrap().multicast_group("g").unwrap();
    assert!(ra_entry.external().is_none());
    assert!(ra_entry.is_member());

    // the root now holds the external tree spanning both joined routers
    let root_entry = net.get_router(t.root).unwrap().multicast_group("g").unwrap();
    assert_eq!(root_entry.lca(), Some(t.root));
    let external = root_entry.external().unwrap();
    assert!(external.members.is_superset(&btreeset! {t.ra, t.rb}));
    assert!(external.nodes.is_superset(&btreeset! {t.ra, t.rb, t.root}));

    // exactly one router in the whole system holds an external tree
    assert_eq!(external_holders(&net, "g"), vec![t.root]);

    // every router that knows the group agrees on the new LCA
    for router in [t.root, t.ra, t.rb] {
        let entry = net.get_router(router).unwrap().multicast_group("g").unwrap();
        assert_eq!(entry.lca(), Some(t.root), "stale LCA at {:?}", router);
    }
}

#[test]
fn test_multicast_delivery_two_domains() {
    let (mut net, t) = two_domains();
    net.create_multicast_group(t.ca, "g").unwrap();
    net.join_multicast_group(t.cb, "g").unwrap();

    net.send_multicast_message(t.ca, "g", "y").unwrap();

    let inbox = net.get_client(t.cb).unwrap().inbox();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].source, t.ca);
    assert_eq!(inbox[0].payload, "y");
    // the sender does not get its own message back
    assert!(net.get_client(t.ca).unwrap().inbox().is_empty());

    // a second send delivers exactly one more copy
    net.send_multicast_message(t.ca, "g", "y again").unwrap();
    assert_eq!(net.get_client(t.cb).unwrap().inbox().len(), 2);

    // and the flow works in the opposite direction as well
    net.send_multicast_message(t.cb, "g", "from cb").unwrap();
    assert_eq!(net.get_client(t.ca).unwrap().inbox().len(), 1);
}

#[test]
fn test_three_domain_chain() {
    let _ = env_logger::builder().is_test(true).try_init();
    let (mut net, chain) = domain_chain(3);
    let [r1, r2, r3] = [chain.routers[0], chain.routers[1], chain.routers[2]];
    let [c1, c2, c3] = [chain.clients[0], chain.clients[1], chain.clients[2]];

    // the group is created at the deepest domain; joins walk the LCA up the chain
    net.create_multicast_group(c3, "g").unwrap();
    net.join_multicast_group(c2, "g").unwrap();
    net.join_multicast_group(c1, "g").unwrap();

    // the LCA settled on r1, the deepest common ancestor of all member domains
    assert_eq!(external_holders(&net, "g"), vec![r1]);
    for router in [r1, r2, r3] {
        let entry = net.get_router(router).unwrap().multicast_group("g").unwrap();
        assert_eq!(entry.lca(), Some(r1));
    }
    assert_eq!(
        net.get_router(chain.root)
            .unwrap()
            .multicast_group("g")
            .unwrap()
            .lca(),
        Some(r1)
    );

    // one send reaches every member exactly once, wherever it originates
    net.send_multicast_message(c3, "g", "from the bottom").unwrap();
    assert_eq!(net.get_client(c1).unwrap().inbox().len(), 1);
    assert_eq!(net.get_client(c2).unwrap().inbox().len(), 1);
    assert!(net.get_client(c3).unwrap().inbox().is_empty());

    net.send_multicast_message(c1, "g", "from the top").unwrap();
    assert_eq!(net.get_client(c1).unwrap().inbox().len(), 1);
    assert_eq!(net.get_client(c2).unwrap().inbox().len(), 2);
    assert_eq!(net.get_client(c3).unwrap().inbox().len(), 1);
}

#[test]
fn test_lca_stays_with_members_on_rejoin() {
    let (mut net, t) = two_domains();
    net.create_multicast_group(t.ca, "g").unwrap();
    net.join_multicast_group(t.cb, "g").unwrap();

    let entry_before = net
        .get_router(t.rb)
        .unwrap()
        .multicast_group("g")
        .unwrap()
        .clone();

    // joining again changes neither membership nor the trees
    net.join_multicast_group(t.cb, "g").unwrap();
    let entry_after = net.get_router(t.rb).unwrap().multicast_group("g").unwrap();
    assert_eq!(&entry_before, entry_after);
    assert!(net.get_client(t.cb).unwrap().is_member("g"));

    let root_external = net
        .get_router(t.root)
        .unwrap()
        .multicast_group("g")
        .unwrap()
        .external()
        .unwrap();
    assert_eq!(root_external.members, btreeset! {t.ra, t.rb});
}

#[test]
fn test_internal_members_reachable_from_router() {
    let mut net = Network::new();
    let root = net.add_router("root", None).unwrap();
    let ra = net.add_router("ra", Some(root)).unwrap();
    net.add_link(ra, root, 1.0).unwrap();
    let s1 = net.add_switch("s1", ra).unwrap();
    net.add_link(s1, ra, 1.0).unwrap();
    let s2 = net.add_switch("s2", ra).unwrap();
    net.add_link(s2, ra, 1.0).unwrap();
    let c1 = net.add_client("c1", s1).unwrap();
    let c2 = net.add_client("c2", s1).unwrap();
    let c3 = net.add_client("c3", s2).unwrap();

    net.create_multicast_group(c1, "g").unwrap();
    net.join_multicast_group(c2, "g").unwrap();
    net.join_multicast_group(c3, "g").unwrap();

    // every member is connected to the domain router through internal edges only
    let reached = internal_reach(&net, ra, "g", ra);
    let members = &net
        .get_router(ra)
        .unwrap()
        .multicast_group("g")
        .unwrap()
        .internal()
        .unwrap()
        .members;
    assert_eq!(members, &btreeset! {c1, c2, c3});
    assert!(reached.is_superset(members));
}

#[test]
fn test_late_join_invalidates_stale_hop_caches() {
    let mut net = Network::new();
    let root = net.add_router("root", None).unwrap();
    let ra = net.add_router("ra", Some(root)).unwrap();
    net.add_link(ra, root, 1.0).unwrap();
    let s1 = net.add_switch("s1", ra).unwrap();
    net.add_link(s1, ra, 1.0).unwrap();
    let s2 = net.add_switch("s2", ra).unwrap();
    net.add_link(s2, ra, 1.0).unwrap();
    let c1 = net.add_client("c1", s1).unwrap();
    let c2 = net.add_client("c2", s1).unwrap();
    let c3 = net.add_client("c3", s2).unwrap();
    let c4 = net.add_client("c4", s2).unwrap();

    net.create_multicast_group(c1, "g").unwrap();
    net.join_multicast_group(c2, "g").unwrap();
    net.join_multicast_group(c3, "g").unwrap();

    // this send fills the hop caches of both switches
    net.send_multicast_message(c1, "g", "first").unwrap();
    assert_eq!(net.get_client(c2).unwrap().inbox().len(), 1);
    assert_eq!(net.get_client(c3).unwrap().inbox().len(), 1);

    // a late join splices through s2, whose cached hops are now stale and must be dropped
    net.join_multicast_group(c4, "g").unwrap();
    net.send_multicast_message(c1, "g", "second").unwrap();
    assert_eq!(net.get_client(c2).unwrap().inbox().len(), 2);
    assert_eq!(net.get_client(c3).unwrap().inbox().len(), 2);
    assert_eq!(net.get_client(c4).unwrap().inbox().len(), 1);
}

#[test]
fn test_join_unknown_group_fails() {
    let (mut net, t) = two_domains();
    assert_eq!(
        net.join_multicast_group(t.cb, "nope"),
        Err(NetworkError::GroupNotFound("nope".to_string()))
    );
    assert!(!net.get_client(t.cb).unwrap().is_member("nope"));
}

#[test]
fn test_multicast_to_unknown_group_is_dropped() {
    let (mut net, t) = two_domains();
    net.send_multicast_message(t.ca, "nowhere", "lost").unwrap();
    assert!(net.get_client(t.cb).unwrap().inbox().is_empty());
}

#[test]
fn test_credentials_roundtrip() {
    let (mut net, t) = two_domains();
    net.create_multicast_group(t.ca, "g").unwrap();
    net.join_multicast_group(t.cb, "g").unwrap();

    let token = net.request_group_credentials(t.cb, "g").unwrap();
    assert_eq!(token.issuer, t.ca);
    assert_eq!(token.group, "g");
    assert_eq!(net.get_client(t.cb).unwrap().credentials("g"), Some(&token));

    // a member that did not create the group refuses to issue credentials
    let refused = net.send_message(
        t.ca,
        t.cb,
        Message::MulticastGroupRequestCredentials {
            group: "g".to_string(),
        },
    );
    assert_eq!(
        refused,
        Err(NetworkError::NotGroupOwner("g".to_string(), t.cb))
    );
}

#[test]
fn test_lca_is_at_or_above_every_member_router() {
    let (mut net, chain) = domain_chain(4);
    let group = "deep";
    net.create_multicast_group(chain.clients[3], group).unwrap();
    net.join_multicast_group(chain.clients[1], group).unwrap();
    net.join_multicast_group(chain.clients[2], group).unwrap();

    for router in net.indices().collect::<Vec<_>>() {
        let Ok(r) = net.get_router(router) else {
            continue;
        };
        let Some(entry) = r.multicast_group(group) else {
            continue;
        };
        if !entry.is_member() {
            continue;
        }
        let lca = entry.lca().expect("member routers learn the LCA");
        // walk up from the member: the LCA must be on the path to the root
        let mut current = router;
        let mut found = current == lca;
        while let Some(parent) = net.get_device(current).unwrap().parent_router() {
            if parent == lca {
                found = true;
            }
            current = parent;
        }
        assert!(found, "LCA of {:?} is not an ancestor-or-self", router);
    }
}
