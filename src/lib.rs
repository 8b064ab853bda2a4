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

#![deny(missing_docs, missing_debug_implementations)]

//! # DomainCast
//!
//! This is a simulator for unicast routing and multicast distribution in a hierarchical,
//! trust-domain-partitioned overlay network. It does not model OSI layers 1 to 4: devices do
//! not have addresses but use an identifier ([`types::NodeId`]), and messages are logical
//! envelopes handed between in-memory devices rather than serialized packets.
//!
//! The network consists of *routers*, *switches*, and *clients*. The routers form a tree via
//! their parent pointers; each router roots a *trust domain* and owns a Routing Information
//! Base that knows only the links of its own domain, the boundary links of subordinate
//! domains, and coarse ownership pointers to the subtrees below it. Unicast forwarding
//! resolves next hops against these RIBs, escalating queries up the trust-domain tree on a
//! cache miss. Multicast groups maintain one *internal* distribution tree per member domain
//! and a single *external* tree at the group's lowest common ancestor, which migrates when an
//! ancestor domain joins.
//!
//! Message processing is strictly synchronous and single-threaded: sending a message returns
//! only after it has been delivered and handled, transitively including any nested queries it
//! triggered.
//!
//! ## Main Concepts
//!
//! The [`network::Network`] is the main datastructure to operate on. It owns every device
//! (see [`device::Device`]), builds the topology, and delivers messages. Routers are
//! [`router::Router`] and carry a [`router::Rib`]; the per-group multicast state is a
//! [`router::GroupEntry`].
//!
//! ## Example usage
//!
//! The following example builds a root router with two subordinate domains, sends a unicast
//! ping across the domain boundary, and distributes a multicast payload:
//!
//! ```
//! use domaincast::prelude::*;
//!
//! fn main() -> Result<(), NetworkError> {
//!     let mut net = Network::new();
//!
//!     let root = net.add_router("root", None)?;
//!     let ra = net.add_router("ra", Some(root))?;
//!     net.add_link(ra, root, 1.0)?;
//!     let rb = net.add_router("rb", Some(root))?;
//!     net.add_link(rb, root, 1.0)?;
//!     let ca = net.add_client("ca", ra)?;
//!     let cb = net.add_client("cb", rb)?;
//!
//!     // unicast across the two domains
//!     net.ping(ca, cb, "hi")?;
//!     assert_eq!(net.get_client(cb)?.inbox().len(), 1);
//!
//!     // multicast: "updates" is created under ra; cb's join migrates the LCA to root
//!     net.create_multicast_group(ca, "updates")?;
//!     net.join_multicast_group(cb, "updates")?;
//!     net.send_multicast_message(ca, "updates", "hello members")?;
//!     assert_eq!(net.get_client(cb)?.inbox().len(), 2);
//!
//!     Ok(())
//! }
//! ```

pub mod device;
pub mod formatter;
pub mod message;
pub mod network;
pub mod prelude;
pub mod router;
pub mod types;

#[cfg(test)]
mod test;
