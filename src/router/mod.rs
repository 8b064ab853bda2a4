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

//! Module defining a router: the device that roots a trust domain and owns a Routing
//! Information Base.

use serde::{Deserialize, Serialize};

use crate::device::NodeAttrs;
use crate::types::NodeId;

mod multicast;
mod rib;

pub use multicast::{GroupEntry, GroupTree};
pub use rib::Rib;

/// A router. Besides the node state every device carries, a router owns the RIB of its trust
/// domain: the intra-domain topology, the ownership pointers to subordinate domains, and the
/// multicast group entries. All RIB mutations are driven by the message handlers in
/// [`crate::network::Network`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Router {
    pub(crate) attrs: NodeAttrs,
    /// The Routing Information Base.
    pub(crate) rib: Rib,
}

impl Router {
    pub(crate) fn new(name: String, id: NodeId, parent_router: Option<NodeId>) -> Self {
        Self {
            attrs: NodeAttrs::new(name, id, parent_router),
            rib: Rib::default(),
        }
    }

    /// Return the shared node attributes.
    pub fn attrs(&self) -> &NodeAttrs {
        &self.attrs
    }

    /// Return the id of the router.
    pub fn router_id(&self) -> NodeId {
        self.attrs.id()
    }

    /// Return the name of the router.
    pub fn name(&self) -> &str {
        self.attrs.name()
    }

    /// Return the Routing Information Base.
    pub fn rib(&self) -> &Rib {
        &self.rib
    }

    /// Return the entry of the given multicast group, if this router knows it.
    pub fn multicast_group(&self, group: &str) -> Option<&GroupEntry> {
        self.rib.multicast_groups.get(group)
    }
}
