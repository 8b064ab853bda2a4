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

//! Convenience re-export of common members.

pub use crate::device::{Client, Device, Switch};
pub use crate::formatter::NetworkFormatter;
pub use crate::message::{GroupCredentials, Message, Response};
pub use crate::network::Network;
pub use crate::router::{GroupEntry, GroupTree, Rib, Router};
pub use crate::types::{LinkWeight, NetworkError, NodeId, NodeRole, RibEdge};
