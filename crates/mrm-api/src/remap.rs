// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

use super::mac::MacAddr;
use serde::Deserialize;
use serde::Serialize;
use std::fmt;
use std::fmt::Display;

/// One replacement target: the MAC to write and, optionally, the
/// interface the frame should leave on.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Replacement {
    pub mac: MacAddr,
    pub ifname: Option<String>,
}

impl Replacement {
    pub fn new(mac: MacAddr) -> Self {
        Self { mac, ifname: None }
    }

    pub fn with_ifname(mac: MacAddr, ifname: impl Into<String>) -> Self {
        Self { mac, ifname: Some(ifname.into()) }
    }
}

impl Display for Replacement {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.ifname {
            Some(name) => write!(f, "{} via {name}", self.mac),
            None => write!(f, "{}", self.mac),
        }
    }
}

/// Create or replace the remap entry for `match_mac`.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SetRemapReq {
    pub match_mac: MacAddr,
    /// The name of an existing filter.
    pub filter: String,
    /// Targets in round-robin order.
    pub replacements: Vec<Replacement>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct GetRemapReq {
    pub match_mac: MacAddr,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct DeleteRemapReq {
    pub match_mac: MacAddr,
}
