// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Held references to host network interfaces.

use super::sync::KRwLock;
use mrm_api::MrmError;
use mrm_api::validate_ifname;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A held reference to a network interface. The hold is released
/// when the last clone of the handle is dropped.
#[derive(Clone)]
pub struct NetDev(Arc<NetDevInner>);

struct NetDevInner {
    name: String,
    index: u32,
}

impl NetDev {
    pub fn new(name: impl Into<String>, index: u32) -> Self {
        Self(Arc::new(NetDevInner { name: name.into(), index }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn index(&self) -> u32 {
        self.0.index
    }

    /// The number of outstanding holds, including this one.
    pub fn holds(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    pub fn same_dev(&self, other: &NetDev) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for NetDev {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "NetDev {{ {}#{} }}", self.0.name, self.0.index)
    }
}

/// Resolves an interface name to a held handle.
pub trait DevResolver: Send + Sync {
    fn get_by_name(&self, name: &str) -> Option<NetDev>;
}

/// A table of known interfaces, standing in for the host's device
/// list.
#[derive(Default)]
pub struct DevTable {
    devs: KRwLock<BTreeMap<String, NetDev>>,
}

impl DevTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, name: &str, index: u32) -> Result<NetDev, MrmError> {
        validate_ifname(name)?;
        let dev = NetDev::new(name, index);
        self.devs.write().insert(name.to_string(), dev.clone());
        Ok(dev)
    }

    /// Remove an interface from the table. Existing holds stay valid.
    pub fn remove(&self, name: &str) -> Option<NetDev> {
        self.devs.write().remove(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.devs.read().keys().cloned().collect()
    }
}

impl DevResolver for DevTable {
    fn get_by_name(&self, name: &str) -> Option<NetDev> {
        self.devs.read().get(name).cloned()
    }
}
