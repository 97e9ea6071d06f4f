// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Types shared between the MAC remapping engine and its clients.
//!
//! Everything in this crate may cross the control boundary, so every
//! type here is serde-serializable and is carried as postcard bytes.

#![deny(unreachable_patterns)]
#![deny(unused_must_use)]

pub mod cmd;
pub mod filter;
pub mod mac;
pub mod remap;

pub use cmd::*;
pub use filter::*;
pub use mac::*;
pub use remap::*;

/// The overall version of the API. Anytime an API is added, removed,
/// or modified, this number should increment. Currently we attach no
/// semantic meaning to the number other than as a means to verify
/// that the client and the engine are compiled for the same API.
pub const API_VERSION: u64 = 1;

/// The maximum number of rules in a single filter. This is also the
/// capacity of each acceleration bucket.
pub const FILTER_MAX_RULES: usize = 10;

/// The size of a filter name buffer, including the terminator.
pub const FILTER_NAME_MAX: usize = 24;

/// The maximum number of replacement targets on one remap entry.
pub const MAX_REPLACE: usize = 8;

/// The default capacity of the remap table.
pub const MAX_REMAPS: usize = 100;

/// The default capacity of the filter arena.
pub const MAX_FILTERS: usize = 256;

/// The remap table has `1 << REMAP_HASH_BITS` buckets.
pub const REMAP_HASH_BITS: u32 = 8;

/// The size of an interface name buffer, including the terminator.
pub const IFNAME_MAX: usize = 16;

/// Validate a filter name: non-empty and short enough to fit in a
/// `FILTER_NAME_MAX` buffer with its terminator.
pub fn validate_filter_name(name: &str) -> Result<(), MrmError> {
    if name.is_empty() || name.len() >= FILTER_NAME_MAX {
        return Err(MrmError::InvalidArgument(format!(
            "filter name must be 1-{} bytes: {name:?}",
            FILTER_NAME_MAX - 1
        )));
    }

    Ok(())
}

/// Validate an interface name the same way.
pub fn validate_ifname(name: &str) -> Result<(), MrmError> {
    if name.is_empty() || name.len() >= IFNAME_MAX {
        return Err(MrmError::InvalidArgument(format!(
            "interface name must be 1-{} bytes: {name:?}",
            IFNAME_MAX - 1
        )));
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn name_bounds() {
        assert!(validate_filter_name("guest").is_ok());
        assert!(validate_filter_name(&"a".repeat(FILTER_NAME_MAX - 1)).is_ok());
        assert!(matches!(
            validate_filter_name(&"a".repeat(FILTER_NAME_MAX)),
            Err(MrmError::InvalidArgument(_))
        ));
        assert!(validate_filter_name("").is_err());
        assert!(validate_ifname("eth0").is_ok());
        assert!(validate_ifname("interfacename16b").is_err());
    }
}
