// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! The per-frame remap path.

use super::classify::classify;
use super::frame::ETHER_TYPE_IPV4;
use super::frame::ETHER_TYPE_IPV6;
use super::frame::Frame;
use super::frame::PacketDesc;
use super::rcdb::RemapDb;
use crate::LogLevel;
use std::fmt;
use std::fmt::Display;

/// What happened to a frame. The frame is always passed on; this
/// only reports whether it was relabeled.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RemapResult {
    /// No remap entry for the destination MAC, or not IP traffic.
    NotTargeted,
    /// Targeted, but no rule of the entry's filter matched.
    NoRemap,
    /// The destination MAC, and perhaps the egress, was rewritten.
    Remapped,
}

impl Display for RemapResult {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Self::NotTargeted => "not targeted",
            Self::NoRemap => "no remap",
            Self::Remapped => "remapped",
        };
        write!(f, "{s}")
    }
}

/// Remap `frame` if its destination MAC has a remap entry and the
/// entry's filter matches it.
///
/// This runs for every frame crossing the hook. It takes no exclusive
/// lock and does not block: the only synchronization is the
/// database's read-side section.
pub fn perform_ethernet_remap<F: Frame>(
    db: &RemapDb,
    frame: &mut F,
) -> RemapResult {
    let reader = db.read();
    let Some(entry) = reader.lookup_remap_by_macaddr(&frame.dst_mac()) else {
        return RemapResult::NotTargeted;
    };

    let Some(filter) = reader.filter(entry.filter_id()) else {
        db.ectx().log.log(
            LogLevel::Warn,
            &format!("no filter for matched remap {}", entry.match_mac()),
        );
        return RemapResult::NotTargeted;
    };

    let desc = match frame.ether_type() {
        ETHER_TYPE_IPV4 => PacketDesc::parse_ipv4(frame.l3(), frame.len()),

        // IPv6 classification is off unless asked for.
        ETHER_TYPE_IPV6 if !db.cfg().classify_ipv6 => {
            return RemapResult::NoRemap;
        }
        ETHER_TYPE_IPV6 => PacketDesc::parse_ipv6(frame.l3(), frame.len()),

        _ => return RemapResult::NotTargeted,
    };

    let Some(desc) = desc else {
        return RemapResult::NotTargeted;
    };

    let compiled = filter.compiled();
    let ft = compiled.table.family(desc.family);

    if classify(&compiled.config.rules, ft, &desc).is_none() {
        return RemapResult::NoRemap;
    }

    let target = entry.next_target();
    frame.set_dst_mac(target.mac);
    if let Some(dev) = &target.dev {
        frame.set_egress(dev);
    }

    RemapResult::Remapped
}
