// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Packet classification against a compiled filter.

use super::accel::FamilyTable;
use super::frame::PacketDesc;
use super::frame::Transport;
use mrm_api::FilterRule;

/// Does `rule` match `desc`? Bucket membership has already settled
/// the family and protocol.
fn rule_matches(rule: &FilterRule, desc: &PacketDesc) -> bool {
    if desc.len < rule.payload_size as usize {
        return false;
    }

    if !rule.src_ip.matches(desc.src_ip) {
        return false;
    }

    // Only port-less rules sit in the other bucket.
    if let Transport::Other(_) = desc.transport {
        return true;
    }

    rule.src_port.matches(desc.src_port) && rule.dst_port.matches(desc.dst_port)
}

/// Return the first rule in the bucket for `desc`'s transport which
/// matches `desc`.
///
/// `ft` must have been compiled from `rules`.
pub fn classify<'a>(
    rules: &'a [FilterRule],
    ft: &FamilyTable,
    desc: &PacketDesc,
) -> Option<&'a FilterRule> {
    ft.bucket(desc.transport)
        .iter()
        .filter_map(|&i| rules.get(usize::from(i)))
        .find(|rule| rule_matches(rule, desc))
}
