// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Filter acceleration tables.
//!
//! A filter's rules are partitioned by the address family and
//! transport protocol they can possibly match, so that the fast path
//! only walks rules relevant to the frame at hand. Each bucket holds
//! indices into the filter's rule list, in rule order.

use super::frame::Transport;
use mrm_api::BucketDump;
use mrm_api::FILTER_MAX_RULES;
use mrm_api::FilterRule;
use mrm_api::IpFamily;
use mrm_api::ProtoMatch;

pub type Bucket = heapless::Vec<u8, FILTER_MAX_RULES>;

/// The buckets for one address family.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FamilyTable {
    pub tcp: Bucket,
    pub udp: Bucket,
    pub other: Bucket,
}

impl FamilyTable {
    pub fn bucket(&self, transport: Transport) -> &Bucket {
        match transport {
            Transport::Tcp => &self.tcp,
            Transport::Udp => &self.udp,
            Transport::Other(_) => &self.other,
        }
    }

    pub fn dump(&self) -> BucketDump {
        BucketDump {
            tcp: self.tcp.to_vec(),
            udp: self.udp.to_vec(),
            other: self.other.to_vec(),
        }
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AccelTable {
    pub ip4: FamilyTable,
    pub ip6: FamilyTable,
}

impl AccelTable {
    pub fn family(&self, af: IpFamily) -> &FamilyTable {
        match af {
            IpFamily::Ipv4 => &self.ip4,
            IpFamily::Ipv6 => &self.ip6,
        }
    }

    fn family_mut(&mut self, af: IpFamily) -> &mut FamilyTable {
        match af {
            IpFamily::Ipv4 => &mut self.ip4,
            IpFamily::Ipv6 => &mut self.ip6,
        }
    }
}

/// The result of compiling a rule list.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Compiled {
    pub table: AccelTable,
    /// Bucket placements dropped because the bucket was full.
    pub dropped: usize,
}

/// Can `rule` ever match a frame of family `af`?
///
/// A rule constrains the family either by setting `FAMILY` or by
/// matching on a source address. A rule doing neither applies to
/// both families.
pub fn applies(rule: &FilterRule, af: IpFamily) -> bool {
    if rule.family == af {
        return true;
    }

    if rule.proto.contains(ProtoMatch::FAMILY) {
        return false;
    }

    rule.src_ip.is_any()
}

fn push(bucket: &mut Bucket, idx: usize, dropped: &mut usize) {
    let pushed = u8::try_from(idx).ok().and_then(|i| bucket.push(i).ok());
    if pushed.is_none() {
        *dropped += 1;
    }
}

/// Compile `rules` into an acceleration table.
///
/// A rule lands in the UDP and TCP buckets when it names that
/// protocol or no protocol at all. It lands in the other bucket only
/// when it names no protocol and no port, as ports mean nothing to
/// non-TCP/UDP traffic. A full bucket drops the placement, which is
/// counted in [`Compiled::dropped`].
pub fn compile(rules: &[FilterRule]) -> Compiled {
    let mut out = Compiled::default();

    for af in [IpFamily::Ipv4, IpFamily::Ipv6] {
        let Compiled { table, dropped } = &mut out;
        let ft = table.family_mut(af);

        for (idx, rule) in rules.iter().enumerate() {
            if !applies(rule, af) {
                continue;
            }

            let any_proto = rule.proto.is_any_proto();

            if any_proto || rule.proto.contains(ProtoMatch::UDP) {
                push(&mut ft.udp, idx, dropped);
            }

            if any_proto || rule.proto.contains(ProtoMatch::TCP) {
                push(&mut ft.tcp, idx, dropped);
            }

            if any_proto && rule.src_port.is_any() && rule.dst_port.is_any() {
                push(&mut ft.other, idx, dropped);
            }
        }
    }

    out
}
