// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Print command responses in human-friendly manner.
//!
//! This is mostly just a place to hang printing routines so that they
//! can be used by both mrmadm and integration tests.

use crate::api::BucketDump;
use crate::api::DumpRunConfResp;
use crate::api::FilterDump;
use crate::api::RemapDump;
use itertools::Itertools;
use std::io::Write;
use tabwriter::TabWriter;

/// Print a [`DumpRunConfResp`].
pub fn print_runconf(resp: &DumpRunConfResp) -> std::io::Result<()> {
    print_runconf_into(&mut std::io::stdout(), resp)
}

/// Print a [`DumpRunConfResp`] into a given writer.
pub fn print_runconf_into(
    writer: &mut impl Write,
    resp: &DumpRunConfResp,
) -> std::io::Result<()> {
    let mut t = TabWriter::new(writer);

    writeln!(t, "MAC Address Re-Mapper Running Configuration:")?;
    write_hrb(&mut t)?;
    writeln!(t, "Filters: {}", resp.filters.len())?;
    for filter in &resp.filters {
        writeln!(t)?;
        print_filter(&mut t, filter)?;
    }
    t.flush()?;

    writeln!(t)?;
    writeln!(t, "Remaps: {}", resp.remaps.len())?;
    for remap in &resp.remaps {
        writeln!(t)?;
        print_remap(&mut t, remap)?;
    }

    t.flush()
}

/// Print a [`FilterDump`].
pub fn print_filter_into(
    writer: &mut impl Write,
    filter: &FilterDump,
) -> std::io::Result<()> {
    let mut t = TabWriter::new(writer);
    print_filter(&mut t, filter)?;
    t.flush()
}

/// Print a [`RemapDump`].
pub fn print_remap_into(
    writer: &mut impl Write,
    remap: &RemapDump,
) -> std::io::Result<()> {
    let mut t = TabWriter::new(writer);
    print_remap(&mut t, remap)?;
    t.flush()
}

fn print_filter(
    t: &mut impl Write,
    filter: &FilterDump,
) -> std::io::Result<()> {
    writeln!(
        t,
        "Filter {} (refcnt {}, {} rules)",
        filter.name,
        filter.refcnt,
        filter.rules.len()
    )?;
    write_hr(t)?;
    writeln!(t, "IDX\tPAYLOAD\tFAMILY\tPROTO\tSRC IP\tSRC PORT\tDST PORT")?;
    for (i, rule) in filter.rules.iter().enumerate() {
        writeln!(
            t,
            "{i}\t{}\t{}\t{}\t{}\t{}\t{}",
            rule.payload_size,
            rule.family,
            rule.proto,
            rule.src_ip,
            rule.src_port,
            rule.dst_port,
        )?;
    }

    writeln!(t)?;
    writeln!(t, "BUCKET\tRULES")?;
    writeln!(t, "All Configured\t{}", idx_list(0..filter.rules.len()))?;
    print_buckets(t, "IP4", &filter.ip4)?;
    print_buckets(t, "IP6", &filter.ip6)
}

fn print_buckets(
    t: &mut impl Write,
    af: &str,
    buckets: &BucketDump,
) -> std::io::Result<()> {
    writeln!(t, "TCP/{af}\t{}", idx_list(&buckets.tcp))?;
    writeln!(t, "UDP/{af}\t{}", idx_list(&buckets.udp))?;
    writeln!(t, "Other/{af}\t{}", idx_list(&buckets.other))
}

fn print_remap(t: &mut impl Write, remap: &RemapDump) -> std::io::Result<()> {
    writeln!(t, "Remap {} (filter {})", remap.match_mac, remap.filter)?;
    write_hr(t)?;
    writeln!(t, "IDX\tREPLACEMENT\tINTERFACE")?;
    for (i, rep) in remap.replacements.iter().enumerate() {
        let ifname = rep.ifname.as_deref().unwrap_or("(None)");
        writeln!(t, "{i}\t{}\t{ifname}", rep.mac)?;
    }

    Ok(())
}

fn idx_list<I>(idxs: I) -> String
where
    I: IntoIterator,
    I::Item: std::fmt::Display,
{
    let s = idxs.into_iter().join(",");
    if s.is_empty() { "-".to_string() } else { s }
}

/// Print a horizontal rule in bold.
pub fn write_hrb(t: &mut impl Write) -> std::io::Result<()> {
    writeln!(t, "{:=<70}", "=")
}

/// Print a horizontal rule.
pub fn write_hr(t: &mut impl Write) -> std::io::Result<()> {
    writeln!(t, "{:-<70}", "-")
}
