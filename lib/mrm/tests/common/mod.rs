// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Common routines for integration tests.

// This type of pedantry is more trouble than its worth here.
#![allow(dead_code)]

use std::net::IpAddr;
use std::sync::Arc;

pub use mrm::ExecCtx;
pub use mrm::PrintlnLog;
pub use mrm::api::*;
pub use mrm::ddi::dev::DevTable;
pub use mrm::ddi::dev::NetDev;
pub use mrm::engine::ctl::ControlNode;
pub use mrm::engine::frame::EthFrame;
pub use mrm::engine::frame::Frame;
pub use mrm::engine::frame::Transport;
pub use mrm::engine::rcdb::DbCfg;
pub use mrm::engine::rcdb::RemapDb;
pub use mrm::engine::rcdb::Target;
pub use mrm::engine::remap::RemapResult;
pub use mrm::engine::remap::perform_ethernet_remap;

pub const GUEST_MAC: MacAddr =
    MacAddr::from_const([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);
pub const REPLACE_MAC: MacAddr =
    MacAddr::from_const([0x11, 0x22, 0x33, 0x44, 0x55, 0x66]);
pub const REPLACE_MAC2: MacAddr =
    MacAddr::from_const([0x11, 0x22, 0x33, 0x44, 0x55, 0x77]);
pub const OTHER_MAC: MacAddr =
    MacAddr::from_const([0x02, 0x08, 0x20, 0x00, 0x00, 0x01]);

pub fn ectx() -> Arc<ExecCtx> {
    Arc::new(ExecCtx { log: Box::new(PrintlnLog) })
}

pub fn db() -> RemapDb {
    RemapDb::init(ectx(), DbCfg::default())
}

pub fn db_with(cfg: DbCfg) -> RemapDb {
    RemapDb::init(ectx(), cfg)
}

pub fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

pub fn rules(texts: &[&str]) -> Vec<FilterRule> {
    texts.iter().map(|s| s.parse().unwrap()).collect()
}

/// Install a filter named `name` with the given rules.
pub fn set_filter(db: &RemapDb, name: &str, texts: &[&str]) {
    db.set_filter(FilterConfig::new(name, rules(texts))).unwrap();
}

/// Point `mac` at `reps` through `filter`, with no egress change.
pub fn set_remap(db: &RemapDb, mac: MacAddr, filter: &str, reps: &[MacAddr]) {
    let targets = reps.iter().map(|&mac| Target { mac, dev: None }).collect();
    db.insert_or_update_remap(mac, filter, targets).unwrap();
}

pub fn tcp4(dst: MacAddr, src: &str, sport: u16, dport: u16) -> EthFrame {
    let (src, dst_ip) = (ip(src), ip("10.0.0.1"));
    EthFrame::new_ip(dst, src, dst_ip, Transport::Tcp, sport, dport, 64)
}

pub fn udp4(dst: MacAddr, src: &str, sport: u16, dport: u16) -> EthFrame {
    let (src, dst_ip) = (ip(src), ip("10.0.0.1"));
    EthFrame::new_ip(dst, src, dst_ip, Transport::Udp, sport, dport, 64)
}

pub fn udp6(dst: MacAddr, src: &str, sport: u16, dport: u16) -> EthFrame {
    let (src, dst_ip) = (ip(src), ip("fd00::1"));
    EthFrame::new_ip(dst, src, dst_ip, Transport::Udp, sport, dport, 64)
}
