// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Run the remap path on several threads while the configuration is
//! being rewritten underneath it.

mod common;

use common::*;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::thread;

const READERS: usize = 4;
const WRITER_ROUNDS: usize = 200;

const TCP_RULES: &[&str] = &["proto=tcp dstport=443"];
const UDP_RULES: &[&str] = &["proto=udp dstport=53"];

fn install(db: &RemapDb) {
    set_filter(db, "guest", &["proto=any"]);
    set_remap(db, GUEST_MAC, "guest", &[REPLACE_MAC, REPLACE_MAC2]);
}

fn remap(db: &RemapDb, mut frame: EthFrame) -> (RemapResult, MacAddr) {
    let res = perform_ethernet_remap(db, &mut frame);
    (res, frame.dst_mac())
}

// The filter flips between two disjoint rule sets. A reader that saw
// the rules of one with the acceleration table of the other would
// remap a frame neither set matches.
#[test]
fn readers_see_old_or_new() {
    let db = db();
    set_filter(&db, "guest", TCP_RULES);
    set_remap(&db, GUEST_MAC, "guest", &[REPLACE_MAC, REPLACE_MAC2]);

    let done = AtomicBool::new(false);
    let remapped = AtomicU64::new(0);

    thread::scope(|s| {
        for _ in 0..READERS {
            s.spawn(|| {
                loop {
                    for frame in [
                        tcp4(GUEST_MAC, "10.0.0.9", 1000, 443),
                        udp4(GUEST_MAC, "10.0.0.9", 1000, 53),
                    ] {
                        match remap(&db, frame) {
                            (RemapResult::Remapped, mac) => {
                                assert!(
                                    mac == REPLACE_MAC || mac == REPLACE_MAC2
                                );
                                remapped.fetch_add(1, Ordering::Relaxed);
                            }

                            (RemapResult::NoRemap, mac) => {
                                assert_eq!(mac, GUEST_MAC);
                            }

                            (res, _) => panic!("bound MAC reported {res}"),
                        }
                    }

                    for frame in [
                        tcp4(GUEST_MAC, "10.0.0.9", 1000, 53),
                        udp4(GUEST_MAC, "10.0.0.9", 1000, 443),
                    ] {
                        assert_eq!(
                            remap(&db, frame),
                            (RemapResult::NoRemap, GUEST_MAC)
                        );
                    }

                    if done.load(Ordering::Relaxed) {
                        break;
                    }
                }
            });
        }

        s.spawn(|| {
            for i in 0..WRITER_ROUNDS {
                match i % 3 {
                    0 => set_filter(&db, "guest", UDP_RULES),
                    1 => set_filter(&db, "guest", TCP_RULES),
                    _ => set_remap(&db, GUEST_MAC, "guest", &[REPLACE_MAC2]),
                }
            }

            done.store(true, Ordering::Relaxed);
        });
    });

    assert!(remapped.load(Ordering::Relaxed) > 0);
    assert_eq!(db.remap_count(), 1);
    assert_eq!(db.lookup_filter_by_name("guest").unwrap().refcnt(), 1);
    assert!(db.grace_periods() > 0);
}

// Entries come and go while readers run. A bound MAC whose filter
// matches everything is either remapped or not yet bound.
#[test]
fn readers_survive_clear() {
    let db = db();
    install(&db);

    let done = AtomicBool::new(false);

    thread::scope(|s| {
        for _ in 0..READERS {
            s.spawn(|| {
                loop {
                    let frame = tcp4(GUEST_MAC, "10.0.0.9", 1000, 443);
                    match remap(&db, frame) {
                        (RemapResult::Remapped, mac) => {
                            assert!(
                                mac == REPLACE_MAC || mac == REPLACE_MAC2
                            );
                        }

                        (RemapResult::NotTargeted, mac) => {
                            assert_eq!(mac, GUEST_MAC);
                        }

                        (RemapResult::NoRemap, _) => {
                            panic!("TCP frame missed a bound filter");
                        }
                    }

                    if done.load(Ordering::Relaxed) {
                        break;
                    }
                }
            });
        }

        s.spawn(|| {
            for i in 0..WRITER_ROUNDS {
                if i % 2 == 0 {
                    db.clear();
                } else {
                    db.delete_remap(&GUEST_MAC).unwrap();
                }
                install(&db);
            }

            done.store(true, Ordering::Relaxed);
        });
    });

    assert_eq!(db.remap_count(), 1);
    assert_eq!(db.lookup_filter_by_name("guest").unwrap().refcnt(), 1);
}

// Updates and reads of many distinct entries at once.
#[test]
fn many_entries_under_churn() {
    let db = db();
    set_filter(&db, "guest", &["proto=any"]);
    let macs: Vec<MacAddr> =
        (0..32u8).map(|i| MacAddr::from([0x02, 0, 0, 0, 1, i])).collect();
    let done = AtomicBool::new(false);

    thread::scope(|s| {
        for r in 0..READERS {
            let macs = &macs;
            let db = &db;
            let done = &done;
            s.spawn(move || {
                let mut n = r;
                while !done.load(Ordering::Relaxed) {
                    let mac = macs[n % macs.len()];
                    let mut frame = udp4(mac, "10.0.0.9", 1, 2);
                    let res = perform_ethernet_remap(db, &mut frame);
                    if res == RemapResult::Remapped {
                        assert_eq!(frame.dst_mac(), REPLACE_MAC);
                    } else {
                        assert_eq!(res, RemapResult::NotTargeted);
                        assert_eq!(frame.dst_mac(), mac);
                    }
                    n += 1;
                }
            });
        }

        s.spawn(|| {
            for _ in 0..4 {
                for mac in &macs {
                    set_remap(&db, *mac, "guest", &[REPLACE_MAC]);
                }
                for mac in &macs {
                    db.delete_remap(mac).unwrap();
                }
            }
            done.store(true, Ordering::Relaxed);
        });
    });

    assert_eq!(db.remap_count(), 0);
    assert_eq!(db.lookup_filter_by_name("guest").unwrap().refcnt(), 0);
}
