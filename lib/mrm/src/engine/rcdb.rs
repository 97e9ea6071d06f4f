// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! The running configuration database.
//!
//! The database holds named filters and MAC-keyed remap entries. It
//! is read on every frame and written by a single, serialized
//! control path.
//!
//! Readers enter a read-side section ([`RemapDb::read`]) and load
//! the current version of whatever they need; they never block and
//! never take an exclusive lock. Writers hold the configuration lock,
//! build a new version of the aggregate they are changing, and
//! publish it with an atomic swap. Anything unlinked by a publish is
//! retired only after a grace period, so a reader that found an entry
//! may keep using it, and the filter it names, until it leaves its
//! section.
//!
//! Filters live in an arena and remap entries name their filter by
//! [`FilterId`]. A filter's reference count is the number of remap
//! entries naming it and is protected by a lock of its own, taken
//! around both the bump in remap insertion and the zero check in
//! filter deletion.

use super::accel::AccelTable;
use super::accel::compile;
use crate::ExecCtx;
use crate::LogLevel;
use crate::ddi::dev::NetDev;
use crate::ddi::rcu::Rcu;
use crate::ddi::rcu::RcuReadGuard;
use crate::ddi::sync::KMutex;
use arc_swap::ArcSwap;
use arc_swap::Guard;
use mrm_api::DumpRunConfResp;
use mrm_api::FilterConfig;
use mrm_api::FilterDump;
use mrm_api::MAX_FILTERS;
use mrm_api::MAX_REMAPS;
use mrm_api::MAX_REPLACE;
use mrm_api::MacAddr;
use mrm_api::MrmError;
use mrm_api::REMAP_HASH_BITS;
use mrm_api::RemapDump;
use mrm_api::Replacement;
use mrm_api::validate_filter_name;
use std::sync::Arc;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

pub const REMAP_BUCKETS: usize = 1 << REMAP_HASH_BITS;

/// Database limits and behavior.
#[derive(Clone, Copy, Debug)]
pub struct DbCfg {
    pub max_filters: usize,
    pub max_remaps: usize,
    /// Classify IPv6 frames against the filters' IPv6 tables. When
    /// unset, IPv6 frames are never remapped.
    pub classify_ipv6: bool,
}

impl Default for DbCfg {
    fn default() -> Self {
        Self {
            max_filters: MAX_FILTERS,
            max_remaps: MAX_REMAPS,
            classify_ipv6: false,
        }
    }
}

fn oom(what: &str) -> MrmError {
    MrmError::OutOfResources(format!("failed to allocate {what}"))
}

/// The stable key of a filter. The generation keeps a key from
/// naming a later filter which reuses the same arena slot.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FilterId {
    slot: u32,
    generation: u32,
}

/// A filter's configuration together with the table compiled from
/// it. The two are always published as one.
#[derive(Debug)]
pub struct CompiledFilter {
    pub config: FilterConfig,
    pub table: AccelTable,
}

#[derive(Debug)]
struct FilterRefs {
    refcnt: u32,
    // Cleared when the filter leaves the arena.
    live: bool,
}

#[derive(Debug)]
pub struct Filter {
    id: FilterId,
    name: String,
    state: ArcSwap<CompiledFilter>,
    refs: KMutex<FilterRefs>,
}

impl Filter {
    pub fn id(&self) -> FilterId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The current configuration and table.
    pub fn compiled(&self) -> Guard<Arc<CompiledFilter>> {
        self.state.load()
    }

    pub fn refcnt(&self) -> u32 {
        self.refs.lock().refcnt
    }

    fn acquire(&self) -> Result<(), MrmError> {
        let mut refs = self.refs.lock();
        if !refs.live {
            return Err(MrmError::InvalidFilter(self.name.clone()));
        }
        refs.refcnt += 1;
        Ok(())
    }

    fn release(&self) {
        let mut refs = self.refs.lock();
        refs.refcnt = refs.refcnt.saturating_sub(1);
    }

    fn dump(&self) -> FilterDump {
        let compiled = self.compiled();
        FilterDump {
            name: self.name.clone(),
            refcnt: self.refcnt(),
            rules: compiled.config.rules.clone(),
            ip4: compiled.table.ip4.dump(),
            ip6: compiled.table.ip6.dump(),
        }
    }
}

#[derive(Debug, Default)]
struct FilterArena {
    slots: Vec<Option<Arc<Filter>>>,
    live: usize,
    generation: u32,
}

impl FilterArena {
    fn try_clone(&self) -> Result<Self, MrmError> {
        let mut slots = Vec::new();
        slots.try_reserve(self.slots.len() + 1).map_err(|_| oom("filters"))?;
        slots.extend(self.slots.iter().cloned());
        Ok(Self { slots, live: self.live, generation: self.generation })
    }

    fn iter(&self) -> impl Iterator<Item = &Arc<Filter>> {
        self.slots.iter().flatten()
    }

    fn get(&self, id: FilterId) -> Option<&Arc<Filter>> {
        let slot = usize::try_from(id.slot).ok()?;
        self.slots.get(slot)?.as_ref().filter(|f| f.id == id)
    }

    fn by_name(&self, name: &str) -> Option<&Arc<Filter>> {
        self.iter().find(|f| f.name == name)
    }

    fn insert(&mut self, name: &str, state: CompiledFilter) -> Arc<Filter> {
        let slot = match self.slots.iter().position(Option::is_none) {
            Some(slot) => slot,
            None => {
                self.slots.push(None);
                self.slots.len() - 1
            }
        };

        self.generation = self.generation.wrapping_add(1);
        let id = FilterId {
            slot: u32::try_from(slot).unwrap_or(u32::MAX),
            generation: self.generation,
        };
        let filter = Arc::new(Filter {
            id,
            name: name.to_string(),
            state: ArcSwap::from_pointee(state),
            refs: KMutex::new(FilterRefs { refcnt: 0, live: true }),
        });

        self.slots[slot] = Some(Arc::clone(&filter));
        self.live += 1;
        filter
    }

    fn remove(&mut self, id: FilterId) -> Option<Arc<Filter>> {
        self.get(id)?;
        let slot = usize::try_from(id.slot).ok()?;
        let filter = self.slots.get_mut(slot)?.take();
        if filter.is_some() {
            self.live -= 1;
        }
        filter
    }
}

/// One replacement target with its interface resolved.
#[derive(Clone, Debug)]
pub struct Target {
    pub mac: MacAddr,
    pub dev: Option<NetDev>,
}

impl From<&Target> for Replacement {
    fn from(t: &Target) -> Self {
        Replacement {
            mac: t.mac,
            ifname: t.dev.as_ref().map(|d| d.name().to_string()),
        }
    }
}

#[derive(Debug)]
pub struct RemapEntry {
    match_mac: MacAddr,
    filter: FilterId,
    targets: Vec<Target>,
    cursor: AtomicU32,
}

impl RemapEntry {
    pub fn match_mac(&self) -> MacAddr {
        self.match_mac
    }

    pub fn filter_id(&self) -> FilterId {
        self.filter
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    /// Select the target for the next remap and advance the
    /// round-robin cursor, wrapping after the last target.
    pub fn next_target(&self) -> &Target {
        let n = self.targets.len() as u32;
        let prev = self
            .cursor
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |c| {
                Some(if c + 1 >= n { 0 } else { c + 1 })
            })
            .unwrap_or(0);

        // An entry always has at least one target.
        &self.targets[prev as usize]
    }
}

type RemapBucket = Vec<Arc<RemapEntry>>;

pub struct RemapDb {
    ectx: Arc<ExecCtx>,
    cfg: DbCfg,
    // Serializes configuration changes.
    cfg_lock: KMutex<()>,
    rcu: Rcu,
    filters: ArcSwap<FilterArena>,
    remaps: Box<[ArcSwap<RemapBucket>]>,
    nremaps: AtomicUsize,
    hash_salt: u32,
}

/// A read-side section over the database. Everything loaded through
/// it stays valid until it is dropped.
pub struct DbReader<'a> {
    db: &'a RemapDb,
    _rcu: RcuReadGuard<'a>,
}

impl DbReader<'_> {
    // The arena is loaded per call: an entry found by this reader may
    // name a filter published after the reader started.
    fn arena(&self) -> Guard<Arc<FilterArena>> {
        self.db.filters.load()
    }

    /// Look up the remap entry for `mac`.
    pub fn lookup_remap_by_macaddr(
        &self,
        mac: &MacAddr,
    ) -> Option<Arc<RemapEntry>> {
        let bucket = self.db.remaps[self.db.bucket_idx(mac)].load();
        bucket.iter().find(|e| e.match_mac == *mac).cloned()
    }

    pub fn filter(&self, id: FilterId) -> Option<Arc<Filter>> {
        self.arena().get(id).cloned()
    }

    pub fn lookup_filter_by_name(&self, name: &str) -> Option<Arc<Filter>> {
        self.arena().by_name(name).cloned()
    }

    pub fn lookup_filter_by_index(&self, idx: usize) -> Option<Arc<Filter>> {
        self.arena().iter().nth(idx).cloned()
    }

    pub fn lookup_remap_by_index(&self, idx: usize) -> Option<Arc<RemapEntry>> {
        let mut n = idx;
        for slot in self.db.remaps.iter() {
            let bucket = slot.load();
            if n < bucket.len() {
                return Some(Arc::clone(&bucket[n]));
            }
            n -= bucket.len();
        }
        None
    }

    pub fn dump_filter(&self, name: &str) -> Option<FilterDump> {
        self.arena().by_name(name).map(|f| f.dump())
    }

    pub fn dump_remap(&self, mac: &MacAddr) -> Option<RemapDump> {
        self.lookup_remap_by_macaddr(mac).map(|e| self.dump_entry(&e))
    }

    fn dump_entry(&self, entry: &RemapEntry) -> RemapDump {
        let filter = match self.arena().get(entry.filter) {
            Some(f) => f.name.clone(),
            None => String::from("(None)"),
        };

        RemapDump {
            match_mac: entry.match_mac,
            filter,
            replacements: entry.targets.iter().map(Replacement::from).collect(),
        }
    }

    pub fn dump_runconf(&self) -> DumpRunConfResp {
        let filters = self.arena().iter().map(|f| f.dump()).collect();
        let mut remaps = vec![];
        for bucket in self.db.remaps.iter() {
            for entry in bucket.load().iter() {
                remaps.push(self.dump_entry(entry));
            }
        }
        remaps.sort_by_key(|r| r.match_mac);

        DumpRunConfResp { filters, remaps }
    }
}

impl RemapDb {
    /// Create an empty database. The remap hash salt is drawn here
    /// and kept for the life of the database.
    pub fn init(ectx: Arc<ExecCtx>, cfg: DbCfg) -> Self {
        let remaps = (0..REMAP_BUCKETS)
            .map(|_| ArcSwap::from_pointee(RemapBucket::new()))
            .collect();

        Self {
            ectx,
            cfg,
            cfg_lock: KMutex::new(()),
            rcu: Rcu::new(),
            filters: ArcSwap::from_pointee(FilterArena::default()),
            remaps,
            nremaps: AtomicUsize::new(0),
            hash_salt: rand::random(),
        }
    }

    /// Tear down the database. No frame may be in flight.
    pub fn shutdown(self) {
        let nremaps = self.remap_count();
        let nfilters = self.filter_count();
        self.ectx.log.log(
            LogLevel::Note,
            &format!(
                "shutdown: releasing {nremaps} remaps, {nfilters} filters"
            ),
        );
    }

    pub fn cfg(&self) -> &DbCfg {
        &self.cfg
    }

    pub fn ectx(&self) -> &ExecCtx {
        &self.ectx
    }

    /// The number of grace periods waited out by writers so far.
    pub fn grace_periods(&self) -> u64 {
        self.rcu.grace_periods()
    }

    fn bucket_idx(&self, mac: &MacAddr) -> usize {
        let mut h = crc32fast::Hasher::new_with_initial(self.hash_salt);
        h.update(&mac.tail());
        (h.finalize() as usize) & (REMAP_BUCKETS - 1)
    }

    /// Enter a read-side section.
    pub fn read(&self) -> DbReader<'_> {
        let rcu = self.rcu.read_lock();
        DbReader { db: self, _rcu: rcu }
    }

    pub fn filter_count(&self) -> usize {
        self.filters.load().live
    }

    pub fn remap_count(&self) -> usize {
        self.nremaps.load(Ordering::Relaxed)
    }

    pub fn lookup_filter_by_name(&self, name: &str) -> Option<Arc<Filter>> {
        self.read().lookup_filter_by_name(name)
    }

    pub fn lookup_filter_by_index(&self, idx: usize) -> Option<Arc<Filter>> {
        self.read().lookup_filter_by_index(idx)
    }

    pub fn lookup_remap_by_macaddr(
        &self,
        mac: &MacAddr,
    ) -> Option<Arc<RemapEntry>> {
        self.read().lookup_remap_by_macaddr(mac)
    }

    fn compile(&self, config: FilterConfig) -> CompiledFilter {
        let compiled = compile(&config.rules);
        if compiled.dropped > 0 {
            self.ectx.log.log(
                LogLevel::Warn,
                &format!(
                    "filter {}: ruleset full, dropped {} rule placements",
                    config.name, compiled.dropped
                ),
            );
        }

        CompiledFilter { config, table: compiled.table }
    }

    // Must hold `cfg_lock`.
    fn publish_filter(
        &self,
        name: &str,
        state: CompiledFilter,
    ) -> Result<Arc<Filter>, MrmError> {
        let arena = self.filters.load_full();
        if arena.live >= self.cfg.max_filters {
            return Err(MrmError::OutOfResources(format!(
                "filter table full ({} filters)",
                self.cfg.max_filters
            )));
        }

        let mut next = arena.try_clone()?;
        let filter = next.insert(name, state);
        self.filters.store(Arc::new(next));
        Ok(filter)
    }

    /// Return the filter named `name`, creating an empty one if it
    /// does not exist.
    pub fn insert_filter(&self, name: &str) -> Result<Arc<Filter>, MrmError> {
        validate_filter_name(name)?;
        let _cfg = self.cfg_lock.lock();

        if let Some(filter) = self.filters.load().by_name(name) {
            return Ok(Arc::clone(filter));
        }

        let empty = FilterConfig::new(name, vec![]);
        self.publish_filter(name, self.compile(empty))
    }

    /// Create the filter named by `config`, or replace its
    /// configuration. The new rules and their table are published
    /// together.
    pub fn set_filter(&self, config: FilterConfig) -> Result<(), MrmError> {
        config.validate()?;
        let name = config.name.clone();
        let state = self.compile(config);
        let _cfg = self.cfg_lock.lock();

        let existing = self.filters.load().by_name(&name).cloned();
        match existing {
            Some(filter) => {
                let old = filter.state.swap(Arc::new(state));
                self.rcu.synchronize();
                drop(old);
            }

            None => {
                self.publish_filter(&name, state)?;
            }
        }

        Ok(())
    }

    /// Delete the filter named `name`. Fails with `InUse` while any
    /// remap entry refers to it.
    pub fn delete_filter(&self, name: &str) -> Result<(), MrmError> {
        let _cfg = self.cfg_lock.lock();
        let arena = self.filters.load_full();
        let filter = arena
            .by_name(name)
            .cloned()
            .ok_or_else(|| MrmError::NotFound(format!("filter {name}")))?;

        let mut refs = filter.refs.lock();
        if refs.refcnt > 0 {
            return Err(MrmError::InUse(format!(
                "filter {name} has {} remap references",
                refs.refcnt
            )));
        }

        let mut next = arena.try_clone()?;
        next.remove(filter.id);
        self.filters.store(Arc::new(next));
        refs.live = false;

        // Readers holding the previous arena keep the filter alive
        // until they leave their section.
        Ok(())
    }

    // Must hold `cfg_lock` and have waited out a grace period since
    // `entry` was unlinked.
    fn retire_entry(&self, entry: Arc<RemapEntry>) {
        match self.filters.load().get(entry.filter) {
            Some(filter) => filter.release(),
            None => self.ectx.log.log(
                LogLevel::Error,
                &format!(
                    "remap {} refers to a filter that no longer exists",
                    entry.match_mac
                ),
            ),
        }
    }

    /// Create or replace the remap entry for `match_mac`, bound to
    /// the filter named `filter` and remapping to `targets` in
    /// round-robin order.
    pub fn insert_or_update_remap(
        &self,
        match_mac: MacAddr,
        filter: &str,
        targets: Vec<Target>,
    ) -> Result<(), MrmError> {
        if targets.is_empty() || targets.len() > MAX_REPLACE {
            return Err(MrmError::InvalidArgument(format!(
                "remap {match_mac} needs 1-{MAX_REPLACE} replacements, got {}",
                targets.len()
            )));
        }

        let _cfg = self.cfg_lock.lock();
        let filter = self
            .filters
            .load()
            .by_name(filter)
            .cloned()
            .ok_or_else(|| MrmError::InvalidFilter(filter.to_string()))?;

        let slot = &self.remaps[self.bucket_idx(&match_mac)];
        let bucket = slot.load_full();
        let old_pos = bucket.iter().position(|e| e.match_mac == match_mac);

        if old_pos.is_none() && self.remap_count() >= self.cfg.max_remaps {
            return Err(MrmError::OutOfResources(format!(
                "remap table full ({} entries)",
                self.cfg.max_remaps
            )));
        }

        let mut next = RemapBucket::new();
        next.try_reserve(bucket.len() + 1).map_err(|_| oom("remap bucket"))?;

        filter.acquire()?;
        let entry = Arc::new(RemapEntry {
            match_mac,
            filter: filter.id,
            targets,
            cursor: AtomicU32::new(0),
        });

        match old_pos {
            Some(pos) => {
                next.extend(bucket.iter().cloned());
                let old = std::mem::replace(&mut next[pos], entry);
                slot.store(Arc::new(next));
                drop(bucket);
                self.rcu.synchronize();
                self.retire_entry(old);
            }

            None => {
                next.push(entry);
                next.extend(bucket.iter().cloned());
                slot.store(Arc::new(next));
                self.nremaps.fetch_add(1, Ordering::Relaxed);
            }
        }

        Ok(())
    }

    /// Delete the remap entry for `match_mac`.
    pub fn delete_remap(&self, match_mac: &MacAddr) -> Result<(), MrmError> {
        let _cfg = self.cfg_lock.lock();
        let slot = &self.remaps[self.bucket_idx(match_mac)];
        let bucket = slot.load_full();
        let pos = bucket
            .iter()
            .position(|e| e.match_mac == *match_mac)
            .ok_or_else(|| MrmError::NotFound(format!("remap {match_mac}")))?;

        let mut next = RemapBucket::new();
        next.try_reserve(bucket.len()).map_err(|_| oom("remap bucket"))?;
        next.extend(bucket.iter().cloned());
        let old = next.remove(pos);
        slot.store(Arc::new(next));
        self.nremaps.fetch_sub(1, Ordering::Relaxed);
        drop(bucket);

        self.rcu.synchronize();
        self.retire_entry(old);
        Ok(())
    }

    /// Remove every remap entry, then every filter. Frames may still
    /// be arriving; all entries are unlinked first and retired after a
    /// single grace period.
    pub fn clear(&self) {
        let _cfg = self.cfg_lock.lock();
        let mut retired = vec![];

        for slot in self.remaps.iter() {
            let old = slot.swap(Arc::new(RemapBucket::new()));
            retired.extend(old.iter().cloned());
        }
        self.nremaps.store(0, Ordering::Relaxed);

        self.rcu.synchronize();
        let nremaps = retired.len();
        for entry in retired {
            self.retire_entry(entry);
        }

        let arena = self.filters.swap(Arc::new(FilterArena::default()));
        for filter in arena.iter() {
            filter.refs.lock().live = false;
        }

        self.ectx.log.log(
            LogLevel::Note,
            &format!(
                "wiped running configuration: {nremaps} remaps, {} filters",
                arena.live
            ),
        );
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::PrintlnLog;
    use mrm_api::FILTER_NAME_MAX;
    use mrm_api::FilterRule;

    fn db_with(cfg: DbCfg) -> RemapDb {
        RemapDb::init(Arc::new(ExecCtx { log: Box::new(PrintlnLog) }), cfg)
    }

    fn db() -> RemapDb {
        db_with(DbCfg::default())
    }

    fn mac(last: u8) -> MacAddr {
        MacAddr::from([0x02, 0, 0, 0, 0, last])
    }

    fn targets(n: u8) -> Vec<Target> {
        (0..n).map(|i| Target { mac: mac(0xF0 + i), dev: None }).collect()
    }

    fn any_filter(name: &str) -> FilterConfig {
        FilterConfig::new(name, vec![FilterRule::default()])
    }

    #[test]
    fn insert_filter_is_idempotent() {
        let db = db();
        let a = db.insert_filter("guest").unwrap();
        let b = db.insert_filter("guest").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(db.filter_count(), 1);
        assert!(a.compiled().config.rules.is_empty());
        assert!(matches!(
            db.insert_filter(&"x".repeat(FILTER_NAME_MAX)),
            Err(MrmError::InvalidArgument(_))
        ));
    }

    #[test]
    fn set_filter_replaces_in_place() {
        let db = db();
        db.set_filter(any_filter("guest")).unwrap();
        let before = db.lookup_filter_by_name("guest").unwrap();

        let rules = vec!["proto=family,tcp dstport=443".parse().unwrap()];
        db.set_filter(FilterConfig::new("guest", rules.clone())).unwrap();
        let after = db.lookup_filter_by_name("guest").unwrap();

        assert!(Arc::ptr_eq(&before, &after));
        assert_eq!(after.compiled().config.rules, rules);
        assert_eq!(after.compiled().table.ip4.tcp.to_vec(), vec![0]);
        assert_eq!(db.filter_count(), 1);
    }

    #[test]
    fn filter_capacity() {
        let db = db_with(DbCfg { max_filters: 2, ..Default::default() });
        db.set_filter(any_filter("a")).unwrap();
        db.set_filter(any_filter("b")).unwrap();
        assert!(matches!(
            db.set_filter(any_filter("c")),
            Err(MrmError::OutOfResources(_))
        ));
        // Replacing an existing filter needs no new slot.
        db.set_filter(any_filter("b")).unwrap();

        db.delete_filter("a").unwrap();
        db.set_filter(any_filter("c")).unwrap();
        assert_eq!(db.filter_count(), 2);
    }

    #[test]
    fn lookup_by_index() {
        let db = db();
        db.set_filter(any_filter("a")).unwrap();
        db.set_filter(any_filter("b")).unwrap();
        assert_eq!(db.lookup_filter_by_index(1).unwrap().name(), "b");
        assert!(db.lookup_filter_by_index(2).is_none());

        db.insert_or_update_remap(mac(1), "a", targets(1)).unwrap();
        let r = db.read();
        assert_eq!(r.lookup_remap_by_index(0).unwrap().match_mac(), mac(1));
        assert!(r.lookup_remap_by_index(1).is_none());
    }

    #[test]
    fn stale_filter_id_is_not_resolved() {
        let db = db();
        db.set_filter(any_filter("a")).unwrap();
        let old_id = db.lookup_filter_by_name("a").unwrap().id();
        db.delete_filter("a").unwrap();
        db.set_filter(any_filter("b")).unwrap();

        let r = db.read();
        let b = r.lookup_filter_by_name("b").unwrap();
        assert_eq!(b.id().slot, old_id.slot);
        assert!(r.filter(old_id).is_none());
    }

    #[test]
    fn remap_requires_filter() {
        let db = db();
        assert_eq!(
            db.insert_or_update_remap(mac(1), "nope", targets(1)),
            Err(MrmError::InvalidFilter("nope".into()))
        );
        assert_eq!(db.remap_count(), 0);
    }

    #[test]
    fn remap_replacement_bounds() {
        let db = db();
        db.set_filter(any_filter("guest")).unwrap();
        for n in [0, MAX_REPLACE as u8 + 1] {
            assert!(matches!(
                db.insert_or_update_remap(mac(1), "guest", targets(n)),
                Err(MrmError::InvalidArgument(_))
            ));
        }
        db.insert_or_update_remap(mac(1), "guest", targets(MAX_REPLACE as u8))
            .unwrap();
    }

    #[test]
    fn refcnt_follows_remaps() {
        let db = db();
        db.set_filter(any_filter("a")).unwrap();
        db.set_filter(any_filter("b")).unwrap();
        let a = db.lookup_filter_by_name("a").unwrap();
        let b = db.lookup_filter_by_name("b").unwrap();

        db.insert_or_update_remap(mac(1), "a", targets(1)).unwrap();
        db.insert_or_update_remap(mac(2), "a", targets(1)).unwrap();
        assert_eq!((a.refcnt(), b.refcnt()), (2, 0));

        // Rebinding moves the reference.
        db.insert_or_update_remap(mac(2), "b", targets(2)).unwrap();
        assert_eq!((a.refcnt(), b.refcnt()), (1, 1));
        assert_eq!(db.remap_count(), 2);

        assert_eq!(
            db.delete_filter("a"),
            Err(MrmError::InUse("filter a has 1 remap references".into()))
        );
        assert!(db.lookup_filter_by_name("a").is_some());

        db.delete_remap(&mac(1)).unwrap();
        assert_eq!(a.refcnt(), 0);
        db.delete_filter("a").unwrap();
        assert!(db.lookup_filter_by_name("a").is_none());
        assert!(matches!(db.delete_filter("a"), Err(MrmError::NotFound(_))));
    }

    #[test]
    fn update_waits_for_grace_period() {
        let db = db();
        db.set_filter(any_filter("guest")).unwrap();
        db.insert_or_update_remap(mac(1), "guest", targets(1)).unwrap();
        let gps = db.grace_periods();

        let held = db.lookup_remap_by_macaddr(&mac(1)).unwrap();
        db.insert_or_update_remap(mac(1), "guest", targets(3)).unwrap();
        assert_eq!(db.grace_periods(), gps + 1);

        // The retired entry is intact for whoever still holds it.
        assert_eq!(held.targets().len(), 1);
        let now = db.lookup_remap_by_macaddr(&mac(1)).unwrap();
        assert_eq!(now.targets().len(), 3);
        assert_eq!(db.remap_count(), 1);
    }

    #[test]
    fn delete_remap_missing() {
        let db = db();
        assert!(matches!(db.delete_remap(&mac(9)), Err(MrmError::NotFound(_))));
    }

    #[test]
    fn remap_capacity() {
        let db = db_with(DbCfg { max_remaps: 4, ..Default::default() });
        db.set_filter(any_filter("guest")).unwrap();
        for i in 0..4 {
            db.insert_or_update_remap(mac(i), "guest", targets(1)).unwrap();
        }
        assert!(matches!(
            db.insert_or_update_remap(mac(4), "guest", targets(1)),
            Err(MrmError::OutOfResources(_))
        ));
        assert_eq!(db.remap_count(), 4);
        assert_eq!(db.lookup_filter_by_name("guest").unwrap().refcnt(), 4);

        // Updating an existing entry is still allowed at capacity.
        db.insert_or_update_remap(mac(0), "guest", targets(2)).unwrap();
        assert_eq!(db.remap_count(), 4);
    }

    #[test]
    fn round_robin_wraps() {
        let db = db();
        db.set_filter(any_filter("guest")).unwrap();
        db.insert_or_update_remap(mac(1), "guest", targets(3)).unwrap();
        let entry = db.lookup_remap_by_macaddr(&mac(1)).unwrap();

        let seen: Vec<u8> =
            (0..7).map(|_| entry.next_target().mac.bytes()[5]).collect();
        assert_eq!(seen, vec![0xF0, 0xF1, 0xF2, 0xF0, 0xF1, 0xF2, 0xF0]);
    }

    #[test]
    fn clear_removes_everything() {
        let db = db();
        db.set_filter(any_filter("a")).unwrap();
        db.set_filter(any_filter("b")).unwrap();
        for i in 0..10 {
            db.insert_or_update_remap(mac(i), "a", targets(1)).unwrap();
        }
        let a = db.lookup_filter_by_name("a").unwrap();

        db.clear();
        assert_eq!(db.remap_count(), 0);
        assert_eq!(db.filter_count(), 0);
        assert_eq!(a.refcnt(), 0);
        assert!(db.lookup_remap_by_macaddr(&mac(3)).is_none());

        // A stale handle can no longer take references.
        assert!(matches!(a.acquire(), Err(MrmError::InvalidFilter(_))));

        // The database is usable after a wipe.
        db.set_filter(any_filter("a")).unwrap();
        db.insert_or_update_remap(mac(1), "a", targets(1)).unwrap();
        assert_eq!(db.remap_count(), 1);
    }

    #[test]
    fn dump() {
        let db = db();
        db.set_filter(any_filter("guest")).unwrap();
        let dev = NetDev::new("eth1", 3);
        let t = vec![
            Target { mac: mac(0xA0), dev: Some(dev.clone()) },
            Target { mac: mac(0xA1), dev: None },
        ];
        db.insert_or_update_remap(mac(1), "guest", t).unwrap();

        let dump = db.read().dump_runconf();
        assert_eq!(dump.filters.len(), 1);
        assert_eq!(dump.filters[0].refcnt, 1);
        assert_eq!(dump.filters[0].ip4.other, vec![0]);
        assert_eq!(dump.remaps.len(), 1);
        assert_eq!(dump.remaps[0].filter, "guest");
        assert_eq!(
            dump.remaps[0].replacements,
            vec![
                Replacement::with_ifname(mac(0xA0), "eth1"),
                Replacement::new(mac(0xA1)),
            ]
        );

        // Deleting the entry drops its interface hold.
        assert_eq!(dev.holds(), 2);
        db.delete_remap(&mac(1)).unwrap();
        assert_eq!(dev.holds(), 1);
    }

    #[test]
    fn hash_uses_low_bytes() {
        let db = db();
        let a = MacAddr::from([0x02, 0x00, 1, 2, 3, 4]);
        let b = MacAddr::from([0xFE, 0xFF, 1, 2, 3, 4]);
        assert_eq!(db.bucket_idx(&a), db.bucket_idx(&b));
        assert!(db.bucket_idx(&a) < REMAP_BUCKETS);
    }
}
