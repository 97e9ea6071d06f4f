// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Read-side critical sections and grace periods.
//!
//! Readers bracket their use of shared configuration with
//! [`Rcu::read_lock`]. Entering and leaving a section is a pair of
//! atomic counter updates; a reader never blocks. A writer that has
//! unlinked an object calls [`Rcu::synchronize`], which returns only
//! once every reader that entered its section before the call has
//! left it. After that the writer may retire the object.
//!
//! Readers count themselves into one of two slots, chosen by the
//! current phase. `synchronize()` flips the phase and waits for the
//! old slot to drain. A reader re-checks the phase after counting
//! itself in, and moves to the new slot if a flip raced with it, so
//! the old slot can only shrink once the flip is visible.

use super::sync::KMutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering::SeqCst;

pub struct Rcu {
    phase: AtomicUsize,
    readers: [AtomicUsize; 2],
    // Serializes writers waiting out a grace period.
    gp_lock: KMutex<u64>,
}

/// An active read-side critical section. Dropping it leaves the
/// section.
pub struct RcuReadGuard<'a> {
    rcu: &'a Rcu,
    slot: usize,
}

impl Drop for RcuReadGuard<'_> {
    fn drop(&mut self) {
        self.rcu.readers[self.slot].fetch_sub(1, SeqCst);
    }
}

impl Default for Rcu {
    fn default() -> Self {
        Self::new()
    }
}

impl Rcu {
    pub fn new() -> Self {
        Self {
            phase: AtomicUsize::new(0),
            readers: [AtomicUsize::new(0), AtomicUsize::new(0)],
            gp_lock: KMutex::new(0),
        }
    }

    /// Enter a read-side critical section.
    pub fn read_lock(&self) -> RcuReadGuard<'_> {
        loop {
            let slot = self.phase.load(SeqCst) & 1;
            self.readers[slot].fetch_add(1, SeqCst);

            if self.phase.load(SeqCst) & 1 == slot {
                return RcuReadGuard { rcu: self, slot };
            }

            // A writer flipped the phase underneath us.
            self.readers[slot].fetch_sub(1, SeqCst);
        }
    }

    /// Wait for a grace period: every read-side section active at the
    /// time of the call has ended when this returns.
    ///
    /// This must not be called from inside a read-side section, as it
    /// would wait on itself.
    pub fn synchronize(&self) {
        let mut gps = self.gp_lock.lock();
        let old = self.phase.fetch_add(1, SeqCst) & 1;

        while self.readers[old].load(SeqCst) != 0 {
            std::thread::yield_now();
        }

        *gps += 1;
    }

    /// The number of grace periods that have elapsed.
    pub fn grace_periods(&self) -> u64 {
        *self.gp_lock.lock()
    }
}
