// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Abstractions over the host services the engine relies on: locks,
//! read-side critical sections with grace periods, and held network
//! interface references.
pub mod dev;
pub mod rcu;
pub mod sync;
