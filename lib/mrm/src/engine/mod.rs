// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! The remapping engine: filter compilation, classification, the
//! configuration database, and the per-frame remap path.
pub mod accel;
pub mod classify;
pub mod ctl;
pub mod frame;
pub mod rcdb;
pub mod remap;
