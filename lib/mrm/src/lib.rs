// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! The MAC remapping engine.
//!
//! Frames crossing a bridge are handed to
//! [`engine::remap::perform_ethernet_remap`], which rewrites the
//! destination MAC of frames addressed to a configured remap entry
//! whose filter matches. Configuration lives in a
//! [`engine::rcdb::RemapDb`] and is driven through
//! [`engine::ctl::ControlNode`].

#![allow(clippy::len_without_is_empty)]
#![deny(unreachable_patterns)]
#![deny(unused_must_use)]

pub use mrm_api as api;

pub mod ddi;
pub mod engine;
pub mod print;
pub mod provider;

pub use provider::LogLevel;
pub use provider::LogProvider;
pub use provider::PrintlnLog;

/// The execution context handed to the engine at init. It carries
/// the providers for whatever environment the engine is running in.
pub struct ExecCtx {
    pub log: Box<dyn LogProvider>,
}
