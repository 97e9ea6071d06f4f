// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Route engine logs into slog.

use mrm::LogLevel;
use mrm::LogProvider;
use slog::Drain;
use slog::Level;
use slog::Logger;
use slog::error;
use slog::info;
use slog::o;
use slog::warn;

/// A [`LogProvider`] which hands engine messages to an slog
/// [`Logger`].
pub struct SlogProvider {
    log: Logger,
}

impl SlogProvider {
    pub fn new(log: Logger) -> Self {
        Self { log }
    }
}

impl LogProvider for SlogProvider {
    fn log(&self, level: LogLevel, msg: &str) {
        match level {
            LogLevel::Note => info!(self.log, "{}", msg),
            LogLevel::Warn => warn!(self.log, "{}", msg),
            LogLevel::Error => error!(self.log, "{}", msg),
        }
    }
}

/// Build the terminal logger. Each `-v` lowers the threshold by one
/// level, starting from warnings.
pub fn logger(verbose: u8) -> Logger {
    let level = match verbose {
        0 => Level::Warning,
        1 => Level::Info,
        2 => Level::Debug,
        _ => Level::Trace,
    };

    let decorator = slog_term::TermDecorator::new().stderr().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    let drain = drain.filter_level(level).fuse();
    Logger::root(drain, o!("component" => "mrmadm"))
}
