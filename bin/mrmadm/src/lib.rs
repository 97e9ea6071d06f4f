// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! MRM administration library

use anyhow::Context;
use mrm::ExecCtx;
use mrm::ddi::dev::DevTable;
use mrm::engine::ctl::ControlNode;
use mrm::engine::frame::EthFrame;
use mrm::engine::rcdb::DbCfg;
use mrm::engine::rcdb::RemapDb;
use mrm::engine::remap::RemapResult;
use mrm::engine::remap::perform_ethernet_remap;
use mrm_ioctl::MrmHdl;
use slog::Logger;
use slog::debug;
use slog::info;
use slog::o;
use std::ops::Deref;
use std::sync::Arc;

pub mod config;
pub mod log;

use config::Config;
use log::SlogProvider;

/// An in-process engine together with the handle used to send it
/// administration commands.
pub struct MrmAdm {
    hdl: MrmHdl<Arc<ControlNode>>,
    node: Arc<ControlNode>,
    devs: Arc<DevTable>,
    log: Logger,
}

impl Deref for MrmAdm {
    type Target = MrmHdl<Arc<ControlNode>>;

    fn deref(&self) -> &Self::Target {
        &self.hdl
    }
}

impl MrmAdm {
    pub fn new(log: Logger, cfg: DbCfg) -> Self {
        let ectx = Arc::new(ExecCtx {
            log: Box::new(SlogProvider::new(log.new(o!("unit" => "engine")))),
        });
        let db = Arc::new(RemapDb::init(ectx, cfg));
        let devs = Arc::new(DevTable::new());
        let node = Arc::new(ControlNode::new(db, devs.clone()));
        let hdl = MrmHdl::new(node.clone());
        Self { hdl, node, devs, log }
    }

    /// Create an engine sized by `config` and load it.
    pub fn from_config(log: Logger, config: &Config) -> anyhow::Result<Self> {
        let adm = Self::new(log, DbCfg::from(&config.engine));
        adm.load(config)?;
        Ok(adm)
    }

    /// Register the interfaces, then the filters, then the remaps.
    pub fn load(&self, config: &Config) -> anyhow::Result<()> {
        for intf in &config.interfaces {
            self.devs
                .add(&intf.name, intf.index)
                .with_context(|| format!("interface {}", intf.name))?;
        }

        for filter in &config.filters {
            let fc = filter.to_config()?;
            self.set_filter(fc).with_context(|| {
                format!("failed to set filter {}", filter.name)
            })?;
            debug!(self.log, "set filter"; "name" => &filter.name);
        }

        for remap in &config.remaps {
            let mac = remap.match_mac()?;
            self.set_remap(mac, &remap.filter, remap.replacements()?)
                .with_context(|| format!("failed to set remap {mac}"))?;
            debug!(
                self.log, "set remap";
                "mac" => %mac, "filter" => &remap.filter,
            );
        }

        info!(
            self.log,
            "configuration loaded";
            "interfaces" => config.interfaces.len(),
            "filters" => config.filters.len(),
            "remaps" => config.remaps.len(),
        );
        Ok(())
    }

    pub fn db(&self) -> &Arc<RemapDb> {
        self.node.db()
    }

    /// Run `frame` through the remap path.
    pub fn trace(&self, frame: &mut EthFrame) -> RemapResult {
        perform_ethernet_remap(self.db(), frame)
    }
}
