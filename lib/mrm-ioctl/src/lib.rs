// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! The client side of the MRM command channel.

use mrm::engine::ctl::ControlNode;
use mrm_api::CmdOk;
use mrm_api::CountResp;
use mrm_api::DeleteFilterReq;
use mrm_api::DeleteRemapReq;
use mrm_api::DumpRunConfResp;
use mrm_api::FilterConfig;
use mrm_api::FilterDump;
use mrm_api::GetFilterReq;
use mrm_api::GetRemapReq;
use mrm_api::MacAddr;
use mrm_api::MrmCmd;
use mrm_api::MrmCmdIoctl;
use mrm_api::MrmCmdResp;
pub use mrm_api::MrmError;
use mrm_api::NoResp;
use mrm_api::RemapDump;
use mrm_api::Replacement;
use mrm_api::SetFilterReq;
use mrm_api::SetRemapReq;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use thiserror::Error;

/// Errors related to administering the remapper.
#[derive(Debug, Error)]
pub enum Error {
    #[error("error interacting with control node: {0}")]
    Io(#[from] std::io::Error),

    #[error("request serialization failed for command {0:?}: {1}")]
    ReqSer(MrmCmd, postcard::Error),

    #[error("response deserialization failed for command {0:?}: {1}")]
    RespDeser(MrmCmd, postcard::Error),

    #[error("command {0:?} failed: {1}")]
    CommandError(MrmCmd, MrmError),
}

impl Error {
    /// The engine's error, if the command reached the engine.
    pub fn cmd_err(&self) -> Option<&MrmError> {
        match self {
            Self::CommandError(_, e) => Some(e),
            _ => None,
        }
    }
}

/// Carries one encoded command to a control node and brings back the
/// encoded reply.
pub trait CmdTransport {
    fn call(&self, req: &[u8]) -> std::io::Result<Vec<u8>>;
}

impl CmdTransport for ControlNode {
    fn call(&self, req: &[u8]) -> std::io::Result<Vec<u8>> {
        Ok(self.ioctl(req))
    }
}

impl<T: CmdTransport + ?Sized> CmdTransport for Arc<T> {
    fn call(&self, req: &[u8]) -> std::io::Result<Vec<u8>> {
        (**self).call(req)
    }
}

/// The handle used to send administration commands to the remapper.
pub struct MrmHdl<T> {
    transport: T,
}

impl<T: CmdTransport> MrmHdl<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Return the number of configured filters.
    pub fn filter_count(&self) -> Result<u32, Error> {
        let resp: CountResp =
            self.run_cmd(MrmCmd::GetFilterCount, None::<&()>)?;
        Ok(resp.count)
    }

    pub fn get_filter(&self, name: &str) -> Result<FilterDump, Error> {
        let req = GetFilterReq { name: name.to_string() };
        self.run_cmd(MrmCmd::GetFilter, Some(&req))
    }

    /// Create a filter, or replace the rules of an existing one.
    pub fn set_filter(&self, config: FilterConfig) -> Result<NoResp, Error> {
        self.run_cmd(MrmCmd::SetFilter, Some(&SetFilterReq { config }))
    }

    pub fn delete_filter(&self, name: &str) -> Result<NoResp, Error> {
        let req = DeleteFilterReq { name: name.to_string() };
        self.run_cmd(MrmCmd::DeleteFilter, Some(&req))
    }

    /// Return the number of remap entries.
    pub fn remap_count(&self) -> Result<u32, Error> {
        let resp: CountResp = self.run_cmd(MrmCmd::GetRemapCount, None::<&()>)?;
        Ok(resp.count)
    }

    pub fn get_remap(&self, match_mac: MacAddr) -> Result<RemapDump, Error> {
        self.run_cmd(MrmCmd::GetRemap, Some(&GetRemapReq { match_mac }))
    }

    /// Create or replace the remap entry for `match_mac`.
    pub fn set_remap(
        &self,
        match_mac: MacAddr,
        filter: &str,
        replacements: Vec<Replacement>,
    ) -> Result<NoResp, Error> {
        let req = SetRemapReq {
            match_mac,
            filter: filter.to_string(),
            replacements,
        };
        self.run_cmd(MrmCmd::SetRemap, Some(&req))
    }

    pub fn delete_remap(&self, match_mac: MacAddr) -> Result<NoResp, Error> {
        self.run_cmd(MrmCmd::DeleteRemap, Some(&DeleteRemapReq { match_mac }))
    }

    /// Delete every remap entry and filter.
    pub fn wipe(&self) -> Result<NoResp, Error> {
        self.run_cmd(MrmCmd::WipeRunConf, None::<&()>)
    }

    /// Return the full running configuration.
    pub fn dump_runconf(&self) -> Result<DumpRunConfResp, Error> {
        self.run_cmd(MrmCmd::DumpRunConf, None::<&()>)
    }

    pub fn run_cmd<R, S>(
        &self,
        cmd: MrmCmd,
        req: Option<&S>,
    ) -> Result<R, Error>
    where
        R: CmdOk + DeserializeOwned,
        S: Serialize,
    {
        let ioctl =
            MrmCmdIoctl::new(cmd, req).map_err(|e| Error::ReqSer(cmd, e))?;

        // An empty body means "no request" to the engine, so a
        // request type which serializes to nothing can never arrive.
        assert!(
            req.is_none() || !ioctl.req.is_empty(),
            "cannot use ZST for request type"
        );

        let bytes =
            postcard::to_allocvec(&ioctl).map_err(|e| Error::ReqSer(cmd, e))?;
        let reply = self.transport.call(&bytes)?;
        let resp: MrmCmdResp = postcard::from_bytes(&reply)
            .map_err(|e| Error::RespDeser(cmd, e))?;

        match resp {
            Ok(body) => postcard::from_bytes(&body)
                .map_err(|e| Error::RespDeser(cmd, e)),

            Err(e) => Err(Error::CommandError(cmd, e)),
        }
    }
}
