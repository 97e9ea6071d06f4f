// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! The control node: the engine side of the command channel.
//!
//! Each command arrives as a postcard-encoded [`MrmCmdIoctl`]. The
//! node checks the API version, hands the envelope to the command's
//! handler, and encodes the handler's result as the reply.

use super::rcdb::RemapDb;
use super::rcdb::Target;
use crate::ExecCtx;
use crate::LogLevel;
use crate::ddi::dev::DevResolver;
use mrm_api::CmdOk;
use mrm_api::CountResp;
use mrm_api::DeleteFilterReq;
use mrm_api::DeleteRemapReq;
use mrm_api::DumpRunConfResp;
use mrm_api::FilterDump;
use mrm_api::GetFilterReq;
use mrm_api::GetRemapReq;
use mrm_api::MrmCmd;
use mrm_api::MrmCmdIoctl;
use mrm_api::MrmCmdResp;
use mrm_api::MrmError;
use mrm_api::NoResp;
use mrm_api::RemapDump;
use mrm_api::Replacement;
use mrm_api::SetFilterReq;
use mrm_api::SetRemapReq;
use mrm_api::validate_ifname;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// A decoded command.
pub struct IoctlEnvelope {
    ioctl: MrmCmdIoctl,
}

impl IoctlEnvelope {
    pub fn wrap(bytes: &[u8]) -> Result<Self, MrmError> {
        let ioctl: MrmCmdIoctl = postcard::from_bytes(bytes)
            .map_err(|e| MrmError::DeserCmdReq(e.to_string()))?;

        if !ioctl.check_version() {
            return Err(MrmError::BadApiVersion {
                user: ioctl.api_version,
                kernel: mrm_api::API_VERSION,
            });
        }

        Ok(Self { ioctl })
    }

    pub fn ioctl_cmd(&self) -> MrmCmd {
        self.ioctl.cmd
    }

    /// Return the deserialized request body.
    pub fn copy_in_req<T: DeserializeOwned>(&self) -> Result<T, MrmError> {
        if self.ioctl.req.is_empty() {
            return Err(MrmError::NoRequestBody);
        }

        postcard::from_bytes(&self.ioctl.req)
            .map_err(|e| MrmError::DeserCmdReq(e.to_string()))
    }
}

// Serialize the handler's response.
fn hdlr_resp<T: CmdOk>(resp: Result<T, MrmError>) -> MrmCmdResp {
    let resp = resp?;
    postcard::to_allocvec(&resp)
        .map_err(|e| MrmError::SerCmdResp(e.to_string()))
}

// Encode the reply. A reply which fails to encode is replaced by the
// encoding error.
fn copy_out_resp<S: Serialize>(ectx: &ExecCtx, resp: &S) -> Vec<u8> {
    match postcard::to_allocvec(resp) {
        Ok(bytes) => bytes,
        Err(e) => {
            ectx.log.log(
                LogLevel::Error,
                &format!("failed to serialize response: {e}"),
            );
            let err: MrmCmdResp = Err(MrmError::SerCmdResp(e.to_string()));
            postcard::to_allocvec(&err).unwrap_or_default()
        }
    }
}

pub struct ControlNode {
    db: Arc<RemapDb>,
    devs: Arc<dyn DevResolver>,
}

impl ControlNode {
    pub fn new(db: Arc<RemapDb>, devs: Arc<dyn DevResolver>) -> Self {
        Self { db, devs }
    }

    pub fn db(&self) -> &Arc<RemapDb> {
        &self.db
    }

    /// Handle one encoded command and return the encoded reply.
    pub fn ioctl(&self, bytes: &[u8]) -> Vec<u8> {
        let resp =
            IoctlEnvelope::wrap(bytes).and_then(|env| self.dispatch(&env));
        copy_out_resp(self.db.ectx(), &resp)
    }

    // Multiplex the command to its handler.
    pub fn dispatch(&self, env: &IoctlEnvelope) -> MrmCmdResp {
        let cmd = env.ioctl_cmd();
        let resp = match cmd {
            MrmCmd::GetFilterCount => {
                let resp = self.get_filter_count_hdlr();
                hdlr_resp(resp)
            }

            MrmCmd::GetFilter => {
                let resp = self.get_filter_hdlr(env);
                hdlr_resp(resp)
            }

            MrmCmd::SetFilter => {
                let resp = self.set_filter_hdlr(env);
                hdlr_resp(resp)
            }

            MrmCmd::DeleteFilter => {
                let resp = self.delete_filter_hdlr(env);
                hdlr_resp(resp)
            }

            MrmCmd::GetRemapCount => {
                let resp = self.get_remap_count_hdlr();
                hdlr_resp(resp)
            }

            MrmCmd::GetRemap => {
                let resp = self.get_remap_hdlr(env);
                hdlr_resp(resp)
            }

            MrmCmd::SetRemap => {
                let resp = self.set_remap_hdlr(env);
                hdlr_resp(resp)
            }

            MrmCmd::DeleteRemap => {
                let resp = self.delete_remap_hdlr(env);
                hdlr_resp(resp)
            }

            MrmCmd::WipeRunConf => {
                let resp = self.wipe_runconf_hdlr();
                hdlr_resp(resp)
            }

            MrmCmd::DumpRunConf => {
                let resp = self.dump_runconf_hdlr();
                hdlr_resp(resp)
            }
        };

        if let Err(e) = &resp {
            self.db
                .ectx()
                .log
                .log(LogLevel::Note, &format!("{cmd:?} failed: {e}"));
        }

        resp
    }

    fn get_filter_count_hdlr(&self) -> Result<CountResp, MrmError> {
        Ok(CountResp { count: self.db.filter_count() as u32 })
    }

    fn get_filter_hdlr(
        &self,
        env: &IoctlEnvelope,
    ) -> Result<FilterDump, MrmError> {
        let req: GetFilterReq = env.copy_in_req()?;
        self.db
            .read()
            .dump_filter(&req.name)
            .ok_or_else(|| MrmError::NotFound(format!("filter {}", req.name)))
    }

    fn set_filter_hdlr(&self, env: &IoctlEnvelope) -> Result<NoResp, MrmError> {
        let req: SetFilterReq = env.copy_in_req()?;
        self.db.set_filter(req.config)?;
        Ok(NoResp::default())
    }

    fn delete_filter_hdlr(
        &self,
        env: &IoctlEnvelope,
    ) -> Result<NoResp, MrmError> {
        let req: DeleteFilterReq = env.copy_in_req()?;
        self.db.delete_filter(&req.name)?;
        Ok(NoResp::default())
    }

    fn get_remap_count_hdlr(&self) -> Result<CountResp, MrmError> {
        Ok(CountResp { count: self.db.remap_count() as u32 })
    }

    fn get_remap_hdlr(
        &self,
        env: &IoctlEnvelope,
    ) -> Result<RemapDump, MrmError> {
        let req: GetRemapReq = env.copy_in_req()?;
        self.db
            .read()
            .dump_remap(&req.match_mac)
            .ok_or_else(|| {
                MrmError::NotFound(format!("remap {}", req.match_mac))
            })
    }

    fn set_remap_hdlr(&self, env: &IoctlEnvelope) -> Result<NoResp, MrmError> {
        let req: SetRemapReq = env.copy_in_req()?;

        if self.db.lookup_filter_by_name(&req.filter).is_none() {
            return Err(MrmError::InvalidFilter(req.filter));
        }

        // Any handles resolved here are released if the insert fails.
        let targets = self.resolve_targets(&req.replacements)?;
        self.db.insert_or_update_remap(req.match_mac, &req.filter, targets)?;
        Ok(NoResp::default())
    }

    fn delete_remap_hdlr(
        &self,
        env: &IoctlEnvelope,
    ) -> Result<NoResp, MrmError> {
        let req: DeleteRemapReq = env.copy_in_req()?;
        self.db.delete_remap(&req.match_mac)?;
        Ok(NoResp::default())
    }

    fn wipe_runconf_hdlr(&self) -> Result<NoResp, MrmError> {
        self.db.clear();
        Ok(NoResp::default())
    }

    fn dump_runconf_hdlr(&self) -> Result<DumpRunConfResp, MrmError> {
        Ok(self.db.read().dump_runconf())
    }

    fn resolve_targets(
        &self,
        reps: &[Replacement],
    ) -> Result<Vec<Target>, MrmError> {
        let mut targets = Vec::with_capacity(reps.len());

        for rep in reps {
            let dev = match &rep.ifname {
                Some(name) => {
                    validate_ifname(name)?;
                    let dev = self.devs.get_by_name(name).ok_or_else(|| {
                        MrmError::InvalidInterface(name.clone())
                    })?;
                    Some(dev)
                }

                None => None,
            };

            targets.push(Target { mac: rep.mac, dev });
        }

        Ok(targets)
    }
}
