// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

use super::API_VERSION;
use super::filter::FilterConfig;
use super::filter::FilterRule;
use super::mac::MacAddr;
use super::remap::Replacement;
use serde::Deserialize;
use serde::Serialize;
use std::fmt::Debug;

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[repr(C)]
pub enum MrmCmd {
    GetFilterCount = 1, // number of filters
    GetFilter = 2,      // dump one filter by name
    SetFilter = 3,      // create or replace a filter
    DeleteFilter = 4,   // delete an unreferenced filter
    GetRemapCount = 10, // number of remap entries
    GetRemap = 11,      // dump one remap entry by MAC
    SetRemap = 12,      // create or replace a remap entry
    DeleteRemap = 13,   // delete a remap entry
    WipeRunConf = 20,   // delete every remap entry and filter
    DumpRunConf = 21,   // dump the full running configuration
}

/// The envelope carrying one command across the control boundary.
///
/// The command's actual request data is serialized by postcard into
/// `req`; an empty `req` means the command carries no request body.
/// The reply to an envelope is a postcard-encoded [`MrmCmdResp`].
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct MrmCmdIoctl {
    pub api_version: u64,
    pub cmd: MrmCmd,
    pub req: Vec<u8>,
}

impl MrmCmdIoctl {
    pub fn new<R: Serialize>(
        cmd: MrmCmd,
        req: Option<&R>,
    ) -> Result<Self, postcard::Error> {
        let req = match req {
            Some(req) => postcard::to_allocvec(req)?,
            None => vec![],
        };

        Ok(Self { api_version: API_VERSION, cmd, req })
    }

    /// Is this the expected API version?
    ///
    /// NOTE: This function is compiled into both the client and the
    /// engine. As long as we remember to update the `API_VERSION`
    /// value when making API changes, this method will return `false`
    /// when the two disagree.
    pub fn check_version(&self) -> bool {
        self.api_version == API_VERSION
    }
}

/// The reply to an [`MrmCmdIoctl`]: either the postcard-encoded
/// response body or the error which ended the command.
pub type MrmCmdResp = Result<Vec<u8>, MrmError>;

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize, thiserror::Error)]
pub enum MrmError {
    #[error("API version mismatch: user {user}, engine {kernel}")]
    BadApiVersion { user: u64, kernel: u64 },

    #[error("failed to deserialize request: {0}")]
    DeserCmdReq(String),

    #[error("in use: {0}")]
    InUse(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A remap request named a filter which does not exist.
    #[error("no such filter: {0}")]
    InvalidFilter(String),

    /// A remap request named an interface which could not be
    /// resolved.
    #[error("no such interface: {0}")]
    InvalidInterface(String),

    /// The command expects a request body but `req` was empty.
    #[error("missing request body")]
    NoRequestBody,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("out of resources: {0}")]
    OutOfResources(String),

    #[error("failed to serialize response: {0}")]
    SerCmdResp(String),
}

impl MrmError {
    /// Convert to an errno value.
    pub fn to_errno(&self) -> i32 {
        use libc::*;

        match self {
            Self::BadApiVersion { .. } => EPROTO,
            Self::DeserCmdReq(_) => ENOMSG,
            Self::InUse(_) => EADDRINUSE,
            Self::InvalidArgument(_) => EINVAL,
            Self::InvalidFilter(_) => EINVAL,
            Self::InvalidInterface(_) => EINVAL,
            Self::NoRequestBody => EINVAL,
            Self::NotFound(_) => ENOENT,
            Self::OutOfResources(_) => ENOMEM,
            Self::SerCmdResp(_) => ENOMSG,
        }
    }
}

/// A marker trait indicating a success response type that is returned
/// from a command and may be passed across the control boundary.
pub trait CmdOk: Debug + Serialize {}

impl CmdOk for () {}

/// Indicates no meaningful response value on success.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct NoResp {
    pub unused: u64,
}

impl CmdOk for NoResp {}

#[derive(Debug, Deserialize, Serialize)]
pub struct CountResp {
    pub count: u32,
}

impl CmdOk for CountResp {}

#[derive(Debug, Deserialize, Serialize)]
pub struct GetFilterReq {
    pub name: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SetFilterReq {
    pub config: FilterConfig,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct DeleteFilterReq {
    pub name: String,
}

/// The rule indices of one family's acceleration buckets, in
/// bucket order.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct BucketDump {
    pub tcp: Vec<u8>,
    pub udp: Vec<u8>,
    pub other: Vec<u8>,
}

/// The response to a [`GetFilterReq`].
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct FilterDump {
    pub name: String,
    /// The number of remap entries bound to this filter.
    pub refcnt: u32,
    pub rules: Vec<FilterRule>,
    pub ip4: BucketDump,
    pub ip6: BucketDump,
}

impl CmdOk for FilterDump {}

/// The response to a [`GetRemapReq`](super::GetRemapReq).
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct RemapDump {
    pub match_mac: MacAddr,
    pub filter: String,
    /// Interface names are those of the resolved handles.
    pub replacements: Vec<Replacement>,
}

impl CmdOk for RemapDump {}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct DumpRunConfResp {
    pub filters: Vec<FilterDump>,
    pub remaps: Vec<RemapDump>,
}

impl CmdOk for DumpRunConfResp {}
