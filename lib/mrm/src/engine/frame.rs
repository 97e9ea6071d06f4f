// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Frames and the packet descriptor the classifier works from.

use crate::ddi::dev::NetDev;
use mrm_api::IpFamily;
use mrm_api::MacAddr;
use std::mem;
use std::net::IpAddr;
use std::net::Ipv4Addr;
use std::net::Ipv6Addr;
use zerocopy::FromBytes;
use zerocopy::Immutable;
use zerocopy::IntoBytes;
use zerocopy::KnownLayout;
use zerocopy::Unaligned;
use zerocopy::network_endian::U16;

pub const ETHER_TYPE_IPV4: u16 = 0x0800;
pub const ETHER_TYPE_IPV6: u16 = 0x86DD;

pub const IP_PROTO_TCP: u8 = 6;
pub const IP_PROTO_UDP: u8 = 17;

#[repr(C)]
#[derive(
    Clone, Debug, FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned,
)]
pub struct EtherHdrRaw {
    pub dst: [u8; 6],
    pub src: [u8; 6],
    pub ether_type: U16,
}

impl EtherHdrRaw {
    pub const SIZE: usize = mem::size_of::<Self>();
}

#[repr(C)]
#[derive(
    Clone, Debug, FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned,
)]
pub struct Ipv4HdrRaw {
    pub ver_hdr_len: u8,
    pub dscp_ecn: u8,
    pub total_len: U16,
    pub ident: U16,
    pub frag_and_flags: U16,
    pub ttl: u8,
    pub proto: u8,
    pub csum: [u8; 2],
    pub src: [u8; 4],
    pub dst: [u8; 4],
}

impl Ipv4HdrRaw {
    pub const SIZE: usize = mem::size_of::<Self>();

    /// The header length in bytes, from the IHL field.
    pub fn hdr_len(&self) -> usize {
        usize::from(self.ver_hdr_len & 0x0F) * 4
    }
}

#[repr(C)]
#[derive(
    Clone, Debug, FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned,
)]
pub struct Ipv6HdrRaw {
    pub vsn_class_flow: [u8; 4],
    pub payload_len: U16,
    pub next_hdr: u8,
    pub hop_limit: u8,
    pub src: [u8; 16],
    pub dst: [u8; 16],
}

impl Ipv6HdrRaw {
    pub const SIZE: usize = mem::size_of::<Self>();
}

/// The source and destination ports, which lead both the TCP and
/// UDP headers.
#[repr(C)]
#[derive(
    Clone, Debug, FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned,
)]
pub struct UlpPortsRaw {
    pub src_port: U16,
    pub dst_port: U16,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Transport {
    Tcp,
    Udp,
    Other(u8),
}

impl From<u8> for Transport {
    fn from(proto: u8) -> Self {
        match proto {
            IP_PROTO_TCP => Self::Tcp,
            IP_PROTO_UDP => Self::Udp,
            p => Self::Other(p),
        }
    }
}

impl From<Transport> for u8 {
    fn from(t: Transport) -> Self {
        match t {
            Transport::Tcp => IP_PROTO_TCP,
            Transport::Udp => IP_PROTO_UDP,
            Transport::Other(p) => p,
        }
    }
}

/// What the classifier needs to know about a frame.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PacketDesc {
    pub family: IpFamily,
    pub transport: Transport,
    pub src_ip: IpAddr,
    /// Zero unless the transport is TCP or UDP.
    pub src_port: u16,
    /// Zero unless the transport is TCP or UDP.
    pub dst_port: u16,
    /// Compared against a rule's `payload_size`.
    pub len: usize,
}

fn ulp_ports(transport: Transport, ulp: &[u8]) -> Option<(u16, u16)> {
    match transport {
        Transport::Tcp | Transport::Udp => {
            let (ports, _) = UlpPortsRaw::ref_from_prefix(ulp).ok()?;
            Some((ports.src_port.get(), ports.dst_port.get()))
        }

        Transport::Other(_) => Some((0, 0)),
    }
}

impl PacketDesc {
    /// Describe an IPv4 packet. Returns `None` when the header is
    /// malformed or too short to read the transport ports.
    pub fn parse_ipv4(l3: &[u8], len: usize) -> Option<Self> {
        let (ip, _) = Ipv4HdrRaw::ref_from_prefix(l3).ok()?;
        let hdr_len = ip.hdr_len();
        if hdr_len < Ipv4HdrRaw::SIZE {
            return None;
        }

        let transport = Transport::from(ip.proto);
        let (src_port, dst_port) = ulp_ports(transport, l3.get(hdr_len..)?)?;

        Some(Self {
            family: IpFamily::Ipv4,
            transport,
            src_ip: IpAddr::V4(Ipv4Addr::from(ip.src)),
            src_port,
            dst_port,
            len,
        })
    }

    /// Describe an IPv6 packet. Only the fixed header is consulted:
    /// a packet carrying extension headers is classified as "other".
    pub fn parse_ipv6(l3: &[u8], len: usize) -> Option<Self> {
        let (ip, ulp) = Ipv6HdrRaw::ref_from_prefix(l3).ok()?;
        let transport = Transport::from(ip.next_hdr);
        let (src_port, dst_port) = ulp_ports(transport, ulp)?;

        Some(Self {
            family: IpFamily::Ipv6,
            transport,
            src_ip: IpAddr::V6(Ipv6Addr::from(ip.src)),
            src_port,
            dst_port,
            len,
        })
    }
}

/// A frame handed to the remap engine by the packet hook.
pub trait Frame {
    fn dst_mac(&self) -> MacAddr;

    fn set_dst_mac(&mut self, mac: MacAddr);

    fn ether_type(&self) -> u16;

    /// The bytes following the Ethernet header.
    fn l3(&self) -> &[u8];

    /// The frame length as seen at the hook, which starts at the
    /// network header.
    fn len(&self) -> usize {
        self.l3().len()
    }

    /// Send the frame out `dev` instead of its current interface.
    fn set_egress(&mut self, dev: &NetDev);
}

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum FrameError {
    #[error("frame too short for Ethernet header: {0} bytes")]
    Truncated(usize),
}

/// An owned Ethernet frame.
#[derive(Clone, Debug)]
pub struct EthFrame {
    eth: EtherHdrRaw,
    body: Vec<u8>,
    egress: Option<NetDev>,
}

impl EthFrame {
    pub fn parse(bytes: &[u8]) -> Result<Self, FrameError> {
        let (eth, body) = EtherHdrRaw::read_from_prefix(bytes)
            .map_err(|_| FrameError::Truncated(bytes.len()))?;
        Ok(Self { eth, body: body.to_vec(), egress: None })
    }

    pub fn new(
        dst: MacAddr,
        src: MacAddr,
        ether_type: u16,
        body: Vec<u8>,
    ) -> Self {
        let eth = EtherHdrRaw {
            dst: dst.bytes(),
            src: src.bytes(),
            ether_type: U16::new(ether_type),
        };
        Self { eth, body, egress: None }
    }

    /// Build an IP frame with a zeroed payload of `payload_len` bytes
    /// following the transport header. The transport header is 20
    /// bytes for TCP, 8 for UDP, and absent otherwise.
    pub fn new_ip(
        dst: MacAddr,
        src_ip: IpAddr,
        dst_ip: IpAddr,
        transport: Transport,
        src_port: u16,
        dst_port: u16,
        payload_len: usize,
    ) -> Self {
        let ulp_len = match transport {
            Transport::Tcp => 20,
            Transport::Udp => 8,
            Transport::Other(_) => 0,
        };

        let mut ulp = vec![0u8; ulp_len + payload_len];
        if ulp_len > 0 {
            let ports = UlpPortsRaw {
                src_port: U16::new(src_port),
                dst_port: U16::new(dst_port),
            };
            ulp[..4].copy_from_slice(ports.as_bytes());
        }

        let (ether_type, mut body) = match (src_ip, dst_ip) {
            (IpAddr::V4(src), IpAddr::V4(dst)) => {
                let total = u16::try_from(Ipv4HdrRaw::SIZE + ulp.len())
                    .unwrap_or(u16::MAX);
                let ip = Ipv4HdrRaw {
                    ver_hdr_len: 0x45,
                    dscp_ecn: 0,
                    total_len: U16::new(total),
                    ident: U16::new(0),
                    frag_and_flags: U16::new(0),
                    ttl: 64,
                    proto: transport.into(),
                    csum: [0; 2],
                    src: src.octets(),
                    dst: dst.octets(),
                };
                (ETHER_TYPE_IPV4, ip.as_bytes().to_vec())
            }

            (src, dst) => {
                let to6 = |ip: IpAddr| match ip {
                    IpAddr::V4(ip4) => ip4.to_ipv6_mapped(),
                    IpAddr::V6(ip6) => ip6,
                };
                let ip = Ipv6HdrRaw {
                    vsn_class_flow: [0x60, 0, 0, 0],
                    payload_len: U16::new(
                        u16::try_from(ulp.len()).unwrap_or(u16::MAX),
                    ),
                    next_hdr: transport.into(),
                    hop_limit: 64,
                    src: to6(src).octets(),
                    dst: to6(dst).octets(),
                };
                (ETHER_TYPE_IPV6, ip.as_bytes().to_vec())
            }
        };

        body.extend_from_slice(&ulp);
        Self::new(dst, MacAddr::ZERO, ether_type, body)
    }

    pub fn egress(&self) -> Option<&NetDev> {
        self.egress.as_ref()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = self.eth.as_bytes().to_vec();
        bytes.extend_from_slice(&self.body);
        bytes
    }
}

impl Frame for EthFrame {
    fn dst_mac(&self) -> MacAddr {
        MacAddr::from(self.eth.dst)
    }

    fn set_dst_mac(&mut self, mac: MacAddr) {
        self.eth.dst = mac.bytes();
    }

    fn ether_type(&self) -> u16 {
        self.eth.ether_type.get()
    }

    fn l3(&self) -> &[u8] {
        &self.body
    }

    fn set_egress(&mut self, dev: &NetDev) {
        self.egress = Some(dev.clone());
    }
}
