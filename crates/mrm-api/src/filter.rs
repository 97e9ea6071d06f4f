// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! The filter rule model.

use super::FILTER_MAX_RULES;
use super::MrmError;
use super::validate_filter_name;
use bitflags::bitflags;
use serde::Deserialize;
use serde::Serialize;
use std::fmt;
use std::fmt::Display;
use std::net::IpAddr;
use std::net::Ipv4Addr;
use std::net::Ipv6Addr;
use std::str::FromStr;

#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize,
)]
pub enum IpFamily {
    #[default]
    Ipv4,
    Ipv6,
}

impl IpFamily {
    pub fn of(ip: &IpAddr) -> Self {
        match ip {
            IpAddr::V4(_) => Self::Ipv4,
            IpAddr::V6(_) => Self::Ipv6,
        }
    }
}

impl FromStr for IpFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ipv4" | "inet" | "4" => Ok(Self::Ipv4),
            "ipv6" | "inet6" | "6" => Ok(Self::Ipv6),
            _ => Err(format!("invalid address family: {s}")),
        }
    }
}

impl Display for IpFamily {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Self::Ipv4 => "ipv4",
            Self::Ipv6 => "ipv6",
        };
        write!(f, "{s}")
    }
}

bitflags! {
/// The protocol constraint of a [`FilterRule`]. The empty set means
/// any protocol of any family.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize,
)]
#[serde(transparent)]
pub struct ProtoMatch: u8 {
    /// The frame's address family must equal the rule's family.
    const FAMILY = 1;
    const UDP = 2;
    const TCP = 4;
}
}

impl ProtoMatch {
    pub const ANY: Self = Self::empty();

    /// No transport protocol constraint, ignoring the family bit.
    pub fn is_any_proto(&self) -> bool {
        self.difference(Self::FAMILY).is_empty()
    }
}

impl FromStr for ProtoMatch {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut proto = Self::ANY;

        for tok in s.to_ascii_lowercase().split(',') {
            match tok {
                "any" => (),
                "family" => proto |= Self::FAMILY,
                "tcp" => proto |= Self::TCP,
                "udp" => proto |= Self::UDP,
                _ => return Err(format!("invalid protocol: {tok}")),
            }
        }

        Ok(proto)
    }
}

impl Display for ProtoMatch {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "any");
        }

        let mut names = Vec::with_capacity(3);
        if self.contains(Self::FAMILY) {
            names.push("family");
        }
        if self.contains(Self::TCP) {
            names.push("tcp");
        }
        if self.contains(Self::UDP) {
            names.push("udp");
        }
        if names.len() == 1 && self.contains(Self::FAMILY) {
            names.push("any");
        }

        write!(f, "{}", names.join(","))
    }
}

/// Widen an address for numeric comparison. Both families compare
/// in host order; an IPv4 address occupies the low 32 bits.
fn ip_bits(ip: &IpAddr) -> u128 {
    match ip {
        IpAddr::V4(ip4) => u128::from(u32::from(*ip4)),
        IpAddr::V6(ip6) => u128::from(*ip6),
    }
}

/// A source address constraint.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub enum IpMatch {
    #[default]
    Any,
    Single(IpAddr),
    /// Passes when `src & mask == addr`. The address is not
    /// pre-masked, so a subnet written with host bits set never
    /// matches.
    Subnet {
        addr: IpAddr,
        mask: IpAddr,
    },
    /// Inclusive on both ends.
    Range {
        start: IpAddr,
        end: IpAddr,
    },
}

impl IpMatch {
    pub fn is_any(&self) -> bool {
        matches!(self, Self::Any)
    }

    /// The family of the addresses in this match, `None` for `Any`.
    pub fn family(&self) -> Option<IpFamily> {
        match self {
            Self::Any => None,
            Self::Single(ip) => Some(IpFamily::of(ip)),
            Self::Subnet { addr, .. } => Some(IpFamily::of(addr)),
            Self::Range { start, .. } => Some(IpFamily::of(start)),
        }
    }

    /// Does `src` satisfy this constraint? An address of the other
    /// family never does.
    pub fn matches(&self, src: IpAddr) -> bool {
        let same = |ip: &IpAddr| IpFamily::of(ip) == IpFamily::of(&src);
        let s = ip_bits(&src);

        match self {
            Self::Any => true,
            Self::Single(ip) => *ip == src,
            Self::Subnet { addr, mask } => {
                same(addr) && (s & ip_bits(mask)) == ip_bits(addr)
            }
            Self::Range { start, end } => {
                same(start) && ip_bits(start) <= s && s <= ip_bits(end)
            }
        }
    }

    fn validate(&self) -> Result<(), String> {
        match self {
            Self::Any | Self::Single(_) => Ok(()),
            Self::Subnet { addr, mask } => {
                if IpFamily::of(addr) != IpFamily::of(mask) {
                    return Err(format!("mixed families: {self}"));
                }
                Ok(())
            }
            Self::Range { start, end } => {
                if IpFamily::of(start) != IpFamily::of(end) {
                    return Err(format!("mixed families: {self}"));
                }
                if ip_bits(start) > ip_bits(end) {
                    return Err(format!("inverted range: {self}"));
                }
                Ok(())
            }
        }
    }
}

fn prefix_mask(ip: &IpAddr, len: u8) -> Result<IpAddr, String> {
    match ip {
        IpAddr::V4(_) if len <= 32 => {
            let bits = u32::MAX.checked_shl(32 - u32::from(len)).unwrap_or(0);
            Ok(IpAddr::V4(Ipv4Addr::from(bits)))
        }
        IpAddr::V6(_) if len <= 128 => {
            let bits = u128::MAX.checked_shl(128 - u32::from(len)).unwrap_or(0);
            Ok(IpAddr::V6(Ipv6Addr::from(bits)))
        }
        _ => Err(format!("bad prefix length: {len}")),
    }
}

impl FromStr for IpMatch {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse_ip = |v: &str| {
            v.parse::<IpAddr>().map_err(|e| format!("bad IP {v}: {e}"))
        };

        if s.eq_ignore_ascii_case("any") {
            return Ok(Self::Any);
        }

        if let Some((lhs, rhs)) = s.split_once('-') {
            return Ok(Self::Range {
                start: parse_ip(lhs)?,
                end: parse_ip(rhs)?,
            });
        }

        if let Some((lhs, rhs)) = s.split_once('/') {
            let addr = parse_ip(lhs)?;
            let mask = match rhs.parse::<u8>() {
                Ok(len) => prefix_mask(&addr, len)?,
                Err(_) => parse_ip(rhs)?,
            };
            return Ok(Self::Subnet { addr, mask });
        }

        Ok(Self::Single(parse_ip(s)?))
    }
}

impl Display for IpMatch {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Any => write!(f, "any"),
            Self::Single(ip) => write!(f, "{ip}"),
            Self::Subnet { addr, mask } => write!(f, "{addr}/{mask}"),
            Self::Range { start, end } => write!(f, "{start}-{end}"),
        }
    }
}

/// A transport port constraint.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub enum PortMatch {
    #[default]
    Any,
    Single(u16),
    /// Inclusive on both ends.
    Range(u16, u16),
}

impl PortMatch {
    pub fn is_any(&self) -> bool {
        matches!(self, Self::Any)
    }

    pub fn matches(&self, port: u16) -> bool {
        match self {
            Self::Any => true,
            Self::Single(p) => *p == port,
            Self::Range(lo, hi) => *lo <= port && port <= *hi,
        }
    }
}

impl FromStr for PortMatch {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse_port = |v: &str| {
            v.parse::<u16>().map_err(|e| format!("bad port '{v}': {e}"))
        };

        if s.eq_ignore_ascii_case("any") {
            return Ok(Self::Any);
        }

        match s.split_once('-') {
            Some((lo, hi)) => Ok(Self::Range(parse_port(lo)?, parse_port(hi)?)),
            None => Ok(Self::Single(parse_port(s)?)),
        }
    }
}

impl Display for PortMatch {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Any => write!(f, "any"),
            Self::Single(p) => write!(f, "{p}"),
            Self::Range(lo, hi) => write!(f, "{lo}-{hi}"),
        }
    }
}

/// One match clause of a filter.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct FilterRule {
    /// Minimum frame length to trigger; 0 matches any length.
    pub payload_size: u32,
    pub family: IpFamily,
    pub proto: ProtoMatch,
    pub src_ip: IpMatch,
    pub src_port: PortMatch,
    pub dst_port: PortMatch,
}

impl FilterRule {
    pub fn validate(&self) -> Result<(), String> {
        self.src_ip.validate()?;

        if let Some(af) = self.src_ip.family() {
            if af != self.family {
                return Err(format!(
                    "srcip {} is not {}",
                    self.src_ip, self.family
                ));
            }
        }

        for pm in [&self.src_port, &self.dst_port] {
            if let PortMatch::Range(lo, hi) = pm {
                if lo > hi {
                    return Err(format!("inverted port range: {pm}"));
                }
            }
        }

        Ok(())
    }
}

impl FromStr for FilterRule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut rule = FilterRule::default();
        let mut family = None;

        for token in s.split_whitespace() {
            match token.split_once('=') {
                None => {
                    return Err(format!("bad token: {token}"));
                }

                Some(("payload_size", val)) => {
                    rule.payload_size = val.parse::<u32>().map_err(|e| {
                        format!("bad payload_size: '{val}' {e}")
                    })?;
                }

                Some(("family", val)) => family = Some(val.parse()?),
                Some(("proto", val)) => rule.proto = val.parse()?,
                Some(("srcip", val)) => rule.src_ip = val.parse()?,
                Some(("srcport", val)) => rule.src_port = val.parse()?,
                Some(("dstport", val)) => rule.dst_port = val.parse()?,

                Some((key, _)) => {
                    return Err(format!("invalid key: {key}"));
                }
            }
        }

        rule.family = family.or(rule.src_ip.family()).unwrap_or_default();
        Ok(rule)
    }
}

impl Display for FilterRule {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "payload_size={} family={} proto={} srcip={} srcport={} dstport={}",
            self.payload_size,
            self.family,
            self.proto,
            self.src_ip,
            self.src_port,
            self.dst_port,
        )
    }
}

/// A named, ordered list of rules. Order is significant: the first
/// matching rule wins.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct FilterConfig {
    pub name: String,
    pub rules: Vec<FilterRule>,
}

impl FilterConfig {
    pub fn new(name: impl Into<String>, rules: Vec<FilterRule>) -> Self {
        Self { name: name.into(), rules }
    }

    pub fn validate(&self) -> Result<(), MrmError> {
        validate_filter_name(&self.name)?;

        if self.rules.len() > FILTER_MAX_RULES {
            return Err(MrmError::InvalidArgument(format!(
                "filter {} has {} rules, max is {FILTER_MAX_RULES}",
                self.name,
                self.rules.len()
            )));
        }

        for (i, rule) in self.rules.iter().enumerate() {
            rule.validate().map_err(|e| {
                MrmError::InvalidArgument(format!(
                    "filter {} rule {i}: {e}",
                    self.name
                ))
            })?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn parse_rule_defaults() {
        let rule: FilterRule = "dstport=443".parse().unwrap();
        assert_eq!(
            rule,
            FilterRule {
                dst_port: PortMatch::Single(443),
                ..Default::default()
            }
        );
    }

    #[test]
    fn parse_rule_full() {
        let rule: FilterRule = "payload_size=64 family=ipv4 proto=family,tcp \
             srcip=10.0.0.0/24 srcport=1024-2048 dstport=any"
            .parse()
            .unwrap();
        assert_eq!(rule.payload_size, 64);
        assert_eq!(rule.proto, ProtoMatch::FAMILY | ProtoMatch::TCP);
        assert_eq!(
            rule.src_ip,
            IpMatch::Subnet { addr: ip("10.0.0.0"), mask: ip("255.255.255.0") }
        );
        assert_eq!(rule.src_port, PortMatch::Range(1024, 2048));
        assert_eq!(rule.dst_port, PortMatch::Any);

        let printed = rule.to_string();
        assert_eq!(
            printed,
            "payload_size=64 family=ipv4 proto=family,tcp \
             srcip=10.0.0.0/255.255.255.0 srcport=1024-2048 dstport=any"
        );
        assert_eq!(printed.parse::<FilterRule>().unwrap(), rule);
    }

    #[test]
    fn family_inferred_from_srcip() {
        let rule: FilterRule = "srcip=fd00::1-fd00::ff".parse().unwrap();
        assert_eq!(rule.family, IpFamily::Ipv6);
        assert!(rule.validate().is_ok());
    }

    #[test]
    fn parse_rule_bad() {
        assert!("dstport".parse::<FilterRule>().is_err());
        assert!("color=red".parse::<FilterRule>().is_err());
        assert!("proto=icmp".parse::<FilterRule>().is_err());
        assert!("srcport=70000".parse::<FilterRule>().is_err());
        assert!("srcip=10.0.0.0/33".parse::<FilterRule>().is_err());
    }

    #[test]
    fn proto_display() {
        assert_eq!(ProtoMatch::ANY.to_string(), "any");
        assert_eq!(ProtoMatch::FAMILY.to_string(), "family,any");
        assert_eq!(
            "family,any".parse::<ProtoMatch>().unwrap(),
            ProtoMatch::FAMILY
        );
        assert_eq!(
            (ProtoMatch::TCP | ProtoMatch::UDP).to_string(),
            "tcp,udp"
        );
        assert!(ProtoMatch::FAMILY.is_any_proto());
        assert!(!ProtoMatch::TCP.is_any_proto());
    }

    #[test]
    fn ip_match_v4() {
        let single = IpMatch::Single(ip("10.0.0.1"));
        assert!(single.matches(ip("10.0.0.1")));
        assert!(!single.matches(ip("10.0.0.2")));

        let subnet: IpMatch = "10.1.0.0/16".parse().unwrap();
        assert!(subnet.matches(ip("10.1.200.7")));
        assert!(!subnet.matches(ip("10.2.0.1")));
        assert!(!subnet.matches(ip("::a01:0")));

        // Numeric order, not wire order: 10.0.1.0 sorts after
        // 10.0.0.255 even though its last octet is smaller.
        let range: IpMatch = "10.0.0.200-10.0.1.10".parse().unwrap();
        assert!(range.matches(ip("10.0.0.255")));
        assert!(range.matches(ip("10.0.1.0")));
        assert!(range.matches(ip("10.0.1.10")));
        assert!(!range.matches(ip("10.0.1.11")));
        assert!(!range.matches(ip("10.0.0.199")));
    }

    #[test]
    fn ip_match_unmasked_subnet() {
        let m = IpMatch::Subnet { addr: ip("10.0.0.1"), mask: ip("255.0.0.0") };
        assert!(!m.matches(ip("10.0.0.1")));
    }

    #[test]
    fn ip_match_v6() {
        let range: IpMatch = "fd00::10-fd00::20".parse().unwrap();
        assert!(range.matches(ip("fd00::15")));
        assert!(!range.matches(ip("fd00::21")));
        assert!(!range.matches(ip("10.0.0.1")));

        let subnet: IpMatch = "fd00:1::/32".parse().unwrap();
        assert!(subnet.matches(ip("fd00:1::99")));
        assert!(!subnet.matches(ip("fd00:2::99")));
    }

    #[test]
    fn port_match() {
        assert!(PortMatch::Any.matches(9));
        assert!(PortMatch::Single(80).matches(80));
        assert!(!PortMatch::Single(80).matches(81));
        assert!(PortMatch::Range(80, 90).matches(80));
        assert!(PortMatch::Range(80, 90).matches(90));
        assert!(!PortMatch::Range(80, 90).matches(91));
    }

    #[test]
    fn validate_config() {
        let ok = FilterConfig::new("guest", vec![FilterRule::default()]);
        assert!(ok.validate().is_ok());

        let too_many = FilterConfig::new(
            "guest",
            vec![FilterRule::default(); FILTER_MAX_RULES + 1],
        );
        assert!(matches!(
            too_many.validate(),
            Err(MrmError::InvalidArgument(_))
        ));

        let wrong_family = FilterConfig::new(
            "guest",
            vec![FilterRule {
                family: IpFamily::Ipv6,
                src_ip: IpMatch::Single(ip("10.0.0.1")),
                ..Default::default()
            }],
        );
        assert!(wrong_family.validate().is_err());

        let inverted = FilterConfig::new(
            "guest",
            vec![FilterRule {
                dst_port: PortMatch::Range(90, 80),
                ..Default::default()
            }],
        );
        assert!(inverted.validate().is_err());

        let unnamed = FilterConfig::new("", vec![]);
        assert!(unnamed.validate().is_err());
    }
}
