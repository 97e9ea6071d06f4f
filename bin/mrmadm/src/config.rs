// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! The mrmadm configuration file.
//!
//! ```toml
//! [engine]
//! classify_ipv6 = false
//!
//! [[interface]]
//! name = "eth1"
//! index = 2
//!
//! [[filter]]
//! name = "web"
//! rules = ["family=ipv4 proto=family,tcp dstport=443"]
//!
//! [[remap]]
//! match_mac = "aa:bb:cc:dd:ee:ff"
//! filter = "web"
//! replacements = [{ mac = "11:22:33:44:55:66", ifname = "eth1" }]
//! ```

use anyhow::Context;
use anyhow::anyhow;
use mrm::engine::rcdb::DbCfg;
use mrm_api::FilterConfig;
use mrm_api::FilterRule;
use mrm_api::MacAddr;
use mrm_api::Replacement;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineCfg,

    #[serde(default, rename = "interface")]
    pub interfaces: Vec<InterfaceCfg>,

    #[serde(default, rename = "filter")]
    pub filters: Vec<FilterCfg>,

    #[serde(default, rename = "remap")]
    pub remaps: Vec<RemapCfg>,
}

impl Config {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::parse(&text)
            .with_context(|| format!("failed to load {}", path.display()))
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }
}

/// Database limits, see [`DbCfg`].
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineCfg {
    pub max_filters: usize,
    pub max_remaps: usize,
    pub classify_ipv6: bool,
}

impl Default for EngineCfg {
    fn default() -> Self {
        let cfg = DbCfg::default();
        Self {
            max_filters: cfg.max_filters,
            max_remaps: cfg.max_remaps,
            classify_ipv6: cfg.classify_ipv6,
        }
    }
}

impl From<&EngineCfg> for DbCfg {
    fn from(cfg: &EngineCfg) -> Self {
        DbCfg {
            max_filters: cfg.max_filters,
            max_remaps: cfg.max_remaps,
            classify_ipv6: cfg.classify_ipv6,
        }
    }
}

/// An interface remap targets may name.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InterfaceCfg {
    pub name: String,
    pub index: u32,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterCfg {
    pub name: String,
    #[serde(default)]
    pub rules: Vec<String>,
}

impl FilterCfg {
    pub fn to_config(&self) -> anyhow::Result<FilterConfig> {
        let rules = self
            .rules
            .iter()
            .enumerate()
            .map(|(i, s)| {
                s.parse::<FilterRule>()
                    .map_err(|e| anyhow!("filter {} rule {i}: {e}", self.name))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        let config = FilterConfig::new(self.name.clone(), rules);
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RemapCfg {
    pub match_mac: String,
    pub filter: String,
    pub replacements: Vec<ReplacementCfg>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReplacementCfg {
    pub mac: String,
    pub ifname: Option<String>,
}

fn parse_mac(s: &str) -> anyhow::Result<MacAddr> {
    s.parse().map_err(|e| anyhow!("bad MAC address {s:?}: {e}"))
}

impl RemapCfg {
    pub fn match_mac(&self) -> anyhow::Result<MacAddr> {
        parse_mac(&self.match_mac)
    }

    pub fn replacements(&self) -> anyhow::Result<Vec<Replacement>> {
        self.replacements
            .iter()
            .map(|r| {
                Ok(Replacement {
                    mac: parse_mac(&r.mac)?,
                    ifname: r.ifname.clone(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use mrm_api::MAX_REMAPS;
    use mrm_api::PortMatch;

    const FULL: &str = r#"
        [engine]
        classify_ipv6 = true
        max_remaps = 10

        [[interface]]
        name = "eth1"
        index = 2

        [[filter]]
        name = "web"
        rules = [
            "family=ipv4 proto=family,tcp dstport=443",
            "srcip=10.0.0.0/8",
        ]

        [[filter]]
        name = "empty"

        [[remap]]
        match_mac = "aa:bb:cc:dd:ee:ff"
        filter = "web"
        replacements = [
            { mac = "11:22:33:44:55:66", ifname = "eth1" },
            { mac = "11:22:33:44:55:77" },
        ]
    "#;

    #[test]
    fn parse_full() {
        let cfg = Config::parse(FULL).unwrap();
        let db = DbCfg::from(&cfg.engine);
        assert!(db.classify_ipv6);
        assert_eq!(db.max_remaps, 10);
        assert_eq!(cfg.interfaces[0].name, "eth1");

        let web = cfg.filters[0].to_config().unwrap();
        assert_eq!(web.rules.len(), 2);
        assert_eq!(web.rules[0].dst_port, PortMatch::Single(443));
        assert!(cfg.filters[1].to_config().unwrap().rules.is_empty());

        let remap = &cfg.remaps[0];
        assert_eq!(remap.match_mac().unwrap().to_string(), "AA:BB:CC:DD:EE:FF");
        let reps = remap.replacements().unwrap();
        assert_eq!(reps[0].ifname.as_deref(), Some("eth1"));
        assert_eq!(reps[1].ifname, None);
    }

    #[test]
    fn defaults() {
        let cfg = Config::parse("").unwrap();
        assert!(!cfg.engine.classify_ipv6);
        assert_eq!(cfg.engine.max_remaps, MAX_REMAPS);
        assert!(cfg.filters.is_empty());
        assert!(cfg.remaps.is_empty());
    }

    #[test]
    fn rejects_unknown_keys() {
        assert!(Config::parse("[engine]\nbogus = 1\n").is_err());
        let text = "[[filter]]\nname = \"a\"\nrule = []\n";
        assert!(Config::parse(text).is_err());
    }

    #[test]
    fn bad_rule() {
        let cfg = Config::parse(
            "[[filter]]\nname = \"bad\"\nrules = [\"dstport=99-1\"]\n",
        )
        .unwrap();
        let err = cfg.filters[0].to_config().unwrap_err();
        assert!(err.to_string().contains("filter bad rule 0"), "{err}");
    }

    #[test]
    fn bad_mac() {
        let cfg = Config::parse(concat!(
            "[[remap]]\n",
            "match_mac = \"aa:bb\"\n",
            "filter = \"x\"\n",
            "replacements = []\n",
        ))
        .unwrap();
        assert!(cfg.remaps[0].match_mac().is_err());
    }
}
