// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

use std::io::Write;
use std::net::IpAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use clap::Parser;
use clap::Subcommand;
use tabwriter::TabWriter;

use mrm::engine::frame::EthFrame;
use mrm::engine::frame::Frame;
use mrm::engine::frame::Transport;
use mrm::print::print_filter_into;
use mrm::print::print_remap_into;
use mrm::print::print_runconf;
use mrm_api::API_VERSION;
use mrm_api::FilterRule;
use mrm_api::MacAddr;
use mrmadm::MrmAdm;
use mrmadm::config::Config;

/// Administer the MAC Address Re-Mapper (MRM)
#[derive(Debug, Parser)]
#[command(version)]
struct Cli {
    /// The configuration file to load.
    #[arg(short, long, global = true, default_value = "/etc/mrm.toml")]
    config: PathBuf,

    /// Log more; may be repeated.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Load the configuration and print the running configuration.
    Show {
        /// Print only the named filter.
        #[arg(long)]
        filter: Option<String>,

        /// Print only the remap entry for this MAC.
        #[arg(long, conflicts_with = "filter")]
        remap: Option<MacAddr>,
    },

    /// Load the configuration and report whether it is valid.
    Check,

    /// Load the configuration and run a synthetic frame through the
    /// remap path.
    Trace(TraceArgs),

    /// Print the canonical form of a filter rule.
    ParseRule {
        /// `key=value` tokens, e.g. `proto=tcp dstport=443`.
        #[arg(required = true)]
        tokens: Vec<String>,
    },

    /// Print the API version.
    ApiVersion,
}

#[derive(Debug, Args)]
struct TraceArgs {
    /// The frame's destination MAC.
    #[arg(long)]
    dst_mac: MacAddr,

    #[arg(long, default_value = "10.0.0.2")]
    src_ip: IpAddr,

    #[arg(long, default_value = "10.0.0.1")]
    dst_ip: IpAddr,

    /// tcp, udp, or an IP protocol number.
    #[arg(long, default_value = "tcp", value_parser = parse_transport)]
    proto: Transport,

    #[arg(long, default_value_t = 40000)]
    src_port: u16,

    #[arg(long, default_value_t = 80)]
    dst_port: u16,

    /// Payload bytes following the transport header.
    #[arg(long, default_value_t = 0)]
    len: usize,

    /// How many copies of the frame to send.
    #[arg(long, default_value_t = 1)]
    count: u32,
}

fn parse_transport(s: &str) -> Result<Transport, String> {
    match s.to_ascii_lowercase().as_str() {
        "tcp" => Ok(Transport::Tcp),
        "udp" => Ok(Transport::Udp),
        other => other
            .parse::<u8>()
            .map(Transport::from)
            .map_err(|_| format!("bad protocol: {s}")),
    }
}

fn load(cli: &Cli, log: slog::Logger) -> anyhow::Result<MrmAdm> {
    let config = Config::from_file(&cli.config)?;
    MrmAdm::from_config(log, &config)
        .with_context(|| format!("failed to apply {}", cli.config.display()))
}

fn trace(adm: &MrmAdm, args: &TraceArgs) -> anyhow::Result<()> {
    let mut t = TabWriter::new(std::io::stdout());
    writeln!(t, "N\tRESULT\tDST MAC\tEGRESS")?;

    for n in 0..args.count {
        let mut frame = EthFrame::new_ip(
            args.dst_mac,
            args.src_ip,
            args.dst_ip,
            args.proto,
            args.src_port,
            args.dst_port,
            args.len,
        );
        let res = adm.trace(&mut frame);
        let egress = frame.egress().map(|d| d.name()).unwrap_or("-");
        writeln!(t, "{n}\t{res}\t{}\t{egress}", frame.dst_mac())?;
    }

    t.flush()?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let log = mrmadm::log::logger(cli.verbose);

    match &cli.cmd {
        Command::Show { filter: Some(name), .. } => {
            let adm = load(&cli, log)?;
            print_filter_into(&mut std::io::stdout(), &adm.get_filter(name)?)?;
        }

        Command::Show { remap: Some(mac), .. } => {
            let adm = load(&cli, log)?;
            print_remap_into(&mut std::io::stdout(), &adm.get_remap(*mac)?)?;
        }

        Command::Show { .. } => {
            let adm = load(&cli, log)?;
            print_runconf(&adm.dump_runconf()?)?;
        }

        Command::Check => {
            let adm = load(&cli, log)?;
            println!(
                "{}: ok, {} filters, {} remaps",
                cli.config.display(),
                adm.filter_count()?,
                adm.remap_count()?
            );
        }

        Command::Trace(args) => {
            let adm = load(&cli, log)?;
            trace(&adm, args)?;
        }

        Command::ParseRule { tokens } => {
            let rule: FilterRule =
                tokens.join(" ").parse().map_err(anyhow::Error::msg)?;
            rule.validate().map_err(anyhow::Error::msg)?;
            println!("{rule}");
        }

        Command::ApiVersion => {
            println!("{API_VERSION}");
        }
    }

    Ok(())
}
