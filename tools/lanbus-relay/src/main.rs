// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! lanbus-relay - bridge one serial peer onto the bus
//!
//! Records the peer sends are published under their own topic names; topics
//! the peer subscribes to are forwarded back to it.

use clap::Parser;
use colored::*;
use lanbus::{Node, NodeConfig};
use std::net::Ipv4Addr;
use std::thread;
use std::time::Duration;

/// Bridge a serial microcontroller onto the bus
#[derive(Parser, Debug)]
#[command(name = "lanbus-relay")]
#[command(version)]
#[command(about = "Bridge a serial peer onto the lanbus topic space")]
struct Args {
    /// Serial device
    #[arg(default_value = "/dev/ttyUSB0")]
    port: String,

    /// Baud rate
    #[arg(short, long, default_value = "115200")]
    baud: u32,

    /// Attempts to open the port before giving up
    #[arg(long, default_value = "10")]
    retries: u32,

    /// Delay between open attempts, in seconds
    #[arg(long, default_value = "5")]
    retry_delay: u64,

    /// Discovery UDP port
    #[arg(long)]
    discovery_port: Option<u16>,

    /// Local IPv4 address to announce
    #[arg(short, long)]
    interface: Option<Ipv4Addr>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);
    if args.no_color {
        colored::control::set_override(false);
    }

    if let Err(e) = run_relay(&args) {
        eprintln!("{}: {}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_millis()
        .init();
}

fn run_relay(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = NodeConfig::from_env();
    config.serial_baud = args.baud;
    if let Some(port) = args.discovery_port {
        config.discovery_port = port;
    }
    if args.interface.is_some() {
        config.interface = args.interface;
    }

    let mut node = Node::new(config);
    node.init()?;

    let stop = node.stop_handle();
    ctrlc::set_handler(move || stop.stop())?;

    let mut attempt = 0;
    let id = loop {
        attempt += 1;
        match node.open_serial(&args.port) {
            Ok(id) => break id,
            Err(e) if attempt < args.retries => {
                log::warn!(
                    "[relay] {} (attempt {}/{}), retrying in {}s",
                    e,
                    attempt,
                    args.retries,
                    args.retry_delay
                );
                thread::sleep(Duration::from_secs(args.retry_delay));
            }
            Err(e) => return Err(e.into()),
        }
    };

    eprintln!(
        "{} {} {} at {} baud",
        ">>>".green().bold(),
        "Relaying".bold(),
        args.port.cyan(),
        args.baud
    );
    eprintln!("{}", "Press Ctrl+C to stop".dimmed());

    node.spin()?;
    log::info!("[relay] stopping, detaching {}", args.port);

    if let Some(stats) = node.serial_stats(id) {
        eprintln!(
            "\n{} {} records, {} forwards ({} dropped), {} CRC errors, {} timeouts",
            "---".dimmed(),
            stats.records,
            stats.forwards,
            stats.forwards_dropped,
            stats.integrity_errors,
            stats.timeouts
        );
    }
    node.detach_serial(id)?;
    Ok(())
}
