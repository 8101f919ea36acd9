// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! lanbus-pub - publish one JSON message
//!
//! The topic is advertised under its `$crc` alias (or its plain name with
//! `--plain`), the node spins for a discovery window so subscribers can
//! connect, then the message is published once.

use clap::Parser;
use colored::*;
use lanbus::{topic_hash_name, Node, NodeConfig};
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

/// Publish a JSON message on a lanbus topic
#[derive(Parser, Debug)]
#[command(name = "lanbus-pub")]
#[command(version)]
#[command(about = "Publish one JSON message on a lanbus topic")]
struct Args {
    /// Topic name
    topic: String,

    /// Message body, must be valid JSON
    json: String,

    /// Publish on the plain topic name instead of its `$crc` alias
    #[arg(long)]
    plain: bool,

    /// Time to wait for subscribers before publishing, in milliseconds
    #[arg(short, long, default_value = "1000")]
    wait: u64,

    /// Discovery UDP port
    #[arg(long)]
    discovery_port: Option<u16>,

    /// Local IPv4 address to announce
    #[arg(short, long)]
    interface: Option<Ipv4Addr>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    if let Err(e) = run_publish(&args) {
        eprintln!("{}: {}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_millis()
        .init();
}

fn run_publish(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    serde_json::from_str::<serde_json::Value>(&args.json)
        .map_err(|e| format!("invalid json \"{}\": {}", args.json, e))?;

    let mut config = NodeConfig::from_env();
    if let Some(port) = args.discovery_port {
        config.discovery_port = port;
    }
    if args.interface.is_some() {
        config.interface = args.interface;
    }

    let mut node = Node::new(config);
    node.init()?;

    let topic = if args.plain {
        args.topic.clone()
    } else {
        topic_hash_name(&args.topic)
    };
    node.advertise(&topic)?;

    let deadline = Instant::now() + Duration::from_millis(args.wait);
    while Instant::now() < deadline {
        node.spin_once(Duration::from_millis(10))?;
    }

    node.publish(&topic, args.json.as_bytes())?;
    // let the data plane drain to connected subscribers
    for _ in 0..10 {
        node.spin_once(Duration::from_millis(10))?;
    }

    eprintln!(
        "{} {} {}",
        ">>>".green().bold(),
        "Published on".bold(),
        topic.cyan()
    );
    Ok(())
}
