// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! lanbus-echo - print topic messages as they arrive
//!
//! Subscribes to every topic given on the command line and to its `$crc`
//! alias, so messages from serial peers show up too.

use chrono::Local;
use clap::Parser;
use colored::*;
use lanbus::{topic_hash_name, Node, NodeConfig};
use std::cell::Cell;
use std::net::Ipv4Addr;
use std::rc::Rc;
use std::time::Duration;

/// Print lanbus messages in real time
#[derive(Parser, Debug)]
#[command(name = "lanbus-echo")]
#[command(version)]
#[command(about = "Print messages published on lanbus topics")]
struct Args {
    /// Topics to subscribe to
    #[arg(required = true)]
    topics: Vec<String>,

    /// Do not subscribe to the `$crc` aliases
    #[arg(long)]
    no_hash: bool,

    /// Stop after this many messages (0 = unlimited)
    #[arg(short = 'n', long, default_value = "0")]
    count: u64,

    /// Discovery UDP port
    #[arg(long)]
    discovery_port: Option<u16>,

    /// Local IPv4 address to announce
    #[arg(short, long)]
    interface: Option<Ipv4Addr>,

    /// Prefix lines with a timestamp
    #[arg(short, long)]
    timestamps: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Quiet mode - only output data, no headers
    #[arg(short = 'q', long)]
    quiet: bool,
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    if args.no_color || !is_tty() {
        colored::control::set_override(false);
    }

    if let Err(e) = run_echo(&args) {
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

fn run_echo(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = NodeConfig::from_env();
    if let Some(port) = args.discovery_port {
        config.discovery_port = port;
    }
    if args.interface.is_some() {
        config.interface = args.interface;
    }

    let mut node = Node::new(config);
    node.init()?;

    let stop = node.stop_handle();
    let ctrl_stop = stop.clone();
    ctrlc::set_handler(move || ctrl_stop.stop())?;

    let received = Rc::new(Cell::new(0u64));
    for topic in &args.topics {
        let mut names = vec![topic.clone()];
        if !args.no_hash {
            names.push(topic_hash_name(topic));
        }
        for name in names {
            let seen = Rc::clone(&received);
            let timestamps = args.timestamps;
            let label = topic.clone();
            node.subscribe(&name, move |wire_topic, payload| {
                seen.set(seen.get() + 1);
                print_message(&label, wire_topic, payload, timestamps);
            })?;
        }
    }

    if !args.quiet {
        eprintln!(
            "{} {} {}",
            ">>>".green().bold(),
            "Subscribed to".bold(),
            args.topics.join(", ").cyan()
        );
        eprintln!("{}", "Press Ctrl+C to stop".dimmed());
        eprintln!();
    }

    let interval = Duration::from_millis(10);
    while !stop.is_stopped() {
        node.spin_once(interval)?;
        if args.count > 0 && received.get() >= args.count {
            break;
        }
    }

    if !args.quiet {
        eprintln!(
            "\n{} Received {} message(s)",
            "---".dimmed(),
            received.get()
        );
    }
    Ok(())
}

fn print_message(label: &str, wire_topic: &str, payload: &[u8], timestamps: bool) {
    let text = String::from_utf8_lossy(payload);
    let name = if wire_topic == label {
        label.cyan().to_string()
    } else {
        format!("{} ({})", label.cyan(), wire_topic.dimmed())
    };
    if timestamps {
        let now = Local::now().format("%H:%M:%S%.3f");
        println!("{} {}:{}", format!("[{}]", now).dimmed(), name, text);
    } else {
        println!("{}:{}", name, text);
    }
}

fn is_tty() -> bool {
    #[cfg(unix)]
    // SAFETY: isatty only inspects the descriptor.
    unsafe {
        libc::isatty(libc::STDOUT_FILENO) != 0
    }
    #[cfg(not(unix))]
    true
}
