use std::io::{self, BufRead, Write};
use std::net::IpAddr;
use std::process::ExitCode;
use std::thread;
use std::time::Duration;

use clap::Parser;
use env_logger::Env;
use log::{error, info, warn};

use toyping::{Family, PingConfig, PingResult, Pinger, SequencePolicy, Ttl};

#[derive(Debug, Parser)]
#[command(about = "Send ICMP echo requests to a host once a second")]
struct Args {
    /// Host or address to ping; read from stdin when omitted
    #[arg(long)]
    target: Option<String>,
    /// Use ICMPv6 instead of ICMP
    #[arg(short = '6', long)]
    ipv6: bool,
    /// TTL / hop limit, 0 picks the default
    #[arg(long, default_value_t = 60)]
    ttl: u8,
    /// Address to receive replies on (default: all interfaces)
    #[arg(long, conflicts_with = "interface")]
    listen_addr: Option<IpAddr>,
    /// Receive replies on the first address of this interface
    #[arg(long)]
    interface: Option<String>,
    /// Seconds to wait for each reply
    #[arg(long, default_value_t = 10)]
    timeout: u64,
    /// Seconds to sleep between attempts
    #[arg(long, default_value_t = 1)]
    interval: u64,
    /// Bump the sequence number on every attempt instead of always sending 1
    #[arg(long)]
    increment_sequence: bool,
    /// Keep pinging after timeouts and unexpected replies
    #[arg(long)]
    keep_going: bool,
}

fn read_target() -> io::Result<String> {
    print!("Please enter an ip or an address: ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_owned())
}

fn report(result: &PingResult) {
    if result.is_ok() {
        info!("{}", result);
    } else {
        error!("{}", result);
    }
}

fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let family = if args.ipv6 { Family::V6 } else { Family::V4 };
    let listen_addr = match &args.interface {
        Some(name) => Some(toyping::interface_listen_addr(name, family)?),
        None => args.listen_addr,
    };
    let config = PingConfig {
        family,
        ttl: Ttl::new(args.ttl),
        listen_addr,
        timeout: Duration::from_secs(args.timeout),
        interval: Duration::from_secs(args.interval),
        sequence: if args.increment_sequence {
            SequencePolicy::Incrementing
        } else {
            SequencePolicy::default()
        },
        ..PingConfig::default()
    };

    let target = match args.target {
        Some(target) => target,
        None => read_target()?,
    };

    let mut pinger = Pinger::new(config);
    loop {
        let result = pinger.ping(&target);
        report(&result);

        if let Err(e) = result.into_outcome() {
            if e.is_fatal() || !args.keep_going {
                return Ok(ExitCode::FAILURE);
            }
            warn!("continuing after failed attempt");
        }
        thread::sleep(pinger.config().interval);
    }
}
