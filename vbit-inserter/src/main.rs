//! vbit-inserter: teletext packet stream generator.
//!
//! Loads TTI pages from a directory, keeps them in step with the files on
//! disk and writes the packet stream to stdout.

use std::io::{self, BufWriter};
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use log::{error, info, warn};

use vbit_inserter::clock::MasterClock;
use vbit_inserter::config::{Config, SharedConfig};
use vbit_inserter::logging;
use vbit_inserter::output::PacketSink;
use vbit_inserter::page::{PageDirectory, PageList};
use vbit_inserter::service::{
    Control830Source, CycleStats, DatacastChannels, DatacastSource, DebugSource, MagazineSequencer, Scheduler,
    SubtitleChannel, SubtitleSource,
};
use vbit_packet::{OutputFormat, PageNumber};

const DEFAULT_CONFIG_FILE: &str = "vbit-inserter.toml";

/// vbit-inserter - Teletext packet inserter
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short = 'f', long)]
    config: Option<PathBuf>,

    /// Directory of TTI page files
    #[arg(short, long)]
    pages: Option<PathBuf>,

    /// Output format: raw, t42 or pes
    #[arg(long)]
    format: Option<OutputFormat>,

    /// Bit-reverse T42 output
    #[arg(long)]
    reverse: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Directory where log files are stored
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Number of days to keep log files
    #[arg(long)]
    log_retention_days: Option<u64>,

    /// Diagnostic packet level, 0 disables them
    #[arg(long)]
    debug_level: Option<u8>,
}

impl Args {
    /// Command line values take precedence over the config file.
    fn apply(&self, config: &mut Config) {
        if let Some(pages) = &self.pages {
            config.service.page_dir = pages.clone();
        }
        if let Some(format) = self.format {
            config.service.output = format;
        }
        if self.reverse {
            config.service.reverse_bits = true;
        }
        if let Some(log_dir) = &self.log_dir {
            config.logging.log_dir = Some(log_dir.clone());
        }
        if let Some(days) = self.log_retention_days {
            config.logging.retention_days = Some(days);
        }
        if let Some(level) = self.debug_level {
            config.service.debug_level = level;
        }
    }
}

/// Address of this host for the header address token, IPv4 preferred.
fn host_address() -> String {
    let host = match dns_lookup::get_hostname() {
        Ok(host) => host,
        Err(e) => {
            warn!("Failed to get host name: {}", e);
            return String::new();
        }
    };
    match dns_lookup::lookup_host(&host) {
        Ok(addrs) => {
            let usable: Vec<IpAddr> = addrs.into_iter().filter(|a| !a.is_loopback()).collect();
            usable
                .iter()
                .find(|a| a.is_ipv4())
                .or(usable.first())
                .map(|a| a.to_string())
                .unwrap_or_default()
        }
        Err(e) => {
            warn!("Failed to look up {}: {}", host, e);
            String::new()
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Explicit path > file in the working directory > defaults
    let config_path = args.config.clone().or_else(|| {
        let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
        default_path.exists().then_some(default_path)
    });
    let mut config = match &config_path {
        Some(path) => match Config::load(path) {
            Ok(config) => {
                eprintln!("Loaded config from: {}", path.display());
                config
            }
            Err(e) => {
                eprintln!("Failed to load config file: {}", e);
                return Err(e.into());
            }
        },
        None => Config::default(),
    };
    args.apply(&mut config);
    config.validate()?;

    let log_dir = config.logging.log_dir.clone().unwrap_or_else(|| PathBuf::from("logs"));
    let retention_days = config.logging.retention_days.unwrap_or(7);
    logging::init_logging(&log_dir, retention_days, args.verbose, config.logging.level.as_deref())?;

    let address = config.service.address.clone().unwrap_or_else(host_address);
    let service = config.service.clone();
    let buffer_size = config.datacast.buffer_size;
    let config = SharedConfig::new(config);

    info!("vbit-inserter {} starting...", env!("CARGO_PKG_VERSION"));
    info!("  Page directory: {}", service.page_dir.display());
    info!("  Output: {} ({} lines per field)", service.output, service.lines_per_field);
    info!("  Address: {}", if address.is_empty() { "-" } else { address.as_str() });

    let clock = Arc::new(MasterClock::new(service.fields_per_second));
    let stats = Arc::new(CycleStats::new());
    let pages = Arc::new(PageList::new());

    let mut directory = PageDirectory::new(&service.page_dir);
    match directory.refresh(&pages) {
        Ok(summary) => info!("Loaded {} pages ({} failed)", summary.loaded, summary.failed),
        Err(e) => warn!("Initial page load failed: {}", e),
    }
    let reload_every = Duration::from_secs(service.reload_interval_secs.max(1));
    let reloader = directory.spawn_reloader(pages.clone(), reload_every);

    let subtitles = SubtitleChannel::new();
    let datacast = DatacastChannels::new(buffer_size);

    let sink = PacketSink::new(BufWriter::new(io::stdout()), service.output, service.reverse_bits);
    let mut scheduler = Scheduler::new(clock.clone(), config.clone(), stats.clone(), sink, address);
    scheduler.add_priority_source(Box::new(SubtitleSource::new(subtitles, config.clone())));
    scheduler.add_priority_source(Box::new(Control830Source::new(clock.clone(), config.clone())));
    scheduler.add_priority_source(Box::new(DatacastSource::new(datacast, config.clone())));
    scheduler.add_priority_source(Box::new(DebugSource::new(clock.clone(), config.clone(), stats.clone())));
    for digit in 1..=8u8 {
        let magazine = PageNumber::new(digit, 0).magazine();
        scheduler.add_magazine(Box::new(MagazineSequencer::new(
            magazine,
            pages.clone(),
            clock.clone(),
            config.clone(),
            stats.clone(),
        )));
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    let (done_tx, done_rx) = tokio::sync::oneshot::channel();
    let scheduler_shutdown = shutdown.clone();
    let scheduler_thread = std::thread::Builder::new()
        .name("scheduler".to_string())
        .spawn(move || {
            let result = scheduler.run(&scheduler_shutdown);
            let _ = done_tx.send(());
            result
        })?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("Interrupted, stopping");
        }
        _ = done_rx => {}
    }

    shutdown.store(true, Ordering::Release);
    reloader.abort();
    match scheduler_thread.join() {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            error!("Scheduler stopped: {}", e);
            return Err(e.into());
        }
        Err(_) => return Err("Scheduler thread panicked".into()),
    }

    info!("vbit-inserter stopped");
    Ok(())
}
