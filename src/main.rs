//! `alarma` command-line tool.
//!
//! Runs small workloads under in-process timeouts, mainly to exercise the
//! library from a shell:
//!
//! ```text
//! alarma sleep --timeout 0.5 --duration 2      # interrupted after 0.5s
//! alarma spin --timeout 0.2                    # busy loop with checkpoints
//! alarma read --timeout 1 < /dev/tty           # blocking read on stdin
//! alarma quota --budget 1 --slice 0.3 --slice 0.9
//! alarma check-config alarma.toml
//! ```
//!
//! Exits with 124 when a timeout fired, like GNU `timeout`.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use serde::Serialize;

use alarma::config::{load_config, AlarmaConfig};
use alarma::observability::{logging, metrics};
use alarma::{Error, Quota, Watchdog};

/// Exit status when a timeout fired.
const EXIT_TIMED_OUT: u8 = 124;

#[derive(Parser)]
#[command(name = "alarma")]
#[command(about = "Run work under in-process execution time limits", long_about = None)]
struct Cli {
    /// Configuration file (TOML).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print the outcome as JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sleep under a timeout
    Sleep {
        /// Time budget in seconds
        #[arg(short, long)]
        timeout: f64,
        /// How long to sleep in seconds
        #[arg(short, long)]
        duration: f64,
    },
    /// Busy-loop with checkpoints until the timeout fires
    Spin {
        /// Time budget in seconds
        #[arg(short, long)]
        timeout: f64,
    },
    /// Read standard input to EOF under a timeout
    Read {
        /// Time budget in seconds
        #[arg(short, long)]
        timeout: f64,
    },
    /// Charge consecutive sleeps to a single quota
    Quota {
        /// Total quota in seconds
        #[arg(short, long)]
        budget: f64,
        /// Duration of one sleep in seconds (repeatable)
        #[arg(short, long = "slice", required = true)]
        slices: Vec<f64>,
    },
    /// Load and validate a configuration file
    CheckConfig {
        path: PathBuf,
    },
}

/// Result of one command, printed as text or JSON.
#[derive(Debug, Serialize)]
struct Report {
    command: &'static str,
    timed_out: bool,
    elapsed_secs: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    quota_remaining_secs: Option<f64>,
}

impl Report {
    fn new(command: &'static str, started: Instant) -> Self {
        Self {
            command,
            timed_out: false,
            elapsed_secs: started.elapsed().as_secs_f64(),
            detail: None,
            quota_remaining_secs: None,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => match load_config(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error: {}", e);
                return ExitCode::FAILURE;
            }
        },
        None => AlarmaConfig::default(),
    };
    logging::init(&config.observability.log_level);
    metrics::set_enabled(config.observability.metrics_enabled);

    match run(cli.command) {
        Ok(report) => {
            print_report(&report, cli.json);
            if report.timed_out {
                ExitCode::from(EXIT_TIMED_OUT)
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> Result<Report, Box<dyn std::error::Error>> {
    let started = Instant::now();

    let report = match command {
        Commands::Sleep { timeout, duration } => {
            let nap = seconds(duration)?;
            let watchdog = Watchdog::install()?;
            let outcome = watchdog.timeout(timeout).run(|| watchdog.sleep(nap));
            finish("sleep", started, outcome)?
        }
        Commands::Spin { timeout } => {
            let watchdog = Watchdog::install()?;
            let mut iterations: u64 = 0;
            let outcome = watchdog.timeout(timeout).run(|| -> alarma::Result<()> {
                loop {
                    iterations = iterations.wrapping_add(1);
                    if iterations % 1024 == 0 {
                        watchdog.checkpoint()?;
                    }
                    std::hint::spin_loop();
                }
            });
            let mut report = finish("spin", started, outcome)?;
            report.detail = Some(format!("{iterations} iterations"));
            report
        }
        Commands::Read { timeout } => {
            let watchdog = Watchdog::install()?;
            let stdin = std::io::stdin();
            let mut buf = [0u8; 8192];
            let mut total = 0usize;
            let outcome = watchdog.timeout(timeout).run(|| -> alarma::Result<()> {
                loop {
                    match watchdog.read(&stdin, &mut buf)? {
                        0 => return Ok(()),
                        n => total += n,
                    }
                }
            });
            let mut report = finish("read", started, outcome)?;
            report.detail = Some(format!("{total} bytes"));
            report
        }
        Commands::Quota { budget, slices } => {
            let quota = Quota::new(budget)?;
            let watchdog = Watchdog::install()?;
            let mut completed = 0usize;
            let mut outcome = Ok(());
            for slice in &slices {
                let nap = seconds(*slice)?;
                outcome = watchdog.timeout(&quota).run(|| watchdog.sleep(nap));
                if outcome.is_err() {
                    break;
                }
                completed += 1;
            }
            let mut report = finish("quota", started, outcome)?;
            report.detail = Some(format!("{completed} of {} slices completed", slices.len()));
            report.quota_remaining_secs = Some(quota.remaining().as_secs_f64());
            report
        }
        Commands::CheckConfig { path } => {
            let config = load_config(&path)?;
            let mut report = Report::new("check-config", started);
            report.detail = Some(format!(
                "hooks.enabled={} hooks.request_timeout_secs={} observability.log_level={} observability.metrics_enabled={}",
                config.hooks.enabled,
                config.hooks.request_timeout_secs,
                config.observability.log_level,
                config.observability.metrics_enabled
            ));
            report
        }
    };

    Ok(report)
}

/// Turn a scope outcome into a report, keeping non-timeout errors as errors.
fn finish(
    command: &'static str,
    started: Instant,
    outcome: alarma::Result<()>,
) -> Result<Report, Box<dyn std::error::Error>> {
    let mut report = Report::new(command, started);
    match outcome {
        Ok(()) => Ok(report),
        Err(Error::Expired(expired)) => {
            report.timed_out = true;
            report.detail = Some(expired.to_string());
            Ok(report)
        }
        Err(e) => Err(e.into()),
    }
}

fn seconds(value: f64) -> alarma::Result<Duration> {
    Duration::try_from_secs_f64(value)
        .map_err(|e| Error::InvalidArgument(format!("{value}s: {e}")))
}

fn print_report(report: &Report, json: bool) {
    if json {
        match serde_json::to_string_pretty(report) {
            Ok(text) => println!("{}", text),
            Err(e) => eprintln!("Error: {}", e),
        }
        return;
    }

    let status = if report.timed_out { "timed out" } else { "completed" };
    println!("{}: {} after {:.3}s", report.command, status, report.elapsed_secs);
    if let Some(detail) = &report.detail {
        println!("  {}", detail);
    }
    if let Some(remaining) = report.quota_remaining_secs {
        println!("  quota remaining: {:.3}s", remaining);
    }
}
