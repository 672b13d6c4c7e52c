//! Proxy Vetter - CLI Entry Point
//!
//! Reads a comma-separated `user:pass@host:port` list from the environment
//! (`SOCKS5_INFO` by default), validates each endpoint and prints a report.
//!
//! Exit codes: 0 at least one node passed, 1 all failed, 2 input missing or
//! bad configuration, 3 no valid entries, 130 interrupted.

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use clap::Parser;
use proxy_vetter::config::{parse_endpoints, ProbePolicy, RunMode};
use proxy_vetter::coordinator::OutcomeLog;
use proxy_vetter::report::{ExitStatus, RunReport};
use proxy_vetter::{Config, Validator, VERSION};
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "proxy-vetter")]
#[command(author = "Tsang")]
#[command(version = VERSION)]
#[command(about = "Validate SOCKS5 proxies through local tunnels with network and browser probes")]
struct Args {
    /// Path to configuration file
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Endpoint list (overrides the environment variable)
    #[arg(short = 'i', long = "input")]
    input: Option<String>,

    /// Environment variable holding the endpoint list
    #[arg(long = "input-env")]
    input_env: Option<String>,

    /// Stop at the first working node or test them all
    #[arg(short = 'm', long = "mode", value_enum)]
    mode: Option<RunMode>,

    /// Skip or still run the browser probe after a network failure
    #[arg(short = 'p', long = "probe-policy", value_enum)]
    probe_policy: Option<ProbePolicy>,

    /// Candidates tested in parallel
    #[arg(short = 'j', long = "concurrency")]
    concurrency: Option<usize>,

    /// Fixed local tunnel port (ephemeral by default)
    #[arg(long = "local-port")]
    local_port: Option<u16>,

    /// Tunnel executable
    #[arg(long = "tunnel-bin")]
    tunnel_bin: Option<PathBuf>,

    /// Headless browser executable
    #[arg(long = "browser-bin")]
    browser_bin: Option<PathBuf>,

    /// Only run the network probe
    #[arg(long = "no-browser")]
    no_browser: bool,

    /// Write the report as JSON
    #[arg(long = "json")]
    json: Option<PathBuf>,

    /// Log level (overrides config)
    #[arg(short = 'l', long = "log-level")]
    log_level: Option<String>,
}

impl Args {
    fn apply(&self, config: &mut Config) {
        if let Some(ref env) = self.input_env {
            config.input_env = env.clone();
        }
        if let Some(mode) = self.mode {
            config.run.mode = mode;
        }
        if let Some(policy) = self.probe_policy {
            config.run.probe_policy = policy;
        }
        if let Some(concurrency) = self.concurrency {
            config.run.concurrency = concurrency;
        }
        if let Some(port) = self.local_port {
            config.tunnel.local_port = Some(port);
        }
        if let Some(ref bin) = self.tunnel_bin {
            config.tunnel.executable = bin.clone();
        }
        if let Some(ref bin) = self.browser_bin {
            config.browser_probe.executable = Some(bin.clone());
        }
        if self.no_browser {
            config.browser_probe.enabled = false;
        }
        if let Some(ref path) = self.json {
            config.report.json_path = Some(path.clone());
        }
        if let Some(ref level) = self.log_level {
            config.log_level = Some(level.clone());
        }
    }
}

fn main() -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(num_cpus::get().clamp(2, 8))
        .enable_all()
        .thread_name("vetter-worker")
        .build()?;

    let status = runtime.block_on(async_main())?;
    // Drop the runtime first so kill_on_drop children are reaped
    drop(runtime);
    std::process::exit(status.code());
}

/// Crate log directive; an explicit level wins, otherwise `RUST_LOG` decides
fn log_directive(level: Option<&str>, rust_log_set: bool) -> Option<String> {
    match level {
        Some(level) => Some(format!("proxy_vetter={}", level)),
        None if rust_log_set => None,
        None => Some("proxy_vetter=info".to_string()),
    }
}

async fn async_main() -> anyhow::Result<ExitStatus> {
    let args = Args::parse();

    let mut config = match args.config {
        Some(ref path) => match Config::load(path) {
            Ok(c) => c,
            Err(e) => {
                // Logging is not up yet
                eprintln!("Failed to load configuration {}: {}", path.display(), e);
                return Ok(ExitStatus::InputMissing);
            }
        },
        None => Config::default(),
    };
    args.apply(&mut config);

    // Initialize logging
    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    let rust_log_set = std::env::var_os("RUST_LOG").is_some();
    if let Some(directive) = log_directive(config.log_level.as_deref(), rust_log_set) {
        filter = filter.add_directive(directive.parse()?);
    }
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    info!("Proxy Vetter v{}", VERSION);

    let input = match args.input.clone().or_else(|| std::env::var(&config.input_env).ok()) {
        Some(input) => input,
        None => {
            error!(
                "No endpoint list: set {} or pass --input",
                config.input_env
            );
            return Ok(ExitStatus::InputMissing);
        }
    };

    let validator = match Validator::new(config) {
        Ok(v) => v,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            return Ok(ExitStatus::InputMissing);
        }
    };

    let endpoints = parse_endpoints(&input);
    info!("Parsed {} candidate(s)", endpoints.len());

    let log = OutcomeLog::new();
    let started_at = chrono::Utc::now();
    let report = tokio::select! {
        report = validator.run(&endpoints, &log) => report,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, reporting {} finished trial(s)", log.len());
            RunReport::new(
                &validator.config().run,
                endpoints.len(),
                started_at,
                log.snapshot(),
                true,
            )
        }
    };

    print!("{}", report.render());

    if let Some(ref path) = validator.config().report.json_path {
        match report.write_json(path) {
            Ok(()) => info!("Report written to {}", path.display()),
            Err(e) => error!("Failed to write report {}: {}", path.display(), e),
        }
    }

    if let Some(winner) = report.first_success() {
        info!(
            "Working proxy: {} (egress {})",
            winner.endpoint_label,
            winner
                .browser_probe_address
                .as_deref()
                .or(winner.network_probe_address.as_deref())
                .unwrap_or("-")
        );
    }

    Ok(report.exit_status())
}
