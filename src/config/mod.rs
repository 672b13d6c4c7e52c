//! Configuration module

mod parser;

pub use parser::*;

use crate::{Error, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable holding the endpoint list by default
pub const DEFAULT_INPUT_ENV: &str = "SOCKS5_INFO";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    /// Environment variable the endpoint list is read from
    pub input_env: String,

    /// Log level
    pub log_level: Option<String>,

    /// Tunnel process settings
    pub tunnel: TunnelConfig,

    /// First-tier probe
    pub network_probe: NetworkProbeConfig,

    /// Second-tier probe
    pub browser_probe: BrowserProbeConfig,

    /// Failover policy
    pub run: RunConfig,

    /// Report output
    pub report: ReportConfig,
}

impl Config {
    /// Load configuration from file (synchronous)
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load from string
    pub fn from_str(content: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.input_env.is_empty() {
            return Err(Error::config("input-env cannot be empty"));
        }
        self.tunnel.validate()?;

        if self.network_probe.url.is_empty() {
            return Err(Error::config("network-probe url cannot be empty"));
        }
        if self.network_probe.timeout_ms == 0 {
            return Err(Error::config("network-probe timeout-ms cannot be 0"));
        }
        if self.browser_probe.enabled {
            if self.browser_probe.url.is_empty() {
                return Err(Error::config("browser-probe url cannot be empty"));
            }
            if self.browser_probe.timeout_ms == 0 {
                return Err(Error::config("browser-probe timeout-ms cannot be 0"));
            }
        }

        if self.run.concurrency == 0 {
            return Err(Error::config("run concurrency must be at least 1"));
        }
        if self.run.concurrency > 1 && self.tunnel.local_port.is_some() {
            return Err(Error::config(
                "a fixed tunnel local-port cannot be shared by concurrent trials",
            ));
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            input_env: DEFAULT_INPUT_ENV.to_string(),
            log_level: None,
            tunnel: TunnelConfig::default(),
            network_probe: NetworkProbeConfig::default(),
            browser_probe: BrowserProbeConfig::default(),
            run: RunConfig::default(),
            report: ReportConfig::default(),
        }
    }
}

/// Tunnel process configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct TunnelConfig {
    /// Tunnel executable
    pub executable: PathBuf,

    /// Argument templates; `{bind}` and `{forward}` are substituted
    pub args: Vec<String>,

    /// Local listen host
    pub bind_host: IpAddr,

    /// Fixed local port; ephemeral per trial when absent
    pub local_port: Option<u16>,

    /// Upper bound on the readiness poll
    pub ready_timeout_ms: u64,

    /// First readiness retry delay, doubled up to `MAX_READY_BACKOFF`
    pub ready_backoff_ms: u64,

    /// Grace period between SIGTERM and a forced kill
    pub stop_timeout_ms: u64,
}

impl TunnelConfig {
    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }

    pub fn ready_backoff(&self) -> Duration {
        Duration::from_millis(self.ready_backoff_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.executable.as_os_str().is_empty() {
            return Err(Error::config("tunnel executable cannot be empty"));
        }
        if !self.args.iter().any(|a| a.contains("{forward}")) {
            return Err(Error::config("tunnel args must reference {forward}"));
        }
        if self.local_port == Some(0) {
            return Err(Error::config("tunnel local-port cannot be 0; omit it for ephemeral ports"));
        }
        if self.ready_timeout_ms == 0 || self.ready_backoff_ms == 0 || self.stop_timeout_ms == 0 {
            return Err(Error::config("tunnel timeouts cannot be 0"));
        }
        Ok(())
    }
}

impl Default for TunnelConfig {
    fn default() -> Self {
        TunnelConfig {
            executable: PathBuf::from("gost"),
            args: vec!["-L=http://{bind}".to_string(), "-F={forward}".to_string()],
            bind_host: IpAddr::from([127, 0, 0, 1]),
            local_port: None,
            ready_timeout_ms: 5_000,
            ready_backoff_ms: 100,
            stop_timeout_ms: 5_000,
        }
    }
}

/// Network probe configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct NetworkProbeConfig {
    /// IP echo endpoint
    pub url: String,
    pub timeout_ms: u64,
}

impl NetworkProbeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for NetworkProbeConfig {
    fn default() -> Self {
        NetworkProbeConfig {
            url: "https://ifconfig.me/ip".to_string(),
            timeout_ms: 10_000,
        }
    }
}

/// Browser probe configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct BrowserProbeConfig {
    pub enabled: bool,

    /// Chrome/Chromium executable, auto-detected when unset
    pub executable: Option<PathBuf>,

    /// IP echo page
    pub url: String,

    /// Navigation timeout
    pub timeout_ms: u64,

    /// Extra command line flags for the browser
    pub extra_args: Vec<String>,
}

impl BrowserProbeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for BrowserProbeConfig {
    fn default() -> Self {
        BrowserProbeConfig {
            enabled: true,
            executable: None,
            url: "https://httpbin.org/ip".to_string(),
            timeout_ms: 30_000,
            extra_args: Vec::new(),
        }
    }
}

/// When the run stops
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    /// Stop as soon as one candidate passes every tier
    #[default]
    FirstSuccess,
    /// Try every candidate and report all of them
    Exhaustive,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::FirstSuccess => write!(f, "first-success"),
            RunMode::Exhaustive => write!(f, "exhaustive"),
        }
    }
}

/// Whether the browser tier runs after a network failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ProbePolicy {
    /// Skip the browser tier once the network tier failed
    #[default]
    FailFast,
    /// Run both tiers for a complete audit
    AlwaysBoth,
}

impl fmt::Display for ProbePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbePolicy::FailFast => write!(f, "fail-fast"),
            ProbePolicy::AlwaysBoth => write!(f, "always-both"),
        }
    }
}

/// Failover configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RunConfig {
    pub mode: RunMode,
    pub probe_policy: ProbePolicy,

    /// Candidates evaluated in parallel
    pub concurrency: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            mode: RunMode::default(),
            probe_policy: ProbePolicy::default(),
            concurrency: 1,
        }
    }
}

/// Report configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default, rename_all = "kebab-case")]
pub struct ReportConfig {
    /// Write a JSON copy of the report here
    pub json_path: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.input_env, "SOCKS5_INFO");
        assert_eq!(config.run.mode, RunMode::FirstSuccess);
        assert_eq!(config.run.probe_policy, ProbePolicy::FailFast);
        assert_eq!(config.run.concurrency, 1);
        assert!(config.tunnel.local_port.is_none());
        assert!(config.log_level.is_none());
        assert!(config.browser_probe.executable.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_yaml() {
        let yaml = r#"
log-level: debug
tunnel:
  executable: /usr/local/bin/gost
  local-port: 40000
  ready-timeout-ms: 3000
network-probe:
  url: http://ip.test/
  timeout-ms: 12000
browser-probe:
  enabled: false
run:
  mode: exhaustive
  probe-policy: always-both
report:
  json-path: report.json
"#;
        let config = Config::from_str(yaml).unwrap();
        assert_eq!(config.log_level, Some("debug".to_string()));
        assert_eq!(config.tunnel.local_port, Some(40000));
        assert_eq!(config.tunnel.ready_timeout(), Duration::from_secs(3));
        // unspecified fields keep their defaults
        assert_eq!(config.tunnel.stop_timeout_ms, 5_000);
        assert_eq!(config.network_probe.timeout(), Duration::from_secs(12));
        assert!(!config.browser_probe.enabled);
        assert_eq!(config.run.mode, RunMode::Exhaustive);
        assert_eq!(config.run.probe_policy, ProbePolicy::AlwaysBoth);
        assert_eq!(config.report.json_path, Some(PathBuf::from("report.json")));
    }

    #[test]
    fn test_fixed_port_rejects_concurrency() {
        let yaml = r#"
tunnel:
  local-port: 40000
run:
  concurrency: 4
"#;
        assert!(matches!(Config::from_str(yaml), Err(Error::Config(_))));
    }

    #[test]
    fn test_zero_timeouts_rejected() {
        let mut config = Config::default();
        config.network_probe.timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.tunnel.ready_backoff_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_args_must_forward() {
        let mut config = Config::default();
        config.tunnel.args = vec!["-L=http://{bind}".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_policy_display() {
        assert_eq!(RunMode::Exhaustive.to_string(), "exhaustive");
        assert_eq!(ProbePolicy::AlwaysBoth.to_string(), "always-both");
    }
}
