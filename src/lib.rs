//! Proxy Vetter - SOCKS5 proxy validation through local tunnels
//!
//! For each `user:pass@host:port` candidate the validator:
//! - starts a local unauthenticated HTTP tunnel forwarding to the SOCKS5 endpoint
//! - probes egress with a plain HTTP GET through the tunnel
//! - probes again with a headless browser routed through the same tunnel
//! - stops the tunnel and records the outcome
//!
//! # Architecture
//!
//! ```text
//!  config::parse_endpoints
//!            |
//!            v
//!  +-------------------+    start/stop    +-----------+
//!  |   coordinator/    |----------------->|  tunnel/  |
//!  | (failover loop)   |                  | (process) |
//!  +---------+---------+                  +-----------+
//!            | proxy url
//!            v
//!  +-------------------+                  +-----------+
//!  |      probe/       |                  |  report/  |
//!  | (network, browser)|                  |  (table)  |
//!  +-------------------+                  +-----------+
//! ```

pub mod common;
pub mod config;
pub mod coordinator;
pub mod probe;
pub mod report;
pub mod tunnel;

pub use common::error::{Error, Result};
pub use config::Config;

use chrono::Utc;
use common::PortPool;
use config::ProxyEndpoint;
use coordinator::{Coordinator, OutcomeLog};
use probe::{BrowserProbe, HttpProbe, Probe};
use report::RunReport;
use std::sync::Arc;
use tracing::info;
use tunnel::{ProcessLauncher, TunnelManager};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Validator wiring the real collaborators from configuration
pub struct Validator {
    config: Config,
    coordinator: Coordinator,
}

impl Validator {
    /// Build the tunnel manager and probes described by `config`
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let ports = match config.tunnel.local_port {
            Some(port) => PortPool::fixed(config.tunnel.bind_host, port),
            None => PortPool::ephemeral(config.tunnel.bind_host),
        };
        let tunnels = TunnelManager::new(
            Arc::new(ProcessLauncher::from_config(&config.tunnel)),
            ports,
            config.tunnel.ready_timeout(),
            config.tunnel.ready_backoff(),
            config.tunnel.stop_timeout(),
        );

        let network: Arc<dyn Probe> = Arc::new(HttpProbe::from_config(&config.network_probe));
        let browser: Option<Arc<dyn Probe>> = if config.browser_probe.enabled {
            Some(Arc::new(BrowserProbe::from_config(&config.browser_probe)))
        } else {
            info!("Browser probe disabled");
            None
        };

        let coordinator = Coordinator::new(tunnels, network, browser, config.run.clone());
        Ok(Validator {
            config,
            coordinator,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    /// Run all candidates to completion
    pub async fn run(&self, endpoints: &[ProxyEndpoint], log: &OutcomeLog) -> RunReport {
        let started_at = Utc::now();
        self.coordinator.run_with_log(endpoints, log).await;
        RunReport::new(&self.config.run, endpoints.len(), started_at, log.snapshot(), false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validator_from_default_config() {
        let validator = Validator::new(Config::default()).unwrap();
        assert_eq!(validator.config().input_env, "SOCKS5_INFO");
        assert_eq!(validator.coordinator().config().concurrency, 1);
    }

    #[test]
    fn test_validator_rejects_invalid_config() {
        let mut config = Config::default();
        config.run.concurrency = 0;
        assert!(matches!(Validator::new(config), Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_empty_candidate_list_spawns_nothing() {
        let mut config = Config::default();
        config.tunnel.executable = "/nonexistent/tunnel".into();
        let validator = Validator::new(config).unwrap();

        let log = OutcomeLog::new();
        let report = validator.run(&[], &log).await;
        assert!(report.outcomes.is_empty());
        assert_eq!(report.exit_status(), report::ExitStatus::NoCandidates);
    }
}
