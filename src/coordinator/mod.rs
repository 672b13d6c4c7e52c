//! Failover coordinator
//!
//! Runs one trial per candidate in parse order:
//!
//! ```text
//! PARSED -> TUNNEL_STARTING -> TUNNEL_READY -> NETWORK_PROBE -> BROWSER_PROBE
//!                 |                                 |               |
//!                 +---------------------------------+---------------+--> SUCCESS | FAILED
//!                                                                              |
//!                                                                         CLEANED_UP
//! ```
//!
//! The tunnel is stopped before a trial's outcome is recorded. With
//! `concurrency > 1` trials overlap, each on its own leased port, and
//! outcomes are still recorded in parse order.

mod outcome;

pub use outcome::{NodeOutcome, NodeStatus, OutcomeLog};

use crate::config::{ProbePolicy, ProxyEndpoint, RunConfig, RunMode};
use crate::probe::{Probe, ProbeResult};
use crate::tunnel::TunnelManager;
use futures::{FutureExt, StreamExt};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Drives trials across all candidates
pub struct Coordinator {
    tunnels: TunnelManager,
    network: Arc<dyn Probe>,
    browser: Option<Arc<dyn Probe>>,
    config: RunConfig,
}

impl Coordinator {
    pub fn new(
        tunnels: TunnelManager,
        network: Arc<dyn Probe>,
        browser: Option<Arc<dyn Probe>>,
        config: RunConfig,
    ) -> Self {
        Coordinator {
            tunnels,
            network,
            browser,
            config,
        }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Run every trial and return the recorded outcomes
    pub async fn run(&self, endpoints: &[ProxyEndpoint]) -> Vec<NodeOutcome> {
        let log = OutcomeLog::new();
        self.run_with_log(endpoints, &log).await;
        log.snapshot()
    }

    /// Run every trial, appending each outcome to `log` as it is finalised
    ///
    /// If this future is dropped midway, `log` holds the outcomes recorded so
    /// far and in-flight tunnels are killed with their handles.
    pub async fn run_with_log(&self, endpoints: &[ProxyEndpoint], log: &OutcomeLog) {
        if endpoints.is_empty() {
            info!("No candidates to validate");
            return;
        }

        info!(
            "Validating {} candidate(s): mode={}, policy={}, concurrency={}",
            endpoints.len(),
            self.config.mode,
            self.config.probe_policy,
            self.config.concurrency
        );

        let mode = self.config.mode;
        let halted = AtomicBool::new(false);
        let halted = &halted;

        let mut trials = futures::stream::iter(endpoints.iter().enumerate())
            .map(|(index, endpoint)| async move {
                if halted.load(Ordering::SeqCst) {
                    return None;
                }
                let outcome = self.trial(index, endpoint).await;
                if mode == RunMode::FirstSuccess && outcome.status.is_success() {
                    halted.store(true, Ordering::SeqCst);
                }
                Some(outcome)
            })
            .buffered(self.config.concurrency.max(1));

        let mut winner: Option<usize> = None;
        while let Some(outcome) = trials.next().await {
            let Some(outcome) = outcome else { continue };

            // Keep draining so overlapping trials still stop their tunnels
            if winner.is_some() {
                debug!("Discarding outcome for {} after first success", outcome.endpoint_label);
                continue;
            }

            let success = outcome.status.is_success();
            let index = outcome.index;
            log.push(outcome);

            if mode == RunMode::FirstSuccess && success {
                info!("Candidate #{} succeeded, stopping", index + 1);
                winner = Some(index);
            }
        }
    }

    /// One candidate, from tunnel start to cleanup
    async fn trial(&self, index: usize, endpoint: &ProxyEndpoint) -> NodeOutcome {
        let label = endpoint.label();
        info!("[{}] Testing {}", index + 1, label);

        let handle = match self.tunnels.start(endpoint).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!("[{}] {} tunnel failed: {}", index + 1, label, e);
                return NodeOutcome::tunnel_failed(index, label, e.to_string());
            }
        };

        let proxy_url = handle.proxy_url();
        let (network, browser) = self.probe(index, &label, &proxy_url).await;

        // Cleanup errors are logged by the manager
        let _ = self.tunnels.stop(handle).await;

        let outcome = NodeOutcome::from_probes(index, label, &network, browser.as_ref());
        info!("[{}] {} -> {}", index + 1, outcome.endpoint_label, outcome.status);
        outcome
    }

    async fn probe(
        &self,
        index: usize,
        label: &str,
        proxy_url: &str,
    ) -> (ProbeResult, Option<ProbeResult>) {
        let network = guarded(self.network.as_ref(), proxy_url).await;
        log_probe(index, label, &network);

        let attempt_browser =
            network.success || self.config.probe_policy == ProbePolicy::AlwaysBoth;
        let browser = match &self.browser {
            Some(browser) if attempt_browser => {
                let result = guarded(browser.as_ref(), proxy_url).await;
                log_probe(index, label, &result);
                Some(result)
            }
            Some(_) => {
                debug!("[{}] {} browser probe skipped", index + 1, label);
                None
            }
            None => None,
        };

        (network, browser)
    }
}

/// Turn a panicking probe into a failed result
async fn guarded(probe: &dyn Probe, proxy_url: &str) -> ProbeResult {
    AssertUnwindSafe(probe.probe(proxy_url))
        .catch_unwind()
        .await
        .unwrap_or_else(|_| ProbeResult::failed(probe.tier(), "probe panicked", Duration::ZERO))
}

fn log_probe(index: usize, label: &str, result: &ProbeResult) {
    match (&result.observed_address, &result.error) {
        (Some(address), _) if result.success => info!(
            "[{}] {} {} probe ok: {} ({} ms)",
            index + 1,
            label,
            result.tier,
            address,
            result.latency.as_millis()
        ),
        (_, error) => warn!(
            "[{}] {} {} probe failed: {}",
            index + 1,
            label,
            result.tier,
            error.as_deref().unwrap_or("unknown error")
        ),
    }
}
