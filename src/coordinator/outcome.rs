//! Per-node outcomes

use crate::probe::ProbeResult;
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Final status of one candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeStatus {
    Success,
    NetworkFailed,
    BrowserFailed,
    TunnelFailed,
}

impl NodeStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, NodeStatus::Success)
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeStatus::Success => write!(f, "SUCCESS"),
            NodeStatus::NetworkFailed => write!(f, "NETWORK FAILED"),
            NodeStatus::BrowserFailed => write!(f, "BROWSER FAILED"),
            NodeStatus::TunnelFailed => write!(f, "TUNNEL FAILED"),
        }
    }
}

/// Recorded result for one candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeOutcome {
    /// Position in the parsed candidate list
    pub index: usize,
    pub endpoint_label: String,
    pub network_probe_address: Option<String>,
    pub browser_probe_address: Option<String>,
    pub network_latency_ms: Option<u64>,
    pub status: NodeStatus,
    /// First failure, if any
    pub error: Option<String>,
}

impl NodeOutcome {
    pub fn tunnel_failed(index: usize, endpoint_label: String, error: String) -> Self {
        NodeOutcome {
            index,
            endpoint_label,
            network_probe_address: None,
            browser_probe_address: None,
            network_latency_ms: None,
            status: NodeStatus::TunnelFailed,
            error: Some(error),
        }
    }

    /// Network failure takes precedence over browser failure
    pub fn from_probes(
        index: usize,
        endpoint_label: String,
        network: &ProbeResult,
        browser: Option<&ProbeResult>,
    ) -> Self {
        let (status, error) = if !network.success {
            (NodeStatus::NetworkFailed, network.error.clone())
        } else if let Some(browser) = browser.filter(|b| !b.success) {
            (NodeStatus::BrowserFailed, browser.error.clone())
        } else {
            (NodeStatus::Success, None)
        };

        NodeOutcome {
            index,
            endpoint_label,
            network_probe_address: network.observed_address.clone(),
            browser_probe_address: browser.and_then(|b| b.observed_address.clone()),
            network_latency_ms: network
                .success
                .then(|| network.latency.as_millis() as u64),
            status,
            error,
        }
    }
}

/// Ordered, shareable record of finished trials
#[derive(Debug, Clone, Default)]
pub struct OutcomeLog {
    outcomes: Arc<Mutex<Vec<NodeOutcome>>>,
}

impl OutcomeLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, outcome: NodeOutcome) {
        self.outcomes.lock().push(outcome);
    }

    pub fn len(&self) -> usize {
        self.outcomes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.lock().is_empty()
    }

    pub fn snapshot(&self) -> Vec<NodeOutcome> {
        self.outcomes.lock().clone()
    }
}
