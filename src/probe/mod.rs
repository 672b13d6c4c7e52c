//! Connectivity probes
//!
//! Two tiers run against the same tunnel:
//! - `HttpProbe`: one GET through the local proxy to an IP echo endpoint
//! - `BrowserProbe`: a headless browser navigation through the same proxy
//!
//! Probes never return errors; every failure becomes a failed `ProbeResult`.

mod browser;
mod network;

pub use browser::{
    Browser, BrowserContext, BrowserInstance, BrowserProbe, BrowserProxy, ChromiumBrowser,
    ProxyCredentials,
};
pub use network::HttpProbe;

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Probe tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeTier {
    Network,
    Browser,
}

impl fmt::Display for ProbeTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeTier::Network => write!(f, "network"),
            ProbeTier::Browser => write!(f, "browser"),
        }
    }
}

/// Outcome of one probe tier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub tier: ProbeTier,
    pub success: bool,
    pub observed_address: Option<String>,
    pub error: Option<String>,
    pub latency: Duration,
}

impl ProbeResult {
    pub fn passed(tier: ProbeTier, address: String, latency: Duration) -> Self {
        ProbeResult {
            tier,
            success: true,
            observed_address: Some(address),
            error: None,
            latency,
        }
    }

    pub fn failed<E: fmt::Display>(tier: ProbeTier, error: E, latency: Duration) -> Self {
        ProbeResult {
            tier,
            success: false,
            observed_address: None,
            error: Some(error.to_string()),
            latency,
        }
    }
}

/// One probe tier, run through a local proxy URL
#[async_trait]
pub trait Probe: Send + Sync {
    fn tier(&self) -> ProbeTier;

    async fn probe(&self, proxy_url: &str) -> ProbeResult;
}

/// Egress address from an echo response body
///
/// Accepts plain text (`1.2.3.4`) and httpbin style JSON (`{"origin": "1.2.3.4"}`).
pub fn extract_address(body: &str) -> Option<String> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }

    if let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(origin) = map.get("origin").and_then(|v| v.as_str()) {
            let origin = origin.trim();
            if !origin.is_empty() {
                return Some(origin.to_string());
            }
        }
    }

    Some(body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_plain_address() {
        assert_eq!(extract_address(" 9.9.9.9\n"), Some("9.9.9.9".to_string()));
    }

    #[test]
    fn test_extract_httpbin_origin() {
        let body = "{\n  \"origin\": \"203.0.113.7\"\n}\n";
        assert_eq!(extract_address(body), Some("203.0.113.7".to_string()));
    }

    #[test]
    fn test_extract_empty_body() {
        assert_eq!(extract_address("  \n"), None);
    }

    #[test]
    fn test_probe_result_constructors() {
        let ok =
            ProbeResult::passed(ProbeTier::Network, "1.1.1.1".into(), Duration::from_millis(5));
        assert!(ok.success);
        assert_eq!(ok.error, None);

        let bad = ProbeResult::failed(ProbeTier::Browser, "navigation timeout", Duration::ZERO);
        assert!(!bad.success);
        assert_eq!(bad.observed_address, None);
        assert_eq!(bad.error.as_deref(), Some("navigation timeout"));
        assert_eq!(bad.tier.to_string(), "browser");
    }
}
