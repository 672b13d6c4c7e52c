//! Lightweight HTTP probe

use super::{extract_address, Probe, ProbeResult, ProbeTier};
use crate::config::NetworkProbeConfig;
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::debug;

/// GET an IP echo URL through the tunnel's HTTP proxy
#[derive(Debug, Clone)]
pub struct HttpProbe {
    url: String,
    timeout: Duration,
}

impl HttpProbe {
    pub fn new(url: String, timeout: Duration) -> Self {
        HttpProbe { url, timeout }
    }

    pub fn from_config(config: &NetworkProbeConfig) -> Self {
        Self::new(config.url.clone(), config.timeout())
    }

    async fn fetch(&self, proxy_url: &str) -> Result<String> {
        let client = reqwest::Client::builder()
            .proxy(reqwest::Proxy::all(proxy_url)?)
            .timeout(self.timeout)
            .build()
            .map_err(|e| Error::network_probe(e.to_string()))?;

        let resp = client.get(&self.url).send().await?;
        let status = resp.status();
        if status != StatusCode::OK {
            return Err(Error::network_probe(format!("unexpected status {}", status)));
        }

        let body = resp.text().await?;
        extract_address(&body).ok_or_else(|| Error::network_probe("empty response body"))
    }
}

#[async_trait]
impl Probe for HttpProbe {
    fn tier(&self) -> ProbeTier {
        ProbeTier::Network
    }

    async fn probe(&self, proxy_url: &str) -> ProbeResult {
        let start = Instant::now();
        debug!("Network probe {} via {}", self.url, proxy_url);

        // The client timeout should fire first; this bounds everything else
        let result = match timeout(self.timeout, self.fetch(proxy_url)).await {
            Ok(result) => result,
            Err(_) => Err(Error::timeout(format!("no response within {:?}", self.timeout))),
        };

        match result {
            Ok(address) => ProbeResult::passed(ProbeTier::Network, address, start.elapsed()),
            Err(e) => ProbeResult::failed(ProbeTier::Network, e, start.elapsed()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Minimal HTTP proxy double answering every request with `response`
    async fn proxy_double(response: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 4096];
                    let _ = stream.read(&mut buf).await;
                    let _ = stream.write_all(response.as_bytes()).await;
                    let _ = stream.shutdown().await;
                });
            }
        });
        format!("http://{}", addr)
    }

    fn probe(timeout: Duration) -> HttpProbe {
        HttpProbe::new("http://ip.echo.test/".to_string(), timeout)
    }

    #[tokio::test]
    async fn test_probe_success_records_address() {
        let proxy = proxy_double(
            "HTTP/1.1 200 OK\r\nContent-Length: 8\r\nConnection: close\r\n\r\n9.9.9.9\n",
        )
        .await;

        let result = probe(Duration::from_secs(5)).probe(&proxy).await;
        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.observed_address.as_deref(), Some("9.9.9.9"));
        assert_eq!(result.tier, ProbeTier::Network);
    }

    #[tokio::test]
    async fn test_probe_non_200_fails() {
        let proxy = proxy_double(
            "HTTP/1.1 407 Proxy Authentication Required\r\n\
             Content-Length: 0\r\nConnection: close\r\n\r\n",
        )
        .await;

        let result = probe(Duration::from_secs(5)).probe(&proxy).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("407"));
    }

    #[tokio::test]
    async fn test_probe_empty_body_fails() {
        let proxy = proxy_double(
            "HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\n \n",
        )
        .await;

        let result = probe(Duration::from_secs(5)).probe(&proxy).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("empty"));
    }

    #[tokio::test]
    async fn test_probe_times_out_on_silent_proxy() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });

        let start = Instant::now();
        let result = probe(Duration::from_millis(300))
            .probe(&format!("http://{}", addr))
            .await;
        assert!(!result.success);
        assert!(start.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_probe_connection_refused_fails() {
        // Bind then drop to get a port nobody listens on
        let addr = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap();

        let result = probe(Duration::from_secs(2))
            .probe(&format!("http://{}", addr))
            .await;
        assert!(!result.success);
        assert!(result.error.is_some());
    }
}
