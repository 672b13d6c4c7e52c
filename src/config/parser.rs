//! Credential list parser
//!
//! Turns `user:pass@host:port,user:pass@host:port` into endpoints.
//! Malformed entries are skipped with a warning; the batch never aborts.

use crate::{Error, Result};
use std::fmt;
use tracing::warn;

/// Authenticated SOCKS5 endpoint
#[derive(Clone, PartialEq, Eq)]
pub struct ProxyEndpoint {
    pub username: String,
    pub password: String,
    pub host: String,
    pub port: u16,
}

impl ProxyEndpoint {
    /// `host:port`, safe to print
    pub fn label(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Forward spec handed to the tunnel
    pub fn socks5_url(&self) -> String {
        format!(
            "socks5://{}:{}@{}:{}",
            urlencoding::encode(&self.username),
            urlencoding::encode(&self.password),
            self.host,
            self.port
        )
    }

    /// Forward spec with the password hidden, for logs
    pub fn masked_url(&self) -> String {
        format!("socks5://{}:***@{}:{}", self.username, self.host, self.port)
    }
}

impl fmt::Debug for ProxyEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyEndpoint")
            .field("username", &self.username)
            .field("password", &"***")
            .field("host", &self.host)
            .field("port", &self.port)
            .finish()
    }
}

impl fmt::Display for ProxyEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Parse a single `user:pass@host:port` entry
pub fn parse_endpoint(entry: &str) -> Result<ProxyEndpoint> {
    let entry = entry.trim();

    // Split on the first '@': auth part / address part
    let (auth, address) = entry
        .split_once('@')
        .ok_or_else(|| Error::parse("missing '@' between credentials and address"))?;

    // Split auth on the first ':'
    let (username, password) = auth
        .split_once(':')
        .ok_or_else(|| Error::parse("missing ':' between username and password"))?;

    // Split address on the last ':' so bracketed IPv6 hosts survive
    let (host, port) = address
        .rsplit_once(':')
        .ok_or_else(|| Error::parse("missing ':' between host and port"))?;

    if username.is_empty() || password.is_empty() || host.is_empty() {
        return Err(Error::parse("username, password and host must be non-empty"));
    }
    if host.contains('@') {
        return Err(Error::parse("unexpected '@' in host"));
    }

    let port: u16 = port
        .parse()
        .map_err(|_| Error::parse(format!("invalid port: {:?}", port)))?;
    if port == 0 {
        return Err(Error::parse("port cannot be 0"));
    }

    Ok(ProxyEndpoint {
        username: username.to_string(),
        password: password.to_string(),
        host: host.to_string(),
        port,
    })
}

/// Parse a comma-separated endpoint list, preserving order
pub fn parse_endpoints(input: &str) -> Vec<ProxyEndpoint> {
    input
        .split(',')
        .enumerate()
        .filter(|(_, entry)| !entry.trim().is_empty())
        .filter_map(|(index, entry)| match parse_endpoint(entry) {
            Ok(endpoint) => Some(endpoint),
            Err(e) => {
                warn!("Skipping proxy entry #{} ({}): {}", index + 1, redact(entry), e);
                None
            }
        })
        .collect()
}

/// Keep only the part after the last '@' so a malformed entry never leaks credentials
fn redact(entry: &str) -> &str {
    let entry = entry.trim();
    match entry.rsplit_once('@') {
        Some((_, address)) => address,
        None => "<redacted>",
    }
}
