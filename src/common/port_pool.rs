//! Local bind port allocation
//!
//! Every tunnel listens on a local port. A fixed port can only be held by
//! one trial at a time; ephemeral ports give each in-flight trial its own
//! address so candidates can be evaluated in parallel.

use crate::{Error, Result};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr, TcpListener};
use std::sync::Arc;
use tracing::debug;

/// Attempts to find an ephemeral port not already leased
const MAX_EPHEMERAL_ATTEMPTS: usize = 16;

/// Hands out local bind addresses for tunnels
#[derive(Clone)]
pub struct PortPool {
    host: IpAddr,
    fixed: Option<u16>,
    leased: Arc<Mutex<HashSet<u16>>>,
}

impl PortPool {
    /// Pool that always leases the same port
    pub fn fixed(host: IpAddr, port: u16) -> Self {
        PortPool {
            host,
            fixed: Some(port),
            leased: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Pool that allocates a fresh ephemeral port per lease
    pub fn ephemeral(host: IpAddr) -> Self {
        PortPool {
            host,
            fixed: None,
            leased: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Number of ports currently leased
    pub fn in_use(&self) -> usize {
        self.leased.lock().len()
    }

    /// Lease a bind address
    pub fn acquire(&self) -> Result<PortLease> {
        let port = match self.fixed {
            Some(port) => {
                if !self.leased.lock().insert(port) {
                    return Err(Error::tunnel_launch(format!(
                        "local port {} is already held by another tunnel",
                        port
                    )));
                }
                // A listener left over from another process would answer
                // readiness checks in place of our tunnel
                if let Err(e) = TcpListener::bind(SocketAddr::new(self.host, port)) {
                    self.leased.lock().remove(&port);
                    return Err(Error::tunnel_launch(format!(
                        "local port {} already in use: {}",
                        port, e
                    )));
                }
                port
            }
            None => self.acquire_ephemeral()?,
        };

        debug!("Leased local port {}", port);
        Ok(PortLease {
            addr: SocketAddr::new(self.host, port),
            leased: self.leased.clone(),
        })
    }

    fn acquire_ephemeral(&self) -> Result<u16> {
        for _ in 0..MAX_EPHEMERAL_ATTEMPTS {
            // The probe listener is dropped right away so the tunnel can bind
            let port = TcpListener::bind(SocketAddr::new(self.host, 0))?
                .local_addr()?
                .port();
            if self.leased.lock().insert(port) {
                return Ok(port);
            }
        }
        Err(Error::tunnel_launch("no free ephemeral port available"))
    }
}

/// A leased local address, returned to the pool on drop
#[derive(Debug)]
pub struct PortLease {
    addr: SocketAddr,
    leased: Arc<Mutex<HashSet<u16>>>,
}

impl PortLease {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }
}

impl Drop for PortLease {
    fn drop(&mut self) {
        self.leased.lock().remove(&self.addr.port());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    fn free_port() -> u16 {
        TcpListener::bind((LOCALHOST, 0)).unwrap().local_addr().unwrap().port()
    }

    #[test]
    fn test_fixed_port_is_exclusive() {
        let port = free_port();
        let pool = PortPool::fixed(LOCALHOST, port);
        let lease = pool.acquire().unwrap();
        assert_eq!(lease.port(), port);
        assert!(pool.acquire().is_err());

        drop(lease);
        assert!(pool.acquire().is_ok());
    }

    #[test]
    fn test_fixed_port_held_by_foreign_listener() {
        let foreign = TcpListener::bind((LOCALHOST, 0)).unwrap();
        let port = foreign.local_addr().unwrap().port();
        let pool = PortPool::fixed(LOCALHOST, port);

        match pool.acquire() {
            Err(Error::TunnelLaunch(msg)) => assert!(msg.contains("already in use"), "{}", msg),
            other => panic!("expected TunnelLaunch, got {:?}", other),
        }
        assert_eq!(pool.in_use(), 0);

        drop(foreign);
        assert!(pool.acquire().is_ok());
    }

    #[test]
    fn test_ephemeral_ports_are_distinct() {
        let pool = PortPool::ephemeral(LOCALHOST);
        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        assert_ne!(a.port(), b.port());
        assert_eq!(pool.in_use(), 2);

        drop(a);
        drop(b);
        assert_eq!(pool.in_use(), 0);
    }
}
