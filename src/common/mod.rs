//! Common utilities and types

pub mod error;
pub mod port_pool;

pub use error::{Error, Result};
pub use port_pool::{PortLease, PortPool};
