//! Error types for the validator

use std::io;
use thiserror::Error;

/// Validator error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Tunnel launch error: {0}")]
    TunnelLaunch(String),

    #[error("Network probe error: {0}")]
    NetworkProbe(String),

    #[error("Browser probe error: {0}")]
    BrowserProbe(String),

    #[error("Cleanup error: {0}")]
    Cleanup(String),

    #[error("Timeout error: {0}")]
    Timeout(String),
}

impl Error {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }

    pub fn parse<S: Into<String>>(msg: S) -> Self {
        Error::Parse(msg.into())
    }

    pub fn tunnel_launch<S: Into<String>>(msg: S) -> Self {
        Error::TunnelLaunch(msg.into())
    }

    pub fn network_probe<S: Into<String>>(msg: S) -> Self {
        Error::NetworkProbe(msg.into())
    }

    pub fn browser_probe<S: Into<String>>(msg: S) -> Self {
        Error::BrowserProbe(msg.into())
    }

    pub fn cleanup<S: Into<String>>(msg: S) -> Self {
        Error::Cleanup(msg.into())
    }

    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        Error::Timeout(msg.into())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Error::Config(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Parse(e.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(e: tokio::time::error::Elapsed) -> Self {
        Error::Timeout(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Timeout(e.to_string())
        } else {
            Error::NetworkProbe(e.to_string())
        }
    }
}

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;
