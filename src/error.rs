//! Error types for MTR runs.

use std::net::IpAddr;
use thiserror::Error;

/// Fatal errors that stop a run before (or instead of) producing results.
///
/// Per-probe failures never surface here; they are counted as lost packets.
#[derive(Error, Debug)]
pub enum MtrError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to resolve target {target}: {reason}")]
    Resolve { target: String, reason: String },

    #[error("Target {target} resolved to {addr}, but only IPv4 is supported")]
    NoIpv4Address { target: String, addr: IpAddr },

    #[error(
        "Insufficient permissions for raw ICMP sockets.\n\n\
         Fix options:\n\
         \u{2022} Run with sudo: sudo hoptrace <target>\n\
         \u{2022} Add capability: sudo setcap cap_net_raw+ep {binary}"
    )]
    Permission { binary: String },

    #[error("Failed to create raw ICMP socket: {0}")]
    Socket(#[source] std::io::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl MtrError {
    /// Build the error for a failed raw socket open, pointing at privileges when
    /// that is the likely cause.
    pub fn from_socket_open(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => {
                let binary = std::env::current_exe()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|_| "hoptrace".to_string());
                MtrError::Permission { binary }
            }
            _ => MtrError::Socket(err),
        }
    }
}
