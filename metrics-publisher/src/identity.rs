//! Host identity resolution for the publisher
//!
//! The identity is resolved once at startup and then passed by value into the
//! publisher loop. Every record carries it, so failing to resolve it is fatal.

use if_addrs::get_if_addrs;
use std::net::{IpAddr, Ipv4Addr};
use tracing::{debug, info};

/// Stable identity of the reporting host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostIdentity {
    pub ip: Ipv4Addr,
    pub hostname: String,
}

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("failed to enumerate network interfaces: {0}")]
    Interfaces(#[source] std::io::Error),
    #[error("no non-loopback IPv4 address found")]
    NoAddress,
    #[error("hostname is empty or not valid UTF-8")]
    Hostname,
}

impl HostIdentity {
    pub fn new(ip: Ipv4Addr, hostname: impl Into<String>) -> Self {
        Self {
            ip,
            hostname: hostname.into(),
        }
    }

    /// Resolve hostname + first non-loopback IPv4 from the OS
    pub fn resolve() -> Result<Self, IdentityError> {
        let interfaces = get_if_addrs().map_err(IdentityError::Interfaces)?;
        for iface in &interfaces {
            debug!("Found interface: {} ({})", iface.name, iface.ip());
        }

        let ip = first_non_loopback_ipv4(interfaces.iter().map(|i| i.ip()))
            .ok_or(IdentityError::NoAddress)?;

        let hostname = gethostname::gethostname()
            .into_string()
            .map_err(|_| IdentityError::Hostname)?;
        if hostname.trim().is_empty() {
            return Err(IdentityError::Hostname);
        }

        info!(host_ip = %ip, hostname = %hostname, "Host identity resolved");
        Ok(Self::new(ip, hostname))
    }
}

/// First IPv4 address that is not loopback, in enumeration order
pub fn first_non_loopback_ipv4<I>(addrs: I) -> Option<Ipv4Addr>
where
    I: IntoIterator<Item = IpAddr>,
{
    addrs.into_iter().find_map(|ip| match ip {
        IpAddr::V4(v4) if !v4.is_loopback() => Some(v4),
        _ => None,
    })
}
