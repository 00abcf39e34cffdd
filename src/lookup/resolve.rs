use std::net::{IpAddr, Ipv4Addr};

use crate::error::MtrError;
use crate::lookup::NameResolver;

/// Resolve the configured target to the single IPv4 address a run probes
///
/// IP literals are used as-is. Hostnames prefer the first IPv4 answer.
pub async fn resolve_target<R>(target: &str, resolver: &R) -> Result<Ipv4Addr, MtrError>
where
    R: NameResolver + ?Sized,
{
    let target = target.trim();

    // Try parsing as IP address first
    if let Ok(ip) = target.parse::<IpAddr>() {
        return match ip {
            IpAddr::V4(v4) => Ok(v4),
            IpAddr::V6(_) => Err(MtrError::NoIpv4Address {
                target: target.to_string(),
                addr: ip,
            }),
        };
    }

    let addrs = resolver
        .lookup_host(target)
        .await
        .map_err(|reason| MtrError::Resolve {
            target: target.to_string(),
            reason,
        })?;

    if let Some(v4) = addrs.iter().find_map(|ip| match ip {
        IpAddr::V4(v4) => Some(*v4),
        IpAddr::V6(_) => None,
    }) {
        return Ok(v4);
    }

    match addrs.first() {
        Some(&addr) => Err(MtrError::NoIpv4Address {
            target: target.to_string(),
            addr,
        }),
        None => Err(MtrError::Resolve {
            target: target.to_string(),
            reason: "no addresses found".to_string(),
        }),
    }
}
