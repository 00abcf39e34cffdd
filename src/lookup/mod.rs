pub mod rdns;
pub mod resolve;

pub use rdns::*;
pub use resolve::*;

use async_trait::async_trait;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

/// Name service used by a run: forward resolution of the target and
/// best-effort reverse lookups of hop addresses.
#[async_trait]
pub trait NameResolver: Send + Sync {
    /// All addresses the name resolves to, in resolver order
    async fn lookup_host(&self, host: &str) -> Result<Vec<IpAddr>, String>;

    /// PTR name for an address, if any
    async fn reverse_lookup(&self, ip: Ipv4Addr) -> Option<String>;
}

#[async_trait]
impl<T: NameResolver + ?Sized> NameResolver for Arc<T> {
    async fn lookup_host(&self, host: &str) -> Result<Vec<IpAddr>, String> {
        (**self).lookup_host(host).await
    }

    async fn reverse_lookup(&self, ip: Ipv4Addr) -> Option<String> {
        (**self).reverse_lookup(ip).await
    }
}

/// Sanitize a hostname for display by removing control characters.
pub(crate) fn sanitize_display(s: &str) -> String {
    s.chars().filter(|c| !c.is_control()).collect()
}
