use async_trait::async_trait;
use hickory_resolver::TokioAsyncResolver;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::time::{Duration, Instant};

use crate::lookup::{NameResolver, sanitize_display};

/// How long a reverse lookup result is reused
const CACHE_TTL: Duration = Duration::from_secs(3600);

/// DNS cache entry
struct CacheEntry {
    hostname: Option<String>,
    cached_at: Instant,
}

/// System DNS resolver with a reverse-lookup cache
pub struct DnsLookup {
    resolver: TokioAsyncResolver,
    cache: RwLock<HashMap<Ipv4Addr, CacheEntry>>,
    cache_ttl: Duration,
}

impl DnsLookup {
    /// Use the system resolver configuration, falling back to defaults
    pub fn new() -> Self {
        let resolver = TokioAsyncResolver::tokio_from_system_conf().unwrap_or_else(|e| {
            tracing::debug!(error = %e, "system resolver config unavailable, using defaults");
            TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default())
        });

        Self {
            resolver,
            cache: RwLock::new(HashMap::new()),
            cache_ttl: CACHE_TTL,
        }
    }

    fn cached(&self, ip: Ipv4Addr) -> Option<Option<String>> {
        let cache = self.cache.read();
        cache
            .get(&ip)
            .filter(|entry| entry.cached_at.elapsed() < self.cache_ttl)
            .map(|entry| entry.hostname.clone())
    }
}

impl Default for DnsLookup {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NameResolver for DnsLookup {
    async fn lookup_host(&self, host: &str) -> Result<Vec<IpAddr>, String> {
        let lookup = self
            .resolver
            .lookup_ip(host)
            .await
            .map_err(|e| e.to_string())?;
        Ok(lookup.iter().collect())
    }

    async fn reverse_lookup(&self, ip: Ipv4Addr) -> Option<String> {
        if let Some(hit) = self.cached(ip) {
            return hit;
        }

        let hostname = match self.resolver.reverse_lookup(IpAddr::V4(ip)).await {
            Ok(lookup) => lookup.iter().next().map(|name| {
                // Remove trailing dot
                sanitize_display(name.to_string().trim_end_matches('.'))
            }),
            Err(e) => {
                tracing::trace!(%ip, error = %e, "reverse lookup failed");
                None
            }
        };

        self.cache.write().insert(
            ip,
            CacheEntry {
                hostname: hostname.clone(),
                cached_at: Instant::now(),
            },
        );

        hostname
    }
}
