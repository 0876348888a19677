//! Mail-exchange lookup for a domain, with a TTL cache in front of DNS.

use futures::future::BoxFuture;
use hickory_resolver::TokioAsyncResolver;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// A host advertised as accepting mail for a domain. Lower priority is preferred.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExchangeHost {
    pub hostname: String,
    pub priority: u16,
}

impl ExchangeHost {
    pub fn new(hostname: impl Into<String>, priority: u16) -> Self {
        Self {
            hostname: hostname.into(),
            priority,
        }
    }
}

// Ascending priority; ties keep the resolver's order
pub fn sort_by_priority(hosts: &mut [ExchangeHost]) {
    hosts.sort_by_key(|host| host.priority);
}

/// Looks up the exchange hosts of a domain.
///
/// Returns an empty list when the domain has no records or the lookup
/// fails; resolution problems are never surfaced as errors.
pub trait MxResolver: Send + Sync {
    fn resolve<'a>(&'a self, domain: &'a str) -> BoxFuture<'a, Vec<ExchangeHost>>;
}

struct CachedHosts {
    hosts: Vec<ExchangeHost>,
    stored_at: Instant,
}

/// Domain-keyed cache of successful lookups.
///
/// Entries expire after `ttl`. When `capacity` is reached, expired entries
/// are purged first and then the oldest entry is evicted.
pub struct MxCache {
    ttl: Duration,
    capacity: usize,
    entries: Mutex<HashMap<String, CachedHosts>>,
}

impl MxCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity: capacity.max(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, domain: &str) -> Option<Vec<ExchangeHost>> {
        let key = domain.to_ascii_lowercase();
        let mut entries = self.entries.lock();
        match entries.get(&key) {
            Some(entry) if entry.stored_at.elapsed() < self.ttl => Some(entry.hosts.clone()),
            Some(_) => {
                entries.remove(&key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, domain: &str, hosts: Vec<ExchangeHost>) {
        let key = domain.to_ascii_lowercase();
        let mut entries = self.entries.lock();

        if entries.len() >= self.capacity && !entries.contains_key(&key) {
            let ttl = self.ttl;
            entries.retain(|_, entry| entry.stored_at.elapsed() < ttl);

            if entries.len() >= self.capacity {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, entry)| entry.stored_at)
                    .map(|(domain, _)| domain.clone());
                if let Some(oldest) = oldest {
                    entries.remove(&oldest);
                }
            }
        }

        entries.insert(
            key,
            CachedHosts {
                hosts,
                stored_at: Instant::now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

// MX lookups through hickory, consulting the shared cache first
pub struct DnsMxResolver {
    resolver: TokioAsyncResolver,
    cache: Arc<MxCache>,
}

impl DnsMxResolver {
    // Uses the system resolver configuration, or public defaults if it can't be read
    pub fn new(cache: Arc<MxCache>) -> Self {
        let resolver = TokioAsyncResolver::tokio_from_system_conf().unwrap_or_else(|e| {
            warn!("system resolver configuration unavailable ({e}), using defaults");
            TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default())
        });
        Self { resolver, cache }
    }

    pub fn with_config(config: ResolverConfig, opts: ResolverOpts, cache: Arc<MxCache>) -> Self {
        Self {
            resolver: TokioAsyncResolver::tokio(config, opts),
            cache,
        }
    }

    async fn lookup(&self, domain: &str) -> Vec<ExchangeHost> {
        if let Some(hosts) = self.cache.get(domain) {
            debug!(domain, "MX cache hit");
            return hosts;
        }

        match self.resolver.mx_lookup(domain).await {
            Ok(lookup) => {
                let hosts: Vec<ExchangeHost> = lookup
                    .iter()
                    .map(|mx| {
                        ExchangeHost::new(
                            mx.exchange().to_utf8().trim_end_matches('.'),
                            mx.preference(),
                        )
                    })
                    .filter(|host| !host.hostname.is_empty())
                    .collect();
                debug!(domain, "resolved {} MX record(s)", hosts.len());
                if !hosts.is_empty() {
                    self.cache.insert(domain, hosts.clone());
                }
                hosts
            }
            Err(e) => {
                warn!(domain, "MX lookup failed: {e}");
                Vec::new()
            }
        }
    }
}

impl MxResolver for DnsMxResolver {
    fn resolve<'a>(&'a self, domain: &'a str) -> BoxFuture<'a, Vec<ExchangeHost>> {
        Box::pin(self.lookup(domain))
    }
}
