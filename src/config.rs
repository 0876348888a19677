//! Engine settings and the identity the prober presents to mail servers.

use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::smtp::prober::ProbeStrategy;

/// Identity used in `EHLO`/`HELO` and `MAIL FROM` when no resolvable name is available.
pub const DEFAULT_IDENTITY: &str = "mail.example.org";

/// Hard cap on addresses per batch request.
pub const MAX_BATCH_SIZE: usize = 100;

#[derive(Clone, Debug)]
pub struct VerifierConfig {
    /// Domain announced in the greeting and used for the sender address.
    pub identity: String,
    pub sender_local_part: String,
    pub port: u16,
    /// Idle timer armed at every wait point of a conversation.
    pub reply_timeout: Duration,
    /// Overall deadline for picking a host out of the exchange list.
    pub race_timeout: Duration,
    /// Pause between a rejected `EHLO` attempt and the `HELO` retry.
    pub fallback_delay: Duration,
    pub strategy: ProbeStrategy,
    pub max_batch_size: usize,
    pub mx_cache_ttl: Duration,
    pub mx_cache_capacity: usize,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            identity: DEFAULT_IDENTITY.to_string(),
            sender_local_part: "noreply".to_string(),
            port: 25,
            reply_timeout: Duration::from_secs(10),
            race_timeout: Duration::from_secs(10),
            fallback_delay: Duration::from_secs(1),
            strategy: ProbeStrategy::Race,
            max_batch_size: MAX_BATCH_SIZE,
            mx_cache_ttl: Duration::from_secs(300),
            mx_cache_capacity: 1024,
        }
    }
}

impl VerifierConfig {
    pub fn sender_address(&self) -> String {
        format!("{}@{}", self.sender_local_part, self.identity)
    }
}

// Pick the greeting identity: the requested name, else the machine hostname.
// Whatever is picked must resolve, otherwise the default identity is used.
pub async fn resolve_identity(requested: Option<&str>) -> String {
    let candidate = requested
        .map(str::to_string)
        .or_else(|| {
            hostname::get()
                .ok()
                .map(|h| h.to_string_lossy().to_string())
        })
        .map(|name| name.trim().trim_end_matches('.').to_string())
        .filter(|name| !name.is_empty());

    let Some(candidate) = candidate else {
        return DEFAULT_IDENTITY.to_string();
    };

    let lookup = timeout(
        Duration::from_secs(5),
        tokio::net::lookup_host((candidate.clone(), 25)),
    )
    .await;

    match lookup {
        Ok(Ok(mut addrs)) => {
            if addrs.next().is_some() {
                debug!(identity = %candidate, "using resolvable identity");
                candidate
            } else {
                warn!(identity = %candidate, "identity has no addresses, using {DEFAULT_IDENTITY}");
                DEFAULT_IDENTITY.to_string()
            }
        }
        Ok(Err(e)) => {
            warn!(identity = %candidate, "identity does not resolve ({e}), using {DEFAULT_IDENTITY}");
            DEFAULT_IDENTITY.to_string()
        }
        Err(_) => {
            warn!(identity = %candidate, "identity lookup timed out, using {DEFAULT_IDENTITY}");
            DEFAULT_IDENTITY.to_string()
        }
    }
}
