use rand::RngCore;
use std::fmt::Write;
use tracing::{info, warn};

use super::connector::Connector;
use super::negotiator::Negotiator;
use crate::config::VerifierConfig;
use crate::mx::ExchangeHost;

/// Produces the address used to test whether a domain accepts anything.
pub trait ProbeAddressGenerator: Send + Sync {
    fn probe_address(&self, domain: &str) -> String;
}

// Hex-encoded random bytes from the thread-local CSPRNG as the local part
#[derive(Clone, Copy, Debug)]
pub struct RandomProbeAddress {
    bytes: usize,
}

impl RandomProbeAddress {
    pub const MIN_BYTES: usize = 8;

    pub fn new(bytes: usize) -> Self {
        Self {
            bytes: bytes.max(Self::MIN_BYTES),
        }
    }
}

impl Default for RandomProbeAddress {
    fn default() -> Self {
        Self { bytes: 20 }
    }
}

impl ProbeAddressGenerator for RandomProbeAddress {
    fn probe_address(&self, domain: &str) -> String {
        let mut raw = vec![0u8; self.bytes];
        rand::thread_rng().fill_bytes(&mut raw);

        let mut local = String::with_capacity(self.bytes * 2);
        for byte in &raw {
            let _ = write!(local, "{byte:02x}");
        }
        format!("{local}@{domain}")
    }
}

/// Re-probes a host that already accepted a recipient, this time with an
/// address nobody owns. If that is accepted too, the domain is catch-all.
pub struct CatchAllDetector<'a> {
    negotiator: Negotiator<'a>,
    generator: &'a dyn ProbeAddressGenerator,
}

impl<'a> CatchAllDetector<'a> {
    pub fn new(
        connector: &'a dyn Connector,
        config: &'a VerifierConfig,
        generator: &'a dyn ProbeAddressGenerator,
    ) -> Self {
        Self {
            negotiator: Negotiator::new(connector, config),
            generator,
        }
    }

    // Only meaningful after the primary probe on `host` found the inbox.
    // A failed probe counts as "not catch-all".
    pub async fn detect(&self, host: &ExchangeHost, domain: &str) -> bool {
        let probe_address = self.generator.probe_address(domain);
        let outcome = self
            .negotiator
            .probe(&host.hostname, &probe_address)
            .await;

        if !outcome.connection_succeeded {
            warn!(
                host = %host.hostname,
                domain,
                "catch-all detection failed: {}",
                outcome.error_detail.as_deref().unwrap_or("connection failed")
            );
            return false;
        }

        if outcome.inbox_exists {
            info!(host = %host.hostname, domain, "domain accepts any recipient");
        } else {
            info!(host = %host.hostname, domain, "domain does not use catch-all");
        }
        outcome.inbox_exists
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_address_shape() {
        let address = RandomProbeAddress::default().probe_address("example.com");
        let (local, domain) = address.split_once('@').unwrap();
        assert_eq!(domain, "example.com");
        assert_eq!(local.len(), 40);
        assert!(local.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn addresses_differ() {
        let generator = RandomProbeAddress::default();
        assert_ne!(
            generator.probe_address("example.com"),
            generator.probe_address("example.com")
        );
    }

    #[test]
    fn minimum_length_enforced() {
        let address = RandomProbeAddress::new(2).probe_address("example.com");
        assert_eq!(address.split_once('@').unwrap().0.len(), 16);
    }
}
