//! Single-address verification.

use std::sync::Arc;
use tracing::{debug, info};

use crate::config::VerifierConfig;
use crate::format::{domain_of, is_valid_address};
use crate::mx::{MxResolver, sort_by_priority};
use crate::result::VerificationResult;
use crate::smtp::{
    CatchAllDetector, Connector, HostProber, ProbeAddressGenerator, RandomProbeAddress,
    TcpConnector,
};

/// Runs format check, MX lookup, host probing and catch-all detection for
/// one address, stopping at the first stage that settles the answer.
///
/// Cheap to clone; every clone shares the same collaborators.
#[derive(Clone)]
pub struct Verifier {
    config: Arc<VerifierConfig>,
    resolver: Arc<dyn MxResolver>,
    connector: Arc<dyn Connector>,
    generator: Arc<dyn ProbeAddressGenerator>,
}

impl Verifier {
    pub fn new(config: VerifierConfig, resolver: Arc<dyn MxResolver>) -> Self {
        Self {
            config: Arc::new(config),
            resolver,
            connector: Arc::new(TcpConnector),
            generator: Arc::new(RandomProbeAddress::default()),
        }
    }

    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = connector;
        self
    }

    pub fn with_generator(mut self, generator: Arc<dyn ProbeAddressGenerator>) -> Self {
        self.generator = generator;
        self
    }

    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    pub async fn verify(&self, email: &str) -> VerificationResult {
        let email = email.trim();

        let domain = match domain_of(email) {
            Some(domain) if is_valid_address(email) => domain,
            _ => {
                debug!(email, "rejected by format check");
                return VerificationResult::malformed(email);
            }
        };

        let mut hosts = self.resolver.resolve(domain).await;
        if hosts.is_empty() {
            debug!(email, domain, "no mail exchange found");
            return VerificationResult::no_exchange(email);
        }
        sort_by_priority(&mut hosts);

        let prober = HostProber::new(self.connector.as_ref(), &self.config);
        let probe = prober.probe(&hosts, email).await;

        let uses_catch_all = match &probe.host {
            Some(host) if probe.outcome.inbox_exists && !probe.outcome.is_temporary_error => {
                CatchAllDetector::new(
                    self.connector.as_ref(),
                    &self.config,
                    self.generator.as_ref(),
                )
                .detect(host, domain)
                .await
            }
            _ => false,
        };

        let result =
            VerificationResult::from_probe(email, probe.host.as_ref(), probe.outcome, uses_catch_all);
        info!(email, verdict = %result.verdict(), "verification finished");
        result
    }
}
