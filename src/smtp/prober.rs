//! Picks the exchange host that answers for a domain.

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::time::timeout;
use tracing::{debug, info};

use super::connector::Connector;
use super::conversation::ProbeOutcome;
use super::negotiator::Negotiator;
use crate::config::VerifierConfig;
use crate::mx::ExchangeHost;

/// How candidate hosts are tried.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ProbeStrategy {
    /// Every candidate at once; the first host that connects wins.
    #[default]
    Race,
    /// One candidate at a time in priority order; stop at the first host that connects.
    Sequential,
}

/// Outcome of probing a domain, with the host it is attributable to.
#[derive(Clone, Debug)]
pub struct HostProbe {
    pub host: Option<ExchangeHost>,
    pub outcome: ProbeOutcome,
}

impl HostProbe {
    fn failed(detail: String) -> Self {
        Self {
            host: None,
            outcome: ProbeOutcome::failed(detail),
        }
    }
}

pub struct HostProber<'a> {
    negotiator: Negotiator<'a>,
    config: &'a VerifierConfig,
}

impl<'a> HostProber<'a> {
    pub fn new(connector: &'a dyn Connector, config: &'a VerifierConfig) -> Self {
        Self {
            negotiator: Negotiator::new(connector, config),
            config,
        }
    }

    /// Probes `recipient` against `hosts`, which must be sorted by priority
    /// and non-empty. The whole search is bounded by the race timeout;
    /// attempts still in flight when a winner is found or the deadline hits
    /// are dropped, closing their sockets.
    pub async fn probe(&self, hosts: &[ExchangeHost], recipient: &str) -> HostProbe {
        if hosts.is_empty() {
            return HostProbe::failed("no mail exchange found".to_string());
        }

        let search = async {
            match self.config.strategy {
                ProbeStrategy::Race => self.race(hosts, recipient).await,
                ProbeStrategy::Sequential => self.sequential(hosts, recipient).await,
            }
        };

        match timeout(self.config.race_timeout, search).await {
            Ok(probe) => probe,
            Err(_) => {
                debug!(recipient, "no exchange host answered before the deadline");
                HostProbe::failed(format!(
                    "timed out after {}ms waiting for mail exchanges",
                    self.config.race_timeout.as_millis()
                ))
            }
        }
    }

    async fn race(&self, hosts: &[ExchangeHost], recipient: &str) -> HostProbe {
        let mut attempts: FuturesUnordered<_> = hosts
            .iter()
            .map(|host| async move {
                let outcome = self.negotiator.probe(&host.hostname, recipient).await;
                (host, outcome)
            })
            .collect();

        let mut failures = Vec::with_capacity(hosts.len());
        while let Some((host, outcome)) = attempts.next().await {
            if outcome.connection_succeeded {
                info!(host = %host.hostname, recipient, "exchange host answered first");
                return HostProbe {
                    host: Some(host.clone()),
                    outcome,
                };
            }
            failures.push(describe_failure(host, &outcome));
        }

        HostProbe::failed(unreachable_detail(&failures))
    }

    async fn sequential(&self, hosts: &[ExchangeHost], recipient: &str) -> HostProbe {
        let mut failures = Vec::with_capacity(hosts.len());
        for host in hosts {
            let outcome = self.negotiator.probe(&host.hostname, recipient).await;
            if outcome.connection_succeeded {
                info!(host = %host.hostname, recipient, "exchange host answered");
                return HostProbe {
                    host: Some(host.clone()),
                    outcome,
                };
            }
            failures.push(describe_failure(host, &outcome));
        }

        HostProbe::failed(unreachable_detail(&failures))
    }
}

fn describe_failure(host: &ExchangeHost, outcome: &ProbeOutcome) -> String {
    format!(
        "{}: {}",
        host.hostname,
        outcome
            .error_detail
            .as_deref()
            .unwrap_or("connection failed")
    )
}

fn unreachable_detail(failures: &[String]) -> String {
    format!(
        "could not connect to any mail exchange ({})",
        failures.join("; ")
    )
}
