use tokio::time::sleep;
use tracing::debug;

use super::connector::Connector;
use super::conversation::{Greeting, ProbeOutcome, SmtpConversation};
use crate::config::VerifierConfig;

// Opens with EHLO and falls back to HELO once, on a fresh socket, when the
// extended attempt died before reaching MAIL FROM.
pub struct Negotiator<'a> {
    connector: &'a dyn Connector,
    config: &'a VerifierConfig,
}

impl<'a> Negotiator<'a> {
    pub fn new(connector: &'a dyn Connector, config: &'a VerifierConfig) -> Self {
        Self { connector, config }
    }

    pub async fn probe(&self, host: &str, recipient: &str) -> ProbeOutcome {
        let extended = SmtpConversation::new(self.connector, self.config, host)
            .run(Greeting::Extended, recipient)
            .await;

        if !extended.failed_before_sender() {
            return extended;
        }

        let extended_error = extended
            .error_detail
            .unwrap_or_else(|| "unknown error".to_string());
        debug!(host, "EHLO attempt failed ({extended_error}), retrying with HELO");

        sleep(self.config.fallback_delay).await;

        let basic = SmtpConversation::new(self.connector, self.config, host)
            .run(Greeting::Basic, recipient)
            .await;

        if !basic.failed_before_sender() {
            return basic;
        }

        let basic_error = basic
            .error_detail
            .unwrap_or_else(|| "unknown error".to_string());
        ProbeOutcome::failed(format!(
            "EHLO attempt failed ({extended_error}); HELO attempt failed ({basic_error})"
        ))
    }
}
