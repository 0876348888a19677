use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

use crate::mx::ExchangeHost;
use crate::smtp::{ProbeOutcome, Protocol};

/// Reported in place of a result whose verification task died.
pub const FAILED_TO_VALIDATE: &str = "Failed to validate email";

pub const NO_EXCHANGE_FOUND: &str = "no mail exchange found";

// Final answer for one address
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub email: String,
    pub email_format_is_valid: bool,
    pub connection_succeeded: bool,
    pub inbox_exists: bool,
    pub uses_catch_all: bool,
    pub protocol: Option<Protocol>,
    pub is_temporary_error: bool,
    pub error: Option<String>,
    /// Exchange host the SMTP findings came from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exchange: Option<String>,
}

impl VerificationResult {
    fn negative(email: &str) -> Self {
        Self {
            email: email.to_string(),
            email_format_is_valid: false,
            connection_succeeded: false,
            inbox_exists: false,
            uses_catch_all: false,
            protocol: None,
            is_temporary_error: false,
            error: None,
            exchange: None,
        }
    }

    pub fn malformed(email: &str) -> Self {
        Self::negative(email)
    }

    pub fn no_exchange(email: &str) -> Self {
        Self {
            email_format_is_valid: true,
            error: Some(NO_EXCHANGE_FOUND.to_string()),
            ..Self::negative(email)
        }
    }

    pub fn internal_failure(email: &str) -> Self {
        Self {
            error: Some(FAILED_TO_VALIDATE.to_string()),
            ..Self::negative(email)
        }
    }

    // Fold the winning probe (and the catch-all verdict) into the result
    pub fn from_probe(
        email: &str,
        host: Option<&ExchangeHost>,
        outcome: ProbeOutcome,
        uses_catch_all: bool,
    ) -> Self {
        Self {
            email: email.to_string(),
            email_format_is_valid: true,
            connection_succeeded: outcome.connection_succeeded,
            inbox_exists: outcome.inbox_exists,
            uses_catch_all: uses_catch_all && outcome.inbox_exists,
            protocol: outcome.protocol_used,
            is_temporary_error: outcome.is_temporary_error,
            error: outcome.error_detail,
            exchange: host.map(|h| h.hostname.clone()),
        }
    }

    // Stopped at MX resolution, before any socket was opened
    pub fn found_no_exchange(&self) -> bool {
        self.email_format_is_valid
            && !self.connection_succeeded
            && self.exchange.is_none()
            && self.error.as_deref() == Some(NO_EXCHANGE_FOUND)
    }

    pub fn verdict(&self) -> Verdict {
        if !self.email_format_is_valid {
            Verdict::Malformed
        } else if self.inbox_exists && self.uses_catch_all {
            Verdict::CatchAll
        } else if self.inbox_exists {
            Verdict::Deliverable
        } else if self.connection_succeeded && !self.is_temporary_error {
            Verdict::Undeliverable
        } else {
            Verdict::Unknown
        }
    }
}

/// One-word summary of a [`VerificationResult`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Verdict {
    /// The server accepted the recipient and rejects made-up ones.
    Deliverable,
    /// The server accepted the recipient, but it accepts anything.
    CatchAll,
    /// The server answered and did not accept the recipient.
    Undeliverable,
    /// No server could be asked, or it only deferred.
    Unknown,
    Malformed,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deliverable => write!(f, "DELIVERABLE"),
            Self::CatchAll => write!(f, "CATCH-ALL"),
            Self::Undeliverable => write!(f, "UNDELIVERABLE"),
            Self::Unknown => write!(f, "UNKNOWN"),
            Self::Malformed => write!(f, "MALFORMED"),
        }
    }
}

impl Serialize for Verdict {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connected() -> ProbeOutcome {
        ProbeOutcome {
            connection_succeeded: true,
            protocol_used: Some(Protocol::Esmtp),
            ..ProbeOutcome::default()
        }
    }

    #[test]
    fn malformed_is_all_negative() {
        let result = VerificationResult::malformed("nope");
        assert!(!result.email_format_is_valid);
        assert!(!result.connection_succeeded);
        assert!(!result.inbox_exists);
        assert!(!result.uses_catch_all);
        assert_eq!(result.verdict(), Verdict::Malformed);
    }

    #[test]
    fn no_exchange_keeps_format_validity() {
        let result = VerificationResult::no_exchange("user@example.com");
        assert!(result.email_format_is_valid);
        assert!(!result.connection_succeeded);
        assert_eq!(result.error.as_deref(), Some(NO_EXCHANGE_FOUND));
        assert_eq!(result.verdict(), Verdict::Unknown);
    }

    #[test]
    fn verdicts_from_probe() {
        let host = ExchangeHost::new("mx.example.com", 10);

        let deliverable = ProbeOutcome {
            inbox_exists: true,
            ..connected()
        };
        let result =
            VerificationResult::from_probe("a@example.com", Some(&host), deliverable.clone(), false);
        assert_eq!(result.verdict(), Verdict::Deliverable);
        assert_eq!(result.exchange.as_deref(), Some("mx.example.com"));
        assert_eq!(result.protocol, Some(Protocol::Esmtp));

        let result = VerificationResult::from_probe("a@example.com", Some(&host), deliverable, true);
        assert_eq!(result.verdict(), Verdict::CatchAll);

        let rejected = ProbeOutcome {
            error_detail: Some("mailbox rejected: 550 no such user".to_string()),
            ..connected()
        };
        let result = VerificationResult::from_probe("a@example.com", Some(&host), rejected, true);
        assert!(!result.uses_catch_all);
        assert_eq!(result.verdict(), Verdict::Undeliverable);

        let deferred = ProbeOutcome {
            is_temporary_error: true,
            ..connected()
        };
        let result = VerificationResult::from_probe("a@example.com", Some(&host), deferred, false);
        assert_eq!(result.verdict(), Verdict::Unknown);
    }

    #[test]
    fn serialized_field_names() {
        let result = VerificationResult::internal_failure("a@example.com");
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["email"], "a@example.com");
        assert_eq!(json["error"], FAILED_TO_VALIDATE);
        assert_eq!(json["email_format_is_valid"], false);
        assert_eq!(json["uses_catch_all"], false);
        assert!(json["protocol"].is_null());
        assert!(json.get("exchange").is_none());
    }
}
