//! Mailbox verification over SMTP without sending mail.
//!
//! An address is checked by resolving its domain's exchange hosts, walking
//! a server through `EHLO`/`HELO`, `MAIL FROM` and `RCPT TO`, and reading
//! the answer to the recipient. A second probe with a random local part
//! tells whether the domain accepts any recipient at all.

pub mod api;
pub mod batch;
pub mod config;
pub mod error;
pub mod format;
pub mod logging;
pub mod mx;
pub mod result;
pub mod smtp;
pub mod verifier;

pub use batch::{verify_batch, verify_batch_with};
pub use config::{DEFAULT_IDENTITY, MAX_BATCH_SIZE, VerifierConfig, resolve_identity};
pub use error::{ApiError, BatchError};
pub use mx::{DnsMxResolver, ExchangeHost, MxCache, MxResolver};
pub use result::{Verdict, VerificationResult};
pub use smtp::{
    Connector, ProbeAddressGenerator, ProbeOutcome, ProbeStrategy, Protocol, RandomProbeAddress,
    TcpConnector,
};
pub use verifier::Verifier;
