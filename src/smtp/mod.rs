//! The SMTP side of verification: reply classification, the per-socket
//! conversation, greeting fallback, host selection and catch-all detection.

pub mod catch_all;
pub mod connector;
pub mod conversation;
pub mod negotiator;
pub mod prober;
pub mod reply;

pub use catch_all::{CatchAllDetector, ProbeAddressGenerator, RandomProbeAddress};
pub use connector::{Connector, TcpConnector};
pub use conversation::{ConversationState, Greeting, ProbeOutcome, Protocol, SmtpConversation};
pub use negotiator::Negotiator;
pub use prober::{HostProbe, HostProber, ProbeStrategy};
pub use reply::{ReplyClass, Stage, classify};
