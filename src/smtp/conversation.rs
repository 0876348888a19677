//! One SMTP conversation against one exchange host.
//!
//! The protocol logic lives in [`Conversation`], a state machine that is fed
//! [`Event`]s and answers with the next [`Action`]. [`SmtpConversation`] owns
//! the socket and drives it. Keeping the two apart lets the state machine be
//! exercised without a network, and gives completion a single owner: once the
//! machine has settled, further events are ignored.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{self, ErrorKind};
use std::time::Duration;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufStream,
};
use tokio::time::timeout;
use tracing::debug;

use super::connector::Connector;
use super::reply::{ReplyClass, Stage, classify, first_line, reply_code};
use crate::config::VerifierConfig;

pub const TEMPORARY_ERROR_MESSAGE: &str = "Temporary error occurred. The email might be valid, but we couldn't confirm it at this time.";

// Bound on the best-effort QUIT and socket shutdown once the outcome is known
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Longest reply line accepted, CRLF included.
pub const MAX_REPLY_LINE: usize = 512;

/// Stand-in reply for a line over [`MAX_REPLY_LINE`]. It has no code, so it
/// classifies as unexpected at every stage.
pub const OVERLONG_REPLY: &str = "reply line too long";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Protocol {
    #[serde(rename = "ESMTP")]
    Esmtp,
    #[serde(rename = "SMTP")]
    Smtp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Esmtp => write!(f, "ESMTP"),
            Self::Smtp => write!(f, "SMTP"),
        }
    }
}

/// Greeting verb a conversation opens with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Greeting {
    /// `EHLO`
    Extended,
    /// `HELO`
    Basic,
}

impl Greeting {
    pub fn verb(self) -> &'static str {
        match self {
            Self::Extended => "EHLO",
            Self::Basic => "HELO",
        }
    }

    pub fn protocol(self) -> Protocol {
        match self {
            Self::Extended => Protocol::Esmtp,
            Self::Basic => Protocol::Smtp,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConversationState {
    AwaitBanner,
    GreetingSent,
    SenderSent,
    RecipientSent,
    Closing,
    Done,
}

impl ConversationState {
    // Stage whose reply is awaited in this state
    fn stage(self) -> Option<Stage> {
        match self {
            Self::AwaitBanner => Some(Stage::Banner),
            Self::GreetingSent => Some(Stage::Greeting),
            Self::SenderSent => Some(Stage::Sender),
            Self::RecipientSent => Some(Stage::Recipient),
            Self::Closing | Self::Done => None,
        }
    }
}

/// Result of one complete conversation attempt.
///
/// `inbox_exists` implies `connection_succeeded`; `is_temporary_error`
/// implies `!inbox_exists`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeOutcome {
    pub connection_succeeded: bool,
    pub inbox_exists: bool,
    pub protocol_used: Option<Protocol>,
    pub is_temporary_error: bool,
    pub error_detail: Option<String>,
    /// State the conversation was in when it failed, if it did.
    #[serde(skip)]
    pub failed_in: Option<ConversationState>,
}

impl ProbeOutcome {
    pub fn failed(detail: impl Into<String>) -> Self {
        Self {
            error_detail: Some(detail.into()),
            ..Self::default()
        }
    }

    // True when the attempt never got past the greeting: no socket, no
    // banner, or the greeting itself was refused or timed out.
    pub fn failed_before_sender(&self) -> bool {
        !self.connection_succeeded || self.failed_in == Some(ConversationState::GreetingSent)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// A complete reply from the server.
    Reply(String),
    /// The idle timer of the current wait point fired.
    Timeout,
    /// The socket failed or was closed by the peer.
    Closed(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    /// Write this command and wait for the reply.
    Send(String),
    /// Write `QUIT` and wait for the closing reply.
    Quit,
    /// Write `QUIT` without waiting for anything; the outcome is settled.
    Abandon,
    /// Nothing left to do; the outcome is settled.
    Finish,
}

pub struct Conversation {
    state: ConversationState,
    greeting: Greeting,
    identity: String,
    sender: String,
    recipient: String,
    outcome: ProbeOutcome,
    settled: bool,
}

impl Conversation {
    pub fn new(greeting: Greeting, identity: &str, sender: &str, recipient: &str) -> Self {
        Self {
            state: ConversationState::AwaitBanner,
            greeting,
            identity: identity.to_string(),
            sender: sender.to_string(),
            recipient: recipient.to_string(),
            outcome: ProbeOutcome::default(),
            settled: false,
        }
    }

    pub fn state(&self) -> ConversationState {
        self.state
    }

    pub fn is_settled(&self) -> bool {
        self.settled
    }

    pub fn outcome(&self) -> &ProbeOutcome {
        &self.outcome
    }

    pub fn into_outcome(self) -> ProbeOutcome {
        self.outcome
    }

    /// Advances the state machine by one event.
    ///
    /// Events arriving after the outcome settled are no-ops that answer
    /// [`Action::Finish`] and leave the outcome untouched.
    pub fn dispatch(&mut self, event: Event) -> Action {
        if self.settled {
            return Action::Finish;
        }

        match (self.state, event) {
            (ConversationState::Closing, Event::Reply(reply)) => {
                if reply_code(&reply) == Some(221) {
                    debug!("connection closed gracefully");
                } else {
                    debug!("unexpected closing reply: {}", first_line(&reply));
                }
                self.settle()
            }
            (ConversationState::Closing, Event::Timeout | Event::Closed(_)) => self.settle(),
            (_, Event::Timeout) => {
                self.record_failure("timeout".to_string());
                self.settle();
                Action::Abandon
            }
            (_, Event::Closed(reason)) => {
                self.record_failure(reason);
                self.settle()
            }
            (state, Event::Reply(reply)) => {
                let Some(stage) = state.stage() else {
                    return self.settle();
                };
                self.on_reply(stage, &reply)
            }
        }
    }

    fn on_reply(&mut self, stage: Stage, reply: &str) -> Action {
        let class = classify(stage, reply);
        let line = first_line(reply);

        match stage {
            Stage::Banner if class == ReplyClass::Accepted => {
                self.outcome.connection_succeeded = true;
                self.state = ConversationState::GreetingSent;
                Action::Send(format!("{} {}", self.greeting.verb(), self.identity))
            }
            Stage::Greeting if class == ReplyClass::Accepted => {
                self.outcome.protocol_used = Some(self.greeting.protocol());
                self.state = ConversationState::SenderSent;
                Action::Send(format!("MAIL FROM:<{}>", self.sender))
            }
            Stage::Sender if class == ReplyClass::Accepted => {
                self.state = ConversationState::RecipientSent;
                Action::Send(format!("RCPT TO:<{}>", self.recipient))
            }
            Stage::Recipient => {
                match class {
                    ReplyClass::Accepted => self.outcome.inbox_exists = true,
                    ReplyClass::PermanentReject => {
                        debug!("recipient {} rejected", self.recipient);
                        self.outcome.error_detail = Some(format!("mailbox rejected: {line}"));
                    }
                    ReplyClass::TemporaryReject => {
                        self.outcome.is_temporary_error = true;
                        self.outcome.error_detail =
                            Some(format!("{TEMPORARY_ERROR_MESSAGE} ({line})"));
                    }
                    ReplyClass::Unexpected => {
                        self.record_failure(format!("unexpected reply to RCPT TO: {line}"));
                    }
                }
                self.close()
            }
            Stage::Banner => {
                self.record_failure(format!("unexpected banner: {line}"));
                self.close()
            }
            Stage::Greeting => {
                self.record_failure(format!("{} rejected: {line}", self.greeting.verb()));
                self.close()
            }
            Stage::Sender => {
                self.record_failure(format!("MAIL FROM rejected: {line}"));
                self.close()
            }
        }
    }

    fn record_failure(&mut self, detail: String) {
        self.outcome.failed_in = Some(self.state);
        self.outcome.error_detail = Some(detail);
    }

    fn close(&mut self) -> Action {
        self.state = ConversationState::Closing;
        Action::Quit
    }

    fn settle(&mut self) -> Action {
        self.state = ConversationState::Done;
        self.settled = true;
        Action::Finish
    }
}

/// Runs a [`Conversation`] over a real socket to `host`.
pub struct SmtpConversation<'a> {
    connector: &'a dyn Connector,
    config: &'a VerifierConfig,
    host: &'a str,
}

impl<'a> SmtpConversation<'a> {
    pub fn new(connector: &'a dyn Connector, config: &'a VerifierConfig, host: &'a str) -> Self {
        Self {
            connector,
            config,
            host,
        }
    }

    // Connect, then feed replies to the state machine until it settles.
    // Always yields exactly one outcome.
    pub async fn run(self, greeting: Greeting, recipient: &str) -> ProbeOutcome {
        let host = self.host;
        let idle = self.config.reply_timeout;

        let stream = match timeout(idle, self.connector.connect(host, self.config.port)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                debug!(host, "connect failed: {e}");
                return ProbeOutcome::failed(format!("connection to {host} failed: {e}"));
            }
            Err(_) => {
                debug!(host, "connect timed out");
                return ProbeOutcome::failed("timeout");
            }
        };
        debug!(host, "connected ({})", greeting.verb());

        let mut stream = BufStream::new(stream);
        let mut machine = Conversation::new(
            greeting,
            &self.config.identity,
            &self.config.sender_address(),
            recipient,
        );

        loop {
            let event = match timeout(idle, read_reply(&mut stream)).await {
                Ok(Ok(reply)) => {
                    debug!(host, "<-- {}", first_line(&reply));
                    Event::Reply(reply)
                }
                Ok(Err(e)) => Event::Closed(format!("connection to {host} lost: {e}")),
                Err(_) => Event::Timeout,
            };

            match machine.dispatch(event) {
                Action::Send(command) => {
                    if let Err(event) = send_command(&mut stream, host, &command, idle).await {
                        if machine.dispatch(event) == Action::Abandon {
                            let _ = send_command(&mut stream, host, "QUIT", CLOSE_TIMEOUT).await;
                        }
                        break;
                    }
                }
                Action::Quit => {
                    if let Err(event) = send_command(&mut stream, host, "QUIT", idle).await {
                        machine.dispatch(event);
                        break;
                    }
                }
                Action::Abandon => {
                    let _ = send_command(&mut stream, host, "QUIT", CLOSE_TIMEOUT).await;
                    break;
                }
                Action::Finish => break,
            }
        }

        let _ = timeout(CLOSE_TIMEOUT, stream.shutdown()).await;
        machine.into_outcome()
    }
}

// Write one command line, bounded by `limit`. A failure is reported as the
// event the state machine should see.
async fn send_command<S>(
    stream: &mut S,
    host: &str,
    command: &str,
    limit: Duration,
) -> Result<(), Event>
where
    S: AsyncWrite + Unpin,
{
    debug!(host, "--> {command}");
    let line = format!("{command}\r\n");
    let write = async {
        stream.write_all(line.as_bytes()).await?;
        stream.flush().await
    };
    match timeout(limit, write).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(Event::Closed(format!("connection to {host} lost: {e}"))),
        Err(_) => Err(Event::Timeout),
    }
}

/// Reads one complete reply: every `NNN-` continuation line up to and
/// including the final line. Lines are joined with `\n`.
///
/// Bytes are decoded lossily. A line longer than [`MAX_REPLY_LINE`] ends
/// the read with [`OVERLONG_REPLY`], which carries no reply code.
pub async fn read_reply<S>(stream: &mut S) -> io::Result<String>
where
    S: AsyncBufRead + Unpin,
{
    let mut lines: Vec<String> = Vec::new();
    let mut raw: Vec<u8> = Vec::with_capacity(MAX_REPLY_LINE);

    loop {
        raw.clear();
        let read = (&mut *stream)
            .take(MAX_REPLY_LINE as u64 + 1)
            .read_until(b'\n', &mut raw)
            .await?;
        if read == 0 {
            if lines.is_empty() {
                return Err(io::Error::new(
                    ErrorKind::UnexpectedEof,
                    "connection closed by server",
                ));
            }
            break;
        }
        if raw.len() > MAX_REPLY_LINE {
            debug!("reply line exceeds {MAX_REPLY_LINE} bytes");
            return Ok(OVERLONG_REPLY.to_string());
        }

        let line = String::from_utf8_lossy(&raw);
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        lines.push(trimmed.to_string());

        if !is_continuation(trimmed) {
            break;
        }
    }

    Ok(lines.join("\n"))
}

fn is_continuation(line: &str) -> bool {
    line.len() >= 4
        && line.chars().take(3).all(|c| c.is_ascii_digit())
        && line.chars().nth(3) == Some('-')
}
