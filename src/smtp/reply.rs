//! Classification of SMTP replies by conversation stage.

use std::fmt;

// Point in the conversation a reply belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    Banner,
    Greeting,
    Sender,
    Recipient,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Banner => write!(f, "banner"),
            Self::Greeting => write!(f, "greeting"),
            Self::Sender => write!(f, "sender"),
            Self::Recipient => write!(f, "recipient"),
        }
    }
}

/// Semantic meaning of a server reply at a given stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplyClass {
    Accepted,
    PermanentReject,
    TemporaryReject,
    Unexpected,
}

// Extract the 3-digit leading code of a reply, if there is one
pub fn reply_code(reply: &str) -> Option<u16> {
    let reply = reply.trim_start();
    let code = reply.get(0..3)?;
    if !code.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    // "2500 ..." is not a reply code
    if reply[3..].chars().next().is_some_and(|c| c.is_ascii_digit()) {
        return None;
    }
    code.parse().ok()
}

/// Maps a raw server reply at `stage` to its meaning.
///
/// Total over all input: anything that is not one of the codes expected at
/// that stage (including text with no code at all) is `Unexpected`.
pub fn classify(stage: Stage, reply: &str) -> ReplyClass {
    let Some(code) = reply_code(reply) else {
        return ReplyClass::Unexpected;
    };

    match (stage, code) {
        (Stage::Banner, 220) => ReplyClass::Accepted,
        (Stage::Greeting | Stage::Sender | Stage::Recipient, 250) => ReplyClass::Accepted,
        (Stage::Recipient, 550 | 553) => ReplyClass::PermanentReject,
        (Stage::Recipient, 450..=452) => ReplyClass::TemporaryReject,
        _ => ReplyClass::Unexpected,
    }
}

// First line of a reply, trimmed, for error messages and logs
pub fn first_line(reply: &str) -> &str {
    reply.lines().next().unwrap_or(reply).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recipient_codes() {
        assert_eq!(
            classify(Stage::Recipient, "550 5.1.1 User unknown"),
            ReplyClass::PermanentReject
        );
        assert_eq!(
            classify(Stage::Recipient, "553 mailbox name not allowed"),
            ReplyClass::PermanentReject
        );
        assert_eq!(
            classify(Stage::Recipient, "452 4.2.2 Mailbox full"),
            ReplyClass::TemporaryReject
        );
        assert_eq!(
            classify(Stage::Recipient, "450 greylisted"),
            ReplyClass::TemporaryReject
        );
        assert_eq!(
            classify(Stage::Recipient, "451 try later"),
            ReplyClass::TemporaryReject
        );
        assert_eq!(
            classify(Stage::Recipient, "250 2.1.5 Ok"),
            ReplyClass::Accepted
        );
        assert_eq!(
            classify(Stage::Recipient, "251 User not local"),
            ReplyClass::Unexpected
        );
        assert_eq!(
            classify(Stage::Recipient, "554 relay denied"),
            ReplyClass::Unexpected
        );
    }

    #[test]
    fn handshake_codes() {
        assert_eq!(
            classify(Stage::Banner, "220 mx.example.com ESMTP"),
            ReplyClass::Accepted
        );
        assert_eq!(classify(Stage::Banner, "554 go away"), ReplyClass::Unexpected);
        assert_eq!(
            classify(Stage::Greeting, "250-mx.example.com\r\n250 SIZE"),
            ReplyClass::Accepted
        );
        assert_eq!(
            classify(Stage::Greeting, "502 5.5.2 Error: command not recognized"),
            ReplyClass::Unexpected
        );
        assert_eq!(classify(Stage::Sender, "250 2.1.0 Ok"), ReplyClass::Accepted);
        // Rejections only carry meaning at the recipient stage
        assert_eq!(classify(Stage::Sender, "550 no"), ReplyClass::Unexpected);
        assert_eq!(classify(Stage::Greeting, "450 busy"), ReplyClass::Unexpected);
    }

    #[test]
    fn garbage_is_unexpected() {
        for stage in [Stage::Banner, Stage::Greeting, Stage::Sender, Stage::Recipient] {
            assert_eq!(classify(stage, ""), ReplyClass::Unexpected);
            assert_eq!(classify(stage, "hello"), ReplyClass::Unexpected);
            assert_eq!(classify(stage, "25"), ReplyClass::Unexpected);
            assert_eq!(classify(stage, "2500 Ok"), ReplyClass::Unexpected);
        }
    }

    #[test]
    fn reply_code_parsing() {
        assert_eq!(reply_code("250 ok"), Some(250));
        assert_eq!(reply_code("250-multi"), Some(250));
        assert_eq!(reply_code("220"), Some(220));
        assert_eq!(reply_code("  421 closing\r\n"), Some(421));
        assert_eq!(reply_code("abc"), None);
        assert_eq!(first_line("250-a\r\n250 b\r\n"), "250-a");
    }
}
