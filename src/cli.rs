use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

use inboxprobe::{ProbeStrategy, VerifierConfig};

#[derive(Parser, Debug)]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(
    about = "Check whether email addresses have a mailbox, without sending mail",
    long_about = "Resolves each domain's mail exchanges, walks a server through the SMTP handshake up to RCPT TO and reports whether the recipient was accepted. A second probe with a random address detects catch-all domains."
)]
pub struct Cli {
    /// Email address or path to a file of addresses
    #[arg(help = "Single email address or path to a file with one address per line")]
    pub address: String,

    // Identity Parameters
    /// Domain announced in EHLO/HELO and used for MAIL FROM. Must resolve.
    #[arg(short = 'l', long, env = "INBOXPROBE_HELO")]
    pub helo: Option<String>,

    /// Local part of the MAIL FROM address
    #[arg(short = 'f', long, env = "INBOXPROBE_SENDER", default_value = "noreply")]
    pub sender: String,

    // Connection and Network Settings
    /// SMTP port on the exchange hosts
    #[arg(long, env = "INBOXPROBE_PORT", default_value = "25")]
    pub port: u16,

    /// Idle timeout per server reply in seconds
    #[arg(long, env = "INBOXPROBE_TIMEOUT", default_value = "10")]
    pub timeout: u64,

    /// Overall timeout for finding a responsive exchange host, in seconds
    #[arg(long, env = "INBOXPROBE_RACE_TIMEOUT", default_value = "10")]
    pub race_timeout: u64,

    /// Pause before retrying with HELO after EHLO failed, in milliseconds
    #[arg(long, env = "INBOXPROBE_FALLBACK_DELAY", default_value = "1000")]
    pub fallback_delay: u64,

    /// How exchange hosts are tried
    #[arg(long, value_enum, env = "INBOXPROBE_STRATEGY", default_value = "race")]
    pub strategy: Strategy,

    /// Lifetime of cached MX lookups in seconds
    #[arg(long, env = "INBOXPROBE_MX_CACHE_TTL", default_value = "300")]
    pub mx_cache_ttl: u64,

    // Output and Display Options
    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "standard")]
    pub output: OutputFormat,

    /// Verbose output mode (protocol transcript on stderr)
    #[arg(short, long)]
    pub verbose: bool,

    /// Colorful output (disable for logging to files)
    #[arg(short = 'C', long="no-color", default_value = "true", action=clap::ArgAction::SetFalse)]
    pub is_color: bool,

    /// Output file for results
    #[arg(long)]
    pub output_file: Option<PathBuf>,
}

impl Cli {
    pub fn verifier_config(&self, identity: String) -> VerifierConfig {
        VerifierConfig {
            identity,
            sender_local_part: self.sender.clone(),
            port: self.port,
            reply_timeout: Duration::from_secs(self.timeout),
            race_timeout: Duration::from_secs(self.race_timeout),
            fallback_delay: Duration::from_millis(self.fallback_delay),
            strategy: self.strategy.into(),
            mx_cache_ttl: Duration::from_secs(self.mx_cache_ttl),
            ..VerifierConfig::default()
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, ValueEnum)]
pub enum Strategy {
    /// Probe every exchange host at once and keep the first that answers
    Race,
    /// Probe exchange hosts one by one in priority order
    Sequential,
}

impl From<Strategy> for ProbeStrategy {
    fn from(strategy: Strategy) -> Self {
        match strategy {
            Strategy::Race => Self::Race,
            Strategy::Sequential => Self::Sequential,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, ValueEnum)]
pub enum OutputFormat {
    /// Standard colored output
    Standard,
    /// JSON format
    Json,
    /// CSV format
    Csv,
    /// Machine-readable format
    Machine,
}
