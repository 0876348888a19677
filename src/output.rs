use colored::Colorize;
use std::io;
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::cli::OutputFormat;
use inboxprobe::{ApiError, Verdict, VerificationResult};

pub const CSV_HEADER: &str = "email,verdict,format_valid,connection_succeeded,inbox_exists,uses_catch_all,protocol,temporary_error,exchange,error";

#[derive(Clone, Debug)]
pub struct OutputHandler {
    pub format: OutputFormat,
    is_color: bool,
}

// Per-verdict counts over a run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Tally {
    pub deliverable: usize,
    pub catch_all: usize,
    pub undeliverable: usize,
    pub unknown: usize,
    pub malformed: usize,
}

impl Tally {
    pub fn from_results(results: &[VerificationResult]) -> Self {
        let mut tally = Self::default();
        for result in results {
            match result.verdict() {
                Verdict::Deliverable => tally.deliverable += 1,
                Verdict::CatchAll => tally.catch_all += 1,
                Verdict::Undeliverable => tally.undeliverable += 1,
                Verdict::Unknown => tally.unknown += 1,
                Verdict::Malformed => tally.malformed += 1,
            }
        }
        tally
    }

    pub fn total(&self) -> usize {
        self.deliverable + self.catch_all + self.undeliverable + self.unknown + self.malformed
    }
}

impl OutputHandler {
    pub fn new(format: OutputFormat, is_color: bool) -> Self {
        // Colors only matter for the standard console format
        colored::control::set_override(is_color && format == OutputFormat::Standard);

        Self { format, is_color }
    }

    // Column header line for formats that have one
    pub fn header(&self) -> Option<&'static str> {
        match self.format {
            OutputFormat::Csv => Some(CSV_HEADER),
            _ => None,
        }
    }

    pub fn print_header(&self) {
        if let Some(header) = self.header() {
            println!("{header}");
        }
    }

    pub fn print_result(&self, result: &VerificationResult) {
        match self.format {
            OutputFormat::Standard => println!("{}", self.standard_line(result)),
            _ => println!("{}", render_line(result, self.format)),
        }
    }

    // Single-address failures reported by the request layer
    pub fn print_api_error(&self, email: &str, err: &ApiError) {
        match self.format {
            OutputFormat::Standard => eprintln!(
                "{} {} - {} {}",
                "[!]".red().bold(),
                email.bold(),
                err.to_string().red(),
                format!("(status {})", err.status_code()).dimmed()
            ),
            OutputFormat::Json => println!("{}", err.body()),
            OutputFormat::Csv => println!(
                "{},ERROR,,,,,,,,\"{}\"",
                csv_field(email),
                err.to_string().replace('"', "\"\"")
            ),
            OutputFormat::Machine => println!("STATUS:ERROR\tEMAIL:{email}\tREASON:{err}"),
        }
    }

    pub fn standard_line(&self, result: &VerificationResult) -> String {
        let verdict = result.verdict();
        let (prefix, status) = match verdict {
            Verdict::Deliverable => ("[+]".green().bold(), verdict.to_string().green().bold()),
            Verdict::CatchAll => ("[~]".cyan().bold(), verdict.to_string().cyan().bold()),
            Verdict::Undeliverable => ("[-]".red().bold(), verdict.to_string().red()),
            Verdict::Unknown => ("[?]".yellow().bold(), verdict.to_string().yellow()),
            Verdict::Malformed => ("[!]".red().bold(), verdict.to_string().red()),
        };
        format!(
            "{} {:30} - {:<13} {}",
            prefix,
            result.email,
            status,
            self.format_detail(result)
        )
    }

    /// Describes where the answer came from, or why there is none, with
    /// any SMTP reply code colored by its class.
    pub fn format_detail(&self, result: &VerificationResult) -> String {
        if let Some(error) = &result.error {
            return self.color_reply_codes(error);
        }

        match (&result.exchange, result.protocol) {
            (Some(host), Some(protocol)) => format!("via {host} ({protocol})"),
            (Some(host), None) => format!("via {host}"),
            _ if !result.email_format_is_valid => "invalid address format".to_string(),
            _ => {
                let text = "No server response";
                if self.is_color {
                    text.dimmed().to_string()
                } else {
                    text.to_string()
                }
            }
        }
    }

    fn color_reply_codes(&self, text: &str) -> String {
        if !self.is_color {
            return text.to_string();
        }
        text.split(' ')
            .map(|word| {
                let is_code = word.len() == 3 && word.chars().all(|c| c.is_ascii_digit());
                match (is_code, word.as_bytes().first()) {
                    (true, Some(b'2')) => word.green().to_string(),
                    (true, Some(b'4')) => word.yellow().to_string(),
                    (true, Some(b'5')) => word.red().to_string(),
                    _ => word.to_string(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    // Print a banner
    pub fn print_banner(&self) {
        let version = env!("CARGO_PKG_VERSION");

        if self.is_color {
            eprintln!(
                "{} {}",
                "inboxprobe".cyan().bold(),
                format!("v{version}").green().bold()
            );
            eprintln!("{}", "SMTP mailbox verification without sending mail".dimmed());
        } else {
            eprintln!("inboxprobe v{version}");
            eprintln!("SMTP mailbox verification without sending mail");
        }
        eprintln!();
    }

    pub fn print_run_info(
        &self,
        identity: &str,
        sender: &str,
        strategy: &str,
        address_count: usize,
        batch_count: usize,
    ) {
        if self.format != OutputFormat::Standard {
            return;
        }

        let label_width = 15;
        let separator_len = label_width + 25;
        let separator = "-".repeat(separator_len).dimmed();

        eprintln!("{separator}");
        let title = "Run Configuration";
        let centered_title = format!("{title:^separator_len$}");
        eprintln!("{}", centered_title.bold());
        eprintln!("{separator}");

        eprintln!(
            "{:<width$}: {}",
            "Identity",
            identity.cyan(),
            width = label_width
        );
        eprintln!("{:<width$}: {}", "Sender", sender, width = label_width);
        eprintln!("{:<width$}: {}", "Strategy", strategy, width = label_width);
        eprintln!(
            "{:<width$}: {}",
            "Addresses",
            address_count,
            width = label_width
        );
        eprintln!("{:<width$}: {}", "Batches", batch_count, width = label_width);

        eprintln!("{separator}");
        eprintln!();
    }

    // Print statistics
    pub fn print_statistics(&self, tally: &Tally) {
        if self.format != OutputFormat::Standard {
            return;
        }

        eprintln!();
        let separator = "-".repeat(72);
        eprintln!("{}", separator.dimmed());

        eprintln!(
            "{} {} {} | {} {} | {} {} | {} {} | {} {} | {} {}",
            "STATS".bold(),
            "Total:".bold(),
            tally.total().to_string().bold(),
            "Deliverable:".green().bold(),
            tally.deliverable.to_string().green().bold(),
            "Catch-all:".cyan().bold(),
            tally.catch_all.to_string().cyan(),
            "Undeliverable:".red().bold(),
            tally.undeliverable.to_string().red(),
            "Unknown:".yellow().bold(),
            tally.unknown.to_string().yellow(),
            "Malformed:".red(),
            tally.malformed.to_string().red()
        );
        eprintln!("{}", separator.dimmed());
        eprintln!();
    }

    /// Lists the addresses whose mailbox was confirmed.
    pub fn print_deliverable_summary(&self, results: &[VerificationResult]) {
        if self.format != OutputFormat::Standard {
            return;
        }

        let confirmed: Vec<&VerificationResult> = results
            .iter()
            .filter(|r| matches!(r.verdict(), Verdict::Deliverable | Verdict::CatchAll))
            .collect();
        if confirmed.is_empty() {
            return;
        }

        let separator = "-".repeat(72).dimmed();
        eprintln!("\n{separator}");
        eprintln!("{}", "Accepted Recipients:".bold());
        eprintln!();

        for result in confirmed {
            let email_display = result.email.green().bold();
            let note = if result.uses_catch_all {
                " (catch-all domain)".cyan().to_string()
            } else {
                String::new()
            };
            eprintln!(
                "  {email_display:<30} - {}{note}",
                self.format_detail(result)
            );
        }
        eprintln!("{separator}");
    }

    // Save results to a file
    pub async fn save_results_to_file(
        &self,
        results: &[VerificationResult],
        path: &Path,
    ) -> io::Result<()> {
        let mut file = File::create(path).await?;

        match self.format {
            OutputFormat::Json => {
                let json = serde_json::to_string_pretty(results).map_err(io::Error::other)?;
                file.write_all(json.as_bytes()).await?;
                file.write_all(b"\n").await?;
            }
            OutputFormat::Csv => {
                file.write_all(CSV_HEADER.as_bytes()).await?;
                file.write_all(b"\n").await?;
                for result in results {
                    file.write_all(render_line(result, OutputFormat::Csv).as_bytes())
                        .await?;
                    file.write_all(b"\n").await?;
                }
            }
            format => {
                for result in results {
                    file.write_all(render_line(result, format).as_bytes()).await?;
                    file.write_all(b"\n").await?;
                }
            }
        }

        file.flush().await
    }
}

// One uncolored line per result, used for stdout and output files
pub fn render_line(result: &VerificationResult, format: OutputFormat) -> String {
    let protocol = result
        .protocol
        .map(|p| p.to_string())
        .unwrap_or_default();
    let exchange = result.exchange.as_deref().unwrap_or("");
    let error = result.error.as_deref().unwrap_or("");

    match format {
        OutputFormat::Json => serde_json::to_string(result).unwrap_or_default(),
        OutputFormat::Csv => format!(
            "{},{},{},{},{},{},{},{},{},\"{}\"",
            csv_field(&result.email),
            result.verdict(),
            result.email_format_is_valid,
            result.connection_succeeded,
            result.inbox_exists,
            result.uses_catch_all,
            protocol,
            result.is_temporary_error,
            exchange,
            error.replace('"', "\"\"")
        ),
        OutputFormat::Machine => format!(
            "STATUS:{}\tEMAIL:{}\tPROTOCOL:{}\tCATCHALL:{}\tEXCHANGE:{}\tREASON:{}",
            result.verdict(),
            result.email,
            protocol,
            result.uses_catch_all,
            exchange,
            error
        ),
        OutputFormat::Standard => format!("[{}] {} - {}", result.verdict(), result.email, error),
    }
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
