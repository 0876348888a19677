use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::sync::Arc;
use tokio::{
    fs::File as TokioFile,
    io::{AsyncWriteExt, BufWriter},
    signal,
    sync::{Notify, mpsc},
    task::JoinHandle,
};
use tracing::debug;

use inboxprobe::batch::verify_batch_with;
use inboxprobe::{
    DnsMxResolver, MAX_BATCH_SIZE, MxCache, Verdict, VerificationResult, Verifier, api,
    resolve_identity,
};

use crate::cli::{Cli, OutputFormat};
use crate::input::InputSource;
use crate::output::{CSV_HEADER, OutputHandler, Tally, render_line};

pub struct App {
    cli: Cli,
    output_handler: OutputHandler,
    shutdown_signal: Arc<Notify>,
}

impl App {
    pub fn new(cli: Cli) -> Self {
        let output_handler = OutputHandler::new(cli.output, cli.is_color);
        let shutdown_signal = Arc::new(Notify::new());

        Self {
            cli,
            output_handler,
            shutdown_signal,
        }
    }

    // Spawn a task dedicated to listening for the Ctrl+C signal
    fn spawn_signal_listener(&self) {
        let shutdown_signal = self.shutdown_signal.clone();

        tokio::spawn(async move {
            match signal::ctrl_c().await {
                Ok(()) => {
                    eprintln!("\nCtrl+C received, signaling shutdown...");
                    // notify_one keeps a permit when nobody is waiting yet
                    shutdown_signal.notify_one();
                }
                Err(err) => {
                    eprintln!("FATAL: Unable to listen for shutdown signal: {err}");
                }
            }
        });
    }

    fn interrupted() -> io::Error {
        io::Error::new(io::ErrorKind::Interrupted, "Operation cancelled by user")
    }

    // Main application execution
    pub async fn run(&self) -> io::Result<()> {
        self.spawn_signal_listener();

        if self.output_handler.format == OutputFormat::Standard {
            self.output_handler.print_banner();
        }

        // --- Load Addresses (interruptible point) ---
        let input = self.cli.address.clone();
        let addresses = tokio::select! {
            biased;
            () = self.shutdown_signal.notified() => {
                eprintln!("Shutdown signaled during address loading.");
                return Err(Self::interrupted());
            }
            res = tokio::task::spawn_blocking(move || InputSource::new(&input)?.load_addresses()) => match res {
                Ok(Ok(addresses)) => addresses,
                Ok(Err(e)) => {
                    eprintln!("{} Error loading addresses: {e}", "[-]".red().bold());
                    return Err(e);
                }
                Err(e) => {
                    eprintln!("{} Task panic during address loading: {e}", "[-]".red().bold());
                    return Err(io::Error::other("Address loading panicked"));
                }
            }
        };

        if addresses.is_empty() {
            eprintln!("{} No addresses to verify", "[!]".red().bold());
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "no addresses"));
        }

        // --- Build the verifier ---
        let identity = tokio::select! {
            biased;
            () = self.shutdown_signal.notified() => return Err(Self::interrupted()),
            identity = resolve_identity(self.cli.helo.as_deref()) => identity,
        };
        let config = self.cli.verifier_config(identity);
        let cache = Arc::new(MxCache::new(config.mx_cache_ttl, config.mx_cache_capacity));
        let resolver = Arc::new(DnsMxResolver::new(cache));

        self.output_handler.print_run_info(
            &config.identity,
            &config.sender_address(),
            &format!("{:?}", self.cli.strategy).to_lowercase(),
            addresses.len(),
            addresses.len().div_ceil(MAX_BATCH_SIZE),
        );

        if config.port != 25 {
            eprintln!(
                "{} Non-standard port {}. Most exchanges only accept mail on 25.",
                "[>]".bold().yellow(),
                config.port.to_string().bold().yellow(),
            );
        }

        let verifier = Verifier::new(config, resolver);

        if addresses.len() == 1 {
            self.handle_single_address(&verifier, &addresses[0]).await
        } else {
            self.handle_multiple_addresses(&verifier, &addresses).await
        }
    }

    async fn handle_single_address(&self, verifier: &Verifier, email: &str) -> io::Result<()> {
        let outcome = tokio::select! {
            biased;
            () = self.shutdown_signal.notified() => {
                eprintln!("Shutdown during verification.");
                return Err(Self::interrupted());
            }
            outcome = api::verify_email(verifier, Some(email)) => outcome,
        };

        self.output_handler.print_header();
        let result = match outcome {
            Ok(result) => result,
            Err(err) => {
                self.output_handler.print_api_error(email, &err);
                return Err(io::Error::other(err));
            }
        };

        self.output_handler.print_result(&result);

        if let Some(output_file) = &self.cli.output_file {
            match self
                .output_handler
                .save_results_to_file(std::slice::from_ref(&result), output_file)
                .await
            {
                Ok(()) => eprintln!(
                    "{} Result saved to {}",
                    "[+]".green().bold(),
                    output_file.display().to_string().bold()
                ),
                Err(e) => eprintln!("{} Error saving result to file: {e}", "[-]".red().bold()),
            }
        }

        Ok(())
    }

    // Larger inputs run as consecutive batches of at most MAX_BATCH_SIZE
    async fn handle_multiple_addresses(
        &self,
        verifier: &Verifier,
        addresses: &[String],
    ) -> io::Result<()> {
        // --- Setup for Incremental File Writing ---
        let (output_tx, writer_handle) = match self.cli.output_file.clone() {
            Some(path) => {
                let (tx, rx) = mpsc::channel::<VerificationResult>(MAX_BATCH_SIZE);
                let handle = tokio::spawn(write_results(path, self.cli.output, rx));
                (Some(tx), Some(handle))
            }
            None => (None, None),
        };

        // Progress bar only for standard console output
        let progress_bar = if self.output_handler.format == OutputFormat::Standard
            && !self.cli.verbose
        {
            let pb = ProgressBar::new(addresses.len() as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
                    .map_err(io::Error::other)?
                    .progress_chars("#>-"),
            );
            Some(pb)
        } else {
            None
        };

        self.output_handler.print_header();

        let mut results: Vec<VerificationResult> = Vec::with_capacity(addresses.len());
        let mut interrupted = false;

        for (index, chunk) in addresses.chunks(MAX_BATCH_SIZE).enumerate() {
            debug!("starting batch {} with {} address(es)", index + 1, chunk.len());

            let pb_task = progress_bar.clone();
            let handler_task = self.output_handler.clone();
            let on_result = move |result: &VerificationResult| {
                if let Some(pb) = &pb_task {
                    // Confirmed mailboxes go above the bar
                    if matches!(result.verdict(), Verdict::Deliverable | Verdict::CatchAll) {
                        pb.println(handler_task.standard_line(result));
                    }
                    pb.inc(1);
                }
            };

            let batch = tokio::select! {
                biased;
                () = self.shutdown_signal.notified() => {
                    eprintln!("\nShutdown signaled, stopping verification...");
                    interrupted = true;
                    break;
                }
                batch = verify_batch_with(verifier, chunk, on_result) => batch,
            };

            let batch = match batch {
                Ok(batch) => batch,
                Err(e) => {
                    eprintln!("{} {e}", "[-]".red().bold());
                    return Err(io::Error::other(e));
                }
            };

            if self.output_handler.format != OutputFormat::Standard {
                for result in &batch {
                    self.output_handler.print_result(result);
                }
            }

            if let Some(sender) = &output_tx {
                for result in &batch {
                    if sender.send(result.clone()).await.is_err() {
                        eprintln!("{} File writer stopped early", "[-]".red().bold());
                        break;
                    }
                }
            }

            results.extend(batch);
        }

        if let Some(pb) = &progress_bar {
            if !pb.is_finished() {
                pb.finish_and_clear();
            }
        }

        if self.cli.verbose
            && self.output_handler.format == OutputFormat::Standard
            && !results.is_empty()
        {
            println!("\n--- Results Summary ---");
            for result in &results {
                self.output_handler.print_result(result);
            }
            println!("--- End Summary ---");
        }

        self.output_handler
            .print_statistics(&Tally::from_results(&results));
        self.output_handler.print_deliverable_summary(&results);

        // Closing the channel lets the writer flush and finish
        drop(output_tx);
        if let Some(handle) = writer_handle {
            self.finish_writer(handle).await;
        }

        if interrupted {
            return Err(Self::interrupted());
        }
        Ok(())
    }

    async fn finish_writer(&self, handle: JoinHandle<io::Result<()>>) {
        if self.output_handler.format == OutputFormat::Standard {
            eprintln!("{}", "[>] Waiting for file writer to finish...".dimmed());
        }
        match handle.await {
            Ok(Ok(())) => {
                if let Some(output_path) = &self.cli.output_file {
                    eprintln!(
                        "{} Results saved to {}",
                        "[+]".green().bold(),
                        output_path.display().to_string().bold()
                    );
                }
            }
            Ok(Err(e)) => {
                eprintln!("{} Error writing results to file: {}", "[-]".red().bold(), e);
            }
            Err(e) => {
                eprintln!("{} File writer task panicked: {}", "[-]".red().bold(), e);
            }
        }
    }
}

// Writes results as they arrive until the channel closes
async fn write_results(
    path: std::path::PathBuf,
    format: OutputFormat,
    mut rx: mpsc::Receiver<VerificationResult>,
) -> io::Result<()> {
    let file = TokioFile::create(&path).await?;
    let mut writer = BufWriter::new(file);

    if format == OutputFormat::Csv {
        writer.write_all(CSV_HEADER.as_bytes()).await?;
        writer.write_all(b"\n").await?;
    }

    while let Some(result) = rx.recv().await {
        let mut line = render_line(&result, format);
        line.push('\n');
        writer.write_all(line.as_bytes()).await?;
    }

    writer.flush().await?;
    Ok(())
}
