mod app;
mod cli;
mod input;
mod output;

use std::process::ExitCode;

use app::App;
use clap::Parser;
use cli::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    inboxprobe::logging::init(cli.verbose, cli.is_color);

    let app = App::new(cli);
    match app.run().await {
        Ok(()) => ExitCode::SUCCESS,
        // Already reported to the user by the output handler
        Err(_) => ExitCode::FAILURE,
    }
}
