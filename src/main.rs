mod cli;
mod engine;
mod logging;
mod model;
mod orchestrator;
mod text_summary;

use anyhow::Result;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    let is_silent = args.silent;
    logging::init(args.verbose);

    match cli::run(args).await {
        Ok(report) => {
            // The listener thread never returns, so exit explicitly.
            std::process::exit(cli::exit_code(&report));
        }
        Err(e) => {
            if is_silent {
                eprintln!("{:#}", e);
                std::process::exit(1);
            } else {
                Err(e)
            }
        }
    }
}
