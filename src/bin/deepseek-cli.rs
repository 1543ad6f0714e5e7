use std::process::ExitCode;

use clap::Parser;
use deepseek_chat::cli::{self, Args, CliError};
use deepseek_chat::logging;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    logging::init("warn");

    match cli::run(Args::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            if matches!(&e, CliError::Chat(chat) if chat.is_authentication()) {
                eprintln!("You can also create a .env file with GITHUB_TOKEN or AZURE_KEY");
            }
            ExitCode::FAILURE
        }
    }
}
