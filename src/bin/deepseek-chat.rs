use std::process::ExitCode;

use deepseek_chat::config::Config;
use deepseek_chat::llm::Credential;
use deepseek_chat::{logging, ui};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    logging::init("info");

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let credential = match Credential::from_env() {
        Ok(credential) => {
            info!("using credential from the environment");
            Some(credential)
        }
        Err(e) => {
            warn!(reason = %e, "no credential in the environment; the UI will ask for one");
            None
        }
    };

    if let Err(e) = ui::serve(&config, credential).await {
        error!(error = %e, "server stopped");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
