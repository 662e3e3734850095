mod check_url;
mod describe;
mod fetch;

use serde_json::Value;

use crate::cli::{Cli, Command};
use crate::error::CliError;

/// Rendered payload plus the process exit code it implies.
pub struct CommandOutcome {
    pub data: Value,
    pub exit_code: u8,
}

impl CommandOutcome {
    pub fn ok(data: Value) -> Self {
        Self { data, exit_code: 0 }
    }

    pub fn with_exit_code(mut self, exit_code: u8) -> Self {
        self.exit_code = exit_code;
        self
    }
}

pub async fn run(cli: &Cli) -> Result<CommandOutcome, CliError> {
    match &cli.command {
        Command::Fetch(args) => fetch::run(args, cli.verbose).await,
        Command::CheckUrl(args) => check_url::run(args).await,
        Command::Describe(args) => describe::run(args),
    }
}
