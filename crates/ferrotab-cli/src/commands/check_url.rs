use std::sync::Arc;

use ferrotab_core::{SystemResolver, UrlValidator};
use serde_json::json;

use crate::cli::CheckUrlArgs;
use crate::error::CliError;

use super::CommandOutcome;

/// Exit code for a URL the guard refuses.
const BLOCKED_EXIT_CODE: u8 = 3;

pub async fn run(args: &CheckUrlArgs) -> Result<CommandOutcome, CliError> {
    let validator = if args.resolve {
        UrlValidator::with_resolver(Arc::new(SystemResolver))
    } else {
        UrlValidator::new()
    };

    match validator.validate(&args.url).await {
        Ok(url) => Ok(CommandOutcome::ok(json!({
            "safe": true,
            "host": url.host_str(),
            "resolved": args.resolve,
        }))),
        Err(error) => Ok(CommandOutcome::ok(json!({
            "safe": false,
            "code": error.code(),
            "resolved": args.resolve,
        }))
        .with_exit_code(BLOCKED_EXIT_CODE)),
    }
}
