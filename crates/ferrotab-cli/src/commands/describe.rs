use ferrotab_core::adapters::spreadsheet_export_url;
use ferrotab_core::{FetchConfig, SourceDescriptor};
use serde_json::json;

use crate::cli::DescribeArgs;
use crate::error::CliError;

use super::CommandOutcome;

pub fn run(args: &DescribeArgs) -> Result<CommandOutcome, CliError> {
    let config = FetchConfig::from_env();
    let descriptor = SourceDescriptor::parse_with(&args.source, &config.local_mounts)?;

    let export_url = match &descriptor {
        SourceDescriptor::GoogleSheet { sheet_id, gid } => {
            Some(spreadsheet_export_url(sheet_id, gid.as_deref()))
        }
        _ => None,
    };
    let profile = args.profile.unwrap_or(config.request_profile);
    let max_retries = config.max_retries.unwrap_or(profile.max_retries());

    Ok(CommandOutcome::ok(json!({
        "source": descriptor.to_string(),
        "family": descriptor.family(),
        "exportUrl": export_url,
        "profile": profile.as_str(),
        "timeoutSecs": profile.timeout().as_secs(),
        "maxRetries": max_retries,
        "cacheTtlSecs": config.ttl.as_secs(),
        "staleAfterSecs": config.staleness_threshold.as_secs(),
    })))
}
