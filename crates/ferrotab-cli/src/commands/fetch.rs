use std::sync::Arc;

use ferrotab_core::{
    sort_rows, ColumnSelection, FetchConfig, FetchOptions, Fetcher, InMemoryStore, KeyValueStore,
    ReqwestHttpClient, RootPath,
};
use serde_json::json;

use crate::cli::FetchArgs;
use crate::error::CliError;

use super::CommandOutcome;

pub async fn run(args: &FetchArgs, verbose: bool) -> Result<CommandOutcome, CliError> {
    let mut config = FetchConfig::from_env();
    config.verbose_diagnostics |= verbose;
    config.local_roots.extend(args.local_roots.iter().cloned());

    let root_path = args.root.as_deref().map(RootPath::parse).transpose()?;
    let selection = ColumnSelection::parse(args.include.as_deref(), args.exclude.as_deref())?;

    let store = open_store(&config).await;
    let fetcher = Fetcher::from_config(&config, Arc::new(ReqwestHttpClient::new()), store);
    let descriptor = fetcher.parse(&args.source)?;

    let mut options = if args.no_cache {
        FetchOptions::uncached()
    } else {
        FetchOptions::default()
    };
    options.root_path = root_path;

    let response = fetcher.fetch(&args.source, &options).await?;
    let mut dataset = response.dataset;
    if let Some(field) = &args.sort_field {
        sort_rows(&mut dataset.rows, field, args.sort_direction);
    }
    let table = selection.apply(&dataset);

    if let Some(stats) = fetcher.engine_stats() {
        tracing::debug!(
            requests = stats.total_requests,
            retries = stats.retries,
            average_latency_ms = stats.average_latency_ms,
            "request engine stats"
        );
    }

    Ok(CommandOutcome::ok(json!({
        "source": descriptor.to_string(),
        "family": descriptor.family(),
        "cache": response.cache,
        "rowCount": table.rows.len(),
        "table": table,
    })))
}

#[cfg(feature = "redis")]
async fn open_store(config: &FetchConfig) -> Arc<dyn KeyValueStore> {
    if let Some(url) = &config.redis_url {
        match ferrotab_core::store::RedisStore::connect(url, "ferrotab:").await {
            Ok(store) => return Arc::new(store),
            Err(error) => {
                tracing::warn!(error = %error, "redis unavailable; using in-memory store");
            }
        }
    }
    Arc::new(InMemoryStore::new())
}

#[cfg(not(feature = "redis"))]
async fn open_store(config: &FetchConfig) -> Arc<dyn KeyValueStore> {
    if config.redis_url.is_some() {
        tracing::warn!("FERROTAB_REDIS_URL is set but this build lacks the redis feature");
    }
    Arc::new(InMemoryStore::new())
}
