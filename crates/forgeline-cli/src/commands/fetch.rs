use serde::Serialize;
use serde_json::Value;

use forgeline_core::{CollectionRequest, FetchFailure, Record};

use crate::cli::FetchArgs;
use crate::config::ErpConfig;
use crate::error::CliError;

#[derive(Debug, Serialize)]
struct FetchOutput {
    collection: String,
    success: bool,
    row_count: usize,
    elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    rows: Vec<Record>,
}

pub async fn run(args: &FetchArgs) -> Result<Value, CliError> {
    let request = CollectionRequest::new(&args.collection, args.fields.clone())?
        .with_max_rows(args.max_rows);
    let request = match &args.filter {
        Some(filter) => request.with_filter(filter),
        None => request,
    };
    let request = match &args.order_by {
        Some(order_by) => request.with_order_by(order_by),
        None => request,
    };

    let engine = ErpConfig::from_env()?.fetch_engine();
    let mut results = engine.fetch_many(vec![request]).await;
    let result = results
        .remove(&args.collection)
        .ok_or_else(|| CliError::Command(format!("no result for '{}'", args.collection)))?;

    // Credential failures are fatal even for a single collection.
    if let Some(FetchFailure::Authentication(message)) = &result.error {
        return Err(CliError::Core(forgeline_core::CoreError::Authentication(
            message.clone(),
        )));
    }

    let output = FetchOutput {
        collection: result.collection,
        success: result.success,
        row_count: result.records.len(),
        elapsed_ms: result.elapsed.as_millis() as u64,
        error: result.error.as_ref().map(FetchFailure::message),
        rows: result.records,
    };
    Ok(serde_json::to_value(output)?)
}
