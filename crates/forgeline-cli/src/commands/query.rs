use serde::{Deserialize, Serialize};
use serde_json::Value;

use forgeline_core::{
    CollectionRequest, Freshness, JoinPlan, Record, StagedQuery, TableBinding, VolumeEstimate,
};

use crate::cli::QueryArgs;
use crate::config::ErpConfig;
use crate::error::CliError;

use super::to_freshness;

/// On-disk plan shape: collections to fetch, the join over them, and the
/// routing inputs.
#[derive(Debug, Deserialize)]
struct PlanFile {
    collections: Vec<PlanCollection>,
    #[serde(default)]
    tables: Vec<PlanTable>,
    sql: String,
    #[serde(default)]
    params: Vec<Value>,
    estimated_rows: usize,
    freshness: PlanFreshness,
}

#[derive(Debug, Deserialize)]
struct PlanCollection {
    collection: String,
    fields: Vec<String>,
    #[serde(default)]
    filter: Option<String>,
    #[serde(default)]
    order_by: Option<String>,
    #[serde(default)]
    max_rows: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct PlanTable {
    alias: String,
    collection: String,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
enum PlanFreshness {
    Immediate,
    NearImmediate,
    Deferred,
}

impl From<PlanFreshness> for Freshness {
    fn from(value: PlanFreshness) -> Self {
        match value {
            PlanFreshness::Immediate => Self::Immediate,
            PlanFreshness::NearImmediate => Self::NearImmediate,
            PlanFreshness::Deferred => Self::Deferred,
        }
    }
}

#[derive(Debug, Serialize)]
struct QueryOutput {
    backend: &'static str,
    row_count: usize,
    elapsed_ms: u64,
    failed_collections: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rows: Option<Vec<Record>>,
}

pub async fn run(args: &QueryArgs) -> Result<Value, CliError> {
    let raw = std::fs::read_to_string(&args.plan)?;
    let plan_file: PlanFile = serde_json::from_str(&raw)
        .map_err(|e| CliError::Command(format!("invalid plan file: {e}")))?;

    let mut requests = Vec::with_capacity(plan_file.collections.len());
    for entry in &plan_file.collections {
        let mut request = CollectionRequest::new(&entry.collection, entry.fields.clone())?;
        if let Some(filter) = &entry.filter {
            request = request.with_filter(filter);
        }
        if let Some(order_by) = &entry.order_by {
            request = request.with_order_by(order_by);
        }
        if let Some(max_rows) = entry.max_rows {
            request = request.with_max_rows(max_rows);
        }
        requests.push(request);
    }

    let mut plan = JoinPlan::new(&plan_file.sql)
        .map_err(forgeline_core::CoreError::from)?
        .with_params(plan_file.params.clone());
    if plan_file.tables.is_empty() {
        // Convention: each collection stages under its own name.
        for entry in &plan_file.collections {
            plan = plan.with_table(TableBinding::new(&entry.collection, &entry.collection));
        }
    } else {
        for table in &plan_file.tables {
            plan = plan.with_table(TableBinding::new(&table.alias, &table.collection));
        }
    }

    let estimate = VolumeEstimate::new(args.rows.unwrap_or(plan_file.estimated_rows))?;
    let freshness = args
        .freshness
        .map(to_freshness)
        .unwrap_or_else(|| plan_file.freshness.into());

    let query = StagedQuery::new(requests, plan, estimate, freshness)?;
    let outcome = ErpConfig::from_env()?.query_engine().execute(query).await?;

    let output = QueryOutput {
        backend: outcome.backend.as_str(),
        row_count: outcome.row_count(),
        elapsed_ms: outcome.elapsed_ms,
        failed_collections: outcome.failed_collections,
        rows: args.include_rows.then_some(outcome.rows),
    };
    Ok(serde_json::to_value(output)?)
}
