use serde::Serialize;
use serde_json::Value;

use forgeline_core::{RouterConfig, VolumeEstimate};

use crate::cli::RouteArgs;
use crate::error::CliError;

use super::to_freshness;

#[derive(Debug, Serialize)]
struct RouteOutput {
    rows: usize,
    freshness: &'static str,
    bulk_available: bool,
    backend: &'static str,
}

/// Routing dry run: no network access, just the decision.
pub fn run(args: &RouteArgs) -> Result<Value, CliError> {
    let estimate = VolumeEstimate::new(args.rows)?;
    let config = RouterConfig {
        bulk_available: args.bulk_available,
        ..RouterConfig::default()
    };
    let backend = config.select_backend(estimate, to_freshness(args.freshness))?;

    let output = RouteOutput {
        rows: args.rows,
        freshness: match args.freshness {
            crate::cli::FreshnessArg::Immediate => "immediate",
            crate::cli::FreshnessArg::NearImmediate => "near_immediate",
            crate::cli::FreshnessArg::Deferred => "deferred",
        },
        bulk_available: args.bulk_available,
        backend: backend.as_str(),
    };
    Ok(serde_json::to_value(output)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::FreshnessArg;

    #[test]
    fn reports_the_backend_that_would_serve_the_query() {
        let value = run(&RouteArgs {
            rows: 25_000,
            freshness: FreshnessArg::NearImmediate,
            bulk_available: true,
        })
        .expect("route");
        assert_eq!(value["backend"], "bulk");

        let value = run(&RouteArgs {
            rows: 500,
            freshness: FreshnessArg::Immediate,
            bulk_available: false,
        })
        .expect("route");
        assert_eq!(value["backend"], "interactive");
    }

    #[test]
    fn surfaces_volume_refusals_as_errors() {
        let result = run(&RouteArgs {
            rows: 20_000,
            freshness: FreshnessArg::Immediate,
            bulk_available: true,
        });
        assert!(result.is_err());
    }
}
