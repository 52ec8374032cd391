mod allocate;
mod calendar;
mod fetch;
mod query;
mod route;

use serde_json::Value;
use time::Date;

use crate::cli::{Cli, Command, FreshnessArg};
use crate::error::CliError;

pub async fn run(cli: &Cli) -> Result<Value, CliError> {
    match &cli.command {
        Command::Fetch(args) => fetch::run(args).await,
        Command::Query(args) => query::run(args).await,
        Command::Route(args) => route::run(args),
        Command::Allocate(args) => allocate::run(args),
        Command::Calendar(args) => calendar::run(args),
    }
}

pub(crate) fn to_freshness(arg: FreshnessArg) -> forgeline_core::Freshness {
    match arg {
        FreshnessArg::Immediate => forgeline_core::Freshness::Immediate,
        FreshnessArg::NearImmediate => forgeline_core::Freshness::NearImmediate,
        FreshnessArg::Deferred => forgeline_core::Freshness::Deferred,
    }
}

pub(crate) fn parse_date(raw: &str) -> Result<Date, CliError> {
    let format = time::macros::format_description!("[year]-[month]-[day]");
    Date::parse(raw, &format)
        .map_err(|_| CliError::Command(format!("invalid date '{raw}', expected YYYY-MM-DD")))
}
