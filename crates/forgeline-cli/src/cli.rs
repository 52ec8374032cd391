//! CLI argument definitions for Forgeline.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `fetch` | Fetch one collection from the ERP |
//! | `query` | Execute a staged query from a plan file |
//! | `route` | Dry-run the volume/freshness routing decision |
//! | `allocate` | Allocate supply pools to demand lines |
//! | `calendar` | Business-day calendar arithmetic |
//!
//! # Environment
//!
//! Network commands read the ERP endpoints and service credentials from
//! `FORGELINE_BASE_URL`, `FORGELINE_TOKEN_URL`, `FORGELINE_CLIENT_ID`,
//! `FORGELINE_CLIENT_SECRET`, `FORGELINE_ACCOUNT_KEY`,
//! `FORGELINE_ACCOUNT_SECRET`, and optionally `FORGELINE_BULK_URL`.
//!
//! # Examples
//!
//! ```bash
//! # Fetch open order lines
//! forgeline fetch SLCoItems --fields order_num,item,qty --filter "site = 'MAIN'"
//!
//! # Execute a staged query described in a plan file
//! forgeline query plans/open_demand.json --pretty
//!
//! # Check which backend would serve a query
//! forgeline route --rows 25000 --freshness deferred --bulk-available
//!
//! # Allocate supply against demand snapshots
//! forgeline allocate demand.json supply.json --holiday 2026-12-25
//! ```

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Forgeline - fabrication ERP data access and allocation CLI
///
/// Fetch ERP collections with credentialed, rate-limit-aware access,
/// join them through an in-memory staging store, and run stage-ordered
/// supply allocation.
#[derive(Debug, Parser)]
#[command(
    name = "forgeline",
    author,
    version,
    about = "Fabrication ERP data access and allocation CLI"
)]
pub struct Cli {
    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Caller's freshness tolerance for routed queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FreshnessArg {
    /// Live data only.
    Immediate,
    /// Prefer live data, accept the replica when volume forces it.
    NearImmediate,
    /// Replica staleness is fine.
    Deferred,
}

/// Available CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch one collection from the ERP.
    ///
    /// # Examples
    ///
    ///   forgeline fetch SLItems --fields item,qty_on_hand
    ///   forgeline fetch SLCoItems --fields order_num,qty --filter "qty > 0"
    Fetch(FetchArgs),

    /// Execute a staged query described in a JSON plan file.
    ///
    /// The plan names the collections to fetch, a SELECT joining them,
    /// `?`-bound parameters, and the routing inputs.
    Query(QueryArgs),

    /// Dry-run the routing decision for a volume/freshness pair.
    ///
    /// No network access; prints which backend would serve the query.
    Route(RouteArgs),

    /// Allocate supply pools to demand lines.
    ///
    /// Reads demand lines and supply pools from JSON files, sorts demand
    /// into priority order, and prints one allocation outcome per line.
    Allocate(AllocateArgs),

    /// Business-day calendar arithmetic.
    Calendar(CalendarArgs),
}

/// Arguments for the `fetch` command.
#[derive(Debug, Args)]
pub struct FetchArgs {
    /// Collection name (e.g. SLItems, SLCoItems, SLJobs).
    pub collection: String,

    /// Comma-separated field list to select.
    #[arg(long, required = true, value_delimiter = ',')]
    pub fields: Vec<String>,

    /// Opaque filter expression passed through to the service.
    #[arg(long)]
    pub filter: Option<String>,

    /// Ordering hint passed through to the service.
    #[arg(long)]
    pub order_by: Option<String>,

    /// Row cap for the query.
    #[arg(long, default_value_t = 1_000)]
    pub max_rows: usize,
}

/// Arguments for the `query` command.
#[derive(Debug, Args)]
pub struct QueryArgs {
    /// Path to the JSON plan file.
    pub plan: std::path::PathBuf,

    /// Override the plan's freshness requirement.
    #[arg(long, value_enum)]
    pub freshness: Option<FreshnessArg>,

    /// Override the plan's estimated row volume.
    #[arg(long)]
    pub rows: Option<usize>,

    /// Include joined rows in the output, not just the summary.
    #[arg(long, default_value_t = false)]
    pub include_rows: bool,
}

/// Arguments for the `route` command.
#[derive(Debug, Args)]
pub struct RouteArgs {
    /// Estimated row volume.
    #[arg(long)]
    pub rows: usize,

    /// Freshness requirement.
    #[arg(long, value_enum, default_value_t = FreshnessArg::NearImmediate)]
    pub freshness: FreshnessArg,

    /// Assume a bulk backend is configured.
    #[arg(long, default_value_t = false)]
    pub bulk_available: bool,
}

/// Arguments for the `allocate` command.
#[derive(Debug, Args)]
pub struct AllocateArgs {
    /// Path to a JSON array of demand lines.
    pub demand: std::path::PathBuf,

    /// Path to a JSON array of supply pools.
    pub supply: std::path::PathBuf,

    /// Holiday dates (YYYY-MM-DD) excluded from business-day arithmetic.
    #[arg(long = "holiday")]
    pub holidays: Vec<String>,

    /// Allocate in file order instead of due-date priority order.
    #[arg(long, default_value_t = false)]
    pub no_sort: bool,
}

/// Arguments for the `calendar` command group.
#[derive(Debug, Args)]
pub struct CalendarArgs {
    #[command(subcommand)]
    pub command: CalendarCommand,
}

/// Calendar subcommands.
#[derive(Debug, Subcommand)]
pub enum CalendarCommand {
    /// Project a date N business days after a start date.
    ///
    /// Counts only business days strictly after the start; a Saturday
    /// start plus one lands on Monday.
    AddDays(CalendarAddDaysArgs),
}

/// Arguments for `calendar add-days`.
#[derive(Debug, Args)]
pub struct CalendarAddDaysArgs {
    /// Start date (YYYY-MM-DD).
    pub start: String,

    /// Business days to add.
    pub days: u32,

    /// Holiday dates (YYYY-MM-DD) excluded from the count.
    #[arg(long = "holiday")]
    pub holidays: Vec<String>,
}
