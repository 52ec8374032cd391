//! # Forgeline Staging
//!
//! Ephemeral, per-request relational workspace backed by an in-memory
//! DuckDB database.
//!
//! Fetched ERP collections arrive as loose field-maps with no guaranteed
//! schema. The staging store materializes each collection as a table,
//! executes a declarative [`JoinPlan`] over them, and returns the joined
//! rows as field-maps again. Nothing survives the request: a
//! [`StagingStore`] is opened, used once, and dropped.
//!
//! ## Security
//!
//! Plan parameters always bind through `?` placeholders. Caller-supplied
//! values are never interpolated into the SQL text:
//!
//! ```rust,no_run
//! use forgeline_staging::{JoinPlan, StagingStore, TableBinding};
//! use std::collections::BTreeMap;
//!
//! # fn main() -> Result<(), forgeline_staging::StagingError> {
//! let plan = JoinPlan::new(
//!     "SELECT o.order_num, i.description \
//!      FROM orders o LEFT OUTER JOIN items i ON o.item = i.item \
//!      WHERE o.site = ?",
//! )?
//! .with_table(TableBinding::new("orders", "SLCoItems"))
//! .with_table(TableBinding::new("items", "SLItems"))
//! .with_param("MAIN'; DROP TABLE orders; --"); // bound, not interpolated
//!
//! let store = StagingStore::new()?;
//! let rows = store.join(&BTreeMap::new(), &plan)?;
//! assert!(rows.is_empty());
//! # Ok(())
//! # }
//! ```

use std::collections::{BTreeMap, BTreeSet};

use duckdb::types::Value as DuckValue;
use duckdb::{Connection, ToSql};
use serde_json::{Number, Value};
use thiserror::Error;

/// A single staged row: field name to scalar value.
///
/// Field presence is not guaranteed across records; absent fields are
/// simply missing keys (materialized as SQL NULL).
pub type Record = BTreeMap<String, Value>;

/// Errors raised by the staging store.
#[derive(Debug, Error)]
pub enum StagingError {
    /// `DuckDB` database error (syntax error, execution failure).
    #[error(transparent)]
    DuckDb(#[from] duckdb::Error),

    /// Join plan was rejected before execution.
    #[error("join plan rejected: {0}")]
    PlanRejected(String),
}

/// Binds a logical table alias in a join plan to a remote collection name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableBinding {
    /// Table name the plan's SQL refers to.
    pub alias: String,
    /// Remote collection whose fetched records populate the table.
    pub collection: String,
    /// Columns the table is declared to have even when no records were
    /// fetched. The materialized column set is the union of these and
    /// every field name observed in the supplied records.
    pub columns: Vec<String>,
}

impl TableBinding {
    pub fn new(alias: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            collection: collection.into(),
            columns: Vec::new(),
        }
    }

    /// Declare columns so a zero-record table still has a usable schema.
    pub fn with_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }
}

/// A declarative, parameterized join over staged collections.
///
/// Stateless and reusable: the same plan can run against different table
/// contents and different bound parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinPlan {
    tables: Vec<TableBinding>,
    sql: String,
    params: Vec<Value>,
}

impl JoinPlan {
    /// Create a plan from a SELECT/CTE query body.
    ///
    /// # Errors
    /// Rejects empty queries, non-SELECT statements, and multi-statement
    /// strings.
    pub fn new(sql: impl Into<String>) -> Result<Self, StagingError> {
        let sql = normalize_sql(sql.into())?;
        Ok(Self {
            tables: Vec::new(),
            sql,
            params: Vec::new(),
        })
    }

    pub fn with_table(mut self, binding: TableBinding) -> Self {
        self.tables.push(binding);
        self
    }

    /// Bind the next `?` placeholder.
    pub fn with_param(mut self, value: impl Into<Value>) -> Self {
        self.params.push(value.into());
        self
    }

    /// Replace all bound parameters, keeping tables and SQL.
    pub fn with_params(mut self, params: Vec<Value>) -> Self {
        self.params = params;
        self
    }

    pub fn tables(&self) -> &[TableBinding] {
        &self.tables
    }

    /// Fill in declared columns for every binding of `collection` that
    /// has none. Lets a caller that knows the selected field list keep
    /// empty result sets joinable.
    pub fn declare_columns_for(&mut self, collection: &str, columns: &[String]) {
        for binding in &mut self.tables {
            if binding.collection == collection && binding.columns.is_empty() {
                binding.columns = columns.to_vec();
            }
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }
}

/// Per-request staging workspace over an in-memory `DuckDB` database.
pub struct StagingStore {
    connection: Connection,
}

impl StagingStore {
    /// Open a fresh in-memory database.
    ///
    /// Construction is cheap; one instance per request, discarded after.
    pub fn new() -> Result<Self, StagingError> {
        let connection = Connection::open_in_memory()?;
        connection.execute_batch("PRAGMA disable_progress_bar;")?;
        Ok(Self { connection })
    }

    /// Materialize the supplied collections and execute the join plan.
    ///
    /// `tables` maps collection name to fetched records. A collection with
    /// no entry (or an empty record list) still materializes as an empty
    /// table so outer joins see it, rather than the query failing.
    ///
    /// Output rows are keyed exactly by the plan's output expression
    /// names; the store performs no renaming.
    ///
    /// # Errors
    /// SQL syntax or execution failures propagate as [`StagingError`];
    /// these are whole-request errors, unlike per-collection fetch
    /// failures which the caller absorbs upstream.
    pub fn join(
        &self,
        tables: &BTreeMap<String, Vec<Record>>,
        plan: &JoinPlan,
    ) -> Result<Vec<Record>, StagingError> {
        static EMPTY: Vec<Record> = Vec::new();
        for binding in plan.tables() {
            let records = tables.get(&binding.collection).unwrap_or(&EMPTY);
            self.materialize(binding, records)?;
        }

        self.execute_plan(plan)
    }

    /// Create and populate one staging table from fetched records.
    fn materialize(&self, binding: &TableBinding, records: &[Record]) -> Result<(), StagingError> {
        let columns = column_layout(binding, records);
        if columns.is_empty() {
            return Err(StagingError::PlanRejected(format!(
                "table '{}' has no columns: no records were fetched and no columns were declared",
                binding.alias
            )));
        }

        let column_defs = columns
            .iter()
            .map(|(name, kind)| format!("{} {}", quote_identifier(name), kind.sql_type()))
            .collect::<Vec<_>>()
            .join(", ");
        self.connection.execute_batch(&format!(
            "CREATE OR REPLACE TABLE {} ({column_defs});",
            quote_identifier(&binding.alias)
        ))?;

        if records.is_empty() {
            return Ok(());
        }

        let placeholders = vec!["?"; columns.len()].join(", ");
        let column_list = columns
            .iter()
            .map(|(name, _)| quote_identifier(name))
            .collect::<Vec<_>>()
            .join(", ");
        let mut insert = self.connection.prepare(&format!(
            "INSERT INTO {} ({column_list}) VALUES ({placeholders})",
            quote_identifier(&binding.alias)
        ))?;

        self.connection.execute_batch("BEGIN TRANSACTION")?;
        let result = (|| -> Result<(), StagingError> {
            for record in records {
                let row: Vec<DuckValue> = columns
                    .iter()
                    .map(|(name, kind)| kind.coerce(record.get(name.as_str())))
                    .collect();
                let params: Vec<&dyn ToSql> =
                    row.iter().map(|value| value as &dyn ToSql).collect();
                insert.execute(params.as_slice())?;
            }
            Ok(())
        })();

        match result {
            Ok(()) => {
                self.connection.execute_batch("COMMIT")?;
                Ok(())
            }
            Err(error) => {
                let _ = self.connection.execute_batch("ROLLBACK");
                Err(error)
            }
        }
    }

    /// Run the plan's SQL with its bound parameters and collect rows.
    fn execute_plan(&self, plan: &JoinPlan) -> Result<Vec<Record>, StagingError> {
        let mut statement = self.connection.prepare(plan.sql())?;
        let duck_params: Vec<DuckValue> = plan.params().iter().map(json_to_duck).collect();
        let params: Vec<&dyn ToSql> = duck_params.iter().map(|value| value as &dyn ToSql).collect();

        let mut cursor = statement.query(params.as_slice())?;
        let mut column_names: Option<Vec<String>> = None;
        let mut rows = Vec::new();

        while let Some(row) = cursor.next()? {
            let names = match &column_names {
                Some(names) => names,
                None => {
                    let stmt = row.as_ref();
                    let names = (0..stmt.column_count())
                        .map(|index| stmt.column_name(index).map(ToString::to_string))
                        .collect::<Result<Vec<_>, _>>()?;
                    column_names.insert(names)
                }
            };

            let mut record = Record::new();
            for (index, name) in names.iter().enumerate() {
                let value: DuckValue = row.get(index)?;
                record.insert(name.clone(), duck_to_json(value));
            }
            rows.push(record);
        }

        Ok(rows)
    }
}

/// Column storage kind inferred from JSON scalar kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Boolean,
    BigInt,
    Double,
    Varchar,
    /// No non-null value observed; stored as VARCHAR holding only NULLs.
    Unknown,
}

impl ColumnKind {
    fn of(value: &Value) -> Self {
        match value {
            Value::Null => Self::Unknown,
            Value::Bool(_) => Self::Boolean,
            Value::Number(number) if number.is_i64() || number.is_u64() => Self::BigInt,
            Value::Number(_) => Self::Double,
            Value::String(_) | Value::Array(_) | Value::Object(_) => Self::Varchar,
        }
    }

    /// Widen toward a kind that can hold both operands.
    fn merge(self, other: Self) -> Self {
        match (self, other) {
            (Self::Unknown, kind) | (kind, Self::Unknown) => kind,
            (left, right) if left == right => left,
            (Self::BigInt, Self::Double) | (Self::Double, Self::BigInt) => Self::Double,
            _ => Self::Varchar,
        }
    }

    const fn sql_type(self) -> &'static str {
        match self {
            Self::Boolean => "BOOLEAN",
            Self::BigInt => "BIGINT",
            Self::Double => "DOUBLE",
            Self::Varchar | Self::Unknown => "VARCHAR",
        }
    }

    /// Convert a record value into this column's storage representation.
    fn coerce(self, value: Option<&Value>) -> DuckValue {
        let Some(value) = value else {
            return DuckValue::Null;
        };
        match (self, value) {
            (_, Value::Null) => DuckValue::Null,
            (Self::Boolean, Value::Bool(flag)) => DuckValue::Boolean(*flag),
            (Self::BigInt, Value::Number(number)) => number
                .as_i64()
                .map(DuckValue::BigInt)
                .unwrap_or(DuckValue::Null),
            (Self::Double, Value::Number(number)) => number
                .as_f64()
                .map(DuckValue::Double)
                .unwrap_or(DuckValue::Null),
            (_, Value::String(text)) => DuckValue::Text(text.clone()),
            // Mixed-kind columns and structured values fall back to text.
            (_, other) => DuckValue::Text(other.to_string()),
        }
    }
}

/// Union of declared columns and every field observed in the records,
/// each with its inferred storage kind.
fn column_layout(binding: &TableBinding, records: &[Record]) -> Vec<(String, ColumnKind)> {
    let mut names = BTreeSet::new();
    for column in &binding.columns {
        names.insert(column.clone());
    }
    for record in records {
        for field in record.keys() {
            names.insert(field.clone());
        }
    }

    names
        .into_iter()
        .map(|name| {
            let kind = records
                .iter()
                .filter_map(|record| record.get(&name))
                .fold(ColumnKind::Unknown, |kind, value| {
                    kind.merge(ColumnKind::of(value))
                });
            (name, kind)
        })
        .collect()
}

fn json_to_duck(value: &Value) -> DuckValue {
    match value {
        Value::Null => DuckValue::Null,
        Value::Bool(flag) => DuckValue::Boolean(*flag),
        Value::Number(number) => {
            if let Some(int) = number.as_i64() {
                DuckValue::BigInt(int)
            } else {
                number
                    .as_f64()
                    .map(DuckValue::Double)
                    .unwrap_or(DuckValue::Null)
            }
        }
        Value::String(text) => DuckValue::Text(text.clone()),
        other => DuckValue::Text(other.to_string()),
    }
}

fn duck_to_json(value: DuckValue) -> Value {
    match value {
        DuckValue::Null => Value::Null,
        DuckValue::Boolean(flag) => Value::Bool(flag),
        DuckValue::TinyInt(v) => Value::Number(Number::from(v)),
        DuckValue::SmallInt(v) => Value::Number(Number::from(v)),
        DuckValue::Int(v) => Value::Number(Number::from(v)),
        DuckValue::BigInt(v) => Value::Number(Number::from(v)),
        DuckValue::UTinyInt(v) => Value::Number(Number::from(v)),
        DuckValue::USmallInt(v) => Value::Number(Number::from(v)),
        DuckValue::UInt(v) => Value::Number(Number::from(v)),
        DuckValue::UBigInt(v) => Value::Number(Number::from(v)),
        DuckValue::Float(v) => number_from_f64(f64::from(v)),
        DuckValue::Double(v) => number_from_f64(v),
        DuckValue::Text(v) => Value::String(v),
        other => Value::String(format!("{other:?}")),
    }
}

/// NaN/Inf have no JSON representation; they become null.
fn number_from_f64(value: f64) -> Value {
    Number::from_f64(value).map(Value::Number).unwrap_or(Value::Null)
}

fn normalize_sql(sql: String) -> Result<String, StagingError> {
    let trimmed = sql.trim().trim_end_matches(';').trim();
    if trimmed.is_empty() {
        return Err(StagingError::PlanRejected(String::from(
            "query must not be empty",
        )));
    }
    if !is_select_like(trimmed) {
        return Err(StagingError::PlanRejected(String::from(
            "join plans accept only SELECT/CTE queries",
        )));
    }
    if trimmed.split(';').filter(|part| !part.trim().is_empty()).count() > 1 {
        return Err(StagingError::PlanRejected(String::from(
            "multiple SQL statements are not allowed in a join plan",
        )));
    }
    Ok(trimmed.to_string())
}

fn is_select_like(sql: &str) -> bool {
    let first_keyword = sql
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase();
    matches!(first_keyword.as_str(), "SELECT" | "WITH")
}

/// Quote an identifier for use in DDL. Identifiers come from plan aliases
/// and fetched field names, which are not trusted SQL text.
fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(pairs: &[(&str, Value)]) -> Record {
        pairs
            .iter()
            .map(|(name, value)| ((*name).to_string(), value.clone()))
            .collect()
    }

    fn orders_and_items() -> BTreeMap<String, Vec<Record>> {
        let mut tables = BTreeMap::new();
        tables.insert(
            String::from("SLCoItems"),
            vec![
                record(&[
                    ("order_num", json!("CO-1001")),
                    ("item", json!("FRAME-12")),
                    ("qty", json!(4)),
                ]),
                record(&[
                    ("order_num", json!("CO-1002")),
                    ("item", json!("RAIL-7")),
                    ("qty", json!(2)),
                ]),
            ],
        );
        tables.insert(
            String::from("SLItems"),
            vec![record(&[
                ("item", json!("FRAME-12")),
                ("description", json!("Welded frame")),
            ])],
        );
        tables
    }

    #[test]
    fn outer_join_keeps_rows_without_a_match() {
        let store = StagingStore::new().expect("staging store");
        let plan = JoinPlan::new(
            "SELECT o.order_num, o.qty, i.description \
             FROM orders o LEFT OUTER JOIN items i ON o.item = i.item \
             ORDER BY o.order_num",
        )
        .expect("plan")
        .with_table(TableBinding::new("orders", "SLCoItems"))
        .with_table(TableBinding::new("items", "SLItems"));

        let rows = store.join(&orders_and_items(), &plan).expect("join");

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["description"], json!("Welded frame"));
        assert_eq!(rows[1]["description"], Value::Null);
        assert_eq!(rows[1]["qty"], json!(2));
    }

    #[test]
    fn empty_collection_materializes_and_joins_without_error() {
        let store = StagingStore::new().expect("staging store");
        let mut tables = orders_and_items();
        tables.insert(String::from("SLItems"), Vec::new());

        let plan = JoinPlan::new(
            "SELECT o.order_num, i.description \
             FROM orders o LEFT OUTER JOIN items i ON o.item = i.item \
             ORDER BY o.order_num",
        )
        .expect("plan")
        .with_table(TableBinding::new("orders", "SLCoItems"))
        .with_table(
            TableBinding::new("items", "SLItems").with_columns(["item", "description"]),
        );

        let rows = store.join(&tables, &plan).expect("join");

        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|row| row["description"] == Value::Null));
    }

    #[test]
    fn missing_collection_with_no_declared_columns_is_rejected() {
        let store = StagingStore::new().expect("staging store");
        let plan = JoinPlan::new("SELECT * FROM ghost")
            .expect("plan")
            .with_table(TableBinding::new("ghost", "SLGhost"));

        let error = store.join(&BTreeMap::new(), &plan).expect_err("should reject");
        assert!(matches!(error, StagingError::PlanRejected(_)));
    }

    #[test]
    fn parameters_bind_rather_than_interpolate() {
        let store = StagingStore::new().expect("staging store");
        let hostile = "FRAME-12' OR '1'='1";
        let mut tables = BTreeMap::new();
        tables.insert(
            String::from("SLItems"),
            vec![
                record(&[("item", json!("FRAME-12"))]),
                record(&[("item", json!(hostile))]),
            ],
        );

        let plan = JoinPlan::new("SELECT i.item FROM items i WHERE i.item = ?")
            .expect("plan")
            .with_table(TableBinding::new("items", "SLItems"))
            .with_param(hostile);

        let rows = store.join(&tables, &plan).expect("join");

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["item"], json!(hostile));
    }

    #[test]
    fn repeated_join_is_deterministic() {
        let tables = orders_and_items();
        let plan = JoinPlan::new(
            "SELECT o.order_num, o.qty, i.description \
             FROM orders o LEFT OUTER JOIN items i ON o.item = i.item \
             ORDER BY o.order_num",
        )
        .expect("plan")
        .with_table(TableBinding::new("orders", "SLCoItems"))
        .with_table(TableBinding::new("items", "SLItems"));

        let first = StagingStore::new()
            .expect("store")
            .join(&tables, &plan)
            .expect("first join");
        let second = StagingStore::new()
            .expect("store")
            .join(&tables, &plan)
            .expect("second join");

        assert_eq!(first, second);
    }

    #[test]
    fn aggregation_over_mixed_numeric_column_widens_to_double() {
        let store = StagingStore::new().expect("staging store");
        let mut tables = BTreeMap::new();
        tables.insert(
            String::from("SLJobs"),
            vec![
                record(&[("job", json!("J1")), ("hours", json!(8))]),
                record(&[("job", json!("J2")), ("hours", json!(3.5))]),
            ],
        );

        let plan = JoinPlan::new("SELECT SUM(j.hours) AS total_hours FROM jobs j")
            .expect("plan")
            .with_table(TableBinding::new("jobs", "SLJobs"));

        let rows = store.join(&tables, &plan).expect("join");
        assert_eq!(rows[0]["total_hours"], json!(11.5));
    }

    #[test]
    fn non_select_plan_is_rejected_up_front() {
        let error = JoinPlan::new("DROP TABLE orders").expect_err("should reject");
        assert!(matches!(error, StagingError::PlanRejected(_)));
    }

    #[test]
    fn output_columns_are_named_by_the_query() {
        let store = StagingStore::new().expect("staging store");
        let mut tables = BTreeMap::new();
        tables.insert(
            String::from("SLItems"),
            vec![record(&[("item", json!("FRAME-12")), ("qty_on_hand", json!(5))])],
        );

        let plan = JoinPlan::new("SELECT i.item AS part_number, i.qty_on_hand FROM items i")
            .expect("plan")
            .with_table(TableBinding::new("items", "SLItems"));

        let rows = store.join(&tables, &plan).expect("join");
        assert!(rows[0].contains_key("part_number"));
        assert!(rows[0].contains_key("qty_on_hand"));
    }
}
