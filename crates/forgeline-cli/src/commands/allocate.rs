use std::collections::BTreeMap;

use serde_json::Value;

use forgeline_allocation::{
    AllocationConfig, Allocator, BusinessDayCalendar, DemandLine, SupplyPool,
};

use crate::cli::AllocateArgs;
use crate::error::CliError;

use super::parse_date;

pub fn run(args: &AllocateArgs) -> Result<Value, CliError> {
    let demand_raw = std::fs::read_to_string(&args.demand)?;
    let mut lines: Vec<DemandLine> = serde_json::from_str(&demand_raw)
        .map_err(|e| CliError::Command(format!("invalid demand file: {e}")))?;

    let supply_raw = std::fs::read_to_string(&args.supply)?;
    let pools: Vec<SupplyPool> = serde_json::from_str(&supply_raw)
        .map_err(|e| CliError::Command(format!("invalid supply file: {e}")))?;
    let pools: BTreeMap<String, SupplyPool> = pools
        .into_iter()
        .map(|pool| (pool.item.clone(), pool))
        .collect();

    let mut calendar = BusinessDayCalendar::default();
    for holiday in &args.holidays {
        calendar = calendar.with_holiday(parse_date(holiday)?);
    }

    if !args.no_sort {
        DemandLine::priority_sort(&mut lines);
    }

    let allocator = Allocator::new(AllocationConfig::default(), calendar);
    let outcomes = allocator.allocate(&lines, &pools);
    Ok(serde_json::to_value(outcomes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::AllocateArgs;
    use serde_json::json;

    #[test]
    fn allocates_demand_against_supply_from_json_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let demand_path = dir.path().join("demand.json");
        let supply_path = dir.path().join("supply.json");
        std::fs::write(
            &demand_path,
            json!([
                {
                    "order_num": "CO-100",
                    "line": 1,
                    "item": "FRAME-12",
                    "remaining": 8.0,
                    "due_date": "2026-03-02",
                    "line_amount": 800.0,
                    "customer": "Acme"
                },
                {
                    "order_num": "CO-101",
                    "line": 1,
                    "item": "FRAME-12",
                    "remaining": 6.0,
                    "due_date": "2026-03-09",
                    "line_amount": 600.0,
                    "customer": "Acme"
                }
            ])
            .to_string(),
        )
        .expect("write demand");
        std::fs::write(
            &supply_path,
            json!([
                {
                    "item": "FRAME-12",
                    "on_hand": 5.0,
                    "paint": 3.0,
                    "blast": 0.0,
                    "released_fab": 5.0
                }
            ])
            .to_string(),
        )
        .expect("write supply");

        let args = AllocateArgs {
            demand: demand_path,
            supply: supply_path,
            holidays: Vec::new(),
            no_sort: false,
        };
        let value = run(&args).expect("allocate");

        let outcomes = value.as_array().expect("array");
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0]["covered"], json!(8.0));
        assert_eq!(outcomes[1]["shortage"], json!(1.0));
    }

    #[test]
    fn rejects_malformed_demand_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let demand_path = dir.path().join("demand.json");
        let supply_path = dir.path().join("supply.json");
        std::fs::write(&demand_path, "not json").expect("write demand");
        std::fs::write(&supply_path, "[]").expect("write supply");

        let args = AllocateArgs {
            demand: demand_path,
            supply: supply_path,
            holidays: Vec::new(),
            no_sort: false,
        };
        assert!(matches!(run(&args), Err(CliError::Command(_))));
    }
}
