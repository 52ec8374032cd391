use serde::Serialize;
use serde_json::Value;
use time::Date;

use forgeline_allocation::BusinessDayCalendar;

use crate::cli::{CalendarArgs, CalendarCommand};
use crate::error::CliError;

use super::parse_date;

#[derive(Debug, Serialize)]
struct AddDaysOutput {
    start: Date,
    days: u32,
    result: Date,
}

pub fn run(args: &CalendarArgs) -> Result<Value, CliError> {
    match &args.command {
        CalendarCommand::AddDays(add) => {
            let start = parse_date(&add.start)?;
            let mut calendar = BusinessDayCalendar::default();
            for holiday in &add.holidays {
                calendar = calendar.with_holiday(parse_date(holiday)?);
            }
            let result = calendar.add_business_days(start, add.days);
            Ok(serde_json::to_value(AddDaysOutput {
                start,
                days: add.days,
                result,
            })?)
        }
    }
}
