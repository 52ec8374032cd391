//! # Forgeline Allocation
//!
//! Order-to-inventory availability: a priority-ordered allocation pass
//! over multi-stage supply pools, plus the business-day calendar used to
//! project stage-completion dates.
//!
//! The allocation procedure reproduces a documented legacy routine:
//! demand lines are processed strictly in the order given (due date is
//! the priority), each line draws from its item's supply stages in a
//! fixed order (finished stock first, then work-in-process stages from
//! nearest-to-completion back to released fabrication), and any item with
//! a known release date gets projected completion dates at configurable
//! business-day offsets.
//!
//! Both the stage ordering and the day offsets are legacy business
//! constants carried on [`AllocationConfig`] rather than baked into the
//! algorithm.

pub mod calendar;
pub mod engine;

pub use calendar::{BusinessDayCalendar, CalendarError};
pub use engine::{
    AllocationConfig, AllocationOutcome, Allocator, DemandLine, ProjectedDates, StageTake,
    SupplyPool, SupplyStage,
};
