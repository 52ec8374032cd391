//! Greedy, stage-ordered allocation of supply pools to demand lines.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::Date;

use crate::calendar::BusinessDayCalendar;

/// A discrete supply stage, ordered from nearest-to-completion back to
/// the earliest production step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupplyStage {
    /// Finished stock on the shelf.
    OnHand,
    /// Work-in-process at the paint stage.
    Paint,
    /// Work-in-process at the blast stage.
    Blast,
    /// Released fabrication: WIP not yet through blast or paint.
    ReleasedFab,
}

impl SupplyStage {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OnHand => "on_hand",
            Self::Paint => "paint",
            Self::Blast => "blast",
            Self::ReleasedFab => "released_fab",
        }
    }
}

/// Per-item supply snapshot across all stages.
///
/// Quantities clamp to zero at construction; negative stage values are
/// arithmetic artifacts of the source data, never real supply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupplyPool {
    pub item: String,
    pub on_hand: f64,
    pub paint: f64,
    pub blast: f64,
    pub released_fab: f64,
    /// Release date of the item's active job, when known. Drives the
    /// projected completion dates on allocation outcomes.
    #[serde(default)]
    pub release_date: Option<Date>,
}

impl SupplyPool {
    pub fn new(
        item: impl Into<String>,
        on_hand: f64,
        paint: f64,
        blast: f64,
        released_fab: f64,
    ) -> Self {
        Self {
            item: item.into(),
            on_hand: on_hand.max(0.0),
            paint: paint.max(0.0),
            blast: blast.max(0.0),
            released_fab: released_fab.max(0.0),
            release_date: None,
        }
    }

    /// Build a pool from raw ERP figures where only the WIP total is
    /// tracked directly: released fabrication derives as
    /// `total_wip - (paint + blast)`, clamped at zero.
    pub fn from_wip_total(
        item: impl Into<String>,
        on_hand: f64,
        total_wip: f64,
        paint: f64,
        blast: f64,
    ) -> Self {
        let released_fab = total_wip - (paint.max(0.0) + blast.max(0.0));
        Self::new(item, on_hand, paint, blast, released_fab)
    }

    pub fn with_release_date(mut self, date: Date) -> Self {
        self.release_date = Some(date);
        self
    }

    fn quantity(&self, stage: SupplyStage) -> f64 {
        match stage {
            SupplyStage::OnHand => self.on_hand,
            SupplyStage::Paint => self.paint,
            SupplyStage::Blast => self.blast,
            SupplyStage::ReleasedFab => self.released_fab,
        }
    }
}

/// One open order line competing for supply.
///
/// Constructed per request from joined order data, never persisted. The
/// allocation pass does not mutate demand lines; each line receives an
/// immutable [`AllocationOutcome`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemandLine {
    pub order_num: String,
    pub line: u32,
    pub item: String,
    /// Remaining requested quantity; lines at or below zero are skipped.
    pub remaining: f64,
    pub due_date: Date,
    pub line_amount: f64,
    pub customer: String,
    /// Job orders feeding this line, if any.
    #[serde(default)]
    pub jobs: Vec<String>,
}

impl DemandLine {
    /// Sort lines into allocation priority: due date first, ties broken
    /// by customer name then item. The engine itself never reorders its
    /// input; callers sort once up front.
    pub fn priority_sort(lines: &mut [DemandLine]) {
        lines.sort_by(|left, right| {
            left.due_date
                .cmp(&right.due_date)
                .then_with(|| left.customer.cmp(&right.customer))
                .then_with(|| left.item.cmp(&right.item))
        });
    }
}

/// Quantity taken from one stage for one demand line.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StageTake {
    pub stage: SupplyStage,
    pub quantity: f64,
}

/// Projected stage-completion dates for an item with a known release
/// date, one per stage transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProjectedDates {
    pub fabricated: Date,
    pub blasted: Date,
    pub painted: Date,
}

/// Immutable allocation result for one demand line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AllocationOutcome {
    pub order_num: String,
    pub line: u32,
    pub item: String,
    pub requested: f64,
    /// Per-stage takes in the order stages were drawn from.
    pub takes: Vec<StageTake>,
    pub covered: f64,
    /// `requested - covered`, floored at zero.
    pub shortage: f64,
    pub projected: Option<ProjectedDates>,
}

/// Legacy business constants for the allocation pass.
///
/// The stage ordering and the 4/7/10 business-day offsets come from the
/// legacy stored procedure this engine reproduces; they are configuration
/// pending business-owner confirmation, not invariants.
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationConfig {
    /// Stages drawn from, in priority order.
    pub stage_order: Vec<SupplyStage>,
    /// Business days from release to fabrication complete.
    pub fabricated_offset: u32,
    /// Business days from release to blast complete.
    pub blasted_offset: u32,
    /// Business days from release to paint complete.
    pub painted_offset: u32,
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            stage_order: vec![
                SupplyStage::OnHand,
                SupplyStage::Paint,
                SupplyStage::Blast,
                SupplyStage::ReleasedFab,
            ],
            fabricated_offset: 4,
            blasted_offset: 7,
            painted_offset: 10,
        }
    }
}

/// The allocation engine: pure, synchronous computation over in-memory
/// snapshots. No suspension points, no shared state.
#[derive(Debug, Clone)]
pub struct Allocator {
    config: AllocationConfig,
    calendar: BusinessDayCalendar,
}

impl Allocator {
    pub fn new(config: AllocationConfig, calendar: BusinessDayCalendar) -> Self {
        Self { config, calendar }
    }

    /// Allocate supply to demand lines in input order.
    ///
    /// Input order IS the priority: the pool mutates sequentially as
    /// lines consume it, so processing must not be reordered or
    /// parallelized. The caller's pool snapshot is left untouched; the
    /// engine drains a private copy.
    ///
    /// Lines with non-positive remaining quantity are skipped entirely.
    /// An item with no pool allocates against all-zero stages.
    pub fn allocate(
        &self,
        lines: &[DemandLine],
        pools: &BTreeMap<String, SupplyPool>,
    ) -> Vec<AllocationOutcome> {
        let mut working: BTreeMap<&str, [f64; 4]> = pools
            .iter()
            .map(|(item, pool)| {
                (
                    item.as_str(),
                    [
                        pool.quantity(SupplyStage::OnHand),
                        pool.quantity(SupplyStage::Paint),
                        pool.quantity(SupplyStage::Blast),
                        pool.quantity(SupplyStage::ReleasedFab),
                    ],
                )
            })
            .collect();

        let mut outcomes = Vec::with_capacity(lines.len());
        for line in lines {
            if line.remaining <= 0.0 {
                continue;
            }

            let mut remaining = line.remaining;
            let mut takes = Vec::new();
            if let Some(stages) = working.get_mut(line.item.as_str()) {
                for &stage in &self.config.stage_order {
                    if remaining <= 0.0 {
                        break;
                    }
                    let slot = stage_slot(stage);
                    let take = remaining.min(stages[slot]);
                    if take <= 0.0 {
                        continue;
                    }
                    stages[slot] -= take;
                    remaining -= take;
                    takes.push(StageTake {
                        stage,
                        quantity: take,
                    });
                }
            }

            let covered = line.remaining - remaining;
            let projected = pools
                .get(&line.item)
                .and_then(|pool| pool.release_date)
                .map(|release| self.project(release));

            outcomes.push(AllocationOutcome {
                order_num: line.order_num.clone(),
                line: line.line,
                item: line.item.clone(),
                requested: line.remaining,
                takes,
                covered,
                shortage: (line.remaining - covered).max(0.0),
                projected,
            });
        }

        outcomes
    }

    fn project(&self, release: Date) -> ProjectedDates {
        ProjectedDates {
            fabricated: self
                .calendar
                .add_business_days(release, self.config.fabricated_offset),
            blasted: self
                .calendar
                .add_business_days(release, self.config.blasted_offset),
            painted: self
                .calendar
                .add_business_days(release, self.config.painted_offset),
        }
    }
}

const fn stage_slot(stage: SupplyStage) -> usize {
    match stage {
        SupplyStage::OnHand => 0,
        SupplyStage::Paint => 1,
        SupplyStage::Blast => 2,
        SupplyStage::ReleasedFab => 3,
    }
}
