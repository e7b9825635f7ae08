//! # Progress Calculator
//!
//! Completion counts and the integer progress percentage.
//!
//! All functions accept an optional completion map: a tender that has never
//! been touched by the workflow has no map at all, which reads as zero
//! progress with stage 1 next.

use crate::primitives::TOTAL_STAGES;
use crate::system::stage::{STAGE_ORDER, StageDefinition, StageId, get_stage_definition};
use crate::types::CompletionMap;
use serde::Serialize;

/// Number of stages with `done == true`. Missing entries count as not done.
#[must_use]
pub fn completed_count(map: Option<&CompletionMap>) -> usize {
    let Some(map) = map else {
        return 0;
    };
    STAGE_ORDER
        .iter()
        .filter(|id| map.get(*id).is_some_and(|record| record.done))
        .count()
}

/// Percentage for `completed` of 16 stages, rounded half up.
///
/// Integer only: `(100 * k + 8) / 16`.
#[must_use]
pub fn percent_for(completed: usize) -> u8 {
    let k = completed.min(TOTAL_STAGES);
    let percent = (100 * k + TOTAL_STAGES / 2) / TOTAL_STAGES;
    percent as u8
}

/// Progress percentage of a completion map. Absent map reads as 0.
#[must_use]
pub fn progress_percent(map: Option<&CompletionMap>) -> u8 {
    percent_for(completed_count(map))
}

/// First stage in order that is not done; `None` when all 16 are complete.
#[must_use]
pub fn next_incomplete_stage(map: Option<&CompletionMap>) -> Option<&'static StageDefinition> {
    STAGE_ORDER
        .iter()
        .find(|id| !map.is_some_and(|m| m.get(*id).is_some_and(|record| record.done)))
        .map(|id| get_stage_definition(*id))
}

/// Everything a progress view needs in one value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSummary {
    pub completed: usize,
    pub total: usize,
    pub percent: u8,
    pub next_stage: Option<StageId>,
}

impl ProgressSummary {
    #[must_use]
    pub fn of(map: Option<&CompletionMap>) -> Self {
        let completed = completed_count(map);
        Self {
            completed,
            total: TOTAL_STAGES,
            percent: percent_for(completed),
            next_stage: next_incomplete_stage(map).map(|def| def.id),
        }
    }

    /// Check if every stage is done.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.completed == self.total
    }
}
