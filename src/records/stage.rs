//! Deal pipeline side effects.
//!
//! Any stage may move to any other stage. A deal in `closed_won` or
//! `closed_lost` always has `probability` 100 and an `actual_close_date`,
//! stamped on the first write that leaves it closed. Reopening a closed deal
//! keeps both values: the close date and probability are not reset.

use chrono::{DateTime, Utc};

use crate::records::{Deal, DealKind, DealPatch, WriteHook};

pub const CLOSED_PROBABILITY: i32 = 100;

#[derive(Debug, Clone, Copy, Default)]
pub struct StageTransitionPolicy;

impl StageTransitionPolicy {
    pub fn apply(&self, deal: &mut Deal, now: DateTime<Utc>) {
        if !deal.stage.is_closed() {
            return;
        }
        if deal.actual_close_date.is_none() {
            deal.actual_close_date = Some(now);
        }
        deal.probability = CLOSED_PROBABILITY;
    }
}

impl WriteHook<DealKind> for StageTransitionPolicy {
    fn on_create(&self, deal: &mut Deal, now: DateTime<Utc>) {
        self.apply(deal, now);
    }

    /// Runs on every update, so a patch touching only `probability` cannot
    /// move a closed deal off 100.
    fn on_update(&self, deal: &mut Deal, _patch: &DealPatch, now: DateTime<Utc>) {
        self.apply(deal, now);
    }
}
