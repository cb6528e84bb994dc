//! Budget ledger — the safety valve in front of every paid model call.
//!
//! Tracks cumulative token usage against a rolling daily allowance and
//! gates expensive operations behind an atomic reserve/commit protocol:
//!
//! 1. `reserve(estimated)` — authorize the spend or deny it. Denial is a
//!    normal outcome, not an error.
//! 2. `commit(authorization, actual)` — record what was actually consumed.
//! 3. `release(authorization)` — abandon a reservation without spending.
//!
//! Day rollover is detected lazily: the first `reserve` after the UTC date
//! changes resets usage to zero before evaluating the request. State is
//! persisted to a small durable JSON record and reloaded before the ledger
//! serves any reservation.

mod ledger;
mod state;

pub use ledger::{Authorization, BudgetLedger, BudgetLimits, Denial, ReserveOutcome};
pub use state::{BudgetState, BudgetStatus};

use thiserror::Error;

/// Errors from budget state persistence.
#[derive(Debug, Error)]
pub enum BudgetError {
    #[error("Budget state storage error: {0}")]
    Storage(String),

    #[error("Budget state serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
