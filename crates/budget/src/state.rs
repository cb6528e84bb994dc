//! Durable budget state — the small record that survives restarts.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

use crate::BudgetError;

/// The persisted budget record: which day it covers, how much of the
/// allowance is spent, and how many requests consumed it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetState {
    /// The UTC date this usage belongs to
    pub date: NaiveDate,

    /// Tokens committed so far today
    pub tokens_used: u64,

    /// The daily allowance
    pub daily_limit: u64,

    /// Requests that committed spend today
    pub request_count: u64,
}

impl BudgetState {
    /// A fresh state for the given day and limit.
    pub fn fresh(date: NaiveDate, daily_limit: u64) -> Self {
        Self { date, tokens_used: 0, daily_limit, request_count: 0 }
    }

    /// Tokens still available today.
    pub fn tokens_remaining(&self) -> u64 {
        self.daily_limit.saturating_sub(self.tokens_used)
    }

    /// Fraction of the allowance consumed, in [0, 1].
    pub fn usage_ratio(&self) -> f64 {
        if self.daily_limit == 0 {
            return 1.0;
        }
        (self.tokens_used as f64 / self.daily_limit as f64).min(1.0)
    }

    /// Load state from disk. A missing file yields a fresh state; a corrupt
    /// file is discarded with a warning rather than wedging startup.
    pub fn load(path: &Path, today: NaiveDate, daily_limit: u64) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => {
                debug!(path = %path.display(), "No budget state on disk; starting fresh");
                return Self::fresh(today, daily_limit);
            }
        };

        match serde_json::from_str::<BudgetState>(&content) {
            Ok(mut state) => {
                // The configured limit is authoritative over the persisted one
                state.daily_limit = daily_limit;
                state
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Corrupt budget state; starting fresh");
                Self::fresh(today, daily_limit)
            }
        }
    }

    /// Persist state to disk.
    ///
    /// Writes to a sibling `.tmp` file then renames, so a crash mid-write
    /// never leaves a corrupt state file.
    pub fn save(&self, path: &Path) -> Result<(), BudgetError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                BudgetError::Storage(format!("Failed to create budget state directory: {e}"))
            })?;
        }

        let json = serde_json::to_string(self)?;
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, &json)
            .map_err(|e| BudgetError::Storage(format!("Failed to write budget state: {e}")))?;
        std::fs::rename(&tmp, path)
            .map_err(|e| BudgetError::Storage(format!("Failed to replace budget state: {e}")))?;
        Ok(())
    }
}

/// A point-in-time view of the ledger, including in-flight reservations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetStatus {
    /// The day the usage covers
    pub date: NaiveDate,

    /// Tokens committed today
    pub tokens_used: u64,

    /// Tokens held by open reservations
    pub tokens_reserved: u64,

    /// Tokens still available (after committed usage)
    pub tokens_remaining: u64,

    /// The daily allowance
    pub daily_limit: u64,

    /// Fraction of the allowance consumed
    pub usage_ratio: f64,

    /// Usage has crossed the warning threshold
    pub is_warning: bool,

    /// Usage has reached the daily limit
    pub is_exhausted: bool,

    /// Requests that committed spend today
    pub request_count: u64,
}
