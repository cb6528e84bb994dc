//! The budget ledger — atomic reserve/commit over the daily allowance.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use chrono::{NaiveDate, Utc};
use switchyard_core::error::Fault;

use crate::state::{BudgetState, BudgetStatus};
use crate::BudgetError;

/// Limits the ledger enforces. Loaded from configuration at startup.
#[derive(Debug, Clone, Copy)]
pub struct BudgetLimits {
    /// Tokens allowed per UTC day
    pub daily_limit_tokens: u64,

    /// Largest single reservation allowed (0 = uncapped)
    pub per_request_max_tokens: u64,

    /// Usage ratio at which status reports a warning
    pub warning_threshold: f64,
}

impl Default for BudgetLimits {
    fn default() -> Self {
        Self {
            daily_limit_tokens: 100_000,
            per_request_max_tokens: 8_000,
            warning_threshold: 0.8,
        }
    }
}

/// Proof that the ledger authorized a spend.
///
/// Single-use: `commit` and `release` consume it. A dropped authorization
/// leaks its reserved capacity until the next day rollover, so the dispatch
/// loop always resolves one or the other.
#[derive(Debug)]
pub struct Authorization {
    id: u64,
    estimated: u64,
}

impl Authorization {
    /// The estimate this authorization holds against the allowance.
    pub fn estimated(&self) -> u64 {
        self.estimated
    }
}

/// Why a reservation was denied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Denial {
    /// Committed plus in-flight usage leaves no room for the estimate
    DailyLimitReached { requested: u64, used: u64, reserved: u64, limit: u64 },

    /// The single reservation exceeds the per-request cap
    PerRequestCap { requested: u64, cap: u64 },
}

impl Denial {
    /// Stable human-readable reason for the caller.
    pub fn reason(&self) -> String {
        match self {
            Denial::DailyLimitReached { requested, used, reserved, limit } => format!(
                "daily token limit reached: requested {requested}, used {used} + reserved {reserved} of {limit}"
            ),
            Denial::PerRequestCap { requested, cap } => {
                format!("request estimate {requested} exceeds per-request cap {cap}")
            }
        }
    }
}

impl From<Denial> for Fault {
    fn from(denial: Denial) -> Self {
        Fault::BudgetDenied { reason: denial.reason() }
    }
}

/// The outcome of `reserve`: authorized or denied.
///
/// Denial is an expected result, deliberately not an `Err` — transient
/// storage faults and budget exhaustion must stay distinguishable.
#[derive(Debug)]
pub enum ReserveOutcome {
    Authorized(Authorization),
    Denied(Denial),
}

impl ReserveOutcome {
    /// Whether the reservation was authorized.
    pub fn is_authorized(&self) -> bool {
        matches!(self, ReserveOutcome::Authorized(_))
    }
}

struct Inner {
    state: BudgetState,
    /// Tokens held by open reservations
    reserved: u64,
    /// Open reservations: authorization id → estimate
    open: HashMap<u64, u64>,
    next_id: u64,
}

/// The process-wide budget ledger.
///
/// All requests share one ledger; `reserve` is the sole global
/// serialization point in the system, so the critical section is kept to
/// the compare-and-increment alone.
pub struct BudgetLedger {
    limits: BudgetLimits,
    state_path: Option<PathBuf>,
    inner: Arc<Mutex<Inner>>,
}

impl BudgetLedger {
    /// Open a ledger backed by a durable state file.
    ///
    /// The persisted record is reloaded before any `reserve` is served; a
    /// record from a previous day is reset on first use.
    pub fn open(path: impl Into<PathBuf>, limits: BudgetLimits) -> Self {
        let path = path.into();
        let today = Utc::now().date_naive();
        let state = BudgetState::load(&path, today, limits.daily_limit_tokens);
        info!(
            date = %state.date,
            used = state.tokens_used,
            limit = state.daily_limit,
            "Budget ledger loaded"
        );
        Self {
            limits,
            state_path: Some(path),
            inner: Arc::new(Mutex::new(Inner {
                state,
                reserved: 0,
                open: HashMap::new(),
                next_id: 1,
            })),
        }
    }

    /// An in-process ledger with no persistence (tests, ephemeral runs).
    pub fn ephemeral(limits: BudgetLimits) -> Self {
        let today = Utc::now().date_naive();
        Self {
            limits,
            state_path: None,
            inner: Arc::new(Mutex::new(Inner {
                state: BudgetState::fresh(today, limits.daily_limit_tokens),
                reserved: 0,
                open: HashMap::new(),
                next_id: 1,
            })),
        }
    }

    /// Request permission to spend `estimated` tokens.
    ///
    /// Atomic across concurrent callers: committed plus in-flight usage can
    /// never exceed the daily limit by more than one in-flight
    /// over-estimate. Rolls the day over lazily before evaluating.
    pub async fn reserve(&self, estimated: u64) -> ReserveOutcome {
        let mut inner = self.inner.lock().await;
        self.roll_over_if_needed(&mut inner, Utc::now().date_naive());

        if self.limits.per_request_max_tokens > 0
            && estimated > self.limits.per_request_max_tokens
        {
            return ReserveOutcome::Denied(Denial::PerRequestCap {
                requested: estimated,
                cap: self.limits.per_request_max_tokens,
            });
        }

        let projected = inner.state.tokens_used + inner.reserved + estimated;
        if projected > inner.state.daily_limit {
            debug!(
                requested = estimated,
                used = inner.state.tokens_used,
                reserved = inner.reserved,
                limit = inner.state.daily_limit,
                "Budget reservation denied"
            );
            return ReserveOutcome::Denied(Denial::DailyLimitReached {
                requested: estimated,
                used: inner.state.tokens_used,
                reserved: inner.reserved,
                limit: inner.state.daily_limit,
            });
        }

        let id = inner.next_id;
        inner.next_id += 1;
        inner.reserved += estimated;
        inner.open.insert(id, estimated);

        ReserveOutcome::Authorized(Authorization { id, estimated })
    }

    /// Record the actual spend for an authorized reservation.
    ///
    /// The actual may differ from the estimate in either direction; an
    /// overshoot on one in-flight call is the tolerated race window.
    pub async fn commit(&self, authorization: Authorization, actual: u64) -> Result<(), BudgetError> {
        let mut inner = self.inner.lock().await;

        match inner.open.remove(&authorization.id) {
            Some(estimated) => inner.reserved = inner.reserved.saturating_sub(estimated),
            None => warn!(id = authorization.id, "Commit for unknown reservation"),
        }

        inner.state.tokens_used += actual;
        inner.state.request_count += 1;

        if inner.state.usage_ratio() >= self.limits.warning_threshold {
            warn!(
                used = inner.state.tokens_used,
                limit = inner.state.daily_limit,
                "Budget usage past warning threshold"
            );
        }

        self.persist(&inner.state)
    }

    /// Abandon a reservation without spending.
    pub async fn release(&self, authorization: Authorization) {
        let mut inner = self.inner.lock().await;
        if let Some(estimated) = inner.open.remove(&authorization.id) {
            inner.reserved = inner.reserved.saturating_sub(estimated);
        }
    }

    /// Current ledger view, including in-flight reservations.
    pub async fn status(&self) -> BudgetStatus {
        let mut inner = self.inner.lock().await;
        self.roll_over_if_needed(&mut inner, Utc::now().date_naive());

        let state = &inner.state;
        BudgetStatus {
            date: state.date,
            tokens_used: state.tokens_used,
            tokens_reserved: inner.reserved,
            tokens_remaining: state.tokens_remaining(),
            daily_limit: state.daily_limit,
            usage_ratio: state.usage_ratio(),
            is_warning: state.usage_ratio() >= self.limits.warning_threshold,
            is_exhausted: state.tokens_used >= state.daily_limit,
            request_count: state.request_count,
        }
    }

    /// Reset usage when the stored date differs from today. Open
    /// reservations keep holding capacity; they commit into the new day.
    fn roll_over_if_needed(&self, inner: &mut Inner, today: NaiveDate) {
        if inner.state.date != today {
            info!(from = %inner.state.date, to = %today, "Budget day rollover; usage reset");
            inner.state = BudgetState::fresh(today, self.limits.daily_limit_tokens);
            if let Err(e) = self.persist(&inner.state) {
                warn!(error = %e, "Failed to persist budget rollover");
            }
        }
    }

    fn persist(&self, state: &BudgetState) -> Result<(), BudgetError> {
        match &self.state_path {
            Some(path) => state.save(path),
            None => Ok(()),
        }
    }
}
