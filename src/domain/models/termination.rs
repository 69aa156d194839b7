//! Termination policy: the gatekeeper decision and the router.
//!
//! Both are pure functions of ledger counts and the round counter.

use serde::{Deserialize, Serialize};

use super::round::{ExecutionStatus, RunVerdict};

pub const DEFAULT_MAX_ROUNDS: u32 = 10;

/// Where the router sends the run after the gatekeeper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Terminate(RunVerdict),
    Fix,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminationPolicy {
    pub max_rounds: u32,
}

impl Default for TerminationPolicy {
    fn default() -> Self {
        Self { max_rounds: DEFAULT_MAX_ROUNDS }
    }
}

impl TerminationPolicy {
    pub fn new(max_rounds: u32) -> Self {
        Self { max_rounds }
    }

    /// Secure only when the whole matrix is green and nothing new was found
    /// this round.
    pub fn gatekeep(&self, active_reds: u64, new_threats: u32) -> ExecutionStatus {
        if active_reds == 0 && new_threats == 0 {
            ExecutionStatus::Secure
        } else {
            ExecutionStatus::NeedsFix
        }
    }

    /// Decide the next edge after the gatekeeper.
    ///
    /// Security is checked before the budget so a round that converges on its
    /// last allowed iteration still reports success.
    pub fn route(&self, status: ExecutionStatus, round_count: u32, active_reds: u64) -> Route {
        if status == ExecutionStatus::Secure {
            return Route::Terminate(RunVerdict::Secure { rounds: round_count });
        }
        if round_count >= self.max_rounds {
            return Route::Terminate(RunVerdict::Exhausted {
                rounds: round_count,
                active_reds,
            });
        }
        Route::Fix
    }
}
