use std::{collections::HashSet, ops::AddAssign};

use serde::{Deserialize, Serialize};

/// What happened to a single delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Sent,
    /// Network error, timeout or a status that may succeed later.
    TransientFailure { reason: String },
    /// The push service says the subscription is gone.
    PermanentFailure { status: u16 },
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchResult {
    pub sent: usize,
    pub failed: usize,
}

impl AddAssign for DispatchResult {
    fn add_assign(&mut self, rhs: Self) {
        self.sent += rhs.sent;
        self.failed += rhs.failed;
    }
}

/// Accumulates outcomes of one dispatch cycle.
#[derive(Debug, Default)]
pub struct DispatchTally {
    pub result: DispatchResult,
    pub expired: HashSet<String>,
}

impl DispatchTally {
    pub fn record(&mut self, endpoint: &str, outcome: &DeliveryOutcome) {
        match outcome {
            DeliveryOutcome::Sent => self.result.sent += 1,
            DeliveryOutcome::TransientFailure { .. } => {
                self.result.failed += 1;
            },
            DeliveryOutcome::PermanentFailure { .. } => {
                self.result.failed += 1;
                self.expired.insert(endpoint.to_owned());
            },
        }
    }
}
