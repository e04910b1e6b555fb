//! Sliding-window loop guard
//!
//! The guard sees one `(seam, address)` observation per `advance` call and
//! keeps the addresses seen since the last INPUT, ERROR or FINISH. A stop
//! counts as an error and clears the history too. Two independent rules can
//! stop a story:
//!
//! - short: the same address shows up more than `limit` times among the last
//!   `window` observations
//! - long: `limit` observations accumulate within `window` without a reset

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use super::Seam;
use crate::config::GuardConfig;

/// History kept when no rule is configured
const UNCONFIGURED_HISTORY: usize = 64;

/// Guard verdict for one observation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    /// Keep going
    Continue,
    /// Stop with a reason
    Stop(String),
}

/// Observation history, stored on the session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopGuard {
    history: VecDeque<String>,
}

impl LoopGuard {
    /// Feed one observation
    pub fn observe(&mut self, config: &GuardConfig, seam: Seam, address: &str) -> GuardDecision {
        if matches!(seam, Seam::Input | Seam::Error | Seam::Finish) {
            self.history.clear();
            return GuardDecision::Continue;
        }

        self.history.push_back(address.to_string());
        let keep = [config.short, config.long]
            .iter()
            .flatten()
            .map(|rule| rule.window)
            .max()
            .unwrap_or(UNCONFIGURED_HISTORY);
        while self.history.len() > keep.max(1) {
            self.history.pop_front();
        }

        if let Some(rule) = config.short {
            let repeats = self
                .history
                .iter()
                .rev()
                .take(rule.window)
                .filter(|seen| *seen == address)
                .count();
            if repeats > rule.limit {
                self.history.clear();
                return GuardDecision::Stop(format!(
                    "address {} repeated {} times within {} steps",
                    address, repeats, rule.window
                ));
            }
        }

        if let Some(rule) = config.long {
            let recent = self.history.len().min(rule.window);
            if recent >= rule.limit {
                self.history.clear();
                return GuardDecision::Stop(format!(
                    "{} steps without player input (limit {})",
                    recent, rule.limit
                ));
            }
        }

        GuardDecision::Continue
    }

    /// Number of observations held
    pub fn len(&self) -> usize {
        self.history.len()
    }

    /// Whether the history is empty
    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }
}
