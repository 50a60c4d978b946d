//! Engine timing configuration
//!
//! All durations are in milliseconds of logical [`Time`](crate::Time).

use crate::{NotifyError, Result, Time};
use serde::{Deserialize, Serialize};

/// Delay before a fresh waiter fires, leaving room for follow-ups to merge
const MINIMUM_DELAY_MS: Time = 100;

/// Fresh-waiter delay for forwarded messages, which tend to arrive in runs
const FORWARDED_DELAY_MS: Time = 500;

/// Extension applied to a pending waiter per follow-up message
const GROUPING_WINDOW_MS: Time = 1500;

/// Upper bound on how long a waiter may be held after its first message
const MAX_GROUPING_WINDOW_MS: Time = 5000;

/// How long a forwarded run may keep growing before it is presented
const FORWARD_GROUP_WAIT_MS: Time = 1000;

/// Alerts this close together share a single sound
const ALERT_COALESCE_MS: Time = 500;

/// Forwarded messages whose origin dates differ by less than this are one run
const FORWARD_PROXIMITY_SECS: u64 = 2;

/// Scheduling constants for one engine instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_minimum_delay")]
    pub minimum_delay_ms: Time,

    #[serde(default = "default_forwarded_delay")]
    pub forwarded_delay_ms: Time,

    #[serde(default = "default_grouping_window")]
    pub grouping_window_ms: Time,

    #[serde(default = "default_max_grouping_window")]
    pub max_grouping_window_ms: Time,

    #[serde(default = "default_forward_group_wait")]
    pub forward_group_wait_ms: Time,

    #[serde(default = "default_alert_coalesce")]
    pub alert_coalesce_ms: Time,

    #[serde(default = "default_forward_proximity")]
    pub forward_proximity_secs: u64,
}

fn default_minimum_delay() -> Time {
    MINIMUM_DELAY_MS
}

fn default_forwarded_delay() -> Time {
    FORWARDED_DELAY_MS
}

fn default_grouping_window() -> Time {
    GROUPING_WINDOW_MS
}

fn default_max_grouping_window() -> Time {
    MAX_GROUPING_WINDOW_MS
}

fn default_forward_group_wait() -> Time {
    FORWARD_GROUP_WAIT_MS
}

fn default_alert_coalesce() -> Time {
    ALERT_COALESCE_MS
}

fn default_forward_proximity() -> u64 {
    FORWARD_PROXIMITY_SECS
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            minimum_delay_ms: MINIMUM_DELAY_MS,
            forwarded_delay_ms: FORWARDED_DELAY_MS,
            grouping_window_ms: GROUPING_WINDOW_MS,
            max_grouping_window_ms: MAX_GROUPING_WINDOW_MS,
            forward_group_wait_ms: FORWARD_GROUP_WAIT_MS,
            alert_coalesce_ms: ALERT_COALESCE_MS,
            forward_proximity_secs: FORWARD_PROXIMITY_SECS,
        }
    }
}

impl EngineConfig {
    /// Check that the grouping bound can always be honoured
    pub fn validate(&self) -> Result<()> {
        if self.max_grouping_window_ms == 0 {
            return Err(NotifyError::configuration(
                "max_grouping_window_ms must be greater than zero",
            ));
        }
        let initial = self.minimum_delay_ms.max(self.forwarded_delay_ms);
        if initial > self.max_grouping_window_ms {
            return Err(NotifyError::configuration(format!(
                "initial delay ({} ms) exceeds max_grouping_window_ms ({} ms)",
                initial, self.max_grouping_window_ms
            )));
        }
        Ok(())
    }

    /// Delay for a waiter created by `forwarded` or plain message
    pub fn initial_delay(&self, forwarded: bool) -> Time {
        if forwarded {
            self.forwarded_delay_ms
        } else {
            self.minimum_delay_ms
        }
    }

    /// Origin-date distance under which forwarded messages belong together
    pub fn forward_proximity_ms(&self) -> Time {
        self.forward_proximity_secs * 1000
    }
}
