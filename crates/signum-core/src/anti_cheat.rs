//! Anti-cheat penalty model shared by the quiz and coding engines.
//!
//! Clients report how often the learner switched tabs, copied, or pasted
//! during a session. Each counter maps to a capped deduction and the sum is
//! capped again:
//!
//! | Counter | Per event | Cap |
//! |---------|-----------|-----|
//! | `tab_switches` | 2 | 20 |
//! | `copy_attempts` | 5 | 30 |
//! | `paste_attempts` | 10 | 40 |
//! | total | | 50 |

use serde::{Deserialize, Serialize};

pub const TAB_SWITCH_POINTS: f64 = 2.0;
pub const TAB_SWITCH_CAP: f64 = 20.0;
pub const COPY_POINTS: f64 = 5.0;
pub const COPY_CAP: f64 = 30.0;
pub const PASTE_POINTS: f64 = 10.0;
pub const PASTE_CAP: f64 = 40.0;
pub const TOTAL_CAP: f64 = 50.0;

/// Client-reported behaviour counters. Absent fields deserialize as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AntiCheatCounters {
    pub tab_switches: u32,
    pub copy_attempts: u32,
    pub paste_attempts: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PenaltyBreakdown {
    pub tab_penalty: f64,
    pub copy_penalty: f64,
    pub paste_penalty: f64,
    pub total: f64,
}

impl AntiCheatCounters {
    pub fn breakdown(&self) -> PenaltyBreakdown {
        let tab_penalty = (f64::from(self.tab_switches) * TAB_SWITCH_POINTS).min(TAB_SWITCH_CAP);
        let copy_penalty = (f64::from(self.copy_attempts) * COPY_POINTS).min(COPY_CAP);
        let paste_penalty = (f64::from(self.paste_attempts) * PASTE_POINTS).min(PASTE_CAP);
        PenaltyBreakdown {
            tab_penalty,
            copy_penalty,
            paste_penalty,
            total: (tab_penalty + copy_penalty + paste_penalty).min(TOTAL_CAP),
        }
    }

    pub fn penalty(&self) -> f64 {
        self.breakdown().total
    }
}

/// Penalty for optional counters; `None` counts as a clean session.
pub fn penalty(counters: Option<&AntiCheatCounters>) -> f64 {
    counters.map(AntiCheatCounters::penalty).unwrap_or(0.0)
}
