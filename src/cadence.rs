use crate::payload::PowerState;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct CadenceStats {
    pub reports_emitted: u32,
    pub reports_suppressed: u32,
}

/// Throttles status reports while the payload is powered off.
///
/// Powered: every tick is reported. Off: one report every
/// `slow_rate_divisor` ticks, counted from the first tick after entering
/// `Off`. Any change of observed power state restarts the count.
#[derive(Debug)]
pub struct TelemetryCadenceController {
    slow_rate_divisor: u32,
    slow_rate_counter: u32,
    last_state: Option<PowerState>,
    stats: CadenceStats,
}

impl TelemetryCadenceController {
    pub fn new(slow_rate_divisor: u32) -> Self {
        debug_assert!(slow_rate_divisor > 0, "Slow rate divisor must be non-zero");

        Self {
            slow_rate_divisor: slow_rate_divisor.max(1),
            slow_rate_counter: 0,
            last_state: None,
            stats: CadenceStats::default(),
        }
    }

    /// Decide whether this tick's status report goes out. Call once per tick.
    pub fn decide(&mut self, power_state: PowerState) -> bool {
        if self.last_state != Some(power_state) {
            self.slow_rate_counter = 0;
            self.last_state = Some(power_state);
        }

        let emit = if power_state != PowerState::Off {
            self.slow_rate_counter = 0;
            true
        } else {
            self.slow_rate_counter += 1;
            if self.slow_rate_counter >= self.slow_rate_divisor {
                self.slow_rate_counter = 0;
                true
            } else {
                false
            }
        };

        if emit {
            self.stats.reports_emitted = self.stats.reports_emitted.saturating_add(1);
        } else {
            self.stats.reports_suppressed = self.stats.reports_suppressed.saturating_add(1);
        }

        emit
    }

    /// Restart the off-cadence count after a power transition that happened
    /// between ticks.
    pub fn restart(&mut self) {
        self.slow_rate_counter = 0;
    }

    pub fn slow_rate_divisor(&self) -> u32 {
        self.slow_rate_divisor
    }

    pub fn slow_rate_counter(&self) -> u32 {
        self.slow_rate_counter
    }

    pub fn get_stats(&self) -> &CadenceStats {
        &self.stats
    }
}
