use super::detector::{Detector, DetectorState};
use super::{PayloadError, PowerLifecycleCounters, PowerState};
use tracing::debug;

/// Owns the payload power state and its lifecycle counters, and drives the
/// detector once per cycle while powered.
#[derive(Debug)]
pub struct PowerStateMachine {
    state: PowerState,
    counters: PowerLifecycleCounters,
    detector: Detector,
}

impl PowerStateMachine {
    pub fn new(detector: Detector) -> Self {
        Self {
            state: PowerState::Off,
            counters: PowerLifecycleCounters::default(),
            detector,
        }
    }

    pub fn power_on(&mut self) -> Result<(), PayloadError> {
        if self.state != PowerState::Off {
            return Err(PayloadError::InvalidTransition {
                command: "power on",
                required: PowerState::Off,
                actual: self.state,
            });
        }

        self.detector.reset();
        self.counters.init_cycle_count = self.counters.init_cycle_count.saturating_add(1);
        self.transition(PowerState::Ready);

        Ok(())
    }

    /// Always succeeds; powering off an already-off payload only clears the
    /// detector.
    pub fn power_off(&mut self) {
        self.detector.reset();
        self.transition(PowerState::Off);
    }

    pub fn power_reset(&mut self) -> Result<(), PayloadError> {
        if self.state != PowerState::Ready {
            return Err(PayloadError::InvalidTransition {
                command: "power reset",
                required: PowerState::Ready,
                actual: self.state,
            });
        }

        self.detector.reset();
        self.counters.reset_cycle_count = self.counters.reset_cycle_count.saturating_add(1);
        debug!(
            reset_cycle_count = self.counters.reset_cycle_count,
            "Payload power reset"
        );

        Ok(())
    }

    pub fn step(&mut self, fault_present: bool) {
        if self.state == PowerState::Off {
            return;
        }

        self.detector.step(fault_present);
    }

    pub fn current_state(&self) -> PowerState {
        self.state
    }

    pub fn counters(&self) -> PowerLifecycleCounters {
        self.counters
    }

    pub fn detector_state(&self) -> DetectorState {
        self.detector.get_state()
    }

    pub fn detector(&self) -> &Detector {
        &self.detector
    }

    fn transition(&mut self, next: PowerState) {
        if self.state != next {
            debug!(from = %self.state, to = %next, "Payload power transition");
        }
        self.state = next;
    }
}
