pub mod detector;
pub mod fault;
pub mod power;

pub use detector::{Detector, DetectorState, DEFAULT_ROW_COUNT};
pub use fault::FaultController;
pub use power::PowerStateMachine;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PowerState {
    Off,
    Ready,
}

impl PowerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PowerState::Off => "OFF",
            PowerState::Ready => "READY",
        }
    }
}

impl core::fmt::Display for PowerState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Counters that only grow for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PowerLifecycleCounters {
    pub init_cycle_count: u32,
    pub reset_cycle_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    #[error("{command} rejected: payload must be in {required} state and it's in the {actual} state")]
    InvalidTransition {
        command: &'static str,
        required: PowerState,
        actual: PowerState,
    },
}

/// Read-only view of the whole payload, taken after each cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadSnapshot {
    pub power_state: PowerState,
    pub counters: PowerLifecycleCounters,
    pub detector: DetectorState,
    pub detector_reset_count: u32,
    pub fault_present: bool,
}

/// The simulated instrument: power state machine plus the injected fault flag.
#[derive(Debug)]
pub struct Payload {
    power: PowerStateMachine,
    fault: FaultController,
}

impl Payload {
    pub fn new(row_count: u16) -> Self {
        Self {
            power: PowerStateMachine::new(Detector::new(row_count)),
            fault: FaultController::new(),
        }
    }

    pub fn power_on(&mut self) -> Result<(), PayloadError> {
        self.power.power_on()
    }

    pub fn power_off(&mut self) {
        self.power.power_off();
    }

    pub fn power_reset(&mut self) -> Result<(), PayloadError> {
        self.power.power_reset()
    }

    pub fn set_fault(&mut self) {
        self.fault.set_fault();
    }

    pub fn clear_fault(&mut self) {
        self.fault.clear_fault();
    }

    /// Advance one simulation cycle and read back the resulting state.
    pub fn cycle(&mut self) -> PayloadSnapshot {
        self.power.step(self.fault.is_present());
        self.snapshot()
    }

    pub fn current_state(&self) -> PowerState {
        self.power.current_state()
    }

    pub fn snapshot(&self) -> PayloadSnapshot {
        PayloadSnapshot {
            power_state: self.power.current_state(),
            counters: self.power.counters(),
            detector: self.power.detector_state(),
            detector_reset_count: self.power.detector().reset_count(),
            fault_present: self.fault.is_present(),
        }
    }

    pub fn row_count(&self) -> u16 {
        self.power.detector().row_count()
    }
}

impl Default for Payload {
    fn default() -> Self {
        Self::new(DEFAULT_ROW_COUNT)
    }
}
