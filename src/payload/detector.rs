use serde::{Deserialize, Serialize};

/// Rows in one simulated image unless the init file overrides it.
pub const DEFAULT_ROW_COUNT: u16 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DetectorState {
    pub readout_row: u16,
    pub image_count: u32,
}

/// Readout model of the simulated detector.
///
/// Only the externally observable progress is modelled: a row cursor that
/// wraps at `row_count` and the number of images completed since the last
/// reset.
#[derive(Debug)]
pub struct Detector {
    state: DetectorState,
    row_count: u16,
    reset_count: u32,
}

impl Detector {
    pub fn new(row_count: u16) -> Self {
        debug_assert!(row_count > 0, "Detector row count must be non-zero");

        Self {
            state: DetectorState::default(),
            row_count: row_count.max(1),
            reset_count: 0,
        }
    }

    /// Advance the readout by one row. A present fault withholds progress.
    pub fn step(&mut self, fault_present: bool) {
        if fault_present {
            return;
        }

        self.state.readout_row += 1;
        if self.state.readout_row >= self.row_count {
            self.state.readout_row = 0;
            self.state.image_count = self.state.image_count.wrapping_add(1);
        }

        debug_assert!(
            self.state.readout_row < self.row_count,
            "Readout row {} outside image of {} rows",
            self.state.readout_row, self.row_count
        );
    }

    pub fn reset(&mut self) {
        self.state = DetectorState::default();
        self.reset_count = self.reset_count.saturating_add(1);
    }

    pub fn get_state(&self) -> DetectorState {
        self.state
    }

    pub fn row_count(&self) -> u16 {
        self.row_count
    }

    /// Number of detector re-initializations, independent of why they happened.
    pub fn reset_count(&self) -> u32 {
        self.reset_count
    }
}

impl Default for Detector {
    fn default() -> Self {
        Self::new(DEFAULT_ROW_COUNT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_row_image_completes_every_step() {
        let mut detector = Detector::new(1);

        for expected in 1..=5 {
            detector.step(false);
            assert_eq!(detector.get_state().readout_row, 0);
            assert_eq!(detector.get_state().image_count, expected);
        }
    }

    #[test]
    fn reset_is_counted_even_when_already_zero() {
        let mut detector = Detector::new(4);
        detector.reset();
        detector.reset();

        assert_eq!(detector.get_state(), DetectorState::default());
        assert_eq!(detector.reset_count(), 2);
    }
}
