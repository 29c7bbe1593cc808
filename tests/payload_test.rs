use plsim::payload::{
    detector::{Detector, DetectorState},
    fault::FaultController,
    power::PowerStateMachine,
    Payload, PayloadError, PowerState,
};

#[cfg(test)]
mod power_state_machine_tests {
    use super::*;

    #[test]
    fn test_power_state_machine_initialization() {
        let machine = PowerStateMachine::new(Detector::new(8));

        assert_eq!(machine.current_state(), PowerState::Off);
        assert_eq!(machine.counters().init_cycle_count, 0);
        assert_eq!(machine.counters().reset_cycle_count, 0);
        assert_eq!(machine.detector_state(), DetectorState::default());
    }

    #[test]
    fn test_power_on_from_off() {
        let mut machine = PowerStateMachine::new(Detector::new(8));

        assert!(machine.power_on().is_ok());
        assert_eq!(machine.current_state(), PowerState::Ready);
        assert_eq!(machine.counters().init_cycle_count, 1);
    }

    #[test]
    fn test_power_on_rejected_when_ready() {
        let mut machine = PowerStateMachine::new(Detector::new(8));
        machine.power_on().unwrap();

        let result = machine.power_on();
        assert_eq!(
            result,
            Err(PayloadError::InvalidTransition {
                command: "power on",
                required: PowerState::Off,
                actual: PowerState::Ready,
            })
        );

        // Rejected command has no effect
        assert_eq!(machine.current_state(), PowerState::Ready);
        assert_eq!(machine.counters().init_cycle_count, 1);
    }

    #[test]
    fn test_power_off_is_unconditional() {
        let mut machine = PowerStateMachine::new(Detector::new(8));

        // Off -> Off is a no-op transition
        machine.power_off();
        assert_eq!(machine.current_state(), PowerState::Off);

        machine.power_on().unwrap();
        machine.power_off();
        assert_eq!(machine.current_state(), PowerState::Off);

        // Power off never touches the lifecycle counters
        assert_eq!(machine.counters().init_cycle_count, 1);
        assert_eq!(machine.counters().reset_cycle_count, 0);
    }

    #[test]
    fn test_power_reset_requires_ready() {
        let mut machine = PowerStateMachine::new(Detector::new(8));

        let result = machine.power_reset();
        assert!(matches!(
            result,
            Err(PayloadError::InvalidTransition { required: PowerState::Ready, actual: PowerState::Off, .. })
        ));
        assert_eq!(machine.counters().reset_cycle_count, 0);

        machine.power_on().unwrap();
        assert!(machine.power_reset().is_ok());
        assert!(machine.power_reset().is_ok());

        // Reset is a self-loop on Ready
        assert_eq!(machine.current_state(), PowerState::Ready);
        assert_eq!(machine.counters().reset_cycle_count, 2);
        assert_eq!(machine.counters().init_cycle_count, 1);
    }

    #[test]
    fn test_power_transitions_reset_detector() {
        let mut machine = PowerStateMachine::new(Detector::new(4));
        machine.power_on().unwrap();

        for _ in 0..6 {
            machine.step(false);
        }
        assert_eq!(machine.detector_state(), DetectorState { readout_row: 2, image_count: 1 });

        machine.power_reset().unwrap();
        assert_eq!(machine.detector_state(), DetectorState::default());

        for _ in 0..3 {
            machine.step(false);
        }
        machine.power_off();
        assert_eq!(machine.detector_state(), DetectorState::default());

        machine.power_on().unwrap();
        assert_eq!(machine.detector_state(), DetectorState::default());
    }

    #[test]
    fn test_step_is_noop_while_off() {
        let mut machine = PowerStateMachine::new(Detector::new(4));

        for _ in 0..10 {
            machine.step(false);
        }

        assert_eq!(machine.detector_state(), DetectorState::default());
    }

    #[test]
    fn test_init_count_tracks_successful_power_ons_only() {
        let mut machine = PowerStateMachine::new(Detector::new(4));
        let sequence = [true, true, false, true, false, false, true, true];
        let mut expected_inits = 0;

        for power_on in sequence {
            let was_off = machine.current_state() == PowerState::Off;
            if power_on {
                let result = machine.power_on();
                assert_eq!(result.is_ok(), was_off);
                if was_off {
                    expected_inits += 1;
                }
            } else {
                machine.power_off();
            }
            assert_eq!(machine.counters().init_cycle_count, expected_inits);
        }
    }
}

#[cfg(test)]
mod detector_tests {
    use super::*;

    #[test]
    fn test_detector_row_cycle() {
        let row_count = 5;
        let mut detector = Detector::new(row_count);

        for tick in 1..=(row_count as u32 * 3) {
            detector.step(false);
            let state = detector.get_state();

            assert!(state.readout_row < row_count);
            assert_eq!(state.readout_row as u32, tick % row_count as u32);
            assert_eq!(state.image_count, tick / row_count as u32);
        }
    }

    #[test]
    fn test_detector_fault_suppresses_progress() {
        let mut detector = Detector::new(5);
        detector.step(false);
        detector.step(false);
        let before = detector.get_state();

        for _ in 0..50 {
            detector.step(true);
        }

        assert_eq!(detector.get_state(), before);
    }

    #[test]
    fn test_detector_reset() {
        let mut detector = Detector::new(3);
        for _ in 0..7 {
            detector.step(false);
        }
        assert_ne!(detector.get_state(), DetectorState::default());

        detector.reset();
        assert_eq!(detector.get_state(), DetectorState::default());
        assert_eq!(detector.reset_count(), 1);
        assert_eq!(detector.row_count(), 3);
    }
}

#[cfg(test)]
mod fault_controller_tests {
    use super::*;

    #[test]
    fn test_fault_set_clear_idempotent() {
        let mut fault = FaultController::new();
        assert!(!fault.is_present());

        fault.set_fault();
        fault.set_fault();
        assert!(fault.is_present());

        fault.clear_fault();
        fault.clear_fault();
        assert!(!fault.is_present());
    }

    #[test]
    fn test_fault_while_off_has_no_visible_effect() {
        let mut payload = Payload::new(4);
        payload.set_fault();

        for _ in 0..5 {
            payload.cycle();
        }

        let snapshot = payload.snapshot();
        assert!(snapshot.fault_present);
        assert_eq!(snapshot.power_state, PowerState::Off);
        assert_eq!(snapshot.detector, DetectorState::default());
    }

    #[test]
    fn test_fault_then_clear_resumes_progress() {
        let row_count = 6;
        let mut payload = Payload::new(row_count);
        payload.power_on().unwrap();
        payload.set_fault();

        for _ in 0..10 {
            let snapshot = payload.cycle();
            assert_eq!(snapshot.detector, DetectorState::default());
        }

        payload.clear_fault();
        for _ in 0..row_count {
            payload.cycle();
        }

        let snapshot = payload.snapshot();
        assert_eq!(snapshot.detector.image_count, 1);
        assert_eq!(snapshot.detector.readout_row, 0);
    }
}
