use plsim::dispatch::{CommandDispatcher, DispatchError, HandlerOutcome};
use plsim::events::{EventId, EventLog, EventSeverity};
use plsim::payload::{Payload, PayloadError};
use plsim::protocol::{Command, CommandType};
use plsim::PowerState;

fn setup() -> (CommandDispatcher, Payload, EventLog) {
    (
        CommandDispatcher::with_payload_handlers().unwrap(),
        Payload::new(8),
        EventLog::new(),
    )
}

#[test]
fn test_all_payload_commands_registered() {
    let dispatcher = CommandDispatcher::with_payload_handlers().unwrap();

    for command_type in CommandType::ALL {
        assert!(dispatcher.is_registered(command_type.function_code()));
    }
    assert_eq!(dispatcher.valid_count(), 0);
    assert_eq!(dispatcher.invalid_count(), 0);
}

#[test]
fn test_function_codes_round_trip() {
    assert_eq!(CommandType::NoOp.function_code(), 0);
    assert_eq!(CommandType::ResetCounters.function_code(), 1);
    assert_eq!(CommandType::PowerOn.function_code(), 2);
    assert_eq!(CommandType::ClearFault.function_code(), 6);
    assert_eq!(CommandType::from_function_code(4), Some(CommandType::PowerReset));
    assert_eq!(CommandType::from_function_code(42), None);
}

#[test]
fn test_valid_commands_counted() {
    let (mut dispatcher, mut payload, mut events) = setup();

    dispatcher.dispatch(&Command::new(1, CommandType::NoOp), &mut payload, &mut events).unwrap();
    dispatcher.dispatch(&Command::new(2, CommandType::PowerOn), &mut payload, &mut events).unwrap();
    dispatcher.dispatch(&Command::new(3, CommandType::SetFault), &mut payload, &mut events).unwrap();

    assert_eq!(dispatcher.valid_count(), 3);
    assert_eq!(dispatcher.invalid_count(), 0);
    assert_eq!(payload.current_state(), PowerState::Ready);
    assert!(payload.snapshot().fault_present);

    assert_eq!(events.count_of(EventId::NoOpCmd), 1);
    assert_eq!(events.count_of(EventId::PowerOnCmd), 1);
    assert_eq!(events.count_of(EventId::SetFaultCmd), 1);
}

#[test]
fn test_invalid_transition_counted_and_reported() {
    let (mut dispatcher, mut payload, mut events) = setup();
    dispatcher.dispatch(&Command::new(1, CommandType::PowerOn), &mut payload, &mut events).unwrap();

    let result = dispatcher.dispatch(&Command::new(2, CommandType::PowerOn), &mut payload, &mut events);
    assert!(matches!(
        result,
        Err(DispatchError::Payload(PayloadError::InvalidTransition { actual: PowerState::Ready, .. }))
    ));

    assert_eq!(dispatcher.valid_count(), 1);
    assert_eq!(dispatcher.invalid_count(), 1);

    let event = events.last().unwrap();
    assert_eq!(event.id, EventId::PowerOnCmdErr);
    assert_eq!(event.severity, EventSeverity::Error);
    assert_eq!(
        event.text.as_str(),
        "Power on payload cmd rejected. Payload must be in OFF state and it's in the READY state."
    );
}

#[test]
fn test_power_reset_rejected_while_off() {
    let (mut dispatcher, mut payload, mut events) = setup();

    let result = dispatcher.dispatch(&Command::new(1, CommandType::PowerReset), &mut payload, &mut events);
    assert!(result.is_err());
    assert_eq!(dispatcher.invalid_count(), 1);
    assert_eq!(payload.snapshot().counters.reset_cycle_count, 0);

    let event = events.last().unwrap();
    assert_eq!(event.id, EventId::PowerResetCmdErr);
    assert!(event.text.contains("READY state and it's in the OFF state"));
}

#[test]
fn test_unknown_function_code_rejected() {
    let (mut dispatcher, mut payload, mut events) = setup();
    let command = Command { id: 9, function_code: 99 };

    let result = dispatcher.dispatch(&command, &mut payload, &mut events);
    assert_eq!(result, Err(DispatchError::UnknownFunctionCode(99)));
    assert_eq!(dispatcher.invalid_count(), 1);
    assert_eq!(events.last().unwrap().id, EventId::InvalidCmd);
}

#[test]
fn test_reset_counters_leaves_payload_intact() {
    let (mut dispatcher, mut payload, mut events) = setup();

    dispatcher.dispatch(&Command::new(1, CommandType::PowerOn), &mut payload, &mut events).unwrap();
    let _ = dispatcher.dispatch(&Command::new(2, CommandType::PowerOn), &mut payload, &mut events);
    dispatcher.dispatch(&Command::new(3, CommandType::SetFault), &mut payload, &mut events).unwrap();
    assert_eq!(dispatcher.valid_count(), 2);
    assert_eq!(dispatcher.invalid_count(), 1);

    dispatcher.dispatch(&Command::new(4, CommandType::ResetCounters), &mut payload, &mut events).unwrap();

    assert_eq!(dispatcher.valid_count(), 0);
    assert_eq!(dispatcher.invalid_count(), 0);

    let snapshot = payload.snapshot();
    assert_eq!(snapshot.power_state, PowerState::Ready);
    assert_eq!(snapshot.counters.init_cycle_count, 1);
    assert!(snapshot.fault_present);
}

#[test]
fn test_custom_handler_registration() {
    fn always_off(payload: &mut Payload, _events: &mut EventLog) -> Result<HandlerOutcome, PayloadError> {
        payload.power_off();
        Ok(HandlerOutcome::Completed)
    }

    let mut dispatcher = CommandDispatcher::new();
    let mut payload = Payload::new(4);
    let mut events = EventLog::new();
    payload.power_on().unwrap();

    dispatcher.register(CommandType::PowerOn.function_code(), always_off).unwrap();
    dispatcher.dispatch(&Command::new(1, CommandType::PowerOn), &mut payload, &mut events).unwrap();

    assert_eq!(payload.current_state(), PowerState::Off);
    assert_eq!(dispatcher.valid_count(), 1);
}
