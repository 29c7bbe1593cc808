use crate::events::{EventId, EventLog, EventSeverity};
use crate::payload::{Payload, PayloadError};
use crate::protocol::{Command, CommandType};
use heapless::FnvIndexMap;
use static_assertions::const_assert;
use thiserror::Error;

const MAX_HANDLERS: usize = 16;
const_assert!(MAX_HANDLERS.is_power_of_two());
const_assert!(MAX_HANDLERS >= CommandType::ALL.len());

pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerOutcome {
    Completed,
    CountersReset,
}

pub type CommandHandler = fn(&mut Payload, &mut EventLog) -> Result<HandlerOutcome, PayloadError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("no handler registered for function code {0}")]
    UnknownFunctionCode(u8),
    #[error("command handler table is full")]
    TableFull,
    #[error(transparent)]
    Payload(#[from] PayloadError),
}

/// Routes commands to their handlers by function code and keeps the
/// valid/invalid command counters reported in telemetry.
pub struct CommandDispatcher {
    handlers: FnvIndexMap<u8, CommandHandler, MAX_HANDLERS>,
    valid_count: u16,
    invalid_count: u16,
}

impl CommandDispatcher {
    pub fn new() -> Self {
        Self {
            handlers: FnvIndexMap::new(),
            valid_count: 0,
            invalid_count: 0,
        }
    }

    /// Dispatcher with every payload command registered.
    pub fn with_payload_handlers() -> Result<Self, DispatchError> {
        let mut dispatcher = Self::new();

        dispatcher.register(CommandType::NoOp.function_code(), noop_cmd)?;
        dispatcher.register(CommandType::ResetCounters.function_code(), reset_counters_cmd)?;
        dispatcher.register(CommandType::PowerOn.function_code(), power_on_cmd)?;
        dispatcher.register(CommandType::PowerOff.function_code(), power_off_cmd)?;
        dispatcher.register(CommandType::PowerReset.function_code(), power_reset_cmd)?;
        dispatcher.register(CommandType::SetFault.function_code(), set_fault_cmd)?;
        dispatcher.register(CommandType::ClearFault.function_code(), clear_fault_cmd)?;

        Ok(dispatcher)
    }

    /// Registering a code twice replaces the earlier handler.
    pub fn register(&mut self, function_code: u8, handler: CommandHandler) -> Result<(), DispatchError> {
        self.handlers
            .insert(function_code, handler)
            .map(|_| ())
            .map_err(|_| DispatchError::TableFull)
    }

    pub fn dispatch(
        &mut self,
        command: &Command,
        payload: &mut Payload,
        events: &mut EventLog,
    ) -> Result<(), DispatchError> {
        let Some(handler) = self.handlers.get(&command.function_code).copied() else {
            self.invalid_count = self.invalid_count.wrapping_add(1);
            events.send(
                EventId::InvalidCmd,
                EventSeverity::Error,
                format_args!("Invalid command function code {} in command {}", command.function_code, command.id),
            );
            return Err(DispatchError::UnknownFunctionCode(command.function_code));
        };

        match handler(payload, events) {
            Ok(HandlerOutcome::Completed) => {
                self.valid_count = self.valid_count.wrapping_add(1);
                Ok(())
            }
            Ok(HandlerOutcome::CountersReset) => {
                self.reset_counters();
                Ok(())
            }
            Err(e) => {
                self.invalid_count = self.invalid_count.wrapping_add(1);
                Err(e.into())
            }
        }
    }

    pub fn reset_counters(&mut self) {
        self.valid_count = 0;
        self.invalid_count = 0;
    }

    pub fn valid_count(&self) -> u16 {
        self.valid_count
    }

    pub fn invalid_count(&self) -> u16 {
        self.invalid_count
    }

    pub fn is_registered(&self, function_code: u8) -> bool {
        self.handlers.contains_key(&function_code)
    }
}

impl core::fmt::Debug for CommandDispatcher {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CommandDispatcher")
            .field("function_codes", &self.handlers.keys().collect::<heapless::Vec<_, MAX_HANDLERS>>())
            .field("valid_count", &self.valid_count)
            .field("invalid_count", &self.invalid_count)
            .finish()
    }
}

impl Default for CommandDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

fn noop_cmd(_payload: &mut Payload, events: &mut EventLog) -> Result<HandlerOutcome, PayloadError> {
    events.send(
        EventId::NoOpCmd,
        EventSeverity::Information,
        format_args!("No operation command received for PL_SIM App version {}", APP_VERSION),
    );
    Ok(HandlerOutcome::Completed)
}

// Payload state is left intact
fn reset_counters_cmd(_payload: &mut Payload, events: &mut EventLog) -> Result<HandlerOutcome, PayloadError> {
    events.send(
        EventId::ResetCountersCmd,
        EventSeverity::Debug,
        format_args!("Command counters reset"),
    );
    Ok(HandlerOutcome::CountersReset)
}

fn power_on_cmd(payload: &mut Payload, events: &mut EventLog) -> Result<HandlerOutcome, PayloadError> {
    match payload.power_on() {
        Ok(()) => {
            events.send(
                EventId::PowerOnCmd,
                EventSeverity::Information,
                format_args!(
                    "Payload powered on. Init cycle count {}",
                    payload.snapshot().counters.init_cycle_count
                ),
            );
            Ok(HandlerOutcome::Completed)
        }
        Err(e) => {
            events.send(
                EventId::PowerOnCmdErr,
                EventSeverity::Error,
                format_args!(
                    "Power on payload cmd rejected. Payload must be in OFF state and it's in the {} state.",
                    payload.current_state()
                ),
            );
            Err(e)
        }
    }
}

fn power_off_cmd(payload: &mut Payload, events: &mut EventLog) -> Result<HandlerOutcome, PayloadError> {
    payload.power_off();
    events.send(
        EventId::PowerOffCmd,
        EventSeverity::Information,
        format_args!("Payload powered off"),
    );
    Ok(HandlerOutcome::Completed)
}

fn power_reset_cmd(payload: &mut Payload, events: &mut EventLog) -> Result<HandlerOutcome, PayloadError> {
    match payload.power_reset() {
        Ok(()) => {
            events.send(
                EventId::PowerResetCmd,
                EventSeverity::Information,
                format_args!(
                    "Payload power reset. Reset cycle count {}",
                    payload.snapshot().counters.reset_cycle_count
                ),
            );
            Ok(HandlerOutcome::Completed)
        }
        Err(e) => {
            events.send(
                EventId::PowerResetCmdErr,
                EventSeverity::Error,
                format_args!(
                    "Reset payload power cmd rejected. Payload must be in READY state and it's in the {} state.",
                    payload.current_state()
                ),
            );
            Err(e)
        }
    }
}

fn set_fault_cmd(payload: &mut Payload, events: &mut EventLog) -> Result<HandlerOutcome, PayloadError> {
    payload.set_fault();
    events.send(
        EventId::SetFaultCmd,
        EventSeverity::Information,
        format_args!("Payload fault set to TRUE."),
    );
    Ok(HandlerOutcome::Completed)
}

fn clear_fault_cmd(payload: &mut Payload, events: &mut EventLog) -> Result<HandlerOutcome, PayloadError> {
    payload.clear_fault();
    events.send(
        EventId::ClearFaultCmd,
        EventSeverity::Information,
        format_args!("Payload fault set to FALSE."),
    );
    Ok(HandlerOutcome::Completed)
}
