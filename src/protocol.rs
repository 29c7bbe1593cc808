use arrayvec::ArrayString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use crate::payload::{PayloadSnapshot, PowerState};

pub const MAX_MESSAGE_SIZE: usize = 512;
pub const MAX_RESPONSE_SIZE: usize = 512;
pub const MAX_REPORT_SIZE: usize = 1024;

pub type MessageBuffer = ArrayString<MAX_MESSAGE_SIZE>;
pub type ResponseBuffer = ArrayString<MAX_RESPONSE_SIZE>;
pub type ReportBuffer = ArrayString<MAX_REPORT_SIZE>;

/// Function codes below this value belong to the command framework.
pub const APP_START_FUNCTION_CODE: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandType {
    NoOp,
    ResetCounters,
    PowerOn,
    PowerOff,
    PowerReset,
    SetFault,
    ClearFault,
}

impl CommandType {
    pub const ALL: [CommandType; 7] = [
        CommandType::NoOp,
        CommandType::ResetCounters,
        CommandType::PowerOn,
        CommandType::PowerOff,
        CommandType::PowerReset,
        CommandType::SetFault,
        CommandType::ClearFault,
    ];

    pub fn function_code(self) -> u8 {
        match self {
            CommandType::NoOp => 0,
            CommandType::ResetCounters => 1,
            CommandType::PowerOn => APP_START_FUNCTION_CODE,
            CommandType::PowerOff => APP_START_FUNCTION_CODE + 1,
            CommandType::PowerReset => APP_START_FUNCTION_CODE + 2,
            CommandType::SetFault => APP_START_FUNCTION_CODE + 3,
            CommandType::ClearFault => APP_START_FUNCTION_CODE + 4,
        }
    }

    pub fn from_function_code(code: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.function_code() == code)
    }
}

/// A ground command as it travels on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub id: u32,
    pub function_code: u8,
}

impl Command {
    pub fn new(id: u32, command_type: CommandType) -> Self {
        Self {
            id,
            function_code: command_type.function_code(),
        }
    }

    pub fn command_type(&self) -> Option<CommandType> {
        CommandType::from_function_code(self.function_code)
    }
}

/// Envelope for everything delivered to the payload app's pipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusMessage {
    pub topic_id: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Command>,
}

impl BusMessage {
    pub fn tick(topic_id: u32) -> Self {
        Self { topic_id, command: None }
    }

    pub fn command(topic_id: u32, command: Command) -> Self {
        Self {
            topic_id,
            command: Some(command),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseStatus {
    Success,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub id: u32,
    pub status: ResponseStatus,
    pub message: Option<alloc::string::String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub topic_id: u32,
    pub sequence_number: u32,
    pub tick: u64,
    pub valid_command_count: u16,
    pub invalid_command_count: u16,
    pub power_state: PowerState,
    pub init_cycle_count: u32,
    pub reset_cycle_count: u32,
    pub detector_reset_count: u32,
    pub detector_fault: bool,
    pub readout_row: u16,
    pub image_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("Invalid JSON format")]
    InvalidJson,
    #[error("Message exceeds buffer size")]
    MessageTooLarge,
    #[error("Serialization failed")]
    SerializationError,
    #[error("Command topic message without a command body")]
    MissingCommand,
}

#[derive(Debug)]
pub struct ProtocolHandler {
    sequence_counter: u32,

    // Preallocated buffers
    message_buffer: MessageBuffer,
    response_buffer: ResponseBuffer,
    report_buffer: ReportBuffer,
}

impl ProtocolHandler {
    pub fn new() -> Self {
        Self {
            sequence_counter: 0,
            message_buffer: ArrayString::new(),
            response_buffer: ArrayString::new(),
            report_buffer: ArrayString::new(),
        }
    }

    pub fn parse_message(&mut self, json_str: &str) -> Result<BusMessage, ProtocolError> {
        self.message_buffer.clear();
        self.message_buffer
            .try_push_str(json_str.trim())
            .map_err(|_| ProtocolError::MessageTooLarge)?;

        serde_json::from_str::<BusMessage>(&self.message_buffer)
            .map_err(|_| ProtocolError::InvalidJson)
    }

    pub fn serialize_response(&mut self, response: &CommandResponse) -> Result<&str, ProtocolError> {
        self.response_buffer.clear();

        let json_str = serde_json::to_string(response)
            .map_err(|_| ProtocolError::SerializationError)?;
        self.response_buffer
            .try_push_str(&json_str)
            .map_err(|_| ProtocolError::MessageTooLarge)?;

        Ok(&self.response_buffer)
    }

    pub fn serialize_report(&mut self, report: &StatusReport) -> Result<&str, ProtocolError> {
        self.report_buffer.clear();

        let json_str = serde_json::to_string(report)
            .map_err(|_| ProtocolError::SerializationError)?;
        self.report_buffer
            .try_push_str(&json_str)
            .map_err(|_| ProtocolError::MessageTooLarge)?;

        Ok(&self.report_buffer)
    }

    pub fn create_response(&self, command_id: u32, status: ResponseStatus, message: Option<&str>) -> CommandResponse {
        CommandResponse {
            id: command_id,
            status,
            message: message.map(alloc::string::ToString::to_string),
        }
    }

    pub fn create_status_report(
        &mut self,
        topic_id: u32,
        tick: u64,
        valid_command_count: u16,
        invalid_command_count: u16,
        snapshot: &PayloadSnapshot,
    ) -> StatusReport {
        self.sequence_counter = self.sequence_counter.wrapping_add(1);

        StatusReport {
            topic_id,
            sequence_number: self.sequence_counter,
            tick,
            valid_command_count,
            invalid_command_count,
            power_state: snapshot.power_state,
            init_cycle_count: snapshot.counters.init_cycle_count,
            reset_cycle_count: snapshot.counters.reset_cycle_count,
            detector_reset_count: snapshot.detector_reset_count,
            detector_fault: snapshot.fault_present,
            readout_row: snapshot.detector.readout_row,
            image_count: snapshot.detector.image_count,
        }
    }

    pub fn get_sequence_number(&self) -> u32 {
        self.sequence_counter
    }
}

impl Default for ProtocolHandler {
    fn default() -> Self {
        Self::new()
    }
}
