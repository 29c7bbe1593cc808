use crate::bus::{CommandPipe, Delivery};
use crate::cadence::TelemetryCadenceController;
use crate::config::{AppConfig, ConfigError};
use crate::dispatch::{CommandDispatcher, DispatchError, APP_VERSION};
use crate::events::{EventId, EventLog, EventSeverity};
use crate::payload::{Payload, PayloadError, PayloadSnapshot};
use crate::protocol::{BusMessage, Command, CommandResponse, ProtocolError, ProtocolHandler, ResponseStatus, StatusReport};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, warn};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AgentState {
    pub running: bool,
    pub tick_count: u64,
    pub command_count: u32,
    pub report_count: u32,
    pub unroutable_count: u32,
    pub last_error: Option<alloc::string::String>,
}

/// What handling one inbound message produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    Command(CommandResponse),
    Tick(Option<StatusReport>),
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    InvalidTransition(#[from] PayloadError),
    #[error("Received invalid command packet, MID = 0x{topic_id:08X}")]
    UnroutableInput { topic_id: u32 },
    #[error("Transport unavailable: {0}")]
    TransportUnavailable(alloc::string::String),
    #[error("Protocol error: {0}")]
    ProtocolError(#[from] ProtocolError),
    #[error("Dispatch error: {0}")]
    DispatchError(DispatchError),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl From<DispatchError> for AgentError {
    fn from(e: DispatchError) -> Self {
        match e {
            DispatchError::Payload(e) => AgentError::InvalidTransition(e),
            other => AgentError::DispatchError(other),
        }
    }
}

/// The payload application context.
///
/// Constructed once at startup and owned by exactly one consumer: every
/// command and tick is handled through `&mut self`, one at a time, in the
/// order it arrived. No other task may touch the payload state.
pub struct PayloadAgent {
    config: AppConfig,
    payload: Payload,
    dispatcher: CommandDispatcher,
    cadence: TelemetryCadenceController,
    protocol_handler: ProtocolHandler,
    events: EventLog,
    state: AgentState,
}

impl PayloadAgent {
    pub fn new(config: AppConfig) -> Result<Self, AgentError> {
        config.validate()?;

        Ok(Self {
            payload: Payload::new(config.detector_rows),
            dispatcher: CommandDispatcher::with_payload_handlers()?,
            cadence: TelemetryCadenceController::new(config.tlm_slow_rate),
            protocol_handler: ProtocolHandler::new(),
            events: EventLog::new(),
            state: AgentState::default(),
            config,
        })
    }

    pub fn start(&mut self) {
        self.state.running = true;
        self.events.send(
            EventId::InitApp,
            EventSeverity::Information,
            format_args!("{} App Initialized. Version {}", self.config.app_name, APP_VERSION),
        );
    }

    pub fn stop(&mut self, reason: &AgentError) {
        self.state.running = false;
        self.events.send(
            EventId::Exit,
            EventSeverity::Critical,
            format_args!("{} App terminating, err = {}", self.config.app_name, reason),
        );
    }

    /// Route one inbound message by topic and process it to completion.
    pub fn handle_message(&mut self, message: &BusMessage) -> Result<MessageOutcome, AgentError> {
        if message.topic_id == self.config.cmd_topic_id {
            let Some(command) = message.command else {
                let error = AgentError::ProtocolError(ProtocolError::MissingCommand);
                self.events.send(EventId::InvalidCmd, EventSeverity::Error, format_args!("{}", error));
                return Err(error);
            };
            Ok(MessageOutcome::Command(self.execute_command(&command)))
        } else if message.topic_id == self.config.tick_topic_id {
            Ok(MessageOutcome::Tick(self.tick()))
        } else {
            self.state.unroutable_count = self.state.unroutable_count.saturating_add(1);
            let error = AgentError::UnroutableInput { topic_id: message.topic_id };
            self.events.send(EventId::InvalidCmd, EventSeverity::Error, format_args!("{}", error));
            Err(error)
        }
    }

    /// Validate and apply one command against the current power state.
    ///
    /// Rejections are not errors for the sender: they are counted, reported
    /// as events and answered with a `Rejected` response.
    pub fn execute_command(&mut self, command: &Command) -> CommandResponse {
        let before = self.payload.current_state();
        let result = self.dispatcher.dispatch(command, &mut self.payload, &mut self.events);
        self.state.command_count = self.state.command_count.saturating_add(1);

        if self.payload.current_state() != before {
            self.cadence.restart();
        }

        match result {
            Ok(()) => self.protocol_handler.create_response(command.id, ResponseStatus::Success, None),
            Err(e) => {
                let error = AgentError::from(e);
                let text = alloc::string::ToString::to_string(&error);
                debug!(command_id = command.id, "Command rejected: {}", text);
                self.state.last_error = Some(text.clone());
                self.protocol_handler.create_response(command.id, ResponseStatus::Rejected, Some(&text))
            }
        }
    }

    /// Cycle driver: step the payload exactly once, then let the cadence
    /// controller decide whether the resulting state is reported.
    pub fn tick(&mut self) -> Option<StatusReport> {
        self.state.tick_count = self.state.tick_count.wrapping_add(1);

        let snapshot = self.payload.cycle();
        if !self.cadence.decide(snapshot.power_state) {
            return None;
        }

        let report = self.protocol_handler.create_status_report(
            self.config.status_tlm_topic_id,
            self.state.tick_count,
            self.dispatcher.valid_count(),
            self.dispatcher.invalid_count(),
            &snapshot,
        );
        self.state.report_count = self.state.report_count.saturating_add(1);

        Some(report)
    }

    pub fn snapshot(&self) -> PayloadSnapshot {
        self.payload.snapshot()
    }

    pub fn get_state(&self) -> &AgentState {
        &self.state
    }

    pub fn get_config(&self) -> &AppConfig {
        &self.config
    }

    pub fn get_events(&self) -> &EventLog {
        &self.events
    }

    pub fn get_cadence(&self) -> &TelemetryCadenceController {
        &self.cadence
    }

    pub fn get_dispatcher(&self) -> &CommandDispatcher {
        &self.dispatcher
    }

    pub fn protocol_handler(&mut self) -> &mut ProtocolHandler {
        &mut self.protocol_handler
    }
}

/// Run loop: the single consumer of the command pipe.
///
/// Waits for the next delivery, handles it to completion, answers commands
/// on their reply channel and publishes emitted status reports. Returns only
/// when the pipe can no longer deliver, which is fatal to the app.
pub async fn run(
    mut agent: PayloadAgent,
    mut pipe: CommandPipe,
    reports: broadcast::Sender<StatusReport>,
) -> AgentError {
    loop {
        let Delivery { message, reply } = match pipe.receive().await {
            Ok(delivery) => delivery,
            Err(e) => {
                agent.stop(&e);
                return e;
            }
        };

        match agent.handle_message(&message) {
            Ok(MessageOutcome::Command(response)) => {
                if let Some(reply) = reply {
                    // Requester may have gone away; the command was still applied
                    let _ = reply.send(response);
                }
            }
            Ok(MessageOutcome::Tick(report)) => {
                if let Some(report) = report {
                    // No subscribers is not an error
                    let _ = reports.send(report);
                }
                if let Some(reply) = reply {
                    let response = agent.protocol_handler().create_response(
                        message_id(&message),
                        ResponseStatus::Success,
                        Some("Handled as tick"),
                    );
                    let _ = reply.send(response);
                }
            }
            Err(e) => {
                warn!("Dropped inbound message: {}", e);
                if let Some(reply) = reply {
                    let text = alloc::string::ToString::to_string(&e);
                    let response = agent.protocol_handler().create_response(
                        message_id(&message),
                        ResponseStatus::Rejected,
                        Some(&text),
                    );
                    let _ = reply.send(response);
                }
            }
        }
    }
}

fn message_id(message: &BusMessage) -> u32 {
    message.command.map_or(0, |command| command.id)
}
