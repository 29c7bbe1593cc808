use arrayvec::ArrayString;
use core::fmt::Write;
use heapless::Vec;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

const MAX_EVENT_HISTORY: usize = 32;
pub const MAX_EVENT_TEXT: usize = 122;

pub const BASE_EVENT_ID: u16 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventId {
    InitApp,
    NoOpCmd,
    Exit,
    InvalidCmd,
    PowerOnCmd,
    PowerOnCmdErr,
    PowerOffCmd,
    PowerResetCmdErr,
    PowerResetCmd,
    SetFaultCmd,
    ClearFaultCmd,
    ResetCountersCmd,
}

impl EventId {
    pub fn code(self) -> u16 {
        BASE_EVENT_ID + self as u16
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Information,
    Error,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub sequence: u32,
    pub id: EventId,
    pub severity: EventSeverity,
    pub text: ArrayString<MAX_EVENT_TEXT>,
}

/// Operator-visible event reports.
///
/// Every event goes out through `tracing`; the most recent ones are also
/// kept so ground tooling and tests can inspect what the operator saw.
#[derive(Debug)]
pub struct EventLog {
    history: Vec<EventRecord, MAX_EVENT_HISTORY>,
    next_sequence: u32,
}

impl EventLog {
    pub fn new() -> Self {
        Self {
            history: Vec::new(),
            next_sequence: 1,
        }
    }

    pub fn send(&mut self, id: EventId, severity: EventSeverity, args: core::fmt::Arguments<'_>) {
        let mut text = ArrayString::<MAX_EVENT_TEXT>::new();
        // Overlong text is truncated at the failing fragment
        let _ = text.write_fmt(args);

        let event_id = id.code();
        match severity {
            EventSeverity::Debug => debug!(event_id, "{}", text),
            EventSeverity::Information => info!(event_id, "{}", text),
            EventSeverity::Error => error!(event_id, "{}", text),
            EventSeverity::Critical => error!(event_id, critical = true, "{}", text),
        }

        let record = EventRecord {
            sequence: self.next_sequence,
            id,
            severity,
            text,
        };
        self.next_sequence = self.next_sequence.wrapping_add(1);

        if self.history.is_full() {
            self.history.remove(0);
        }
        let _ = self.history.push(record);
    }

    pub fn get_history(&self) -> &[EventRecord] {
        &self.history
    }

    pub fn last(&self) -> Option<&EventRecord> {
        self.history.last()
    }

    pub fn count_of(&self, id: EventId) -> usize {
        self.history.iter().filter(|e| e.id == id).count()
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}
