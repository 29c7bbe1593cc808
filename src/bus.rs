//! In-process stand-in for the software bus.
//!
//! Any number of producers publish into one bounded FIFO pipe; exactly one
//! consumer (the agent run loop) drains it. Commands may carry a reply
//! channel so the producer can wait for the command response.

use crate::agent::AgentError;
use crate::protocol::{BusMessage, CommandResponse};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::debug;

#[derive(Debug)]
pub struct Delivery {
    pub message: BusMessage,
    pub reply: Option<oneshot::Sender<CommandResponse>>,
}

#[derive(Debug, Clone)]
pub struct BusSender {
    tx: mpsc::Sender<Delivery>,
}

impl BusSender {
    /// Publish without waiting for any response.
    pub async fn publish(&self, message: BusMessage) -> Result<(), AgentError> {
        self.tx
            .send(Delivery { message, reply: None })
            .await
            .map_err(|_| AgentError::TransportUnavailable("pipe closed".into()))
    }

    /// Publish a command and wait for its response.
    pub async fn request(&self, message: BusMessage) -> Result<CommandResponse, AgentError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Delivery {
                message,
                reply: Some(reply_tx),
            })
            .await
            .map_err(|_| AgentError::TransportUnavailable("pipe closed".into()))?;

        reply_rx
            .await
            .map_err(|_| AgentError::TransportUnavailable("no response for message".into()))
    }
}

/// Receiving end of the pipe. Not cloneable: there is one consumer.
#[derive(Debug)]
pub struct CommandPipe {
    name: alloc::string::String,
    rx: mpsc::Receiver<Delivery>,
}

impl CommandPipe {
    /// Pend until the next delivery.
    pub async fn receive(&mut self) -> Result<Delivery, AgentError> {
        self.rx.recv().await.ok_or_else(|| {
            AgentError::TransportUnavailable(alloc::format!("{} has no remaining publishers", self.name))
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

pub fn create_pipe(name: &str, depth: usize) -> (BusSender, CommandPipe) {
    let (tx, rx) = mpsc::channel(depth.max(1));
    (
        BusSender { tx },
        CommandPipe {
            name: name.into(),
            rx,
        },
    )
}

/// Publish a tick on `topic_id` every `period` until the pipe closes.
pub fn spawn_tick_source(sender: BusSender, topic_id: u32, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = time::interval(period);
        // A tick delayed by a full pipe is not replayed in a burst
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            if sender.publish(BusMessage::tick(topic_id)).await.is_err() {
                debug!("Tick source stopping, pipe closed");
                break;
            }
        }
    })
}
