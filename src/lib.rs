//! # Payload Simulator
//!
//! Simulates an instrument payload attached to a spacecraft flight computer so
//! flight software and operators can be exercised without real hardware.
//!
//! ## Features
//!
//! - **Power lifecycle**: guarded power on / off / reset with lifecycle counters
//! - **Detector readout**: row cursor and image counter advanced once per tick
//! - **Fault injection**: a fault flag that freezes detector progress
//! - **Adaptive telemetry cadence**: full rate while powered, throttled while off
//! - **Command dispatch**: function-code routed commands with valid/invalid counters
//!
//! ## Quick Start
//!
//! ```rust
//! use plsim::{AppConfig, PayloadAgent};
//! use plsim::protocol::{Command, CommandType};
//!
//! let mut agent = PayloadAgent::new(AppConfig::default()).unwrap();
//! agent.start();
//!
//! let response = agent.execute_command(&Command::new(1, CommandType::PowerOn));
//! println!("{:?}", response.status);
//!
//! if let Some(report) = agent.tick() {
//!     println!("Row {} of image {}", report.readout_row, report.image_count);
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`payload`] - Power state machine, detector model and fault flag
//! - [`cadence`] - Telemetry cadence policy
//! - [`dispatch`] - Function-code command dispatch
//! - [`agent`] - Application context, cycle driver and run loop
//! - [`bus`] - Single-consumer message pipe and tick source
//! - [`protocol`] - Wire messages, responses and status reports
//! - [`events`] - Operator event reporting
//! - [`config`] - Init file loading

#![deny(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]

extern crate alloc;

pub mod agent;
pub mod bus;
pub mod cadence;
pub mod config;
pub mod dispatch;
pub mod events;
pub mod payload;
pub mod protocol;

// Re-export main public types for convenience
pub use agent::{AgentError, PayloadAgent};
pub use config::AppConfig;
pub use payload::{Payload, PowerState};
pub use protocol::{BusMessage, Command, StatusReport};
