//! Startup configuration loaded from the JSON init file.
//!
//! Keys follow the init-table names used by the flight build so one file can
//! drive both. Missing keys fall back to the defaults below.

use crate::payload::DEFAULT_ROW_COUNT;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

pub const DEFAULT_CMD_TOPIC_ID: u32 = 0x1FD0;
pub const DEFAULT_TICK_TOPIC_ID: u32 = 0x1FD1;
pub const DEFAULT_STATUS_TLM_TOPIC_ID: u32 = 0x0FD0;
pub const DEFAULT_TLM_SLOW_RATE: u32 = 4;
pub const DEFAULT_CMD_PIPE_DEPTH: usize = 10;
pub const DEFAULT_TICK_PERIOD_MS: u64 = 1000;
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8090";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read init file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed init file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("{key} must be at least 1")]
    ZeroValue { key: &'static str },
    #[error("topic id 0x{topic_id:08X} is assigned to more than one topic")]
    DuplicateTopic { topic_id: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", default)]
pub struct AppConfig {
    pub app_name: String,
    #[serde(rename = "PL_SIM_CMD_TOPICID")]
    pub cmd_topic_id: u32,
    #[serde(rename = "BC_SCH_1_HZ_TOPICID")]
    pub tick_topic_id: u32,
    #[serde(rename = "PL_SIM_STATUS_TLM_TOPICID")]
    pub status_tlm_topic_id: u32,
    pub tlm_slow_rate: u32,
    pub cmd_pipe_depth: usize,
    pub cmd_pipe_name: String,
    pub detector_rows: u16,
    pub tick_period_ms: u64,
    pub listen_addr: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app_name: "PL_SIM".to_string(),
            cmd_topic_id: DEFAULT_CMD_TOPIC_ID,
            tick_topic_id: DEFAULT_TICK_TOPIC_ID,
            status_tlm_topic_id: DEFAULT_STATUS_TLM_TOPIC_ID,
            tlm_slow_rate: DEFAULT_TLM_SLOW_RATE,
            cmd_pipe_depth: DEFAULT_CMD_PIPE_DEPTH,
            cmd_pipe_name: "PL_SIM_CMD_PIPE".to_string(),
            detector_rows: DEFAULT_ROW_COUNT,
            tick_period_ms: DEFAULT_TICK_PERIOD_MS,
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;

        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tlm_slow_rate == 0 {
            return Err(ConfigError::ZeroValue { key: "TLM_SLOW_RATE" });
        }
        if self.detector_rows == 0 {
            return Err(ConfigError::ZeroValue { key: "DETECTOR_ROWS" });
        }
        if self.cmd_pipe_depth == 0 {
            return Err(ConfigError::ZeroValue { key: "CMD_PIPE_DEPTH" });
        }
        if self.tick_period_ms == 0 {
            return Err(ConfigError::ZeroValue { key: "TICK_PERIOD_MS" });
        }

        if self.cmd_topic_id == self.tick_topic_id || self.cmd_topic_id == self.status_tlm_topic_id {
            return Err(ConfigError::DuplicateTopic { topic_id: self.cmd_topic_id });
        }
        if self.tick_topic_id == self.status_tlm_topic_id {
            return Err(ConfigError::DuplicateTopic { topic_id: self.tick_topic_id });
        }

        Ok(())
    }
}
