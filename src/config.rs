//! Runtime settings shared by the `docbus` subcommands.
use clap::Args;

use crate::protocol::{Priority, documents::DOCUMENT_PROTOCOL, transport::DEFAULT_MAX_FRAME_SIZE};

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct BusConfig {
    /// Protocol whose types are listed and served
    #[arg(long, default_value = DOCUMENT_PROTOCOL)]
    pub protocol: String,

    /// Largest accepted frame payload, in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_FRAME_SIZE)]
    pub max_frame_size: usize,

    /// Priority given to encoded messages
    #[arg(long, default_value = "normal")]
    pub priority: Priority,

    /// Trace level given to encoded messages and copied to their replies
    #[arg(long, default_value_t = 0)]
    pub trace_level: u8,

    /// Worker threads serving TCP connections
    #[arg(long, default_value_t = 4)]
    pub workers: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            protocol: DOCUMENT_PROTOCOL.to_string(),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            priority: Priority::default(),
            trace_level: 0,
            workers: 4,
        }
    }
}
