//! Outcome record delivery
//!
//! Every record the sender produces goes through a `Vent`:
//! - Stdout - one JSON line per record
//! - File (JSONL) - appended to a configured path
//! - HTTP - POSTed to a configured endpoint
//!
//! Delivery is mandatory: a vent that cannot accept a record stops the run.

pub mod sinks;

use crate::report::EventInfo;

pub use sinks::from_config;

#[derive(thiserror::Error, Debug)]
pub enum VentError {
    #[error("failed to serialize event info")]
    Serialize(#[source] serde_json::Error),

    #[error("failed to write event info to {target}")]
    Io {
        target: String,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP request to {endpoint} failed: {reason}")]
    Http { endpoint: String, reason: String },
}

/// Accepts one outcome record at a time
pub trait Vent: Send + Sync {
    fn vent(&self, info: EventInfo) -> Result<(), VentError>;
}

/// Fan-out to several vents, in order; the first failure wins
#[derive(Default)]
pub struct EventLogs {
    sinks: Vec<Box<dyn Vent>>,
}

impl EventLogs {
    pub fn new(sinks: Vec<Box<dyn Vent>>) -> Self {
        Self { sinks }
    }

    #[cfg(test)]
    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }
}

impl Vent for EventLogs {
    fn vent(&self, info: EventInfo) -> Result<(), VentError> {
        for sink in &self.sinks {
            sink.vent(info.clone())?;
        }
        Ok(())
    }
}
