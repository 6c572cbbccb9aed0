//! Fatal errors that end a send run

use std::time::Duration;

use crate::event;
use crate::vent::VentError;

/// Errors that abort the sender.
///
/// Transport failures and response decoding problems are not here: those are
/// recorded in the outcome records and the loop carries on.
#[derive(thiserror::Error, Debug)]
pub enum SenderError {
    #[error("sink is required")]
    MissingSink,

    #[error("invalid sink '{sink}': {reason}")]
    InvalidSink { sink: String, reason: String },

    #[error("invalid http method '{0}'")]
    InvalidMethod(String),

    #[error("unsupported encoding option: {0:?}")]
    UnsupportedEncoding(String),

    #[error("input values not provided: set a base event, a body or headers")]
    NoInput,

    #[error("unable to parse the base event from json")]
    InvalidBaseEvent(#[source] event::Error),

    #[error("probing the sink '{sink}' using timeout {timeout:?} failed")]
    ProbeTimeout { sink: String, timeout: Duration },

    #[error("cannot write the event into the request")]
    Encode(#[source] event::Error),

    #[error("cannot forward event info")]
    Vent(#[source] VentError),

    #[error("transport task failed")]
    Join(#[source] tokio::task::JoinError),
}
