//! Builds one outbound request per iteration

use chrono::Utc;
use log::debug;

use crate::config::SenderConfig;
use crate::event::{self, Encoding, Event, binding};
use crate::message::OutboundRequest;
use crate::template::EventTemplate;

/// Loop state threaded through every iteration by the scheduler
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SendState {
    /// Incremented once per templated event, starting from 0
    pub sequence: u64,
    /// Iterations completed
    pub sent: u64,
}

pub struct MessageBuilder {
    template: EventTemplate,
    method: String,
    sink: String,
    encoding: Encoding,
    add_sequence: bool,
    incremental_id: bool,
    override_time: bool,
}

impl MessageBuilder {
    pub fn new(template: EventTemplate, config: &SenderConfig) -> Self {
        Self {
            template,
            method: config.method.clone(),
            sink: config.sink.clone(),
            encoding: config.encoding,
            add_sequence: config.add_sequence,
            incremental_id: config.incremental_id,
            override_time: config.override_time,
        }
    }

    pub fn template(&self) -> &EventTemplate {
        &self.template
    }

    /// Produce the next request and the event it carries, if any.
    ///
    /// Errors are encoding failures: the same event would fail again, so the
    /// caller should stop.
    pub fn build(&self, state: &mut SendState) -> Result<(OutboundRequest, Option<Event>), event::Error> {
        let mut request = OutboundRequest::new(&self.method, &self.sink);

        let event = match self.template.event() {
            Some(mut event) => {
                state.sequence += 1;
                if self.add_sequence {
                    event.set_extension("sequence", state.sequence)?;
                }
                if self.incremental_id {
                    event.id = state.sequence.to_string();
                }
                if self.override_time {
                    event.time = Some(Utc::now());
                }

                debug!("Sending event #{}\n{}", state.sequence, event);

                binding::write_request(&event, self.encoding, &mut request)?;
                Some(event)
            }
            None => None,
        };

        for (name, value) in self.template.headers() {
            request.headers.add(name, value.clone());
        }

        if let Some(body) = self.template.body() {
            request.body = body.to_vec();
        }

        Ok((request, event))
    }
}
