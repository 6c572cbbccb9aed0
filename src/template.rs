//! The input a sender repeats: an optional base event plus static overrides

use indexmap::IndexMap;

use crate::config::SenderConfig;
use crate::error::SenderError;
use crate::event::Event;

/// Parsed once at startup and only ever read afterwards
#[derive(Debug, Clone, Default)]
pub struct EventTemplate {
    base: Option<Event>,
    headers: IndexMap<String, String>,
    body: Option<Vec<u8>>,
}

impl EventTemplate {
    pub fn new(
        input_event: Option<&str>,
        headers: IndexMap<String, String>,
        body: Option<&str>,
    ) -> Result<Self, SenderError> {
        let input_event = input_event.filter(|s| !s.is_empty());
        let body = body.filter(|s| !s.is_empty());

        if input_event.is_none() && body.is_none() && headers.is_empty() {
            return Err(SenderError::NoInput);
        }

        let base = input_event
            .map(Event::from_json)
            .transpose()
            .map_err(SenderError::InvalidBaseEvent)?;

        Ok(Self {
            base,
            headers,
            body: body.map(|b| b.as_bytes().to_vec()),
        })
    }

    pub fn from_config(config: &SenderConfig) -> Result<Self, SenderError> {
        Self::new(
            config.input_event.as_deref(),
            config.input_headers.clone(),
            config.input_body.as_deref(),
        )
    }

    pub fn has_event(&self) -> bool {
        self.base.is_some()
    }

    /// A fresh copy of the base event; the template itself is never touched
    pub fn event(&self) -> Option<Event> {
        self.base.clone()
    }

    pub fn headers(&self) -> &IndexMap<String, String> {
        &self.headers
    }

    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }
}
