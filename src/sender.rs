//! The send loop
//!
//! Delay, probe, then build → transmit → report once per tick until the
//! message budget is spent or the run is cancelled. Iterations never overlap.

use log::{info, warn};
use std::sync::Arc;
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;

use crate::builder::{MessageBuilder, SendState};
use crate::config::SenderConfig;
use crate::error::SenderError;
use crate::probe::{self, ProbeStatus};
use crate::report::{EventInfo, Reporter};
use crate::template::EventTemplate;
use crate::transport::{Transmitter, Transport, UreqTransport};
use crate::vent::Vent;

pub struct Sender {
    config: SenderConfig,
    builder: MessageBuilder,
    reporter: Reporter,
    transmitter: Transmitter,
    vent: Arc<dyn Vent>,
}

impl Sender {
    /// Prepare a run: parse the template and wire the collaborators
    pub fn new(config: SenderConfig, transport: Arc<dyn Transport>, vent: Arc<dyn Vent>) -> Result<Self, SenderError> {
        let template = EventTemplate::from_config(&config)?;
        Ok(Self {
            builder: MessageBuilder::new(template, &config),
            reporter: Reporter::new(&config),
            transmitter: Transmitter::new(transport, config.add_tracing),
            vent,
            config,
        })
    }

    /// Same as `new`, sending through a ureq client
    pub fn with_http_client(config: SenderConfig, vent: Arc<dyn Vent>) -> Result<Self, SenderError> {
        let transport = Arc::new(UreqTransport::new(config.request_timeout));
        Self::new(config, transport, vent)
    }

    /// Run until the message budget is spent, the token is cancelled or a fatal error occurs
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), SenderError> {
        info!("Sender configuration: {:?}", self.config);

        let delay = self.config.delay;
        if !delay.is_zero() {
            info!("Will sleep for {:?}", delay);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Cancelled while waiting to start");
                    return Ok(());
                }
                _ = tokio::time::sleep(delay) => info!("Awake, continuing"),
            }
        }

        if self.config.probe_sink {
            let status = probe::probe_sink(&self.transmitter, &self.config.sink, self.config.probe_timeout, &cancel).await?;
            if status == ProbeStatus::Cancelled {
                info!("Cancelled while probing the sink");
                return Ok(());
            }
        }

        let mut ticker = self.ticker();
        let mut state = SendState::default();
        loop {
            self.send_once(&mut state).await?;

            if !self.has_next(&state) {
                info!("Sent {} message(s), done", state.sent);
                return Ok(());
            }

            match ticker.as_mut() {
                Some(ticker) => {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            info!("Canceled sending messages because the run was cancelled");
                            return Ok(());
                        }
                        _ = ticker.tick() => {}
                    }
                }
                None => {
                    if cancel.is_cancelled() {
                        info!("Canceled sending messages because the run was cancelled");
                        return Ok(());
                    }
                    tokio::task::yield_now().await;
                }
            }
        }
    }

    /// One iteration: build, transmit, report
    async fn send_once(&self, state: &mut SendState) -> Result<(), SenderError> {
        let (mut request, event) = self.builder.build(state).map_err(SenderError::Encode)?;

        let outcome = self.transmitter.transmit(&mut request).await?;
        state.sent += 1;

        let sent = self
            .reporter
            .sent_info(event.as_ref(), &request, outcome.as_ref().err(), state.sequence);
        self.forward(sent).await?;

        match outcome {
            Ok(response) => {
                let info = self.reporter.response_info(response, event.as_ref(), state.sequence);
                self.forward(info).await?;
            }
            Err(e) => warn!("Sending to {} failed: {}", self.config.sink, e),
        }
        Ok(())
    }

    /// Hand a record to the vent on the blocking pool; vents may do network I/O
    async fn forward(&self, info: EventInfo) -> Result<(), SenderError> {
        let vent = self.vent.clone();
        tokio::task::spawn_blocking(move || vent.vent(info))
            .await
            .map_err(SenderError::Join)?
            .map_err(SenderError::Vent)
    }

    fn has_next(&self, state: &SendState) -> bool {
        let max = self.config.max_messages;
        if max == 0 {
            return true;
        }
        let count = if self.builder.template().has_event() {
            state.sequence
        } else {
            state.sent
        };
        count < max
    }

    /// Fixed-period ticker; none when the period is zero
    fn ticker(&self) -> Option<Interval> {
        let period = self.config.period;
        if period.is_zero() {
            return None;
        }
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Some(ticker)
    }
}
