//! Wait for the sink to become reachable

use log::{debug, info};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::SenderError;
use crate::transport::Transmitter;

pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeStatus {
    Ready,
    Cancelled,
}

/// HEAD the sink every `POLL_INTERVAL` until it answers or `timeout` elapses.
///
/// Any HTTP response counts, whatever its status; only transport failures
/// mean the sink is not ready yet. The first attempt is immediate.
pub async fn probe_sink(
    transmitter: &Transmitter,
    sink: &str,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<ProbeStatus, SenderError> {
    let poll = async {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match transmitter.probe(sink).await? {
                Ok(()) => {
                    info!("Sink {} is reachable after {} probe(s)", sink, attempt);
                    return Ok::<(), SenderError>(());
                }
                Err(e) => debug!("Probe #{} of {} failed: {}", attempt, sink, e),
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Ok(ProbeStatus::Cancelled),
        result = tokio::time::timeout(timeout, poll) => match result {
            Ok(Ok(())) => Ok(ProbeStatus::Ready),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(SenderError::ProbeTimeout {
                sink: sink.to_string(),
                timeout,
            }),
        },
    }
}
