//! Built-in vents

use eyre::{Context, Result, eyre};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use ureq::Agent;

use super::{EventLogs, Vent, VentError};
use crate::config::{Config, VentConfig, VentSink};
use crate::report::EventInfo;

/// Build the configured vents
pub fn from_config(config: &VentConfig) -> Result<EventLogs> {
    let mut sinks: Vec<Box<dyn Vent>> = Vec::new();
    for sink in &config.sinks {
        match sink {
            VentSink::Stdout => sinks.push(Box::new(StdoutVent)),
            VentSink::File => {
                let path = config
                    .file
                    .as_ref()
                    .ok_or_else(|| eyre!("file vent selected but vent.file is not set"))?;
                let vent = FileVent::open(Config::expand_path(path))?;
                sinks.push(Box::new(vent));
            }
            VentSink::Http => {
                let endpoint = config
                    .http_endpoint
                    .as_ref()
                    .ok_or_else(|| eyre!("http vent selected but vent.http_endpoint is not set"))?;
                if config.timeout == 0 {
                    return Err(eyre!("http vent requires a non-zero vent.timeout"));
                }
                sinks.push(Box::new(HttpVent::new(endpoint, Duration::from_secs(config.timeout))));
            }
        }
    }
    if sinks.is_empty() {
        return Err(eyre!("no vent sinks configured"));
    }
    Ok(EventLogs::new(sinks))
}

fn to_json(info: &EventInfo) -> Result<String, VentError> {
    serde_json::to_string(info).map_err(VentError::Serialize)
}

/// Print records to stdout
pub struct StdoutVent;

impl Vent for StdoutVent {
    fn vent(&self, info: EventInfo) -> Result<(), VentError> {
        let json = to_json(&info)?;
        let mut out = std::io::stdout().lock();
        writeln!(out, "{}", json)
            .and_then(|_| out.flush())
            .map_err(|source| VentError::Io {
                target: "stdout".to_string(),
                source,
            })
    }
}

/// Append records to a JSONL file
pub struct FileVent {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileVent {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).context(format!("Failed to create vent directory {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .context(format!("Failed to open vent file {}", path.display()))?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }
}

impl Vent for FileVent {
    fn vent(&self, info: EventInfo) -> Result<(), VentError> {
        let json = to_json(&info)?;
        let io_err = |source: std::io::Error| VentError::Io {
            target: self.path.display().to_string(),
            source,
        };
        let mut file = self.file.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        writeln!(file, "{}", json).map_err(io_err)?;
        file.flush().map_err(io_err)
    }
}

/// POST records to an HTTP collector.
///
/// Each record is bounded by `timeout`; a silent collector is a delivery error.
/// Non-2xx statuses surface as errors from the agent.
pub struct HttpVent {
    endpoint: String,
    agent: Agent,
}

impl HttpVent {
    pub fn new(endpoint: &str, timeout: Duration) -> Self {
        let agent: Agent = Agent::config_builder().timeout_global(Some(timeout)).build().into();
        Self {
            endpoint: endpoint.to_string(),
            agent,
        }
    }
}

impl Vent for HttpVent {
    fn vent(&self, info: EventInfo) -> Result<(), VentError> {
        let body = to_json(&info)?;
        match self
            .agent
            .post(self.endpoint.as_str())
            .header("Content-Type", "application/json")
            .send(body.as_bytes())
        {
            Ok(_) => Ok(()),
            Err(e) => Err(VentError::Http {
                endpoint: self.endpoint.clone(),
                reason: e.to_string(),
            }),
        }
    }
}
