use eyre::{Context, Result, eyre};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::SenderError;
use crate::event::Encoding;

/// Log verbosity, overridden by RUST_LOG when set
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Off,
}

impl LogLevel {
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Off => "off",
        }
    }

    pub fn level_filter(&self) -> log::LevelFilter {
        match self {
            LogLevel::Trace => log::LevelFilter::Trace,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Off => log::LevelFilter::Off,
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Some(Self::Trace),
            "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" | "warning" => Some(Self::Warn),
            "error" => Some(Self::Error),
            "off" | "none" => Some(Self::Off),
            _ => None,
        }
    }
}

/// Main configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub log_level: LogLevel,
    /// Append logs here instead of stderr
    pub log_file: Option<PathBuf>,
    pub sender: SenderSettings,
    pub vent: VentConfig,
}

/// Sender settings as written by the user, before validation
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SenderSettings {
    /// Identity recorded as origin/observer of sent events
    pub sender_name: String,
    /// Destination URL for every message
    pub sink: Option<String>,
    /// Seconds to wait before doing anything
    pub delay: u64,
    /// Probe the sink until it responds before sending
    pub probe_sink: bool,
    /// Seconds to wait for the probe to succeed
    pub probe_sink_timeout: u64,
    /// Base event in the CloudEvents JSON format
    pub input_event: Option<String>,
    /// binary or structured
    pub event_encoding: String,
    /// Headers added to every request, after the event is written
    pub input_headers: IndexMap<String, String>,
    /// Body sent instead of whatever the event produced
    pub input_body: Option<String>,
    pub input_method: String,
    pub add_tracing: bool,
    /// Set the `sequence` extension on every event
    pub add_sequence: bool,
    /// Replace the event id with the sequence number
    pub incremental_id: bool,
    /// Replace the event time with the send time
    pub override_time: bool,
    /// Seconds between messages
    pub period: u64,
    /// Messages to send, 0 for unlimited
    pub max_messages: u64,
    /// Seconds before an exchange with the sink gives up, 0 for none
    pub request_timeout: u64,
}

impl Default for SenderSettings {
    fn default() -> Self {
        Self {
            sender_name: "sender-default".to_string(),
            sink: None,
            delay: 5,
            probe_sink: true,
            probe_sink_timeout: 60,
            input_event: None,
            event_encoding: "binary".to_string(),
            input_headers: IndexMap::new(),
            input_body: None,
            input_method: "POST".to_string(),
            add_tracing: false,
            add_sequence: false,
            incremental_id: false,
            override_time: false,
            period: 5,
            max_messages: 1,
            request_timeout: 30,
        }
    }
}

/// Where outcome records are delivered
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VentSink {
    /// One JSON line per record on stdout
    Stdout,
    /// Append JSON lines to `vent.file`
    File,
    /// POST each record to `vent.http_endpoint`
    Http,
}

impl VentSink {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stdout" => Some(Self::Stdout),
            "file" => Some(Self::File),
            "http" => Some(Self::Http),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct VentConfig {
    pub sinks: Vec<VentSink>,
    pub file: Option<PathBuf>,
    pub http_endpoint: Option<String>,
    /// Per-record timeout for the http vent, in seconds; must be non-zero
    pub timeout: u64,
}

impl Default for VentConfig {
    fn default() -> Self {
        Self {
            sinks: vec![VentSink::Stdout],
            file: None,
            http_endpoint: None,
            timeout: 10,
        }
    }
}

/// Validated, immutable sender configuration
#[derive(Debug, Clone)]
pub struct SenderConfig {
    pub sender_name: String,
    pub sink: String,
    pub delay: Duration,
    pub probe_sink: bool,
    pub probe_timeout: Duration,
    pub input_event: Option<String>,
    pub encoding: Encoding,
    pub input_headers: IndexMap<String, String>,
    pub input_body: Option<String>,
    pub method: String,
    pub add_tracing: bool,
    pub add_sequence: bool,
    pub incremental_id: bool,
    pub override_time: bool,
    pub period: Duration,
    pub max_messages: u64,
    pub request_timeout: Option<Duration>,
}

impl SenderSettings {
    /// Check the settings and turn them into the record the sender runs on
    pub fn validate(&self) -> Result<SenderConfig, SenderError> {
        let sink = self
            .sink
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(SenderError::MissingSink)?;

        let uri: ureq::http::Uri = sink.parse().map_err(|e: ureq::http::uri::InvalidUri| SenderError::InvalidSink {
            sink: sink.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(uri.scheme_str(), Some("http") | Some("https")) || uri.host().is_none() {
            return Err(SenderError::InvalidSink {
                sink: sink.to_string(),
                reason: "expected an http or https url".to_string(),
            });
        }

        let method = self.input_method.trim().to_ascii_uppercase();
        if method.is_empty() || ureq::http::Method::from_bytes(method.as_bytes()).is_err() {
            return Err(SenderError::InvalidMethod(self.input_method.clone()));
        }

        let encoding = self
            .event_encoding
            .parse::<Encoding>()
            .map_err(SenderError::UnsupportedEncoding)?;

        Ok(SenderConfig {
            sender_name: self.sender_name.clone(),
            sink: sink.to_string(),
            delay: Duration::from_secs(self.delay),
            probe_sink: self.probe_sink,
            probe_timeout: Duration::from_secs(self.probe_sink_timeout),
            input_event: self.input_event.clone().filter(|s| !s.is_empty()),
            encoding,
            input_headers: self.input_headers.clone(),
            input_body: self.input_body.clone().filter(|s| !s.is_empty()),
            method,
            add_tracing: self.add_tracing,
            add_sequence: self.add_sequence,
            incremental_id: self.incremental_id,
            override_time: self.override_time,
            period: Duration::from_secs(self.period),
            max_messages: self.max_messages,
            request_timeout: (self.request_timeout > 0).then(|| Duration::from_secs(self.request_timeout)),
        })
    }
}

impl Config {
    /// Load configuration with fallback chain, then apply environment overrides
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        let mut config = Self::load_file(config_path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    fn load_file(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        if let Ok(env_path) = std::env::var("EVENTSENDER_CONFIG") {
            let path = Self::expand_path(Path::new(&env_path));
            return Self::load_from_file(&path).context(format!("Failed to load config from EVENTSENDER_CONFIG ({})", path.display()));
        }

        // Try ./eventsender.yaml (for development)
        let local_config = PathBuf::from("eventsender.yaml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load local config: {}", e);
                }
            }
        }

        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Override values from environment variables
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let s = &mut self.sender;

        if let Some(v) = lookup("POD_NAME") {
            s.sender_name = v;
        }
        if let Some(v) = lookup("SINK") {
            s.sink = Some(v);
        }
        if let Some(v) = lookup("DELAY") {
            s.delay = parse_u64("DELAY", &v)?;
        }
        if let Some(v) = lookup("PROBE_SINK") {
            s.probe_sink = parse_bool("PROBE_SINK", &v)?;
        }
        if let Some(v) = lookup("PROBE_SINK_TIMEOUT") {
            s.probe_sink_timeout = parse_u64("PROBE_SINK_TIMEOUT", &v)?;
        }
        if let Some(v) = lookup("INPUT_EVENT") {
            s.input_event = Some(v);
        }
        if let Some(v) = lookup("EVENT_ENCODING") {
            s.event_encoding = v;
        }
        if let Some(v) = lookup("INPUT_HEADERS") {
            s.input_headers = parse_map("INPUT_HEADERS", &v)?;
        }
        if let Some(v) = lookup("INPUT_BODY") {
            s.input_body = Some(v);
        }
        if let Some(v) = lookup("INPUT_METHOD") {
            s.input_method = v;
        }
        if let Some(v) = lookup("ADD_TRACING") {
            s.add_tracing = parse_bool("ADD_TRACING", &v)?;
        }
        if let Some(v) = lookup("ADD_SEQUENCE") {
            s.add_sequence = parse_bool("ADD_SEQUENCE", &v)?;
        }
        if let Some(v) = lookup("INCREMENTAL_ID") {
            s.incremental_id = parse_bool("INCREMENTAL_ID", &v)?;
        }
        if let Some(v) = lookup("OVERRIDE_TIME") {
            s.override_time = parse_bool("OVERRIDE_TIME", &v)?;
        }
        if let Some(v) = lookup("PERIOD") {
            s.period = parse_u64("PERIOD", &v)?;
        }
        if let Some(v) = lookup("MAX_MESSAGES") {
            s.max_messages = parse_u64("MAX_MESSAGES", &v)?;
        }
        if let Some(v) = lookup("REQUEST_TIMEOUT") {
            s.request_timeout = parse_u64("REQUEST_TIMEOUT", &v)?;
        }

        if let Some(v) = lookup("VENT_SINKS") {
            self.vent.sinks = v
                .split(',')
                .filter(|part| !part.trim().is_empty())
                .map(|part| VentSink::parse(part).ok_or_else(|| eyre!("VENT_SINKS: unknown sink {:?}", part.trim())))
                .collect::<Result<_>>()?;
        }
        if let Some(v) = lookup("VENT_FILE") {
            self.vent.file = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("VENT_HTTP_ENDPOINT") {
            self.vent.http_endpoint = Some(v);
        }
        if let Some(v) = lookup("VENT_TIMEOUT") {
            self.vent.timeout = parse_u64("VENT_TIMEOUT", &v)?;
        }
        if let Some(v) = lookup("LOG_LEVEL") {
            self.log_level = LogLevel::parse(&v).ok_or_else(|| eyre!("LOG_LEVEL: unknown level {:?}", v))?;
        }

        Ok(())
    }

    /// Expand a path that may contain ~ or env vars
    pub fn expand_path(path: &Path) -> PathBuf {
        let path_str = path.to_string_lossy();
        let expanded = shellexpand::full(&path_str).unwrap_or_else(|_| path_str.clone());
        PathBuf::from(expanded.as_ref())
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "t" | "true" | "yes" | "y" => Ok(true),
        "0" | "f" | "false" | "no" | "n" => Ok(false),
        other => Err(eyre!("{}: expected a boolean, got {:?}", name, other)),
    }
}

fn parse_u64(name: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse::<u64>()
        .wrap_err_with(|| format!("{}: expected a non-negative integer, got {:?}", name, value))
}

/// `key:value,key2:value2`
fn parse_map(name: &str, value: &str) -> Result<IndexMap<String, String>> {
    let mut map = IndexMap::new();
    for pair in value.split(',').filter(|p| !p.trim().is_empty()) {
        let (k, v) = pair
            .split_once(':')
            .ok_or_else(|| eyre!("{}: invalid map item {:?}, expected key:value", name, pair))?;
        map.insert(k.trim().to_string(), v.trim().to_string());
    }
    Ok(map)
}
