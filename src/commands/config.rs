use colored::*;
use eyre::{Context, Result};

use crate::cli::{ConfigAction, OutputFormat};
use crate::config::{Config, VentSink};
use crate::template::EventTemplate;

pub fn run(action: ConfigAction, config: &Config) -> Result<()> {
    match action {
        ConfigAction::Show { format } => show(OutputFormat::resolve(format), config),
        ConfigAction::Validate => validate(config),
    }
}

fn show(format: OutputFormat, config: &Config) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(config)?);
        }
        OutputFormat::Yaml => {
            println!("{}", serde_yaml::to_string(config)?);
        }
        OutputFormat::Text => {
            let s = &config.sender;
            println!("{}", "Sender Configuration".bold());
            println!();

            println!("{}:", "sender".cyan());
            println!("  sender_name: {}", s.sender_name);
            println!("  sink: {}", s.sink.as_deref().unwrap_or("<unset>"));
            println!("  method: {}", s.input_method);
            println!("  encoding: {}", s.event_encoding);
            println!("  delay: {}s", s.delay);
            println!("  probe_sink: {} (timeout {}s)", s.probe_sink, s.probe_sink_timeout);
            println!("  period: {}s", s.period);
            println!("  max_messages: {}", s.max_messages);
            println!("  input_event: {}", if s.input_event.is_some() { "set" } else { "unset" });
            println!("  input_body: {}", if s.input_body.is_some() { "set" } else { "unset" });
            println!("  input_headers: {}", s.input_headers.len());
            println!(
                "  add_sequence: {}  incremental_id: {}  override_time: {}  add_tracing: {}",
                s.add_sequence, s.incremental_id, s.override_time, s.add_tracing
            );
            println!();

            println!("{}:", "vent".cyan());
            let sinks: Vec<_> = config.vent.sinks.iter().map(|k| format!("{:?}", k).to_lowercase()).collect();
            println!("  sinks: {}", sinks.join(", "));
            if let Some(ref file) = config.vent.file {
                println!("  file: {}", file.display());
            }
            if let Some(ref endpoint) = config.vent.http_endpoint {
                println!("  http_endpoint: {} (timeout {}s)", endpoint, config.vent.timeout);
            }
            println!();
            println!("{}: {}", "log_level".cyan(), config.log_level.as_filter());
        }
    }

    Ok(())
}

fn validate(config: &Config) -> Result<()> {
    let sender = config.sender.validate().context("Invalid sender configuration")?;
    let template = EventTemplate::from_config(&sender).context("Invalid sender input")?;

    if config.vent.sinks.contains(&VentSink::File) && config.vent.file.is_none() {
        eyre::bail!("vent sink 'file' requires vent.file");
    }
    if config.vent.sinks.contains(&VentSink::Http) && config.vent.http_endpoint.is_none() {
        eyre::bail!("vent sink 'http' requires vent.http_endpoint");
    }
    if config.vent.sinks.contains(&VentSink::Http) && config.vent.timeout == 0 {
        eyre::bail!("vent sink 'http' requires a non-zero vent.timeout");
    }

    println!("{} Configuration is valid", "✓".green());
    println!("  sink: {} ({} {})", sender.sink.cyan(), sender.method, sender.encoding);
    println!(
        "  payload: {}",
        match (template.has_event(), template.body().is_some()) {
            (true, true) => "event with body override",
            (true, false) => "event",
            (false, true) => "static body",
            (false, false) => "headers only",
        }
    );
    let budget = if sender.max_messages == 0 {
        "unlimited".to_string()
    } else {
        sender.max_messages.to_string()
    };
    println!("  messages: {} every {:?}", budget, sender.period);

    Ok(())
}
