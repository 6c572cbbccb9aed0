//! Integration tests for the sender binary
//!
//! These tests run the compiled binary against a small HTTP listener and
//! check what it sent and what it vented:
//! - Binary events with sequence numbers
//! - Structured replies decoded into events
//! - Probe timeout against an unreachable sink
//! - Configuration errors before any traffic

use std::fs;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::{Arc, Mutex};
use std::thread;

use serde_json::Value;
use tempfile::TempDir;

/// Helper to get the sender binary path
fn sender_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_eventsender"))
}

/// Helper to run the sender with a clean environment in `dir`
fn run_sender(dir: &Path, args: &[&str], envs: &[(&str, &str)]) -> Output {
    let mut cmd = Command::new(sender_binary());
    cmd.current_dir(dir).args(args);
    for key in [
        "RUST_LOG",
        "EVENTSENDER_CONFIG",
        "POD_NAME",
        "SINK",
        "INPUT_EVENT",
        "INPUT_BODY",
        "INPUT_HEADERS",
        "VENT_SINKS",
        "VENT_FILE",
        "VENT_HTTP_ENDPOINT",
        "VENT_TIMEOUT",
    ] {
        cmd.env_remove(key);
    }
    cmd.envs(envs.iter().copied());
    cmd.output().expect("Failed to execute eventsender")
}

/// A request as seen by the test sink
#[derive(Debug, Clone)]
struct Captured {
    method: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl Captured {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Canned reply: extra header lines and a body
#[derive(Clone)]
struct Reply {
    status: &'static str,
    headers: Vec<(&'static str, &'static str)>,
    body: &'static str,
}

impl Reply {
    fn accepted() -> Self {
        Self {
            status: "202 Accepted",
            headers: vec![],
            body: "",
        }
    }
}

/// Start a sink on an ephemeral port; it answers every request with `reply`
fn start_sink(reply: Reply) -> (String, Arc<Mutex<Vec<Captured>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}/", listener.local_addr().unwrap());
    let captured = Arc::new(Mutex::new(Vec::new()));

    let seen = captured.clone();
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(stream) = stream else { continue };
            handle(stream, &reply, &seen);
        }
    });

    (url, captured)
}

/// Record the request before answering so the sender never finishes ahead of the log
fn handle(mut stream: TcpStream, reply: &Reply, seen: &Mutex<Vec<Captured>>) -> Option<()> {
    let mut reader = BufReader::new(stream.try_clone().ok()?);

    let mut request_line = String::new();
    reader.read_line(&mut request_line).ok()?;
    let method = request_line.split_whitespace().next()?.to_string();

    let mut headers = Vec::new();
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).ok()?;
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((k, v)) = line.split_once(':') {
            headers.push((k.trim().to_string(), v.trim().to_string()));
        }
    }

    let length = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);
    let mut body = vec![0u8; length];
    reader.read_exact(&mut body).ok()?;
    seen.lock().unwrap().push(Captured {
        method: method.clone(),
        headers,
        body,
    });

    let mut response = format!("HTTP/1.1 {}\r\nConnection: close\r\n", reply.status);
    for (k, v) in &reply.headers {
        response.push_str(&format!("{}: {}\r\n", k, v));
    }
    response.push_str(&format!("Content-Length: {}\r\n\r\n", reply.body.len()));
    if method != "HEAD" {
        response.push_str(reply.body);
    }
    stream.write_all(response.as_bytes()).ok()?;
    stream.flush().ok()
}

fn read_records(path: &Path) -> Vec<Value> {
    fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

#[test]
fn test_sends_binary_events_and_vents_outcomes() {
    let temp = TempDir::new().unwrap();
    let vent_file = temp.path().join("events.jsonl");
    let (sink, captured) = start_sink(Reply::accepted());

    let output = run_sender(
        temp.path(),
        &["send"],
        &[
            ("POD_NAME", "sender-it"),
            ("SINK", sink.as_str()),
            ("DELAY", "0"),
            ("PROBE_SINK", "true"),
            ("PROBE_SINK_TIMEOUT", "5"),
            ("INPUT_EVENT", r#"{"id":"a","source":"/it","type":"t","data":{"n":1}}"#),
            ("INPUT_HEADERS", "x-test:yes"),
            ("ADD_SEQUENCE", "true"),
            ("MAX_MESSAGES", "2"),
            ("PERIOD", "0"),
            ("VENT_SINKS", "file"),
            ("VENT_FILE", vent_file.to_str().unwrap()),
        ],
    );
    assert!(
        output.status.success(),
        "sender failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let records = read_records(&vent_file);
    let kinds: Vec<_> = records.iter().map(|r| r["kind"].as_str().unwrap()).collect();
    assert_eq!(kinds, vec!["Sent", "Response", "Sent", "Response"]);

    assert_eq!(records[0]["sequence"], 1);
    assert_eq!(records[0]["origin"], "sender-it");
    assert_eq!(records[0]["event"]["sequence"], 1);
    assert_eq!(records[2]["event"]["sequence"], 2);
    assert_eq!(records[1]["statusCode"], 202);
    assert_eq!(records[1]["origin"], sink.as_str());
    assert_eq!(records[1]["sentId"], "a");

    let captured = captured.lock().unwrap();
    let posts: Vec<_> = captured.iter().filter(|c| c.method == "POST").collect();
    assert_eq!(posts.len(), 2);
    assert!(captured.iter().any(|c| c.method == "HEAD"));
    assert_eq!(posts[0].header("ce-id"), Some("a"));
    assert_eq!(posts[0].header("ce-sequence"), Some("1"));
    assert_eq!(posts[1].header("ce-sequence"), Some("2"));
    assert_eq!(posts[0].header("x-test"), Some("yes"));
    assert_eq!(posts[0].body, br#"{"n":1}"#.to_vec());
}

#[test]
fn test_structured_reply_is_decoded() {
    let temp = TempDir::new().unwrap();
    let vent_file = temp.path().join("events.jsonl");
    let (sink, captured) = start_sink(Reply {
        status: "200 OK",
        headers: vec![("Content-Type", "application/cloudevents+json")],
        body: r#"{"specversion":"1.0","id":"reply-1","source":"/sink","type":"reply"}"#,
    });

    let output = run_sender(
        temp.path(),
        &["send"],
        &[
            ("SINK", sink.as_str()),
            ("DELAY", "0"),
            ("PROBE_SINK", "false"),
            ("INPUT_EVENT", r#"{"id":"x","source":"/it","type":"t"}"#),
            ("EVENT_ENCODING", "structured"),
            ("INCREMENTAL_ID", "true"),
            ("MAX_MESSAGES", "1"),
            ("VENT_SINKS", "file"),
            ("VENT_FILE", vent_file.to_str().unwrap()),
        ],
    );
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let records = read_records(&vent_file);
    assert_eq!(records.len(), 2);
    assert_eq!(records[1]["event"]["id"], "reply-1");
    assert_eq!(records[1]["sentId"], "1");
    assert!(records[1].get("body").is_none());

    let captured = captured.lock().unwrap();
    assert_eq!(captured[0].header("content-type"), Some("application/cloudevents+json"));
    let sent: Value = serde_json::from_slice(&captured[0].body).unwrap();
    assert_eq!(sent["id"], "1");
}

#[test]
fn test_unreachable_sink_fails_probe() {
    let temp = TempDir::new().unwrap();
    let vent_file = temp.path().join("events.jsonl");

    let output = run_sender(
        temp.path(),
        &["send"],
        &[
            ("SINK", "http://127.0.0.1:1/"),
            ("DELAY", "0"),
            ("PROBE_SINK_TIMEOUT", "1"),
            ("INPUT_BODY", "ping"),
            ("VENT_SINKS", "file"),
            ("VENT_FILE", vent_file.to_str().unwrap()),
        ],
    );
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("probing the sink"), "stderr: {}", stderr);
    assert!(read_records(&vent_file).is_empty());
}

#[test]
fn test_missing_input_is_rejected() {
    let temp = TempDir::new().unwrap();
    let output = run_sender(temp.path(), &["send"], &[("SINK", "http://127.0.0.1:1/"), ("DELAY", "0")]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("input values not provided"), "stderr: {}", stderr);
}

#[test]
fn test_config_validate_and_show() {
    let temp = TempDir::new().unwrap();
    fs::write(
        temp.path().join("eventsender.yaml"),
        "sender:\n  sink: http://sink.local\n  input_body: hello\n  max_messages: 0\n",
    )
    .unwrap();

    let output = run_sender(temp.path(), &["config", "validate"], &[]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Configuration is valid"));
    assert!(stdout.contains("unlimited"));

    let output = run_sender(temp.path(), &["config", "show", "-o", "json"], &[("PERIOD", "9")]);
    assert!(output.status.success());
    let shown: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(shown["sender"]["sink"], "http://sink.local");
    assert_eq!(shown["sender"]["period"], 9);
}
