//! HTTP protocol binding for CloudEvents
//!
//! Binary mode carries context attributes in `ce-` headers and the payload as
//! the body. Structured mode sends the whole JSON event format as the body.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{Data, Error, Event, SPEC_VERSION_V03, SPEC_VERSION_V1, extension_to_string, format_time, parse_time};
use crate::message::{Headers, OutboundRequest};

pub const HEADER_PREFIX: &str = "ce-";
pub const CONTENT_TYPE: &str = "content-type";
pub const STRUCTURED_CONTENT_TYPE: &str = "application/cloudevents+json";
pub const BATCH_CONTENT_TYPE: &str = "application/cloudevents-batch+json";

/// How an outbound event is written into a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    Binary,
    Structured,
}

impl FromStr for Encoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "binary" => Ok(Encoding::Binary),
            "structured" => Ok(Encoding::Structured),
            _ => Err(s.to_string()),
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Encoding::Binary => write!(f, "binary"),
            Encoding::Structured => write!(f, "structured"),
        }
    }
}

/// How an inbound message carries its event, if at all
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageEncoding {
    Binary,
    Structured,
    Batch,
    Unknown,
}

/// Write an event into the request headers and body
pub fn write_request(event: &Event, encoding: Encoding, request: &mut OutboundRequest) -> Result<(), Error> {
    match encoding {
        Encoding::Binary => write_binary(event, request),
        Encoding::Structured => write_structured(event, request),
    }
}

fn write_binary(event: &Event, request: &mut OutboundRequest) -> Result<(), Error> {
    let mut put = |name: &str, value: &str| -> Result<(), Error> {
        let header = format!("{}{}", HEADER_PREFIX, name);
        let encoded = encode_header_value(&header, value)?;
        request.headers.set(&header, encoded);
        Ok(())
    };

    put("specversion", &event.specversion)?;
    put("id", &event.id)?;
    put("source", &event.source)?;
    put("type", &event.ty)?;
    if let Some(ref subject) = event.subject {
        put("subject", subject)?;
    }
    if let Some(time) = event.time {
        put("time", &format_time(&time))?;
    }
    if let Some(ref schema) = event.dataschema {
        let name = if event.specversion == SPEC_VERSION_V03 { "schemaurl" } else { "dataschema" };
        put(name, schema)?;
    }
    for (name, value) in event.extensions() {
        put(name, &extension_to_string(value))?;
    }

    let content_type = match (&event.datacontenttype, &event.data) {
        (Some(ct), _) => Some(ct.clone()),
        (None, Some(Data::Json(_))) => Some("application/json".to_string()),
        _ => None,
    };
    if let Some(ct) = content_type {
        let ct = encode_header_value(CONTENT_TYPE, &ct)?;
        request.headers.set(CONTENT_TYPE, ct);
    }

    request.body = event.data.as_ref().map(Data::to_bytes).unwrap_or_default();
    Ok(())
}

fn write_structured(event: &Event, request: &mut OutboundRequest) -> Result<(), Error> {
    let body = event.to_json()?;
    request.headers.set(CONTENT_TYPE, STRUCTURED_CONTENT_TYPE);
    request.body = body.into_bytes();
    Ok(())
}

/// Classify an inbound message
pub fn read_encoding(headers: &Headers) -> MessageEncoding {
    if let Some(ct) = headers.get(CONTENT_TYPE) {
        let media = ct.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
        if media == BATCH_CONTENT_TYPE {
            return MessageEncoding::Batch;
        }
        if media == STRUCTURED_CONTENT_TYPE {
            return MessageEncoding::Structured;
        }
    }
    if headers.contains("ce-specversion") {
        return MessageEncoding::Binary;
    }
    MessageEncoding::Unknown
}

/// Convert an inbound message into an event
pub fn to_event(headers: &Headers, body: &[u8]) -> Result<Event, Error> {
    let event = match read_encoding(headers) {
        MessageEncoding::Structured => {
            let value = serde_json::from_slice(body).map_err(Error::Json)?;
            Event::from_value(value)?
        }
        MessageEncoding::Binary => read_binary(headers, body)?,
        MessageEncoding::Batch => return Err(Error::Batch),
        MessageEncoding::Unknown => return Err(Error::UnknownEncoding),
    };
    validate(&event)?;
    Ok(event)
}

fn read_binary(headers: &Headers, body: &[u8]) -> Result<Event, Error> {
    let mut event = Event::default();
    for (name, value) in headers.iter() {
        let Some(attr) = name.strip_prefix(HEADER_PREFIX) else {
            continue;
        };
        let value = decode_header_value(value);
        match attr {
            "specversion" => {
                if value != SPEC_VERSION_V1 && value != SPEC_VERSION_V03 {
                    return Err(Error::UnsupportedSpecVersion(value));
                }
                event.specversion = value;
            }
            "id" => event.id = value,
            "source" => event.source = value,
            "type" => event.ty = value,
            "subject" => event.subject = Some(value),
            "time" => event.time = Some(parse_time(&value)?),
            "dataschema" | "schemaurl" => event.dataschema = Some(value),
            "datacontenttype" => event.datacontenttype = Some(value),
            ext => event.set_extension(ext, value)?,
        }
    }
    if let Some(ct) = headers.get(CONTENT_TYPE) {
        event.datacontenttype = Some(ct.to_string());
    }
    if !body.is_empty() {
        event.data = Some(Data::from_bytes(body.to_vec(), event.datacontenttype.as_deref()));
    }
    Ok(event)
}

fn validate(event: &Event) -> Result<(), Error> {
    if event.id.is_empty() {
        return Err(Error::MissingAttribute("id"));
    }
    if event.source.is_empty() {
        return Err(Error::MissingAttribute("source"));
    }
    if event.ty.is_empty() {
        return Err(Error::MissingAttribute("type"));
    }
    Ok(())
}

/// Percent-encode what cannot travel in a header; control characters are rejected
fn encode_header_value(header: &str, value: &str) -> Result<String, Error> {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\t' => out.push(c),
            c if c.is_control() => return Err(Error::InvalidHeaderValue(header.to_string())),
            '%' | '"' => out.push_str(&format!("%{:02X}", c as u32)),
            c if c.is_ascii() => out.push(c),
            c => {
                let mut buf = [0u8; 4];
                for b in c.encode_utf8(&mut buf).bytes() {
                    out.push_str(&format!("%{:02X}", b));
                }
            }
        }
    }
    Ok(out)
}

fn decode_header_value(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%'
            && i + 2 < bytes.len()
            && let (Some(hi), Some(lo)) = (hex_digit(bytes[i + 1]), hex_digit(bytes[i + 2]))
        {
            out.push(hi << 4 | lo);
            i += 3;
            continue;
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_digit(b: u8) -> Option<u8> {
    (b as char).to_digit(16).map(|d| d as u8)
}
