//! CloudEvents model
//!
//! A CloudEvent is a set of context attributes, a bag of extension
//! attributes and an optional payload. The JSON event format is the
//! canonical serialized form; `binding` maps events onto HTTP messages.

pub mod binding;

use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{DateTime, SecondsFormat, Utc};
use lazy_regex::regex_is_match;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

pub use binding::{Encoding, MessageEncoding};

pub const SPEC_VERSION_V1: &str = "1.0";
pub const SPEC_VERSION_V03: &str = "0.3";

/// Attribute names that can never be used as extensions
const RESERVED: &[&str] = &[
    "specversion",
    "id",
    "source",
    "type",
    "subject",
    "time",
    "datacontenttype",
    "dataschema",
    "schemaurl",
    "datacontentencoding",
    "data",
    "data_base64",
];

/// Errors raised while reading, mutating or encoding events
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("event json is invalid")]
    Json(#[source] serde_json::Error),
    #[error("event must be a json object")]
    NotAnObject,
    #[error("unsupported specversion {0:?}")]
    UnsupportedSpecVersion(String),
    #[error("attribute '{0}' must be a string")]
    AttributeType(String),
    #[error("invalid time attribute {value:?}")]
    InvalidTime {
        value: String,
        #[source]
        source: chrono::ParseError,
    },
    #[error("invalid base64 payload")]
    Base64(#[source] base64::DecodeError),
    #[error("invalid extension name {0:?}")]
    InvalidExtensionName(String),
    #[error("extension '{0}' must be a string, number or boolean")]
    InvalidExtensionValue(String),
    #[error("value of header '{0}' contains characters that cannot be sent")]
    InvalidHeaderValue(String),
    #[error("missing required attribute '{0}'")]
    MissingAttribute(&'static str),
    #[error("batch messages cannot be converted to a single event")]
    Batch,
    #[error("message is not a cloudevent")]
    UnknownEncoding,
}

/// Event payload
#[derive(Debug, Clone, PartialEq)]
pub enum Data {
    Json(Value),
    Text(String),
    Binary(Vec<u8>),
}

impl Data {
    /// Raw payload bytes as they travel in an HTTP body
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Data::Json(value) => serde_json::to_vec(value).unwrap_or_default(),
            Data::Text(text) => text.as_bytes().to_vec(),
            Data::Binary(bytes) => bytes.clone(),
        }
    }

    /// Interpret raw bytes according to a content type
    pub fn from_bytes(bytes: Vec<u8>, content_type: Option<&str>) -> Self {
        if is_json_content_type(content_type)
            && let Ok(value) = serde_json::from_slice::<Value>(&bytes)
        {
            return Data::Json(value);
        }
        let is_text = content_type
            .map(|ct| media_type(ct).starts_with("text/"))
            .unwrap_or(false);
        match (is_text, String::from_utf8(bytes)) {
            (true, Ok(text)) => Data::Text(text),
            (_, Ok(text)) => Data::Binary(text.into_bytes()),
            (_, Err(e)) => Data::Binary(e.into_bytes()),
        }
    }
}

/// A CloudEvent
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub specversion: String,
    pub id: String,
    pub source: String,
    pub ty: String,
    pub subject: Option<String>,
    pub time: Option<DateTime<Utc>>,
    pub datacontenttype: Option<String>,
    pub dataschema: Option<String>,
    pub data: Option<Data>,
    extensions: BTreeMap<String, Value>,
}

impl Default for Event {
    fn default() -> Self {
        Self {
            specversion: SPEC_VERSION_V1.to_string(),
            id: String::new(),
            source: String::new(),
            ty: String::new(),
            subject: None,
            time: None,
            datacontenttype: None,
            dataschema: None,
            data: None,
            extensions: BTreeMap::new(),
        }
    }
}

impl Event {
    #[cfg(test)]
    pub fn new(id: impl Into<String>, source: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            ty: ty.into(),
            ..Self::default()
        }
    }

    /// Parse the JSON event format
    pub fn from_json(input: &str) -> Result<Self, Error> {
        let value: Value = serde_json::from_str(input).map_err(Error::Json)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, Error> {
        let Value::Object(mut map) = value else {
            return Err(Error::NotAnObject);
        };

        let specversion = take_string(&mut map, "specversion")?.unwrap_or_else(|| SPEC_VERSION_V1.to_string());
        if specversion != SPEC_VERSION_V1 && specversion != SPEC_VERSION_V03 {
            return Err(Error::UnsupportedSpecVersion(specversion));
        }

        let mut event = Event {
            id: take_string(&mut map, "id")?.unwrap_or_default(),
            source: take_string(&mut map, "source")?.unwrap_or_default(),
            ty: take_string(&mut map, "type")?.unwrap_or_default(),
            subject: take_string(&mut map, "subject")?,
            datacontenttype: take_string(&mut map, "datacontenttype")?,
            dataschema: match take_string(&mut map, "dataschema")? {
                Some(schema) => Some(schema),
                None => take_string(&mut map, "schemaurl")?,
            },
            specversion,
            ..Event::default()
        };

        if let Some(time) = take_string(&mut map, "time")? {
            event.time = Some(parse_time(&time)?);
        }

        let encoding = take_string(&mut map, "datacontentencoding")?;
        if let Some(encoded) = take_string(&mut map, "data_base64")? {
            let bytes = STANDARD.decode(encoded.as_bytes()).map_err(Error::Base64)?;
            event.data = Some(Data::Binary(bytes));
        } else if let Some(data) = map.remove("data") {
            event.data = match (data, encoding.as_deref()) {
                (Value::Null, _) => None,
                (Value::String(encoded), Some(enc)) if enc.eq_ignore_ascii_case("base64") => {
                    Some(Data::Binary(STANDARD.decode(encoded.as_bytes()).map_err(Error::Base64)?))
                }
                (Value::String(text), _) if !is_json_content_type(event.datacontenttype.as_deref()) => {
                    Some(Data::Text(text))
                }
                (value, _) => Some(Data::Json(value)),
            };
        }

        for (name, value) in map {
            if value.is_null() {
                continue;
            }
            event.set_extension(&name, value)?;
        }

        Ok(event)
    }

    /// Render the JSON event format
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("specversion".into(), Value::String(self.specversion.clone()));
        map.insert("id".into(), Value::String(self.id.clone()));
        map.insert("source".into(), Value::String(self.source.clone()));
        map.insert("type".into(), Value::String(self.ty.clone()));
        if let Some(ref subject) = self.subject {
            map.insert("subject".into(), Value::String(subject.clone()));
        }
        if let Some(time) = self.time {
            map.insert("time".into(), Value::String(format_time(&time)));
        }
        if let Some(ref ct) = self.datacontenttype {
            map.insert("datacontenttype".into(), Value::String(ct.clone()));
        }
        if let Some(ref schema) = self.dataschema {
            map.insert("dataschema".into(), Value::String(schema.clone()));
        }
        for (name, value) in &self.extensions {
            map.insert(name.clone(), value.clone());
        }
        match &self.data {
            Some(Data::Json(value)) => {
                map.insert("data".into(), value.clone());
            }
            Some(Data::Text(text)) => {
                map.insert("data".into(), Value::String(text.clone()));
            }
            Some(Data::Binary(bytes)) => {
                map.insert("data_base64".into(), Value::String(STANDARD.encode(bytes)));
            }
            None => {}
        }
        Value::Object(map)
    }

    pub fn to_json(&self) -> Result<String, Error> {
        serde_json::to_string(&self.to_value()).map_err(Error::Json)
    }

    /// Set an extension attribute. Names are lowercased and must be alphanumeric.
    pub fn set_extension(&mut self, name: &str, value: impl Into<Value>) -> Result<(), Error> {
        let name = name.to_ascii_lowercase();
        if !regex_is_match!("^[a-z0-9]+$", &name) || RESERVED.contains(&name.as_str()) {
            return Err(Error::InvalidExtensionName(name));
        }
        let value = value.into();
        if !(value.is_string() || value.is_number() || value.is_boolean()) {
            return Err(Error::InvalidExtensionValue(name));
        }
        self.extensions.insert(name, value);
        Ok(())
    }

    #[cfg(test)]
    pub fn extension(&self, name: &str) -> Option<&Value> {
        self.extensions.get(&name.to_ascii_lowercase())
    }

    pub fn extensions(&self) -> &BTreeMap<String, Value> {
        &self.extensions
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Context Attributes,")?;
        writeln!(f, "  specversion: {}", self.specversion)?;
        writeln!(f, "  type: {}", self.ty)?;
        writeln!(f, "  source: {}", self.source)?;
        if let Some(ref subject) = self.subject {
            writeln!(f, "  subject: {}", subject)?;
        }
        writeln!(f, "  id: {}", self.id)?;
        if let Some(time) = self.time {
            writeln!(f, "  time: {}", format_time(&time))?;
        }
        if let Some(ref schema) = self.dataschema {
            writeln!(f, "  dataschema: {}", schema)?;
        }
        if let Some(ref ct) = self.datacontenttype {
            writeln!(f, "  datacontenttype: {}", ct)?;
        }
        if !self.extensions.is_empty() {
            writeln!(f, "Extensions,")?;
            for (name, value) in &self.extensions {
                writeln!(f, "  {}: {}", name, extension_to_string(value))?;
            }
        }
        if let Some(ref data) = self.data {
            writeln!(f, "Data,")?;
            match data {
                Data::Json(value) => {
                    let pretty = serde_json::to_string_pretty(value).unwrap_or_default();
                    for line in pretty.lines() {
                        writeln!(f, "  {}", line)?;
                    }
                }
                Data::Text(text) => writeln!(f, "  {}", text)?,
                Data::Binary(bytes) => writeln!(f, "  <{} bytes>", bytes.len())?,
            }
        }
        Ok(())
    }
}

impl Serialize for Event {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Event {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Event::from_value(value).map_err(serde::de::Error::custom)
    }
}

/// RFC 3339 with as many fractional digits as needed, always in UTC
pub fn format_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

pub fn parse_time(value: &str) -> Result<DateTime<Utc>, Error> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|source| Error::InvalidTime {
            value: value.to_string(),
            source,
        })
}

/// Extension values as they appear in headers and logs
pub fn extension_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn media_type(content_type: &str) -> String {
    content_type.split(';').next().unwrap_or("").trim().to_ascii_lowercase()
}

/// JSON payloads are assumed when no content type is set
pub fn is_json_content_type(content_type: Option<&str>) -> bool {
    match content_type {
        None => true,
        Some(ct) => {
            let media = media_type(ct);
            media == "application/json" || media == "text/json" || media.ends_with("+json")
        }
    }
}

fn take_string(map: &mut Map<String, Value>, key: &str) -> Result<Option<String>, Error> {
    match map.remove(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(_) => Err(Error::AttributeType(key.to_string())),
    }
}
