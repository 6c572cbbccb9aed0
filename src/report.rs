//! Outcome records for every transmission

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::SenderConfig;
use crate::event::{Event, MessageEncoding, binding};
use crate::message::{Headers, OutboundRequest};
use crate::transport::{RawResponse, TransportError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    Sent,
    Response,
}

/// One observed transmission or response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventInfo {
    pub kind: EventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<Event>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_headers: Option<Headers>,
    #[serde(skip_serializing_if = "Option::is_none", with = "base64_body", default)]
    pub body: Option<Vec<u8>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub origin: String,
    pub observer: String,
    pub time: DateTime<Utc>,
    pub sequence: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sent_id: Option<String>,
}

impl EventInfo {
    fn new(kind: EventKind, origin: &str, observer: &str, sequence: u64, sent_id: Option<String>) -> Self {
        Self {
            kind,
            event: None,
            http_headers: None,
            body: None,
            error: None,
            origin: origin.to_string(),
            observer: observer.to_string(),
            time: Utc::now(),
            sequence,
            status_code: None,
            sent_id,
        }
    }
}

/// Turns requests and raw outcomes into records
pub struct Reporter {
    sender_name: String,
    sink: String,
    input_body: Option<Vec<u8>>,
}

impl Reporter {
    pub fn new(config: &SenderConfig) -> Self {
        Self {
            sender_name: config.sender_name.clone(),
            sink: config.sink.clone(),
            input_body: config.input_body.as_ref().map(|b| b.as_bytes().to_vec()),
        }
    }

    pub fn sent_info(
        &self,
        event: Option<&Event>,
        request: &OutboundRequest,
        error: Option<&TransportError>,
        sequence: u64,
    ) -> EventInfo {
        let sent_id = event.map(|e| e.id.clone());
        let mut info = EventInfo::new(EventKind::Sent, &self.sender_name, &self.sender_name, sequence, sent_id);

        if let Some(err) = error {
            info.error = Some(err.to_string());
            return info;
        }

        info.event = event.cloned();
        info.http_headers = Some(request.headers.clone());
        info.body = self.input_body.clone();
        info
    }

    pub fn response_info(&self, response: RawResponse, event: Option<&Event>, sequence: u64) -> EventInfo {
        let sent_id = event.map(|e| e.id.clone());
        let mut info = EventInfo::new(EventKind::Response, &self.sink, &self.sender_name, sequence, sent_id);
        info.status_code = Some(response.status);

        let body = match response.body {
            Ok(body) => body,
            Err(e) => {
                info.error = Some(e);
                info.http_headers = Some(response.headers);
                return info;
            }
        };

        match binding::read_encoding(&response.headers) {
            MessageEncoding::Unknown => info.body = Some(body),
            _ => match binding::to_event(&response.headers, &body) {
                Ok(event) => info.event = Some(event),
                Err(e) => info.error = Some(e.to_string()),
            },
        }
        info.http_headers = Some(response.headers);
        info
    }
}

mod base64_body {
    use base64::{Engine, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
        match body {
            Some(bytes) => serializer.serialize_str(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            Some(encoded) => STANDARD
                .decode(encoded.as_bytes())
                .map(Some)
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SenderSettings;
    use crate::event::Data;
    use serde_json::json;

    fn reporter(body: Option<&str>) -> Reporter {
        let settings = SenderSettings {
            sender_name: "sender-1".to_string(),
            sink: Some("http://sink.local".to_string()),
            input_body: body.map(str::to_string),
            ..SenderSettings::default()
        };
        Reporter::new(&settings.validate().unwrap())
    }

    fn request() -> OutboundRequest {
        let mut request = OutboundRequest::new("POST", "http://sink.local");
        request.headers.add("ce-id", "a");
        request
    }

    #[test]
    fn test_sent_info_on_error_carries_only_error() {
        let event = Event::new("a", "/s", "t");
        let err = TransportError("connection refused".to_string());
        let info = reporter(None).sent_info(Some(&event), &request(), Some(&err), 3);

        assert_eq!(info.kind, EventKind::Sent);
        assert_eq!(info.error.as_deref(), Some("connection refused"));
        assert_eq!(info.origin, "sender-1");
        assert_eq!(info.observer, "sender-1");
        assert_eq!(info.sequence, 3);
        assert_eq!(info.sent_id.as_deref(), Some("a"));
        assert!(info.event.is_none());
        assert!(info.http_headers.is_none());
    }

    #[test]
    fn test_sent_info_snapshots_request() {
        let event = Event::new("a", "/s", "t");
        let mut req = request();
        let info = reporter(None).sent_info(Some(&event), &req, None, 1);
        req.headers.add("x-later", "1");

        let headers = info.http_headers.unwrap();
        assert_eq!(headers.get("ce-id"), Some("a"));
        assert!(!headers.contains("x-later"));
        assert_eq!(info.event, Some(event));
        assert!(info.body.is_none());
    }

    #[test]
    fn test_sent_info_records_static_body() {
        let info = reporter(Some("static")).sent_info(None, &request(), None, 0);
        assert_eq!(info.body, Some(b"static".to_vec()));
        assert!(info.sent_id.is_none());
        assert!(info.event.is_none());
    }

    #[test]
    fn test_response_info_opaque_body() {
        let mut headers = Headers::new();
        headers.add("content-type", "text/plain");
        let response = RawResponse {
            status: 404,
            headers,
            body: Ok(b"not here".to_vec()),
        };
        let event = Event::new("a", "/s", "t");
        let info = reporter(None).response_info(response, Some(&event), 1);

        assert_eq!(info.kind, EventKind::Response);
        assert_eq!(info.origin, "http://sink.local");
        assert_eq!(info.observer, "sender-1");
        assert_eq!(info.status_code, Some(404));
        assert_eq!(info.body, Some(b"not here".to_vec()));
        assert_eq!(info.sent_id.as_deref(), Some("a"));
        assert!(info.event.is_none());
    }

    #[test]
    fn test_response_info_keeps_body_of_unregistered_format() {
        let mut headers = Headers::new();
        headers.add("content-type", "application/cloudevents+xml");
        let response = RawResponse {
            status: 200,
            headers,
            body: Ok(b"<event/>".to_vec()),
        };
        let info = reporter(None).response_info(response, None, 1);

        assert_eq!(info.body, Some(b"<event/>".to_vec()));
        assert!(info.error.is_none());
        assert!(info.event.is_none());
    }

    #[test]
    fn test_response_info_decodes_binary_event() {
        let mut headers = Headers::new();
        headers.add("ce-specversion", "1.0");
        headers.add("ce-id", "reply-1");
        headers.add("ce-source", "/sink");
        headers.add("ce-type", "reply");
        headers.add("content-type", "application/json");
        let response = RawResponse {
            status: 200,
            headers,
            body: Ok(br#"{"ok":true}"#.to_vec()),
        };
        let info = reporter(None).response_info(response, None, 0);

        let event = info.event.unwrap();
        assert_eq!(event.id, "reply-1");
        assert_eq!(event.data, Some(Data::Json(json!({"ok": true}))));
        assert!(info.body.is_none());
        assert!(info.error.is_none());
    }

    #[test]
    fn test_response_info_decode_failure_is_recorded() {
        let mut headers = Headers::new();
        headers.add("content-type", "application/cloudevents+json");
        let response = RawResponse {
            status: 200,
            headers,
            body: Ok(b"{broken".to_vec()),
        };
        let info = reporter(None).response_info(response, None, 0);
        assert!(info.error.is_some());
        assert!(info.event.is_none());
    }

    #[test]
    fn test_response_info_body_read_failure() {
        let response = RawResponse {
            status: 200,
            headers: Headers::new(),
            body: Err("connection reset".to_string()),
        };
        let info = reporter(None).response_info(response, None, 0);
        assert_eq!(info.error.as_deref(), Some("connection reset"));
        assert!(info.body.is_none());
        assert_eq!(info.status_code, Some(200));
    }

    #[test]
    fn test_event_info_json_shape() {
        let info = reporter(Some("hi")).sent_info(None, &request(), None, 2);
        let value = serde_json::to_value(&info).unwrap();
        assert_eq!(value["kind"], json!("Sent"));
        assert_eq!(value["body"], json!("aGk="));
        assert_eq!(value["sequence"], json!(2));
        assert_eq!(value["httpHeaders"], json!({"ce-id": ["a"]}));
        assert!(value.get("statusCode").is_none());
        assert!(value.get("error").is_none());

        let back: EventInfo = serde_json::from_value(value).unwrap();
        assert_eq!(back, info);
    }
}
