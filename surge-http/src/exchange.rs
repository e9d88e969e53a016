use std::time::Duration;

use bytes::Bytes;
use serde::de::DeserializeOwned;

use crate::{HttpResponse, HttpTransportErrorKind};

/// Outcome of one HTTP call as seen by a scenario.
///
/// Transport failures never surface as `Err`: they produce an exchange with `status == 0`,
/// an empty body, `error` set and the time spent before the failure in `elapsed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpExchange {
    pub status: u16,
    /// Lowercased header names. Multiple values are joined with ", ".
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub elapsed: Duration,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub error: Option<HttpTransportErrorKind>,
}

impl HttpExchange {
    pub fn from_response(res: HttpResponse, elapsed: Duration) -> Self {
        Self {
            status: res.status,
            headers: res.headers,
            body: res.body,
            elapsed,
            bytes_sent: res.bytes_sent,
            bytes_received: res.bytes_received,
            error: None,
        }
    }

    pub fn transport_error(kind: HttpTransportErrorKind, elapsed: Duration, bytes_sent: u64) -> Self {
        Self {
            status: 0,
            headers: Vec::new(),
            body: Bytes::new(),
            elapsed,
            bytes_sent,
            bytes_received: 0,
            error: Some(kind),
        }
    }

    /// A canned response, mostly useful for fake executors.
    pub fn with_status(status: u16, body: impl Into<Bytes>, elapsed: Duration) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
            elapsed,
            bytes_sent: 0,
            bytes_received: 0,
            error: None,
        }
    }

    /// `true` for transport errors and statuses outside `200..=399`.
    pub fn is_failed(&self) -> bool {
        self.error.is_some() || !(200..=399).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn body_utf8(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.body)
    }

    pub fn json_value(&self) -> Option<serde_json::Value> {
        self.json().ok()
    }

    /// String at a JSON pointer such as `/token`. Non-string values are not converted.
    pub fn json_str(&self, pointer: &str) -> Option<String> {
        self.json_value()?
            .pointer(pointer)?
            .as_str()
            .map(str::to_string)
    }
}
