//! Wire format of the plugin channel.
//!
//! # Framing
//! One JSON document per line in each direction.
//! ```text
//! host → plugin: {"id":7,"method":"compare","params":{"newer":{..},"current":{..}}}
//! plugin → host: {"id":7,"result":{"match":false,"difference":"..."}}
//!                {"id":7,"error":"..."}
//! ```
//!
//! # Design Decisions
//! - Every frame carries its own `id`, so concurrent calls share one
//!   connection without external locking
//! - Bodies travel whole, base64 encoded; no compression or chunking
//! - Header values are plain strings when they are UTF-8 and
//!   `{"base64":"..."}` otherwise, so obs-text bytes survive the trip
//! - Replies carry only the verdict; the host reattaches the responses it
//!   already holds

use std::collections::BTreeMap;

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::error::WireError;
use crate::comparator::Response;

pub const METHOD_COMPARE: &str = "compare";

/// Transport form of a `Response`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireResponse {
    pub status_code: u16,
    pub headers: BTreeMap<String, Vec<HeaderBytes>>,
    #[serde(with = "body_base64")]
    pub body: Vec<u8>,
}

impl From<&Response> for WireResponse {
    fn from(response: &Response) -> Self {
        let mut headers: BTreeMap<String, Vec<HeaderBytes>> = BTreeMap::new();
        for (name, value) in response.headers.iter() {
            headers
                .entry(name.as_str().to_string())
                .or_default()
                .push(HeaderBytes(value.as_bytes().to_vec()));
        }

        Self {
            status_code: response.status,
            headers,
            body: response.body.to_vec(),
        }
    }
}

impl TryFrom<WireResponse> for Response {
    type Error = WireError;

    fn try_from(wire: WireResponse) -> Result<Self, Self::Error> {
        let mut headers = HeaderMap::new();
        for (name, values) in wire.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| WireError::InvalidHeaderName(name.clone()))?;
            for value in values {
                let header_value = HeaderValue::from_bytes(&value.0)
                    .map_err(|_| WireError::InvalidHeaderValue(name.clone()))?;
                headers.append(header_name.clone(), header_value);
            }
        }

        Ok(Response::new(wire.status_code, headers, wire.body))
    }
}

/// Raw bytes of one header value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderBytes(pub Vec<u8>);

impl From<&str> for HeaderBytes {
    fn from(value: &str) -> Self {
        Self(value.as_bytes().to_vec())
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum HeaderRepr {
    Text(String),
    Binary { base64: String },
}

impl Serialize for HeaderBytes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match std::str::from_utf8(&self.0) {
            Ok(text) => serializer.serialize_str(text),
            Err(_) => HeaderRepr::Binary {
                base64: STANDARD.encode(&self.0),
            }
            .serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for HeaderBytes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match HeaderRepr::deserialize(deserializer)? {
            HeaderRepr::Text(text) => Ok(Self(text.into_bytes())),
            HeaderRepr::Binary { base64 } => STANDARD
                .decode(base64)
                .map(Self)
                .map_err(serde::de::Error::custom),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompareParams {
    pub newer: WireResponse,
    pub current: WireResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestFrame {
    pub id: u64,
    pub method: String,
    pub params: CompareParams,
}

impl RequestFrame {
    pub fn compare(id: u64, newer: WireResponse, current: WireResponse) -> Self {
        Self {
            id,
            method: METHOD_COMPARE.to_string(),
            params: CompareParams { newer, current },
        }
    }
}

/// The only thing a plugin sends back for a compare call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    #[serde(rename = "match")]
    pub matched: bool,
    #[serde(default)]
    pub difference: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyFrame {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Verdict>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ReplyFrame {
    pub fn ok(id: u64, verdict: Verdict) -> Self {
        Self {
            id,
            result: Some(verdict),
            error: None,
        }
    }

    pub fn err(id: u64, message: impl Into<String>) -> Self {
        Self {
            id,
            result: None,
            error: Some(message.into()),
        }
    }
}

/// Correlation id of a frame that did not decode in full.
pub fn frame_id(line: &str) -> Option<u64> {
    serde_json::from_str::<serde_json::Value>(line)
        .ok()?
        .get("id")?
        .as_u64()
}

mod body_base64 {
    use super::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
