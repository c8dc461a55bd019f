//! Immutable request, response and outcome snapshots

use serde::{Deserialize, Serialize};
use url::Url;

use crate::exception::ExceptionSnapshot;
use crate::{DvdError, Result};

/// Recorded view of an outbound HTTP request
///
/// The URL is kept as structured components so matchers never re-parse it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestSnapshot {
    /// HTTP method as sent by the client
    pub method: String,
    /// URL scheme (lowercase)
    pub scheme: String,
    /// Host name (lowercase for special schemes)
    pub host: String,
    /// Explicit port, `None` when the scheme default is used
    #[serde(default)]
    pub port: Option<u16>,
    /// URL path
    pub path: String,
    /// Decoded query pairs in URL order
    #[serde(default)]
    pub query: Vec<(String, String)>,
    /// Headers in the order the client sent them
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    /// Request body
    #[serde(default, with = "body_encoding")]
    pub body: Option<Vec<u8>>,
}

impl RequestSnapshot {
    /// Build a snapshot from a method and an absolute URL
    ///
    /// # Errors
    ///
    /// Returns `InvalidUrl` if the URL cannot be parsed or has no host
    pub fn from_url(method: &str, url: &str) -> Result<Self> {
        let parsed = Url::parse(url).map_err(|e| DvdError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        let host = parsed
            .host_str()
            .ok_or_else(|| DvdError::InvalidUrl {
                url: url.to_string(),
                reason: "missing host".to_string(),
            })?
            .to_string();

        Ok(Self {
            method: method.to_string(),
            scheme: parsed.scheme().to_string(),
            host,
            port: parsed.port(),
            path: parsed.path().to_string(),
            query: parsed.query_pairs().into_owned().collect(),
            headers: Vec::new(),
            body: None,
        })
    }

    /// Append a header
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the body
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Render the components back into a URL string
    #[must_use]
    pub fn url(&self) -> String {
        let mut url = format!("{}://{}", self.scheme, self.host);
        if let Some(port) = self.port {
            url.push(':');
            url.push_str(&port.to_string());
        }
        url.push_str(&self.path);

        if !self.query.is_empty() {
            url.push('?');
            for (i, (key, value)) in self.query.iter().enumerate() {
                if i > 0 {
                    url.push('&');
                }
                url.push_str(&urlencoding::encode(key));
                url.push('=');
                url.push_str(&urlencoding::encode(value));
            }
        }

        url
    }
}

/// Recorded view of an HTTP response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseSnapshot {
    /// HTTP status code
    pub status: u16,
    /// Response headers
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    /// Raw response body
    #[serde(default, with = "body_encoding")]
    pub body: Option<Vec<u8>>,
}

impl ResponseSnapshot {
    /// Create a response with a status and no headers or body
    #[must_use]
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: None,
        }
    }

    /// Append a header
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the body
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// What a single request attempt produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The transport returned a response
    Response(ResponseSnapshot),
    /// The transport failed
    Exception(ExceptionSnapshot),
}

impl Outcome {
    /// Whether this outcome is a captured failure
    #[must_use]
    pub fn is_exception(&self) -> bool {
        matches!(self, Outcome::Exception(_))
    }
}

impl From<ResponseSnapshot> for Outcome {
    fn from(response: ResponseSnapshot) -> Self {
        Outcome::Response(response)
    }
}

impl From<ExceptionSnapshot> for Outcome {
    fn from(exception: ExceptionSnapshot) -> Self {
        Outcome::Exception(exception)
    }
}

/// Bodies are stored as base64 text so arbitrary bytes survive JSON
mod body_encoding {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        body: &Option<Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match body {
            Some(bytes) => serializer.serialize_some(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        let encoded: Option<String> = Option::deserialize(deserializer)?;
        encoded
            .map(|text| STANDARD.decode(text).map_err(serde::de::Error::custom))
            .transpose()
    }
}
