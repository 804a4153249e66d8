//! The HTTP GET request carried through the modem's TCP socket.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Default telemetry endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.thingspeak.com/update";

/// A telemetry update sent as a single GET request line.
///
/// Field values are preformatted; they become `field1`, `field2`, ... in
/// the order given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpGet {
    /// Endpoint URL without query string.
    pub base_url: String,
    /// Write API key.
    pub api_key: String,
    /// Formatted field values.
    pub fields: Vec<String>,
}

impl HttpGet {
    /// Create a request for the given endpoint and key.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        HttpGet {
            base_url: base_url.into(),
            api_key: api_key.into(),
            fields: Vec::new(),
        }
    }

    /// Append a field value.
    pub fn with_field(mut self, value: impl ToString) -> Self {
        self.fields.push(value.to_string());
        self
    }

    /// The full request URL.
    pub fn url(&self) -> String {
        let mut url = format!("{}?api_key={}", self.base_url, self.api_key);
        for (index, value) in self.fields.iter().enumerate() {
            url.push_str(&format!("&field{}={}", index + 1, value));
        }
        url
    }

    /// The request line written after the send prompt.
    pub fn request_line(&self) -> String {
        format!("GET {}", self.url())
    }
}

impl fmt::Display for HttpGet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.request_line())
    }
}
