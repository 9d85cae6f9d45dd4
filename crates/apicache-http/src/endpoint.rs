//! Server location and URL construction.

use std::fmt;

use reqwest::Url;
use serde::{Deserialize, Serialize};

use apicache_core::TransportError;

use crate::request::RawRequest;

/// Fixed path prefix under which every resource is served.
const API_PREFIX: &str = "api";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    #[default]
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Scheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(Scheme::Http),
            "https" => Ok(Scheme::Https),
            other => Err(other.to_string()),
        }
    }
}

/// Where the API lives: `{scheme}://{host}:{port}/api/{path...}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
    /// Extra path segments between `/api/` and the request's own path.
    pub path: Vec<String>,
}

impl Endpoint {
    pub fn new(scheme: Scheme, host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme,
            host: host.into(),
            port,
            path: Vec::new(),
        }
    }

    pub fn with_path(mut self, path: Vec<String>) -> Self {
        self.path = path;
        self
    }

    /// Build the full URL for a request, percent-encoding path segments and
    /// query pairs.
    pub fn url_for(&self, request: &RawRequest) -> Result<Url, TransportError> {
        let base = format!("{}://{}:{}/", self.scheme, self.host, self.port);
        let mut url = Url::parse(&base)
            .map_err(|e| TransportError::InvalidRequest(format!("{}: {}", base, e)))?;

        url.path_segments_mut()
            .map_err(|_| TransportError::InvalidRequest(format!("{} cannot take a path", base)))?
            .pop_if_empty()
            .push(API_PREFIX)
            .extend(self.path.iter().chain(request.path.iter()));

        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(request.query.iter());
        }

        Ok(url)
    }
}
