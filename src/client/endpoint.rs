//! Endpoint resolution
//!
//! Derives the update-feed URL from the origin of the hosting page, so the
//! socket always follows the page's own scheme and host.

use thiserror::Error;
use url::Url;

/// Path of the update feed on every UrbanEase host
pub const UPDATES_PATH: &str = "/ws/updates/";

/// Errors that can occur while resolving the endpoint
#[derive(Debug, Error)]
pub enum EndpointError {
    #[error("Invalid origin URL: {0}")]
    InvalidOrigin(#[from] url::ParseError),

    #[error("Unsupported origin scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Origin has no host: {0}")]
    MissingHost(String),
}

/// Result type for endpoint resolution
pub type EndpointResult<T> = Result<T, EndpointError>;

/// Strategy for finding the socket URL at connect time
pub trait ResolveEndpoint: Send {
    /// Produce the URL to connect to
    fn resolve(&self) -> EndpointResult<String>;
}

/// Resolves the feed URL from a page origin such as `https://city.example.org`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageOrigin {
    origin: String,
}

impl PageOrigin {
    /// Create a resolver for the given page URL
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
        }
    }

    /// The page URL as configured
    pub fn origin(&self) -> &str {
        &self.origin
    }
}

impl ResolveEndpoint for PageOrigin {
    fn resolve(&self) -> EndpointResult<String> {
        let url = Url::parse(&self.origin)?;

        // Secure pages get a secure socket
        let scheme = match url.scheme() {
            "https" | "wss" => "wss",
            "http" | "ws" => "ws",
            other => return Err(EndpointError::UnsupportedScheme(other.to_string())),
        };

        let host = url
            .host_str()
            .ok_or_else(|| EndpointError::MissingHost(self.origin.clone()))?;

        Ok(match url.port() {
            Some(port) => format!("{}://{}:{}{}", scheme, host, port, UPDATES_PATH),
            None => format!("{}://{}{}", scheme, host, UPDATES_PATH),
        })
    }
}

/// A fixed, already-resolved endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedEndpoint(pub String);

impl ResolveEndpoint for FixedEndpoint {
    fn resolve(&self) -> EndpointResult<String> {
        Ok(self.0.clone())
    }
}
