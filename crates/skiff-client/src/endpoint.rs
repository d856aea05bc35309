use std::fmt;

use hyper::Uri;
use skiff_common::protocol::{Result, SkiffError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Scheme {
    Http,
    Https,
}

impl Scheme {
    fn default_port(self) -> u16 {
        match self {
            Scheme::Http => 80,
            Scheme::Https => 443,
        }
    }
}

/// Where an HTTP client sends its calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Endpoint {
    pub scheme: Scheme,
    /// Host without IPv6 brackets, ready for DNS or TLS server names
    pub host: String,
    pub port: u16,
    /// Value of the `Host` header
    pub authority: String,
    /// Request target, `/` when the URL has no path
    pub path: String,
}

impl Endpoint {
    /// Parses an `http` or `https` URL. Any other scheme is rejected.
    pub fn parse(url: &str) -> Result<Self> {
        let uri: Uri = url
            .parse()
            .map_err(|e| SkiffError::InvalidUrl(format!("{}: {}", url, e)))?;

        let scheme = match uri.scheme_str() {
            Some("http") => Scheme::Http,
            Some("https") => Scheme::Https,
            Some(other) => {
                return Err(SkiffError::InvalidUrl(format!(
                    "unsupported scheme '{}' in {} (expected http or https)",
                    other, url
                )))
            }
            None => {
                return Err(SkiffError::InvalidUrl(format!(
                    "missing scheme in {} (expected http or https)",
                    url
                )))
            }
        };

        let authority = uri
            .authority()
            .ok_or_else(|| SkiffError::InvalidUrl(format!("missing host in {}", url)))?;
        let host = authority
            .host()
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();
        if host.is_empty() {
            return Err(SkiffError::InvalidUrl(format!("missing host in {}", url)));
        }

        Ok(Self {
            scheme,
            host,
            port: authority.port_u16().unwrap_or(scheme.default_port()),
            authority: authority.as_str().to_string(),
            path: uri
                .path_and_query()
                .map(|p| p.as_str())
                .filter(|p| !p.is_empty())
                .unwrap_or("/")
                .to_string(),
        })
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = match self.scheme {
            Scheme::Http => "http",
            Scheme::Https => "https",
        };
        write!(f, "{}://{}{}", scheme, self.authority, self.path)
    }
}
