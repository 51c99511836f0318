//! Endpoint abstraction for transport-agnostic socket addressing.
//!
//! Two transports exist: TCP (`tcp://host:port`) and in-process
//! (`inproc://name`). TCP authorities are kept as strings and resolved with
//! `ToSocketAddrs` at bind/connect time so hostnames in peer lists work.

use std::fmt;
use std::str::FromStr;

/// Transport endpoint address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// TCP transport: `tcp://host:port`
    Tcp(String),
    /// In-process transport: `inproc://name`
    Inproc(String),
}

impl Endpoint {
    /// Parse an endpoint from a string.
    ///
    /// Supported formats:
    /// - `tcp://127.0.0.1:5555`
    /// - `tcp://relay-0.internal:27019`
    /// - `inproc://name`
    pub fn parse(s: &str) -> Result<Self, EndpointError> {
        s.parse()
    }

    /// Returns true if this is a TCP endpoint.
    #[must_use]
    pub fn is_tcp(&self) -> bool {
        matches!(self, Endpoint::Tcp(_))
    }

    /// Returns true if this is an inproc endpoint.
    #[must_use]
    pub fn is_inproc(&self) -> bool {
        matches!(self, Endpoint::Inproc(_))
    }
}

impl FromStr for Endpoint {
    type Err = EndpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(authority) = s.strip_prefix("tcp://") {
            let (host, port) = authority
                .rsplit_once(':')
                .ok_or_else(|| EndpointError::InvalidTcpAddress(authority.to_string()))?;
            if host.is_empty() || port.parse::<u16>().is_err() {
                return Err(EndpointError::InvalidTcpAddress(authority.to_string()));
            }
            Ok(Endpoint::Tcp(authority.to_string()))
        } else if let Some(name) = s.strip_prefix("inproc://") {
            if name.is_empty() {
                Err(EndpointError::InvalidInprocName(
                    "inproc name cannot be empty".to_string(),
                ))
            } else {
                Ok(Endpoint::Inproc(name.to_string()))
            }
        } else {
            Err(EndpointError::InvalidScheme(s.to_string()))
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp(authority) => write!(f, "tcp://{}", authority),
            Endpoint::Inproc(name) => write!(f, "inproc://{}", name),
        }
    }
}

/// Errors that can occur when parsing or using endpoints.
#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    #[error("Invalid scheme in endpoint: {0} (expected tcp:// or inproc://)")]
    InvalidScheme(String),

    #[error("Invalid TCP address: {0}")]
    InvalidTcpAddress(String),

    #[error("Invalid inproc name: {0}")]
    InvalidInprocName(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_tcp() {
        let endpoint = Endpoint::parse("tcp://127.0.0.1:5555").unwrap();
        assert!(endpoint.is_tcp());
        assert_eq!(endpoint.to_string(), "tcp://127.0.0.1:5555");
    }

    #[test]
    fn parse_tcp_hostname() {
        let endpoint = Endpoint::parse("tcp://relay-0.internal:27019").unwrap();
        assert!(matches!(endpoint, Endpoint::Tcp(_)));
    }

    #[test]
    fn parse_inproc() {
        let endpoint = Endpoint::parse("inproc://pubsub").unwrap();
        assert!(endpoint.is_inproc());
        assert_eq!(endpoint.to_string(), "inproc://pubsub");
    }

    #[test]
    fn invalid_scheme() {
        let result = Endpoint::parse("http://127.0.0.1:5555");
        assert!(matches!(result, Err(EndpointError::InvalidScheme(_))));
    }

    #[test]
    fn invalid_tcp_address() {
        assert!(matches!(
            Endpoint::parse("tcp://no-port-here"),
            Err(EndpointError::InvalidTcpAddress(_))
        ));
        assert!(matches!(
            Endpoint::parse("tcp://host:notaport"),
            Err(EndpointError::InvalidTcpAddress(_))
        ));
    }

    #[test]
    fn invalid_inproc_empty() {
        let result = Endpoint::parse("inproc://");
        assert!(matches!(result, Err(EndpointError::InvalidInprocName(_))));
    }
}
