//! Controller address.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// `host:port` of the onboard controller's WebSocket server.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Endpoint {
    host: String,
    port: u16,
}

/// Failure parsing a `host:port` string.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("invalid endpoint '{input}': {reason}")]
pub struct EndpointParseError {
    input: String,
    reason: &'static str,
}

impl Endpoint {
    /// Create an endpoint.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Host name or address, without brackets.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// TCP port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// `ws://host:port`, with IPv6 literals bracketed.
    pub fn url(&self) -> String {
        format!("ws://{self}")
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for Endpoint {
    type Err = EndpointParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = |reason| EndpointParseError {
            input: s.to_owned(),
            reason,
        };
        let (host, port) = s.rsplit_once(':').ok_or_else(|| err("missing port"))?;
        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);
        if host.is_empty() {
            return Err(err("missing host"));
        }
        let port: u16 = port.parse().map_err(|_| err("port is not a number"))?;
        if port == 0 {
            return Err(err("port must be non-zero"));
        }
        Ok(Self::new(host, port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_for_ipv4() {
        assert_eq!(Endpoint::new("192.168.4.1", 81).url(), "ws://192.168.4.1:81");
    }

    #[test]
    fn url_brackets_ipv6() {
        assert_eq!(Endpoint::new("::1", 9001).url(), "ws://[::1]:9001");
    }

    #[test]
    fn parses_host_port() {
        let ep: Endpoint = "rover.local:81".parse().unwrap();
        assert_eq!(ep.host(), "rover.local");
        assert_eq!(ep.port(), 81);
    }

    #[test]
    fn parses_bracketed_ipv6() {
        let ep: Endpoint = "[fe80::1]:81".parse().unwrap();
        assert_eq!(ep.host(), "fe80::1");
        assert_eq!(ep.to_string(), "[fe80::1]:81");
    }

    #[test]
    fn rejects_malformed() {
        assert!("rover.local".parse::<Endpoint>().is_err());
        assert!(":81".parse::<Endpoint>().is_err());
        assert!("host:eighty".parse::<Endpoint>().is_err());
        let err = "host:0".parse::<Endpoint>().unwrap_err();
        assert!(err.to_string().contains("non-zero"));
    }
}
