use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// True when the host is an IP address and needs no name resolution.
    pub fn is_ip_literal(&self) -> bool {
        self.host.parse::<IpAddr>().is_ok()
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Self {
            host: addr.ip().to_string(),
            port: addr.port(),
        }
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
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (host, port) = if let Some(rest) = s.strip_prefix('[') {
            let (host, port) = rest
                .split_once("]:")
                .ok_or_else(|| Error::Config(format!("invalid endpoint '{}'", s)))?;
            (host, port)
        } else {
            s.rsplit_once(':')
                .ok_or_else(|| Error::Config(format!("endpoint '{}' is missing a port", s)))?
        };

        if host.is_empty() {
            return Err(Error::Config(format!("endpoint '{}' is missing a host", s)));
        }

        let port = port
            .parse::<u16>()
            .map_err(|_| Error::Config(format!("invalid port in endpoint '{}'", s)))?;

        Ok(Self::new(host, port))
    }
}

/// Ordered candidate addresses a client starts discovery from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointSet {
    endpoints: Vec<Endpoint>,
}

impl EndpointSet {
    pub fn new(endpoints: impl IntoIterator<Item = Endpoint>) -> Self {
        let mut set = Self::default();
        for endpoint in endpoints {
            set.push(endpoint);
        }
        set
    }

    pub fn parse_list<S: AsRef<str>>(items: &[S]) -> Result<Self> {
        let endpoints = items
            .iter()
            .map(|s| s.as_ref())
            .filter(|s| !s.trim().is_empty())
            .map(Endpoint::from_str)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(endpoints))
    }

    pub fn push(&mut self, endpoint: Endpoint) {
        if !self.endpoints.contains(&endpoint) {
            self.endpoints.push(endpoint);
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Endpoint> {
        self.endpoints.iter()
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

impl<'a> IntoIterator for &'a EndpointSet {
    type Item = &'a Endpoint;
    type IntoIter = std::slice::Iter<'a, Endpoint>;

    fn into_iter(self) -> Self::IntoIter {
        self.endpoints.iter()
    }
}

impl FromIterator<Endpoint> for EndpointSet {
    fn from_iter<I: IntoIterator<Item = Endpoint>>(iter: I) -> Self {
        Self::new(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_parse() {
        let ep: Endpoint = "db-1.internal:2113".parse().unwrap();
        assert_eq!(ep.host, "db-1.internal");
        assert_eq!(ep.port, 2113);
        assert!(!ep.is_ip_literal());
    }

    #[test]
    fn test_endpoint_parse_ipv6() {
        let ep: Endpoint = "[::1]:1113".parse().unwrap();
        assert_eq!(ep.host, "::1");
        assert!(ep.is_ip_literal());
        assert_eq!(ep.to_string(), "[::1]:1113");
    }

    #[test]
    fn test_endpoint_parse_invalid() {
        assert!("localhost".parse::<Endpoint>().is_err());
        assert!(":2113".parse::<Endpoint>().is_err());
        assert!("localhost:http".parse::<Endpoint>().is_err());
    }

    #[test]
    fn test_endpoint_equality() {
        assert_eq!(Endpoint::new("a", 1), Endpoint::new("a", 1));
        assert_ne!(Endpoint::new("a", 1), Endpoint::new("a", 2));
    }

    #[test]
    fn test_endpoint_set_dedup() {
        let set = EndpointSet::parse_list(&["10.0.0.1:2113", "10.0.0.1:2113", " ", "10.0.0.2:2113"])
            .unwrap();
        assert_eq!(set.len(), 2);
        let hosts: Vec<_> = set.iter().map(|e| e.host.as_str()).collect();
        assert_eq!(hosts, vec!["10.0.0.1", "10.0.0.2"]);
    }
}
