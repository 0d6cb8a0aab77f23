use std::{
    net::{IpAddr, SocketAddr},
    str::FromStr,
};

use url::Url;

use crate::Error;

/// Port defined as a u16.
pub type Port = u16;

/// Endpoint defines generic network endpoints for hyphae.
///
/// # Example
///
/// ```
/// use std::net::SocketAddr;
///
/// use hyphae_net::Endpoint;
///
/// let endpoint: Endpoint = "tcp://127.0.0.1:3000".parse().unwrap();
///
/// let socketaddr: SocketAddr = "127.0.0.1:3000".parse().unwrap();
/// let endpoint = Endpoint::new_tcp_addr(&socketaddr);
///
/// ```
///
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Tcp(Addr, Port),
    /// An in-process channel endpoint, addressed by a registry port.
    Mem(Port),
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Endpoint::Tcp(ip, port) => {
                write!(f, "tcp://{}:{}", ip, port)
            }
            Endpoint::Mem(port) => {
                write!(f, "mem://{}", port)
            }
        }
    }
}

impl TryFrom<Endpoint> for SocketAddr {
    type Error = Error;
    fn try_from(endpoint: Endpoint) -> std::result::Result<SocketAddr, Self::Error> {
        match endpoint {
            Endpoint::Tcp(ip, port) => Ok(SocketAddr::new(ip.try_into()?, port)),
            Endpoint::Mem(_) => Err(Error::TryFromEndpoint),
        }
    }
}

impl FromStr for Endpoint {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let url: Url = match s.parse() {
            Ok(u) => u,
            Err(err) => return Err(Error::ParseEndpoint(err.to_string())),
        };

        if !url.has_host() {
            return Err(Error::InvalidEndpoint(s.to_string()));
        }

        let host = url.host_str().unwrap();

        match url.scheme() {
            "tcp" => {
                let addr = match host.parse::<IpAddr>() {
                    Ok(addr) => Addr::Ip(addr),
                    Err(_) => Addr::Domain(host.to_string()),
                };

                let port = match url.port() {
                    Some(p) => p,
                    None => return Err(Error::ParseEndpoint(format!("port missing: {s}"))),
                };

                Ok(Endpoint::Tcp(addr, port))
            }
            "mem" => {
                let port = host
                    .parse::<Port>()
                    .map_err(|_| Error::ParseEndpoint(format!("invalid mem port: {s}")))?;
                Ok(Endpoint::Mem(port))
            }
            _ => Err(Error::InvalidEndpoint(s.to_string())),
        }
    }
}

impl Endpoint {
    /// Creates a new TCP endpoint from a `SocketAddr`.
    pub fn new_tcp_addr(addr: &SocketAddr) -> Endpoint {
        Endpoint::Tcp(Addr::Ip(addr.ip()), addr.port())
    }

    /// Creates a new Mem endpoint from a registry port.
    pub fn new_mem_addr(port: Port) -> Endpoint {
        Endpoint::Mem(port)
    }

    /// Returns the `Port` of the endpoint.
    pub fn port(&self) -> &Port {
        match self {
            Endpoint::Tcp(_, port) => port,
            Endpoint::Mem(port) => port,
        }
    }
}

/// Addr defines a type for an address, either IP or domain.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Addr {
    Ip(IpAddr),
    Domain(String),
}

impl TryFrom<Addr> for IpAddr {
    type Error = Error;
    fn try_from(addr: Addr) -> std::result::Result<IpAddr, Self::Error> {
        match addr {
            Addr::Ip(ip) => Ok(ip),
            Addr::Domain(d) => Err(Error::InvalidAddress(d)),
        }
    }
}

impl std::fmt::Display for Addr {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Addr::Ip(ip) => {
                write!(f, "{}", ip)
            }
            Addr::Domain(d) => {
                write!(f, "{}", d)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    #[test]
    fn test_endpoint_from_str() {
        let endpoint_str: Endpoint = "tcp://127.0.0.1:3000".parse().unwrap();
        let endpoint = Endpoint::Tcp(Addr::Ip(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))), 3000);
        assert_eq!(endpoint_str, endpoint);

        let endpoint_str: Endpoint = "tcp://example.com:3000".parse().unwrap();
        let endpoint = Endpoint::Tcp(Addr::Domain("example.com".to_string()), 3000);
        assert_eq!(endpoint_str, endpoint);

        let endpoint_str: Endpoint = "mem://4000".parse().unwrap();
        let endpoint = Endpoint::Mem(4000);
        assert_eq!(endpoint_str, endpoint);

        assert!("ws://127.0.0.1:3000".parse::<Endpoint>().is_err());
        assert!("tcp://127.0.0.1".parse::<Endpoint>().is_err());
    }
}
