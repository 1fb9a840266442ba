//! Broker endpoint addresses.
//!
//! - `tcp://host:port`
//! - `ipc:///path/to/socket` (Unix domain socket)

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{MdpError, Result};

/// A parsed endpoint a DEALER can connect to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// `host:port`, resolved at connect time.
    Tcp(String),
    Ipc(PathBuf),
}

impl Endpoint {
    /// Parse an endpoint string.
    ///
    /// # Example
    ///
    /// ```
    /// use mdp_peer::transport::Endpoint;
    ///
    /// let ep = Endpoint::parse("tcp://localhost:5555").unwrap();
    /// assert_eq!(ep, Endpoint::Tcp("localhost:5555".to_string()));
    /// assert!(Endpoint::parse("tcp://*:5555").is_err());
    /// ```
    pub fn parse(endpoint: &str) -> Result<Self> {
        let invalid = |why: &str| MdpError::InvalidEndpoint(format!("{}: {}", endpoint, why));

        if let Some(address) = endpoint.strip_prefix("tcp://") {
            let (host, port) = address
                .rsplit_once(':')
                .ok_or_else(|| invalid("missing port"))?;
            if host.is_empty() || host == "*" {
                return Err(invalid("a concrete host is required to connect"));
            }
            port.parse::<u16>().map_err(|_| invalid("bad port"))?;
            return Ok(Endpoint::Tcp(address.to_string()));
        }

        if let Some(path) = endpoint.strip_prefix("ipc://") {
            if path.is_empty() {
                return Err(invalid("missing socket path"));
            }
            return Ok(Endpoint::Ipc(PathBuf::from(path)));
        }

        Err(invalid("unsupported transport, expected tcp:// or ipc://"))
    }
}

impl FromStr for Endpoint {
    type Err = MdpError;

    fn from_str(s: &str) -> Result<Self> {
        Endpoint::parse(s)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp(address) => write!(f, "tcp://{}", address),
            Endpoint::Ipc(path) => write!(f, "ipc://{}", path.display()),
        }
    }
}
