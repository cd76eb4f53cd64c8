//! Trusted-subnet filter.
//!
//! When configured, only clients whose address falls inside the CIDR range
//! may talk to the server. The client address is taken from the
//! `X-Real-IP` header when it parses, otherwise from the transport peer.

use ip_network::IpNetwork;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use crate::protocol::error::{MetrixError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustedSubnet {
    network: IpNetwork,
}

impl TrustedSubnet {
    /// Parses `addr/prefix`; host bits in `addr` are truncated.
    pub fn parse(cidr: &str) -> Result<Self> {
        let cidr = cidr.trim();
        let (addr, prefix) = cidr
            .split_once('/')
            .ok_or_else(|| MetrixError::Config(format!("trusted subnet {cidr:?} is not in CIDR notation")))?;
        let addr = IpAddr::from_str(addr)
            .map_err(|e| MetrixError::Config(format!("trusted subnet {cidr:?}: {e}")))?;
        let prefix = prefix
            .parse::<u8>()
            .map_err(|e| MetrixError::Config(format!("trusted subnet {cidr:?}: {e}")))?;
        let network = IpNetwork::new_truncate(addr, prefix)
            .map_err(|e| MetrixError::Config(format!("trusted subnet {cidr:?}: {e}")))?;
        Ok(Self { network })
    }

    pub fn contains(&self, ip: IpAddr) -> bool {
        self.network.contains(ip)
    }

    /// Admits or rejects a request.
    pub fn check(&self, real_ip: Option<&str>, peer: Option<SocketAddr>) -> Result<()> {
        match client_ip(real_ip, peer) {
            Some(ip) if self.contains(ip) => Ok(()),
            Some(ip) => Err(MetrixError::Forbidden(format!("{ip} is outside {}", self.network))),
            None => Err(MetrixError::Forbidden("client address unknown".into())),
        }
    }
}

impl fmt::Display for TrustedSubnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.network)
    }
}

/// Resolves the client address: a parseable `X-Real-IP` wins over the peer.
pub fn client_ip(real_ip: Option<&str>, peer: Option<SocketAddr>) -> Option<IpAddr> {
    real_ip
        .and_then(|raw| IpAddr::from_str(raw.trim()).ok())
        .or_else(|| peer.map(|p| p.ip()))
}
