use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use crate::dns::enums::RecordType;
use crate::error::DiscoveryError;

/// One answer record delivered by the lookup backend.
///
/// `owner` is the name the record belongs to; `name` carries the target for
/// record types that point at another name (the instance name for PTR, the
/// host for SRV). Payload fields not applicable to the record type stay at
/// their defaults.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AnswerRecord {
    pub owner: String,
    pub name: String,
    pub record_type: RecordType,
    pub ttl: u32,
    /// TXT character-strings, in record order.
    pub texts: Vec<String>,
    /// SRV target port.
    pub port: u16,
    /// A/AAAA address.
    pub address: Option<IpAddr>,
}

impl AnswerRecord {
    /// PTR answer: `owner` is the service type, `target` the full instance name.
    pub fn ptr(owner: &str, target: &str, ttl: u32) -> Self {
        Self {
            owner: owner.to_string(),
            name: target.to_string(),
            record_type: RecordType::Ptr,
            ttl,
            ..Self::default()
        }
    }

    /// TXT answer carrying the given character-strings.
    pub fn txt<I, S>(owner: &str, texts: I, ttl: u32) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            owner: owner.to_string(),
            record_type: RecordType::Txt,
            ttl,
            texts: texts.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// SRV answer pointing at `host:port`.
    pub fn srv(owner: &str, host: &str, port: u16, ttl: u32) -> Self {
        Self {
            owner: owner.to_string(),
            name: host.to_string(),
            record_type: RecordType::Srv,
            ttl,
            port,
            ..Self::default()
        }
    }

    /// A or AAAA answer, depending on the address family.
    pub fn address(owner: &str, address: IpAddr, ttl: u32) -> Self {
        let record_type = if address.is_ipv4() {
            RecordType::A
        } else {
            RecordType::Aaaa
        };
        Self {
            owner: owner.to_string(),
            record_type,
            ttl,
            address: Some(address),
            ..Self::default()
        }
    }
}

/// A unicast nameserver endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct NameServer {
    pub address: IpAddr,
    pub port: u16,
}

impl NameServer {
    pub const DEFAULT_PORT: u16 = 53;

    pub fn new(address: IpAddr, port: u16) -> Self {
        Self { address, port }
    }
}

impl FromStr for NameServer {
    type Err = DiscoveryError;

    /// Accepts `ip` (default port 53) or `ip:port` / `[v6]:port`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(address) = s.parse::<IpAddr>() {
            return Ok(Self::new(address, Self::DEFAULT_PORT));
        }
        let addr: std::net::SocketAddr = s
            .parse()
            .map_err(|_| DiscoveryError::InvalidNameServer(s.to_string()))?;
        Ok(Self::new(addr.ip(), addr.port()))
    }
}

impl fmt::Display for NameServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.address {
            IpAddr::V4(ip) => write!(f, "{}:{}", ip, self.port),
            IpAddr::V6(ip) => write!(f, "[{}]:{}", ip, self.port),
        }
    }
}
