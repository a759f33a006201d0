use std::fmt;
use std::str::FromStr;

use crate::error::DiscoveryError;

/// DNS record types the discovery pipeline works with.
///
/// DNS-SD only needs the PTR/TXT/SRV/A/AAAA chain; everything else maps to
/// `Unknown` so answers from chatty responders can be carried without loss.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum RecordType {
    #[default]
    Unknown,
    A,
    Ptr,
    Txt,
    Aaaa,
    Srv,
    Any,
}

impl From<u16> for RecordType {
    fn from(value: u16) -> Self {
        match value {
            1 => RecordType::A,
            12 => RecordType::Ptr,
            16 => RecordType::Txt,
            28 => RecordType::Aaaa,
            33 => RecordType::Srv,
            255 => RecordType::Any,
            _ => RecordType::Unknown,
        }
    }
}

impl From<RecordType> for u16 {
    fn from(value: RecordType) -> Self {
        match value {
            RecordType::A => 1,
            RecordType::Ptr => 12,
            RecordType::Txt => 16,
            RecordType::Aaaa => 28,
            RecordType::Srv => 33,
            RecordType::Any => 255,
            RecordType::Unknown => 0,
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecordType::A => "A",
            RecordType::Ptr => "PTR",
            RecordType::Txt => "TXT",
            RecordType::Aaaa => "AAAA",
            RecordType::Srv => "SRV",
            RecordType::Any => "ANY",
            RecordType::Unknown => "UNKNOWN",
        };
        write!(f, "{}", name)
    }
}

/// Transport the lookup backend is initialized for.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum LookupMode {
    /// mDNS over the link-local multicast group.
    #[default]
    Multicast,
    /// Conventional DNS against configured nameservers, with periodic
    /// re-query and stale-entry pruning.
    Unicast,
}

impl FromStr for LookupMode {
    type Err = DiscoveryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "multicast" | "mdns" => Ok(LookupMode::Multicast),
            "unicast" | "dns" => Ok(LookupMode::Unicast),
            _ => Err(DiscoveryError::InvalidLookupMode(s.to_string())),
        }
    }
}

impl fmt::Display for LookupMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookupMode::Multicast => write!(f, "multicast"),
            LookupMode::Unicast => write!(f, "unicast"),
        }
    }
}

/// Failure classification reported by the lookup backend for a single query.
#[derive(Copy, Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum QueryErrorKind {
    Generic,
    NxDomain,
    Timeout,
    Conflict,
}

impl fmt::Display for QueryErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryErrorKind::Generic => write!(f, "generic failure"),
            QueryErrorKind::NxDomain => write!(f, "non-existent domain"),
            QueryErrorKind::Timeout => write!(f, "timed out"),
            QueryErrorKind::Conflict => write!(f, "name conflict"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_type_u16_round_trip() {
        for rtype in [
            RecordType::A,
            RecordType::Ptr,
            RecordType::Txt,
            RecordType::Aaaa,
            RecordType::Srv,
            RecordType::Any,
        ] {
            let code: u16 = rtype.into();
            assert_eq!(RecordType::from(code), rtype);
        }
    }

    #[test]
    fn unknown_codes_map_to_unknown() {
        assert_eq!(RecordType::from(6), RecordType::Unknown); // SOA
        assert_eq!(RecordType::from(48), RecordType::Unknown); // DNSKEY
    }

    #[test]
    fn lookup_mode_parsing() {
        assert_eq!(
            "multicast".parse::<LookupMode>().unwrap(),
            LookupMode::Multicast
        );
        assert_eq!("MDNS".parse::<LookupMode>().unwrap(), LookupMode::Multicast);
        assert_eq!("Unicast".parse::<LookupMode>().unwrap(), LookupMode::Unicast);
        assert!("anycast".parse::<LookupMode>().is_err());
    }
}
