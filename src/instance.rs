use std::collections::HashSet;

use crate::lookup::QueryId;

/// One discovered service instance and its resolution state.
///
/// An instance becomes visible to user queries only once every sub-query it
/// spawned (TXT, SRV, then A) has answered — see [`is_fully_resolved`].
///
/// [`is_fully_resolved`]: ServiceInstance::is_fully_resolved
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ServiceInstance {
    /// Left-hand label of the PTR target, e.g. `myprinter` out of
    /// `myprinter._http._tcp.local`.
    pub name: String,
    /// Service type the instance was discovered under.
    pub service_type: String,
    /// TXT attributes, empty until the TXT sub-query answers.
    pub txt: Vec<String>,
    /// SRV target host.
    pub host_name: String,
    /// SRV target port.
    pub port: u16,
    /// Textual IPv4/IPv6 address from the address sub-query.
    pub host_address: String,
    /// Backend query ids still in flight for this instance.
    pub outstanding_requests: HashSet<QueryId>,
    /// Set when the instance fully resolved during the current refresh
    /// cycle; cleared by the purge pass to arm the next cycle.
    pub updated: bool,
    /// Consecutive refresh cycles this instance failed to re-resolve.
    pub error_count: u32,
}

impl ServiceInstance {
    pub fn new(name: &str, service_type: &str) -> Self {
        Self {
            name: name.to_string(),
            service_type: service_type.to_string(),
            ..Self::default()
        }
    }

    /// True once no sub-queries remain outstanding.
    pub fn is_fully_resolved(&self) -> bool {
        self.outstanding_requests.is_empty()
    }
}

/// Stable key correlating backend query ids to instances.
///
/// The registry stores keys rather than references so a late callback after
/// removal simply fails the table lookup instead of touching freed state.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct InstanceKey {
    pub service_type: String,
    pub name: String,
}

impl InstanceKey {
    pub fn new(service_type: &str, name: &str) -> Self {
        Self {
            service_type: service_type.to_string(),
            name: name.to_string(),
        }
    }
}

/// Derive the instance name from a PTR target: everything before the first
/// `._`. A target without that separator is malformed under DNS-SD.
pub fn instance_name(ptr_target: &str) -> Option<&str> {
    match ptr_target.find("._") {
        Some(0) | None => None,
        Some(index) => Some(&ptr_target[..index]),
    }
}
