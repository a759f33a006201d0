use tokio::sync::watch;

use crate::dns::RecordType;
use crate::filter::ServiceFilter;
use crate::instance::ServiceInstance;

/// What a user asks the engine to keep resolved.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ServiceQuerySpec {
    /// Service type to browse, e.g. `_http._tcp.local` — or a plain host
    /// name for record type A.
    pub service_type: String,
    /// PTR for DNS-SD browsing; A for host-name resolution (which bypasses
    /// filtering).
    pub record_type: RecordType,
    /// Applied in conjunction with the engine-wide primary filter.
    pub filter: ServiceFilter,
}

impl ServiceQuerySpec {
    /// Browse a DNS-SD service type.
    pub fn browse(service_type: &str) -> Self {
        Self {
            service_type: service_type.to_string(),
            record_type: RecordType::Ptr,
            filter: ServiceFilter::any(),
        }
    }

    /// Browse with a secondary filter.
    pub fn browse_filtered(service_type: &str, filter: ServiceFilter) -> Self {
        Self {
            filter,
            ..Self::browse(service_type)
        }
    }

    /// Resolve a host name directly; results bypass filtering.
    pub fn host_resolve(host_name: &str) -> Self {
        Self {
            service_type: host_name.to_string(),
            record_type: RecordType::A,
            filter: ServiceFilter::any(),
        }
    }
}

/// A registered user query and its live result list.
#[derive(Debug)]
pub struct ServiceQuery {
    pub id: u64,
    pub spec: ServiceQuerySpec,
    /// Latest filtered snapshot, mirrored into the watch channel.
    pub resolved: Vec<ServiceInstance>,
    results: watch::Sender<Vec<ServiceInstance>>,
}

impl ServiceQuery {
    pub fn new(id: u64, spec: ServiceQuerySpec) -> (Self, QuerySubscription) {
        let (results, receiver) = watch::channel(Vec::new());
        let query = Self {
            id,
            spec,
            resolved: Vec::new(),
            results,
        };
        let subscription = QuerySubscription {
            id,
            results: receiver,
        };
        (query, subscription)
    }

    /// Replace the result list and notify the subscriber.
    pub fn publish(&mut self, instances: Vec<ServiceInstance>) {
        self.resolved = instances.clone();
        let _ = self.results.send(instances);
    }
}

/// Caller-side handle to one user query's live result list.
#[derive(Clone, Debug)]
pub struct QuerySubscription {
    pub id: u64,
    /// Changes whenever the filtered list is replaced.
    pub results: watch::Receiver<Vec<ServiceInstance>>,
}

impl QuerySubscription {
    /// Current snapshot of the resolved instances.
    pub fn snapshot(&self) -> Vec<ServiceInstance> {
        self.results.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_updates_subscription() {
        let (mut query, subscription) = ServiceQuery::new(1, ServiceQuerySpec::browse("_x._tcp.l"));
        assert!(subscription.snapshot().is_empty());
        query.publish(vec![ServiceInstance::new("a", "_x._tcp.l")]);
        assert_eq!(subscription.snapshot().len(), 1);
        assert_eq!(query.resolved.len(), 1);
    }

    #[test]
    fn host_resolve_spec_uses_a_records() {
        let spec = ServiceQuerySpec::host_resolve("printer.local");
        assert_eq!(spec.record_type, RecordType::A);
    }
}
