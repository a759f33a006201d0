use std::collections::HashMap;

use crate::dns::RecordType;
use crate::instance::InstanceKey;
use crate::lookup::QueryId;

/// What a live backend query id is bound to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QueryBinding {
    /// A PTR (or host-resolve) scan for a service type.
    Scan(String),
    /// A TXT/SRV/A sub-query resolving one instance.
    Sub(InstanceKey),
}

/// Removed registry state for one query id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegistryEntry {
    pub record_type: RecordType,
    pub binding: QueryBinding,
}

/// Correlation maps between backend query ids, service types and instances.
///
/// Every live id is bound to exactly one of a service-type scan or an
/// instance sub-query; `remove` drops all state for an id atomically, so a
/// late callback finds nothing and is discarded.
#[derive(Debug, Default)]
pub struct QueryRegistry {
    record_types: HashMap<QueryId, RecordType>,
    scans: HashMap<QueryId, String>,
    sub_queries: HashMap<QueryId, InstanceKey>,
}

impl QueryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_scan(&mut self, id: QueryId, record_type: RecordType, service_type: &str) {
        self.record_types.insert(id, record_type);
        self.scans.insert(id, service_type.to_string());
    }

    pub fn insert_sub(&mut self, id: QueryId, record_type: RecordType, key: InstanceKey) {
        self.record_types.insert(id, record_type);
        self.sub_queries.insert(id, key);
    }

    pub fn record_type(&self, id: QueryId) -> Option<RecordType> {
        self.record_types.get(&id).copied()
    }

    pub fn scan_target(&self, id: QueryId) -> Option<&str> {
        self.scans.get(&id).map(String::as_str)
    }

    pub fn sub_target(&self, id: QueryId) -> Option<&InstanceKey> {
        self.sub_queries.get(&id)
    }

    /// Drop all state for `id`. Removing an unknown id is a no-op.
    pub fn remove(&mut self, id: QueryId) -> Option<RegistryEntry> {
        let record_type = self.record_types.remove(&id)?;
        let binding = if let Some(service_type) = self.scans.remove(&id) {
            QueryBinding::Scan(service_type)
        } else if let Some(key) = self.sub_queries.remove(&id) {
            QueryBinding::Sub(key)
        } else {
            // Unreachable through the insert methods; treat as already gone.
            return None;
        };
        Some(RegistryEntry {
            record_type,
            binding,
        })
    }

    /// Find the live scan for a service type. At most one exists by the
    /// start/stop contract.
    pub fn find_scan(&self, service_type: &str) -> Option<QueryId> {
        self.scans
            .iter()
            .find(|(_, target)| target.as_str() == service_type)
            .map(|(id, _)| *id)
    }

    pub fn live_ids(&self) -> Vec<QueryId> {
        self.record_types.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.record_types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.record_types.is_empty()
    }

    pub fn clear(&mut self) {
        self.record_types.clear();
        self.scans.clear();
        self.sub_queries.clear();
    }
}
