use std::collections::HashMap;

use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

use crate::dns::{AnswerRecord, QueryErrorKind, RecordType};
use crate::engine::DiscoveryEvent;
use crate::filter::ServiceFilter;
use crate::instance::{InstanceKey, ServiceInstance, instance_name};
use crate::lookup::{LookupBackend, QueryId};
use crate::query::ServiceQuery;
use crate::registry::QueryRegistry;

/// The DNS-SD resolution state machine.
///
/// Owns the service-type table, the per-type instance tables, the query
/// registry and the user queries; drives the PTR → TXT/SRV → A pipeline per
/// instance and projects fully resolved instances into each user query's
/// filtered result list.
pub struct ServiceResolver {
    type_table: HashMap<String, RecordType>,
    instances: HashMap<String, Vec<ServiceInstance>>,
    registry: QueryRegistry,
    queries: Vec<ServiceQuery>,
    primary_filter: ServiceFilter,
    backend: Option<Box<dyn LookupBackend>>,
    /// Whether scans should be live for every known service type.
    live: bool,
    unicast_error_threshold: u32,
    notifier: broadcast::Sender<DiscoveryEvent>,
}

impl ServiceResolver {
    pub fn new(unicast_error_threshold: u32, notifier: broadcast::Sender<DiscoveryEvent>) -> Self {
        Self {
            type_table: HashMap::new(),
            instances: HashMap::new(),
            registry: QueryRegistry::new(),
            queries: Vec::new(),
            primary_filter: ServiceFilter::any(),
            backend: None,
            live: false,
            unicast_error_threshold,
            notifier,
        }
    }

    pub fn set_error_threshold(&mut self, threshold: u32) {
        self.unicast_error_threshold = threshold;
    }

    // ---- backend lifetime -------------------------------------------------

    pub fn has_backend(&self) -> bool {
        self.backend.is_some()
    }

    pub fn backend_mut(&mut self) -> Option<&mut (dyn LookupBackend + '_)> {
        match self.backend.as_mut() {
            Some(b) => Some(b.as_mut()),
            None => None,
        }
    }

    pub fn attach_backend(&mut self, backend: Box<dyn LookupBackend>) {
        self.backend = Some(backend);
    }

    /// Quiesce and drop the backend: cancel every live query, flush the
    /// registry, empty every instance table (updating user queries), then
    /// shut the backend down.
    pub fn detach_backend(&mut self) {
        let Some(mut backend) = self.backend.take() else {
            return;
        };
        for id in self.registry.live_ids() {
            backend.query_cancel(id);
        }
        self.registry.clear();

        let types: Vec<String> = self.instances.keys().cloned().collect();
        for ty in types {
            let emptied = match self.instances.get_mut(&ty) {
                Some(list) if !list.is_empty() => {
                    list.clear();
                    true
                }
                _ => false,
            };
            if emptied {
                self.update_service_type(&ty);
            }
        }
        backend.shutdown();
        debug!("Lookup backend detached, registry and instance tables flushed");
    }

    // ---- user queries and filtering ---------------------------------------

    pub fn add_query(&mut self, query: ServiceQuery) {
        self.queries.push(query);
    }

    /// Drop a user query. The service-type table is reconciled on the next
    /// `update_services` call.
    pub fn remove_query(&mut self, id: u64) -> bool {
        let before = self.queries.len();
        self.queries.retain(|q| q.id != id);
        self.queries.len() != before
    }

    pub fn queries(&self) -> &[ServiceQuery] {
        &self.queries
    }

    pub fn primary_filter(&self) -> &ServiceFilter {
        &self.primary_filter
    }

    /// Replace the engine-wide filter and re-project every user query.
    pub fn set_primary_filter(&mut self, filter: ServiceFilter) {
        self.primary_filter = filter;
        self.update_all_service_types();
    }

    // ---- service type table -----------------------------------------------

    pub fn add_service_type(&mut self, service_type: &str, record_type: RecordType) {
        if self.type_table.contains_key(service_type) {
            return;
        }
        self.type_table.insert(service_type.to_string(), record_type);
        self.instances.entry(service_type.to_string()).or_default();
        debug!("Added service type {} ({})", service_type, record_type);
    }

    pub fn remove_service_type(&mut self, service_type: &str) {
        if !self.type_table.contains_key(service_type) {
            return;
        }
        self.clear_items(service_type);
        self.type_table.remove(service_type);
        self.instances.remove(service_type);
        debug!("Removed service type {}", service_type);
    }

    pub fn remove_all_service_types(&mut self) {
        let types: Vec<String> = self.type_table.keys().cloned().collect();
        for ty in types {
            self.remove_service_type(&ty);
        }
    }

    pub fn service_types(&self) -> Vec<String> {
        self.type_table.keys().cloned().collect()
    }

    pub fn instances_for(&self, service_type: &str) -> &[ServiceInstance] {
        self.instances
            .get(service_type)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    // ---- instance table ---------------------------------------------------

    /// Look up or create the instance `(name, service_type)`. Returns its
    /// index and whether it was created, or `None` when the type is unknown.
    fn add_item(&mut self, name: &str, service_type: &str) -> Option<(usize, bool)> {
        let list = self.instances.get_mut(service_type)?;
        if let Some(index) = list.iter().position(|i| i.name == name) {
            return Some((index, false));
        }
        list.push(ServiceInstance::new(name, service_type));
        Some((list.len() - 1, true))
    }

    pub fn get_item(&self, name: &str, service_type: &str) -> Option<&ServiceInstance> {
        self.instances
            .get(service_type)?
            .iter()
            .find(|i| i.name == name)
    }

    fn get_item_mut(&mut self, name: &str, service_type: &str) -> Option<&mut ServiceInstance> {
        self.instances
            .get_mut(service_type)?
            .iter_mut()
            .find(|i| i.name == name)
    }

    /// Remove one instance: cancel its outstanding sub-queries first so a
    /// late callback finds no binding, then delete and re-project.
    pub fn remove_item(&mut self, name: &str, service_type: &str) {
        let Some(list) = self.instances.get_mut(service_type) else {
            return;
        };
        let Some(index) = list.iter().position(|i| i.name == name) else {
            return;
        };
        let instance = list.remove(index);
        for id in instance.outstanding_requests {
            if let Some(backend) = self.backend.as_deref_mut() {
                backend.query_cancel(id);
            }
            self.registry.remove(id);
        }
        debug!("Removed instance {} under {}", name, service_type);
        self.update_service_type(service_type);
    }

    pub fn clear_items(&mut self, service_type: &str) {
        let names: Vec<String> = self
            .instances
            .get(service_type)
            .map(|list| list.iter().map(|i| i.name.clone()).collect())
            .unwrap_or_default();
        for name in names {
            self.remove_item(&name, service_type);
        }
        self.update_service_type(service_type);
    }

    // ---- scans ------------------------------------------------------------

    /// Start the scan for a service type. Idempotent: at most one scan is
    /// live per type.
    pub fn start_query(&mut self, service_type: &str) {
        if self.registry.find_scan(service_type).is_some() {
            return;
        }
        let Some(record_type) = self.type_table.get(service_type).copied() else {
            return;
        };
        let Some(backend) = self.backend.as_deref_mut() else {
            return;
        };
        let id = backend.query_start(service_type, record_type);
        self.registry.insert_scan(id, record_type, service_type);
        debug!("Started {} scan {} for {}", record_type, id, service_type);
    }

    /// Stop the scan for a service type. Stopping an inactive type is a
    /// no-op.
    pub fn stop_query(&mut self, service_type: &str) {
        let Some(id) = self.registry.find_scan(service_type) else {
            return;
        };
        if let Some(backend) = self.backend.as_deref_mut() {
            backend.query_cancel(id);
        }
        self.registry.remove(id);
        debug!("Stopped scan {} for {}", id, service_type);
    }

    /// Go live: start a scan for every known service type.
    pub fn start_queries(&mut self) {
        self.live = true;
        let types: Vec<String> = self.type_table.keys().cloned().collect();
        for ty in types {
            self.start_query(&ty);
        }
    }

    /// Stop scanning: cancel every scan and every in-flight instance
    /// sub-query. Resolved instances stay visible.
    pub fn stop_queries(&mut self) {
        self.live = false;
        let types: Vec<String> = self.type_table.keys().cloned().collect();
        for ty in types {
            self.stop_query(&ty);
        }
        let pending: Vec<(InstanceKey, QueryId)> = self
            .instances
            .iter()
            .flat_map(|(ty, list)| {
                list.iter().flat_map(|inst| {
                    inst.outstanding_requests
                        .iter()
                        .map(|id| (InstanceKey::new(ty, &inst.name), *id))
                })
            })
            .collect();
        for (key, id) in pending {
            if let Some(backend) = self.backend.as_deref_mut() {
                backend.query_cancel(id);
            }
            self.registry.remove(id);
            if let Some(inst) = self.get_item_mut(&key.name, &key.service_type) {
                inst.outstanding_requests.remove(&id);
            }
        }
    }

    pub fn is_live(&self) -> bool {
        self.live
    }

    // ---- reconciliation and projection ------------------------------------

    /// Rebuild the service-type table from the declared user queries:
    /// insert and (when live) start newly demanded types, drop undemanded
    /// ones, then refill every user query.
    pub fn update_services(&mut self) {
        let mut required: HashMap<String, RecordType> = HashMap::new();
        for query in &self.queries {
            required
                .entry(query.spec.service_type.clone())
                .or_insert(query.spec.record_type);
        }

        let added: Vec<(String, RecordType)> = required
            .iter()
            .filter(|(ty, _)| !self.type_table.contains_key(*ty))
            .map(|(ty, rt)| (ty.clone(), *rt))
            .collect();
        for (ty, record_type) in added {
            self.add_service_type(&ty, record_type);
            if self.live {
                self.start_query(&ty);
            }
        }

        let stale: Vec<String> = self
            .type_table
            .keys()
            .filter(|ty| !required.contains_key(*ty))
            .cloned()
            .collect();
        for ty in stale {
            self.stop_query(&ty);
            self.remove_service_type(&ty);
        }

        self.update_all_service_types();
    }

    pub fn update_all_service_types(&mut self) {
        let types: Vec<String> = self.type_table.keys().cloned().collect();
        for ty in types {
            self.update_service_type(&ty);
        }
    }

    /// Refill every user query watching `service_type` with the fully
    /// resolved instances, filtered by primary and secondary filter unless
    /// the query is a host resolve (record type A).
    pub fn update_service_type(&mut self, service_type: &str) {
        let instances = self
            .instances
            .get(service_type)
            .cloned()
            .unwrap_or_default();
        let primary = self.primary_filter.clone();
        let mut touched = false;
        for query in self
            .queries
            .iter_mut()
            .filter(|q| q.spec.service_type == service_type)
        {
            let resolved: Vec<ServiceInstance> = instances
                .iter()
                .filter(|inst| inst.is_fully_resolved())
                .filter(|inst| {
                    query.spec.record_type == RecordType::A
                        || (primary.matches(inst) && query.spec.filter.matches(inst))
                })
                .cloned()
                .collect();
            query.publish(resolved);
            touched = true;
        }
        if touched {
            let _ = self.notifier.send(DiscoveryEvent::QueryResultsChanged {
                service_type: service_type.to_string(),
            });
        }
    }

    // ---- unicast refresh --------------------------------------------------

    /// Re-query every active service type, pruning instances that stopped
    /// responding. Unicast only; multicast removal is goodbye-driven.
    pub fn refresh_queries(&mut self) {
        let types: Vec<String> = self.type_table.keys().cloned().collect();
        for ty in types {
            self.refresh_query(&ty);
        }
    }

    pub fn refresh_query(&mut self, service_type: &str) {
        if !self.type_table.contains_key(service_type) {
            return;
        }
        if let Some(id) = self.registry.find_scan(service_type) {
            if let Some(backend) = self.backend.as_deref_mut() {
                backend.query_cancel(id);
            }
            self.registry.remove(id);
        }
        self.purge_items(service_type);
        self.start_query(service_type);
    }

    /// The purge pass: instances that did not re-resolve last cycle age
    /// toward removal; the rest are re-armed for the next cycle.
    fn purge_items(&mut self, service_type: &str) {
        let threshold = self.unicast_error_threshold;
        let mut removals: Vec<String> = Vec::new();
        let Some(list) = self.instances.get_mut(service_type) else {
            return;
        };
        for instance in list.iter_mut() {
            if instance.updated {
                instance.updated = false;
            } else {
                instance.error_count += 1;
                if instance.error_count > threshold {
                    removals.push(instance.name.clone());
                }
            }
        }
        for name in removals {
            debug!("Purging stale instance {} under {}", name, service_type);
            self.remove_item(&name, service_type);
        }
    }

    // ---- ingestion --------------------------------------------------------

    /// Dispatch answer records by the record type registered for the query
    /// id. Unknown ids are late answers after cancellation and are dropped.
    pub fn handle_results(&mut self, id: QueryId, records: Vec<AnswerRecord>) {
        let Some(record_type) = self.registry.record_type(id) else {
            trace!("Dropping results for unknown query {}", id);
            return;
        };
        match record_type {
            RecordType::Ptr => self.ingest_ptr(id, records),
            RecordType::Txt => self.ingest_txt(id, records),
            RecordType::Srv => self.ingest_srv(id, records),
            RecordType::A | RecordType::Aaaa => self.ingest_address(id, records),
            other => warn!("Ignoring results for unsupported record type {}", other),
        }
    }

    /// Backend query errors are diagnostic only; stale instances age out via
    /// the purge pass instead.
    pub fn handle_error(&mut self, id: QueryId, kind: QueryErrorKind) {
        match self.registry.record_type(id) {
            Some(record_type) => debug!("Query {} ({}) failed: {}", id, record_type, kind),
            None => trace!("Dropping error for unknown query {}: {}", id, kind),
        }
    }

    fn ingest_ptr(&mut self, id: QueryId, records: Vec<AnswerRecord>) {
        let Some(service_type) = self.registry.scan_target(id).map(str::to_string) else {
            return;
        };
        for record in records {
            let Some(name) = instance_name(&record.name).map(str::to_string) else {
                debug!("Ignoring malformed PTR target {}", record.name);
                continue;
            };
            if record.ttl == 0 {
                debug!("Goodbye for {} under {}", name, service_type);
                self.remove_item(&name, &service_type);
                continue;
            }
            let Some((index, _created)) = self.add_item(&name, &service_type) else {
                continue;
            };
            // Re-resolve only when nothing is in flight and the instance has
            // not already resolved this refresh cycle; this keeps a repeated
            // announcement from spawning duplicate TXT/SRV queries.
            let wants_resolution = self
                .instances
                .get(&service_type)
                .and_then(|list| list.get(index))
                .map(|inst| inst.outstanding_requests.is_empty() && !inst.updated)
                .unwrap_or(false);
            if !wants_resolution {
                continue;
            }
            self.start_sub_query(&record.name, RecordType::Txt, &service_type, &name);
            self.start_sub_query(&record.name, RecordType::Srv, &service_type, &name);
        }
    }

    fn ingest_txt(&mut self, id: QueryId, records: Vec<AnswerRecord>) {
        let Some(key) = self.release_sub_query(id) else {
            return;
        };
        let texts: Vec<String> = records
            .iter()
            .flat_map(|record| record.texts.iter().cloned())
            .collect();
        if let Some(instance) = self.get_item_mut(&key.name, &key.service_type) {
            instance.txt = texts;
        }
        self.finish_resolution(&key);
    }

    fn ingest_srv(&mut self, id: QueryId, records: Vec<AnswerRecord>) {
        let Some(key) = self.release_sub_query(id) else {
            return;
        };
        let target = records
            .iter()
            .rev()
            .find(|record| !record.name.is_empty())
            .map(|record| (record.name.clone(), record.port));
        if let Some((host, port)) = target {
            if let Some(instance) = self.get_item_mut(&key.name, &key.service_type) {
                instance.host_name = host.clone();
                instance.port = port;
            }
            self.start_sub_query(&host, RecordType::A, &key.service_type, &key.name);
        }
        self.finish_resolution(&key);
    }

    fn ingest_address(&mut self, id: QueryId, records: Vec<AnswerRecord>) {
        if self.registry.sub_target(id).is_some() {
            let Some(key) = self.release_sub_query(id) else {
                return;
            };
            // The last address processed wins; an AAAA answer delivered for
            // the A query id is accepted the same way.
            if let Some(address) = records.iter().rev().find_map(|record| record.address) {
                if let Some(instance) = self.get_item_mut(&key.name, &key.service_type) {
                    instance.host_address = address.to_string();
                }
            }
            self.finish_resolution(&key);
        } else if let Some(service_type) = self.registry.scan_target(id).map(str::to_string) {
            self.ingest_host_scan(&service_type, records);
        }
    }

    /// Host-resolve scans (service types declared with record type A) carry
    /// no sub-queries: each answer upserts an immediately resolved instance
    /// named by the record owner.
    fn ingest_host_scan(&mut self, service_type: &str, records: Vec<AnswerRecord>) {
        let mut changed = false;
        for record in records {
            if record.owner.is_empty() {
                continue;
            }
            if record.ttl == 0 {
                self.remove_item(&record.owner, service_type);
                continue;
            }
            let Some(address) = record.address else {
                continue;
            };
            let Some((index, _created)) = self.add_item(&record.owner, service_type) else {
                continue;
            };
            if let Some(instance) = self
                .instances
                .get_mut(service_type)
                .and_then(|list| list.get_mut(index))
            {
                instance.host_name = record.owner.clone();
                instance.host_address = address.to_string();
                instance.updated = true;
                instance.error_count = 0;
                changed = true;
            }
        }
        if changed {
            self.update_service_type(service_type);
        }
    }

    fn start_sub_query(
        &mut self,
        query_name: &str,
        record_type: RecordType,
        service_type: &str,
        name: &str,
    ) {
        let Some(backend) = self.backend.as_deref_mut() else {
            return;
        };
        let id = backend.query_start(query_name, record_type);
        self.registry
            .insert_sub(id, record_type, InstanceKey::new(service_type, name));
        if let Some(instance) = self.get_item_mut(name, service_type) {
            instance.outstanding_requests.insert(id);
        }
        trace!(
            "Started {} sub-query {} on {} for instance {}",
            record_type, id, query_name, name
        );
    }

    /// One-shot sub-queries are cancelled with the backend and released from
    /// the registry and the instance's outstanding set as soon as they
    /// answer.
    fn release_sub_query(&mut self, id: QueryId) -> Option<InstanceKey> {
        let key = self.registry.sub_target(id).cloned()?;
        if let Some(backend) = self.backend.as_deref_mut() {
            backend.query_cancel(id);
        }
        self.registry.remove(id);
        if let Some(instance) = self.get_item_mut(&key.name, &key.service_type) {
            instance.outstanding_requests.remove(&id);
        }
        Some(key)
    }

    /// When the last outstanding sub-query answers, the instance becomes
    /// visible: reset its failure counter, mark it refreshed and re-project.
    fn finish_resolution(&mut self, key: &InstanceKey) {
        let Some(instance) = self.get_item_mut(&key.name, &key.service_type) else {
            return;
        };
        if !instance.outstanding_requests.is_empty() {
            return;
        }
        instance.error_count = 0;
        instance.updated = true;
        debug!(
            "Fully resolved {} under {} at {}:{}",
            key.name, key.service_type, instance.host_address, instance.port
        );
        self.update_service_type(&key.service_type);
    }

    pub fn registry(&self) -> &QueryRegistry {
        &self.registry
    }
}
