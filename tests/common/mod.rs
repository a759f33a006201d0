//! Shared harness: an engine wired to the mock lookup backend and the mock
//! network monitor, plus helpers that feed complete DNS-SD resolutions
//! through the pipeline.

#![allow(dead_code)]

use huginn::config::DiscoveryConfig;
use huginn::dns::{AnswerRecord, RecordType};
use huginn::engine::ServiceDiscovery;
use huginn::lookup::mock::{MockLookupHandle, mock_lookup};
use huginn::network::mock::{MockNetworkHandle, mock_network};
use huginn::query::{QuerySubscription, ServiceQuerySpec};

pub const HTTP: &str = "_http._tcp.local";

pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}

pub struct Harness {
    pub engine: ServiceDiscovery,
    pub lookup: MockLookupHandle,
    pub network: MockNetworkHandle,
}

pub fn harness() -> Harness {
    harness_with_config(DiscoveryConfig::default())
}

pub fn harness_with_config(config: DiscoveryConfig) -> Harness {
    init_tracing();
    let (factory, lookup) = mock_lookup();
    let (monitor, network) = mock_network();
    let engine = ServiceDiscovery::new(config, Box::new(factory), Box::new(monitor));
    Harness {
        engine,
        lookup,
        network,
    }
}

impl Harness {
    /// Declare a browse query, reconcile, start and bring the link up.
    pub fn start_browsing(&mut self, service_type: &str) -> QuerySubscription {
        let subscription = self.engine.add_query(ServiceQuerySpec::browse(service_type));
        self.engine.update_services();
        self.engine.set_running(true);
        self.engine.component_complete();
        self.engine.pump();
        subscription
    }

    /// Announce one instance on the live PTR scan.
    pub fn announce(&mut self, service_type: &str, instance: &str, ttl: u32) {
        let full = format!("{}.{}", instance, service_type);
        let ptr = self
            .lookup
            .query_id(service_type, RecordType::Ptr)
            .expect("live PTR scan");
        self.lookup
            .push_results(ptr, vec![AnswerRecord::ptr(service_type, &full, ttl)]);
        self.engine.pump();
    }

    /// Feed a full PTR → TXT/SRV → A resolution for one instance.
    pub fn resolve(
        &mut self,
        service_type: &str,
        instance: &str,
        host: &str,
        port: u16,
        address: &str,
        txt: &[&str],
    ) {
        let full = format!("{}.{}", instance, service_type);
        self.announce(service_type, instance, 120);
        let txt_query = self
            .lookup
            .query_id(&full, RecordType::Txt)
            .expect("TXT sub-query");
        self.lookup.push_results(
            txt_query,
            vec![AnswerRecord::txt(&full, txt.iter().copied(), 120)],
        );
        let srv_query = self
            .lookup
            .query_id(&full, RecordType::Srv)
            .expect("SRV sub-query");
        self.lookup
            .push_results(srv_query, vec![AnswerRecord::srv(&full, host, port, 120)]);
        self.engine.pump();
        let a_query = self
            .lookup
            .query_id(host, RecordType::A)
            .expect("A sub-query");
        self.lookup.push_results(
            a_query,
            vec![AnswerRecord::address(host, address.parse().unwrap(), 120)],
        );
        self.engine.pump();
    }

    /// Every live backend query id, sorted, as the mock saw them.
    pub fn live_backend_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.lookup.active_queries().iter().map(|q| q.id).collect();
        ids.sort_unstable();
        ids
    }

    /// Every live registry id, sorted.
    pub fn live_registry_ids(&self) -> Vec<u64> {
        let mut ids = self.engine.resolver().registry().live_ids();
        ids.sort_unstable();
        ids
    }
}
