//! In-memory lookup backend for tests: records every call, allocates
//! sequential query ids, and lets the caller inject answer records without a
//! socket in sight.

use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::dns::{AnswerRecord, LookupMode, NameServer, QueryErrorKind, RecordType};
use crate::error::{DiscoveryError, Result};
use crate::lookup::{LookupBackend, LookupBackendFactory, LookupEvent, QueryId};

/// One `query_start` call as the backend saw it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StartedQuery {
    pub id: QueryId,
    pub name: String,
    pub record_type: RecordType,
}

#[derive(Default)]
struct MockState {
    next_id: QueryId,
    started: Vec<StartedQuery>,
    cancelled: Vec<QueryId>,
    name_servers: Vec<NameServer>,
    system_name_servers: Vec<NameServer>,
    inits: Vec<LookupMode>,
    shutdowns: u32,
    fail_next_init: bool,
    events: Option<mpsc::UnboundedSender<LookupEvent>>,
}

/// Build a connected factory/handle pair.
pub fn mock_lookup() -> (MockLookupFactory, MockLookupHandle) {
    let state = Arc::new(Mutex::new(MockState {
        next_id: 1,
        ..MockState::default()
    }));
    (
        MockLookupFactory {
            state: state.clone(),
        },
        MockLookupHandle { state },
    )
}

pub struct MockLookupFactory {
    state: Arc<Mutex<MockState>>,
}

impl LookupBackendFactory for MockLookupFactory {
    fn create(
        &mut self,
        mode: LookupMode,
        _bind_address: SocketAddr,
        events: mpsc::UnboundedSender<LookupEvent>,
    ) -> Result<Box<dyn LookupBackend>> {
        let mut state = self.state.lock();
        if state.fail_next_init {
            state.fail_next_init = false;
            return Err(DiscoveryError::BackendInit(
                "simulated init failure".to_string(),
            ));
        }
        state.inits.push(mode);
        state.events = Some(events);
        Ok(Box::new(MockLookup {
            state: self.state.clone(),
        }))
    }
}

struct MockLookup {
    state: Arc<Mutex<MockState>>,
}

impl LookupBackend for MockLookup {
    fn query_start(&mut self, name: &str, record_type: RecordType) -> QueryId {
        let mut state = self.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.started.push(StartedQuery {
            id,
            name: name.to_string(),
            record_type,
        });
        id
    }

    fn query_cancel(&mut self, id: QueryId) {
        self.state.lock().cancelled.push(id);
    }

    fn set_name_servers(&mut self, servers: &[NameServer]) {
        self.state.lock().name_servers = servers.to_vec();
    }

    fn system_name_servers(&self) -> Vec<NameServer> {
        self.state.lock().system_name_servers.clone()
    }

    fn shutdown(&mut self) {
        let mut state = self.state.lock();
        state.shutdowns += 1;
        state.events = None;
    }
}

/// Test-side view of the mock backend.
#[derive(Clone)]
pub struct MockLookupHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockLookupHandle {
    /// Deliver answer records for a query id.
    pub fn push_results(&self, query_id: QueryId, records: Vec<AnswerRecord>) {
        let events = self.state.lock().events.clone();
        if let Some(events) = events {
            let _ = events.send(LookupEvent::Results { query_id, records });
        }
    }

    /// Deliver a query failure.
    pub fn push_error(&self, query_id: QueryId, kind: QueryErrorKind) {
        let events = self.state.lock().events.clone();
        if let Some(events) = events {
            let _ = events.send(LookupEvent::Failed { query_id, kind });
        }
    }

    /// Latest live query matching name and record type, if any.
    pub fn query_id(&self, name: &str, record_type: RecordType) -> Option<QueryId> {
        let state = self.state.lock();
        state
            .started
            .iter()
            .rev()
            .find(|q| {
                q.name == name && q.record_type == record_type && !state.cancelled.contains(&q.id)
            })
            .map(|q| q.id)
    }

    /// All queries started and not yet cancelled.
    pub fn active_queries(&self) -> Vec<StartedQuery> {
        let state = self.state.lock();
        state
            .started
            .iter()
            .filter(|q| !state.cancelled.contains(&q.id))
            .cloned()
            .collect()
    }

    pub fn started_queries(&self) -> Vec<StartedQuery> {
        self.state.lock().started.clone()
    }

    pub fn cancelled_ids(&self) -> Vec<QueryId> {
        self.state.lock().cancelled.clone()
    }

    pub fn is_cancelled(&self, id: QueryId) -> bool {
        self.state.lock().cancelled.contains(&id)
    }

    /// Nameservers last pushed through `set_name_servers`.
    pub fn name_servers(&self) -> Vec<NameServer> {
        self.state.lock().name_servers.clone()
    }

    pub fn set_system_name_servers(&self, servers: Vec<NameServer>) {
        self.state.lock().system_name_servers = servers;
    }

    /// Modes passed to every successful factory `create`, in order.
    pub fn init_modes(&self) -> Vec<LookupMode> {
        self.state.lock().inits.clone()
    }

    pub fn shutdown_count(&self) -> u32 {
        self.state.lock().shutdowns
    }

    /// Make the next factory `create` fail once.
    pub fn fail_next_init(&self) {
        self.state.lock().fail_next_init = true;
    }
}
