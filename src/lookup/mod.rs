pub mod mock;

use std::net::SocketAddr;

use tokio::sync::mpsc;

use crate::dns::{AnswerRecord, LookupMode, NameServer, QueryErrorKind, RecordType};
use crate::error::Result;

/// Backend-allocated identifier for one outstanding query.
pub type QueryId = u64;

/// Asynchronous delivery from the lookup backend.
#[derive(Clone, Debug)]
pub enum LookupEvent {
    /// Answer records for a live query.
    Results {
        query_id: QueryId,
        records: Vec<AnswerRecord>,
    },
    /// Query failure; diagnostic only, the engine does not mutate state on it.
    Failed {
        query_id: QueryId,
        kind: QueryErrorKind,
    },
}

/// Capability interface over the raw DNS/mDNS engine.
///
/// The engine core never touches the wire; it starts and cancels queries
/// here and consumes the [`LookupEvent`]s the backend pushes into the channel
/// it was created with.
pub trait LookupBackend: Send {
    /// Start a query and return its backend-allocated id.
    fn query_start(&mut self, name: &str, record_type: RecordType) -> QueryId;

    /// Cancel a live query. Cancelling an unknown id is a no-op.
    fn query_cancel(&mut self, id: QueryId);

    /// Replace the nameserver list used for unicast lookups.
    fn set_name_servers(&mut self, servers: &[NameServer]);

    /// System-provided fallback nameservers.
    fn system_name_servers(&self) -> Vec<NameServer>;

    /// Release all backend resources. The backend delivers no events after
    /// this returns.
    fn shutdown(&mut self);
}

/// Creates lookup backends; creation is `init`, and a fresh `create` after a
/// shutdown is the re-init contract.
pub trait LookupBackendFactory: Send {
    fn create(
        &mut self,
        mode: LookupMode,
        bind_address: SocketAddr,
        events: mpsc::UnboundedSender<LookupEvent>,
    ) -> Result<Box<dyn LookupBackend>>;
}
