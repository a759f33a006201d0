use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::config::DiscoveryConfig;
use crate::dns::{LookupMode, NameServer};
use crate::error::{DiscoveryError, Result};
use crate::filter::ServiceFilter;
use crate::lookup::{LookupBackendFactory, LookupEvent};
use crate::network::{LinkEvent, NetworkConfiguration, NetworkMonitor};
use crate::query::{QuerySubscription, ServiceQuery, ServiceQuerySpec};
use crate::resolver::ServiceResolver;

/// Observable property changes, broadcast to every subscriber.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DiscoveryEvent {
    RunningChanged(bool),
    NetworkReadyChanged(bool),
    LookupReadyChanged(bool),
    LookupModeChanged(LookupMode),
    FilterChanged,
    NameServersChanged,
    /// A user query's filtered result list was replaced.
    QueryResultsChanged { service_type: String },
}

/// Facade mutations accepted by the engine task.
#[derive(Debug)]
pub enum DiscoveryCommand {
    SetRunning(bool),
    SetLookupMode(LookupMode),
    SetFilter(ServiceFilter),
    AddQuery {
        spec: ServiceQuerySpec,
        reply: oneshot::Sender<QuerySubscription>,
    },
    RemoveQuery(u64),
    UpdateServices,
    SetNameServers(Vec<NameServer>),
    AddNameServer(NameServer),
    RemoveNameServer(usize),
    ClearNameServers,
    SetUnicastInterval(Duration),
    SetErrorThreshold(u32),
    State {
        reply: oneshot::Sender<DiscoveryState>,
    },
    Shutdown,
}

/// Point-in-time view of the engine's observable properties.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DiscoveryState {
    pub running: bool,
    pub network_ready: bool,
    pub lookup_ready: bool,
    pub lookup_mode: LookupMode,
    pub name_servers: Vec<NameServer>,
    pub service_types: Vec<String>,
}

/// The service discovery engine: lifecycle controller plus public facade.
///
/// All state lives on one owner; the synchronous methods run to completion
/// without suspension. Production drives them from the [`run`] task; tests
/// call them directly and [`pump`] queued backend and link events in
/// between.
///
/// [`run`]: ServiceDiscovery::run
/// [`pump`]: ServiceDiscovery::pump
pub struct ServiceDiscovery {
    config: DiscoveryConfig,
    resolver: ServiceResolver,
    factory: Box<dyn LookupBackendFactory>,
    network: Box<dyn NetworkMonitor>,
    component_complete: bool,
    network_ready: bool,
    running: bool,
    lookup_mode: LookupMode,
    name_servers: Vec<NameServer>,
    next_query_id: u64,
    events: broadcast::Sender<DiscoveryEvent>,
    lookup_tx: mpsc::UnboundedSender<LookupEvent>,
    lookup_rx: Option<mpsc::UnboundedReceiver<LookupEvent>>,
    link_tx: mpsc::UnboundedSender<LinkEvent>,
    link_rx: Option<mpsc::UnboundedReceiver<LinkEvent>>,
}

impl ServiceDiscovery {
    pub fn new(
        config: DiscoveryConfig,
        factory: Box<dyn LookupBackendFactory>,
        network: Box<dyn NetworkMonitor>,
    ) -> Self {
        let (events, _) = broadcast::channel(64);
        let (lookup_tx, lookup_rx) = mpsc::unbounded_channel();
        let (link_tx, link_rx) = mpsc::unbounded_channel();
        let resolver = ServiceResolver::new(config.unicast_error_threshold, events.clone());
        Self {
            lookup_mode: config.lookup_mode,
            name_servers: config.name_servers.clone(),
            config,
            resolver,
            factory,
            network,
            component_complete: false,
            network_ready: false,
            running: false,
            next_query_id: 1,
            events,
            lookup_tx,
            lookup_rx: Some(lookup_rx),
            link_tx,
            link_rx: Some(link_rx),
        }
    }

    // ---- observable properties --------------------------------------------

    pub fn subscribe(&self) -> broadcast::Receiver<DiscoveryEvent> {
        self.events.subscribe()
    }

    pub fn running(&self) -> bool {
        self.running
    }

    pub fn network_ready(&self) -> bool {
        self.network_ready
    }

    pub fn lookup_ready(&self) -> bool {
        self.resolver.has_backend()
    }

    pub fn lookup_mode(&self) -> LookupMode {
        self.lookup_mode
    }

    pub fn name_servers(&self) -> &[NameServer] {
        &self.name_servers
    }

    pub fn unicast_lookup_interval(&self) -> Duration {
        self.config.unicast_lookup_interval
    }

    pub fn unicast_error_threshold(&self) -> u32 {
        self.config.unicast_error_threshold
    }

    pub fn filter(&self) -> &ServiceFilter {
        self.resolver.primary_filter()
    }

    pub fn resolver(&self) -> &ServiceResolver {
        &self.resolver
    }

    pub fn state(&self) -> DiscoveryState {
        DiscoveryState {
            running: self.running,
            network_ready: self.network_ready,
            lookup_ready: self.lookup_ready(),
            lookup_mode: self.lookup_mode,
            name_servers: self.name_servers.clone(),
            service_types: self.resolver.service_types(),
        }
    }

    fn emit(&self, event: DiscoveryEvent) {
        let _ = self.events.send(event);
    }

    // ---- lifecycle --------------------------------------------------------

    /// Boot-time gate: arms the watchdog and starts the first link-up
    /// attempt. Calling it again is a no-op.
    pub fn component_complete(&mut self) {
        if self.component_complete {
            return;
        }
        self.component_complete = true;
        info!("Discovery engine complete, watching for network links");
        self.try_link_up();
    }

    /// Watchdog tick: retry the link while it is down.
    pub fn handle_watchdog_tick(&mut self) {
        if !self.component_complete {
            return;
        }
        if !self.network_ready {
            self.try_link_up();
        }
    }

    fn try_link_up(&mut self) {
        if self.network_ready {
            return;
        }
        let configurations = self.network.configurations();
        let Some(config) = pick_configuration(&configurations) else {
            debug!("No usable network bearer, will retry");
            return;
        };
        debug!("Opening session on {} ({:?})", config.name, config.bearer);
        self.network.open_session(&config, self.link_tx.clone());
    }

    fn dispatch_link_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::SessionOpened => self.on_session_opened(),
            LinkEvent::SessionClosed => self.on_session_down(),
            LinkEvent::SessionError(message) => {
                warn!("Network session error: {}", message);
                self.on_session_down();
            }
        }
    }

    fn on_session_opened(&mut self) {
        if self.network_ready {
            return;
        }
        self.set_network_ready(true);
        self.init_lookup();
    }

    fn on_session_down(&mut self) {
        self.teardown_lookup();
        self.set_network_ready(false);
    }

    fn set_network_ready(&mut self, ready: bool) {
        if self.network_ready == ready {
            return;
        }
        self.network_ready = ready;
        info!("Network {}", if ready { "ready" } else { "lost" });
        self.emit(DiscoveryEvent::NetworkReadyChanged(ready));
    }

    fn init_lookup(&mut self) {
        if self.resolver.has_backend() {
            return;
        }
        match self.factory.create(
            self.lookup_mode,
            self.config.bind_address,
            self.lookup_tx.clone(),
        ) {
            Ok(backend) => {
                self.resolver.attach_backend(backend);
                info!("Lookup backend up in {} mode", self.lookup_mode);
                self.emit(DiscoveryEvent::LookupReadyChanged(true));
                if self.lookup_mode == LookupMode::Unicast {
                    self.push_name_servers();
                }
                if self.running {
                    self.resolver.start_queries();
                }
            }
            Err(e) => {
                // Dropping network_ready makes the watchdog retry the whole
                // link-up sequence.
                error!("Lookup backend init failed: {}", e);
                self.set_network_ready(false);
                self.network.close_session();
            }
        }
    }

    fn teardown_lookup(&mut self) {
        if !self.resolver.has_backend() {
            return;
        }
        self.resolver.detach_backend();
        self.emit(DiscoveryEvent::LookupReadyChanged(false));
    }

    // ---- facade mutations -------------------------------------------------

    pub fn set_running(&mut self, running: bool) {
        if self.running == running {
            return;
        }
        self.running = running;
        info!("Discovery {}", if running { "started" } else { "stopped" });
        self.emit(DiscoveryEvent::RunningChanged(running));
        if self.network_ready && self.lookup_ready() {
            if running {
                self.resolver.start_queries();
            } else {
                self.resolver.stop_queries();
            }
        }
    }

    /// Switch between multicast and unicast. With a live backend this tears
    /// it down and re-initializes in the new mode, resuming the prior
    /// running state.
    pub fn set_lookup_mode(&mut self, mode: LookupMode) {
        if self.lookup_mode == mode {
            return;
        }
        self.lookup_mode = mode;
        info!("Lookup mode set to {}", mode);
        self.emit(DiscoveryEvent::LookupModeChanged(mode));
        if self.lookup_ready() {
            self.teardown_lookup();
            self.init_lookup();
        }
    }

    pub fn update_filter(&mut self, filter: ServiceFilter) {
        self.resolver.set_primary_filter(filter);
        self.emit(DiscoveryEvent::FilterChanged);
    }

    /// Register a user query; call [`update_services`] to make it take
    /// effect.
    ///
    /// [`update_services`]: ServiceDiscovery::update_services
    pub fn add_query(&mut self, spec: ServiceQuerySpec) -> QuerySubscription {
        let id = self.next_query_id;
        self.next_query_id += 1;
        let (query, subscription) = ServiceQuery::new(id, spec);
        self.resolver.add_query(query);
        subscription
    }

    pub fn remove_query(&mut self, id: u64) -> Result<()> {
        if self.resolver.remove_query(id) {
            Ok(())
        } else {
            Err(DiscoveryError::UnknownQuery(id))
        }
    }

    /// Reconcile the scanned service types with the declared user queries.
    pub fn update_services(&mut self) {
        self.resolver.update_services();
    }

    // ---- nameservers ------------------------------------------------------

    pub fn set_name_servers(&mut self, servers: Vec<NameServer>) {
        self.name_servers = servers;
        self.update_name_servers();
    }

    pub fn add_name_server(&mut self, server: NameServer) {
        self.name_servers.push(server);
        self.update_name_servers();
    }

    pub fn remove_name_server(&mut self, index: usize) {
        if index >= self.name_servers.len() {
            warn!("Ignoring out-of-range nameserver index {}", index);
            return;
        }
        self.name_servers.remove(index);
        self.update_name_servers();
    }

    pub fn clear_name_servers(&mut self) {
        self.name_servers.clear();
        self.update_name_servers();
    }

    /// Push the nameserver list to a live unicast backend; while running
    /// this also refreshes every scan immediately.
    pub fn update_name_servers(&mut self) {
        self.emit(DiscoveryEvent::NameServersChanged);
        if self.lookup_mode != LookupMode::Unicast || !self.lookup_ready() {
            return;
        }
        self.push_name_servers();
        if self.running {
            self.resolver.refresh_queries();
        }
    }

    fn push_name_servers(&mut self) {
        let configured = self.name_servers.clone();
        let Some(backend) = self.resolver.backend_mut() else {
            return;
        };
        let servers = if configured.is_empty() {
            backend.system_name_servers()
        } else {
            configured
        };
        if servers.is_empty() {
            warn!("No nameservers available, unicast queries will time out");
        }
        backend.set_name_servers(&servers);
        debug!("Pushed {} nameservers to backend", servers.len());
    }

    // ---- timers and event pumping -----------------------------------------

    fn refresh_active(&self) -> bool {
        self.running && self.lookup_ready() && self.lookup_mode == LookupMode::Unicast
    }

    /// Unicast refresh tick; inactive in multicast mode or while stopped.
    pub fn handle_refresh_tick(&mut self) {
        if self.refresh_active() {
            self.resolver.refresh_queries();
        }
    }

    pub fn set_unicast_interval(&mut self, interval: Duration) {
        self.config.unicast_lookup_interval = interval;
    }

    pub fn set_error_threshold(&mut self, threshold: u32) {
        self.config.unicast_error_threshold = threshold;
        self.resolver.set_error_threshold(threshold);
    }

    fn dispatch_lookup_event(&mut self, event: LookupEvent) {
        match event {
            LookupEvent::Results { query_id, records } => {
                self.resolver.handle_results(query_id, records);
            }
            LookupEvent::Failed { query_id, kind } => {
                self.resolver.handle_error(query_id, kind);
            }
        }
    }

    /// Synchronously drain queued link and lookup events. The async driver
    /// does this continuously; tests call it after injecting events.
    pub fn pump(&mut self) {
        loop {
            let mut drained = false;
            let link = self
                .link_rx
                .as_mut()
                .and_then(|rx| rx.try_recv().ok());
            if let Some(event) = link {
                self.dispatch_link_event(event);
                drained = true;
            }
            let lookup = self
                .lookup_rx
                .as_mut()
                .and_then(|rx| rx.try_recv().ok());
            if let Some(event) = lookup {
                self.dispatch_lookup_event(event);
                drained = true;
            }
            if !drained {
                break;
            }
        }
    }

    // ---- async driver -----------------------------------------------------

    /// Run the engine on the current task until `Shutdown` or every handle
    /// is dropped.
    pub async fn run(mut self, mut commands: mpsc::UnboundedReceiver<DiscoveryCommand>) {
        let (Some(mut link_rx), Some(mut lookup_rx)) =
            (self.link_rx.take(), self.lookup_rx.take())
        else {
            error!("Discovery engine started twice");
            return;
        };
        self.component_complete();
        let mut watchdog = tokio::time::interval(self.config.watchdog_interval);
        let mut refresh = tokio::time::interval(self.config.unicast_lookup_interval);
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    None | Some(DiscoveryCommand::Shutdown) => break,
                    Some(DiscoveryCommand::SetUnicastInterval(interval)) => {
                        self.set_unicast_interval(interval);
                        refresh = tokio::time::interval(interval);
                    }
                    Some(command) => self.apply_command(command),
                },
                Some(event) = link_rx.recv() => self.dispatch_link_event(event),
                Some(event) = lookup_rx.recv() => self.dispatch_lookup_event(event),
                _ = watchdog.tick() => self.handle_watchdog_tick(),
                _ = refresh.tick() => self.handle_refresh_tick(),
            }
        }
        self.teardown_lookup();
        self.network.close_session();
        info!("Discovery engine stopped");
    }

    fn apply_command(&mut self, command: DiscoveryCommand) {
        match command {
            DiscoveryCommand::SetRunning(running) => self.set_running(running),
            DiscoveryCommand::SetLookupMode(mode) => self.set_lookup_mode(mode),
            DiscoveryCommand::SetFilter(filter) => self.update_filter(filter),
            DiscoveryCommand::AddQuery { spec, reply } => {
                let subscription = self.add_query(spec);
                let _ = reply.send(subscription);
            }
            DiscoveryCommand::RemoveQuery(id) => {
                if let Err(e) = self.remove_query(id) {
                    warn!("{}", e);
                }
            }
            DiscoveryCommand::UpdateServices => self.update_services(),
            DiscoveryCommand::SetNameServers(servers) => self.set_name_servers(servers),
            DiscoveryCommand::AddNameServer(server) => self.add_name_server(server),
            DiscoveryCommand::RemoveNameServer(index) => self.remove_name_server(index),
            DiscoveryCommand::ClearNameServers => self.clear_name_servers(),
            DiscoveryCommand::SetErrorThreshold(threshold) => self.set_error_threshold(threshold),
            DiscoveryCommand::State { reply } => {
                let _ = reply.send(self.state());
            }
            // Handled in the select loop.
            DiscoveryCommand::SetUnicastInterval(_) | DiscoveryCommand::Shutdown => {}
        }
    }

    /// Spawn the engine task and return its command handle.
    pub fn spawn(self) -> DiscoveryHandle {
        let (commands, rx) = mpsc::unbounded_channel();
        let events = self.events.clone();
        tokio::spawn(self.run(rx));
        DiscoveryHandle { commands, events }
    }
}

/// Pick the session configuration: system default first, then any usable
/// bearer. Cellular and the like never qualify.
fn pick_configuration(configurations: &[NetworkConfiguration]) -> Option<NetworkConfiguration> {
    configurations
        .iter()
        .filter(|c| c.bearer.is_usable())
        .max_by_key(|c| c.is_default)
        .cloned()
}

/// Cloneable command-channel handle to a spawned engine.
#[derive(Clone)]
pub struct DiscoveryHandle {
    commands: mpsc::UnboundedSender<DiscoveryCommand>,
    events: broadcast::Sender<DiscoveryEvent>,
}

impl DiscoveryHandle {
    fn send(&self, command: DiscoveryCommand) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| DiscoveryError::EngineStopped)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DiscoveryEvent> {
        self.events.subscribe()
    }

    pub fn set_running(&self, running: bool) -> Result<()> {
        self.send(DiscoveryCommand::SetRunning(running))
    }

    pub fn set_lookup_mode(&self, mode: LookupMode) -> Result<()> {
        self.send(DiscoveryCommand::SetLookupMode(mode))
    }

    pub fn update_filter(&self, filter: ServiceFilter) -> Result<()> {
        self.send(DiscoveryCommand::SetFilter(filter))
    }

    pub async fn add_query(&self, spec: ServiceQuerySpec) -> Result<QuerySubscription> {
        let (reply, rx) = oneshot::channel();
        self.send(DiscoveryCommand::AddQuery { spec, reply })?;
        rx.await.map_err(|_| DiscoveryError::EngineStopped)
    }

    pub fn remove_query(&self, id: u64) -> Result<()> {
        self.send(DiscoveryCommand::RemoveQuery(id))
    }

    pub fn update_services(&self) -> Result<()> {
        self.send(DiscoveryCommand::UpdateServices)
    }

    pub fn set_name_servers(&self, servers: Vec<NameServer>) -> Result<()> {
        self.send(DiscoveryCommand::SetNameServers(servers))
    }

    pub fn add_name_server(&self, server: NameServer) -> Result<()> {
        self.send(DiscoveryCommand::AddNameServer(server))
    }

    pub fn remove_name_server(&self, index: usize) -> Result<()> {
        self.send(DiscoveryCommand::RemoveNameServer(index))
    }

    pub fn clear_name_servers(&self) -> Result<()> {
        self.send(DiscoveryCommand::ClearNameServers)
    }

    pub fn set_unicast_interval(&self, interval: Duration) -> Result<()> {
        self.send(DiscoveryCommand::SetUnicastInterval(interval))
    }

    pub fn set_error_threshold(&self, threshold: u32) -> Result<()> {
        self.send(DiscoveryCommand::SetErrorThreshold(threshold))
    }

    pub async fn state(&self) -> Result<DiscoveryState> {
        let (reply, rx) = oneshot::channel();
        self.send(DiscoveryCommand::State { reply })?;
        rx.await.map_err(|_| DiscoveryError::EngineStopped)
    }

    pub fn shutdown(&self) -> Result<()> {
        self.send(DiscoveryCommand::Shutdown)
    }
}
