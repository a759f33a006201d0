use tokio::sync::mpsc;

/// Link type of a network configuration. Only Ethernet, WLAN and Unknown are
/// acceptable for discovery sessions.
#[derive(Copy, Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Bearer {
    Ethernet,
    Wlan,
    Cellular,
    Bluetooth,
    Unknown,
}

impl Bearer {
    pub fn is_usable(&self) -> bool {
        matches!(self, Bearer::Ethernet | Bearer::Wlan | Bearer::Unknown)
    }
}

/// One network configuration reported by the platform.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct NetworkConfiguration {
    pub name: String,
    pub bearer: Bearer,
    pub is_default: bool,
}

impl NetworkConfiguration {
    pub fn new(name: &str, bearer: Bearer) -> Self {
        Self {
            name: name.to_string(),
            bearer,
            is_default: false,
        }
    }

    pub fn default_config(name: &str, bearer: Bearer) -> Self {
        Self {
            is_default: true,
            ..Self::new(name, bearer)
        }
    }
}

/// Session signals delivered by the network monitor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LinkEvent {
    SessionOpened,
    SessionClosed,
    SessionError(String),
}

/// Capability interface over the platform's link tracking.
pub trait NetworkMonitor: Send {
    /// Enumerate the currently available configurations.
    fn configurations(&mut self) -> Vec<NetworkConfiguration>;

    /// Open a session on `config`; outcomes arrive as [`LinkEvent`]s.
    fn open_session(
        &mut self,
        config: &NetworkConfiguration,
        events: mpsc::UnboundedSender<LinkEvent>,
    );

    /// Close the active session, if any.
    fn close_session(&mut self);
}

/// Monitor for hosts without platform link integration: one always-up
/// default Ethernet configuration.
#[derive(Debug, Default)]
pub struct StaticNetwork {
    events: Option<mpsc::UnboundedSender<LinkEvent>>,
}

impl StaticNetwork {
    pub fn new() -> Self {
        Self::default()
    }
}

impl NetworkMonitor for StaticNetwork {
    fn configurations(&mut self) -> Vec<NetworkConfiguration> {
        vec![NetworkConfiguration::default_config(
            "static",
            Bearer::Ethernet,
        )]
    }

    fn open_session(
        &mut self,
        _config: &NetworkConfiguration,
        events: mpsc::UnboundedSender<LinkEvent>,
    ) {
        let _ = events.send(LinkEvent::SessionOpened);
        self.events = Some(events);
    }

    fn close_session(&mut self) {
        if let Some(events) = self.events.take() {
            let _ = events.send(LinkEvent::SessionClosed);
        }
    }
}

pub mod mock {
    //! Scriptable network monitor for lifecycle tests.

    use std::sync::Arc;

    use parking_lot::Mutex;
    use tokio::sync::mpsc;

    use super::{Bearer, LinkEvent, NetworkConfiguration, NetworkMonitor};

    struct MockNetworkState {
        configurations: Vec<NetworkConfiguration>,
        opened_on: Vec<NetworkConfiguration>,
        closes: u32,
        events: Option<mpsc::UnboundedSender<LinkEvent>>,
    }

    /// Build a connected monitor/handle pair seeded with one default
    /// Ethernet configuration.
    pub fn mock_network() -> (MockNetwork, MockNetworkHandle) {
        let state = Arc::new(Mutex::new(MockNetworkState {
            configurations: vec![NetworkConfiguration::default_config("eth0", Bearer::Ethernet)],
            opened_on: Vec::new(),
            closes: 0,
            events: None,
        }));
        (
            MockNetwork {
                state: state.clone(),
            },
            MockNetworkHandle { state },
        )
    }

    pub struct MockNetwork {
        state: Arc<Mutex<MockNetworkState>>,
    }

    impl NetworkMonitor for MockNetwork {
        fn configurations(&mut self) -> Vec<NetworkConfiguration> {
            self.state.lock().configurations.clone()
        }

        fn open_session(
            &mut self,
            config: &NetworkConfiguration,
            events: mpsc::UnboundedSender<LinkEvent>,
        ) {
            let mut state = self.state.lock();
            state.opened_on.push(config.clone());
            let _ = events.send(LinkEvent::SessionOpened);
            state.events = Some(events);
        }

        fn close_session(&mut self) {
            let mut state = self.state.lock();
            state.closes += 1;
            if let Some(events) = state.events.take() {
                let _ = events.send(LinkEvent::SessionClosed);
            }
        }
    }

    #[derive(Clone)]
    pub struct MockNetworkHandle {
        state: Arc<Mutex<MockNetworkState>>,
    }

    impl MockNetworkHandle {
        /// Replace the advertised configurations.
        pub fn set_configurations(&self, configurations: Vec<NetworkConfiguration>) {
            self.state.lock().configurations = configurations;
        }

        /// Simulate the platform dropping the link.
        pub fn drop_link(&self) {
            if let Some(events) = self.state.lock().events.take() {
                let _ = events.send(LinkEvent::SessionClosed);
            }
        }

        /// Configurations sessions were opened on, in order.
        pub fn opened_on(&self) -> Vec<NetworkConfiguration> {
            self.state.lock().opened_on.clone()
        }

        pub fn close_count(&self) -> u32 {
            self.state.lock().closes
        }
    }
}
