mod common;

use common::{HTTP, harness, harness_with_config};
use huginn::config::DiscoveryConfig;
use huginn::dns::{LookupMode, NameServer, RecordType};
use huginn::network::{Bearer, NetworkConfiguration};

#[test]
fn sessions_open_only_on_usable_bearers() {
    let mut h = harness();
    h.network.set_configurations(vec![
        NetworkConfiguration::new("wwan0", Bearer::Cellular),
        NetworkConfiguration::new("bt0", Bearer::Bluetooth),
    ]);
    let _subscription = h.start_browsing(HTTP);
    assert!(!h.engine.network_ready());
    assert!(h.network.opened_on().is_empty());

    // A usable bearer appears; the watchdog picks it up.
    h.network.set_configurations(vec![
        NetworkConfiguration::new("wwan0", Bearer::Cellular),
        NetworkConfiguration::new("wlan0", Bearer::Wlan),
    ]);
    h.engine.handle_watchdog_tick();
    h.engine.pump();
    assert!(h.engine.network_ready());
    assert_eq!(h.network.opened_on()[0].name, "wlan0");
}

#[test]
fn default_configuration_is_preferred() {
    let mut h = harness();
    h.network.set_configurations(vec![
        NetworkConfiguration::new("eth1", Bearer::Ethernet),
        NetworkConfiguration::default_config("eth0", Bearer::Ethernet),
    ]);
    let _subscription = h.start_browsing(HTTP);
    assert_eq!(h.network.opened_on()[0].name, "eth0");
}

#[test]
fn link_loss_flushes_everything_and_recovers() {
    let mut h = harness();
    let subscription = h.start_browsing(HTTP);
    h.resolve(HTTP, "myprinter", "printer.local", 631, "192.0.2.5", &[]);
    assert_eq!(subscription.snapshot().len(), 1);

    h.network.drop_link();
    h.engine.pump();
    assert!(!h.engine.network_ready());
    assert!(!h.engine.lookup_ready());
    assert!(h.engine.resolver().registry().is_empty());
    assert!(h.engine.resolver().instances_for(HTTP).is_empty());
    assert!(subscription.snapshot().is_empty());
    assert_eq!(h.lookup.shutdown_count(), 1);

    // Watchdog brings it back up; the scan re-arms and discovery resumes.
    h.engine.handle_watchdog_tick();
    h.engine.pump();
    assert!(h.engine.network_ready());
    assert!(h.engine.lookup_ready());
    h.resolve(HTTP, "myprinter", "printer.local", 631, "192.0.2.5", &[]);
    assert_eq!(subscription.snapshot().len(), 1);
}

#[test]
fn init_failure_resets_network_ready_for_retry() {
    let mut h = harness();
    h.lookup.fail_next_init();
    let _subscription = h.start_browsing(HTTP);

    assert!(!h.engine.network_ready());
    assert!(!h.engine.lookup_ready());
    assert_eq!(h.network.close_count(), 1);

    h.engine.handle_watchdog_tick();
    h.engine.pump();
    assert!(h.engine.network_ready());
    assert!(h.engine.lookup_ready());
    assert_eq!(h.lookup.init_modes(), vec![LookupMode::Multicast]);
}

#[test]
fn mode_flip_while_running_rebuilds_the_backend() {
    let ns: NameServer = "192.0.2.53".parse().unwrap();
    let mut config = DiscoveryConfig::default();
    config.name_servers = vec![ns];
    let mut h = harness_with_config(config);
    let subscription = h.start_browsing(HTTP);
    h.resolve(HTTP, "myprinter", "printer.local", 631, "192.0.2.5", &[]);
    assert_eq!(subscription.snapshot().len(), 1);

    h.engine.set_lookup_mode(LookupMode::Unicast);

    // Old backend torn down, tables emptied during the transition.
    assert_eq!(h.lookup.shutdown_count(), 1);
    assert_eq!(
        h.lookup.init_modes(),
        vec![LookupMode::Multicast, LookupMode::Unicast]
    );
    assert!(subscription.snapshot().is_empty());
    assert!(h.engine.resolver().instances_for(HTTP).is_empty());

    // New backend got the nameservers and a fresh PTR scan.
    assert_eq!(h.lookup.name_servers(), vec![ns]);
    let ptr = h.lookup.query_id(HTTP, RecordType::Ptr);
    assert!(ptr.is_some());

    // The unicast refresh cycle is armed: a tick re-queries the type.
    h.engine.handle_refresh_tick();
    let refreshed = h.lookup.query_id(HTTP, RecordType::Ptr).unwrap();
    assert!(h.lookup.is_cancelled(ptr.unwrap()));
    assert_ne!(refreshed, ptr.unwrap());

    // Discovery still works end to end in the new mode.
    h.resolve(HTTP, "myprinter", "printer.local", 631, "192.0.2.5", &[]);
    assert_eq!(subscription.snapshot().len(), 1);
}

#[test]
fn setting_the_same_mode_is_a_no_op() {
    let mut h = harness();
    let _subscription = h.start_browsing(HTTP);
    h.engine.set_lookup_mode(LookupMode::Multicast);
    assert_eq!(h.lookup.shutdown_count(), 0);
    assert_eq!(h.lookup.init_modes(), vec![LookupMode::Multicast]);
}

#[test]
fn stopping_cancels_queries_but_keeps_results() {
    let mut h = harness();
    let subscription = h.start_browsing(HTTP);
    h.resolve(HTTP, "myprinter", "printer.local", 631, "192.0.2.5", &[]);

    h.engine.set_running(false);
    assert!(h.lookup.active_queries().is_empty());
    assert!(h.engine.resolver().registry().is_empty());
    // Resolved results stay visible while stopped.
    assert_eq!(subscription.snapshot().len(), 1);

    h.engine.set_running(true);
    assert!(h.lookup.query_id(HTTP, RecordType::Ptr).is_some());
}

#[test]
fn running_toggle_is_idempotent() {
    let mut h = harness();
    let _subscription = h.start_browsing(HTTP);
    let started = h.lookup.started_queries().len();
    h.engine.set_running(true);
    h.engine.set_running(true);
    assert_eq!(h.lookup.started_queries().len(), started);
}

#[test]
fn update_services_twice_changes_nothing() {
    let mut h = harness();
    let subscription = h.start_browsing(HTTP);
    h.resolve(HTTP, "myprinter", "printer.local", 631, "192.0.2.5", &[]);

    let started = h.lookup.started_queries().len();
    h.engine.update_services();
    let first = subscription.snapshot();
    h.engine.update_services();
    let second = subscription.snapshot();

    assert_eq!(h.lookup.started_queries().len(), started);
    assert_eq!(first, second);
    assert_eq!(first.len(), 1);
}

#[test]
fn queries_declared_before_link_up_start_later() {
    let mut h = harness();
    h.network.set_configurations(vec![]);
    let subscription = h.start_browsing(HTTP);
    assert!(h.lookup.started_queries().is_empty());

    h.network
        .set_configurations(vec![NetworkConfiguration::default_config(
            "eth0",
            Bearer::Ethernet,
        )]);
    h.engine.handle_watchdog_tick();
    h.engine.pump();

    assert!(h.lookup.query_id(HTTP, RecordType::Ptr).is_some());
    h.resolve(HTTP, "myprinter", "printer.local", 631, "192.0.2.5", &[]);
    assert_eq!(subscription.snapshot().len(), 1);
}
