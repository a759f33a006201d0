mod common;

use common::{HTTP, harness, harness_with_config};
use huginn::config::DiscoveryConfig;
use huginn::dns::{AnswerRecord, LookupMode, NameServer, RecordType};

fn unicast_config() -> DiscoveryConfig {
    DiscoveryConfig {
        lookup_mode: LookupMode::Unicast,
        ..DiscoveryConfig::default()
    }
}

#[test]
fn silent_instances_age_out_after_threshold() {
    let mut h = harness_with_config(unicast_config());
    let subscription = h.start_browsing(HTTP);

    h.resolve(HTTP, "a", "a.local", 80, "192.0.2.1", &[]);
    h.resolve(HTTP, "b", "b.local", 80, "192.0.2.2", &[]);
    assert_eq!(subscription.snapshot().len(), 2);

    // Three refresh cycles in which only A re-responds.
    for cycle in 1..=3 {
        h.engine.handle_refresh_tick();
        h.resolve(HTTP, "a", "a.local", 80, "192.0.2.1", &[]);
        assert_eq!(
            h.engine.resolver().instances_for(HTTP).len(),
            2,
            "B survives through cycle {}",
            cycle
        );
    }

    // The next purge sees B's third consecutive miss, exceeding the
    // threshold of 2.
    h.engine.handle_refresh_tick();
    let names: Vec<String> = h
        .engine
        .resolver()
        .instances_for(HTTP)
        .iter()
        .map(|i| i.name.clone())
        .collect();
    assert_eq!(names, vec!["a".to_string()]);
    assert_eq!(h.engine.resolver().get_item("a", HTTP).unwrap().error_count, 0);
    let resolved: Vec<String> = subscription.snapshot().iter().map(|i| i.name.clone()).collect();
    assert_eq!(resolved, vec!["a".to_string()]);
}

#[test]
fn responding_instance_resets_its_error_count() {
    let mut h = harness_with_config(unicast_config());
    let _subscription = h.start_browsing(HTTP);
    h.resolve(HTTP, "a", "a.local", 80, "192.0.2.1", &[]);

    // Miss two cycles, then come back.
    h.engine.handle_refresh_tick();
    h.engine.handle_refresh_tick();
    assert_eq!(h.engine.resolver().get_item("a", HTTP).unwrap().error_count, 1);

    h.resolve(HTTP, "a", "a.local", 80, "192.0.2.1", &[]);
    assert_eq!(h.engine.resolver().get_item("a", HTTP).unwrap().error_count, 0);
}

#[test]
fn refresh_restarts_the_ptr_scan() {
    let mut h = harness_with_config(unicast_config());
    let _subscription = h.start_browsing(HTTP);
    let first = h.lookup.query_id(HTTP, RecordType::Ptr).unwrap();

    h.engine.handle_refresh_tick();
    let second = h.lookup.query_id(HTTP, RecordType::Ptr).unwrap();
    assert!(h.lookup.is_cancelled(first));
    assert_ne!(first, second);
}

#[test]
fn stalled_partial_resolution_is_purged_and_reacquired() {
    let mut h = harness_with_config(unicast_config());
    let subscription = h.start_browsing(HTTP);
    let full = format!("ghost.{}", HTTP);

    // TXT answers but SRV never does, so the instance never re-arms its
    // updated flag and ages out like a silent one.
    h.announce(HTTP, "ghost", 120);
    let txt = h.lookup.query_id(&full, RecordType::Txt).unwrap();
    h.lookup
        .push_results(txt, vec![AnswerRecord::txt(&full, ["k=v"], 120)]);
    h.engine.pump();
    let srv = h.lookup.query_id(&full, RecordType::Srv).unwrap();

    for _ in 0..3 {
        h.engine.handle_refresh_tick();
    }
    assert!(h.engine.resolver().instances_for(HTTP).is_empty());
    assert!(h.lookup.is_cancelled(srv), "removal cancels the stalled SRV");

    // The next announcement re-adds and fully resolves it.
    h.resolve(HTTP, "ghost", "ghost.local", 80, "192.0.2.9", &["k=v"]);
    assert_eq!(subscription.snapshot().len(), 1);
}

#[test]
fn purge_is_inactive_in_multicast_mode() {
    let mut h = harness();
    let subscription = h.start_browsing(HTTP);
    h.resolve(HTTP, "a", "a.local", 80, "192.0.2.1", &[]);

    for _ in 0..5 {
        h.engine.handle_refresh_tick();
    }
    assert_eq!(subscription.snapshot().len(), 1);
    assert_eq!(h.engine.resolver().get_item("a", HTTP).unwrap().error_count, 0);
}

#[test]
fn configured_name_servers_are_pushed_on_unicast_init() {
    let ns: NameServer = "192.0.2.53:53".parse().unwrap();
    let mut config = unicast_config();
    config.name_servers = vec![ns];
    let mut h = harness_with_config(config);
    let _subscription = h.start_browsing(HTTP);
    assert_eq!(h.lookup.name_servers(), vec![ns]);
}

#[test]
fn empty_name_server_list_falls_back_to_system() {
    let system: NameServer = "192.0.2.2:53".parse().unwrap();
    let mut h = harness_with_config(unicast_config());
    h.lookup.set_system_name_servers(vec![system]);
    let _subscription = h.start_browsing(HTTP);
    assert_eq!(h.lookup.name_servers(), vec![system]);
}

#[test]
fn name_server_change_while_running_refreshes_immediately() {
    let mut h = harness_with_config(unicast_config());
    let _subscription = h.start_browsing(HTTP);
    let first = h.lookup.query_id(HTTP, RecordType::Ptr).unwrap();

    let ns: NameServer = "192.0.2.77".parse().unwrap();
    h.engine.set_name_servers(vec![ns]);

    assert_eq!(h.lookup.name_servers(), vec![ns]);
    assert!(h.lookup.is_cancelled(first));
    assert!(h.lookup.query_id(HTTP, RecordType::Ptr).is_some());

    h.engine.clear_name_servers();
    assert!(h.lookup.name_servers().is_empty());
}

#[test]
fn name_server_changes_are_ignored_in_multicast() {
    let mut h = harness();
    let _subscription = h.start_browsing(HTTP);
    let first = h.lookup.query_id(HTTP, RecordType::Ptr).unwrap();

    h.engine.add_name_server("192.0.2.77".parse().unwrap());
    assert!(h.lookup.name_servers().is_empty(), "nothing pushed");
    assert!(!h.lookup.is_cancelled(first), "no refresh triggered");
}
