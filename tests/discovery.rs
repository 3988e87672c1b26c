//! Scan behaviour through the facade.

mod common;

use agrisense::{ConnectionState, Event, Monitor, PeerDescriptor, Severity, StatusDetail, TransportError};
use common::{NODE, Script, collect_until, fast_config, lifecycle_names};

fn scan_result(events: &agrisense::EventReceiver) -> (Severity, Vec<PeerDescriptor>) {
    let seen = collect_until(events, |e| {
        matches!(e, Event::Status(s) if matches!(s.detail, StatusDetail::ScanComplete(_)))
    });
    match seen.last() {
        Some(Event::Status(s)) => match &s.detail {
            StatusDetail::ScanComplete(found) => (s.severity, found.clone()),
            _ => panic!("unexpected status {:?}", s),
        },
        other => panic!("no scan result, last event {:?}", other),
    }
}

#[test]
fn scan_orders_by_signal_and_dedups() {
    let script = Script::with_peers(vec![
        PeerDescriptor::new("far", "00:00:01", Some(-90)),
        PeerDescriptor::new("near", "00:00:02", Some(-40)),
        PeerDescriptor::new("far", "00:00:01", Some(-90)),
        PeerDescriptor::new("", "00:00:03", None),
    ]);
    let mut monitor = Monitor::new(script.transport(), &fast_config()).unwrap();
    let events = monitor.events();
    monitor.start_worker().unwrap();
    monitor.scan().unwrap();

    let (severity, found) = scan_result(&events);
    assert_eq!(severity, Severity::Ok);
    let addresses: Vec<&str> = found.iter().map(|p| p.address.as_str()).collect();
    assert_eq!(addresses, vec!["00:00:02", "00:00:01", "00:00:03"]);
}

#[test]
fn empty_scan_warns_and_stays_idle() {
    let script = Script::default();
    let mut monitor = Monitor::new(script.transport(), &fast_config()).unwrap();
    let events = monitor.events();
    monitor.start_worker().unwrap();
    monitor.scan().unwrap();

    let (severity, found) = scan_result(&events);
    assert_eq!(severity, Severity::Warn);
    assert!(found.is_empty());

    // Still idle: connecting is allowed straight away.
    monitor.connect(NODE).unwrap();
    let seen = collect_until(&events, |e| matches!(e, Event::Lifecycle(s) if s.is_streaming()));
    assert!(!seen.is_empty());
}

#[test]
fn scan_failure_needs_disconnect_before_next_scan() {
    let script = Script::with_peers(vec![PeerDescriptor::new("node", NODE, Some(-50))]);
    script.fail_scan(true);
    let mut monitor = Monitor::new(script.transport(), &fast_config()).unwrap();
    let events = monitor.events();
    monitor.start_worker().unwrap();
    monitor.scan().unwrap();

    let seen = collect_until(&events, |e| matches!(e, Event::Status(s) if s.severity == Severity::Error));
    assert_eq!(lifecycle_names(&seen), vec!["Idle", "Scanning", "Failed"]);
    assert!(seen.iter().any(|e| matches!(
        e,
        Event::Lifecycle(ConnectionState::Failed(TransportError::ScanFailed(_)))
    )));
    assert!(matches!(
        seen.last(),
        Some(Event::Status(s)) if matches!(s.detail, StatusDetail::Failure(TransportError::ScanFailed(_)))
    ));

    // Failed rejects a new scan with a warning until the session is reset.
    monitor.scan().unwrap();
    let seen = collect_until(&events, |e| matches!(e, Event::Status(s) if s.severity == Severity::Warn));
    assert!(lifecycle_names(&seen).is_empty());

    monitor.disconnect().unwrap();
    let seen = collect_until(&events, |e| *e == Event::Lifecycle(ConnectionState::Idle));
    assert_eq!(lifecycle_names(&seen), vec!["Disconnecting", "Idle"]);

    script.fail_scan(false);
    monitor.scan().unwrap();
    let (severity, found) = scan_result(&events);
    assert_eq!(severity, Severity::Ok);
    assert_eq!(found.len(), 1);
}
