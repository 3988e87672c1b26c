//! End-to-end: scripted peer → worker → control loop → command slot → peer.

mod common;

use std::{thread, time::Duration};

use agrisense::{
    ConnectionState, ControlMode, Event, Monitor, Severity, StatusDetail, TransportError,
    ingest::codec::SensorChannel,
};
use common::{NODE, Script, ScriptedTransport, collect_until, eventually, fast_config, lifecycle_names};

fn streaming_monitor(script: &Script) -> (Monitor<ScriptedTransport>, agrisense::EventReceiver) {
    let mut monitor = Monitor::new(script.transport(), &fast_config()).unwrap();
    let events = monitor.events();
    monitor.start_worker().unwrap();
    monitor.connect(NODE).unwrap();
    let seen = collect_until(&events, |e| matches!(e, Event::Lifecycle(s) if s.is_streaming()));
    assert_eq!(
        lifecycle_names(&seen),
        vec!["Idle", "Discovered", "Connecting", "Connected", "Subscribing", "Streaming"]
    );
    (monitor, events)
}

#[test]
fn dark_then_bright_then_brighter() {
    let script = Script::default();
    let (monitor, _events) = streaming_monitor(&script);
    assert_eq!(script.subscriptions(), 4);

    script.notify_reading(SensorChannel::Light, 90.0);
    assert!(eventually(|| script.writes() == vec![80]));

    script.notify_reading(SensorChannel::Light, 200.0);
    assert!(eventually(|| script.writes() == vec![80, 20]));

    script.notify_reading(SensorChannel::Light, 210.0);
    assert!(eventually(|| monitor.metrics().readings == 3));
    thread::sleep(Duration::from_millis(50));
    assert_eq!(script.writes(), vec![80, 20]);
    assert_eq!(monitor.metrics().commands_issued, 2);
}

#[test]
fn other_channels_never_drive_the_light() {
    let script = Script::default();
    let (monitor, events) = streaming_monitor(&script);

    script.notify_reading(SensorChannel::Temperature, 21.5);
    script.notify_reading(SensorChannel::Humidity, 48.0);
    script.notify_reading(SensorChannel::Moisture, 1800.0);

    let seen = collect_until(&events, |e| {
        matches!(e, Event::SensorUpdate(r) if r.channel == SensorChannel::Moisture)
    });
    let channels: Vec<SensorChannel> = seen
        .iter()
        .filter_map(|e| match e {
            Event::SensorUpdate(r) => Some(r.channel),
            _ => None,
        })
        .collect();
    assert_eq!(
        channels,
        vec![SensorChannel::Temperature, SensorChannel::Humidity, SensorChannel::Moisture]
    );
    assert!(script.writes().is_empty());
    assert_eq!(monitor.metrics().commands_issued, 0);
}

#[test]
fn bad_payloads_are_counted_and_dropped() {
    let script = Script::default();
    let (monitor, _events) = streaming_monitor(&script);

    script.notify(SensorChannel::Light.characteristic(), vec![1, 2]);
    script.notify(uuid::Uuid::from_u128(0xdead_beef), vec![0; 4]);
    script.notify_reading(SensorChannel::Light, 90.0);

    assert!(eventually(|| script.writes() == vec![80]));
    let m = monitor.metrics();
    assert_eq!(m.decode_errors, 1);
    assert_eq!(m.unknown_characteristics, 1);
    assert_eq!(m.notifications, 3);
    assert_eq!(m.readings, 1);
}

#[test]
fn disconnect_then_write_is_dropped_until_reconnect() {
    let script = Script::default();
    let (mut monitor, events) = streaming_monitor(&script);

    monitor.disconnect().unwrap();
    let seen = collect_until(&events, |e| *e == Event::Lifecycle(ConnectionState::Idle));
    assert_eq!(lifecycle_names(&seen), vec!["Disconnecting", "Idle"]);
    assert!(!script.is_open());

    monitor.set_mode(ControlMode::Manual).unwrap();
    monitor.apply_manual_brightness().unwrap();
    let seen = collect_until(&events, |e| {
        matches!(e, Event::Status(s) if s.text.starts_with("Not connected"))
    });
    assert!(matches!(
        seen.last(),
        Some(Event::Status(s)) if s.severity == Severity::Warn && s.detail == StatusDetail::Note
    ));
    assert!(script.writes().is_empty());

    monitor.connect(NODE).unwrap();
    collect_until(&events, |e| matches!(e, Event::Lifecycle(s) if s.is_streaming()));
    monitor.set_manual_brightness(45).unwrap();
    monitor.apply_manual_brightness().unwrap();
    assert!(eventually(|| script.writes() == vec![45]));
}

#[test]
fn link_loss_fails_session_and_clears_memo() {
    let script = Script::default();
    let (monitor, events) = streaming_monitor(&script);

    script.notify_reading(SensorChannel::Light, 90.0);
    assert!(eventually(|| script.writes() == vec![80]));

    script.lose_link(true);
    let seen = collect_until(&events, |e| matches!(e, Event::Status(s) if s.severity == Severity::Error));
    assert!(seen.iter().any(|e| matches!(
        e,
        Event::Lifecycle(ConnectionState::Failed(TransportError::LinkLost(_)))
    )));

    monitor.disconnect().unwrap();
    collect_until(&events, |e| *e == Event::Lifecycle(ConnectionState::Idle));
    monitor.connect(NODE).unwrap();
    collect_until(&events, |e| matches!(e, Event::Lifecycle(s) if s.is_streaming()));

    // Same target as before the failure, but the memo was cleared.
    script.notify_reading(SensorChannel::Light, 90.0);
    assert!(eventually(|| script.writes() == vec![80, 80]));
}

#[test]
fn write_failure_moves_session_to_failed() {
    let script = Script::default();
    let (monitor, events) = streaming_monitor(&script);

    script.fail_write(true);
    script.notify_reading(SensorChannel::Light, 90.0);

    let seen = collect_until(&events, |e| matches!(e, Event::Status(s) if s.severity == Severity::Error));
    assert!(seen.iter().any(|e| matches!(
        e,
        Event::Lifecycle(ConnectionState::Failed(TransportError::WriteFailed(_)))
    )));
    assert!(eventually(|| monitor.metrics().writes_failed == 1));
}

#[test]
fn connect_failure_is_reported_not_returned() {
    let script = Script::default();
    script.fail_connect(true);
    let mut monitor = Monitor::new(script.transport(), &fast_config()).unwrap();
    let events = monitor.events();
    monitor.start_worker().unwrap();

    assert!(monitor.connect(NODE).is_ok());
    let seen = collect_until(&events, |e| matches!(e, Event::Status(s) if s.severity == Severity::Error));
    assert_eq!(lifecycle_names(&seen), vec!["Idle", "Discovered", "Connecting", "Failed"]);
}

#[test]
fn subscribe_failure_keeps_handle_until_disconnect() {
    let script = Script::default();
    script.fail_subscribe(true);
    let mut monitor = Monitor::new(script.transport(), &fast_config()).unwrap();
    let events = monitor.events();
    monitor.start_worker().unwrap();
    monitor.connect(NODE).unwrap();

    let seen = collect_until(&events, |e| matches!(e, Event::Status(s) if s.severity == Severity::Error));
    assert_eq!(
        lifecycle_names(&seen),
        vec!["Idle", "Discovered", "Connecting", "Connected", "Subscribing", "Failed"]
    );
    assert!(seen.iter().any(|e| matches!(
        e,
        Event::Lifecycle(ConnectionState::Failed(TransportError::SubscribeFailed(_)))
    )));
    assert!(script.is_open());

    monitor.disconnect().unwrap();
    collect_until(&events, |e| *e == Event::Lifecycle(ConnectionState::Idle));
    assert!(eventually(|| !script.is_open()));

    script.fail_subscribe(false);
    monitor.connect(NODE).unwrap();
    let seen = collect_until(&events, |e| matches!(e, Event::Lifecycle(s) if s.is_streaming()));
    assert!(matches!(seen.last(), Some(Event::Lifecycle(s)) if s.is_streaming()));
    assert_eq!(script.subscriptions(), 4);
}

#[test]
fn disconnect_while_idle_reannounces_idle() {
    let script = Script::default();
    let mut monitor = Monitor::new(script.transport(), &fast_config()).unwrap();
    let events = monitor.events();
    monitor.start_worker().unwrap();
    collect_until(&events, |e| *e == Event::Lifecycle(ConnectionState::Idle));

    monitor.disconnect().unwrap();
    let seen = collect_until(&events, |e| matches!(e, Event::Lifecycle(_)));
    assert_eq!(lifecycle_names(&seen), vec!["Idle"]);
    assert!(!script.is_open());
}
