/// Integration tests for the connection supervision state machine
///
/// Walks full outage scenarios through the machine: transient drops,
/// heartbeat-detected death, budget exhaustion and manual recovery.

use std::time::{Duration, Instant};

use voicelink::supervisor::{
    ConnectionAction, ConnectionEvent, ConnectionState, ConnectionSupervisor,
};

#[test]
fn test_transient_outage_recovery() {
    println!("\n=== Transient Outage Recovery Test ===");

    let mut sup = ConnectionSupervisor::default();

    // Initial connect.
    let actions = sup.handle(ConnectionEvent::Connect);
    assert_eq!(actions, vec![ConnectionAction::OpenTransport]);
    sup.handle(ConnectionEvent::TransportUp(Instant::now()));
    assert_eq!(sup.state(), ConnectionState::Connected);
    println!("  Connected");

    // The link drops once.
    let actions = sup.handle(ConnectionEvent::TransportDown);
    assert_eq!(
        actions,
        vec![ConnectionAction::ScheduleRetry(Duration::from_millis(1000))]
    );
    println!("  Dropped, retry in 1000ms");

    // Retry fires and the link comes back.
    let actions = sup.handle(ConnectionEvent::RetryDelayElapsed);
    assert_eq!(
        actions,
        vec![
            ConnectionAction::TeardownTransport,
            ConnectionAction::OpenTransport
        ]
    );
    sup.handle(ConnectionEvent::TransportUp(Instant::now()));

    assert_eq!(sup.state(), ConnectionState::Connected);
    assert_eq!(sup.attempts(), 0);

    println!("\n✓ Single outage recovered, attempt budget restored");
}

#[test]
fn test_heartbeat_detected_death() {
    println!("\n=== Heartbeat Death Detection Test ===");

    let mut sup = ConnectionSupervisor::default();
    let start = Instant::now();
    sup.handle(ConnectionEvent::Connect);
    sup.handle(ConnectionEvent::TransportUp(start));

    // Probes go out while acks keep coming.
    let mut now = start;
    for _ in 0..3 {
        now += Duration::from_millis(2000);
        let actions = sup.handle(ConnectionEvent::HeartbeatTick(now));
        assert_eq!(actions, vec![ConnectionAction::SendProbe]);
        sup.handle(ConnectionEvent::HeartbeatAck(now));
    }
    println!("  3 probe/ack cycles completed");

    // Acks stop; the next tick past the timeout reconnects.
    now += Duration::from_millis(5001);
    let actions = sup.handle(ConnectionEvent::HeartbeatTick(now));
    assert_eq!(
        actions,
        vec![ConnectionAction::ScheduleRetry(Duration::from_millis(1000))]
    );
    assert_eq!(sup.state(), ConnectionState::ReconnectPending);
    println!("  Silence detected, reconnect scheduled");

    // Further ticks while pending stay quiet.
    now += Duration::from_millis(2000);
    assert!(sup.handle(ConnectionEvent::HeartbeatTick(now)).is_empty());

    println!("\n✓ Stale link detected exactly once");
}

#[test]
fn test_exhaustion_and_manual_recovery() {
    println!("\n=== Exhaustion and Manual Recovery Test ===");

    let mut sup = ConnectionSupervisor::default();
    sup.handle(ConnectionEvent::Connect);

    // Every attempt fails.
    for attempt in 1..=5 {
        let actions = sup.handle(ConnectionEvent::TransportError);
        println!("  Attempt {}: {:?}", attempt, actions);
        assert!(matches!(
            actions.as_slice(),
            [ConnectionAction::ScheduleRetry(_)]
        ));
        sup.handle(ConnectionEvent::RetryDelayElapsed);
    }

    // The sixth failure is terminal, reported once.
    let actions = sup.handle(ConnectionEvent::TransportError);
    assert_eq!(actions, vec![ConnectionAction::ReportTerminalFailure]);
    assert!(sup.handle(ConnectionEvent::TransportError).is_empty());
    println!("  Terminal failure reported once");

    // Only an explicit connect gets things moving again.
    let actions = sup.handle(ConnectionEvent::Connect);
    assert_eq!(actions, vec![ConnectionAction::OpenTransport]);
    sup.handle(ConnectionEvent::TransportUp(Instant::now()));
    assert_eq!(sup.state(), ConnectionState::Connected);

    println!("\n✓ Budget exhaustion requires explicit reconnect");
}

#[test]
fn test_events_from_dying_link_are_absorbed() {
    println!("\n=== Dying Link Event Absorption Test ===");

    let mut sup = ConnectionSupervisor::default();
    sup.handle(ConnectionEvent::Connect);
    sup.handle(ConnectionEvent::TransportUp(Instant::now()));

    sup.handle(ConnectionEvent::TransportDown);
    assert_eq!(sup.attempts(), 1);

    // The dying transport keeps complaining; none of it consumes budget.
    for _ in 0..4 {
        assert!(sup.handle(ConnectionEvent::TransportError).is_empty());
        assert!(sup.handle(ConnectionEvent::TransportDown).is_empty());
    }
    assert_eq!(sup.attempts(), 1);
    assert_eq!(sup.state(), ConnectionState::ReconnectPending);

    println!("\n✓ One outage, one retry, regardless of event noise");
}
