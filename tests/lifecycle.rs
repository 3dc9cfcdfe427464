//! End-to-end lifecycle over the simulated radio: discover, connect, enable,
//! stream, disable, disconnect - driven entirely off the event bus.

use dot_sensor_host::domain::models::SensorEvent;
use dot_sensor_host::infrastructure::radio::simulated::{SimulatedRadio, SimulatedSensor};
use dot_sensor_host::service::SensorService;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

const PACKETS: usize = 24;

/// Run a service over one simulated sensor, driving the full lifecycle from
/// bus events, and return everything that was published.
async fn run_lifecycle(sensor: SimulatedSensor) -> Vec<SensorEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    let central = SimulatedRadio::new(tx.clone(), vec![sensor]);
    let mut service = SensorService::new(Box::new(central), "Xsens DOT", tx, rx);
    let handle = service.handle();

    let events: Arc<Mutex<Vec<SensorEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let collector = Arc::clone(&events);
    let driver = handle.clone();
    let samples = Arc::new(AtomicUsize::new(0));

    service.subscribe(move |event| {
        collector.lock().unwrap().push(event.clone());
        match event {
            SensorEvent::SensorDiscovered { address, .. } => driver.connect(address.clone()),
            SensorEvent::SensorConnected { address } => driver.enable(address.clone()),
            SensorEvent::SensorData(sample) => {
                if samples.fetch_add(1, Ordering::Relaxed) + 1 == PACKETS {
                    driver.disable(sample.address.clone());
                }
            }
            SensorEvent::SensorDisabled { address } => driver.disconnect(address.clone()),
            SensorEvent::SensorDisconnected { .. } => driver.shutdown(),
            _ => {}
        }
    });

    handle.start_scan();
    timeout(Duration::from_secs(5), service.run())
        .await
        .expect("service loop did not shut down");

    Arc::try_unwrap(events).unwrap().into_inner().unwrap()
}

fn position(events: &[SensorEvent], predicate: impl Fn(&SensorEvent) -> bool) -> usize {
    events
        .iter()
        .position(predicate)
        .unwrap_or_else(|| panic!("expected event not published in {events:#?}"))
}

#[tokio::test]
async fn full_lifecycle_publishes_events_in_order() {
    let events = run_lifecycle(SimulatedSensor {
        address: "d4:22:cd:aa:bb:01".into(),
        // Start just below the 32-bit ceiling so the stream crosses a
        // rollover mid-flight.
        start_tick: u32::MAX - 200_000,
        tick_interval_us: 16_667,
        packet_count: PACKETS,
    })
    .await;

    assert_eq!(events[0], SensorEvent::PoweredOn);
    assert_eq!(events[1], SensorEvent::ScanningStarted);

    let discovered = position(&events, |e| {
        matches!(e, SensorEvent::SensorDiscovered { address, .. } if address == "d4:22:cd:aa:bb:01")
    });
    let connected = position(&events, |e| {
        matches!(e, SensorEvent::SensorConnected { .. })
    });
    let enabled = position(&events, |e| matches!(e, SensorEvent::SensorEnabled { .. }));
    let first_data = position(&events, |e| matches!(e, SensorEvent::SensorData(_)));
    let disabled = position(&events, |e| matches!(e, SensorEvent::SensorDisabled { .. }));
    let disconnected = position(&events, |e| {
        matches!(e, SensorEvent::SensorDisconnected { .. })
    });

    assert!(discovered < connected);
    assert!(connected < enabled);
    assert!(enabled < first_data);
    assert!(first_data < disabled);
    assert!(disabled < disconnected);

    assert!(!events
        .iter()
        .any(|e| matches!(e, SensorEvent::SensorError { .. })));
}

#[tokio::test]
async fn streamed_timestamps_never_decrease_across_rollover() {
    let events = run_lifecycle(SimulatedSensor {
        address: "d4:22:cd:aa:bb:02".into(),
        start_tick: u32::MAX - 200_000,
        tick_interval_us: 16_667,
        packet_count: PACKETS,
    })
    .await;

    let timestamps: Vec<f64> = events
        .iter()
        .filter_map(|e| match e {
            SensorEvent::SensorData(sample) => Some(sample.timestamp),
            _ => None,
        })
        .collect();

    assert_eq!(timestamps.len(), PACKETS);
    for window in timestamps.windows(2) {
        assert!(
            window[1] >= window[0],
            "timestamp regressed: {} -> {}",
            window[0],
            window[1]
        );
    }
}

#[tokio::test]
async fn anonymous_sensors_get_synthesized_addresses() {
    let events = run_lifecycle(SimulatedSensor {
        address: String::new(),
        start_tick: 0,
        tick_interval_us: 16_667,
        packet_count: PACKETS,
    })
    .await;

    // First synthesized address of a fresh registry.
    assert!(events.iter().any(|e| {
        matches!(e, SensorEvent::SensorDiscovered { address, name } if address == "0" && name == "Xsens DOT")
    }));
    assert!(events
        .iter()
        .any(|e| matches!(e, SensorEvent::SensorDisconnected { address } if address == "0")));
}
