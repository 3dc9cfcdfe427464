use dot_sensor_host::domain::models::SensorEvent;
use dot_sensor_host::domain::settings::SettingsService;
use dot_sensor_host::infrastructure::logging;
use dot_sensor_host::infrastructure::radio::simulated::{SimulatedRadio, SimulatedSensor};
use dot_sensor_host::service::SensorService;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::info;

/// Samples to stream per sensor before the demo disables it again.
const SAMPLES_PER_SENSOR: usize = 32;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let settings = SettingsService::load();
    let _logging_guard = logging::init_logger(&settings.get().log_settings)?;
    info!("starting dot-sensor-host (simulated radio)");

    let (tx, rx) = mpsc::unbounded_channel();
    let sensors = vec![
        SimulatedSensor {
            packet_count: SAMPLES_PER_SENSOR,
            ..Default::default()
        },
        // No advertised address: the registry synthesizes one. The tick
        // counter starts just below the 32-bit ceiling to show rollover.
        SimulatedSensor {
            address: String::new(),
            start_tick: u32::MAX - 50_000,
            packet_count: SAMPLES_PER_SENSOR,
            ..Default::default()
        },
    ];
    let sensor_count = sensors.len();

    let central = SimulatedRadio::new(tx.clone(), sensors);
    let mut service = SensorService::new(
        Box::new(central),
        settings.get().sensor_name.clone(),
        tx,
        rx,
    );
    let handle = service.handle();

    // Drive the whole lifecycle off the bus: discover -> connect -> enable,
    // stream a few samples, then disable -> disconnect, and shut down once
    // every sensor has finished.
    let driver = handle.clone();
    let samples: Arc<Mutex<HashMap<String, usize>>> = Arc::new(Mutex::new(HashMap::new()));
    let finished = Arc::new(AtomicUsize::new(0));
    service.subscribe(move |event| match event {
        SensorEvent::SensorDiscovered { address, name } => {
            info!(%address, %name, "discovered, connecting");
            driver.connect(address.clone());
        }
        SensorEvent::SensorConnected { address } => {
            info!(%address, "connected, enabling streaming");
            driver.enable(address.clone());
        }
        SensorEvent::SensorData(sample) => {
            let mut samples = samples.lock().unwrap();
            let n = samples.entry(sample.address.clone()).or_insert(0);
            *n += 1;
            if *n % 16 == 0 {
                info!(
                    address = %sample.address,
                    timestamp_us = sample.timestamp,
                    q_w = f64::from(sample.q_w),
                    q_z = f64::from(sample.q_z),
                    "orientation sample"
                );
            }
            if *n == SAMPLES_PER_SENSOR {
                driver.disable(sample.address.clone());
            }
        }
        SensorEvent::SensorDisabled { address } => {
            info!(%address, "streaming disabled, disconnecting");
            driver.disconnect(address.clone());
        }
        SensorEvent::SensorDisconnected { address } => {
            info!(%address, "disconnected");
            if finished.fetch_add(1, Ordering::Relaxed) + 1 == sensor_count {
                driver.stop_scan();
                driver.shutdown();
            }
        }
        SensorEvent::SensorError { address, error } => {
            info!(%address, %error, "sensor error");
        }
        _ => {}
    });

    handle.start_scan();
    service.run().await;
    Ok(())
}
