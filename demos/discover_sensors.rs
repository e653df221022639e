//! Sensor discovery example
//!
//! Run with: cargo run --example discover_sensors

use sensor_scan_ble::{DeviceManager, Result, ScanState};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("warn,sensor_scan_ble=info")
        .init();

    println!("Sensor Discovery");
    println!("================\n");

    let manager = DeviceManager::new().await?;

    if manager.start_scanning().await != ScanState::Scanning {
        println!("Could not start scanning. Is Bluetooth enabled and permitted?");
        return Ok(());
    }

    println!(
        "Scanning for {} seconds. Press Ctrl+C to stop early.\n",
        manager.config().timeout.as_secs()
    );

    let mut devices = manager.observe_devices();
    let mut state = manager.subscribe_scan_state();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("\nStopping...");
                break;
            }
            changed = state.changed() => {
                if changed.is_err() || !state.borrow().is_scanning() {
                    println!("\nScan finished.");
                    break;
                }
            }
            snapshot = devices.recv() => {
                let Some(snapshot) = snapshot else { break };
                print!("\x1B[2J\x1B[1;1H");
                println!("{} device(s):\n", snapshot.len());
                for device in snapshot.iter() {
                    println!("  {}", device);
                }
            }
        }
    }

    println!("\nFinal device list:");
    for device in manager.devices_by_signal() {
        println!("  {}", device);
    }

    manager.shutdown().await;

    Ok(())
}
