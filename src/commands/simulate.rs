//! Simulated end-to-end run: attach, key presses, a notification session,
//! suspend with a key held, resume.

use std::time::Duration;

use touchkey_keyboard::sim::SimPlatform;
use touchkey_keyboard::{DeviceConfig, MockBus, TouchkeyDevice};
use tracing::info;

use super::CommandResult;

/// Gap between simulated edges so the worker drains the queue
const EDGE_GAP: Duration = Duration::from_millis(20);

pub struct SimulateOptions {
    pub presses: u8,
    pub notify_ms: u32,
    pub breathing: bool,
    pub blinking: bool,
}

pub async fn run(config: DeviceConfig, options: SimulateOptions) -> CommandResult {
    let sim = SimPlatform::new(MockBus::new());
    let device = TouchkeyDevice::attach(sim.platform(), config).await?;
    let control = device.control();
    let irq = device.irq_line();
    let keys = device.decoder().keymap().len() as u8;

    println!(
        "Attached: firmware 0x{:02x}, module 0x{:02x}, {} keys",
        device.identity().firmware_version(),
        device.identity().module_version(),
        keys
    );

    for i in 0..options.presses {
        let index = i % keys + 1;
        for pressed in [true, false] {
            sim.bus.push_key(index, pressed);
            irq.fire();
            tokio::time::sleep(EDGE_GAP).await;
        }
    }

    control.write_named("notification_enabled", "1").await?;
    if options.breathing {
        control.write_named("breathing_enabled", "1").await?;
    } else if options.blinking {
        control.write_named("blinking_enabled", "1").await?;
    }
    control
        .write_named("notification_timeout", &options.notify_ms.to_string())
        .await?;
    control.write_named("led", "1").await?;
    info!("Notification session running for {} ms", options.notify_ms);
    tokio::time::sleep(Duration::from_millis(options.notify_ms as u64) + EDGE_GAP).await;
    println!(
        "Notification active after timeout: {}",
        control.read_named("led").await?
    );

    // Hold a key across suspend
    sim.bus.push_key(1, true);
    irq.fire();
    tokio::time::sleep(EDGE_GAP).await;
    let released = device.suspend().await;
    println!("Suspend released {} held key(s)", released.len());
    device.resume().await;

    println!("\nKey events:");
    for (key, pressed) in sim.sink.events() {
        println!(
            "  {:<7} {}",
            key.name(),
            if pressed { "down" } else { "up" }
        );
    }

    println!("\nLED commands:");
    for command in sim.bus.led_commands() {
        println!("  {:?}", command);
    }

    println!("\nPower rails:");
    for (rail, on) in sim.rails.events() {
        println!("  {:?} {}", rail, if on { "on" } else { "off" });
    }

    let stats = device.channel().stats();
    println!(
        "\nRegulator steps: {}, bus transfers: {}, retries: {}, failures: {}",
        sim.regulator.history().len(),
        stats.transfers,
        stats.retries,
        stats.failures
    );

    device.detach().await;
    Ok(())
}
