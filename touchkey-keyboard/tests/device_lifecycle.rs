//! End-to-end tests over the simulated platform: attach, interrupts,
//! suspend/resume, firmware update and the control surface.

use std::time::Duration;

use touchkey_keyboard::sim::{SimPlatform, SimRail};
use touchkey_keyboard::{
    AutoUpdatePolicy, DeviceConfig, DriverError, FirmwarePolicy, KeyCode, KeyLayout, LedCommand,
    MockBus, ModuleRule, TouchkeyDevice, WakeLock,
};

async fn settle() {
    tokio::time::sleep(Duration::from_millis(5)).await;
}

fn four_key() -> DeviceConfig {
    DeviceConfig {
        layout: KeyLayout::FourKeyNa,
        ..Default::default()
    }
}

async fn attach(config: DeviceConfig) -> (SimPlatform, TouchkeyDevice) {
    let sim = SimPlatform::new(MockBus::new());
    let device = TouchkeyDevice::attach(sim.platform(), config)
        .await
        .expect("attach");
    (sim, device)
}

async fn press(sim: &SimPlatform, device: &TouchkeyDevice, index: u8, pressed: bool) {
    sim.bus.push_key(index, pressed);
    assert!(device.irq_line().fire());
    settle().await;
}

#[tokio::test(start_paused = true)]
async fn test_attach_powers_and_identifies() {
    let (sim, device) = attach(four_key()).await;

    assert!(sim.rails.is_on(SimRail::Device));
    assert!(sim.rails.is_on(SimRail::Led));
    assert!(device.channel().is_enabled());
    assert_eq!(device.identity().firmware_version(), 0x0a);
    assert_eq!(device.identity().module_version(), 0x08);
    // Backlight defaults to always-on, so attach leaves the LED alone
    assert!(sim.bus.led_commands().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_attach_without_device_fails() {
    let sim = SimPlatform::new(MockBus::absent());
    let result = TouchkeyDevice::attach(sim.platform(), DeviceConfig::default()).await;

    assert!(matches!(result, Err(DriverError::DeviceNotFound(_))));
    assert_eq!(
        sim.rails.events(),
        vec![(SimRail::Device, true), (SimRail::Device, false)]
    );
}

#[tokio::test(start_paused = true)]
async fn test_interrupts_reach_sink_and_light_backlight() {
    let (sim, device) = attach(four_key()).await;

    press(&sim, &device, 3, true).await;
    press(&sim, &device, 3, false).await;

    assert_eq!(
        sim.sink.events(),
        vec![(KeyCode::Home, true), (KeyCode::Home, false)]
    );
    assert_eq!(sim.bus.led_commands(), vec![LedCommand::On, LedCommand::On]);
}

#[tokio::test(start_paused = true)]
async fn test_swap_back_menu_from_config() {
    let (sim, device) = attach(DeviceConfig {
        swap_back_menu: true,
        ..Default::default()
    })
    .await;

    press(&sim, &device, 1, true).await;
    assert_eq!(sim.sink.events(), vec![(KeyCode::Back, true)]);
}

#[tokio::test(start_paused = true)]
async fn test_suspend_releases_held_keys_in_order() {
    let (sim, device) = attach(four_key()).await;

    press(&sim, &device, 2, true).await;
    press(&sim, &device, 1, true).await;
    sim.sink.clear();

    let released = device.suspend().await;
    let indices: Vec<u8> = released.iter().map(|e| e.index).collect();
    assert_eq!(indices, vec![1, 2]);
    assert_eq!(
        sim.sink.events(),
        vec![(KeyCode::Search, false), (KeyCode::Back, false)]
    );
    assert!(device.decoder().held_keys().is_empty());

    // Edges while suspended never get queued
    assert!(device.irq_masked());
    assert!(!device.irq_line().fire());
    assert!(!sim.rails.is_on(SimRail::Device));
    assert!(!sim.rails.is_on(SimRail::Led));

    device.resume().await;
    assert!(!device.irq_masked());
    press(&sim, &device, 4, true).await;
    assert_eq!(
        sim.sink.events(),
        vec![
            (KeyCode::Search, false),
            (KeyCode::Back, false),
            (KeyCode::Menu, true)
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_resume_restores_led_and_ends_session() {
    let (sim, device) = attach(DeviceConfig::default()).await;
    let control = device.control();

    control.write_named("notification_enabled", "1").await.unwrap();
    control.write_named("led", "1").await.unwrap();
    assert_eq!(control.read_named("led").await.unwrap(), "1");
    assert!(sim.wake_lock.is_held());

    device.suspend().await;
    sim.bus.clear_log();
    device.resume().await;

    assert!(sim.rails.is_on(SimRail::Device));
    assert!(sim.rails.is_on(SimRail::Led));
    assert_eq!(sim.bus.led_commands(), vec![LedCommand::On]);
    assert_eq!(control.read_named("led").await.unwrap(), "0");
    assert!(!sim.wake_lock.is_held());
}

#[tokio::test(start_paused = true)]
async fn test_repeated_suspend_is_ignored() {
    let (sim, device) = attach(four_key()).await;

    device.suspend().await;
    assert!(device.suspend().await.is_empty());
    device.resume().await;
    assert!(!device.is_suspended());
    assert!(!device.irq_masked());
    press(&sim, &device, 4, true).await;
    assert_eq!(sim.sink.events(), vec![(KeyCode::Menu, true)]);

    // Resume without a suspend leaves the rails alone
    sim.rails.clear();
    device.resume().await;
    assert!(sim.rails.events().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_resume_stays_dark_while_force_disabled() {
    let (sim, device) = attach(DeviceConfig::default()).await;
    device
        .control()
        .write_named("force_disable", "1")
        .await
        .unwrap();

    device.suspend().await;
    sim.bus.clear_log();
    device.resume().await;

    assert!(sim.rails.is_on(SimRail::Device));
    assert!(sim.bus.led_commands().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_resume_keeps_led_dark_when_always_off() {
    let (sim, device) = attach(DeviceConfig::default()).await;
    let control = device.control();
    control.write_named("led_timeout", "-2").await.unwrap();

    device.suspend().await;
    sim.bus.clear_log();
    device.resume().await;

    assert!(sim.bus.led_commands().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_firmware_update_fail_then_pass() {
    let (sim, device) = attach(DeviceConfig::default()).await;
    let control = device.control();
    assert_eq!(control.read_named("firm_update_status").await.unwrap(), "PASS");
    assert_eq!(control.read_named("firm_version_phone").await.unwrap(), "0x0c");

    sim.flasher.fail_next(3);
    control.write_named("firm_update", "S").await.unwrap();
    assert_eq!(
        control.read_named("firm_update_status").await.unwrap(),
        "DOWNLOADING"
    );
    assert!(matches!(
        control.write_named("firm_update", "S").await,
        Err(DriverError::UpdateInProgress)
    ));

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(control.read_named("firm_update_status").await.unwrap(), "FAIL");
    assert_eq!(sim.flasher.attempts(), 3);
    assert!(!sim.rails.is_on(SimRail::Device));
    assert!(!device.irq_masked());

    control.write_named("firm_update", "S").await.unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(control.read_named("firm_update_status").await.unwrap(), "PASS");
    assert_eq!(sim.flasher.attempts(), 4);
    assert!(sim.rails.is_on(SimRail::Device));
    assert!(device.channel().is_enabled());

    // Interrupts flow again after the update
    press(&sim, &device, 1, true).await;
    assert_eq!(sim.sink.events(), vec![(KeyCode::Menu, true)]);
}

#[tokio::test(start_paused = true)]
async fn test_suspend_waits_for_firmware_update() {
    let (sim, device) = attach(DeviceConfig::default()).await;
    let control = device.control();
    control.write_named("firm_update", "S").await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    device.suspend().await;
    assert_eq!(control.read_named("firm_update_status").await.unwrap(), "PASS");
    assert_eq!(sim.flasher.attempts(), 1);
    assert!(!sim.rails.is_on(SimRail::Device));
    assert!(!sim.rails.is_on(SimRail::Led));
    assert!(!device.channel().is_enabled());

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(!sim.rails.is_on(SimRail::Device));
    assert!(!device.channel().is_enabled());

    device.resume().await;
    assert!(device.channel().is_enabled());
    assert!(!device.irq_masked());
}

#[tokio::test(start_paused = true)]
async fn test_firmware_update_refused_while_suspended() {
    let (sim, device) = attach(DeviceConfig::default()).await;
    let control = device.control();
    device.suspend().await;
    sim.rails.clear();

    control.write_named("firm_update", "S").await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(control.read_named("firm_update_status").await.unwrap(), "FAIL");
    assert_eq!(sim.flasher.attempts(), 0);
    assert!(sim.rails.events().is_empty());
    assert!(device.irq_masked());
}

#[tokio::test(start_paused = true)]
async fn test_firmware_trigger_requires_marker() {
    let (_sim, device) = attach(DeviceConfig::default()).await;
    assert!(matches!(
        device.control().write_named("firm_update", "F").await,
        Err(DriverError::InvalidParameter(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_auto_update_at_attach() {
    let config = DeviceConfig {
        firmware: FirmwarePolicy {
            auto_update: AutoUpdatePolicy::BelowVersion {
                firmware_below: 0x0c,
                module: ModuleRule::Any,
            },
            ..Default::default()
        },
        ..Default::default()
    };

    let (sim, device) = attach(config).await;
    assert_eq!(sim.flasher.attempts(), 1);
    assert_eq!(device.firmware().status().as_str(), "PASS");

    let sim = SimPlatform::new(MockBus::new());
    sim.flasher.fail_next(3);
    let result = TouchkeyDevice::attach(sim.platform(), config).await;
    assert!(matches!(
        result,
        Err(DriverError::FirmwareUpdateFailed { attempts: 3 })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_control_surface_rejects_out_of_range() {
    let (_sim, device) = attach(DeviceConfig::default()).await;
    let control = device.control();

    assert!(matches!(
        control.write_named("breathing_min_volt", "2000").await,
        Err(DriverError::InvalidParameter(_))
    ));
    assert_eq!(
        control.read_named("breathing_min_volt").await.unwrap(),
        "2500"
    );

    control.write_named("breathing_min_volt", "2800").await.unwrap();
    assert!(control.write_named("breathing_max_volt", "2700").await.is_err());
    assert_eq!(
        control.read_named("breathing_max_volt").await.unwrap(),
        "3300"
    );

    assert!(matches!(
        control.read_named("firm_update").await,
        Err(DriverError::WriteOnly(_))
    ));
    assert!(matches!(
        control.write_named("threshold", "5").await,
        Err(DriverError::ReadOnly(_))
    ));
    assert!(matches!(
        control.write_named("led_timeout", "-3").await,
        Err(DriverError::InvalidParameter(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_backlight_timeout_via_control() {
    let (sim, device) = attach(DeviceConfig::default()).await;
    let control = device.control();
    control.write_named("led_fadeout", "0").await.unwrap();
    control.write_named("led_timeout", "1000").await.unwrap();
    sim.bus.clear_log();

    press(&sim, &device, 1, true).await;
    assert_eq!(sim.bus.led_commands(), vec![LedCommand::On]);

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(
        sim.bus.led_commands(),
        vec![LedCommand::On, LedCommand::Off]
    );
}

#[tokio::test(start_paused = true)]
async fn test_detach_powers_down() {
    let (sim, device) = attach(DeviceConfig::default()).await;
    let line = device.irq_line();
    device.detach().await;

    assert!(!sim.rails.is_on(SimRail::Device));
    assert!(!sim.rails.is_on(SimRail::Led));
    assert!(!line.fire());
}

#[tokio::test(start_paused = true)]
async fn test_keys_dispatch_during_backlight_fade() {
    let (sim, device) = attach(four_key()).await;
    device
        .control()
        .write_named("led_timeout", "100")
        .await
        .unwrap();
    press(&sim, &device, 4, true).await;
    press(&sim, &device, 4, false).await;
    sim.sink.clear();

    // Expiry at about 110 ms starts a fade from 3300 mV
    tokio::time::sleep(Duration::from_millis(150)).await;
    let start = tokio::time::Instant::now();
    press(&sim, &device, 4, true).await;
    press(&sim, &device, 4, false).await;

    assert_eq!(
        sim.sink.events(),
        vec![(KeyCode::Menu, true), (KeyCode::Menu, false)]
    );
    assert!(start.elapsed() <= Duration::from_millis(20));
}
