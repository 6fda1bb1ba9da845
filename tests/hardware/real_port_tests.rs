//! Tests against the device named by `TEST_PORT`.
//!
//! Loopback tests additionally need `TEST_LOOPBACK=1` and TX wired to RX.

use super::utils::{print_available_ports, TestPortConfig, TimingHelper};
use serial_line::port::{PortError, Timeout};
use std::time::Duration;

#[test]
fn test_real_port_open_close() {
    let Some(config) = TestPortConfig::from_env() else {
        return;
    };
    print_available_ports();

    let port = config.open(Timeout::simple(500));
    assert!(port.is_open());
    assert!(matches!(port.open(), Err(PortError::AlreadyOpen)));
    println!("Opened {} at {}", port.path(), port.settings());

    port.close().unwrap();
    port.close().unwrap();
    assert!(!port.is_open());
}

#[test]
fn test_real_port_read_timeout() {
    let Some(config) = TestPortConfig::from_env() else {
        return;
    };
    let port = config.open(Timeout::simple(200));
    port.flush_input().unwrap();

    let timer = TimingHelper::new("idle read");
    let mut buf = [0u8; 32];
    let n = port.read(&mut buf).unwrap();
    let elapsed = timer.finish();
    if n < buf.len() {
        assert!(elapsed >= Duration::from_millis(190), "{elapsed:?}");
    }
}

#[test]
fn test_real_port_control_lines() {
    let Some(config) = TestPortConfig::from_env() else {
        return;
    };
    let port = config.open(Timeout::simple(100));

    port.set_rts(true).unwrap();
    port.set_dtr(true).unwrap();
    assert!(port.rts().unwrap());
    assert!(port.dtr().unwrap());

    port.set_rts(false).unwrap();
    assert!(!port.rts().unwrap());
    println!("Modem status: {:?}", port.modem_status().unwrap());
}

#[test]
fn test_real_port_loopback_echo() {
    let Some(config) = TestPortConfig::from_env() else {
        return;
    };
    if !config.loopback_enabled {
        println!("Skipping loopback test: TEST_LOOPBACK not set");
        return;
    }
    let port = config.open(Timeout::new(Timeout::MAX, 500, 2, 500, 2));
    port.flush_input().unwrap();

    let pattern: Vec<u8> = (0u8..=255).collect();
    assert_eq!(port.write(&pattern).unwrap(), pattern.len());
    port.flush().unwrap();

    let mut echoed = vec![0u8; pattern.len()];
    assert_eq!(port.read(&mut echoed).unwrap(), pattern.len());
    assert_eq!(echoed, pattern);
}

#[test]
fn test_real_port_send_break() {
    let Some(config) = TestPortConfig::from_env() else {
        return;
    };
    let port = config.open(Timeout::simple(100));

    let timer = TimingHelper::new("break");
    port.send_break(50).unwrap();
    assert!(timer.finish() >= Duration::from_millis(50));
    port.flush_input().unwrap();
}
