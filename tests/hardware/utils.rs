//! Utility functions for hardware testing.

#![allow(dead_code)]

use serial_line::port::{LineSettings, SerialPort, Timeout};
use serialport::{available_ports, SerialPortType};
use std::env;
use std::time::{Duration, Instant};

/// Test port configuration from environment.
pub struct TestPortConfig {
    pub port_name: String,
    pub baud_rate: u32,
    pub loopback_enabled: bool,
}

impl TestPortConfig {
    /// Read `TEST_PORT`, `TEST_BAUD` and `TEST_LOOPBACK`; `None` when no port is set.
    pub fn from_env() -> Option<Self> {
        let Ok(port_name) = env::var("TEST_PORT") else {
            println!("Skipping hardware test: TEST_PORT not set");
            return None;
        };
        let baud_rate = env::var("TEST_BAUD")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(9600);
        let loopback_enabled = env::var("TEST_LOOPBACK").ok().as_deref() == Some("1");

        Some(TestPortConfig {
            port_name,
            baud_rate,
            loopback_enabled,
        })
    }

    pub fn open(&self, timeout: Timeout) -> SerialPort {
        SerialPort::new(self.port_name.clone(), LineSettings::new(self.baud_rate), timeout)
            .unwrap_or_else(|e| panic!("Port open failed for {}: {e}", self.port_name))
    }
}

/// Print available ports for debugging.
pub fn print_available_ports() {
    let ports = available_ports().unwrap_or_default();
    if ports.is_empty() {
        println!("No serial ports detected on this system");
        return;
    }

    println!("Available serial ports ({}):", ports.len());
    for port in ports {
        match port.port_type {
            SerialPortType::UsbPort(usb) => {
                println!("  {} (USB {:04x}:{:04x})", port.port_name, usb.vid, usb.pid)
            }
            _ => println!("  {}", port.port_name),
        }
    }
}

/// Timing helper for measuring operation duration.
pub struct TimingHelper {
    start: Instant,
    name: String,
}

impl TimingHelper {
    pub fn new(name: &str) -> Self {
        println!("Starting: {}", name);
        TimingHelper {
            start: Instant::now(),
            name: name.to_string(),
        }
    }

    pub fn finish(self) -> Duration {
        let elapsed = self.start.elapsed();
        println!("Completed: {} in {:?}", self.name, elapsed);
        elapsed
    }
}
