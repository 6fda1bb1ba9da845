//! Hardware integration test suite.
//!
//! These tests need a real serial device and only build with the
//! `hardware-tests` feature:
//!
//! ```bash
//! export TEST_PORT=/dev/ttyUSB0   # required
//! export TEST_BAUD=115200         # optional, default: 9600
//! export TEST_LOOPBACK=1          # if TX and RX are wired together
//! cargo test --features hardware-tests --test integration_hardware
//! ```

#![cfg(feature = "hardware-tests")]

#[path = "hardware/mod.rs"]
mod hardware;
