//! Hardware-specific tests requiring real serial devices.

pub mod real_port_tests;
pub mod utils;
