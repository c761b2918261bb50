//! Control channel for external test drivers
//!
//! Test clients connect over loopback TCP and submit APDUs, which are relayed
//! to the emulator. Whatever the device shows while an APDU is pending is what
//! the driver loop navigates.

pub mod frame;
mod server;

pub use server::ControlServer;
