//! Emulator driver for hardware-wallet app end-to-end tests
//!
//! Boots a Ledger device emulator with the app under test, exposes an APDU
//! control port for test clients, and answers every operation the device
//! shows by walking its review screens.

pub mod common;
pub mod control;
pub mod driver;
pub mod emulator;

pub use common::{Error, Result};
