//! Common utilities shared by the driver and its helpers

pub mod config;
pub mod error;
pub mod logging;
pub mod paths;

pub use error::{Error, Result};
