//! Device emulator handle
//!
//! The driver only needs a handful of things from an emulator: the current
//! screen as comparable bytes, the text on it, button input, and the address of
//! the raw APDU port. [`Emulator`] is that surface; [`Speculos`] implements it
//! over a Speculos subprocess and its REST automation API.

mod speculos;
mod types;

#[cfg(test)]
pub(crate) mod scripted;

use std::net::SocketAddr;

use async_trait::async_trait;

use crate::common::Result;

pub use speculos::Speculos;
pub use types::{contains_text, Button, ScreenEvent, Snapshot};

/// A running device emulator
#[async_trait]
pub trait Emulator: Send + Sync {
    /// Capture the current screen
    async fn snapshot(&self) -> Result<Snapshot>;

    /// Text fragments shown on the current screen
    async fn screen_text(&self) -> Result<Vec<ScreenEvent>>;

    /// Press and release a button
    async fn press(&self, button: Button) -> Result<()>;

    /// Screen captured once the app finished booting
    fn main_menu_snapshot(&self) -> &Snapshot;

    /// Address of the emulator's raw APDU port
    fn apdu_addr(&self) -> SocketAddr;

    /// Stop the emulator and release its resources
    ///
    /// Calling this more than once is a no-op.
    async fn close(&mut self) -> Result<()>;
}
