//! Emulator screen and input types

use std::fmt;

use serde::{Deserialize, Serialize};

/// Physical button on a Nano device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    Left,
    Right,
    /// Both buttons at once; selects the current item
    Both,
}

impl Button {
    /// Path segment used by the emulator's button endpoint
    pub fn as_str(&self) -> &'static str {
        match self {
            Button::Left => "left",
            Button::Right => "right",
            Button::Both => "both",
        }
    }
}

impl fmt::Display for Button {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of a button request
#[derive(Debug, Serialize)]
pub(crate) struct ButtonAction {
    pub action: &'static str,
}

impl ButtonAction {
    pub const PRESS_AND_RELEASE: Self = Self {
        action: "press-and-release",
    };
}

/// A piece of text drawn on the screen
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ScreenEvent {
    pub text: String,
    #[serde(default)]
    pub x: i32,
    #[serde(default)]
    pub y: i32,
}

/// Response of the events endpoint
#[derive(Debug, Deserialize)]
pub(crate) struct EventsResponse {
    #[serde(default)]
    pub events: Vec<ScreenEvent>,
}

/// Opaque image of the screen, compared by value
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Snapshot(Vec<u8>);

impl Snapshot {
    pub fn new(data: Vec<u8>) -> Self {
        Self(data)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Snapshot({} bytes)", self.0.len())
    }
}

/// Whether any fragment on screen contains `text`, ignoring ASCII case
pub fn contains_text(events: &[ScreenEvent], text: &str) -> bool {
    let needle = text.to_ascii_lowercase();
    events
        .iter()
        .any(|event| event.text.to_ascii_lowercase().contains(&needle))
}
