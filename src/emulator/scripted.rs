//! In-memory emulator for driver tests
//!
//! Resting on a one-page main menu until [`ScriptHandle::trigger`] opens a
//! review flow. Pressing both buttons on a page containing APPROVE or REJECT
//! records the outcome and returns to the menu.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::common::Result;

use super::{Button, Emulator, ScreenEvent, Snapshot};

const MAIN_MENU: &[&str] = &["Internet Computer", "is ready"];

/// Review flow shown for every triggered operation
pub const REVIEW_FLOW: &[&[&str]] = &[
    &["Review", "Transaction"],
    &["Amount", "1.00000000 ICP"],
    &["APPROVE"],
    &["REJECT"],
];

#[derive(Default)]
struct ScriptState {
    pages: Vec<Vec<String>>,
    page: Option<usize>,
    presses: Vec<Button>,
    outcomes: Vec<String>,
}

impl ScriptState {
    fn current(&self) -> Vec<String> {
        match self.page {
            Some(i) => self.pages[i].clone(),
            None => MAIN_MENU.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Shared view of a [`ScriptedEmulator`] for the test body
#[derive(Clone)]
pub struct ScriptHandle {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptHandle {
    /// Simulate a client submitting an operation
    pub fn trigger(&self) {
        self.state.lock().unwrap().page = Some(0);
    }

    pub fn presses(&self) -> Vec<Button> {
        self.state.lock().unwrap().presses.clone()
    }

    pub fn outcomes(&self) -> Vec<String> {
        self.state.lock().unwrap().outcomes.clone()
    }

    pub fn is_resting(&self) -> bool {
        self.state.lock().unwrap().page.is_none()
    }

    /// Wait until `count` operations have been answered
    pub async fn wait_for_outcomes(&self, count: usize) {
        while self.outcomes().len() < count {
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }
    }
}

pub struct ScriptedEmulator {
    state: Arc<Mutex<ScriptState>>,
    main_menu: Snapshot,
}

impl ScriptedEmulator {
    pub fn new(pages: &[&[&str]]) -> Self {
        let state = ScriptState {
            pages: pages
                .iter()
                .map(|page| page.iter().map(|s| s.to_string()).collect())
                .collect(),
            ..Default::default()
        };
        let main_menu = render(&state.current());
        Self {
            state: Arc::new(Mutex::new(state)),
            main_menu,
        }
    }

    pub fn handle(&self) -> ScriptHandle {
        ScriptHandle {
            state: self.state.clone(),
        }
    }
}

fn render(lines: &[String]) -> Snapshot {
    Snapshot::new(lines.join("\n").into_bytes())
}

#[async_trait]
impl Emulator for ScriptedEmulator {
    async fn snapshot(&self) -> Result<Snapshot> {
        Ok(render(&self.state.lock().unwrap().current()))
    }

    async fn screen_text(&self) -> Result<Vec<ScreenEvent>> {
        let lines = self.state.lock().unwrap().current();
        Ok(lines
            .into_iter()
            .enumerate()
            .map(|(i, text)| ScreenEvent {
                text,
                x: 0,
                y: i as i32 * 16,
            })
            .collect())
    }

    async fn press(&self, button: Button) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.presses.push(button);

        let Some(page) = state.page else {
            return Ok(());
        };
        let last = state.pages.len() - 1;
        match button {
            Button::Right => state.page = Some((page + 1).min(last)),
            Button::Left => state.page = Some(page.saturating_sub(1)),
            Button::Both => {
                let text = state.pages[page].join(" ");
                let outcome = if text.contains("APPROVE") {
                    Some("approved")
                } else if text.contains("REJECT") {
                    Some("rejected")
                } else {
                    None
                };
                if let Some(outcome) = outcome {
                    state.outcomes.push(outcome.to_string());
                    state.page = None;
                }
            }
        }
        Ok(())
    }

    fn main_menu_snapshot(&self) -> &Snapshot {
        &self.main_menu
    }

    fn apdu_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::LOCALHOST, 0))
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
