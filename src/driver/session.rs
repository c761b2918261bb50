//! Driver session - emulator bring-up, port publication and the driver loop

use std::convert::Infallible;
use std::path::{Path, PathBuf};

use crate::common::config::Config;
use crate::common::{Error, Result};
use crate::control::ControlServer;
use crate::emulator::{Emulator, Speculos};

use super::Driver;

/// One run of the driver, from emulator start to close
pub struct Session {
    config: Config,
    /// Where the control port is published
    port_file: PathBuf,
    emulator: Option<Speculos>,
    control: Option<ControlServer>,
    closed: bool,
}

impl Session {
    pub fn new(config: Config, port_file: PathBuf) -> Self {
        Self {
            config,
            port_file,
            emulator: None,
            control: None,
            closed: false,
        }
    }

    /// Start everything, publish the port, then drive forever
    ///
    /// Only returns on error. Callers stop a healthy session by dropping this
    /// future and then calling [`Session::close`].
    pub async fn run(&mut self) -> Result<Infallible> {
        if self.closed || self.emulator.is_some() {
            return Err(Error::Internal("Session can only be run once".to_string()));
        }

        let emulator = Speculos::start(&self.config).await?;
        let emulator = self.emulator.insert(emulator);

        let control =
            ControlServer::bind(self.config.control.bind_addr(), emulator.apdu_addr()).await?;
        let port = control.port();
        self.control = Some(control);

        tokio::time::sleep(self.config.control.settle_delay()).await;
        publish_port(&self.port_file, port).await?;
        tracing::info!(port, file = %self.port_file.display(), "Control port published");

        let driver = Driver::from_config(&self.config);
        driver.run(&*emulator).await
    }

    /// Stop the control server and the emulator
    ///
    /// Safe to call more than once and on a session that never started.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if let Some(control) = self.control.take() {
            control.shutdown();
        }
        if let Some(mut emulator) = self.emulator.take() {
            if let Err(e) = emulator.close().await {
                tracing::warn!("Error stopping emulator: {}", e);
            }
        }
        tracing::debug!("Session closed");
    }
}

/// Write the control port to `path` as one line
async fn publish_port(path: &Path, port: u16) -> Result<()> {
    tokio::fs::write(path, format!("{}\n", port))
        .await
        .map_err(|e| Error::port_file_write(path, e))
}
