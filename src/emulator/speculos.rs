//! Speculos emulator process and REST client
//!
//! Speculos is started directly with the app ELF and the device seed, on a
//! pair of free loopback ports: one for the REST automation API, one for raw
//! APDU exchange.

use std::net::{Ipv4Addr, SocketAddr, TcpListener};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::common::config::Config;
use crate::common::{Error, Result};

use super::types::{contains_text, ButtonAction, EventsResponse, ScreenEvent};
use super::{Button, Emulator, Snapshot};

/// How long a single REST request may take
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// How long the emulator gets to exit after SIGTERM before it is killed
const TERMINATE_GRACE: Duration = Duration::from_secs(2);

/// A running Speculos instance
pub struct Speculos {
    /// Emulator subprocess; `None` once closed
    child: Option<Child>,
    /// REST client
    client: reqwest::Client,
    /// Base URL of the REST API
    api_base: String,
    /// Raw APDU port
    apdu_addr: SocketAddr,
    /// Screen captured after boot
    main_menu: Snapshot,
    /// Tasks forwarding emulator output into the log
    log_tasks: Vec<JoinHandle<()>>,
}

impl Speculos {
    /// Start the emulator and wait for the app to boot
    ///
    /// On failure the subprocess is stopped before the error is returned.
    pub async fn start(config: &Config) -> Result<Self> {
        let app = config
            .app
            .path
            .canonicalize()
            .map_err(|_| Error::app_not_found(&config.app.path))?;
        let command = resolve_command(&config.emulator.command)?;
        let (api_port, apdu_port) = free_port_pair()?;

        let mut cmd = Command::new(&command);
        cmd.args(emulator_args(config, api_port, apdu_port, &app))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::info!(
            command = %command.display(),
            app = %app.display(),
            model = %config.app.model,
            api_port,
            apdu_port,
            "Starting emulator"
        );

        let mut child = cmd.spawn().map_err(|e| {
            Error::EmulatorStartFailed(format!("Failed to start {}: {}", command.display(), e))
        })?;

        let mut log_tasks = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            log_tasks.push(forward_output(stdout, "stdout"));
        }
        if let Some(stderr) = child.stderr.take() {
            log_tasks.push(forward_output(stderr, "stderr"));
        }

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .no_proxy()
            .build()?;

        let mut emulator = Self {
            child: Some(child),
            client,
            api_base: format!("http://127.0.0.1:{}", api_port),
            apdu_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, apdu_port)),
            main_menu: Snapshot::default(),
            log_tasks,
        };

        match emulator.boot(config).await {
            Ok(()) => Ok(emulator),
            Err(e) => {
                if let Err(close_err) = emulator.close().await {
                    tracing::warn!("Error stopping emulator after failed start: {}", close_err);
                }
                Err(e)
            }
        }
    }

    /// Wait for the start text, then capture the main menu
    async fn boot(&mut self, config: &Config) -> Result<()> {
        let start_text = &config.app.start_text;
        let timeout = config.emulator.start_timeout();
        let deadline = Instant::now() + timeout;

        loop {
            self.check_alive()?;

            match self.screen_text().await {
                Ok(events) if contains_text(&events, start_text) => break,
                Ok(_) => {}
                // API not up yet
                Err(Error::EmulatorApi(e)) => tracing::trace!("Emulator API not ready: {}", e),
                Err(Error::EmulatorResponse { .. }) => {}
                Err(e) => return Err(e),
            }

            if Instant::now() >= deadline {
                return Err(Error::StartTimeout {
                    text: start_text.clone(),
                    secs: timeout.as_secs(),
                });
            }
            tokio::time::sleep(config.emulator.poll_interval()).await;
        }

        self.main_menu = self.snapshot().await?;
        tracing::info!("Emulator ready, main menu captured ({:?})", self.main_menu);
        Ok(())
    }

    /// Fail if the subprocess has already exited
    fn check_alive(&mut self) -> Result<()> {
        let Some(child) = self.child.as_mut() else {
            return Err(Error::Internal("Emulator already closed".to_string()));
        };
        match child.try_wait()? {
            Some(status) => Err(Error::EmulatorExited(status.to_string())),
            None => Ok(()),
        }
    }

    async fn get(&self, endpoint: &str) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.api_base, endpoint);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(Error::emulator_response(endpoint, response.status()));
        }
        Ok(response)
    }
}

#[async_trait]
impl Emulator for Speculos {
    async fn snapshot(&self) -> Result<Snapshot> {
        let bytes = self.get("/screenshot").await?.bytes().await?;
        Ok(Snapshot::new(bytes.to_vec()))
    }

    async fn screen_text(&self) -> Result<Vec<ScreenEvent>> {
        let response: EventsResponse = self
            .get("/events?currentscreenonly=true")
            .await?
            .json()
            .await?;
        Ok(response.events)
    }

    async fn press(&self, button: Button) -> Result<()> {
        let endpoint = format!("/button/{}", button.as_str());
        tracing::debug!("Pressing {} button", button);

        let response = self
            .client
            .post(format!("{}{}", self.api_base, endpoint))
            .json(&ButtonAction::PRESS_AND_RELEASE)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Error::emulator_response(&endpoint, response.status()));
        }
        Ok(())
    }

    fn main_menu_snapshot(&self) -> &Snapshot {
        &self.main_menu
    }

    fn apdu_addr(&self) -> SocketAddr {
        self.apdu_addr
    }

    async fn close(&mut self) -> Result<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        tracing::debug!("Stopping emulator");

        if child.try_wait()?.is_none() {
            terminate(&mut child).await?;
        }

        for task in self.log_tasks.drain(..) {
            task.abort();
        }
        Ok(())
    }
}

/// Ask the emulator to exit, killing it if it does not
async fn terminate(child: &mut Child) -> Result<()> {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        // SAFETY: pid belongs to our own un-reaped child
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGTERM);
        }
        if let Ok(status) = tokio::time::timeout(TERMINATE_GRACE, child.wait()).await {
            let status = status?;
            tracing::debug!("Emulator exited with {}", status);
            return Ok(());
        }
        tracing::warn!("Emulator ignored SIGTERM, killing it");
    }

    child.kill().await?;
    Ok(())
}

/// Locate the emulator executable
fn resolve_command(command: &Path) -> Result<PathBuf> {
    if command.components().count() > 1 {
        if command.exists() {
            return Ok(command.to_path_buf());
        }
        return Err(Error::EmulatorNotFound {
            name: command.display().to_string(),
        });
    }
    which::which(command).map_err(|_| Error::EmulatorNotFound {
        name: command.display().to_string(),
    })
}

/// Build the emulator command line
fn emulator_args(config: &Config, api_port: u16, apdu_port: u16, app: &Path) -> Vec<String> {
    let mut args = vec![
        "--model".to_string(),
        config.app.model.clone(),
        "--seed".to_string(),
        config.app.seed.clone(),
        "--display".to_string(),
        config.emulator.display.clone(),
        "--api-port".to_string(),
        api_port.to_string(),
        "--apdu-port".to_string(),
        apdu_port.to_string(),
    ];
    args.extend(config.emulator.args.iter().cloned());
    args.push(app.display().to_string());
    args
}

/// Reserve two distinct free loopback ports
///
/// Both listeners are held until both ports are known so the OS cannot hand
/// out the same port twice.
fn free_port_pair() -> Result<(u16, u16)> {
    let first = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))?;
    let second = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))?;
    Ok((first.local_addr()?.port(), second.local_addr()?.port()))
}

/// Forward each line of emulator output into the log
fn forward_output<R>(stream: R, name: &'static str) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            tracing::debug!(target: "emulator", stream = name, "{}", line);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

    /// Client half of a `Speculos`, pointed at a fake API
    fn attached(api_base: &str, child: Option<Child>) -> Speculos {
        Speculos {
            child,
            client: reqwest::Client::builder().no_proxy().build().unwrap(),
            api_base: api_base.to_string(),
            apdu_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 1)),
            main_menu: Snapshot::default(),
            log_tasks: Vec::new(),
        }
    }

    fn events(lines: &[&str]) -> serde_json::Value {
        let events: Vec<_> = lines
            .iter()
            .enumerate()
            .map(|(i, text)| json!({"text": text, "x": 0, "y": 16 * i}))
            .collect();
        json!({ "events": events })
    }

    #[tokio::test]
    async fn test_snapshot_returns_screenshot_bytes() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("GET"))
            .and(matchers::path("/screenshot"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"\x89PNG-menu".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let emulator = attached(&server.uri(), None);
        let snapshot = emulator.snapshot().await.unwrap();
        assert_eq!(snapshot.as_bytes(), b"\x89PNG-menu");
    }

    #[tokio::test]
    async fn test_screen_text_reads_current_screen() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("GET"))
            .and(matchers::path("/events"))
            .and(matchers::query_param("currentscreenonly", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(events(&["Review", "Transaction"])))
            .expect(1)
            .mount(&server)
            .await;

        let emulator = attached(&server.uri(), None);
        let screen = emulator.screen_text().await.unwrap();
        assert_eq!(screen.len(), 2);
        assert_eq!(screen[1].text, "Transaction");
        assert_eq!(screen[1].y, 16);
    }

    #[tokio::test]
    async fn test_press_posts_press_and_release() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .and(matchers::path("/button/both"))
            .and(matchers::body_json(json!({"action": "press-and-release"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let emulator = attached(&server.uri(), None);
        emulator.press(Button::Both).await.unwrap();
    }

    #[tokio::test]
    async fn test_error_status_reported_with_endpoint() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .and(matchers::path("/button/right"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let emulator = attached(&server.uri(), None);
        let err = emulator.press(Button::Right).await.unwrap_err();
        match err {
            Error::EmulatorResponse { endpoint, status } => {
                assert_eq!(endpoint, "/button/right");
                assert_eq!(status, 500);
            }
            other => panic!("unexpected error: {other}"),
        }

        let err = emulator.snapshot().await.unwrap_err();
        assert!(matches!(err, Error::EmulatorResponse { status: 404, .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_boot_retries_until_start_text() {
        let server = MockServer::start().await;
        // API still coming up, then the boot screen, then the main menu
        Mock::given(matchers::method("GET"))
            .and(matchers::path("/events"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(matchers::method("GET"))
            .and(matchers::path("/events"))
            .respond_with(ResponseTemplate::new(200).set_body_json(events(&["Booting..."])))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(matchers::method("GET"))
            .and(matchers::path("/events"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(events(&["Internet Computer", "is ready"])),
            )
            .mount(&server)
            .await;
        Mock::given(matchers::method("GET"))
            .and(matchers::path("/screenshot"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"menu".to_vec()))
            .mount(&server)
            .await;

        let child = Command::new("sleep")
            .arg("30")
            .kill_on_drop(true)
            .spawn()
            .unwrap();
        let mut emulator = attached(&server.uri(), Some(child));

        let mut config = Config::default();
        config.emulator.poll_interval_ms = 10;
        emulator.boot(&config).await.unwrap();
        assert_eq!(emulator.main_menu_snapshot().as_bytes(), b"menu");

        emulator.close().await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_boot_times_out_without_start_text() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("GET"))
            .and(matchers::path("/events"))
            .respond_with(ResponseTemplate::new(200).set_body_json(events(&["Booting..."])))
            .mount(&server)
            .await;

        let child = Command::new("sleep")
            .arg("30")
            .kill_on_drop(true)
            .spawn()
            .unwrap();
        let mut emulator = attached(&server.uri(), Some(child));

        let mut config = Config::default();
        config.emulator.start_timeout_secs = 0;
        config.emulator.poll_interval_ms = 10;
        let err = emulator.boot(&config).await.unwrap_err();
        assert!(matches!(err, Error::StartTimeout { .. }));

        emulator.close().await.unwrap();
    }

    #[test]
    fn test_emulator_args_layout() {
        let mut config = Config::default();
        config.emulator.args = vec!["--sdk".into(), "2.1".into()];
        let args = emulator_args(&config, 5000, 9999, Path::new("/apps/app.elf"));

        assert_eq!(args[0..2], ["--model", "nanosp"]);
        assert_eq!(args[2], "--seed");
        assert_eq!(args[3], crate::common::config::DEFAULT_SEED);
        assert_eq!(args[4..6], ["--display", "headless"]);
        assert_eq!(args[6..8], ["--api-port", "5000"]);
        assert_eq!(args[8..10], ["--apdu-port", "9999"]);
        assert_eq!(args[10..12], ["--sdk", "2.1"]);
        assert_eq!(args.last().unwrap(), "/apps/app.elf");
    }

    #[test]
    fn test_free_port_pair_distinct() {
        let (a, b) = free_port_pair().unwrap();
        assert_ne!(a, 0);
        assert_ne!(a, b);
    }

    #[test]
    fn test_resolve_missing_command() {
        let err = resolve_command(Path::new("/nonexistent/speculos")).unwrap_err();
        assert!(matches!(err, Error::EmulatorNotFound { .. }));

        let err = resolve_command(Path::new("no-such-emulator-binary")).unwrap_err();
        assert!(matches!(err, Error::EmulatorNotFound { .. }));
    }

    #[tokio::test]
    async fn test_missing_app_fails_before_spawn() {
        let mut config = Config::default();
        config.app.path = PathBuf::from("/nonexistent/app.elf");
        // Would fail with EmulatorNotFound if the app check came second
        config.emulator.command = PathBuf::from("/nonexistent/speculos");

        let err = Speculos::start(&config).await.err().unwrap();
        assert!(matches!(err, Error::AppNotFound(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_close_is_idempotent() {
        let child = Command::new("sleep")
            .arg("30")
            .kill_on_drop(true)
            .spawn()
            .unwrap();
        let mut emulator = attached("http://127.0.0.1:1", Some(child));

        emulator.close().await.unwrap();
        assert!(emulator.child.is_none());
        emulator.close().await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exit_during_boot_is_reported() {
        let temp = tempfile::tempdir().unwrap();
        let app = temp.path().join("app.elf");
        std::fs::write(&app, b"\x7fELF").unwrap();

        let mut config = Config::default();
        config.app.path = app;
        config.emulator.command = PathBuf::from("/bin/false");
        config.emulator.poll_interval_ms = 10;

        let err = Speculos::start(&config).await.err().unwrap();
        assert!(
            matches!(err, Error::EmulatorExited(_)),
            "unexpected error: {err}"
        );
    }
}
