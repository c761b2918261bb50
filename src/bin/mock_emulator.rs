//! Mock Speculos emulator for integration testing
//!
//! Accepts the Speculos command line, serves the subset of the REST API the
//! driver uses with axum, and answers APDUs after a short review flow:
//! Review → Amount → APPROVE → REJECT. Selecting APPROVE replies `9000`,
//! selecting REJECT replies `6986`.

use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use emu_driver::control::frame;
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

/// Environment variable naming a file that receives one line per button press
const PRESS_LOG_ENV: &str = "MOCK_EMULATOR_PRESS_LOG";

const MAIN_MENU: &[&str] = &["Internet Computer", "is ready"];
const BOOTING: &[&str] = &["Booting..."];
const REVIEW_FLOW: &[&[&str]] = &[
    &["Review", "Transaction"],
    &["Amount", "1.00000000 ICP"],
    &["APPROVE"],
    &["REJECT"],
];

const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";

#[derive(Parser)]
struct Args {
    #[arg(long)]
    model: String,
    #[arg(long)]
    seed: String,
    #[arg(long, default_value = "headless")]
    display: String,
    #[arg(long)]
    api_port: u16,
    #[arg(long)]
    apdu_port: u16,
    /// Exit with this status instead of starting
    #[arg(long)]
    crash: Option<i32>,
    /// Time before the main menu appears, in milliseconds
    #[arg(long, default_value_t = 200)]
    boot_ms: u64,
    /// Time each button press takes before the screen moves, in milliseconds
    #[arg(long, default_value_t = 0)]
    step_delay_ms: u64,
    /// Application ELF
    app: PathBuf,
}

type Reply = (Vec<u8>, u16);

struct Device {
    booted_at: Instant,
    page: Option<usize>,
    pending: Option<oneshot::Sender<Reply>>,
    press_log: Option<PathBuf>,
}

impl Device {
    fn screen(&self) -> &'static [&'static str] {
        if Instant::now() < self.booted_at {
            return BOOTING;
        }
        match self.page {
            Some(i) => REVIEW_FLOW[i],
            None => MAIN_MENU,
        }
    }

    /// Record a press as soon as it is received
    fn log_press(&self, button: &str) {
        let Some(path) = &self.press_log else {
            return;
        };
        if let Ok(mut file) = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
        {
            let _ = writeln!(file, "{}", button);
        }
    }

    fn press(&mut self, button: &str) -> bool {
        let Some(page) = self.page else {
            return matches!(button, "left" | "right" | "both");
        };
        match button {
            "right" => self.page = Some((page + 1).min(REVIEW_FLOW.len() - 1)),
            "left" => self.page = Some(page.saturating_sub(1)),
            "both" => {
                let reply = match REVIEW_FLOW[page] {
                    ["APPROVE"] => Some((vec![0x00, 0x02, 0x05, 0x00], 0x9000)),
                    ["REJECT"] => Some((Vec::new(), 0x6986)),
                    _ => None,
                };
                if let Some(reply) = reply {
                    self.page = None;
                    if let Some(tx) = self.pending.take() {
                        let _ = tx.send(reply);
                    }
                }
            }
            _ => return false,
        }
        true
    }
}

/// Shared state for the REST handlers and the APDU port
struct AppState {
    device: Mutex<Device>,
    step_delay: Duration,
}

type SharedState = Arc<AppState>;

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Some(code) = args.crash {
        eprintln!("mock emulator: crashing with status {}", code);
        std::process::exit(code);
    }
    if !args.app.exists() {
        eprintln!("mock emulator: {} not found", args.app.display());
        std::process::exit(1);
    }
    if args.seed.split_whitespace().count() != 12 {
        eprintln!("mock emulator: seed must have 12 words");
        std::process::exit(1);
    }

    let state = Arc::new(AppState {
        device: Mutex::new(Device {
            booted_at: Instant::now() + Duration::from_millis(args.boot_ms),
            page: None,
            pending: None,
            press_log: std::env::var_os(PRESS_LOG_ENV).map(PathBuf::from),
        }),
        step_delay: Duration::from_millis(args.step_delay_ms),
    });

    let api = TcpListener::bind(("127.0.0.1", args.api_port))
        .await
        .expect("bind api port");
    let apdu = TcpListener::bind(("127.0.0.1", args.apdu_port))
        .await
        .expect("bind apdu port");
    println!(
        "mock emulator: model={} display={} api={} apdu={}",
        args.model, args.display, args.api_port, args.apdu_port
    );

    let apdu_state = state.clone();
    tokio::spawn(async move {
        while let Ok((stream, _)) = apdu.accept().await {
            tokio::spawn(serve_apdu(stream, apdu_state.clone()));
        }
    });

    let app = Router::new()
        .route("/events", get(events_handler))
        .route("/screenshot", get(screenshot_handler))
        .route("/button/{name}", post(button_handler))
        .with_state(state);

    if let Err(e) = axum::serve(api, app).await {
        eprintln!("mock emulator: api server failed: {}", e);
        std::process::exit(1);
    }
}

async fn serve_apdu(mut stream: TcpStream, state: SharedState) {
    while let Ok(Some(_apdu)) = frame::read_command(&mut stream).await {
        let (tx, rx) = oneshot::channel();
        {
            let mut device = state.device.lock().unwrap();
            device.page = Some(0);
            device.pending = Some(tx);
        }
        let Ok((data, status)) = rx.await else {
            return;
        };
        if frame::write_reply(&mut stream, &data, status).await.is_err() {
            return;
        }
    }
}

/// `GET /events`; the `currentscreenonly` query is implied
async fn events_handler(State(state): State<SharedState>) -> Json<Value> {
    let device = state.device.lock().unwrap();
    let events: Vec<Value> = device
        .screen()
        .iter()
        .enumerate()
        .map(|(i, text)| json!({"text": text, "x": 0, "y": 3 + 16 * i}))
        .collect();
    Json(json!({ "events": events }))
}

async fn screenshot_handler(State(state): State<SharedState>) -> impl IntoResponse {
    let mut body = PNG_MAGIC.to_vec();
    body.extend_from_slice(state.device.lock().unwrap().screen().join("\n").as_bytes());
    ([(header::CONTENT_TYPE, "image/png")], body)
}

async fn button_handler(
    State(state): State<SharedState>,
    Path(name): Path<String>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if body["action"] != "press-and-release" {
        return (StatusCode::BAD_REQUEST, Json(json!({"error": "unsupported action"})));
    }

    state.device.lock().unwrap().log_press(&name);
    tokio::time::sleep(state.step_delay).await;

    if state.device.lock().unwrap().press(&name) {
        (StatusCode::OK, Json(json!({})))
    } else {
        (StatusCode::BAD_REQUEST, Json(json!({"error": "unknown button"})))
    }
}
