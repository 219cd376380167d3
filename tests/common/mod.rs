#![allow(dead_code)]

use async_trait::async_trait;
use span_collector::device::PanelSource;
use span_collector::model::{BranchEnergyRow, MainEnergyRow};
use span_collector::store::EnergyStore;
use span_collector::{DeviceError, Reading, StoreError};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::io;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub fn sample_reading(branches: usize) -> Reading {
    serde_json::from_value(sample_payload(branches)).unwrap()
}

pub fn sample_payload(branches: usize) -> serde_json::Value {
    let branches: Vec<serde_json::Value> = (1..=branches)
        .map(|id| {
            serde_json::json!({
                "id": id,
                "relayState": "CLOSED",
                "instantPowerW": -10.0 * id as f64,
                "importedActiveEnergyWh": 100.0 * id as f64,
                "exportedActiveEnergyWh": 1.5,
                "measureStartTsMs": 1_700_000_000_000_i64,
                "measureDurationMs": 1000,
                "isMeasureValid": id != 2
            })
        })
        .collect();
    serde_json::json!({
        "mainRelayState": "CLOSED",
        "mainMeterEnergy": { "producedEnergyWh": 5000.0, "consumedEnergyWh": 123456.0 },
        "instantGridPowerW": 42,
        "feedthroughPowerW": 0,
        "feedthroughEnergy": { "producedEnergyWh": 0.0, "consumedEnergyWh": 0.0 },
        "gridSampleStartMs": 1_700_000_000_000_i64,
        "gridSampleEndMs": 1_700_000_001_000_i64,
        "dsmGridState": "DSM_GRID_UP",
        "dsmState": "DSM_ON_GRID",
        "currentRunConfig": "PANEL_ON_GRID",
        "branches": branches
    })
}

/// Reading whose third branch reuses id 1.
pub fn duplicate_branch_ids() -> Scripted {
    let mut payload = sample_payload(3);
    payload["branches"][2]["id"] = serde_json::json!(1);
    Reading::from_slice(&serde_json::to_vec(&payload).unwrap())
}

pub type Scripted = Result<Reading, DeviceError>;

/// Panel that replays a script, then falls back to a fixed answer.
pub struct FakePanel {
    script: Mutex<VecDeque<Scripted>>,
    fallback: fn() -> Scripted,
    calls: AtomicUsize,
}

impl FakePanel {
    pub fn new(script: Vec<Scripted>, fallback: fn() -> Scripted) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn always(fallback: fn() -> Scripted) -> Self {
        Self::new(Vec::new(), fallback)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PanelSource for FakePanel {
    async fn fetch(&self) -> Result<Reading, DeviceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| (self.fallback)())
    }
}

pub fn timeout() -> Scripted {
    Err(DeviceError::Timeout("operation timed out".into()))
}

pub fn ok_three_branches() -> Scripted {
    Ok(sample_reading(3))
}

#[derive(Clone, Copy)]
pub enum Failure {
    Never,
    /// Fail the first `n` calls, then succeed
    Times(usize, fn() -> StoreError),
    Always(fn() -> StoreError),
}

pub fn constraint_violation() -> StoreError {
    StoreError::Rejected {
        status: 409,
        body: "duplicate key value violates unique constraint \"branch_energy_pkey\"".into(),
    }
}

pub fn connection_reset() -> StoreError {
    StoreError::Db(sqlx::Error::Io(std::io::Error::new(
        std::io::ErrorKind::ConnectionReset,
        "connection reset by peer",
    )))
}

/// In-memory store recording committed rows and every attempt.
pub struct FakeStore {
    pub main: Mutex<Vec<MainEnergyRow>>,
    pub branches: Mutex<Vec<BranchEnergyRow>>,
    main_failure: Failure,
    branch_failure: Failure,
    main_calls: AtomicUsize,
    branch_calls: AtomicUsize,
    closed: AtomicBool,
}

impl FakeStore {
    pub fn new(main_failure: Failure, branch_failure: Failure) -> Self {
        Self {
            main: Mutex::new(Vec::new()),
            branches: Mutex::new(Vec::new()),
            main_failure,
            branch_failure,
            main_calls: AtomicUsize::new(0),
            branch_calls: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub fn healthy() -> Self {
        Self::new(Failure::Never, Failure::Never)
    }

    pub fn main_rows(&self) -> Vec<MainEnergyRow> {
        self.main.lock().unwrap().clone()
    }

    pub fn branch_rows(&self) -> Vec<BranchEnergyRow> {
        self.branches.lock().unwrap().clone()
    }

    pub fn main_calls(&self) -> usize {
        self.main_calls.load(Ordering::SeqCst)
    }

    pub fn branch_calls(&self) -> usize {
        self.branch_calls.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

fn check(failure: Failure, call: usize) -> Result<(), StoreError> {
    match failure {
        Failure::Never => Ok(()),
        Failure::Times(n, make) if call < n => Err(make()),
        Failure::Times(..) => Ok(()),
        Failure::Always(make) => Err(make()),
    }
}

#[async_trait]
impl EnergyStore for FakeStore {
    async fn insert_main(&self, row: &MainEnergyRow) -> Result<(), StoreError> {
        let call = self.main_calls.fetch_add(1, Ordering::SeqCst);
        check(self.main_failure, call)?;
        self.main.lock().unwrap().push(row.clone());
        Ok(())
    }

    async fn insert_branches(&self, rows: &[BranchEnergyRow]) -> Result<(), StoreError> {
        let call = self.branch_calls.fetch_add(1, Ordering::SeqCst);
        check(self.branch_failure, call)?;
        self.branches.lock().unwrap().extend_from_slice(rows);
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Accept one connection, capture the raw request, answer with `response`.
/// `None` drops the socket without answering.
pub async fn serve_once(response: Option<String>) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let handle = tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.unwrap();
        let request = read_request(&mut sock).await;
        if let Some(resp) = response {
            sock.write_all(resp.as_bytes()).await.unwrap();
            sock.shutdown().await.ok();
        }
        request
    });
    (addr, handle)
}

pub fn http_response(status_line: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    )
}

async fn read_request(sock: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = sock.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(head_end) = find(&buf, b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..head_end]).to_lowercase();
            let body_len = head
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= head_end + 4 + body_len {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Formatted log output captured for the current thread.
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    /// Route this thread's events into the buffer until the guard drops.
    pub fn install() -> (Self, tracing::subscriber::DefaultGuard) {
        let logs = Self::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_target(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        (logs, tracing::subscriber::set_default(subscriber))
    }

    pub fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.0.lock().unwrap())
            .lines()
            .map(str::to_string)
            .collect()
    }

    pub fn at_level(&self, level: &str) -> Vec<String> {
        let tag = format!(" {level} ");
        self.lines()
            .into_iter()
            .filter(|l| l.contains(&tag))
            .collect()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
