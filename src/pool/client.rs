// Beamline Miner - Free and Open Source Software Statement
//
// This project, beamline-miner, is Free and Open Source Software (FOSS)
// licensed under the MIT License. You are free to use, modify, and distribute
// this software in accordance with the license terms. Contributions are
// welcome via pull requests to the project repository.
//
// File: src/pool/client.rs
// Version: 1.1.0
//
// Stratum-style pool client over a JSON-line TCP connection. One connection
// task owns the socket; the mining engine talks to it only through atomics,
// the current-job slot and the submission channel. When the connection dies
// the client stays dead; host rotation is the caller's job.
//
// Tree Location:
// - src/pool/client.rs (pool client)
// - Depends on: tokio, rand, tracing

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tracing::{debug, info, warn};

use crate::core::{ServerEndpoint, Solution, WorkItem, HEADER_BYTES};
use crate::pool::messages::{login_line, parse_stratum_message, solution_line, StratumMessage};
use crate::pool::JobSource;

/// Jobs kept around after being superseded, so a solution completing against
/// a just-replaced job can still be submitted.
const RECENT_JOBS: usize = 8;

/// One server job, under a locally assigned handle. The handle is what work
/// items carry; the server id is what submissions carry.
#[derive(Debug, Clone)]
struct JobTemplate {
    handle: u64,
    server_id: String,
    header: [u8; HEADER_BYTES],
    difficulty: u64,
}

struct Shared {
    connected: AtomicBool,
    connecting: AtomicBool,
    started: AtomicBool,
    next_handle: AtomicU64,
    nonce: AtomicU64,
    current: Mutex<Option<JobTemplate>>,
    recent: Mutex<VecDeque<JobTemplate>>,
    submit_tx: Mutex<Option<UnboundedSender<String>>>,
}

/// Pool client implementing `JobSource` for one server endpoint.
pub struct StratumClient {
    endpoint: ServerEndpoint,
    shared: Arc<Shared>,
    runtime: Handle,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl StratumClient {
    /// Must be called from within a tokio runtime; the connection task is
    /// spawned onto it when mining starts. The nonce space starts at a
    /// random point so restarts do not research the same region.
    pub fn new(endpoint: ServerEndpoint) -> Self {
        Self {
            endpoint,
            shared: Arc::new(Shared {
                connected: AtomicBool::new(false),
                connecting: AtomicBool::new(false),
                started: AtomicBool::new(false),
                next_handle: AtomicU64::new(1),
                nonce: AtomicU64::new(rand::random()),
                current: Mutex::new(None),
                recent: Mutex::new(VecDeque::with_capacity(RECENT_JOBS)),
                submit_tx: Mutex::new(None),
            }),
            runtime: Handle::current(),
        }
    }

    fn find_job(&self, handle: u64) -> Option<JobTemplate> {
        if let Some(job) = lock(&self.shared.current).as_ref() {
            if job.handle == handle {
                return Some(job.clone());
            }
        }
        lock(&self.shared.recent)
            .iter()
            .find(|j| j.handle == handle)
            .cloned()
    }
}

impl JobSource for StratumClient {
    fn start_working(&self) {
        if self.shared.started.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shared.connecting.store(true, Ordering::SeqCst);
        let shared = Arc::clone(&self.shared);
        let endpoint = self.endpoint.clone();
        self.runtime.spawn(async move {
            connection_task(endpoint, shared).await;
        });
    }

    fn has_connection(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
            || self.shared.connecting.load(Ordering::SeqCst)
    }

    fn is_connecting(&self) -> bool {
        self.shared.connecting.load(Ordering::SeqCst)
    }

    fn has_work(&self) -> bool {
        lock(&self.shared.current).is_some()
    }

    fn get_work(&self) -> Option<WorkItem> {
        let job = lock(&self.shared.current).clone()?;
        let nonce = self.shared.nonce.fetch_add(1, Ordering::Relaxed);
        Some(WorkItem {
            job_id: job.handle,
            header: job.header,
            nonce,
        })
    }

    fn handle_solution(&self, work: &WorkItem, solution: &Solution) {
        let Some(job) = self.find_job(work.job_id) else {
            debug!("Solution for expired job {}, dropped", work.job_id);
            return;
        };
        info!(
            "✅ Solution found for job {} (difficulty {})",
            job.server_id, job.difficulty
        );
        let line = solution_line(&job.server_id, work.nonce, solution);
        if let Some(tx) = lock(&self.shared.submit_tx).as_ref() {
            if tx.send(line).is_ok() {
                return;
            }
        }
        warn!("Connection gone, solution for job {} dropped", job.server_id);
    }
}

async fn connection_task(endpoint: ServerEndpoint, shared: Arc<Shared>) {
    let addr = format!("{}:{}", endpoint.host, endpoint.port);
    info!("🔌 Connecting to {}", addr);

    let stream = match TcpStream::connect(&addr).await {
        Ok(stream) => stream,
        Err(e) => {
            warn!("Connection to {} failed: {}", addr, e);
            shared.connecting.store(false, Ordering::SeqCst);
            return;
        }
    };
    if let Err(e) = stream.set_nodelay(true) {
        debug!("set_nodelay failed: {}", e);
    }

    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    if let Err(e) = writer
        .write_all(format!("{}\n", login_line(&endpoint.key)).as_bytes())
        .await
    {
        warn!("Login to {} failed: {}", addr, e);
        shared.connecting.store(false, Ordering::SeqCst);
        return;
    }

    let (submit_tx, mut submit_rx) = unbounded_channel::<String>();
    *lock(&shared.submit_tx) = Some(submit_tx);
    shared.connected.store(true, Ordering::SeqCst);
    shared.connecting.store(false, Ordering::SeqCst);
    info!("🔌 Connected to {}", addr);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => handle_line(&shared, &line),
                    Ok(None) => {
                        warn!("Server {} closed the connection", addr);
                        break;
                    }
                    Err(e) => {
                        warn!("Read error from {}: {}", addr, e);
                        break;
                    }
                }
            }
            submission = submit_rx.recv() => {
                match submission {
                    Some(line) => {
                        if let Err(e) = writer.write_all(format!("{}\n", line).as_bytes()).await {
                            warn!("Write error to {}: {}", addr, e);
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    shared.connected.store(false, Ordering::SeqCst);
    *lock(&shared.submit_tx) = None;
    *lock(&shared.current) = None;
}

fn handle_line(shared: &Arc<Shared>, line: &str) {
    match parse_stratum_message(line) {
        Some(StratumMessage::Job {
            id,
            input,
            height,
            difficulty,
        }) => {
            let handle = shared.next_handle.fetch_add(1, Ordering::Relaxed);
            let job = JobTemplate {
                handle,
                server_id: id,
                header: input,
                difficulty,
            };
            info!(
                "💼 New job {} at height {} (difficulty {})",
                job.server_id, height, difficulty
            );
            let previous = lock(&shared.current).replace(job);
            if let Some(previous) = previous {
                let mut recent = lock(&shared.recent);
                recent.push_front(previous);
                recent.truncate(RECENT_JOBS);
            }
        }
        Some(StratumMessage::Result {
            id,
            code,
            description,
        }) => {
            if code < 0 {
                warn!("Server rejected {}: {} ({})", id, description, code);
            } else {
                debug!("Server accepted {}: {}", id, description);
            }
        }
        Some(StratumMessage::Unknown(raw)) => {
            debug!("Unhandled server message: {}", raw);
        }
        None => {
            debug!("Non-JSON line from server: {}", line);
        }
    }
}
