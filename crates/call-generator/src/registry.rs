//! Run-wide counters, console output and worker completion signalling
//!
//! Every worker and every stack callback shares one [`RunRegistry`]. Console
//! lines from concurrent tasks never interleave because each line is built
//! first and written under a single lock.

use std::fmt::Display;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{info, warn};

/// Width of the call token column on the console
pub const TOKEN_WIDTH: usize = 20;

pub struct RunRegistry {
    attempts: AtomicU64,
    established: AtomicU64,
    console: Mutex<Box<dyn Write + Send>>,
    worker_done: Notify,
}

impl std::fmt::Debug for RunRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunRegistry")
            .field("attempts", &self.attempts())
            .field("established", &self.established())
            .finish_non_exhaustive()
    }
}

impl Default for RunRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RunRegistry {
    /// Registry printing to standard output
    pub fn new() -> Self {
        Self::with_console(std::io::stdout())
    }

    pub fn with_console<W: Write + Send + 'static>(console: W) -> Self {
        Self {
            attempts: AtomicU64::new(0),
            established: AtomicU64::new(0),
            console: Mutex::new(Box::new(console)),
            worker_done: Notify::new(),
        }
    }

    /// Count a call attempt, returning the new total
    pub fn increment_attempts(&self) -> u64 {
        self.attempts.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Count an established call, returning the new total
    pub fn increment_established(&self) -> u64 {
        self.established.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn established(&self) -> u64 {
        self.established.load(Ordering::SeqCst)
    }

    /// Print one line tagged with the worker index and call token
    pub fn report_line(&self, worker: Option<usize>, token: &str, message: impl Display) {
        let line = format_line(worker, token, &message);
        info!(target: "callgen::console", "{}", line);
        self.write_console(&line);
    }

    /// Print a line with no worker/token prefix
    pub fn report_raw(&self, message: impl Display) {
        let line = message.to_string();
        info!(target: "callgen::console", "{}", line);
        self.write_console(&line);
    }

    fn write_console(&self, line: &str) {
        let mut console = self.console.lock();
        if let Err(e) = writeln!(console, "{}", line).and_then(|_| console.flush()) {
            warn!("Console write failed: {}", e);
        }
    }

    /// Wake whoever is waiting for worker completion
    pub fn worker_finished(&self) {
        self.worker_done.notify_one();
    }

    /// Wait for the next worker completion signal.
    ///
    /// A signal raised while nobody was waiting is kept and consumed here.
    pub async fn wait_worker_finished(&self) {
        self.worker_done.notified().await;
    }
}

fn format_line(worker: Option<usize>, token: &str, message: &dyn Display) -> String {
    let index = match worker {
        Some(i) => format!("{:>3}", i),
        None => "   ".to_string(),
    };
    let token: String = token.chars().take(TOKEN_WIDTH).collect();
    format!("{}: {:>width$}: {}", index, token, message, width = TOKEN_WIDTH)
}
