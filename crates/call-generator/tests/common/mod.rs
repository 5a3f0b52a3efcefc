//! Shared helpers for callgen-core integration tests

#![allow(dead_code)]

use std::collections::HashSet;
use std::io::Write;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use callgen_core::{CallGenError, CallParams, CallToken, RunRegistry, SignalingStack};
use parking_lot::Mutex;

/// Console sink that keeps everything written to it
#[derive(Clone, Default)]
pub struct Capture(Arc<Mutex<Vec<u8>>>);

impl Write for Capture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Capture {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }

    pub fn count(&self, needle: &str) -> usize {
        self.text().matches(needle).count()
    }

    /// Lines printed by one worker
    pub fn worker_lines(&self, index: usize) -> Vec<String> {
        let prefix = format!("{:>3}: ", index);
        self.text()
            .lines()
            .filter(|l| l.starts_with(&prefix))
            .map(str::to_string)
            .collect()
    }
}

pub fn registry() -> (Arc<RunRegistry>, Capture) {
    let capture = Capture::default();
    (Arc::new(RunRegistry::with_console(capture.clone())), capture)
}

/// Short call cycles suitable for a paused clock
pub fn quick_params(repeat: u32) -> CallParams {
    CallParams {
        repeat,
        tmax_est: Duration::ZERO,
        tmin_call: Duration::from_secs(1),
        tmax_call: Duration::from_secs(2),
        tmin_wait: Duration::from_secs(1),
        tmax_wait: Duration::from_secs(1),
    }
}

pub fn destinations(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

/// Scriptable stack that only counts what it is asked to do
#[derive(Default)]
pub struct MockStack {
    pub placed: AtomicUsize,
    pub cleared: AtomicUsize,
    pub clear_all: AtomicUsize,
    /// Calls report established as soon as they exist
    pub answer: bool,
    /// Every placement fails
    pub refuse: bool,
    pub placed_to: Mutex<Vec<String>>,
    calls: Mutex<HashSet<CallToken>>,
    next_token: AtomicU64,
}

impl MockStack {
    pub fn answering() -> Self {
        Self {
            answer: true,
            ..Default::default()
        }
    }

    pub fn silent() -> Self {
        Self::default()
    }

    pub fn refusing() -> Self {
        Self {
            refuse: true,
            ..Default::default()
        }
    }

    pub fn live_calls(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn placed(&self) -> usize {
        self.placed.load(Ordering::SeqCst)
    }

    pub fn cleared(&self) -> usize {
        self.cleared.load(Ordering::SeqCst)
    }

    pub fn clear_all_count(&self) -> usize {
        self.clear_all.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SignalingStack for MockStack {
    async fn place_call(&self, destination: &str) -> callgen_core::Result<CallToken> {
        self.placed_to.lock().push(destination.to_string());
        if self.refuse {
            return Err(CallGenError::placement(destination, "refused by mock"));
        }
        self.placed.fetch_add(1, Ordering::SeqCst);
        let token = CallToken::new(format!("mock-{}", self.next_token.fetch_add(1, Ordering::SeqCst)));
        self.calls.lock().insert(token.clone());
        Ok(token)
    }

    async fn call_exists(&self, token: &CallToken) -> bool {
        self.calls.lock().contains(token)
    }

    async fn is_established(&self, token: &CallToken) -> bool {
        self.answer && self.calls.lock().contains(token)
    }

    async fn clear_call(&self, token: &CallToken) -> bool {
        let removed = self.calls.lock().remove(token);
        if removed {
            self.cleared.fetch_add(1, Ordering::SeqCst);
        }
        removed
    }

    async fn clear_all_calls(&self) {
        self.clear_all.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().clear();
    }
}
