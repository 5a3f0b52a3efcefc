//! Call generation scheduler
//!
//! [`CallGenerator`] runs a fixed pool of workers. Each worker repeatedly
//! places a call, holds it for a random time, clears it and pauses for a
//! random delay. A single [`CancellationToken`] stops the whole run; every
//! wait a worker makes is raced against it.
//!
//! ```text
//! initial delay -> [ place -> (await establishment) -> hold -> clear -> delay ]* -> done
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{worker_destinations, CallGenConfig, CallParams, DestinationPolicy};
use crate::error::{CallGenError, Result};
use crate::registry::RunRegistry;
use crate::signaling::{CallToken, SignalingStack};

/// Interval between establishment checks
pub const ESTABLISH_POLL: Duration = Duration::from_millis(100);

/// Spacing of worker start times
const START_STAGGER_MS: u64 = 500;

/// Totals of a finished run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub attempts: u64,
    pub established: u64,
    /// Whether the run was stopped by cancellation
    pub cancelled: bool,
}

/// Uniform duration in `[min, max]` at millisecond resolution
pub fn random_duration<R: Rng + ?Sized>(rng: &mut R, min: Duration, max: Duration) -> Duration {
    let lo = min.as_millis() as u64;
    let hi = max.as_millis() as u64;
    if hi <= lo {
        return Duration::from_millis(lo);
    }
    Duration::from_millis(rng.gen_range(lo..=hi))
}

/// Seconds with millisecond precision, as shown on the console
pub fn format_secs(duration: Duration) -> String {
    format!("{:.3}", duration.as_secs_f64())
}

pub struct CallGenerator {
    params: CallParams,
    workers: Vec<Vec<String>>,
    stack: Arc<dyn SignalingStack>,
    registry: Arc<RunRegistry>,
    cancel: CancellationToken,
    seed: Option<u64>,
}

impl CallGenerator {
    /// Validate the run parameters and lay out `worker_count` workers
    pub fn new(
        params: CallParams,
        destinations: &[String],
        policy: DestinationPolicy,
        worker_count: usize,
        stack: Arc<dyn SignalingStack>,
        registry: Arc<RunRegistry>,
    ) -> Result<Self> {
        params.validate()?;
        if destinations.is_empty() {
            return Err(CallGenError::config("no destinations specified"));
        }

        let workers = (1..=worker_count.max(1))
            .map(|index| worker_destinations(destinations, index, policy))
            .collect();

        Ok(Self {
            params,
            workers,
            stack,
            registry,
            cancel: CancellationToken::new(),
            seed: None,
        })
    }

    pub fn from_config(
        config: &CallGenConfig,
        stack: Arc<dyn SignalingStack>,
        registry: Arc<RunRegistry>,
    ) -> Result<Self> {
        config.validate()?;
        let generator = Self::new(
            config.call_params(),
            &config.destinations,
            config.destination_policy(),
            config.worker_count(),
            stack,
            registry,
        )?;
        Ok(match config.seed {
            Some(seed) => generator.with_seed(seed),
            None => generator,
        })
    }

    /// Make worker timing reproducible; worker `i` draws from `seed + i`
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Token that stops the run when cancelled
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn params(&self) -> &CallParams {
        &self.params
    }

    /// Run every worker to completion or cancellation
    pub async fn run(self) -> RunSummary {
        let CallGenerator {
            params,
            workers,
            stack,
            registry,
            cancel,
            seed,
        } = self;

        let done: Vec<Arc<AtomicBool>> = workers.iter().map(|_| Arc::new(AtomicBool::new(false))).collect();
        let mut handles = Vec::with_capacity(workers.len());

        for (slot, destinations) in workers.into_iter().enumerate() {
            let index = slot + 1;
            let rng = match seed {
                Some(seed) => SmallRng::seed_from_u64(seed.wrapping_add(index as u64)),
                None => SmallRng::from_entropy(),
            };
            let worker = Worker {
                index,
                destinations,
                params,
                stack: stack.clone(),
                registry: registry.clone(),
                cancel: cancel.clone(),
                rng,
            };
            let guard = FinishGuard {
                done: done[slot].clone(),
                registry: registry.clone(),
            };
            handles.push(tokio::spawn(async move {
                let _guard = guard;
                worker.run().await;
            }));
        }
        info!("Started {} call generation workers", handles.len());

        let finished = CancellationToken::new();
        let watcher = tokio::spawn(watch_cancel(
            cancel.clone(),
            finished.clone(),
            done.clone(),
            stack.clone(),
            registry.clone(),
        ));

        while !done.iter().all(|d| d.load(Ordering::SeqCst)) {
            registry.wait_worker_finished().await;
        }
        finished.cancel();

        if let Err(e) = watcher.await {
            warn!("Cancel watcher failed: {}", e);
        }
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("Worker task failed: {}", e);
            }
        }

        let cancelled = cancel.is_cancelled();
        if cancelled {
            debug!("Clearing any calls left after cancellation");
            stack.clear_all_calls().await;
        }

        registry.report_raw("\nAll call sets completed.");
        let summary = RunSummary {
            attempts: registry.attempts(),
            established: registry.established(),
            cancelled,
        };
        if summary.attempts > 0 {
            registry.report_raw(format!(
                "Total calls: {} attempted, {} established",
                summary.attempts, summary.established
            ));
        }
        summary
    }
}

/// Print the abort notice and clear all calls once cancellation fires
async fn watch_cancel(
    cancel: CancellationToken,
    finished: CancellationToken,
    done: Vec<Arc<AtomicBool>>,
    stack: Arc<dyn SignalingStack>,
    registry: Arc<RunRegistry>,
) {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            info!("Cancelling calls");
            registry.report_raw("\nAborting all calls ...");
            for (slot, flag) in done.iter().enumerate() {
                if !flag.load(Ordering::SeqCst) {
                    registry.report_line(Some(slot + 1), "", "Stopping.");
                }
            }
            stack.clear_all_calls().await;
            info!("Cancelled calls");
        }
        _ = finished.cancelled() => {}
    }
}

/// Marks a worker terminal and wakes the driver, even if the worker panicked
struct FinishGuard {
    done: Arc<AtomicBool>,
    registry: Arc<RunRegistry>,
}

impl Drop for FinishGuard {
    fn drop(&mut self) {
        self.done.store(true, Ordering::SeqCst);
        self.registry.worker_finished();
    }
}

struct Worker {
    index: usize,
    destinations: Vec<String>,
    params: CallParams,
    stack: Arc<dyn SignalingStack>,
    registry: Arc<RunRegistry>,
    cancel: CancellationToken,
    rng: SmallRng,
}

impl Worker {
    async fn run(mut self) {
        debug!("Started worker {}", self.index);

        let index = self.index as u64;
        let delay = random_duration(
            &mut self.rng,
            Duration::from_millis(index.saturating_sub(1) * START_STAGGER_MS),
            Duration::from_millis((index + 1) * START_STAGGER_MS),
        );
        self.output("", format!("Initial delay of {} seconds", format_secs(delay)));

        if self.wait(delay).await {
            debug!("Aborted worker {}", self.index);
            return;
        }

        let mut count: u32 = 1;
        loop {
            let destination = self.destinations[(self.index - 1 + count as usize - 1) % self.destinations.len()].clone();
            if self.call_once(&destination, count).await {
                break;
            }

            count = count.saturating_add(1);
            if self.params.repeat > 0 && count > self.params.repeat {
                break;
            }

            let delay = random_duration(&mut self.rng, self.params.tmin_wait, self.params.tmax_wait);
            self.output("", format!("Delaying for {} seconds", format_secs(delay)));
            debug!("Worker {} delaying for {:?}", self.index, delay);
            if self.wait(delay).await {
                break;
            }
        }

        self.output("", "Completed call set.");
        debug!("Finished worker {}", self.index);
    }

    /// One place/hold/clear cycle; returns `true` when the worker should stop
    async fn call_once(&mut self, destination: &str, count: u32) -> bool {
        debug!("Making call to {}", destination);
        let total = self.registry.increment_attempts();

        let token = match self.stack.place_call(destination).await {
            Ok(token) => token,
            Err(e) => {
                warn!("Worker {}: {}", self.index, e);
                self.output("", format!("Call creation to {} failed", destination));
                return false;
            }
        };

        let mut hold = random_duration(&mut self.rng, self.params.tmin_call, self.params.tmax_call);
        let of_repeat = match self.params.calls_per_worker() {
            Some(repeat) => format!(" of {}", repeat),
            None => String::new(),
        };
        self.output(
            token.as_str(),
            format!(
                "Making call {}{} (total={}) for {} seconds to {}",
                count,
                of_repeat,
                total,
                format_secs(hold),
                destination
            ),
        );

        let mut stopping = false;
        if !self.params.tmax_est.is_zero() {
            self.output(
                token.as_str(),
                format!("Waiting {} seconds for establishment", format_secs(self.params.tmax_est)),
            );
            let (proceed, cancelled) = self.await_establishment(&token).await;
            stopping = cancelled;
            if !proceed {
                hold = Duration::ZERO;
            }
        }

        if !hold.is_zero() {
            debug!("Worker {} holding call for {:?}", self.index, hold);
            stopping = self.wait(hold).await;
        }

        self.output(token.as_str(), "Clearing call");
        self.stack.clear_call(&token).await;

        stopping
    }

    /// Poll until the call is established.
    ///
    /// Returns whether to go on holding the call and whether cancellation fired.
    async fn await_establishment(&self, token: &CallToken) -> (bool, bool) {
        let deadline = Instant::now() + self.params.tmax_est;
        while !self.stack.is_established(token).await {
            if self.wait(ESTABLISH_POLL).await {
                return (false, true);
            }
            if Instant::now() >= deadline {
                debug!("Worker {}: establishment timed out for {}", self.index, token);
                return (false, false);
            }
            if !self.stack.call_exists(token).await {
                debug!("Worker {}: call {} vanished", self.index, token);
                return (false, false);
            }
        }
        (true, false)
    }

    /// Sleep for `duration`; returns `true` if cancelled first
    async fn wait(&self, duration: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => true,
            _ = tokio::time::sleep(duration) => false,
        }
    }

    fn output(&self, token: &str, message: impl std::fmt::Display) {
        self.registry.report_line(Some(self.index), token, message);
    }
}
