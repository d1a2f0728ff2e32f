//! Execution contexts of the node: the sampler timer loop, the processing
//! worker, the transport maintenance loop, and the mock publisher.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use spin_sleep::SpinSleeper;

use crate::power_quality::acquisition::{AdcPair, Drain, Sampler, TickOutcome};
use crate::power_quality::mock::MockGenerator;
use crate::power_quality::print;
use crate::power_quality::processing::MeasurementPipeline;
use crate::transport::{PublishOutcome, Publisher, Transport};

pub const WORKER_POLL: Duration = Duration::from_millis(10);
pub const MAINTENANCE_PERIOD: Duration = Duration::from_secs(1);
pub const RECONNECT_BACKOFF: Duration = Duration::from_secs(5);

// Longest uninterrupted sleep, so loops notice shutdown promptly.
const SHUTDOWN_SLICE: Duration = Duration::from_millis(100);

/// Minimum interval between publishes, on the monotonic clock.
#[derive(Debug, Clone)]
pub struct PublishGate {
    interval: Duration,
    last: Option<Instant>,
}

impl PublishGate {
    pub fn new(interval: Duration) -> Self {
        Self { interval, last: None }
    }

    /// True when a publish is due at `now`; the gate then restarts from `now`.
    /// The first call is always due.
    pub fn ready(&mut self, now: Instant) -> bool {
        let due = match self.last {
            Some(last) => now.saturating_duration_since(last) >= self.interval,
            None => true,
        };
        if due {
            self.last = Some(now);
        }
        due
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SamplerStats {
    pub ticks: u64,
    pub windows: u64,
    pub held: u64, // Ticks skipped while the worker held the window
}

/*
* @brief Drive the sampler at a fixed period until shutdown.
* @param sampler Producer half of the acquisition buffer
* @param adc Analog front end
* @param period Tick period
* @param shutdown Stop flag
* @return Tick counters
* @note Deadlines advance by one period per tick so sleep jitter does not
*       accumulate. After an overrun longer than a full window the schedule
*       restarts from the current instant.
*/
pub fn run_sampler<A: AdcPair + ?Sized>(
    sampler: &mut Sampler<'_>,
    adc: &mut A,
    period: Duration,
    shutdown: &AtomicBool,
) -> SamplerStats {
    let sleeper = SpinSleeper::default();
    let max_lag = period * crate::power_quality::types::WINDOW_SIZE as u32;
    let mut stats = SamplerStats::default();
    let mut deadline = Instant::now();

    while !shutdown.load(Ordering::Relaxed) {
        match sampler.on_tick(adc) {
            TickOutcome::Stored => {}
            TickOutcome::WindowComplete => stats.windows += 1,
            TickOutcome::Held => stats.held += 1,
        }
        stats.ticks += 1;

        deadline += period;
        let now = Instant::now();
        if deadline > now {
            sleeper.sleep(deadline - now);
        } else if now - deadline > max_lag {
            deadline = now;
        }
    }

    stats
}

/// What one worker pass did with a ready window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Published(PublishOutcome),
    /// Publish interval not elapsed; window released unprocessed.
    NotDue,
    /// Pipeline or encoding error; the cycle was skipped.
    Failed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub sent: u64,
    pub dropped: u64,
    pub not_due: u64,
    pub failed: u64,
}

impl WorkerStats {
    pub fn published(&self) -> u64 {
        self.sent + self.dropped
    }

    fn record(&mut self, outcome: CycleOutcome) {
        match outcome {
            CycleOutcome::Published(PublishOutcome::Sent) => self.sent += 1,
            CycleOutcome::Published(PublishOutcome::Dropped) => self.dropped += 1,
            CycleOutcome::NotDue => self.not_due += 1,
            CycleOutcome::Failed => self.failed += 1,
        }
    }
}

/*
* @brief Handle the ready window, if any.
* @param drain Consumer half of the acquisition buffer
* @param pipeline Measurement pipeline
* @param publisher Publication adapter
* @param gate Publish interval gate
* @param now Current monotonic time
* @return None when no window was ready
* @note The window stays held until the result has been handed to the transport.
*/
pub fn service_window(
    drain: &mut Drain<'_>,
    pipeline: &mut MeasurementPipeline,
    publisher: &Publisher,
    gate: &mut PublishGate,
    now: Instant,
) -> Option<CycleOutcome> {
    let ready = drain.poll()?;

    if !gate.ready(now) {
        ready.release();
        return Some(CycleOutcome::NotDue);
    }

    let outcome = match pipeline.process(&ready.to_window()) {
        Ok(result) => {
            print::log_measurement(&result);
            match publisher.publish(&result) {
                Ok(outcome) => CycleOutcome::Published(outcome),
                Err(e) => {
                    log::warn!("Cycle skipped: {}", e);
                    CycleOutcome::Failed
                }
            }
        }
        Err(e) => {
            log::warn!("Cycle skipped: {}", e);
            CycleOutcome::Failed
        }
    };

    ready.release();
    Some(outcome)
}

/// Poll loop of the processing worker. Stops on shutdown or after
/// `max_cycles` publish attempts.
pub fn run_worker(
    drain: &mut Drain<'_>,
    pipeline: &mut MeasurementPipeline,
    publisher: &Publisher,
    shutdown: &AtomicBool,
    max_cycles: Option<u64>,
) -> WorkerStats {
    let mut gate = PublishGate::new(pipeline.config.publish_interval);
    let mut stats = WorkerStats::default();

    while !shutdown.load(Ordering::Relaxed) {
        if let Some(outcome) = service_window(drain, pipeline, publisher, &mut gate, Instant::now()) {
            stats.record(outcome);
            if max_cycles.is_some_and(|max| stats.published() >= max) {
                break;
            }
        }
        thread::sleep(WORKER_POLL);
    }

    log::info!(
        "Worker stopped: {} sent, {} dropped, {} skipped",
        stats.sent,
        stats.dropped,
        stats.failed
    );
    stats
}

/// Session upkeep, outside the measurement path. Blocks only within its own
/// iteration; a failed attempt is not retried for `RECONNECT_BACKOFF`.
pub fn run_maintenance(transport: &dyn Transport, shutdown: &AtomicBool) {
    let mut retry_at: Option<Instant> = None;

    while !shutdown.load(Ordering::Relaxed) {
        let now = Instant::now();
        let due = retry_at.map_or(true, |t| now >= t);

        if due && !transport.is_connected() {
            match transport.maintain() {
                Ok(()) => retry_at = None,
                Err(e) => {
                    log::warn!("Connection failed: {}, retrying in {} s", e, RECONNECT_BACKOFF.as_secs());
                    retry_at = Some(now + RECONNECT_BACKOFF);
                }
            }
        }

        sleep_unless_shutdown(MAINTENANCE_PERIOD, shutdown);
    }
}

/// Publish generated records at the configured interval.
pub fn run_mock(
    generator: &mut MockGenerator,
    publisher: &Publisher,
    shutdown: &AtomicBool,
    max_cycles: Option<u64>,
) -> WorkerStats {
    let interval = generator.config().publish_interval;
    let mut stats = WorkerStats::default();

    while !shutdown.load(Ordering::Relaxed) {
        let (result, anomaly) = generator.next_measurement();
        if let Some(anomaly) = anomaly {
            log::info!("Injected anomaly: {}", anomaly.as_str());
        }
        print::log_measurement(&result);

        let outcome = match publisher.publish(&result) {
            Ok(outcome) => CycleOutcome::Published(outcome),
            Err(e) => {
                log::warn!("Cycle skipped: {}", e);
                CycleOutcome::Failed
            }
        };
        stats.record(outcome);

        if max_cycles.is_some_and(|max| stats.published() >= max) {
            break;
        }
        sleep_unless_shutdown(interval, shutdown);
    }

    stats
}

fn sleep_unless_shutdown(duration: Duration, shutdown: &AtomicBool) {
    let end = Instant::now() + duration;
    loop {
        if shutdown.load(Ordering::Relaxed) {
            return;
        }
        let now = Instant::now();
        if now >= end {
            return;
        }
        thread::sleep((end - now).min(SHUTDOWN_SLICE));
    }
}
