//! The game tick that paces Drawbridge's login engine.
//!
//! Login timeouts are counted in ticks, and sessions are handed to
//! gameplay only on a tick, so the engine needs a steady clock that can
//! fall behind without bursting. [`TickScheduler`] provides it: a
//! fixed-rate deadline that the engine awaits inside its `select!` loop.
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         tick = scheduler.wait_for_tick() => {
//!             registry.tick(&gameplay);
//!             scheduler.record_tick_end();
//!         }
//!         Some(done) = completions.recv() => registry.deliver(done),
//!     }
//! }
//! ```
//!
//! Work done between `wait_for_tick` and `record_tick_end` is measured
//! against the tick budget, and slow ticks are logged.

use std::time::{Duration, Instant};

use tokio::time::{self, Instant as TokioInstant};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Scheduler settings.
#[derive(Debug, Clone)]
pub struct TickConfig {
    /// Ticks per second.
    pub tick_rate_hz: u32,
    /// Fraction of the tick budget (0.0 to 1.0) above which a slow tick
    /// is logged.
    pub budget_warn_threshold: f64,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: Self::DEFAULT_TICK_RATE_HZ,
            budget_warn_threshold: 0.80,
        }
    }
}

impl TickConfig {
    /// The classic game server rate: one tick every 50 ms.
    pub const DEFAULT_TICK_RATE_HZ: u32 = 20;
    pub const MAX_TICK_RATE_HZ: u32 = 128;

    pub fn with_rate(tick_rate_hz: u32) -> Self {
        Self {
            tick_rate_hz,
            ..Default::default()
        }
    }

    /// Brings out-of-range values back into range.
    ///
    /// The rate is clamped to `1..=MAX_TICK_RATE_HZ`; a stopped clock would
    /// let logins hang forever. The warn threshold is clamped to `0.0..=1.0`.
    pub fn validated(mut self) -> Self {
        let clamped = self.tick_rate_hz.clamp(1, Self::MAX_TICK_RATE_HZ);
        if clamped != self.tick_rate_hz {
            warn!(
                requested = self.tick_rate_hz,
                using = clamped,
                "tick rate out of range, clamping"
            );
            self.tick_rate_hz = clamped;
        }
        self.budget_warn_threshold = self.budget_warn_threshold.clamp(0.0, 1.0);
        self
    }

    /// Length of one tick.
    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.tick_rate_hz.max(1)))
    }
}

// ---------------------------------------------------------------------------
// Per-tick report
// ---------------------------------------------------------------------------

/// What [`TickScheduler::wait_for_tick`] reports for each tick.
#[derive(Debug, Clone)]
pub struct TickInfo {
    /// Tick number, starting at 1.
    pub tick: u64,
    /// Fixed tick length.
    pub dt: Duration,
    /// The scheduler woke up noticeably late.
    pub overrun: bool,
    /// Ticks dropped to recover from the overrun.
    pub ticks_skipped: u64,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Fixed-rate tick source for the engine loop.
pub struct TickScheduler {
    config: TickConfig,
    tick_duration: Duration,
    tick_count: u64,
    next_tick: TokioInstant,
    tick_start: Option<Instant>,
}

impl TickScheduler {
    pub fn new(config: TickConfig) -> Self {
        let config = config.validated();
        let tick_duration = config.tick_duration();
        debug!(
            rate_hz = config.tick_rate_hz,
            tick_ms = tick_duration.as_secs_f64() * 1000.0,
            "tick scheduler created"
        );
        Self {
            next_tick: TokioInstant::now() + tick_duration,
            config,
            tick_duration,
            tick_count: 0,
            tick_start: None,
        }
    }

    pub fn with_rate(tick_rate_hz: u32) -> Self {
        Self::new(TickConfig::with_rate(tick_rate_hz))
    }

    /// Resolves when the next tick is due.
    ///
    /// A late wake-up drops the ticks it missed and schedules the next one a
    /// full tick from now. Login timeouts stretch by the time lost.
    ///
    /// Cancel-safe: dropping the future before it resolves leaves the
    /// deadline untouched.
    pub async fn wait_for_tick(&mut self) -> TickInfo {
        let due = self.next_tick;
        time::sleep_until(due).await;

        let now = TokioInstant::now();
        let dt = self.tick_duration;
        self.tick_count += 1;
        self.tick_start = Some(Instant::now());

        let late_by = now.saturating_duration_since(due);
        let overrun = late_by > dt / 10;
        let behind = (late_by.as_nanos() / dt.as_nanos().max(1)) as u64;
        let mut ticks_skipped = 0;

        if overrun && behind > 0 {
            ticks_skipped = behind;
            warn!(
                tick = self.tick_count,
                skipped = behind,
                late_ms = late_by.as_secs_f64() * 1000.0,
                "tick overrun, skipping ahead"
            );
        }
        self.next_tick = now + dt;
        trace!(tick = self.tick_count, overrun, "tick");

        TickInfo {
            tick: self.tick_count,
            dt,
            overrun,
            ticks_skipped,
        }
    }

    /// Marks the end of the work for the current tick.
    ///
    /// Returns the measured work time and logs a slow tick when it crosses
    /// the warn threshold. Returns `None` when no tick is in progress.
    pub fn record_tick_end(&mut self) -> Option<Duration> {
        let start = self.tick_start.take()?;
        let elapsed = start.elapsed();
        let utilization = elapsed.as_secs_f64() / self.tick_duration.as_secs_f64();

        if utilization >= self.config.budget_warn_threshold {
            warn!(
                tick = self.tick_count,
                elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                budget_ms = self.tick_duration.as_secs_f64() * 1000.0,
                utilization_pct = format!("{:.1}", utilization * 100.0),
                "slow tick"
            );
        }

        Some(elapsed)
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn tick_rate_hz(&self) -> u32 {
        self.config.tick_rate_hz
    }

    pub fn tick_duration(&self) -> Duration {
        self.tick_duration
    }
}
