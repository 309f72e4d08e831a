//! Scale worker thread
//!
//! Dedicated thread that owns the scale session and drives it at a fixed
//! period. Interrupt transfers block for up to their timeout, so they stay
//! off the Tokio runtime; results travel back over the async channel bridge.
//!
//! Only this thread touches the session, which keeps at most one transfer in
//! flight per device.

use crate::error::ScaleError;
use crate::usb::backend::UsbBackend;
use crate::usb::locator::locate_scale;
use crate::usb::session::{PollOutcome, ScaleSession, SessionOptions};
use common::{ScaleCommand, ScaleEvent, ScaleWorker};
use protocol::ScaleCatalog;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Longest sleep between two shutdown checks
const COMMAND_CHECK_INTERVAL: Duration = Duration::from_millis(50);

/// When to give up on a session and locate the scale again
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryPolicy {
    /// Consecutive transfer failures that end the session
    pub failure_threshold: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub poll_interval: Duration,
    pub session: SessionOptions,
    pub catalog: ScaleCatalog,
    /// 1-based scale ordinal, used when re-locating
    pub index: usize,
    /// `None` keeps the session forever, failing transfers included
    pub recovery: Option<RecoveryPolicy>,
}

/// Fixed-period tick schedule
///
/// A tick that overruns its period skips the missed ticks instead of firing
/// them back to back.
#[derive(Debug, Clone, Copy)]
pub struct Ticker {
    period: Duration,
    next: Instant,
}

impl Ticker {
    pub fn new(period: Duration, start: Instant) -> Self {
        Self {
            period,
            next: start,
        }
    }

    /// Deadline of the next tick after `now`
    pub fn advance(&mut self, now: Instant) -> Instant {
        self.next += self.period;
        if self.next <= now && !self.period.is_zero() {
            let behind = now.duration_since(self.next);
            let skipped = u32::try_from(behind.as_nanos() / self.period.as_nanos() + 1)
                .unwrap_or(u32::MAX);
            debug!("Tick overran, skipping {} tick(s)", skipped);
            self.next += self.period * skipped;
        }
        self.next
    }
}

/// Exponential backoff between re-locate attempts
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// Delay to wait now; doubles the next one up to the cap
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

/// Scale worker thread
///
/// Owns the backend and the session, and processes commands from the Tokio
/// runtime between ticks.
pub struct ScaleWorkerThread<B: UsbBackend> {
    backend: B,
    session: Option<ScaleSession<B::Handle>>,
    worker: ScaleWorker,
    settings: WorkerSettings,
    consecutive_failures: u32,
    backoff: Option<Backoff>,
    reopen_at: Option<Instant>,
}

impl<B: UsbBackend> ScaleWorkerThread<B> {
    pub fn new(
        backend: B,
        session: ScaleSession<B::Handle>,
        worker: ScaleWorker,
        settings: WorkerSettings,
    ) -> Self {
        let backoff = settings
            .recovery
            .map(|policy| Backoff::new(policy.initial_backoff, policy.max_backoff));

        Self {
            backend,
            session: Some(session),
            worker,
            settings,
            consecutive_failures: 0,
            backoff,
            reopen_at: None,
        }
    }

    /// Run the polling loop until Shutdown
    ///
    /// The session is closed before this returns.
    pub fn run(mut self) {
        info!(
            "Scale worker started (poll interval {} ms)",
            self.settings.poll_interval.as_millis()
        );

        let mut ticker = Ticker::new(self.settings.poll_interval, Instant::now());

        loop {
            if let Some(ScaleCommand::Shutdown) = self.worker.try_recv_command() {
                info!("Scale worker shutting down");
                break;
            }

            if !self.tick(Instant::now()) {
                info!("Event channel closed, stopping scale worker");
                break;
            }

            let deadline = ticker.advance(Instant::now());
            if self.wait_until(deadline) {
                info!("Scale worker shutting down");
                break;
            }
        }

        if let Some(mut session) = self.session.take() {
            session.close();
        }
        info!("Scale worker stopped");
    }

    /// One tick; `false` once nobody listens for events anymore
    pub fn tick(&mut self, now: Instant) -> bool {
        let Some(session) = self.session.as_mut() else {
            return self.try_reopen(now);
        };

        let event = match session.poll_once() {
            Ok(PollOutcome::Measurement(weight)) => {
                self.consecutive_failures = 0;
                Some(ScaleEvent::Measurement { weight })
            }
            Ok(PollOutcome::Ignored(_)) => {
                self.consecutive_failures = 0;
                None
            }
            Err(e) => {
                self.consecutive_failures += 1;
                let error = match &e {
                    ScaleError::Transfer(source) => format!("{:?}", source),
                    other => other.to_string(),
                };
                error!("{} ({})", e, error);
                self.maybe_abandon_session(now);
                Some(ScaleEvent::TransferFailed { error })
            }
        };

        match event {
            Some(event) => self.worker.send_event(event).is_ok(),
            None => true,
        }
    }

    /// Close the session if the recovery policy says so
    fn maybe_abandon_session(&mut self, now: Instant) {
        let Some(policy) = self.settings.recovery else {
            return;
        };
        if self.consecutive_failures < policy.failure_threshold {
            return;
        }

        warn!(
            "{} consecutive transfer failures, closing session to locate the scale again",
            self.consecutive_failures
        );
        if let Some(mut session) = self.session.take() {
            session.close();
        }
        self.consecutive_failures = 0;

        let delay = self
            .backoff
            .as_mut()
            .map(Backoff::next_delay)
            .unwrap_or(policy.initial_backoff);
        self.reopen_at = Some(now + delay);
    }

    fn try_reopen(&mut self, now: Instant) -> bool {
        if self.reopen_at.is_some_and(|at| now < at) {
            return true;
        }

        let reopened = locate_scale(
            &self.backend,
            &self.settings.catalog,
            self.settings.index,
        )
        .and_then(|device| ScaleSession::open(&self.backend, &device, self.settings.session));

        match reopened {
            Ok(session) => {
                let location = session.location().to_string();
                info!("Scale session reopened at {}", location);
                self.session = Some(session);
                self.reopen_at = None;
                if let Some(backoff) = self.backoff.as_mut() {
                    backoff.reset();
                }
                self.worker
                    .send_event(ScaleEvent::SessionReopened { location })
                    .is_ok()
            }
            Err(e) => {
                let delay = self
                    .backoff
                    .as_mut()
                    .map(Backoff::next_delay)
                    .unwrap_or(self.settings.poll_interval);
                warn!(
                    "Failed to reopen scale ({}), retrying in {} ms",
                    e,
                    delay.as_millis()
                );
                self.reopen_at = Some(now + delay);
                true
            }
        }
    }

    /// Sleep until `deadline`; `true` if Shutdown arrived meanwhile
    fn wait_until(&self, deadline: Instant) -> bool {
        loop {
            if let Some(ScaleCommand::Shutdown) = self.worker.try_recv_command() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            std::thread::sleep((deadline - now).min(COMMAND_CHECK_INTERVAL));
        }
    }

    #[cfg(test)]
    fn has_session(&self) -> bool {
        self.session.is_some()
    }
}

/// Spawn the scale worker thread
///
/// The thread owns `backend` and `session` until a Shutdown command arrives
/// or the bridge is dropped.
pub fn spawn_scale_worker<B>(
    backend: B,
    session: ScaleSession<B::Handle>,
    worker: ScaleWorker,
    settings: WorkerSettings,
) -> std::io::Result<std::thread::JoinHandle<()>>
where
    B: UsbBackend + Send + 'static,
    B::Handle: Send + 'static,
{
    std::thread::Builder::new()
        .name("scale-worker".to_string())
        .spawn(move || {
            ScaleWorkerThread::new(backend, session, worker, settings).run();
        })
}
