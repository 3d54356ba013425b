//! Rest countdown between sets.
//!
//! [`CooldownTimer`] is a two-state machine (idle / running until an end
//! time). While running, a tokio task ticks once per period and recomputes
//! the remaining seconds from the clock, so the countdown stays correct
//! across suspension. The countdown is mirrored to a [`RestDisplay`] and a
//! [`Notifier`]; failures on either side are logged and otherwise ignored.
//!
//! `start`, `resume_if_needed` and any cancel that has a display to dismiss
//! must run inside a tokio runtime.

use crate::channel::{DisplayHandle, Notifier, RestDisplay};
use crate::clock::Clock;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

pub const DEFAULT_REST_SECONDS: u64 = 120;
pub const DEFAULT_NOTIFICATION_ID: &str = "rest_done";

/// Tunables for the countdown
#[derive(Clone, Debug)]
pub struct CooldownSettings {
    pub tick: Duration,
    pub notification_id: String,
}

impl Default for CooldownSettings {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(1),
            notification_id: DEFAULT_NOTIFICATION_ID.to_string(),
        }
    }
}

#[derive(Default)]
struct TimerState {
    end: Option<DateTime<Utc>>,
    remaining: u64,
    total: Duration,
    /// Bumped on every start so late display registrations can be recognized
    generation: u64,
    ticker: Option<JoinHandle<()>>,
    display: Option<DisplayHandle>,
}

struct Shared {
    state: Mutex<TimerState>,
    display: Arc<dyn RestDisplay>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    settings: CooldownSettings,
}

/// Handle to the app's single rest countdown
///
/// Clones share the same countdown.
#[derive(Clone)]
pub struct CooldownTimer {
    shared: Arc<Shared>,
}

impl CooldownTimer {
    pub fn new(
        display: Arc<dyn RestDisplay>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::with_settings(display, notifier, clock, CooldownSettings::default())
    }

    pub fn with_settings(
        display: Arc<dyn RestDisplay>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        settings: CooldownSettings,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(TimerState::default()),
                display,
                notifier,
                clock,
                settings,
            }),
        }
    }

    /// Start counting down `duration`, replacing any running countdown
    pub fn start(&self, duration: Duration) -> Result<()> {
        if duration.as_secs() == 0 {
            return Err(Error::Validation(
                "rest duration must be at least one second".into(),
            ));
        }
        let span = chrono::Duration::from_std(duration)
            .map_err(|e| Error::Validation(format!("rest duration out of range: {}", e)))?;
        let start = self.shared.clock.now();
        let end = start
            .checked_add_signed(span)
            .ok_or_else(|| Error::Validation("rest duration out of range".into()))?;
        let runtime = current_runtime()?;

        if self.shared.lock().end.is_some() {
            tracing::debug!("Restarting running cooldown");
            self.shared.cancel();
        }

        let generation = {
            let mut state = self.shared.lock();
            state.end = Some(end);
            state.remaining = duration.as_secs();
            state.total = duration;
            state.generation += 1;
            state.generation
        };

        let secs = duration.as_secs();
        if let Err(e) = self.shared.notifier.schedule(
            &self.shared.settings.notification_id,
            duration,
            "Rest Time Over",
            &format!("Your {} seconds rest is complete", secs),
        ) {
            tracing::warn!("Notification error: {}", e);
        }

        let shared = Arc::clone(&self.shared);
        runtime.spawn(async move {
            shared.register_display(generation, start, duration).await;
        });

        let ticker = spawn_ticker(&runtime, &self.shared);
        self.shared.lock().ticker = Some(ticker);

        tracing::info!("Started {}s cooldown", secs);
        Ok(())
    }

    /// Stop the countdown and clear its side channels
    ///
    /// Local state is reset before this returns; the notification removal and
    /// display dismissal complete in the background.
    pub fn cancel(&self) {
        self.shared.cancel();
    }

    /// Recompute the remaining time, finishing the countdown when it reaches zero
    ///
    /// Returns whether the countdown is still running.
    pub fn tick(&self) -> bool {
        self.shared.tick()
    }

    /// Restart ticking after the app returns to the foreground
    ///
    /// The display and notification from the original start are assumed to
    /// still be live. Returns whether the countdown resumed.
    pub fn resume_if_needed(&self) -> bool {
        let now = self.shared.clock.now();
        let mut state = self.shared.lock();
        let end = state.end;

        match end {
            Some(end) if now < end => {
                let runtime = match current_runtime() {
                    Ok(rt) => rt,
                    Err(e) => {
                        tracing::warn!("Cannot resume cooldown: {}", e);
                        return false;
                    }
                };
                state.remaining = whole_seconds_until(end, now);
                if let Some(old) = state.ticker.take() {
                    old.abort();
                }
                state.ticker = Some(spawn_ticker(&runtime, &self.shared));
                tracing::info!("Resumed cooldown with {} seconds remaining", state.remaining);
                true
            }
            _ => {
                let had_end = state.end.take().is_some();
                state.remaining = 0;
                let ticker = state.ticker.take();
                let display = state.display.take();
                drop(state);

                if let Some(ticker) = ticker {
                    ticker.abort();
                }
                if let Some(handle) = display {
                    self.shared.dismiss_in_background(handle);
                }
                if had_end {
                    tracing::debug!("Cooldown expired while suspended");
                }
                false
            }
        }
    }

    /// Whole seconds left
    pub fn remaining(&self) -> u64 {
        self.shared.lock().remaining
    }

    pub fn is_active(&self) -> bool {
        self.remaining() > 0
    }

    /// Length of the current or most recent countdown
    pub fn total(&self) -> Duration {
        self.shared.lock().total
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.shared.lock().end
    }

    /// Fraction of the countdown already elapsed, in `[0, 1]`
    pub fn progress(&self) -> f64 {
        let state = self.shared.lock();
        let total = state.total.as_secs_f64();
        if total <= 0.0 || state.end.is_none() {
            return 0.0;
        }
        ((total - state.remaining as f64) / total).clamp(0.0, 1.0)
    }

    /// Remaining time as `m:ss`
    pub fn time_string(&self) -> String {
        format_countdown(self.remaining())
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, TimerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn tick(&self) -> bool {
        let now = self.clock.now();
        let mut state = self.lock();
        let Some(end) = state.end else {
            return false;
        };
        state.remaining = whole_seconds_until(end, now);
        if state.remaining > 0 {
            return true;
        }
        drop(state);
        self.cancel();
        false
    }

    fn cancel(&self) {
        let (was_running, ticker, display) = {
            let mut state = self.lock();
            let was_running = state.end.take().is_some();
            state.remaining = 0;
            (was_running, state.ticker.take(), state.display.take())
        };

        if let Some(ticker) = ticker {
            ticker.abort();
        }
        self.notifier.cancel(&self.settings.notification_id);
        if let Some(handle) = display {
            self.dismiss_in_background(handle);
        }

        if was_running {
            tracing::info!("Cooldown cancelled");
        }
    }

    async fn register_display(&self, generation: u64, start: DateTime<Utc>, duration: Duration) {
        let handle = match self.display.register(start, duration).await {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!("Rest display error: {}", e);
                return;
            }
        };

        let stale = {
            let mut state = self.lock();
            if state.generation == generation && state.end.is_some() {
                state.display = Some(handle.clone());
                false
            } else {
                true
            }
        };

        if stale {
            tracing::debug!("Dismissing display registered after its countdown ended");
            self.display.dismiss(handle).await;
        } else {
            tracing::debug!("Started rest display {:?}", handle);
        }
    }

    fn dismiss_in_background(&self, handle: DisplayHandle) {
        let display = Arc::clone(&self.display);
        match Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    display.dismiss(handle).await;
                });
            }
            Err(_) => tracing::warn!("No runtime to dismiss rest display {:?}", handle),
        }
    }
}

fn current_runtime() -> Result<Handle> {
    Handle::try_current()
        .map_err(|e| Error::Runtime(format!("cooldown needs a tokio runtime: {}", e)))
}

fn spawn_ticker(runtime: &Handle, shared: &Arc<Shared>) -> JoinHandle<()> {
    let shared = Arc::clone(shared);
    let period = shared.settings.tick.max(Duration::from_millis(1));
    runtime.spawn(async move {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            if !shared.tick() {
                break;
            }
        }
    })
}

fn whole_seconds_until(end: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    (end - now).num_seconds().max(0) as u64
}

/// Format seconds as `m:ss`
pub fn format_countdown(seconds: u64) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use tokio::sync::Notify;

    #[derive(Default)]
    struct FakeDisplay {
        registered: Mutex<Vec<DisplayHandle>>,
        dismissed: Mutex<Vec<DisplayHandle>>,
        fail: bool,
        gate: Option<Arc<Notify>>,
    }

    #[async_trait]
    impl RestDisplay for FakeDisplay {
        async fn register(&self, _start: DateTime<Utc>, _duration: Duration) -> Result<DisplayHandle> {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if self.fail {
                return Err(Error::ExternalChannel("activities disabled".into()));
            }
            let mut registered = self.registered.lock().unwrap();
            let handle = DisplayHandle(format!("activity-{}", registered.len()));
            registered.push(handle.clone());
            Ok(handle)
        }

        async fn dismiss(&self, handle: DisplayHandle) {
            self.dismissed.lock().unwrap().push(handle);
        }
    }

    #[derive(Default)]
    struct FakeNotifier {
        scheduled: Mutex<Vec<(String, Duration, String)>>,
        cancelled: Mutex<Vec<String>>,
    }

    impl Notifier for FakeNotifier {
        fn schedule(&self, id: &str, fire_after: Duration, _title: &str, body: &str) -> Result<()> {
            self.scheduled
                .lock()
                .unwrap()
                .push((id.to_string(), fire_after, body.to_string()));
            Ok(())
        }

        fn cancel(&self, id: &str) {
            self.cancelled.lock().unwrap().push(id.to_string());
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, 6, 9, 0, 0).unwrap()
    }

    fn timer_with(
        display: Arc<FakeDisplay>,
        tick: Duration,
    ) -> (CooldownTimer, Arc<FakeNotifier>, Arc<ManualClock>) {
        crate::logging::init_test();
        let notifier = Arc::new(FakeNotifier::default());
        let clock = Arc::new(ManualClock::new(t0()));
        let timer = CooldownTimer::with_settings(
            display,
            notifier.clone(),
            clock.clone(),
            CooldownSettings {
                tick,
                ..CooldownSettings::default()
            },
        );
        (timer, notifier, clock)
    }

    /// Let spawned background tasks run
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn test_start_then_cancel_resets() {
        let display = Arc::new(FakeDisplay::default());
        let (timer, notifier, _) = timer_with(display.clone(), Duration::from_secs(3600));

        timer.start(Duration::from_secs(120)).unwrap();
        assert!(timer.is_active());
        assert_eq!(timer.remaining(), 120);
        assert_eq!(timer.time_string(), "2:00");
        settle().await;

        timer.cancel();
        assert_eq!(timer.remaining(), 0);
        assert!(!timer.is_active());
        assert_eq!(timer.end_time(), None);

        settle().await;
        let scheduled = notifier.scheduled.lock().unwrap().clone();
        assert_eq!(scheduled.len(), 1);
        assert_eq!(scheduled[0].0, "rest_done");
        assert_eq!(scheduled[0].1, Duration::from_secs(120));
        assert_eq!(scheduled[0].2, "Your 120 seconds rest is complete");
        assert_eq!(notifier.cancelled.lock().unwrap().as_slice(), ["rest_done"]);
        assert_eq!(display.dismissed.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_countdown_finishes_after_ticks() {
        let display = Arc::new(FakeDisplay::default());
        let (timer, notifier, clock) = timer_with(display.clone(), Duration::from_secs(3600));

        timer.start(Duration::from_secs(5)).unwrap();
        settle().await;

        for expected in [4, 3, 2, 1] {
            clock.advance(chrono::Duration::seconds(1));
            assert!(timer.tick());
            assert_eq!(timer.remaining(), expected);
        }
        clock.advance(chrono::Duration::seconds(1));
        assert!(!timer.tick());
        assert!(!timer.is_active());

        settle().await;
        assert_eq!(notifier.cancelled.lock().unwrap().len(), 1);
        assert_eq!(display.dismissed.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_background_ticker_finishes_countdown() {
        let display = Arc::new(FakeDisplay::default());
        let (timer, _, clock) = timer_with(display, Duration::from_millis(5));

        timer.start(Duration::from_secs(30)).unwrap();
        clock.advance(chrono::Duration::seconds(31));
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(!timer.is_active());
        assert_eq!(timer.end_time(), None);
    }

    #[tokio::test]
    async fn test_display_failure_does_not_stop_countdown() {
        let display = Arc::new(FakeDisplay {
            fail: true,
            ..FakeDisplay::default()
        });
        let (timer, _, clock) = timer_with(display.clone(), Duration::from_secs(3600));

        timer.start(Duration::from_secs(60)).unwrap();
        settle().await;
        clock.advance(chrono::Duration::seconds(10));
        assert!(timer.tick());
        assert_eq!(timer.remaining(), 50);
        assert!(display.registered.lock().unwrap().is_empty());

        timer.cancel();
        settle().await;
        assert!(display.dismissed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_late_registration_is_dismissed() {
        let gate = Arc::new(Notify::new());
        let display = Arc::new(FakeDisplay {
            gate: Some(gate.clone()),
            ..FakeDisplay::default()
        });
        let (timer, _, _) = timer_with(display.clone(), Duration::from_secs(3600));

        timer.start(Duration::from_secs(60)).unwrap();
        timer.cancel();
        gate.notify_one();
        settle().await;

        assert_eq!(display.registered.lock().unwrap().len(), 1);
        assert_eq!(display.dismissed.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_restart_replaces_running_countdown() {
        let display = Arc::new(FakeDisplay::default());
        let (timer, _, _) = timer_with(display.clone(), Duration::from_secs(3600));

        timer.start(Duration::from_secs(120)).unwrap();
        settle().await;
        timer.start(Duration::from_secs(90)).unwrap();
        settle().await;

        assert_eq!(timer.remaining(), 90);
        assert_eq!(timer.total(), Duration::from_secs(90));
        assert_eq!(display.registered.lock().unwrap().len(), 2);
        assert_eq!(
            display.dismissed.lock().unwrap().as_slice(),
            [DisplayHandle("activity-0".into())]
        );
    }

    #[tokio::test]
    async fn test_resume_if_needed() {
        let display = Arc::new(FakeDisplay::default());
        let (timer, notifier, clock) = timer_with(display.clone(), Duration::from_secs(3600));

        timer.start(Duration::from_secs(120)).unwrap();
        settle().await;

        // Suspended for 45s; resume against the original end time
        clock.advance(chrono::Duration::seconds(45));
        assert!(timer.resume_if_needed());
        assert_eq!(timer.remaining(), 75);
        assert_eq!(display.registered.lock().unwrap().len(), 1);
        assert_eq!(notifier.scheduled.lock().unwrap().len(), 1);

        // Suspended past the end
        clock.advance(chrono::Duration::seconds(300));
        assert!(!timer.resume_if_needed());
        assert!(!timer.is_active());
        assert_eq!(timer.end_time(), None);
    }

    #[tokio::test]
    async fn test_progress() {
        let display = Arc::new(FakeDisplay::default());
        let (timer, _, clock) = timer_with(display, Duration::from_secs(3600));
        assert_eq!(timer.progress(), 0.0);

        timer.start(Duration::from_secs(120)).unwrap();
        clock.advance(chrono::Duration::seconds(30));
        timer.tick();
        assert!((timer.progress() - 0.25).abs() < 1e-9);
        assert_eq!(timer.time_string(), "1:30");
    }

    #[tokio::test]
    async fn test_zero_duration_rejected() {
        let display = Arc::new(FakeDisplay::default());
        let (timer, _, _) = timer_with(display, Duration::from_secs(3600));
        assert!(matches!(timer.start(Duration::ZERO), Err(Error::Validation(_))));
        assert!(!timer.is_active());
    }

    #[tokio::test]
    async fn test_sub_second_duration_rejected() {
        let display = Arc::new(FakeDisplay::default());
        let (timer, notifier, _) = timer_with(display, Duration::from_secs(3600));
        assert!(matches!(
            timer.start(Duration::from_millis(500)),
            Err(Error::Validation(_))
        ));
        assert!(!timer.is_active());
        assert!(timer.end_time().is_none());
        assert!(notifier.scheduled.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_out_of_range_duration_rejected() {
        let display = Arc::new(FakeDisplay::default());
        let (timer, notifier, _) = timer_with(display, Duration::from_secs(3600));
        timer.start(Duration::from_secs(120)).unwrap();

        let result = std::panic::AssertUnwindSafe(|| {
            timer.start(Duration::from_secs(99_999_999_999_999))
        });
        let result = std::panic::catch_unwind(result).expect("start must not panic");
        assert!(matches!(result, Err(Error::Validation(_))));

        // The running countdown is untouched
        assert_eq!(timer.remaining(), 120);
        assert_eq!(timer.end_time(), Some(t0() + chrono::Duration::seconds(120)));
        assert_eq!(notifier.scheduled.lock().unwrap().len(), 1);
        timer.cancel();
    }

    #[test]
    fn test_start_without_runtime_fails() {
        let display = Arc::new(FakeDisplay::default());
        let (timer, _, _) = timer_with(display, Duration::from_secs(1));
        assert!(matches!(
            timer.start(Duration::from_secs(10)),
            Err(Error::Runtime(_))
        ));
        // Cancelling an idle timer is harmless anywhere
        timer.cancel();
        assert!(!timer.is_active());
    }

    #[test]
    fn test_format_countdown() {
        assert_eq!(format_countdown(0), "0:00");
        assert_eq!(format_countdown(59), "0:59");
        assert_eq!(format_countdown(125), "2:05");
    }
}
