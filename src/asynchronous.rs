use crate::{expression::ExpressionIterator, CronExpression, Result};
use chrono::{DateTime, FixedOffset, TimeDelta, TimeZone, Utc};
use futures::{future::FusedFuture, stream::FusedStream, Stream};
use pin_project::{pin_project, pinned_drop};
use std::{
    collections::BTreeMap,
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicU64, Ordering},
        mpsc::{self, RecvTimeoutError, Sender},
        OnceLock,
    },
    task::{Context, Poll, Waker},
    thread,
    time::{Duration, Instant},
};

type ControlChannel = Sender<TimerCmd>;

/// Represents a kind (character) of the cron event returned by [`CronDelay`]
/// or [`CronTicker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CronEvent {
    /// The event happened in time.
    Fired,
    /// The event was missed and happened after its scheduled time.
    Missed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WaitState {
    Idle,
    Waiting(TimerKey),
    Completed,
}

/// Timer queue entry identity: deadline first, so the queue stays ordered by
/// time to wake, with a serial to keep equal deadlines distinct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct TimerKey {
    deadline: Instant,
    serial: u64,
}

impl TimerKey {
    #[inline]
    fn new(deadline: Instant) -> Self {
        static KEY_SERIAL: AtomicU64 = AtomicU64::new(0);

        Self {
            deadline,
            serial: KEY_SERIAL.fetch_add(1, Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone)]
enum TimerCmd {
    Arm { key: TimerKey, waker: Waker },
    Disarm { key: TimerKey },
}

/// Implements [`Future`](https://doc.rust-lang.org/core/future/trait.Future.html)
/// which sleeps until the upcoming firing time of a [`CronExpression`].
///
/// When awaited, it resolves to a [`CronEvent`]: [`Fired`](CronEvent::Fired)
/// when the deadline arrived while waiting, [`Missed`](CronEvent::Missed) when
/// the deadline had already passed by the first poll.
///
/// Dropping the future (for example losing a `select!`) disarms its timer
/// entry; this is the cancellation path during the wait.
///
/// May panic if the background thread (which drives all delay and ticker
/// events) fails.
///
/// # Examples:
/// ```rust
/// use chrono::{Offset, Utc};
/// use cron_next::{CronEvent, CronExpression, Result};
///
/// #[tokio::main]
/// async fn main() -> Result<()> {
///     let cron = CronExpression::new("*/2 * * * * *", Utc.fix())?;
///
///     // Wakes up on the next 2-second boundary.
///     let event = cron.delay(&Utc::now())?.await;
///     assert_eq!(event, CronEvent::Fired);
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct CronDelay {
    deadline: Instant,
    tx: ControlChannel,
    state: WaitState,
    outcome: CronEvent,
}

impl CronDelay {
    fn new(deadline: Instant) -> Self {
        Self {
            deadline,
            tx: timer_thread_tx().clone(),
            state: WaitState::Idle,
            outcome: CronEvent::Fired,
        }
    }

    #[inline]
    fn send_cmd(&self, cmd: TimerCmd) {
        self.tx.send(cmd).expect("timer control channel is closed");
    }

    #[inline]
    fn complete(&mut self, event: CronEvent) -> Poll<CronEvent> {
        self.state = WaitState::Completed;
        self.outcome = event;

        Poll::Ready(event)
    }
}

impl Future for CronDelay {
    type Output = CronEvent;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let now = Instant::now();
        match self.state {
            WaitState::Idle => {
                if now >= self.deadline {
                    // Polled for the first time after the deadline.
                    self.complete(CronEvent::Missed)
                } else {
                    let key = TimerKey::new(self.deadline);
                    self.send_cmd(TimerCmd::Arm {
                        key,
                        waker: cx.waker().clone(),
                    });
                    self.state = WaitState::Waiting(key);
                    Poll::Pending
                }
            }
            WaitState::Waiting(key) => {
                if now >= self.deadline {
                    self.send_cmd(TimerCmd::Disarm { key });
                    self.complete(CronEvent::Fired)
                } else {
                    // Not due yet, refresh the Waker held by the timer thread.
                    self.send_cmd(TimerCmd::Arm {
                        key,
                        waker: cx.waker().clone(),
                    });
                    Poll::Pending
                }
            }
            // Unreachable with a valid runtime; repeat the final answer.
            WaitState::Completed => Poll::Ready(self.outcome),
        }
    }
}

impl FusedFuture for CronDelay {
    #[inline]
    fn is_terminated(&self) -> bool {
        self.state == WaitState::Completed
    }
}

impl Drop for CronDelay {
    #[inline]
    fn drop(&mut self) {
        if let WaitState::Waiting(key) = self.state {
            self.send_cmd(TimerCmd::Disarm { key });
        }
        self.state = WaitState::Completed;
    }
}

/// Implements [`Stream`](https://docs.rs/futures/latest/futures/stream/index.html)
/// delivering one [`CronEvent`] per firing time of a [`CronExpression`].
///
/// Sleeps until each upcoming firing time and yields
/// [`Fired`](CronEvent::Fired) just in time. If the stream is polled again
/// only after the next firing time already passed, that event is delivered as
/// [`Missed`](CronEvent::Missed). The stream ends when no further firing time
/// can be computed, which for an unsatisfiable expression is immediately.
///
/// May panic if the background thread (which drives all delay and ticker
/// events) fails.
///
/// # Examples:
/// ```rust
/// use chrono::{Offset, Utc};
/// use cron_next::{CronEvent, CronExpression, Result};
/// use futures::stream::StreamExt;
///
/// #[tokio::main]
/// async fn main() -> Result<()> {
///     let cron = CronExpression::new("*/2 * * * * *", Utc.fix())?;
///     let mut ticker = cron.ticker(&Utc::now());
///
///     let event = ticker.next().await;
///     assert_eq!(event, Some(CronEvent::Fired));
///
///     Ok(())
/// }
/// ```
#[pin_project(PinnedDrop)]
#[derive(Debug)]
pub struct CronTicker {
    state: WaitState,
    iter: ExpressionIterator,
    tx: ControlChannel,
}

impl CronTicker {
    #[inline]
    fn new(iter: ExpressionIterator) -> Self {
        Self {
            state: WaitState::Idle,
            tx: timer_thread_tx().clone(),
            iter,
        }
    }

    #[inline]
    fn send_cmd(&self, cmd: TimerCmd) {
        self.tx.send(cmd).expect("timer control channel is closed");
    }
}

impl Stream for CronTicker {
    type Item = CronEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let now = Instant::now();
        match self.state {
            WaitState::Idle => {
                // Nothing armed, fetch the next firing time.
                if let Some(next) = self.iter.next() {
                    if let Some(deadline) = deadline_for(&next) {
                        let key = TimerKey::new(deadline);
                        self.send_cmd(TimerCmd::Arm {
                            key,
                            waker: cx.waker().clone(),
                        });
                        self.state = WaitState::Waiting(key);
                        Poll::Pending
                    } else {
                        // The firing time is already in the past.
                        Poll::Ready(Some(CronEvent::Missed))
                    }
                } else {
                    self.state = WaitState::Completed;
                    Poll::Ready(None)
                }
            }
            WaitState::Waiting(key) => {
                if key.deadline > now {
                    // Still waiting, refresh the Waker.
                    self.send_cmd(TimerCmd::Arm {
                        key,
                        waker: cx.waker().clone(),
                    });
                    Poll::Pending
                } else {
                    self.send_cmd(TimerCmd::Disarm { key });
                    self.state = WaitState::Idle;
                    Poll::Ready(Some(CronEvent::Fired))
                }
            }
            WaitState::Completed => Poll::Ready(None),
        }
    }
}

impl FusedStream for CronTicker {
    #[inline]
    fn is_terminated(&self) -> bool {
        self.state == WaitState::Completed
    }
}

#[pinned_drop]
impl PinnedDrop for CronTicker {
    fn drop(mut self: Pin<&mut Self>) {
        if let WaitState::Waiting(key) = self.state {
            self.send_cmd(TimerCmd::Disarm { key });
        }
        self.state = WaitState::Completed;
    }
}

/// Permitted firing window for [`CronExpression::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct RunOptions {
    /// Firing times before this instant are skipped.
    pub start: Option<DateTime<FixedOffset>>,
    /// The run loop returns once the next firing time falls after this
    /// instant.
    pub end: Option<DateTime<FixedOffset>>,
}

// A single thread drives all CronDelay and CronTicker instances.
//
// The BTreeMap holds every armed deadline (with its Waker) in time-to-wake
// order, so the thread only ever sleeps until the first entry. Commands
// arrive over an mpsc channel; a recv timeout doubles as the alarm.
fn timer_thread_tx() -> &'static ControlChannel {
    static TIMER_THREAD: OnceLock<ControlChannel> = OnceLock::new();

    TIMER_THREAD.get_or_init(|| {
        let (tx, rx) = mpsc::channel::<TimerCmd>();
        thread::spawn(move || {
            let mut queue: BTreeMap<TimerKey, Waker> = BTreeMap::new();

            loop {
                let cmd = if queue.is_empty() {
                    rx.recv().expect("timer control channel is closed")
                } else {
                    let (first, _) = queue.first_key_value().unwrap();
                    let time_to_sleep = first.deadline.saturating_duration_since(Instant::now());

                    match rx.recv_timeout(time_to_sleep) {
                        Ok(cmd) => cmd,
                        Err(RecvTimeoutError::Timeout) => {
                            let (_, waker) = queue.pop_first().unwrap();
                            waker.wake();
                            continue;
                        }
                        Err(e) => panic!("timer control channel is closed: {e}"),
                    }
                };

                match cmd {
                    TimerCmd::Arm { key, waker } => {
                        queue.insert(key, waker);
                    }
                    TimerCmd::Disarm { key } => {
                        queue.remove(&key);
                    }
                }
            }
        });

        tx
    })
}

// Maps a wall-clock firing time onto the monotonic clock; None if it already
// passed.
fn deadline_for(next: &DateTime<FixedOffset>) -> Option<Instant> {
    let delta = next.timestamp_nanos_opt()? - Utc::now().timestamp_nanos_opt()?;

    if delta < 0 {
        None
    } else {
        Some(Instant::now() + Duration::from_nanos(delta as u64))
    }
}

impl CronExpression {
    /// Returns a [`CronDelay`] future sleeping until the next firing time
    /// strictly after `after`.
    ///
    /// Resolves immediately with [`CronEvent::Missed`] when that time already
    /// passed by the first poll. Returns the search error for expressions
    /// that never fire.
    pub fn delay<Tz: TimeZone>(&self, after: &DateTime<Tz>) -> Result<CronDelay> {
        let next = self.next(after)?;
        let deadline = deadline_for(&next).unwrap_or_else(Instant::now);

        Ok(CronDelay::new(deadline))
    }

    /// Returns a [`CronTicker`] stream of events for the firing times
    /// strictly after `after`.
    pub fn ticker<Tz: TimeZone>(&self, after: &DateTime<Tz>) -> CronTicker {
        CronTicker::new(ExpressionIterator {
            expression: self.clone(),
            next: self.next(after).ok(),
        })
    }

    /// The same as [`CronExpression::ticker()`] but consumes its expression.
    pub fn into_ticker<Tz: TimeZone>(self, after: &DateTime<Tz>) -> CronTicker {
        let next = self.next(after).ok();
        CronTicker::new(ExpressionIterator { expression: self, next })
    }

    /// Invokes `job` at every firing time inside the window given by
    /// `options`, starting from the current system time.
    ///
    /// Firing times before `options.start` are skipped; the loop returns
    /// `Ok(())` once the next firing time falls after `options.end` (and
    /// never, if no `end` is set). A search failure is returned immediately.
    ///
    /// Cancellation follows the usual future contract: dropping this future
    /// between polls stops the loop and disarms any pending timer, so it can
    /// be raced against a shutdown signal with `select!`.
    ///
    /// # Examples:
    /// ```rust,no_run
    /// use chrono::{Offset, TimeDelta, Utc};
    /// use cron_next::{CronExpression, Result, RunOptions};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<()> {
    ///     let cron = CronExpression::new("0 * * * * *", Utc.fix())?;
    ///     let options = RunOptions {
    ///         start: None,
    ///         end: Some((Utc::now() + TimeDelta::minutes(5)).fixed_offset()),
    ///     };
    ///
    ///     cron.run(options, |at| println!("fired at {at}")).await?;
    ///
    ///     Ok(())
    /// }
    /// ```
    pub async fn run<F>(&self, options: RunOptions, mut job: F) -> Result<()>
    where
        F: FnMut(DateTime<FixedOffset>),
    {
        let mut base = Utc::now().with_timezone(&self.offset());
        if let Some(start) = options.start {
            if start > base {
                // One second back, so a firing time exactly at the window
                // opening is not skipped by the strictly-after search.
                base = start - TimeDelta::seconds(1);
            }
        }

        loop {
            let next = self.next(&base)?;
            if let Some(end) = options.end {
                if next > end {
                    return Ok(());
                }
            }

            if let Some(deadline) = deadline_for(&next) {
                CronDelay::new(deadline).await;
            }
            job(next);
            base = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Offset;
    use futures::{select, StreamExt};
    use rstest::rstest;

    fn every_two_seconds() -> CronExpression {
        CronExpression::new("*/2 * * * * *", Utc.fix()).unwrap()
    }

    #[tokio::test]
    #[rstest]
    #[timeout(Duration::from_secs(3))]
    async fn test_delay_fired() {
        let cron = every_two_seconds();
        let event = cron.delay(&Utc::now()).unwrap().await;

        assert_eq!(event, CronEvent::Fired);
    }

    #[tokio::test]
    #[rstest]
    #[timeout(Duration::from_secs(5))]
    async fn test_delay_missed() {
        let cron = every_two_seconds();
        let delay = cron.delay(&Utc::now()).unwrap();

        tokio::time::sleep(Duration::from_millis(2100)).await;
        assert_eq!(delay.await, CronEvent::Missed);
    }

    #[tokio::test]
    #[rstest]
    #[timeout(Duration::from_secs(3))]
    async fn test_delay_for_unsatisfiable_expression() {
        let cron = CronExpression::new("0 0 0 30 2 *", Utc.fix()).unwrap();

        assert!(cron.delay(&Utc::now()).is_err());
    }

    #[tokio::test]
    #[rstest]
    #[timeout(Duration::from_secs(3))]
    async fn test_delay_is_terminated() {
        let cron = CronExpression::new("* * * * * *", Utc.fix()).unwrap();
        let mut delay = cron.delay(&Utc::now()).unwrap();
        assert!(!delay.is_terminated());

        select! {
            _ = delay => {},
            _ = futures::future::pending::<()>() => unreachable!(),
        }

        assert!(delay.is_terminated());
    }

    #[tokio::test]
    #[rstest]
    #[timeout(Duration::from_secs(8))]
    async fn test_ticker_interval() {
        const INTERVAL: Duration = Duration::from_millis(2000);
        const ACCEPTED_DRIFT: Duration = Duration::from_millis(50);

        let cron = every_two_seconds();
        let mut ticker = cron.ticker(&Utc::now());

        // Align to the first tick, then measure the full interval.
        ticker.next().await;
        assert_eq!(ticker.next().await, Some(CronEvent::Fired));

        let started = Instant::now();
        assert_eq!(ticker.next().await, Some(CronEvent::Fired));
        let elapsed = started.elapsed();

        assert!(
            elapsed <= INTERVAL + ACCEPTED_DRIFT && elapsed >= INTERVAL - ACCEPTED_DRIFT,
            "drift is out of range: elapsed={elapsed:?}"
        );
    }

    #[tokio::test]
    #[rstest]
    #[timeout(Duration::from_secs(10))]
    async fn test_ticker_delivers_missed_events() {
        let cron = CronExpression::new("* * * * * *", Utc.fix()).unwrap();
        let mut ticker = cron.into_ticker(&Utc::now());

        ticker.next().await;
        tokio::time::sleep(Duration::from_millis(3500)).await;

        let mut missed = 0;
        while let Some(CronEvent::Missed) = ticker.next().await {
            missed += 1;
        }

        assert_eq!(missed, 3);
    }

    #[tokio::test]
    #[rstest]
    #[timeout(Duration::from_secs(3))]
    async fn test_ticker_ends_for_unsatisfiable_expression() {
        let cron = CronExpression::new("0 0 0 30 2 *", Utc.fix()).unwrap();
        let mut ticker = cron.ticker(&Utc::now());
        assert!(!ticker.is_terminated());

        assert_eq!(ticker.next().await, None);
        assert!(ticker.is_terminated());

        assert_eq!(ticker.next().await, None);
        assert!(ticker.is_terminated());
    }

    #[tokio::test]
    #[rstest]
    #[timeout(Duration::from_secs(8))]
    async fn test_run_honors_end_of_window() {
        let cron = CronExpression::new("* * * * * *", Utc.fix()).unwrap();
        let options = RunOptions {
            start: None,
            end: Some((Utc::now() + TimeDelta::milliseconds(2500)).fixed_offset()),
        };

        let mut fired = Vec::new();
        cron.run(options, |at| fired.push(at)).await.unwrap();

        assert!(
            (1..=3).contains(&fired.len()),
            "unexpected number of events: {fired:?}"
        );
        assert!(fired.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[tokio::test]
    #[rstest]
    #[timeout(Duration::from_secs(3))]
    async fn test_run_returns_search_error() {
        let cron = CronExpression::new("0 0 0 30 2 *", Utc.fix()).unwrap();

        let result = cron.run(RunOptions::default(), |_| {}).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    #[rstest]
    #[timeout(Duration::from_secs(6))]
    async fn test_run_skips_fires_before_window_start() {
        let cron = CronExpression::new("* * * * * *", Utc.fix()).unwrap();
        let start = (Utc::now() + TimeDelta::milliseconds(2200)).fixed_offset();
        let options = RunOptions {
            start: Some(start),
            end: Some((Utc::now() + TimeDelta::milliseconds(3500)).fixed_offset()),
        };

        let mut fired = Vec::new();
        cron.run(options, |at| fired.push(at)).await.unwrap();

        assert!(!fired.is_empty());
        assert!(fired.iter().all(|at| *at >= start - TimeDelta::seconds(1)));
    }
}
