//! Time budget for one request: per-call timeout, overall deadline, and
//! caller cancellation.
//!
//! Model calls can hang. Every capability call goes through [`Budget::call`],
//! which bounds it by the smaller of the call timeout and the time left
//! before the deadline. When the budget runs out, callers stop issuing new
//! calls and keep whatever candidate they already accepted.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Shared flag a caller flips to stop a running request early.
///
/// Cancellation is cooperative: calls already in flight are abandoned at
/// their next poll, and the request returns its best candidate so far.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What happened to one bounded call.
#[derive(Debug, PartialEq)]
pub enum CallOutcome<T> {
    Done(T),
    /// The call timeout or the request deadline elapsed.
    TimedOut,
    /// The caller cancelled before or during the call.
    Cancelled,
}

/// How often an in-flight call re-checks the cancel flag.
const CANCEL_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
pub struct Budget {
    call_timeout: Duration,
    deadline: Option<Instant>,
    cancel: Option<CancelHandle>,
}

impl Budget {
    pub fn new(call_timeout: Duration, request_timeout: Option<Duration>) -> Self {
        Self {
            call_timeout,
            deadline: request_timeout.map(|t| Instant::now() + t),
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, cancel: Option<CancelHandle>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelHandle::is_cancelled)
    }

    /// True once no further call may be started.
    pub fn is_exhausted(&self) -> bool {
        self.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    fn call_limit(&self) -> Duration {
        match self.deadline {
            Some(d) => self
                .call_timeout
                .min(d.saturating_duration_since(Instant::now())),
            None => self.call_timeout,
        }
    }

    /// Run `fut` within the budget.
    pub async fn call<F, T>(&self, fut: F) -> CallOutcome<T>
    where
        F: Future<Output = T>,
    {
        if self.is_cancelled() {
            return CallOutcome::Cancelled;
        }
        if self.is_exhausted() {
            return CallOutcome::TimedOut;
        }

        let limit = tokio::time::sleep(self.call_limit());
        tokio::pin!(fut);
        tokio::pin!(limit);
        let mut poll = tokio::time::interval(CANCEL_POLL);

        loop {
            tokio::select! {
                out = &mut fut => return CallOutcome::Done(out),
                _ = &mut limit => return CallOutcome::TimedOut,
                _ = poll.tick() => {
                    if self.is_cancelled() {
                        return CallOutcome::Cancelled;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn completes_within_budget() {
        let budget = Budget::new(Duration::from_secs(5), None);
        assert_eq!(budget.call(async { 7 }).await, CallOutcome::Done(7));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_call_times_out() {
        let budget = Budget::new(Duration::from_secs(1), None);
        let outcome = budget
            .call(async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                1
            })
            .await;
        assert_eq!(outcome, CallOutcome::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_caps_the_call_timeout() {
        let budget = Budget::new(Duration::from_secs(60), Some(Duration::from_secs(2)));
        let start = Instant::now();
        let outcome = budget
            .call(async {
                tokio::time::sleep(Duration::from_secs(30)).await;
            })
            .await;
        assert_eq!(outcome, CallOutcome::TimedOut);
        assert!(start.elapsed() < Duration::from_secs(3));
        assert!(budget.is_exhausted());
    }

    #[tokio::test]
    async fn cancelled_budget_refuses_new_calls() {
        let cancel = CancelHandle::new();
        let budget = Budget::new(Duration::from_secs(5), None).with_cancel(Some(cancel.clone()));
        cancel.cancel();
        assert!(budget.is_exhausted());
        assert_eq!(budget.call(async { 1 }).await, CallOutcome::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_interrupts_in_flight_call() {
        let cancel = CancelHandle::new();
        let budget = Budget::new(Duration::from_secs(60), None).with_cancel(Some(cancel.clone()));
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            trigger.cancel();
        });
        let outcome = budget
            .call(async {
                tokio::time::sleep(Duration::from_secs(30)).await;
            })
            .await;
        assert_eq!(outcome, CallOutcome::Cancelled);
    }
}
