//! Interval polling of lab request status.
//!
//! Each [`LabPoller::start`] spawns one Tokio task that asks the
//! [`LabStatusSource`] for the request status every `interval`, first one
//! interval after start. The completion callback fires at most once.
//! Stopping (or dropping) the poller disarms the callback under its lock, so
//! once `stop` returns no invocation can follow.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, trace, warn};

use crate::gateway::LabStatusSource;

/// Poll interval used when none is configured.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(20);

type CompletionCallback = Box<dyn FnOnce(String) + Send + 'static>;
type CallbackSlot = Arc<Mutex<Option<CompletionCallback>>>;

/// One running poll loop. Cancelled on drop.
pub struct PollHandle {
    lab_request_id: String,
    callback: CallbackSlot,
    task: JoinHandle<()>,
}

impl PollHandle {
    pub fn lab_request_id(&self) -> &str {
        &self.lab_request_id
    }

    /// True until completion fires or the handle is cancelled.
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Disarm the callback and abort the task.
    ///
    /// Blocks while a callback is executing.
    pub fn cancel(&self) {
        drop(lock_slot(&self.callback).take());
        self.task.abort();
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Spawn a poll loop on the current Tokio runtime.
pub fn spawn_poll<S, F>(
    source: Arc<S>,
    interval: Duration,
    lab_request_id: impl Into<String>,
    on_completed: F,
) -> PollHandle
where
    S: LabStatusSource + ?Sized + 'static,
    F: FnOnce(String) + Send + 'static,
{
    let lab_request_id = lab_request_id.into();
    let callback: CallbackSlot = Arc::new(Mutex::new(Some(Box::new(on_completed))));

    let task = tokio::spawn(poll_loop(
        source,
        interval,
        lab_request_id.clone(),
        callback.clone(),
    ));

    PollHandle {
        lab_request_id,
        callback,
        task,
    }
}

async fn poll_loop<S>(source: Arc<S>, period: Duration, lab_request_id: String, callback: CallbackSlot)
where
    S: LabStatusSource + ?Sized,
{
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        match source.lab_request_status(&lab_request_id).await {
            Ok(status) if status.is_completed() => {
                fire_once(&callback, &lab_request_id);
                return;
            }
            Ok(status) => {
                trace!(lab_request_id = %lab_request_id, status = status.as_str(), "lab request pending");
            }
            Err(e) => {
                warn!(lab_request_id = %lab_request_id, error = %e, "lab status poll failed, retrying");
            }
        }
    }
}

fn fire_once(callback: &CallbackSlot, lab_request_id: &str) {
    let mut slot = lock_slot(callback);
    if let Some(on_completed) = slot.take() {
        debug!(lab_request_id, "lab request completed");
        on_completed(lab_request_id.to_string());
    }
}

fn lock_slot(slot: &CallbackSlot) -> MutexGuard<'_, Option<CompletionCallback>> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Owns at most one poll loop per consultation.
pub struct LabPoller<S: ?Sized + LabStatusSource + 'static> {
    source: Arc<S>,
    interval: Duration,
    active: Option<PollHandle>,
}

impl<S: ?Sized + LabStatusSource + 'static> LabPoller<S> {
    pub fn new(source: Arc<S>, interval: Duration) -> Self {
        Self {
            source,
            interval,
            active: None,
        }
    }

    /// Start polling, cancelling any previous loop first.
    pub fn start<F>(&mut self, lab_request_id: impl Into<String>, on_completed: F)
    where
        F: FnOnce(String) + Send + 'static,
    {
        self.stop();
        let handle = spawn_poll(
            self.source.clone(),
            self.interval,
            lab_request_id,
            on_completed,
        );
        debug!(lab_request_id = handle.lab_request_id(), interval = ?self.interval, "lab polling started");
        self.active = Some(handle);
    }

    /// Stop polling. No callback runs after this returns.
    pub fn stop(&mut self) {
        if let Some(handle) = self.active.take() {
            debug!(lab_request_id = handle.lab_request_id(), "lab polling stopped");
            handle.cancel();
        }
    }

    pub fn is_running(&self) -> bool {
        self.active.as_ref().is_some_and(PollHandle::is_running)
    }

    pub fn active_request_id(&self) -> Option<&str> {
        self.active.as_ref().map(PollHandle::lab_request_id)
    }
}

impl<S: ?Sized + LabStatusSource + 'static> Drop for LabPoller<S> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{GatewayError, GatewayResult};
    use crate::models::LabRequestStatus;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns `pending` until `complete_after` polls have been answered.
    struct CountingSource {
        polls: AtomicUsize,
        complete_after: usize,
    }

    #[async_trait]
    impl LabStatusSource for CountingSource {
        async fn lab_request_status(&self, _id: &str) -> GatewayResult<LabRequestStatus> {
            let n = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
            if n >= self.complete_after {
                Ok(LabRequestStatus::Completed)
            } else {
                Ok(LabRequestStatus::InProgress)
            }
        }
    }

    fn counting(complete_after: usize) -> Arc<CountingSource> {
        Arc::new(CountingSource {
            polls: AtomicUsize::new(0),
            complete_after,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_poll_waits_one_interval() {
        let source = counting(usize::MAX);
        let mut poller = LabPoller::new(source.clone(), Duration::from_secs(20));
        poller.start("lab-1", |_| {});

        tokio::time::sleep(Duration::from_secs(19)).await;
        assert_eq!(source.polls.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(source.polls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_completion_fires_once_and_stops() {
        let source = counting(2);
        let fired = Arc::new(AtomicUsize::new(0));
        let mut poller = LabPoller::new(source.clone(), Duration::from_secs(20));

        let counter = fired.clone();
        poller.start("lab-1", move |id| {
            assert_eq!(id, "lab-1");
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_secs(100)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(source.polls.load(Ordering::SeqCst), 2);
        assert!(!poller.is_running());
    }

    struct FlakySource {
        polls: AtomicUsize,
    }

    #[async_trait]
    impl LabStatusSource for FlakySource {
        async fn lab_request_status(&self, _id: &str) -> GatewayResult<LabRequestStatus> {
            match self.polls.fetch_add(1, Ordering::SeqCst) {
                0 | 1 => Err(GatewayError::Transport("connection reset".into())),
                _ => Ok(LabRequestStatus::Completed),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_polls_are_retried() {
        let source = Arc::new(FlakySource {
            polls: AtomicUsize::new(0),
        });
        let fired = Arc::new(AtomicUsize::new(0));
        let mut poller = LabPoller::new(source.clone(), Duration::from_secs(20));

        let counter = fired.clone();
        poller.start("lab-1", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_secs(41)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(source.polls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_polling() {
        let source = counting(usize::MAX);
        let mut poller = LabPoller::new(source.clone(), Duration::from_secs(20));
        poller.start("lab-1", |_| {});
        drop(poller);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(source.polls.load(Ordering::SeqCst), 0);
    }
}
