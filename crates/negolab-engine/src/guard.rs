use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::{oneshot, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Result of one guarded call.
#[derive(Debug)]
pub enum GuardOutcome<T> {
    Completed(T),
    /// The budget ran out inside the call. The call may still be running;
    /// its result will be discarded.
    TimedOut,
    /// The budget ran out waiting for a worker. The call never started.
    NoWorker,
    Panicked(String),
}

/// Runs agent calls on tokio's blocking pool under a wall-clock budget.
///
/// Each call takes the current generation as its token and only delivers a
/// result if the generation is unchanged when it finishes. A timeout bumps
/// the generation, so a late result can never be mistaken for the answer to
/// a later call. Live workers, stragglers included, are bounded by a
/// semaphore; waiting for a permit counts against the budget.
#[derive(Debug, Clone)]
pub struct ExecutionGuard {
    budget: Duration,
    generation: Arc<AtomicU64>,
    workers: Arc<Semaphore>,
}

impl ExecutionGuard {
    pub fn new(budget: Duration, max_workers: usize) -> Self {
        Self {
            budget,
            generation: Arc::new(AtomicU64::new(0)),
            workers: Arc::new(Semaphore::new(max_workers.max(1))),
        }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn available_workers(&self) -> usize {
        self.workers.available_permits()
    }

    /// Run `call` against `target`. On timeout `cancel` is cancelled so a
    /// cooperative callee can stop early.
    pub async fn run<P, T, F>(
        &self,
        target: &Arc<Mutex<P>>,
        cancel: &CancellationToken,
        call: F,
    ) -> GuardOutcome<T>
    where
        P: Send + 'static,
        T: Send + 'static,
        F: FnOnce(&mut P) -> T + Send + 'static,
    {
        let started = Instant::now();

        let permit = match tokio::time::timeout(self.budget, self.workers.clone().acquire_owned()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return GuardOutcome::Panicked("guard worker pool closed".to_string()),
            Err(_) => {
                warn!(
                    budget_ms = self.budget.as_millis() as u64,
                    "No guard worker available within budget"
                );
                cancel.cancel();
                return GuardOutcome::NoWorker;
            }
        };

        let token = self.generation.load(Ordering::SeqCst);
        let generation = Arc::clone(&self.generation);
        let target = Arc::clone(target);
        let (tx, rx) = oneshot::channel();

        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let result = catch_unwind(AssertUnwindSafe(|| {
                let mut guarded = target.lock().unwrap_or_else(PoisonError::into_inner);
                call(&mut guarded)
            }));

            if generation.load(Ordering::SeqCst) == token {
                let _ = tx.send(result.map_err(panic_message));
            } else {
                debug!(token, "Discarding result of abandoned call");
            }
        });

        let remaining = self.budget.saturating_sub(started.elapsed());
        match tokio::time::timeout(remaining, rx).await {
            Ok(Ok(Ok(value))) => GuardOutcome::Completed(value),
            Ok(Ok(Err(message))) => GuardOutcome::Panicked(message),
            Ok(Err(_)) => GuardOutcome::Panicked("guard worker exited without a result".to_string()),
            Err(_) => {
                self.generation.fetch_add(1, Ordering::SeqCst);
                cancel.cancel();
                GuardOutcome::TimedOut
            }
        }
    }

    /// Run a cleanup call in the background with no budget. It waits for
    /// the target's lock, so it runs after any straggling call on the same
    /// target has returned.
    pub fn detach<P, F>(&self, target: Arc<Mutex<P>>, call: F) -> JoinHandle<()>
    where
        P: Send + 'static,
        F: FnOnce(&mut P) + Send + 'static,
    {
        let workers = Arc::clone(&self.workers);
        tokio::spawn(async move {
            let Ok(permit) = workers.acquire_owned().await else {
                return;
            };
            let joined = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                catch_unwind(AssertUnwindSafe(|| {
                    let mut guarded = target.lock().unwrap_or_else(PoisonError::into_inner);
                    call(&mut guarded)
                }))
            })
            .await;

            match joined {
                Ok(Ok(())) => {}
                Ok(Err(payload)) => {
                    warn!(panic = %panic_message(payload), "Detached call panicked")
                }
                Err(e) => warn!(error = %e, "Detached call failed"),
            }
        })
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn completes_within_budget() {
        let guard = ExecutionGuard::new(Duration::from_millis(500), 2);
        let target = Arc::new(Mutex::new(41_u32));
        let cancel = CancellationToken::new();

        let outcome = guard
            .run(&target, &cancel, |n| {
                *n += 1;
                *n
            })
            .await;
        assert!(matches!(outcome, GuardOutcome::Completed(42)));
        assert!(!cancel.is_cancelled());
        assert_eq!(guard.generation(), 0);
    }

    #[tokio::test]
    async fn panics_are_caught() {
        let guard = ExecutionGuard::new(Duration::from_millis(500), 2);
        let target = Arc::new(Mutex::new(()));
        let cancel = CancellationToken::new();

        let outcome: GuardOutcome<()> = guard.run(&target, &cancel, |_| panic!("boom")).await;
        match outcome {
            GuardOutcome::Panicked(message) => assert_eq!(message, "boom"),
            other => panic!("expected panic, got {other:?}"),
        }

        // The poisoned lock is still usable.
        let outcome = guard.run(&target, &cancel, |_| 7).await;
        assert!(matches!(outcome, GuardOutcome::Completed(7)));
    }

    #[tokio::test]
    async fn timeout_discards_late_result_and_cancels() {
        let guard = ExecutionGuard::new(Duration::from_millis(30), 2);
        let writes = Arc::new(AtomicUsize::new(0));
        let target = Arc::new(Mutex::new(()));
        let cancel = CancellationToken::new();

        let late = Arc::clone(&writes);
        let outcome = guard
            .run(&target, &cancel, move |_| {
                std::thread::sleep(Duration::from_millis(150));
                late.fetch_add(1, Ordering::SeqCst);
            })
            .await;

        assert!(matches!(outcome, GuardOutcome::TimedOut));
        assert!(cancel.is_cancelled());
        assert_eq!(guard.generation(), 1);

        // The detached cleanup waits for the straggler to release the lock.
        let seen = Arc::new(AtomicUsize::new(usize::MAX));
        let (after, observed) = (Arc::clone(&writes), Arc::clone(&seen));
        guard
            .detach(target.clone(), move |_| {
                observed.store(after.load(Ordering::SeqCst), Ordering::SeqCst);
            })
            .await
            .unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausted_pool_counts_as_timeout() {
        let guard = ExecutionGuard::new(Duration::from_millis(30), 1);
        let busy = Arc::new(Mutex::new(()));
        let cancel = CancellationToken::new();

        let first = guard
            .run(&busy, &cancel, |_| std::thread::sleep(Duration::from_millis(200)))
            .await;
        assert!(matches!(first, GuardOutcome::TimedOut));
        assert_eq!(guard.available_workers(), 0);

        let other = Arc::new(Mutex::new(()));
        let fresh = CancellationToken::new();
        let ran = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&ran);
        let second = guard
            .run(&other, &fresh, move |_| {
                counted.fetch_add(1, Ordering::SeqCst);
            })
            .await;
        assert!(matches!(second, GuardOutcome::NoWorker));
        assert!(fresh.is_cancelled());
        assert_eq!(guard.generation(), 1);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }
}
