// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Cooperative scheduling primitives.
//!
//! The runtime is single-threaded cooperative: all event emission, socket
//! traffic and protocol handling run on one logical executor, suspending
//! only at explicit asynchronous boundaries. This module wraps the tokio
//! local task machinery into the two shapes the engine needs: a one-shot
//! deferred call with a cancellable handle, and a trailing-edge debouncer.
//!
//! Everything here requires a tokio current-thread runtime with an active
//! `LocalSet`; callbacks are not `Send`.

use std::cell::RefCell;
use std::time::Duration;

/// Handle for a scheduled call. Dropping the handle does not cancel the
/// call; use [`ScheduledTask::cancel`].
pub struct ScheduledTask {
    handle: tokio::task::JoinHandle<()>,
}

impl ScheduledTask {
    pub fn cancel(&self) {
        self.handle.abort();
    }
}

/// Run `f` after `delay` on the local executor.
pub fn schedule(delay: Duration, f: impl FnOnce() + 'static) -> ScheduledTask {
    let handle = tokio::task::spawn_local(async move {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        f();
    });
    ScheduledTask { handle }
}

/// Run `f` on the next scheduler tick. Subscribers installed synchronously
/// after the current call stack still observe whatever `f` produces.
pub fn next_tick(f: impl FnOnce() + 'static) -> ScheduledTask {
    schedule(Duration::ZERO, f)
}

/// Trailing-edge debouncer: `call` postpones the function until `wait` has
/// elapsed since the most recent invocation.
pub struct Debouncer {
    wait: Duration,
    pending: RefCell<Option<ScheduledTask>>,
}

impl Debouncer {
    pub fn new(wait: Duration) -> Self {
        Self {
            wait,
            pending: RefCell::new(None),
        }
    }

    pub fn call(&self, f: impl FnOnce() + 'static) {
        if let Some(task) = self.pending.borrow_mut().take() {
            task.cancel();
        }
        *self.pending.borrow_mut() = Some(schedule(self.wait, f));
    }

    pub fn cancel(&self) {
        if let Some(task) = self.pending.borrow_mut().take() {
            task.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    fn local_rt() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap()
    }

    #[test]
    fn next_tick_defers_past_synchronous_code() {
        let rt = local_rt();
        let local = tokio::task::LocalSet::new();
        rt.block_on(local.run_until(async {
            let fired = Rc::new(Cell::new(false));
            let flag = Rc::clone(&fired);
            next_tick(move || flag.set(true));

            // Not yet: the callback runs on a later tick.
            assert!(!fired.get());
            tokio::task::yield_now().await;
            assert!(fired.get());
        }));
    }

    #[test]
    fn debouncer_collapses_rapid_calls() {
        let rt = local_rt();
        let local = tokio::task::LocalSet::new();
        rt.block_on(local.run_until(async {
            let count = Rc::new(Cell::new(0u32));
            let debouncer = Debouncer::new(Duration::from_millis(10));

            for _ in 0..5 {
                let count = Rc::clone(&count);
                debouncer.call(move || count.set(count.get() + 1));
            }

            tokio::time::sleep(Duration::from_millis(30)).await;
            assert_eq!(count.get(), 1);
        }));
    }

    #[test]
    fn debouncer_cancel_suppresses_the_call() {
        let rt = local_rt();
        let local = tokio::task::LocalSet::new();
        rt.block_on(local.run_until(async {
            let count = Rc::new(Cell::new(0u32));
            let debouncer = Debouncer::new(Duration::from_millis(5));

            let counter = Rc::clone(&count);
            debouncer.call(move || counter.set(counter.get() + 1));
            debouncer.cancel();

            tokio::time::sleep(Duration::from_millis(20)).await;
            assert_eq!(count.get(), 0);
        }));
    }
}
