use std::sync::{Condvar, Mutex};

use anyhow::ensure;

/// Counting semaphore with a blocking [`acquire`](Semaphore::acquire).
///
/// `release` hands a permit to exactly one waiter (`notify_one`, never a
/// broadcast). Wake order across several blocked threads is unspecified;
/// callers may only assume a blocked `acquire` eventually returns.
#[derive(Debug)]
pub struct Semaphore {
    count: Mutex<usize>,
    available: Condvar,
    max: Option<usize>,
}

impl Semaphore {
    /// Counting semaphore with no upper bound on the counter.
    pub fn new(initial: usize) -> Self {
        Self {
            count: Mutex::new(initial),
            available: Condvar::new(),
            max: None,
        }
    }

    /// Variant with a maximum counter value.
    ///
    /// The maximum is not enforced on every `release`; callers pair their
    /// acquires and releases so the bound holds by construction, and debug
    /// builds assert it.
    pub fn with_max(initial: usize, max: usize) -> anyhow::Result<Self> {
        ensure!(max >= 1, "semaphore maximum must be at least 1, got {max}");
        ensure!(
            initial <= max,
            "semaphore counter starts over its maximum: {initial} > {max}"
        );
        Ok(Self {
            count: Mutex::new(initial),
            available: Condvar::new(),
            max: Some(max),
        })
    }

    /// Blocks until the counter is positive, then decrements it.
    pub fn acquire(&self) {
        let mut count = self.count.lock().expect("semaphore state poisoned");
        while *count == 0 {
            count = self
                .available
                .wait(count)
                .expect("semaphore state poisoned");
        }
        *count -= 1;
    }

    /// Increments the counter and wakes one blocked `acquire`, if any.
    pub fn release(&self) {
        let mut count = self.count.lock().expect("semaphore state poisoned");
        *count += 1;
        if let Some(max) = self.max {
            debug_assert!(*count <= max, "semaphore counter above its maximum");
        }
        self.available.notify_one();
    }

    /// Current counter value. Stale as soon as it returns; diagnostics only.
    pub fn value(&self) -> usize {
        *self.count.lock().expect("semaphore state poisoned")
    }
}
