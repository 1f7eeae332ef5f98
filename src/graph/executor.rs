// SPDX-License-Identifier: GPL-2.0-or-later

use crate::error::GraphErrors;

/// Common contract both execution strategies satisfy, so callers (and
/// [`StopGuard`]) can drive either one without caring which.
pub trait Executor {
    /// Runs one driver cycle: poll sources, run scheduled work, collect
    /// errors. Returns true iff any source remains active or any node
    /// still has queued work.
    fn step(&mut self) -> Result<bool, GraphErrors>;

    /// Guarantees worker threads (if any) have joined before the executor
    /// is dropped. A no-op for the sequential executor.
    fn stop(&mut self);
}

/// RAII guard calling [`Executor::stop`] on scope exit, mirroring the
/// original's `GraphStopGuard`.
pub struct StopGuard<'a, E: Executor> {
    executor: &'a mut E,
}

impl<'a, E: Executor> StopGuard<'a, E> {
    pub fn new(executor: &'a mut E) -> Self {
        Self { executor }
    }
}

impl<E: Executor> Drop for StopGuard<'_, E> {
    fn drop(&mut self) {
        self.executor.stop();
    }
}
