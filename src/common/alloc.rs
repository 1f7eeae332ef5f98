// SPDX-License-Identifier: GPL-2.0-or-later

//! Process-wide `Data` allocation counters, used only by the performance
//! logging feature of the parallel executor. Never branch on these for
//! correctness: they are diagnostics, not a resource limiter.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

static ALLOC_COUNT: AtomicI64 = AtomicI64::new(0);
static ALLOC_BYTES: AtomicU64 = AtomicU64::new(0);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DataAllocationsSnapshot {
    pub count: i64,
    pub bytes: u64,
}

pub(crate) fn record_alloc(bytes: u64) {
    ALLOC_COUNT.fetch_add(1, Ordering::Relaxed);
    ALLOC_BYTES.fetch_add(bytes, Ordering::Relaxed);
}

pub(crate) fn record_free(bytes: u64) {
    ALLOC_COUNT.fetch_sub(1, Ordering::Relaxed);
    ALLOC_BYTES.fetch_sub(bytes, Ordering::Relaxed);
}

#[must_use]
pub fn global_data_allocations() -> DataAllocationsSnapshot {
    DataAllocationsSnapshot {
        count: ALLOC_COUNT.load(Ordering::Relaxed),
        bytes: ALLOC_BYTES.load(Ordering::Relaxed),
    }
}
