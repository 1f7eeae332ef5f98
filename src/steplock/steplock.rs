// SPDX-License-Identifier: GPL-2.0-or-later

//! Media step-lock (`spec.md` §4.5): keeps N producers emitting frames in
//! lockstep so a downstream multi-stream consumer sees them aligned, pausing
//! whichever producer gets too far ahead and, once the slowest has reached
//! end-of-stream, flushing every producer up to that ceiling before handing
//! each its own terminal frame.

mod processor;
mod source;
mod state;

pub use processor::MediaStepLockProcessor;
pub use source::MediaStepLockSource;

use state::StepLockState;
use std::sync::{Arc, Mutex};

/// Builds one step-lock group: a processor per producer plus the single
/// source that drains their combined, aligned output.
///
/// `throttle_limit` is how many frames a producer may queue ahead of its
/// slowest sibling before [`MediaStepLockProcessor::is_blocked`] starts
/// reporting back-pressure to the executor.
#[must_use]
pub fn step_lock_nodes(
    num_producers: usize,
    throttle_limit: usize,
) -> (MediaStepLockSource, Vec<MediaStepLockProcessor>) {
    assert!(num_producers > 0, "a step-lock group needs at least one producer");
    let state = Arc::new(Mutex::new(StepLockState::new(num_producers, throttle_limit)));
    let processors = (0..num_producers)
        .map(|idx| MediaStepLockProcessor::new(idx, Arc::clone(&state)))
        .collect();
    (MediaStepLockSource::new(state), processors)
}
