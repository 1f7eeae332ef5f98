// SPDX-License-Identifier: GPL-2.0-or-later

use crate::state::StepLockState;
use common::Streams;
use graph::{NodeBase, NodeError, Processor};
use std::sync::{Arc, Mutex};

/// One producer's side of a step-lock group. Never emits from its own
/// `has_input` return value — every forwarded, flushed, or terminal frame
/// lands on the shared state's output queue instead, drained by the
/// group's single [`crate::MediaStepLockSource`].
pub struct MediaStepLockProcessor {
    idx: usize,
    name: String,
    state: Arc<Mutex<StepLockState>>,
}

impl MediaStepLockProcessor {
    pub(crate) fn new(idx: usize, state: Arc<Mutex<StepLockState>>) -> Self {
        Self {
            idx,
            name: format!("step-lock-in-{idx}"),
            state,
        }
    }
}

impl NodeBase for MediaStepLockProcessor {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_blocked(&self) -> bool {
        self.state
            .lock()
            .expect("step-lock state mutex poisoned")
            .is_paused(self.idx)
    }
}

impl Processor for MediaStepLockProcessor {
    fn has_input(&mut self, streams: Streams) -> Result<Vec<Streams>, NodeError> {
        self.state
            .lock()
            .expect("step-lock state mutex poisoned")
            .submit(self.idx, streams);
        Ok(Vec::new())
    }
}
