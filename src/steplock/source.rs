// SPDX-License-Identifier: GPL-2.0-or-later

use crate::state::StepLockState;
use common::Streams;
use graph::{NodeBase, NodeError, Source};
use std::sync::{Arc, Mutex};

/// The step-lock group's single output, draining whatever its producers'
/// [`crate::MediaStepLockProcessor`]s have forwarded since the last tick.
pub struct MediaStepLockSource {
    state: Arc<Mutex<StepLockState>>,
}

impl MediaStepLockSource {
    pub(crate) fn new(state: Arc<Mutex<StepLockState>>) -> Self {
        Self { state }
    }
}

impl NodeBase for MediaStepLockSource {
    fn name(&self) -> &str {
        "step-lock-out"
    }
}

impl Source for MediaStepLockSource {
    fn produce(&mut self) -> Result<Vec<Streams>, NodeError> {
        Ok(self
            .state
            .lock()
            .expect("step-lock state mutex poisoned")
            .drain_output())
    }

    fn abort(&mut self) {
        self.state
            .lock()
            .expect("step-lock state mutex poisoned")
            .force_finish();
    }
}
