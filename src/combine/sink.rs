// SPDX-License-Identifier: GPL-2.0-or-later

use crate::state::CombineState;
use common::Streams;
use graph::{NodeBase, NodeError, Processor};
use std::sync::{Arc, Mutex};

/// One per combine input. Never emits directly; `has_input` only pushes into
/// the shared FIFO (or records finish), and reports itself blocked as soon
/// as that FIFO holds anything, so the parallel executor throttles this
/// input to at most one frame ahead of the slowest sibling.
pub struct CombineSink {
    idx: usize,
    name: String,
    state: Arc<Mutex<CombineState>>,
}

impl CombineSink {
    pub(crate) fn new(idx: usize, state: Arc<Mutex<CombineState>>) -> Self {
        Self {
            idx,
            name: format!("combine-sink[{idx}]"),
            state,
        }
    }
}

impl NodeBase for CombineSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_blocked(&self) -> bool {
        self.state
            .lock()
            .expect("combine state mutex poisoned")
            .is_blocked(self.idx)
    }
}

impl Processor for CombineSink {
    fn has_input(&mut self, streams: Streams) -> Result<Vec<Streams>, NodeError> {
        self.state
            .lock()
            .expect("combine state mutex poisoned")
            .add_frame(self.idx, streams);
        Ok(Vec::new())
    }
}
