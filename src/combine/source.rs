// SPDX-License-Identifier: GPL-2.0-or-later

use crate::state::CombineState;
use common::Streams;
use graph::{NodeBase, NodeError, Source};
use std::sync::{Arc, Mutex};

/// The combine node's single output. `produce` is driven by the parallel
/// executor like any other source; it is never the target of an edge, so
/// `abort` has nothing to interrupt but is kept idempotent per the `Source`
/// contract.
pub struct CombineSource {
    state: Arc<Mutex<CombineState>>,
}

impl CombineSource {
    pub(crate) fn new(state: Arc<Mutex<CombineState>>) -> Self {
        Self { state }
    }
}

impl NodeBase for CombineSource {
    fn name(&self) -> &str {
        "combine-source"
    }
}

impl Source for CombineSource {
    fn produce(&mut self) -> Result<Vec<Streams>, NodeError> {
        let mut state = self.state.lock().expect("combine state mutex poisoned");
        let mut out = Vec::new();
        while state.ready() && !state.all_finished() {
            out.push(Streams::new(state.pop_round()));
        }
        if state.terminal_pending() {
            out.push(Streams::new(state.take_terminal()));
        }
        Ok(out)
    }

    fn abort(&mut self) {
        self.state
            .lock()
            .expect("combine state mutex poisoned")
            .force_finish();
    }
}
