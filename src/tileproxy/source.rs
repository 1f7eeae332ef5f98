// SPDX-License-Identifier: GPL-2.0-or-later

use crate::state::TileProxyState;
use common::Streams;
use graph::{NodeBase, NodeError, Source};
use std::sync::{Arc, Mutex};

/// The tile proxy's single output: pass-through tile data interleaved with
/// assembled extractor output, mirroring `TileProxySourceNode::produce`.
pub struct TileProxySource {
    state: Arc<Mutex<TileProxyState>>,
    done: bool,
}

impl TileProxySource {
    pub(crate) fn new(state: Arc<Mutex<TileProxyState>>) -> Self {
        Self { state, done: false }
    }
}

impl NodeBase for TileProxySource {
    fn name(&self) -> &str {
        "tile-proxy-source"
    }
}

impl Source for TileProxySource {
    fn produce(&mut self) -> Result<Vec<Streams>, NodeError> {
        if self.done {
            return Ok(Vec::new());
        }
        let mut state = self.state.lock().expect("tile proxy state mutex poisoned");
        let out = state.drain_output();
        if state.is_done() {
            self.done = true;
        }
        Ok(out)
    }

    fn abort(&mut self) {
        self.done = true;
    }
}
