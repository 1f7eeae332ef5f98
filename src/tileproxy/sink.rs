// SPDX-License-Identifier: GPL-2.0-or-later

use crate::state::TileProxyState;
use common::Streams;
use graph::{NodeBase, NodeError, Processor};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

/// One per tile substream (or, as in the original, one per set of tile
/// substreams routed through a single sink): forwards submissions into the
/// shared [`TileProxyState`] and reports back-pressure per
/// `TileProxySinkNode::isBlocked`.
pub struct TileProxySink {
    sink_id: usize,
    stream_ids: BTreeSet<common::StreamId>,
    name: String,
    state: Arc<Mutex<TileProxyState>>,
}

impl TileProxySink {
    pub(crate) fn new(
        sink_id: usize,
        stream_ids: BTreeSet<common::StreamId>,
        state: Arc<Mutex<TileProxyState>>,
    ) -> Self {
        state
            .lock()
            .expect("tile proxy state mutex poisoned")
            .register_tile_stream_ids(&stream_ids);
        Self {
            sink_id,
            name: format!("tile-proxy-sink[{sink_id}]"),
            stream_ids,
            state,
        }
    }
}

impl NodeBase for TileProxySink {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_blocked(&self) -> bool {
        self.state
            .lock()
            .expect("tile proxy state mutex poisoned")
            .is_blocked(self.sink_id, &self.stream_ids)
    }
}

impl Processor for TileProxySink {
    fn has_input(&mut self, streams: Streams) -> Result<Vec<Streams>, NodeError> {
        self.state
            .lock()
            .expect("tile proxy state mutex poisoned")
            .submit(self.sink_id, streams);
        Ok(Vec::new())
    }
}
