// SPDX-License-Identifier: GPL-2.0-or-later

use crate::node_id::NodeId;
use crate::stream_filter::StreamFilter;

/// One callback edge: `{target, streamFilter}` plus an optional debug
/// label, owned by the source node's callback list.
#[derive(Clone, Debug)]
pub struct Edge {
    pub target: NodeId,
    pub filter: StreamFilter,
    pub label: String,
}

impl Edge {
    #[must_use]
    pub fn new(target: NodeId, filter: StreamFilter) -> Self {
        Self {
            target,
            filter,
            label: String::new(),
        }
    }

    #[must_use]
    pub fn labeled(target: NodeId, filter: StreamFilter, label: impl Into<String>) -> Self {
        Self {
            target,
            filter,
            label: label.into(),
        }
    }
}

/// Handle to a registered edge, used to re-label or re-point it later.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EdgeHandle {
    pub from: NodeId,
    pub index: usize,
}
