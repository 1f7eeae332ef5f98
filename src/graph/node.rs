// SPDX-License-Identifier: GPL-2.0-or-later

use crate::error::NodeError;
use common::{ArcMsgLogger, Streams};

/// Common capabilities every node exposes regardless of its `Source`/
/// `Processor`/`Sink` role: a debug name, an optional diagnostic log hook,
/// and an optional graphviz description line.
pub trait NodeBase {
    fn name(&self) -> &str;

    /// Optional diagnostic hook; default is silent.
    fn set_log(&mut self, _log: ArcMsgLogger) {}

    /// Free-form line appended to this node's graphviz box label.
    fn graphviz_description(&self) -> String {
        String::new()
    }

    /// Queried once per parallel-executor tick; a node that is internally
    /// stalled (e.g. a step-lock waiting for a slower producer) reports
    /// itself blocked here without needing queued input.
    fn is_blocked(&self) -> bool {
        false
    }

    /// Called exactly once per source before its first `produce`, and once
    /// per non-source node before it may receive input, to let stateful
    /// nodes initialize against the now-frozen topology.
    fn graph_started(&mut self) {}
}

/// Produces `Streams` on demand; `abort` arranges the next `produce` to
/// emit end-of-stream rather than interrupting an in-flight one.
pub trait Source: NodeBase {
    fn produce(&mut self) -> Result<Vec<Streams>, NodeError>;
    fn abort(&mut self);
}

/// Transforms input into zero or more output bundles. Pure transforms
/// simply have `has_input` return exactly the result of applying their
/// function; stateful processors (combine, step-lock, tile proxy) may
/// buffer input and emit on a later call, or not at all.
pub trait Processor: NodeBase {
    fn has_input(&mut self, streams: Streams) -> Result<Vec<Streams>, NodeError>;
}

/// Terminal consumer; may perform I/O.
pub trait Sink: NodeBase {
    fn consume(&mut self, streams: Streams) -> Result<(), NodeError>;
}
