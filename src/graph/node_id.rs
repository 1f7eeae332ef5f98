// SPDX-License-Identifier: GPL-2.0-or-later

use std::fmt;

/// Stable integer id of a node within one graph's arena. Never reused after
/// a node is eliminated, so a held `NodeId` either still resolves or is
/// known-stale, never silently points at a different node.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u32);

impl NodeId {
    pub(crate) fn new(v: u32) -> Self {
        Self(v)
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }

    /// Stable arena index, exposed so executors outside this crate can key
    /// their own per-node bookkeeping (e.g. the parallel executor's
    /// `NodeInfo` table) by the same id space without reaching into
    /// `Graph`'s internals.
    #[must_use]
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
