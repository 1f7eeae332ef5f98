// SPDX-License-Identifier: GPL-2.0-or-later

//! Per-node scheduling state (`NodeInfo` in `spec.md` §4.3), one instance
//! per node, each guarded by its own lock. Nothing in here ever locks a
//! second node's `NodeInfo` while holding this one except in the
//! child-before-parent order enforced by `worker.rs`.

use common::{MetaKind, PresentationIndex, Streams};
use std::collections::VecDeque;
use std::time::Duration;

/// Extracts the scheduler's "age" key for one frame bundle: the
/// presentation index of the first element that carries metadata, or the
/// default (zero) index for bundles that don't (synthetic placeholders,
/// bare EOS markers built without a meta bag). `spec.md` §4.3 describes
/// this as "the atomic presentation index of the FIFO's head"; frames
/// without meta are rare enough in practice that falling back to a fixed
/// key rather than threading a separate monotonic counter through every
/// node is an acceptable simplification.
#[must_use]
pub fn presentation_index_of(streams: &Streams) -> PresentationIndex {
    streams
        .as_slice()
        .iter()
        .find_map(|d| d.meta())
        .and_then(|m| match &m.kind {
            Some(MetaKind::Raw(r)) => Some(r.presentation_index),
            Some(MetaKind::Coded(c)) => Some(c.presentation_index),
            None => None,
        })
        .unwrap_or_default()
}

/// Per-node scheduling and accounting state. Field names follow `spec.md`
/// §4.3 (`NodeInfo`) directly; `parents`/`num_output_nodes` are filled in
/// once, at setup, from the graph's edge list and never change afterwards
/// (the topology is frozen once the parallel executor starts stepping).
#[derive(Default)]
pub struct NodeInfo {
    pub enqueued: VecDeque<Streams>,
    pub oldest_enqueued_data: Option<PresentationIndex>,
    pub running: bool,
    pub num_blocked_outputs: usize,
    pub num_output_nodes: usize,
    pub set_parent_blocked: bool,
    pub is_internally_blocked: bool,
    pub terminated: bool,
    pub is_source: bool,
    pub runtime_secs: f64,
    pub input_calls: u64,
    pub output_emissions: u64,
}

impl NodeInfo {
    #[must_use]
    pub fn new(is_source: bool, num_output_nodes: usize) -> Self {
        Self {
            is_source,
            num_output_nodes,
            ..Self::default()
        }
    }

    pub fn push(&mut self, streams: Streams) {
        if self.enqueued.is_empty() {
            self.oldest_enqueued_data = Some(presentation_index_of(&streams));
        }
        self.enqueued.push_back(streams);
        self.input_calls += 1;
    }

    pub fn pop(&mut self) -> Option<Streams> {
        let item = self.enqueued.pop_front();
        self.oldest_enqueued_data = self.enqueued.front().map(presentation_index_of);
        item
    }

    #[must_use]
    pub fn has_work(&self) -> bool {
        !self.enqueued.is_empty()
    }

    /// "over-employed": has queued work, or reports itself internally
    /// stalled (step-lock waiting on a slower sibling, tile proxy waiting
    /// for the rest of its fan-in, ...).
    #[must_use]
    pub fn is_over_employed(&self) -> bool {
        !self.enqueued.is_empty() || self.is_internally_blocked
    }

    /// "outputs-blocked": a source is throttled by a single over-employed
    /// child; any other node needs *every* one of its children
    /// over-employed (or at least one, if it has none) before it stops
    /// being scheduled.
    #[must_use]
    pub fn is_outputs_blocked(&self) -> bool {
        let threshold = if self.is_source {
            1
        } else {
            self.num_output_nodes.max(1)
        };
        self.num_blocked_outputs >= threshold
    }

    pub fn record_runtime(&mut self, elapsed: Duration) {
        self.runtime_secs += elapsed.as_secs_f64();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{CodedFrameMeta, Data, FrameType, Meta, StreamId};
    use std::collections::BTreeMap;

    fn coded_streams(idx: i64) -> Streams {
        let meta = Meta::coded(CodedFrameMeta {
            presentation_index: PresentationIndex::new(idx),
            coding_index: Default::default(),
            coding_time: Default::default(),
            presentation_time: Default::default(),
            duration: Default::default(),
            codec_format: common::CodecFormat::H265,
            frame_type: FrameType::Idr,
            codec_config: BTreeMap::new(),
            track_id: 0,
            avg_bitrate: 0,
            max_bitrate: 0,
            sampling_rate: 0,
            region_packing: None,
            spherical_coverage: None,
            quality_rank: None,
            in_coding_order: true,
        });
        Streams::single(Data::empty(StreamId::new(0)).with_meta(meta))
    }

    #[test]
    fn test_push_pop_tracks_oldest() {
        let mut info = NodeInfo::new(false, 1);
        assert_eq!(info.oldest_enqueued_data, None);
        info.push(coded_streams(5));
        assert_eq!(info.oldest_enqueued_data, Some(PresentationIndex::new(5)));
        info.push(coded_streams(6));
        assert_eq!(info.oldest_enqueued_data, Some(PresentationIndex::new(5)));
        info.pop();
        assert_eq!(info.oldest_enqueued_data, Some(PresentationIndex::new(6)));
        info.pop();
        assert_eq!(info.oldest_enqueued_data, None);
    }

    #[test]
    fn test_outputs_blocked_thresholds() {
        let mut source = NodeInfo::new(true, 3);
        assert!(!source.is_outputs_blocked());
        source.num_blocked_outputs = 1;
        assert!(source.is_outputs_blocked());

        let mut processor = NodeInfo::new(false, 3);
        processor.num_blocked_outputs = 2;
        assert!(!processor.is_outputs_blocked());
        processor.num_blocked_outputs = 3;
        assert!(processor.is_outputs_blocked());

        let mut sink_like = NodeInfo::new(false, 0);
        assert!(!sink_like.is_outputs_blocked());
        sink_like.num_blocked_outputs = 1;
        assert!(sink_like.is_outputs_blocked());
    }

    #[test]
    fn test_over_employed() {
        let mut info = NodeInfo::new(false, 1);
        assert!(!info.is_over_employed());
        info.is_internally_blocked = true;
        assert!(info.is_over_employed());
        info.is_internally_blocked = false;
        info.push(coded_streams(0));
        assert!(info.is_over_employed());
    }
}
