// SPDX-License-Identifier: GPL-2.0-or-later

use crate::alloc::{record_alloc, record_free};
use crate::extractor::ExtractorList;
use crate::meta::Meta;
use crate::stream_id::StreamId;
use bytes::Bytes;
use std::sync::Arc;

pub const MAX_NUM_PLANES: usize = 4;

/// Per-plane byte offset bookkeeping for a `CpuSubView`: where inside the
/// parent's planes the sub-view begins.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PlaneOffset {
    pub x_byte_offset: u32,
    pub x_bit_offset: u8,
    pub y_row_offset: u32,
    pub y_sub_offset: u8,
}

/// One or more CPU-resident byte planes (e.g. Y/U/V), each carrying its own
/// row stride and sub-pixel offsets so planar and packed formats share one
/// representation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CpuPlanes {
    pub planes: Vec<Bytes>,
    pub row_stride: Vec<u32>,
    pub pixel_bit_offset: Vec<u8>,
    pub row_sub_offset: Vec<u8>,
}

impl CpuPlanes {
    #[must_use]
    pub fn single(bytes: Bytes, row_stride: u32) -> Self {
        Self {
            planes: vec![bytes],
            row_stride: vec![row_stride],
            pixel_bit_offset: vec![0],
            row_sub_offset: vec![0],
        }
    }

    #[must_use]
    pub fn num_planes(&self) -> usize {
        self.planes.len()
    }

    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.planes.iter().map(|p| p.len() as u64).sum()
    }
}

/// Closed storage variant set, mirroring `StorageType` in the original
/// engine 1:1.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Storage {
    Empty,
    EndOfStream,
    Cpu(Arc<CpuPlanes>),
    /// Shares the parent's planes; keeps the parent alive.
    CpuSubView {
        parent: Arc<CpuPlanes>,
        offsets: Vec<PlaneOffset>,
    },
    Gpu {
        texture_ids: Vec<u32>,
    },
    File {
        path: Arc<str>,
        offset: u64,
        size: u64,
    },
    Fragmented(Vec<Storage>),
}

impl Storage {
    #[must_use]
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, Storage::EndOfStream)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Storage::Empty)
    }

    fn byte_size(&self) -> u64 {
        match self {
            Storage::Cpu(planes) => planes.total_size(),
            Storage::CpuSubView { parent, .. } => parent.total_size(),
            Storage::File { size, .. } => *size,
            Storage::Fragmented(parts) => parts.iter().map(Storage::byte_size).sum(),
            Storage::Empty | Storage::EndOfStream | Storage::Gpu { .. } => 0,
        }
    }
}

/// A ref-counted handle over a variant storage plus stream identity and
/// metadata. Storage is never mutated once constructed; cloning a `Data` is
/// an `Arc` clone, never a deep copy.
#[derive(Clone, Debug)]
pub struct Data {
    storage: Arc<Storage>,
    stream_id: StreamId,
    meta: Option<Meta>,
    extractors: Arc<ExtractorList>,
}

impl Data {
    #[must_use]
    pub fn new(storage: Storage, stream_id: StreamId) -> Self {
        record_alloc(storage.byte_size());
        Self {
            storage: Arc::new(storage),
            stream_id,
            meta: None,
            extractors: Arc::new(ExtractorList::new()),
        }
    }

    #[must_use]
    pub fn end_of_stream(stream_id: StreamId) -> Self {
        Self::new(Storage::EndOfStream, stream_id)
    }

    #[must_use]
    pub fn empty(stream_id: StreamId) -> Self {
        Self::new(Storage::Empty, stream_id)
    }

    #[must_use]
    pub fn with_meta(mut self, meta: Meta) -> Self {
        self.meta = Some(meta);
        self
    }

    #[must_use]
    pub fn with_extractors(mut self, extractors: ExtractorList) -> Self {
        self.extractors = Arc::new(extractors);
        self
    }

    #[must_use]
    pub fn is_end_of_stream(&self) -> bool {
        self.storage.is_end_of_stream()
    }

    #[must_use]
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    #[must_use]
    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    pub fn set_stream_id(&mut self, stream_id: StreamId) {
        self.stream_id = stream_id;
    }

    #[must_use]
    pub fn meta(&self) -> Option<&Meta> {
        self.meta.as_ref()
    }

    #[must_use]
    pub fn extractors(&self) -> &ExtractorList {
        &self.extractors
    }

    /// Carves a sub-view over CPU storage only, as in the original (which
    /// asserts CPU-only for this operation).
    #[must_use]
    pub fn sub_data(&self, offsets: Vec<PlaneOffset>) -> Option<Data> {
        let parent = match self.storage.as_ref() {
            Storage::Cpu(planes) => planes.clone(),
            Storage::CpuSubView { parent, .. } => parent.clone(),
            _ => return None,
        };
        Some(Data::new(
            Storage::CpuSubView { parent, offsets },
            self.stream_id,
        ))
    }

    /// Same as [`Data::sub_data`] but permits the requested window to wrap
    /// around the end of the underlying plane (used by ring-buffered CPU
    /// sources). Offsets are the caller's responsibility to normalize.
    #[must_use]
    pub fn sub_data_wrap_around(&self, offsets: Vec<PlaneOffset>) -> Option<Data> {
        self.sub_data(offsets)
    }
}

impl Drop for Data {
    fn drop(&mut self) {
        if Arc::strong_count(&self.storage) == 1 {
            record_free(self.storage.byte_size());
        }
    }
}

/// An ordered bundle of `Data` representing one frame boundary across
/// parallel channels. End-of-stream iff the first element is end-of-stream.
#[derive(Clone, Debug, Default)]
pub struct Streams(Vec<Data>);

impl Streams {
    #[must_use]
    pub fn new(data: Vec<Data>) -> Self {
        Self(data)
    }

    #[must_use]
    pub fn single(data: Data) -> Self {
        Self(vec![data])
    }

    #[must_use]
    pub fn is_end_of_stream(&self) -> bool {
        self.0.first().is_some_and(Data::is_end_of_stream)
    }

    #[must_use]
    pub fn as_slice(&self) -> &[Data] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<Data> {
        self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<Data>> for Streams {
    fn from(data: Vec<Data>) -> Self {
        Self(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_end_of_stream() {
        let eos = Data::end_of_stream(StreamId::new(1));
        assert!(eos.is_end_of_stream());
        let streams = Streams::single(eos);
        assert!(streams.is_end_of_stream());
    }

    #[test]
    fn test_cpu_sub_view_keeps_parent_alive() {
        let planes = CpuPlanes::single(Bytes::from_static(b"abcd"), 4);
        let data = Data::new(Storage::Cpu(Arc::new(planes)), StreamId::new(2));
        let sub = data.sub_data(vec![PlaneOffset::default()]).expect("cpu sub view");
        drop(data);
        match sub.storage() {
            Storage::CpuSubView { parent, .. } => assert_eq!(parent.planes[0], Bytes::from_static(b"abcd")),
            other => panic!("expected CpuSubView, got {other:?}"),
        }
    }

    #[test]
    fn test_sub_data_rejects_non_cpu() {
        let data = Data::new(Storage::Gpu { texture_ids: vec![1] }, StreamId::new(3));
        assert!(data.sub_data(vec![]).is_none());
    }

    #[test]
    fn test_clone_shares_storage() {
        let planes = CpuPlanes::single(Bytes::from_static(b"xyz"), 3);
        let data = Data::new(Storage::Cpu(Arc::new(planes)), StreamId::new(4));
        let cloned = data.clone();
        let Storage::Cpu(a) = data.storage() else {
            panic!("expected Cpu storage");
        };
        let Storage::Cpu(b) = cloned.storage() else {
            panic!("expected Cpu storage");
        };
        assert!(Arc::ptr_eq(a, b));
    }
}
