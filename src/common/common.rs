// SPDX-License-Identifier: GPL-2.0-or-later

pub mod alloc;
pub mod data;
pub mod error;
pub mod extractor;
pub mod log;
pub mod meta;
pub mod rational;
pub mod stream_id;
pub mod tag;
pub mod time;

pub use alloc::{global_data_allocations, DataAllocationsSnapshot};
pub use data::{CpuPlanes, Data, PlaneOffset, Storage, Streams};
pub use error::DynError;
pub use extractor::{Extractor, ExtractorList, InlineConstruct, SampleConstruct, SliceInfo};
pub use log::{dummy_msg_logger, ArcMsgLogger, LogLevel, MsgLogger};
pub use meta::{
    CodecConfigKind, CodecFormat, CodedFrameMeta, FrameType, Meta, MetaKind, PixelFormat,
    QualityRank, RawFrameMeta, Region, RegionPacking, SphericalCoverage,
};
pub use rational::{CodingIndex, PresentationIndex, Rational};
pub use stream_id::StreamId;
pub use tag::{SegmentRole, TagBag, TrackIdTag};
