// SPDX-License-Identifier: GPL-2.0-or-later

use crate::rational::{CodingIndex, PresentationIndex, Rational};
use crate::tag::TagBag;
use std::collections::BTreeMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    Yuv420P,
    Yuv422P,
    Yuv444P,
    Nv12,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CodecFormat {
    H264,
    H265,
    H265Extractor,
    Aac,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameType {
    Idr,
    NonIdr,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CodecConfigKind {
    Vps,
    Sps,
    Pps,
    AudioSpecificConfig,
}

/// Metadata describing an un-encoded, decoded frame.
#[derive(Clone, Debug)]
pub struct RawFrameMeta {
    pub presentation_index: PresentationIndex,
    pub presentation_time: Rational,
    pub duration: Rational,
    pub pixel_format: PixelFormat,
    pub width: u32,
    pub height: u32,
}

/// How a packed picture maps onto the projected picture. The core only
/// carries and rewrites this; it never interprets the projection itself.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RegionPacking {
    pub packed_picture_width: u32,
    pub packed_picture_height: u32,
    pub proj_picture_width: u32,
    pub proj_picture_height: u32,
    pub constituent_pict_matching: bool,
    pub regions: Vec<Region>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Region {
    pub proj_x: u32,
    pub proj_y: u32,
    pub proj_width: u32,
    pub proj_height: u32,
    pub packed_x: u32,
    pub packed_y: u32,
    pub packed_width: u32,
    pub packed_height: u32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SphericalCoverage {
    pub azimuth_center: i32,
    pub elevation_center: i32,
    pub azimuth_range: u32,
    pub elevation_range: u32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QualityRank {
    pub quality_ranking: u8,
    pub quality_type: u8,
}

/// Metadata describing an encoded frame.
#[derive(Clone, Debug)]
pub struct CodedFrameMeta {
    pub presentation_index: PresentationIndex,
    pub coding_index: CodingIndex,
    pub coding_time: Rational,
    pub presentation_time: Rational,
    pub duration: Rational,
    pub codec_format: CodecFormat,
    pub frame_type: FrameType,
    pub codec_config: BTreeMap<CodecConfigKind, Vec<u8>>,
    pub track_id: u32,
    pub avg_bitrate: u64,
    pub max_bitrate: u64,
    pub sampling_rate: u32,
    pub region_packing: Option<RegionPacking>,
    pub spherical_coverage: Option<SphericalCoverage>,
    pub quality_rank: Option<QualityRank>,
    pub in_coding_order: bool,
}

/// Discriminated metadata union attached to every non-empty, non-EOS `Data`,
/// plus the type-indexed tag bag every node may read or write without
/// widening this struct.
#[derive(Clone, Debug)]
pub enum MetaKind {
    Raw(RawFrameMeta),
    Coded(CodedFrameMeta),
}

#[derive(Clone, Debug, Default)]
pub struct Meta {
    pub kind: Option<MetaKind>,
    pub tags: TagBag,
}

impl Meta {
    #[must_use]
    pub fn raw(meta: RawFrameMeta) -> Self {
        Self {
            kind: Some(MetaKind::Raw(meta)),
            tags: TagBag::new(),
        }
    }

    #[must_use]
    pub fn coded(meta: CodedFrameMeta) -> Self {
        Self {
            kind: Some(MetaKind::Coded(meta)),
            tags: TagBag::new(),
        }
    }

    #[must_use]
    pub fn as_raw(&self) -> Option<&RawFrameMeta> {
        match &self.kind {
            Some(MetaKind::Raw(m)) => Some(m),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_coded(&self) -> Option<&CodedFrameMeta> {
        match &self.kind {
            Some(MetaKind::Coded(m)) => Some(m),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_coded_mut(&mut self) -> Option<&mut CodedFrameMeta> {
        match &mut self.kind {
            Some(MetaKind::Coded(m)) => Some(m),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meta_raw_accessor() {
        let meta = Meta::raw(RawFrameMeta {
            presentation_index: PresentationIndex::new(0),
            presentation_time: Rational::new(0, 25),
            duration: Rational::new(1, 25),
            pixel_format: PixelFormat::Yuv420P,
            width: 1920,
            height: 1080,
        });
        assert!(meta.as_raw().is_some());
        assert!(meta.as_coded().is_none());
    }
}
