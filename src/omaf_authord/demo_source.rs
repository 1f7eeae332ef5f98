// SPDX-License-Identifier: GPL-2.0-or-later

//! Illustrative tile source wired by [`crate::app::run`]: emits a handful of
//! synthetic `H265Extractor` frames with region packing reflecting this
//! tile's slot in a simple horizontal grid, then end-of-stream. Stands in
//! for a real per-tile encoder, which is out of scope.

use common::{
    CodecFormat, CodedFrameMeta, CodingIndex, Data, Extractor, ExtractorList, FrameType,
    InlineConstruct, Meta, PresentationIndex, Rational, Region, RegionPacking, Storage, Streams,
    StreamId,
};
use graph::{NodeBase, NodeError, Source};
use std::collections::BTreeMap;

pub const TILE_WIDTH: u32 = 640;
pub const TILE_HEIGHT: u32 = 480;
const FRAMES_PER_TILE: i64 = 3;

pub struct DemoTileSource {
    name: String,
    stream_id: StreamId,
    tile_index: u32,
    tile_count: u32,
    next_frame: i64,
    done: bool,
}

impl DemoTileSource {
    #[must_use]
    pub fn new(stream_id: StreamId, tile_index: u32, tile_count: u32) -> Self {
        Self {
            name: format!("demo-tile-source[{tile_index}]"),
            stream_id,
            tile_index,
            tile_count,
            next_frame: 0,
            done: false,
        }
    }

    fn region(&self) -> Region {
        Region {
            proj_x: self.tile_index * TILE_WIDTH,
            proj_y: 0,
            proj_width: TILE_WIDTH,
            proj_height: TILE_HEIGHT,
            packed_x: self.tile_index * TILE_WIDTH,
            packed_y: 0,
            packed_width: TILE_WIDTH,
            packed_height: TILE_HEIGHT,
        }
    }
}

impl NodeBase for DemoTileSource {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Source for DemoTileSource {
    fn produce(&mut self) -> Result<Vec<Streams>, NodeError> {
        if self.done {
            return Ok(Vec::new());
        }
        if self.next_frame >= FRAMES_PER_TILE {
            self.done = true;
            return Ok(vec![Streams::single(Data::end_of_stream(self.stream_id))]);
        }

        let index = self.next_frame;
        self.next_frame += 1;

        let meta = CodedFrameMeta {
            presentation_index: PresentationIndex::new(index),
            coding_index: CodingIndex::new(index),
            coding_time: Rational::new(index, 25),
            presentation_time: Rational::new(index, 25),
            duration: Rational::new(1, 25),
            codec_format: CodecFormat::H265Extractor,
            frame_type: if index == 0 {
                FrameType::Idr
            } else {
                FrameType::NonIdr
            },
            codec_config: BTreeMap::new(),
            track_id: self.tile_index,
            avg_bitrate: 0,
            max_bitrate: 0,
            sampling_rate: 0,
            region_packing: Some(RegionPacking {
                packed_picture_width: TILE_WIDTH,
                packed_picture_height: TILE_HEIGHT,
                proj_picture_width: self.tile_count * TILE_WIDTH,
                proj_picture_height: TILE_HEIGHT,
                constituent_pict_matching: false,
                regions: vec![self.region()],
            }),
            spherical_coverage: None,
            quality_rank: None,
            in_coding_order: true,
        };

        let extractors: ExtractorList = vec![Extractor::Inline(InlineConstruct {
            idx: 0,
            bytes: vec![u8::try_from(self.tile_index).unwrap_or(u8::MAX); 4],
        })]
        .into_iter()
        .collect();

        let data = Data::new(Storage::Empty, self.stream_id)
            .with_meta(Meta::coded(meta))
            .with_extractors(extractors);
        Ok(vec![Streams::single(data)])
    }

    fn abort(&mut self) {
        self.done = true;
    }
}
