// SPDX-License-Identifier: GPL-2.0-or-later

use crate::config::{AssemblyMode, OutputMode, TileProxyConfig};
use crate::rewrite::SliceHeaderRewriter;
use crate::sei::build_synthetic_sei_buffer;
use bytes::Bytes;
use common::{
    CodecConfigKind, CodecFormat, CodingIndex, CpuPlanes, Data, Extractor, ExtractorList, Meta,
    RegionPacking, Storage, Streams, StreamId, TrackIdTag,
};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

/// One queued extractor-format `Data` plus whether it represents an
/// end-of-stream marker rather than real data, mirroring the
/// `{data, endOfStream}` pair the original pushes into `mExtractorCache`
/// (a stream's cache keeps receiving entries even past its own EOS, purely
/// so `extractorReadyForEoS` can observe every tile has reached it).
struct CacheItem {
    data: Data,
    is_eos: bool,
}

/// Shared state behind one tile proxy group's sinks and source, mirroring
/// `TileProxy`'s member fields in `tileproxy.h`/`tileproxymultires.h`.
pub(crate) struct TileProxyState {
    config: TileProxyConfig,
    rewriter: Option<Arc<dyn SliceHeaderRewriter>>,
    extractor_cache: BTreeMap<StreamId, VecDeque<CacheItem>>,
    tile_stream_ids: BTreeSet<StreamId>,
    finished_tile_streams: BTreeSet<StreamId>,
    extractor_finished: bool,
    extractor_sei_created: bool,
    first_extractor_round: bool,
    sink_latest_coding_index: BTreeMap<usize, CodingIndex>,
    output: VecDeque<Streams>,
}

impl TileProxyState {
    pub fn new(config: TileProxyConfig, rewriter: Option<Arc<dyn SliceHeaderRewriter>>) -> Self {
        Self {
            config,
            rewriter,
            extractor_cache: BTreeMap::new(),
            tile_stream_ids: BTreeSet::new(),
            finished_tile_streams: BTreeSet::new(),
            extractor_finished: false,
            extractor_sei_created: false,
            first_extractor_round: true,
            sink_latest_coding_index: BTreeMap::new(),
            output: VecDeque::new(),
        }
    }

    pub fn register_tile_stream_ids(&mut self, ids: &BTreeSet<StreamId>) {
        for &id in ids {
            self.tile_stream_ids.insert(id);
        }
    }

    /// Mirrors `TileProxy::submit`: routes one input bundle from sink
    /// `sink_id`, updating the extractor cache, the finished-stream sets,
    /// and the pass-through output queue.
    pub fn submit(&mut self, sink_id: usize, streams: Streams) {
        let bundle_is_eos = streams.is_end_of_stream();
        for data in streams.as_slice() {
            let stream_id = data.stream_id();
            if bundle_is_eos {
                if self.tile_stream_ids.contains(&stream_id) {
                    self.finished_tile_streams.insert(stream_id);
                }
                while self.extractor_data_collection_ready() {
                    self.process_extractors();
                }
                if self.extractor_cache.contains_key(&stream_id) {
                    self.extractor_cache.entry(stream_id).or_default().push_back(CacheItem {
                        data: data.clone(),
                        is_eos: true,
                    });
                    if self.extractor_ready_for_eos() {
                        self.create_eos();
                        self.extractor_finished = true;
                    }
                }
                self.output.push_back(Streams::single(data.clone()));
            } else {
                if let Some(coding_index) = data.meta().and_then(Meta::as_coded).map(|m| m.coding_index) {
                    self.sink_latest_coding_index.insert(sink_id, coding_index);
                }
                let is_extractor = data
                    .meta()
                    .and_then(Meta::as_coded)
                    .is_some_and(|m| m.codec_format == CodecFormat::H265Extractor);
                if is_extractor {
                    self.extractor_cache.entry(stream_id).or_default().push_back(CacheItem {
                        data: data.clone(),
                        is_eos: false,
                    });
                    while self.extractor_data_collection_ready() {
                        self.process_extractors();
                    }
                } else {
                    self.output.push_back(Streams::single(data.clone()));
                }
            }
        }
    }

    fn extractor_data_collection_ready(&self) -> bool {
        if self.extractor_cache.len() < self.config.tile_count {
            return false;
        }
        self.extractor_cache.values().all(|q| !q.is_empty())
    }

    fn extractor_ready_for_eos(&self) -> bool {
        if self.extractor_cache.len() < self.config.tile_count {
            return false;
        }
        self.extractor_cache
            .values()
            .all(|q| q.front().is_some_and(|item| item.is_eos))
    }

    fn process_extractors(&mut self) {
        match &self.config.mode.clone() {
            AssemblyMode::SingleResolution(single) => {
                let data = self.collect_single_resolution(*single);
                self.output.push_back(Streams::single(data));
            }
            AssemblyMode::MultiResolution(multi) => {
                let directions = multi.directions.clone();
                for direction in &directions {
                    let data = self.collect_multi_resolution(multi, direction, self.first_extractor_round);
                    self.output.push_back(Streams::single(data));
                }
                self.first_extractor_round = false;
                for queue in self.extractor_cache.values_mut() {
                    queue.pop_front();
                }
            }
        }
    }

    fn create_eos(&mut self) {
        match &self.config.mode {
            AssemblyMode::SingleResolution(_) => {
                let (stream_id, track_id) = self.config.extractors[0];
                let mut meta = Meta::default();
                meta.tags.set(TrackIdTag(track_id));
                self.output
                    .push_back(Streams::single(Data::end_of_stream(stream_id).with_meta(meta)));
            }
            AssemblyMode::MultiResolution(multi) => {
                for direction in &multi.directions {
                    let mut meta = Meta::default();
                    meta.tags.set(TrackIdTag(direction.extractor_track_id));
                    self.output.push_back(Streams::single(
                        Data::end_of_stream(direction.extractor_stream_id).with_meta(meta),
                    ));
                }
            }
        }
        self.extractor_cache.clear();
    }

    /// Mirrors `TileProxy::collectExtractors` (single-resolution).
    fn collect_single_resolution(&mut self, single: crate::config::SingleResConfig) -> Data {
        let (extractor_stream_id, extractor_track_id) = self.config.extractors[0];
        let output_mode = self.config.output_mode;

        let mut combined_meta = self
            .extractor_cache
            .values()
            .next()
            .and_then(|q| q.front())
            .and_then(|item| item.data.meta())
            .and_then(Meta::as_coded)
            .cloned()
            .expect("extractor_data_collection_ready guarantees a queued coded frame");

        if let Some(rp) = &mut combined_meta.region_packing {
            rp.packed_picture_width = single.merged_width;
            rp.packed_picture_height = single.merged_height;
            rp.proj_picture_width = single.merged_width;
            rp.proj_picture_height = single.merged_height;
            if matches!(output_mode, OutputMode::SideBySide | OutputMode::TopBottom) {
                rp.constituent_pict_matching = true;
            }
            rp.regions.clear();
        }

        let mut extractors = ExtractorList::new();
        for queue in self.extractor_cache.values_mut() {
            let item = queue
                .pop_front()
                .expect("extractor_data_collection_ready guarantees a queued item per tile");
            if let Some(extractor) = item.data.extractors().iter().next() {
                extractors.insert(extractor.clone());
            }
            if let (Some(combined_rp), Some(item_rp)) = (
                &mut combined_meta.region_packing,
                item.data
                    .meta()
                    .and_then(Meta::as_coded)
                    .and_then(|m| m.region_packing.clone()),
            ) {
                if let Some(region) = item_rp.regions.first() {
                    let keep = match output_mode {
                        OutputMode::TopBottom => region.packed_y < combined_rp.packed_picture_height / 2,
                        OutputMode::SideBySide => region.packed_x < combined_rp.packed_picture_width / 2,
                        OutputMode::Mono => true,
                    };
                    if keep {
                        combined_rp.regions.push(*region);
                    }
                }
            }
        }

        let mut meta = Meta::coded(combined_meta.clone());
        meta.tags.set(TrackIdTag(extractor_track_id));

        let storage = if self.extractor_sei_created {
            Storage::Empty
        } else {
            self.extractor_sei_created = true;
            sei_storage(combined_meta.region_packing.as_ref())
        };

        Data::new(storage, extractor_stream_id)
            .with_meta(meta)
            .with_extractors(extractors)
    }

    /// Mirrors `TileProxyMultiRes::collectExtractors` for one direction.
    /// `mExtractorSEICreated` is shared across every direction in the
    /// original, so only the very first direction processed in the whole
    /// run's very first round carries the synthetic SEI buffer.
    fn collect_multi_resolution(
        &mut self,
        multi: &crate::config::MultiResConfig,
        direction: &crate::config::TileDirectionConfig,
        first_packet: bool,
    ) -> Data {
        let first_tile_stream = direction
            .tiles
            .first()
            .expect("a direction needs at least one tile")
            .stream_id;
        let mut meta = self
            .extractor_cache
            .get(&first_tile_stream)
            .and_then(|q| q.front())
            .and_then(|item| item.data.meta())
            .and_then(Meta::as_coded)
            .cloned()
            .expect("collect_multi_resolution called only when data is cached");

        if first_packet {
            if let (Some(rewriter), Some(sps)) = (
                &self.rewriter,
                meta.codec_config.get(&CodecConfigKind::Sps),
            ) {
                let empty = Vec::new();
                let pps = meta.codec_config.get(&CodecConfigKind::Pps).unwrap_or(&empty);
                let (new_sps, new_pps) = rewriter.rewrite_sps_pps(
                    sps,
                    pps,
                    multi.packed_width,
                    multi.packed_height,
                    &multi.grid.column_widths,
                    &multi.grid.row_heights,
                );
                meta.codec_config.insert(CodecConfigKind::Sps, new_sps);
                meta.codec_config.insert(CodecConfigKind::Pps, new_pps);
            }
        }

        if let Some(rp) = &mut meta.region_packing {
            rp.packed_picture_width = multi.packed_width;
            rp.packed_picture_height = multi.packed_height;
            rp.proj_picture_width = multi.projected_width;
            rp.proj_picture_height = multi.projected_height;
            if matches!(self.config.output_mode, OutputMode::SideBySide | OutputMode::TopBottom) {
                rp.constituent_pict_matching = true;
            }
            rp.regions.clear();
        }

        let mut extractors = ExtractorList::new();
        for tile in &direction.tiles {
            let Some(item) = self.extractor_cache.get(&tile.stream_id).and_then(|q| q.front()) else {
                continue;
            };
            let Some(source_extractor) = item.data.extractors().iter().next() else {
                continue;
            };
            let rewritten: Extractor = match &self.rewriter {
                Some(rewriter) => rewriter.rewrite_slice_header(
                    source_extractor,
                    tile.ctu_index,
                    multi.packed_width,
                    multi.packed_height,
                ),
                None => source_extractor.clone(),
            };
            extractors.insert(rewritten);
            if let Some(rp) = &mut meta.region_packing {
                rp.regions.push(tile.region);
            }
        }

        let mut out_meta = Meta::coded(meta.clone());
        out_meta.tags.set(TrackIdTag(direction.extractor_track_id));

        let storage = if self.extractor_sei_created {
            Storage::Empty
        } else {
            self.extractor_sei_created = true;
            sei_storage(meta.region_packing.as_ref())
        };

        Data::new(storage, direction.extractor_stream_id)
            .with_meta(out_meta)
            .with_extractors(extractors)
    }

    pub fn is_blocked(&self, sink_id: usize, sink_stream_ids: &BTreeSet<StreamId>) -> bool {
        if self.is_ahead(sink_id) {
            return true;
        }
        if self.is_output_full() {
            return true;
        }
        let full = self.full_tiles();
        sink_stream_ids.iter().any(|id| full.contains(id))
    }

    fn is_output_full(&self) -> bool {
        self.output.len() >= 100
    }

    fn is_ahead(&self, sink_id: usize) -> bool {
        let Some(&mine) = self.sink_latest_coding_index.get(&sink_id) else {
            return false;
        };
        let Some(&smallest) = self.sink_latest_coding_index.values().min() else {
            return false;
        };
        *mine >= *smallest + 1
    }

    fn full_tiles(&self) -> BTreeSet<StreamId> {
        self.extractor_cache
            .iter()
            .filter(|(_, q)| !q.is_empty())
            .map(|(&id, _)| id)
            .collect()
    }

    pub fn drain_output(&mut self) -> Vec<Streams> {
        self.output.drain(..).collect()
    }

    pub fn is_done(&self) -> bool {
        self.finished_tile_streams.len() == self.tile_stream_ids.len()
            && !self.tile_stream_ids.is_empty()
            && self.extractor_finished
    }
}

fn sei_storage(region_packing: Option<&RegionPacking>) -> Storage {
    let bytes = build_synthetic_sei_buffer(region_packing);
    Storage::Cpu(Arc::new(CpuPlanes::single(Bytes::from(bytes), 0)))
}
