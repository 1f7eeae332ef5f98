// SPDX-License-Identifier: GPL-2.0-or-later

//! Construction-time configuration for [`crate::TileProxy`], grounded in
//! `TileProxy::Config`/`TileMergeConfig` in
//! `original_source/Creator/src/omaf/{tileproxy,tileproxymultires}.h`.

use common::{Region, StreamId};

/// How the tile proxy's pooled picture relates to the projected picture,
/// mirrored from `PipelineOutputVideo` in the original (`omafproperties.h`):
/// only the framepacking arrangements that change region-packing rewriting
/// are modeled here.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputMode {
    Mono,
    SideBySide,
    TopBottom,
}

/// One tile's position in the merged grid, used by the multi-resolution
/// assembly to tell the external rewriter which CTU offset a tile's slice
/// header must now carry.
#[derive(Clone, Debug)]
pub struct DirectionTile {
    pub stream_id: StreamId,
    pub ctu_index: u64,
    pub region: Region,
}

/// One viewport/direction's tile layout and extractor identity, mirrored
/// from `TileDirectionConfig` in `tileproxymultires.h`.
#[derive(Clone, Debug)]
pub struct TileDirectionConfig {
    pub extractor_stream_id: StreamId,
    pub extractor_track_id: u32,
    /// Flattened grid of participating tiles, row-major as in the original
    /// (`aDirection.tiles`, a grid of grid-tiles each possibly holding more
    /// than one physical tile for higher-resolution regions).
    pub tiles: Vec<DirectionTile>,
}

/// Packed/projected picture size and CTU grid for the merged multi-
/// resolution picture, mirrored from `TileMergeConfig` fields consumed by
/// `collectExtractors` (`packedWidth`/`packedHeight`/`projectedWidth`/
/// `projectedHeight`, `grid.columnWidths`/`grid.rowHeights`).
#[derive(Clone, Debug, Default)]
pub struct TileGrid {
    pub column_widths: Vec<u32>,
    pub row_heights: Vec<u32>,
}

#[derive(Clone, Debug)]
pub struct MultiResConfig {
    pub directions: Vec<TileDirectionConfig>,
    pub packed_width: u32,
    pub packed_height: u32,
    pub projected_width: u32,
    pub projected_height: u32,
    pub grid: TileGrid,
}

/// Merged-picture dimensions for the single-resolution pooled extractor
/// stream. The distilled `CodedFrameMeta` carries no width/height of its
/// own (`spec.md` §3), so the combined grid size that `cMeta.width`/
/// `cMeta.height` supplied in the original is passed in here instead.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SingleResConfig {
    pub merged_width: u32,
    pub merged_height: u32,
}

#[derive(Clone, Debug)]
pub enum AssemblyMode {
    /// One pooled extractor stream; region packing is rewritten in place
    /// and all regions from every tile are retained (or, for framepacked
    /// stereo, only the first half — see `collect_single_resolution`).
    SingleResolution(SingleResConfig),
    MultiResolution(MultiResConfig),
}

/// Construction parameters for a tile proxy group, mirrored from
/// `TileProxy::Config`.
#[derive(Clone, Debug)]
pub struct TileProxyConfig {
    pub tile_count: usize,
    /// `(extractorStreamId, extractorTrackId)` per viewport/direction; the
    /// single-resolution mode uses only the first entry (matching the
    /// original, which takes `aConfig.extractors.front()`).
    pub extractors: Vec<(StreamId, u32)>,
    pub output_mode: OutputMode,
    pub mode: AssemblyMode,
}
