// SPDX-License-Identifier: GPL-2.0-or-later

//! JSON pipeline configuration loader (`SPEC_FULL.md` §3), mirroring the
//! shape of the teacher's `env` crate (`EnvConf::new` load-or-generate, a
//! `Raw*` deserialize target separate from the validated public struct, a
//! `cannot-open-file`/`config-*` error taxonomy) but reading JSON rather
//! than TOML, since `original_source/Creator/src/config/config.cpp` is a
//! JSON-driven loader in the original tool.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// One viewport/direction's extractor identity, mirrored from
/// `spec.md` §4.6's `(extractorStreamId, extractorTrackId)` pairs.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
pub struct ExtractorConfig {
    pub stream_id: u32,
    pub track_id: u32,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutputModeConfig {
    Mono,
    SideBySide,
    TopBottom,
}

#[derive(Debug, Deserialize)]
struct RawPipelineConfig {
    tile_count: usize,
    extractors: Vec<ExtractorConfig>,
    output_mode: OutputModeConfig,
    step_lock_max_ahead: i64,
    thread_count: Option<usize>,
    save_dir: Option<PathBuf>,
}

/// Validated pipeline configuration: tile counts, extractor stream/track
/// ids, step-lock throttle limit, and an optional thread-count override for
/// the parallel executor, per `SPEC_FULL.md` §3.
#[derive(Clone, Debug, PartialEq)]
pub struct PipelineConfig {
    tile_count: usize,
    extractors: Vec<ExtractorConfig>,
    output_mode: OutputModeConfig,
    step_lock_max_ahead: i64,
    thread_count: Option<usize>,
    save_dir: Option<PathBuf>,
    raw: String,
}

impl PipelineConfig {
    /// Loads `config_path`, generating a commented-free default file and
    /// exiting the process if it doesn't exist yet, exactly as
    /// `EnvConf::new` does for `configs/sentryshot.toml`.
    pub fn new(config_path: &Path) -> Result<Self, PipelineConfigNewError> {
        use PipelineConfigNewError::{Generate, Parse, ReadFile};
        if !config_path.exists() {
            println!(
                "\n\nGenerating '{}' and exiting..\n\n\n",
                config_path.display()
            );
            generate_config(config_path).map_err(Generate)?;
            std::process::exit(0);
        }

        let json = fs::read_to_string(config_path).map_err(ReadFile)?;
        parse_config(json).map_err(Parse)
    }

    #[must_use]
    pub fn tile_count(&self) -> usize {
        self.tile_count
    }

    #[must_use]
    pub fn extractors(&self) -> &[ExtractorConfig] {
        &self.extractors
    }

    #[must_use]
    pub fn output_mode(&self) -> OutputModeConfig {
        self.output_mode
    }

    #[must_use]
    pub fn step_lock_max_ahead(&self) -> i64 {
        self.step_lock_max_ahead
    }

    #[must_use]
    pub fn thread_count(&self) -> Option<usize> {
        self.thread_count
    }

    #[must_use]
    pub fn save_dir(&self) -> Option<&Path> {
        self.save_dir.as_deref()
    }

    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }
}

#[derive(Debug, Error)]
pub enum PipelineConfigNewError {
    #[error("read pipeline config file: {0}")]
    ReadFile(std::io::Error),

    #[error("generate pipeline config: {0}")]
    Generate(#[from] GeneratePipelineConfigError),

    #[error("parse pipeline config: {0}")]
    Parse(#[from] ParsePipelineConfigError),
}

#[derive(Debug, Error)]
pub enum GeneratePipelineConfigError {
    #[error("create parent directory: {0}")]
    CreateDir(std::io::Error),

    #[error("write file: {0}")]
    WriteFile(std::io::Error),
}

fn generate_config(path: &Path) -> Result<(), GeneratePipelineConfigError> {
    use GeneratePipelineConfigError::{CreateDir, WriteFile};
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(CreateDir)?;
    }
    fs::write(path, DEFAULT_CONFIG).map_err(WriteFile)
}

const DEFAULT_CONFIG: &str = include_str!("./default_config.json");

#[derive(Debug, Error)]
pub enum ParsePipelineConfigError {
    #[error("{0}")]
    Deserialize(#[from] serde_json::Error),

    #[error("config-tile-count: tile_count must be at least 1")]
    ZeroTileCount,

    #[error("config-extractors: at least one extractor is required")]
    EmptyExtractors,

    #[error("config-step-lock-max-ahead: must be at least 1, got {0}")]
    NonPositiveStepLockMaxAhead(i64),
}

fn parse_config(json: String) -> Result<PipelineConfig, ParsePipelineConfigError> {
    use ParsePipelineConfigError::{EmptyExtractors, NonPositiveStepLockMaxAhead, ZeroTileCount};
    let raw: RawPipelineConfig = serde_json::from_str(&json)?;

    if raw.tile_count == 0 {
        return Err(ZeroTileCount);
    }
    if raw.extractors.is_empty() {
        return Err(EmptyExtractors);
    }
    if raw.step_lock_max_ahead < 1 {
        return Err(NonPositiveStepLockMaxAhead(raw.step_lock_max_ahead));
    }

    Ok(PipelineConfig {
        tile_count: raw.tile_count,
        extractors: raw.extractors,
        output_mode: raw.output_mode,
        step_lock_max_ahead: raw.step_lock_max_ahead,
        thread_count: raw.thread_count,
        save_dir: raw.save_dir,
        raw: json,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_generate_then_load_default_config() {
        let dir = TempDir::new().expect("tempdir");
        let config_path = dir.path().join("configs").join("pipeline.json");

        generate_config(&config_path).expect("generate");
        let config = parse_config(fs::read_to_string(&config_path).expect("read")).expect("parse");
        assert_eq!(config.tile_count(), 4);
        assert_eq!(config.extractors().len(), 1);
        assert_eq!(config.output_mode(), OutputModeConfig::Mono);
    }

    #[test]
    fn test_parse_config_ok() {
        let json = r#"{
            "tile_count": 2,
            "extractors": [{"stream_id": 1, "track_id": 2}],
            "output_mode": "side_by_side",
            "step_lock_max_ahead": 3,
            "thread_count": 4,
            "save_dir": "/tmp/out"
        }"#;
        let config = parse_config(json.to_owned()).expect("parse");
        assert_eq!(config.tile_count(), 2);
        assert_eq!(config.output_mode(), OutputModeConfig::SideBySide);
        assert_eq!(config.step_lock_max_ahead(), 3);
        assert_eq!(config.thread_count(), Some(4));
        assert_eq!(config.save_dir(), Some(Path::new("/tmp/out")));
    }

    #[test]
    fn test_parse_config_zero_tile_count_error() {
        let json = r#"{
            "tile_count": 0,
            "extractors": [{"stream_id": 1, "track_id": 2}],
            "output_mode": "mono",
            "step_lock_max_ahead": 1,
            "thread_count": null,
            "save_dir": null
        }"#;
        assert!(matches!(
            parse_config(json.to_owned()),
            Err(ParsePipelineConfigError::ZeroTileCount)
        ));
    }

    #[test]
    fn test_parse_config_empty_extractors_error() {
        let json = r#"{
            "tile_count": 1,
            "extractors": [],
            "output_mode": "mono",
            "step_lock_max_ahead": 1,
            "thread_count": null,
            "save_dir": null
        }"#;
        assert!(matches!(
            parse_config(json.to_owned()),
            Err(ParsePipelineConfigError::EmptyExtractors)
        ));
    }

    #[test]
    fn test_parse_config_deserialize_error() {
        assert!(matches!(
            parse_config("not json".to_owned()),
            Err(ParsePipelineConfigError::Deserialize(_))
        ));
    }
}
