// SPDX-License-Identifier: GPL-2.0-or-later

//! Illustrative `Save` processor (`spec.md` §4.8): writes one file per
//! sequence step under a `$Number$`-templated filename, then forwards the
//! input unchanged so a downstream reader can verify testable property 7
//! (byte-equal payload, equal metadata modulo per-pipeline tags).

use crate::template::SaveTemplate;
use crate::util::storage_bytes;
use common::Streams;
use graph::{NodeBase, NodeError, Processor};
use std::fs;
use std::path::PathBuf;

pub struct SaveProcessor {
    name: String,
    dir: PathBuf,
    template: SaveTemplate,
    counter: u64,
}

impl SaveProcessor {
    pub fn new(
        dir: PathBuf,
        template: &str,
    ) -> Result<Self, crate::template::InvalidSaveTemplateError> {
        Ok(Self {
            name: "save".to_owned(),
            dir,
            template: SaveTemplate::parse(template)?,
            counter: 0,
        })
    }
}

impl NodeBase for SaveProcessor {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Processor for SaveProcessor {
    fn has_input(&mut self, streams: Streams) -> Result<Vec<Streams>, NodeError> {
        if !streams.is_end_of_stream() {
            let path = self.dir.join(self.template.render(self.counter));
            self.counter += 1;
            let bytes: Vec<u8> = streams
                .as_slice()
                .iter()
                .flat_map(|d| storage_bytes(d.storage()))
                .collect();
            fs::write(&path, &bytes).map_err(|source| NodeError::CannotWriteFile {
                path: path.display().to_string(),
                source,
            })?;
        }
        Ok(vec![streams])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use common::{CpuPlanes, Data, Storage, StreamId};
    use std::sync::Arc;

    #[test]
    fn test_round_trips_payload_byte_equal() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut save = SaveProcessor::new(dir.path().to_path_buf(), "seg-$Number$.264")
            .expect("valid template");

        let payload = Bytes::from_static(b"hevc-nal-bytes");
        let data = Data::new(
            Storage::Cpu(Arc::new(CpuPlanes::single(payload.clone(), 0))),
            StreamId::new(3),
        );
        let out = save
            .has_input(Streams::single(data))
            .expect("has_input");
        assert_eq!(out.len(), 1, "the input passes through unchanged");
        assert_eq!(out[0].as_slice()[0].stream_id(), StreamId::new(3));

        let written = fs::read(dir.path().join("seg-0.264")).expect("read back");
        assert_eq!(written, payload.to_vec());
    }

    #[test]
    fn test_counter_advances_per_step() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut save =
            SaveProcessor::new(dir.path().to_path_buf(), "seg-$Number$.264").expect("valid");
        for _ in 0..3 {
            save.has_input(Streams::single(Data::empty(StreamId::new(0))))
                .expect("has_input");
        }
        for i in 0..3 {
            assert!(dir.path().join(format!("seg-{i}.264")).exists());
        }
    }

    #[test]
    fn test_end_of_stream_passes_through_without_writing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut save =
            SaveProcessor::new(dir.path().to_path_buf(), "seg-$Number$.264").expect("valid");
        let out = save
            .has_input(Streams::single(Data::end_of_stream(StreamId::new(0))))
            .expect("has_input");
        assert!(out[0].is_end_of_stream());
        assert_eq!(fs::read_dir(dir.path()).expect("read_dir").count(), 0);
    }
}
