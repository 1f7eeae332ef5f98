// SPDX-License-Identifier: GPL-2.0-or-later

//! Glue sinks used to validate outputs (`spec.md` §2, §4.8): illustrative
//! only, to enumerate the `Sink`/`Processor` contracts end-to-end, never a
//! production segmenter or muxer.

mod debug_save;
mod save;
mod template;
mod util;

pub use debug_save::DebugSaveSink;
pub use save::SaveProcessor;
pub use template::{InvalidSaveTemplateError, SaveTemplate};
