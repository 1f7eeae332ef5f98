// SPDX-License-Identifier: GPL-2.0-or-later

use std::sync::Arc;

/// Severity of a diagnostic message, same four-level scheme used throughout
/// the host tool's own logging façade.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warning,
    Info,
    Debug,
}

pub type ArcMsgLogger = Arc<dyn MsgLogger + Send + Sync>;

/// Optional diagnostic hook every node accepts (`*.setLog(log)` in the
/// external-interfaces contract); default is to drop messages.
pub trait MsgLogger {
    fn log(&self, level: LogLevel, msg: &str);
}

pub struct DummyMsgLogger;

impl MsgLogger for DummyMsgLogger {
    fn log(&self, _level: LogLevel, _msg: &str) {}
}

#[must_use]
pub fn dummy_msg_logger() -> ArcMsgLogger {
    Arc::new(DummyMsgLogger)
}
