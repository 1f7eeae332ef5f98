// SPDX-License-Identifier: GPL-2.0-or-later

//! Lightweight logging façade (`SPEC_FULL.md` §3), mirroring the shape of
//! `common::{ArcMsgLogger, MsgLogger, LogLevel}` with concrete
//! implementations a real graph can plug in, rather than the teacher's full
//! SQLite-backed `log_db` (a SentryShot-specific log viewer with no place
//! in a library that has no web frontend of its own).

use common::time::UnixNano;
use common::{ArcMsgLogger, LogLevel, MsgLogger};
use std::sync::{Arc, Mutex};

fn level_tag(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Error => "ERROR",
        LogLevel::Warning => "WARN",
        LogLevel::Info => "INFO",
        LogLevel::Debug => "DEBUG",
    }
}

fn level_rank(level: LogLevel) -> u8 {
    match level {
        LogLevel::Error => 0,
        LogLevel::Warning => 1,
        LogLevel::Info => 2,
        LogLevel::Debug => 3,
    }
}

fn level_at_least(level: LogLevel, min: LogLevel) -> bool {
    level_rank(level) <= level_rank(min)
}

/// Prints every message at or above `min_level` to stderr, prefixed with a
/// wall-clock timestamp and level tag. The node-facing default for
/// `omaf_authord`.
pub struct StderrLogger {
    min_level: LogLevel,
}

impl StderrLogger {
    #[must_use]
    pub fn new(min_level: LogLevel) -> Arc<Self> {
        Arc::new(Self { min_level })
    }
}

impl MsgLogger for StderrLogger {
    fn log(&self, level: LogLevel, msg: &str) {
        if !level_at_least(level, self.min_level) {
            return;
        }
        let stamp = UnixNano::now()
            .as_chrono()
            .map(|t| t.format("%Y-%m-%d %H:%M:%S%.3f").to_string())
            .unwrap_or_else(|| "????-??-?? ??:??:??".to_owned());
        eprintln!("{stamp} [{}] {msg}", level_tag(level));
    }
}

#[must_use]
pub fn arc_stderr_logger(min_level: LogLevel) -> ArcMsgLogger {
    StderrLogger::new(min_level)
}

/// Captures every message in memory instead of printing it, for tests that
/// need to assert a node actually logged something without scraping stderr.
#[derive(Default)]
pub struct CapturingLogger {
    entries: Mutex<Vec<(LogLevel, String)>>,
}

impl CapturingLogger {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    #[must_use]
    pub fn entries(&self) -> Vec<(LogLevel, String)> {
        self.entries
            .lock()
            .expect("capturing logger mutex poisoned")
            .clone()
    }
}

impl MsgLogger for CapturingLogger {
    fn log(&self, level: LogLevel, msg: &str) {
        self.entries
            .lock()
            .expect("capturing logger mutex poisoned")
            .push((level, msg.to_owned()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capturing_logger_records_in_order() {
        let logger = CapturingLogger::new();
        logger.log(LogLevel::Info, "starting");
        logger.log(LogLevel::Error, "oh no");
        let entries = logger.entries();
        assert_eq!(
            entries,
            vec![
                (LogLevel::Info, "starting".to_owned()),
                (LogLevel::Error, "oh no".to_owned()),
            ]
        );
    }

    #[test]
    fn test_level_at_least_is_more_permissive_for_lower_rank() {
        assert!(level_at_least(LogLevel::Error, LogLevel::Debug));
        assert!(!level_at_least(LogLevel::Debug, LogLevel::Error));
        assert!(level_at_least(LogLevel::Info, LogLevel::Info));
    }
}
