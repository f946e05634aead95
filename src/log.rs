// SPDX-License-Identifier: GPL-2.0

//! Verbose logging for the analyzer
//!
//! The core never writes to stdio. Everything it wants to say - invariants,
//! per-label diagnostics, statistics - is appended to a [`VerifierLog`]
//! owned by the host, which decides what to do with the buffer. The
//! buffer is bounded: once a line no longer fits under the byte limit,
//! it and everything after it is dropped and only counted, so a noisy
//! verification run cannot grow the log without bound.

/// Log level threshold for analyzer output
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum LogLevel {
    /// No logging
    #[default]
    Off = 0,
    /// Failed checks only
    Error = 1,
    /// Checks plus per-label invariants
    Info = 2,
    /// Everything, including fixpoint progress
    Debug = 3,
}

const DEFAULT_LIMIT: usize = 1 << 20;
const OVERFLOW_NOTICE: &str = "[log limit reached, dropping further lines]\n";

/// Append-only, size-bounded log buffer
#[derive(Debug, Clone)]
pub struct VerifierLog {
    /// Log level threshold
    pub level: LogLevel,
    buf: String,
    limit: usize,
    dropped: usize,
}

impl Default for VerifierLog {
    fn default() -> Self {
        Self::new(LogLevel::Off)
    }
}

impl VerifierLog {
    /// Create a new log with the given level and the default 1MB cap
    pub fn new(level: LogLevel) -> Self {
        Self::with_limit(level, DEFAULT_LIMIT)
    }

    /// Create a log with a custom byte cap
    pub fn with_limit(level: LogLevel, limit: usize) -> Self {
        VerifierLog {
            level,
            buf: String::new(),
            limit,
            dropped: 0,
        }
    }

    /// Check whether messages at `level` would be kept
    pub fn enabled(&self, level: LogLevel) -> bool {
        match self.level {
            LogLevel::Off => false,
            threshold => level != LogLevel::Off && level <= threshold,
        }
    }

    /// Append one line at the given level. Lines past the byte cap are
    /// counted rather than stored, after a single overflow notice.
    pub fn log(&mut self, level: LogLevel, msg: &str) {
        if !self.enabled(level) {
            return;
        }
        let room = self.limit.saturating_sub(self.buf.len());
        if self.dropped > 0 || msg.len() + 1 > room {
            if self.dropped == 0 && room >= OVERFLOW_NOTICE.len() {
                self.buf.push_str(OVERFLOW_NOTICE);
            }
            self.dropped += 1;
            return;
        }
        self.buf.push_str(msg);
        self.buf.push('\n');
    }

    /// Log a failed or undecided check
    pub fn error(&mut self, msg: &str) {
        self.log(LogLevel::Error, msg);
    }

    /// Log invariants and reports
    pub fn info(&mut self, msg: &str) {
        self.log(LogLevel::Info, msg);
    }

    /// Log fixpoint progress
    pub fn debug(&mut self, msg: &str) {
        self.log(LogLevel::Debug, msg);
    }

    /// Get the log contents
    pub fn contents(&self) -> &str {
        &self.buf
    }

    /// Number of lines the byte cap swallowed
    pub fn dropped_lines(&self) -> usize {
        self.dropped
    }

    /// Clear the log and start accepting lines again
    pub fn clear(&mut self) {
        self.buf.clear();
        self.dropped = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_filter_messages() {
        let mut log = VerifierLog::new(LogLevel::Error);
        log.error("kept");
        log.info("filtered");
        assert_eq!(log.contents(), "kept\n");
        assert!(!log.enabled(LogLevel::Off));
        assert!(VerifierLog::default().contents().is_empty());
    }

    #[test]
    fn cap_drops_and_counts_whole_lines() {
        let mut log = VerifierLog::with_limit(LogLevel::Error, 64);
        log.error("first");
        log.error(&"x".repeat(80));
        log.error("late");
        assert!(log.contents().starts_with("first\n"));
        assert!(log.contents().contains("limit reached"));
        assert_eq!(log.dropped_lines(), 2);
        assert!(log.contents().len() <= 64);
        log.clear();
        log.error("again");
        assert_eq!(log.contents(), "again\n");
        assert_eq!(log.dropped_lines(), 0);
    }
}
