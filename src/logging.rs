//! A small multi-sink `log::Log` facade (spec.md §1: "a leveled,
//! multi-sink log facility with console / syslog / callback fan-out").
//! Out of scope for the reactor itself — `Reactor` only ever goes through
//! the `log` facade's global macros, same as the teacher's dispatch code.
//!
//! Grounded in the fan-out shape of `r3bl_simple_logger`'s
//! `CombinedLogger` (one `LevelFilter` per sink, `log()` delegates to
//! every sink whose own level admits the record).

use std::io::Write;
use std::sync::Mutex;

use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError};

/// One fan-out destination plus the level filter that gates it.
pub enum Sink {
    /// Delegates to `env_logger`'s own global logger, already installed by
    /// the binary. Used when console output should keep `env_logger`'s
    /// formatting instead of this module's syslog-shaped line format.
    Console,
    /// Writes RFC-3164-shaped lines (`<level> tag: message`) to any
    /// `Write`, standing in for a real syslog transport without pulling
    /// in a network dependency.
    Syslog {
        tag: &'static str,
        writer: Mutex<Box<dyn Write + Send>>,
    },
    /// Hands the formatted line to an arbitrary callback — the "callback
    /// fan-out" leg of spec.md §1.
    Callback(Box<dyn Fn(&Record<'_>) + Send + Sync>),
}

struct LeveledSink {
    level: LevelFilter,
    sink: Sink,
}

/// Fans every admitted record out to each configured sink.
pub struct FanoutLogger {
    level: LevelFilter,
    sinks: Vec<LeveledSink>,
}

impl FanoutLogger {
    pub fn builder() -> FanoutLoggerBuilder {
        FanoutLoggerBuilder { sinks: Vec::new() }
    }
}

pub struct FanoutLoggerBuilder {
    sinks: Vec<LeveledSink>,
}

impl FanoutLoggerBuilder {
    pub fn console(mut self, level: LevelFilter) -> Self {
        self.sinks.push(LeveledSink {
            level,
            sink: Sink::Console,
        });
        self
    }

    pub fn syslog(
        mut self,
        level: LevelFilter,
        tag: &'static str,
        writer: Box<dyn Write + Send>,
    ) -> Self {
        self.sinks.push(LeveledSink {
            level,
            sink: Sink::Syslog {
                tag,
                writer: Mutex::new(writer),
            },
        });
        self
    }

    pub fn callback(
        mut self,
        level: LevelFilter,
        callback: Box<dyn Fn(&Record<'_>) + Send + Sync>,
    ) -> Self {
        self.sinks.push(LeveledSink {
            level,
            sink: Sink::Callback(callback),
        });
        self
    }

    /// Installs the fan-out logger as the global `log` implementation.
    /// The effective max level is the loosest of all configured sinks, so
    /// no sink is starved of records by a stricter global filter.
    pub fn init(self) -> Result<(), SetLoggerError> {
        let level = self
            .sinks
            .iter()
            .map(|s| s.level)
            .max()
            .unwrap_or(LevelFilter::Off);
        let logger = FanoutLogger {
            level,
            sinks: self.sinks,
        };
        log::set_max_level(level);
        log::set_boxed_logger(Box::new(logger))
    }
}

impl Log for FanoutLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record<'_>) {
        for leveled in &self.sinks {
            if record.level() > leveled.level {
                continue;
            }
            match &leveled.sink {
                Sink::Console => {
                    println!("[{}] {}: {}", record.level(), record.target(), record.args());
                }
                Sink::Syslog { tag, writer } => {
                    let severity = syslog_severity(record.level());
                    if let Ok(mut w) = writer.lock() {
                        let _ = writeln!(w, "<{severity}>{tag}: {}", record.args());
                    }
                }
                Sink::Callback(cb) => cb(record),
            }
        }
    }

    fn flush(&self) {
        for leveled in &self.sinks {
            if let Sink::Syslog { writer, .. } = &leveled.sink {
                if let Ok(mut w) = writer.lock() {
                    let _ = w.flush();
                }
            }
        }
    }
}

/// Maps `log::Level` onto the RFC-3164 severity numbers (facility bits
/// left at 0, i.e. "kernel messages", since this sink has no real
/// facility to report).
fn syslog_severity(level: Level) -> u8 {
    match level {
        Level::Error => 3,
        Level::Warn => 4,
        Level::Info => 6,
        Level::Debug | Level::Trace => 7,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex as StdMutex};

    #[test]
    fn syslog_severity_ordering_matches_rfc3164() {
        assert!(syslog_severity(Level::Error) < syslog_severity(Level::Warn));
        assert!(syslog_severity(Level::Warn) < syslog_severity(Level::Info));
        assert!(syslog_severity(Level::Info) < syslog_severity(Level::Debug));
    }

    #[test]
    fn callback_sink_receives_admitted_records() {
        let seen: Arc<StdMutex<Vec<String>>> = Arc::new(StdMutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let logger = FanoutLogger {
            level: LevelFilter::Info,
            sinks: vec![LeveledSink {
                level: LevelFilter::Info,
                sink: Sink::Callback(Box::new(move |record| {
                    seen_clone.lock().unwrap().push(record.args().to_string());
                })),
            }],
        };

        let record = Record::builder()
            .level(Level::Info)
            .target("test")
            .args(format_args!("hello"))
            .build();
        logger.log(&record);

        let debug_record = Record::builder()
            .level(Level::Debug)
            .target("test")
            .args(format_args!("should be filtered"))
            .build();
        logger.log(&debug_record);

        assert_eq!(seen.lock().unwrap().as_slice(), ["hello".to_string()]);
    }
}
