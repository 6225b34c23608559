//! Event logging for the platoon controller
//!
//! Warnings and reports go into two bounded FIFO logs owned by the controller
//! session, and are mirrored to the `log` facade. Hosts read the logs after a
//! run; nothing is cleared unless they ask for it.

use std::collections::VecDeque;

use log::{debug, info, trace, warn};

/// Maximum number of entries each log retains before dropping the oldest
pub const MAX_LOG_SIZE: usize = 1000;

/// Domain tag appended to every logged message
const LOG_DOMAIN: &str = "PlatoonManager";

/// A single timestamped log entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Simulation time the entry was recorded at, rendered like "17.3"
    pub time: String,
    /// Full message, including the WARNING prefix and the domain tag
    pub message: String,
}

/// Bounded warning and report logs for one controller session
#[derive(Debug)]
pub struct EventLog {
    warnings: VecDeque<LogEntry>,
    reports: VecDeque<LogEntry>,
    verbosity: u8,
}

impl EventLog {
    /// Verbosity levels: 0 silences everything, 1 adds warnings, 2 adds
    /// standard reports, 3 adds extended reports, 4 adds per-vehicle detail.
    pub fn new(verbosity: u8) -> Self {
        Self {
            warnings: VecDeque::new(),
            reports: VecDeque::new(),
            verbosity,
        }
    }

    pub fn verbosity(&self) -> u8 {
        self.verbosity
    }

    /// Record a warning at the given simulation time
    pub fn warn(&mut self, time: f64, message: String) {
        if self.verbosity < 1 {
            return;
        }
        let entry = LogEntry {
            time: format_float(time),
            message: format!("WARNING: {} ({})", message, LOG_DOMAIN),
        };
        warn!("{}: {}", entry.time, entry.message);
        push_bounded(&mut self.warnings, entry);
    }

    /// Record a report at the given simulation time.
    ///
    /// # Arguments
    /// * `level` - minimum verbosity at which the report is kept: 2 for
    ///   standard reports, 3 for extended ones, 4 for per-vehicle detail
    pub fn report(&mut self, time: f64, level: u8, message: String) {
        if self.verbosity < level {
            return;
        }
        let entry = LogEntry {
            time: format_float(time),
            message: format!("{} ({})", message, LOG_DOMAIN),
        };
        match level {
            0..=2 => info!("{}: {}", entry.time, entry.message),
            3 => debug!("{}: {}", entry.time, entry.message),
            _ => trace!("{}: {}", entry.time, entry.message),
        }
        push_bounded(&mut self.reports, entry);
    }

    /// Recorded warnings, oldest first
    pub fn warnings(&self) -> &VecDeque<LogEntry> {
        &self.warnings
    }

    /// Recorded reports, oldest first
    pub fn reports(&self) -> &VecDeque<LogEntry> {
        &self.reports
    }

    /// Drop all recorded entries
    pub fn reset(&mut self) {
        self.warnings.clear();
        self.reports.clear();
    }
}

fn push_bounded(log: &mut VecDeque<LogEntry>, entry: LogEntry) {
    if log.len() >= MAX_LOG_SIZE {
        log.pop_front();
    }
    log.push_back(entry);
}

/// Render a float for log messages: rounded to millis, trailing zeros
/// trimmed, but always at least one decimal ("0.1", "3.0", "17.3")
pub fn format_float(value: f64) -> String {
    let mut text = format!("{:.3}", value);
    while text.ends_with('0') && !text.ends_with(".0") {
        text.pop();
    }
    text
}

/// Render vehicle ids for log messages: ['veh.0', 'veh.1']
pub fn format_id_list(ids: &[String]) -> String {
    let quoted: Vec<String> = ids.iter().map(|id| format!("'{}'", id)).collect();
    format!("[{}]", quoted.join(", "))
}
