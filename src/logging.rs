//! Verbosity-tiered logging routed through a caller-supplied sink.
//!
//! The solver never prints on its own; every message goes through the
//! injected callback. Levels:
//! - 0: silent
//! - 1: phase summaries (growth finished, pruning kept N)
//! - 2: merges, deactivations, tight edges
//! - 3: full event internals (stale events, reschedules)

pub const VERBOSITY_SILENT: u8 = 0;
pub const VERBOSITY_CHANGES: u8 = 1;
pub const VERBOSITY_CHECKS: u8 = 2;
pub const VERBOSITY_DEBUG: u8 = 3;

/// Formats and forwards messages to the sink when the verbosity allows it.
pub struct Logger<'a> {
    pub verbosity: u8,
    sink: Option<&'a dyn Fn(&str)>,
}

impl<'a> Logger<'a> {
    pub fn new(verbosity: u8, sink: &'a dyn Fn(&str)) -> Self {
        Logger {
            verbosity,
            sink: Some(sink),
        }
    }

    /// A logger that drops everything.
    pub fn silent() -> Self {
        Logger {
            verbosity: VERBOSITY_SILENT,
            sink: None,
        }
    }

    #[doc(hidden)]
    pub fn emit(&self, args: std::fmt::Arguments<'_>) {
        if let Some(sink) = self.sink {
            sink(&args.to_string());
        }
    }
}

impl Default for Logger<'_> {
    fn default() -> Self {
        Self::silent()
    }
}

/// Log at CHANGES level (verbosity >= 1).
///
/// Used for: per-solve summaries of growth and pruning.
#[macro_export]
macro_rules! log_changes {
    ($logger:expr, $($arg:tt)*) => {
        if $logger.verbosity >= $crate::logging::VERBOSITY_CHANGES {
            $logger.emit(format_args!($($arg)*));
        }
    };
}

/// Log at CHECKS level (verbosity >= 2).
///
/// Used for: cluster merges, deactivations, edges going tight.
#[macro_export]
macro_rules! log_checks {
    ($logger:expr, $($arg:tt)*) => {
        if $logger.verbosity >= $crate::logging::VERBOSITY_CHECKS {
            $logger.emit(format_args!($($arg)*));
        }
    };
}

/// Log at DEBUG level (verbosity >= 3).
///
/// Used for: stale events, edge reschedules, internal bookkeeping.
#[macro_export]
macro_rules! log_debug {
    ($logger:expr, $($arg:tt)*) => {
        if $logger.verbosity >= $crate::logging::VERBOSITY_DEBUG {
            $logger.emit(format_args!($($arg)*));
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn test_macros_respect_verbosity() {
        let lines = RefCell::new(Vec::new());
        let sink = |message: &str| lines.borrow_mut().push(message.to_string());
        let logger = Logger::new(VERBOSITY_CHECKS, &sink);

        log_changes!(logger, "changed {}", 1);
        log_checks!(logger, "checked");
        log_debug!(logger, "debugged");

        assert_eq!(*lines.borrow(), vec!["changed 1".to_string(), "checked".to_string()]);
    }

    #[test]
    fn test_silent_logger_drops_everything() {
        let logger = Logger::silent();
        log_changes!(logger, "never rendered {}", 42);
        assert_eq!(logger.verbosity, VERBOSITY_SILENT);
    }
}
