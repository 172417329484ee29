//! Console and log-file logging for orthocurate

use crate::filter::FilterDecision;
use colored::*;
use log::{Level, LevelFilter, Metadata, Record};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

/// Logger writing coloured messages to the console and plain ones to an optional file
pub struct CurateLogger {
    console_level: LevelFilter,
    file_writer: Option<Mutex<Box<dyn Write + Send>>>,
}

impl CurateLogger {
    pub fn new(verbose: bool, log_file: Option<&Path>) -> Result<Self, std::io::Error> {
        let console_level = if verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        };

        let file_writer = match log_file {
            Some(log_path) => {
                if let Some(parent) = log_path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                let file = OpenOptions::new()
                    .create(true)
                    .write(true)
                    .truncate(true)
                    .open(log_path)?;
                Some(Mutex::new(Box::new(file) as Box<dyn Write + Send>))
            }
            None => None,
        };

        Ok(CurateLogger {
            console_level,
            file_writer,
        })
    }

    /// Whether a record at `level` goes to the console. Warnings are only
    /// shown in verbose mode.
    fn shows_on_console(&self, level: Level) -> bool {
        match level {
            Level::Error => true,
            Level::Warn => self.console_level >= LevelFilter::Debug,
            other => other <= self.console_level,
        }
    }
}

impl log::Log for CurateLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.file_writer.is_some() || metadata.level() <= self.console_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let timestamp = chrono::Local::now().format("%H:%M:%S");
        let level = record.level();
        let target = record.target();
        let message = record.args();

        if self.shows_on_console(level) {
            let colored_level = match level {
                Level::Error => "ERROR".red().bold(),
                Level::Warn => "WARN".yellow().bold(),
                Level::Info => "INFO".green().bold(),
                Level::Debug => "DEBUG".blue().bold(),
                Level::Trace => "TRACE".purple().bold(),
            };
            let line = format!(
                "[{} {} {}] {}",
                timestamp.to_string().dimmed(),
                colored_level,
                target.cyan(),
                message
            );
            if level <= Level::Warn {
                eprintln!("{}", line);
            } else {
                println!("{}", line);
            }
        }

        if let Some(ref file_writer) = self.file_writer {
            if let Ok(mut writer) = file_writer.lock() {
                let _ = writeln!(writer, "[{} {} {}] {}", timestamp, level, target, message);
                let _ = writer.flush();
            }
        }
    }

    fn flush(&self) {
        if let Some(ref file_writer) = self.file_writer {
            if let Ok(mut writer) = file_writer.lock() {
                let _ = writer.flush();
            }
        }
    }
}

/// Install [`CurateLogger`] as the global logger
pub fn init_logger(verbose: bool, log_file: Option<&Path>) -> Result<(), anyhow::Error> {
    let logger = CurateLogger::new(verbose, log_file)
        .map_err(|e| anyhow::anyhow!("Failed to create logger: {}", e))?;

    log::set_boxed_logger(Box::new(logger))
        .map_err(|e| anyhow::anyhow!("Failed to set logger: {}", e))?;
    log::set_max_level(LevelFilter::Debug);

    Ok(())
}

/// Log the keep/discard decision for one candidate sequence
pub fn log_filter_decision(decision: &FilterDecision, threshold: f64) {
    if decision.keep {
        log::debug!(
            target: "orthocurate::filter",
            "KEEP: Sequence={}, Reference={}, Overlap={:.2}%, Threshold={}%",
            decision.sequence, decision.reference, decision.overlap, threshold
        );
    } else {
        log::info!(
            target: "orthocurate::filter",
            "DISCARD: Sequence={}, Reference={}, Overlap={:.2}% <= Threshold={}%",
            decision.sequence, decision.reference, decision.overlap, threshold
        );
    }
}

/// Log how one family's orthology was resolved
pub fn log_family_resolution(family: &str, sequences: usize, groups: usize, maximal_groups: usize) {
    log::info!(
        target: "orthocurate::orthology",
        "FAMILY: Name={}, Sequences={}, Relationships={}, MaximalGroupsSoFar={}",
        family, sequences, groups, maximal_groups
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::Log;
    use tempfile::tempdir;

    #[test]
    fn test_console_levels() {
        let quiet = CurateLogger::new(false, None).unwrap();
        assert!(quiet.shows_on_console(Level::Error));
        assert!(quiet.shows_on_console(Level::Info));
        assert!(!quiet.shows_on_console(Level::Warn));
        assert!(!quiet.shows_on_console(Level::Debug));

        let verbose = CurateLogger::new(true, None).unwrap();
        assert!(verbose.shows_on_console(Level::Warn));
        assert!(verbose.shows_on_console(Level::Debug));
        assert!(!verbose.shows_on_console(Level::Trace));
    }

    #[test]
    fn test_file_receives_every_level() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("logs").join("run.log");
        let logger = CurateLogger::new(false, Some(&path)).unwrap();

        logger.log(
            &Record::builder()
                .level(Level::Debug)
                .target("orthocurate::test")
                .args(format_args!("hidden on console"))
                .build(),
        );
        logger.flush();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("DEBUG orthocurate::test] hidden on console"));
    }
}
