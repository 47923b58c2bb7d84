//! Structs and functions for generating log messages and analysis warnings.

use crate::prelude::*;
use std::collections::BTreeMap;

/// A warning generated by one of the check modules, e.g. a confirmed vulnerability.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Hash, Clone, PartialOrd, Ord, Default)]
pub struct CweWarning {
    /// The name of the check that generated the warning, e.g. `ConAnalysis`.
    pub name: String,
    /// The version number of the check.
    pub version: String,
    /// Source locations (`file:line`) associated with the warning.
    /// The first location usually denotes the program point the warning was generated for.
    pub locations: Vec<String>,
    /// Instruction ids (as assigned by the instruction index) associated with the warning,
    /// e.g. the taint trace leading to a dangerous operation.
    pub tids: Vec<String>,
    /// Function names associated with the warning.
    pub symbols: Vec<String>,
    /// Other useful information. Content depends on the check that generated the warning.
    pub other: Vec<Vec<String>>,
    /// A short description of the warning that is presented to the user.
    pub description: String,
}

impl CweWarning {
    /// Creates a new warning by only setting name, version and description
    pub fn new(
        name: impl ToString,
        version: impl ToString,
        description: impl ToString,
    ) -> CweWarning {
        CweWarning {
            name: name.to_string(),
            version: version.to_string(),
            locations: Vec::new(),
            tids: Vec::new(),
            symbols: Vec::new(),
            other: Vec::new(),
            description: description.to_string(),
        }
    }

    /// Sets the locations field of the warning
    pub fn locations(mut self, locations: Vec<String>) -> CweWarning {
        self.locations = locations;
        self
    }

    /// Sets the tids field of the warning
    pub fn tids(mut self, tids: Vec<String>) -> CweWarning {
        self.tids = tids;
        self
    }

    /// Sets the symbols field of the warning
    pub fn symbols(mut self, symbols: Vec<String>) -> CweWarning {
        self.symbols = symbols;
        self
    }

    /// Sets the other field of the warning
    pub fn other(mut self, other: Vec<Vec<String>>) -> CweWarning {
        self.other = other;
        self
    }
}

impl std::fmt::Display for CweWarning {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            formatter,
            "[{}] ({}) {}",
            self.name, self.version, self.description
        )
    }
}

/// A generic log message.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Hash, Clone, PartialOrd, Ord)]
pub struct LogMessage {
    /// The log message.
    pub text: String,
    /// The severity/type of the log message.
    pub level: LogLevel,
    /// The location in the analyzed program that the message is related to.
    pub location: Option<String>,
    /// The analysis where the message originated.
    pub source: Option<String>,
}

impl LogMessage {
    fn with_level(text: impl Into<String>, level: LogLevel) -> LogMessage {
        LogMessage {
            text: text.into(),
            level,
            location: None,
            source: None,
        }
    }

    /// Create a new `Info`-level log message
    pub fn new_info(text: impl Into<String>) -> LogMessage {
        LogMessage::with_level(text, LogLevel::Info)
    }

    /// Create a new `Debug`-level log message
    pub fn new_debug(text: impl Into<String>) -> LogMessage {
        LogMessage::with_level(text, LogLevel::Debug)
    }

    /// Create a new `Warning`-level log message
    pub fn new_warning(text: impl Into<String>) -> LogMessage {
        LogMessage::with_level(text, LogLevel::Warning)
    }

    /// Create a new `Error`-level log message
    pub fn new_error(text: impl Into<String>) -> LogMessage {
        LogMessage::with_level(text, LogLevel::Error)
    }

    /// Associate a specific location to the log message.
    pub fn location(mut self, location: impl ToString) -> LogMessage {
        self.location = Some(location.to_string());
        self
    }

    /// Set the name of the source analysis for the log message.
    pub fn source(mut self, source: impl Into<String>) -> LogMessage {
        self.source = Some(source.into());
        self
    }
}

/// The severity/type of a log message.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Hash, Clone, PartialOrd, Ord)]
pub enum LogLevel {
    /// Messages intended for debugging.
    Debug,
    /// Errors encountered during analysis.
    Error,
    /// Non-error messages intended for the user.
    Info,
    /// Recoverable problems, e.g. report lines without matching instructions.
    Warning,
}

impl std::fmt::Display for LogMessage {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.level {
            LogLevel::Debug => write!(formatter, "DEBUG: ")?,
            LogLevel::Error => write!(formatter, "ERROR: ")?,
            LogLevel::Info => write!(formatter, "INFO: ")?,
            LogLevel::Warning => write!(formatter, "WARNING: ")?,
        };
        match (&self.source, &self.location) {
            (Some(source), Some(location)) => write!(formatter, "{} @ {}: ", source, location)?,
            (Some(source), None) => write!(formatter, "{}: ", source)?,
            (None, Some(location)) => write!(formatter, "{}: ", location)?,
            (None, None) => (),
        };
        write!(formatter, "{}", self.text)
    }
}

/// Print all provided log messages and warnings.
///
/// Log messages will always be printed to `stdout`.
/// Debug-level messages are only printed if `verbose` is set.
/// Warnings will either be printed to `stdout` or to the file path provided in `out_path`.
///
/// If `emit_json` is set, the warnings will be converted to json for the output.
pub fn print_all_messages(
    logs: Vec<LogMessage>,
    cwes: Vec<CweWarning>,
    out_path: Option<&str>,
    emit_json: bool,
    verbose: bool,
) -> Result<(), Error> {
    for log in logs
        .into_iter()
        .filter(|log| verbose || log.level != LogLevel::Debug)
    {
        println!("{}", log);
    }
    let output: String = if emit_json {
        serde_json::to_string_pretty(&cwes)?
    } else {
        cwes.iter()
            .map(|cwe| format!("{}\n", cwe))
            .collect::<Vec<String>>()
            .concat()
    };
    if let Some(file_path) = out_path {
        std::fs::write(file_path, output)
            .with_context(|| format!("Writing to output path {} failed", file_path))?;
    } else {
        print!("{}", output);
    }
    Ok(())
}

/// For each analysis count the number of debug log messages in `all_logs`
/// and add a (INFO level) log message with the resulting number to `all_logs`.
/// Also count and log the number of general debug log messages.
pub fn add_debug_log_statistics(all_logs: &mut Vec<LogMessage>) {
    let mut analysis_debug_log_count = BTreeMap::new();
    let mut general_debug_log_count = 0u64;
    for log in all_logs.iter().filter(|log| log.level == LogLevel::Debug) {
        if let Some(analysis) = &log.source {
            analysis_debug_log_count
                .entry(analysis.clone())
                .and_modify(|count| *count += 1)
                .or_insert(1u64);
        } else {
            general_debug_log_count += 1;
        }
    }
    for (analysis, count) in analysis_debug_log_count {
        all_logs.push(
            LogMessage::new_info(format!("Logged {} debug log messages.", count)).source(analysis),
        );
    }
    if general_debug_log_count > 0 {
        all_logs.push(LogMessage::new_info(format!(
            "Logged {} general debug log messages.",
            general_debug_log_count
        )));
    }
}
