//! This module contains various utility modules and helper functions.

pub mod log;
pub mod report;

use crate::prelude::*;
use std::collections::BTreeSet;
use std::path::Path;

/// The standard configuration file shipped with the analyzer.
const DEFAULT_CONFIG: &str = include_str!("../../../config.json");

/// Get the contents of a configuration file from the user configuration directory.
pub fn read_config_file(filename: &str) -> Result<serde_json::Value, Error> {
    let project_dirs = directories::ProjectDirs::from("", "", "conanal")
        .context("Could not discern location of configuration files.")?;
    let config_dir = project_dirs.config_dir();
    let config_path = config_dir.join(filename);
    let config_file =
        std::fs::read_to_string(config_path).context("Could not read configuration file")?;
    Ok(serde_json::from_str(&config_file)?)
}

/// Get the configuration to use for a run.
///
/// An explicitly given configuration file takes precedence.
/// Otherwise the `config.json` in the user configuration directory is used if it exists,
/// falling back to the built-in standard configuration.
pub fn load_config(config_path: Option<&Path>) -> Result<serde_json::Value, Error> {
    match config_path {
        Some(path) => {
            let file = std::fs::read_to_string(path)
                .with_context(|| format!("Could not read configuration file {}", path.display()))?;
            serde_json::from_str(&file).context("Parsing of the configuration file failed")
        }
        None => match read_config_file("config.json") {
            Ok(config) => Ok(config),
            Err(_) => default_config(),
        },
    }
}

/// Get the built-in standard configuration.
pub fn default_config() -> Result<serde_json::Value, Error> {
    serde_json::from_str(DEFAULT_CONFIG).context("Parsing of the built-in configuration failed")
}

/// Parse a list of dangerous function names.
///
/// The first whitespace-separated token of each line is a function name.
/// Blank lines are ignored.
pub fn parse_dangerous_function_list(content: &str) -> BTreeSet<String> {
    content
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .map(|name| name.to_string())
        .collect()
}

/// Read a list of dangerous function names from a file.
pub fn read_dangerous_function_list(path: &Path) -> Result<BTreeSet<String>, Error> {
    let content = std::fs::read_to_string(path).with_context(|| {
        format!("Could not read dangerous function list {}", path.display())
    })?;
    Ok(parse_dangerous_function_list(&content))
}
