//! Parsing of race reports.
//!
//! A race report is a text file with one entry per line of the form
//! `function (path/to/file.c:42)`.
//! For the [`ConAnalysis`](crate::checkers::con_analysis) the first line is the site of the
//! corrupted value and the following lines are the enclosing call frames from the inside out.
//! For the [`SyncLoop`](crate::checkers::sync_loop) detector the report consists of exactly two lines,
//! the racing write followed by the racing read.

use crate::intermediate_representation::FileLine;
use crate::prelude::*;
use regex::Regex;
use std::path::Path;

/// One entry of a race report.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Hash, Clone, PartialOrd, Ord)]
pub struct FuncFileLine {
    /// The name of the function containing the source line.
    pub function: String,
    /// The source file basename and line number.
    pub file_line: FileLine,
}

impl std::fmt::Display for FuncFileLine {
    fn fmt(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(formatter, "{} ({})", self.function, self.file_line)
    }
}

/// Parse the content of a race report.
///
/// Lines containing only whitespace are ignored.
/// Any other line that does not match the expected format is an error.
pub fn parse_race_report(content: &str) -> Result<Vec<FuncFileLine>, Error> {
    let re = Regex::new(r"^(\S+) \(([^ :]+):(\d+)\)")?;
    let mut entries = Vec::new();
    for (line_number, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let captures = re.captures(line.trim_start()).ok_or_else(|| {
            anyhow!(
                "Malformed race report line {}: \"{}\"",
                line_number + 1,
                line
            )
        })?;
        let line_num: u32 = captures[3].parse().with_context(|| {
            format!("Invalid line number in race report line {}", line_number + 1)
        })?;
        entries.push(FuncFileLine {
            function: captures[1].to_string(),
            file_line: FileLine::new(&captures[2], line_num),
        });
    }
    Ok(entries)
}

/// Read and parse a race report file.
pub fn read_race_report(path: &Path) -> Result<Vec<FuncFileLine>, Error> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Could not read race report {}", path.display()))?;
    parse_race_report(&content).with_context(|| format!("Invalid race report {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_report_lines() {
        let report = "main (src/prog.c:10)\nworker (prog.c:42)\n\n   \n";
        let entries = parse_race_report(report).unwrap();
        assert_eq!(
            entries,
            vec![
                FuncFileLine {
                    function: "main".into(),
                    file_line: FileLine::new("prog.c", 10),
                },
                FuncFileLine {
                    function: "worker".into(),
                    file_line: FileLine::new("prog.c", 42),
                },
            ]
        );
        assert_eq!(format!("{}", entries[0]), "main (prog.c:10)");
    }

    #[test]
    fn reject_malformed_lines() {
        assert!(parse_race_report("main prog.c:10").is_err());
        assert!(parse_race_report("main (prog.c:ten)").is_err());
        assert!(parse_race_report("main (my prog.c:10)").is_err());
        assert!(parse_race_report("").unwrap().is_empty());
    }
}
