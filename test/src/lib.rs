//! This crate contains acceptance tests running the *conanal* binary on the sample programs
//! in the `samples` directory.
//!
//! The tests expect `conanal` to be installed and are therefore ignored by default.
//! Run them with `cargo test -- --ignored`.

use colored::*;
use std::process::Command;

/// A test case containing the necessary information to run an acceptance test.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct SampleTestCase {
    /// The name of the sample (according to the file names in the `samples` directory)
    sample: &'static str,
    /// The name of the check to execute
    check_name: &'static str,
    /// Whether the check needs the list of dangerous functions
    needs_dangerous_functions: bool,
}

impl SampleTestCase {
    /// Create a new test case.
    pub fn new(sample: &'static str, check_name: &'static str) -> SampleTestCase {
        SampleTestCase {
            sample,
            check_name,
            needs_dangerous_functions: check_name == "ConAnalysis",
        }
    }

    /// Get the file path of the sample program
    fn get_filepath(&self) -> String {
        format!("samples/{}.json", self.sample)
    }

    /// Run the test case and print to the shell, whether the test case succeeded or not.
    /// Returns stdout + stderr of the test execution on failure.
    pub fn run_test(
        &self,
        search_string: &str,
        num_expected_occurences: usize,
    ) -> Result<(), String> {
        let filepath = self.get_filepath();
        let mut command = Command::new("conanal");
        command
            .arg(&filepath)
            .arg("--race-report")
            .arg(format!("samples/{}.report", self.sample))
            .arg("--partial")
            .arg(self.check_name)
            .arg("--quiet");
        if self.needs_dangerous_functions {
            command
                .arg("--dangerous-functions")
                .arg("samples/dangerous_functions.txt");
        }
        let output = command.output().unwrap();
        if output.status.success() {
            let num_warnings = String::from_utf8(output.stdout)
                .unwrap()
                .lines()
                .filter(|line| line.starts_with(search_string))
                .count();
            if num_warnings == num_expected_occurences {
                println!("{} \t {}", filepath, "[OK]".green());
                Ok(())
            } else {
                println!("{} \t {}", filepath, "[FAILED]".red());
                Err(format!(
                    "Expected occurrences: {num_expected_occurences}. Found: {num_warnings}"
                ))
            }
        } else {
            println!("{} \t {}", filepath, "[FAILED]".red());
            match output.status.code() {
                Some(_code) => Err(String::from_utf8(output.stdout).unwrap()
                    + &String::from_utf8(output.stderr).unwrap()),
                None => Err(format!("Execution failed for file {filepath}")),
            }
        }
    }
}

/// Print the error messages of failed checks.
/// The `error_log` tuples are of the form `(check_filename, error_message)`.
pub fn print_errors(error_log: Vec<(String, String)>) {
    for (filepath, error) in error_log {
        println!("{}", format!("+++ Error for {filepath} +++").red());
        println!("{error}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_all(test_cases: Vec<(SampleTestCase, &str, usize)>) {
        let mut error_log = Vec::new();
        for (test_case, search_string, num_expected_occurences) in test_cases {
            if let Err(error) = test_case.run_test(search_string, num_expected_occurences) {
                error_log.push((test_case.get_filepath(), error));
            }
        }
        if !error_log.is_empty() {
            print_errors(error_log);
            panic!();
        }
    }

    #[test]
    #[ignore]
    fn con_analysis() {
        run_all(vec![
            (
                SampleTestCase::new("ptr_deref", "ConAnalysis"),
                "[ConAnalysis]",
                1,
            ),
            // The busy-wait sample reads the flag only to compare it, no dangerous operation follows.
            (
                SampleTestCase::new("busy_wait", "ConAnalysis"),
                "[ConAnalysis]",
                0,
            ),
        ]);
    }

    #[test]
    #[ignore]
    fn sync_loop() {
        run_all(vec![(
            SampleTestCase::new("busy_wait", "SyncLoop"),
            "[SyncLoop]",
            1,
        )]);
    }
}
