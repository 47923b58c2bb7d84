/*!
The main library of conanal containing the analysis modules and the checks built on top of them.

# What is conanal

conanal is a tool for confirming whether a concurrency bug found by a dynamic race detector
is security relevant.
Given the instruction-level representation of a program and a race report,
it decides whether data corrupted by the race can reach a *dangerous operation*,
i.e. a pointer dereference or a call to a function from a user-provided list of dangerous functions,
under the influence of the corrupted data and along a feasible control flow path.
A second check detects *adhoc synchronization*,
i.e. busy-wait loops polling a flag instead of using proper synchronization primitives.

The program representation is produced by an external compiler front end
and read from a JSON file (see the [`intermediate_representation`] module).

# Usage

```sh
conanal PROGRAM --race-report REPORT --dangerous-functions LIST
```
runs the [`ConAnalysis`](crate::checkers::con_analysis) check.
The race report lists the site of the corrupted value followed by the enclosing call frames,
one `function (file:line)` entry per line.
```sh
conanal PROGRAM --race-report REPORT --partial SyncLoop
```
runs the [`SyncLoop`](crate::checkers::sync_loop) check on a report naming the racing write and read.

The behaviour of each check can be modified through a configuration file
given by the `--config` command line option.
Start by taking a look at the standard configuration file located at `src/config.json`.
*/

pub mod analysis;
pub mod checkers;
pub mod intermediate_representation;
pub mod pipeline;
pub mod utils;

use utils::log::{CweWarning, LogMessage};

mod prelude {
    pub use serde::{Deserialize, Serialize};

    pub use crate::pipeline::AnalysisResults;
    pub use anyhow::{anyhow, bail, Context, Error};
}
use prelude::*;

/// The generic function signature for the main function of a check module
pub type CheckModuleFn =
    fn(&AnalysisResults, &serde_json::Value) -> Result<(Vec<LogMessage>, Vec<CweWarning>), Error>;

/// A structure containing general information about a check module,
/// including the function to be called to run the check.
pub struct CheckModule {
    /// The name of the check.
    pub name: &'static str,
    /// The version number of the check.
    /// Should be incremented whenever significant changes are made to the check.
    pub version: &'static str,
    /// The function that executes the check and returns the warnings found during the check.
    pub run: CheckModuleFn,
}

impl std::fmt::Display for CheckModule {
    /// Print the module name and its version number.
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, r#""{}": "{}""#, self.name, self.version)
    }
}

/// Get a list of all known check modules.
pub fn get_modules() -> Vec<&'static CheckModule> {
    vec![
        &crate::checkers::con_analysis::CHECK_MODULE,
        &crate::checkers::sync_loop::CHECK_MODULE,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_display() {
        let names: Vec<String> = get_modules().iter().map(|m| m.to_string()).collect();
        assert_eq!(names, vec![r#""ConAnalysis": "0.1""#, r#""SyncLoop": "0.1""#]);
    }
}
