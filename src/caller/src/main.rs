//! This crate defines the command line interface for conanal.
//! General documentation about conanal is contained in the [`conanal_lib`] crate.

extern crate conanal_lib; // Needed for the docstring-link to work

use anyhow::{anyhow, Context, Error};
use conanal_lib::analysis::labels::DangerousOpLabels;
use conanal_lib::pipeline::{load_program, ManualOverrides, PreparedProgram};
use conanal_lib::utils::log::{add_debug_log_statistics, print_all_messages};
use conanal_lib::utils::report::read_race_report;
use conanal_lib::utils::{load_config, read_dangerous_function_list};
use conanal_lib::CheckModule;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
/// Decide whether a data race reported by a dynamic race detector is security relevant
struct CmdlineArgs {
    /// The path to the JSON representation of the program.
    #[structopt(required_unless("module-versions"), validator(check_file_existence))]
    program: Option<String>,

    /// The race report. For ConAnalysis: the corrupted value site followed by its call stack.
    /// For SyncLoop: the racing write followed by the racing read.
    #[structopt(long, short, required_unless("module-versions"), validator(check_file_existence))]
    race_report: Option<String>,

    /// A file listing the names of dangerous functions, one per line.
    /// Required if the ConAnalysis check is run.
    #[structopt(long, short, validator(check_file_existence))]
    dangerous_functions: Option<String>,

    /// Specify a specific set of checks to be run as a comma separated list, e.g. 'ConAnalysis,SyncLoop'.
    /// Only ConAnalysis is run by default.
    ///
    /// Use the "--module-versions" command line option to get a list of all valid check names.
    #[structopt(long, short)]
    partial: Option<String>,

    /// Manually set the instruction id of the corrupted value for the ConAnalysis check.
    #[structopt(long)]
    corrupt_var: Option<u64>,

    /// Manually set the instruction id of the racing write for the SyncLoop check.
    #[structopt(long)]
    write_var: Option<u64>,

    /// Manually set the instruction id of the racing read for the SyncLoop check.
    #[structopt(long)]
    read_var: Option<u64>,

    /// Path to a custom configuration file to use instead of the standard one.
    #[structopt(long, short, validator(check_file_existence))]
    config: Option<String>,

    /// Write the results to a file instead of stdout.
    /// This only affects warnings. Log messages are still printed to stdout.
    #[structopt(long, short)]
    out: Option<String>,

    /// Generate JSON output.
    #[structopt(long, short)]
    json: bool,

    /// Do not print log messages. This prevents polluting stdout for json output.
    #[structopt(long, short)]
    quiet: bool,

    /// Print debug log messages and statistics about them.
    #[structopt(long, short)]
    verbose: bool,

    /// Prints out the version numbers of all known modules.
    #[structopt(long)]
    module_versions: bool,

    /// Print the numbered instruction listing of the program and quit.
    /// The instruction ids can be used for the manual override options.
    #[structopt(long, hidden = true)]
    debug: bool,
}

fn main() {
    let cmdline_args = CmdlineArgs::from_args();

    if let Err(err) = run(cmdline_args) {
        eprintln!("Error: {:#}", err);
        std::process::exit(101);
    }
}

/// Check the existence of a file
fn check_file_existence(file_path: String) -> Result<(), String> {
    if std::fs::metadata(&file_path)
        .map_err(|err| format!("{}", err))?
        .is_file()
    {
        Ok(())
    } else {
        Err(format!("{} is not a file.", file_path))
    }
}

/// Run the selected checks on the program.
fn run(args: CmdlineArgs) -> Result<(), Error> {
    let mut modules = conanal_lib::get_modules();
    if args.module_versions {
        // Only print the module versions and then quit.
        println!("[conanal] module_versions:");
        for module in modules.iter() {
            println!("{}", module);
        }
        return Ok(());
    }

    let config = load_config(args.config.as_deref().map(Path::new))?;

    // Filter the modules to be executed if the `--partial` parameter is set.
    if let Some(ref partial_module_list) = args.partial {
        filter_modules_for_partial_run(&mut modules, partial_module_list)?;
    } else {
        modules.retain(|module| module.name == "ConAnalysis");
    }

    let program_path = PathBuf::from(
        args.program
            .as_deref()
            .ok_or_else(|| anyhow!("No program given"))?,
    );
    let (program, mut all_logs) = load_program(&program_path)?;
    let prepared = PreparedProgram::new(program);

    if args.debug {
        print!("{}", prepared.index.listing(&prepared.program));
        return Ok(());
    }

    let report_path = args
        .race_report
        .as_deref()
        .ok_or_else(|| anyhow!("No race report given"))?;
    let race_report = read_race_report(Path::new(report_path))?;

    let labels = if modules.iter().any(|module| module.name == "ConAnalysis") {
        let list_path = args
            .dangerous_functions
            .as_deref()
            .context("The ConAnalysis check needs a list of dangerous functions (--dangerous-functions)")?;
        let dangerous_functions = read_dangerous_function_list(Path::new(list_path))?;
        Some(DangerousOpLabels::new(&prepared.program, dangerous_functions))
    } else {
        None
    };

    let analysis_results = prepared
        .analysis_results(&race_report)
        .with_labels(labels.as_ref())
        .with_overrides(ManualOverrides {
            corrupted_var: args.corrupt_var,
            write_var: args.write_var,
            read_var: args.read_var,
        });
    all_logs.push(prepared.statistics());

    // Execute the modules and collect their logs and warnings.
    let mut all_warnings = Vec::new();
    for module in modules {
        let (mut logs, mut warnings) = (module.run)(&analysis_results, &config[&module.name])
            .with_context(|| format!("The {} check failed", module.name))?;
        all_logs.append(&mut logs);
        all_warnings.append(&mut warnings);
    }

    // Print the results of the modules.
    if args.quiet {
        all_logs = Vec::new(); // Suppress all log messages since the `--quiet` flag is set.
    } else if args.verbose {
        add_debug_log_statistics(&mut all_logs);
    }
    print_all_messages(
        all_logs,
        all_warnings,
        args.out.as_deref(),
        args.json,
        args.verbose,
    )
}

/// Only keep the modules specified by the `--partial` parameter in the `modules` list.
/// The parameter is a comma-separated list of module names, e.g. 'ConAnalysis,SyncLoop'.
fn filter_modules_for_partial_run(
    modules: &mut Vec<&CheckModule>,
    partial_param: &str,
) -> Result<(), Error> {
    let module_names: HashSet<&str> = partial_param.split(',').collect();
    for module_name in module_names.iter() {
        if !module_name.is_empty() && !modules.iter().any(|module| module.name == *module_name) {
            return Err(anyhow!("{} is not a valid module name.", module_name));
        }
    }
    modules.retain(|module| module_names.contains(module.name));
    Ok(())
}
