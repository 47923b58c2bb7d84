//! The implemented checks.
//!
//! Each check module exposes a `CHECK_MODULE` struct naming the check and the function that runs it.
//! See [`get_modules`](crate::get_modules) for the list of all checks.

pub mod con_analysis;
pub mod sync_loop;
