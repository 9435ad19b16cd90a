//! # brecho CLI
//!
//! Command-line interface and HTTP gateway for Brecho intake.
//! Run `brecho --help` for usage information.

mod cli;
mod gateway;
pub mod ui;

use std::process::ExitCode;

fn main() -> ExitCode {
    cli::run()
}
