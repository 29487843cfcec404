//! clay - Export, import and lint content between Clay sites

use std::process::ExitCode;

fn main() -> ExitCode {
    if let Err(e) = claycli::cli::run() {
        eprintln!("Error: {:#}", e);
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
