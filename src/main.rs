//! scanguard - Resilient batch log analysis
//!
//! Entry point for the scanguard CLI application.

use clap::Parser;
use scanguard::{
    cli::Cli,
    error::{ExitCode, StructuredError},
    signal::Cancelled,
};

fn main() {
    // Parse command-line arguments
    let cli = Cli::parse();
    let json_errors = cli.json_errors;

    // Run the application logic
    match scanguard::run_app(cli) {
        Ok(code) => std::process::exit(code.as_i32()),
        Err(err) => {
            // Determine appropriate exit code for errors
            let exit_code = if err.chain().any(|cause| cause.is::<Cancelled>()) {
                ExitCode::Interrupted
            } else {
                ExitCode::GeneralError
            };

            // Report the error
            if json_errors {
                let structured = StructuredError::new(&err, exit_code);
                if let Ok(json) = serde_json::to_string_pretty(&structured) {
                    eprintln!("{}", json);
                } else {
                    eprintln!("[{}] Error: {:#}", exit_code.code_prefix(), err);
                }
            } else {
                eprintln!("[{}] Error: {:#}", exit_code.code_prefix(), err);
            }

            std::process::exit(exit_code.as_i32());
        }
    }
}
