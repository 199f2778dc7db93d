//! CodeQA CLI.
//!
//! # Usage
//!
//! ```bash
//! codeqa build --docs corpus.json --id docs
//! codeqa search "how do I rotate keys" --id docs -k 5
//! codeqa status
//! ```

use std::process::ExitCode;

use clap::Parser;
use codeqa_cli::{CliArgs, CodeqaCli, exit_code};

#[tokio::main]
async fn main() -> ExitCode {
    let args = CliArgs::parse();

    let cli = match CodeqaCli::from_args(&args) {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(exit_code(&e));
        }
    };

    match cli.run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(exit_code(&e))
        }
    }
}
