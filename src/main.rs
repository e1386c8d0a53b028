//! extract CLI entrypoint

use clap::Parser;

use extract_utils::cli::Cli;
use extract_utils::output;

fn main() {
    let cli = Cli::parse();

    if let Err(e) = cli.execute() {
        output::error(&format!("Error: {:#}", e));
        std::process::exit(1);
    }
}
