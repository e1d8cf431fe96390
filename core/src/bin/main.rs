/// Conductor CLI
///
/// Runs and validates test configurations from the command line using the
/// built-in engines.

use conductor_core::cli;

#[tokio::main]
async fn main() {
    if let Err(e) = cli::run_cli().await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
