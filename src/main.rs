mod cli;
mod core;
mod logging;
mod platform;

use crate::core::terminal;

#[tokio::main]
async fn main() {
    if let Err(e) = cli::run_main().await {
        terminal::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
    // A dashboard leaves a stdin reader parked on a blocking thread; do not wait for it.
    std::process::exit(0);
}
