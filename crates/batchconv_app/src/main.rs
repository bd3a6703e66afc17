mod platform;

use std::process::ExitCode;

use clap::Parser;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = platform::Cli::parse();
    platform::exit_code(platform::run(cli).await)
}
