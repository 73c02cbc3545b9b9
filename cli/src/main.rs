// SPDX-License-Identifier: AGPL-3.0-or-later
mod cli;
mod error;
mod logger;

use clap::Parser;
use cli::{run_cli, CliArgs};
use logger::init_logger;

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();
    init_logger(args.verbose);

    let code = run_cli(&args).await;
    std::process::exit(code);
}
