// Entrypoint for the CLI application.
// - Keeps `main` small: parse arguments, set up logging, hand off to `ui`.
// - Any error bubbles up as `anyhow::Error`, printed with a non-zero exit.

use clap::Parser;
use esa_cli::{cli, ui};

fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();
    cli::init_tracing(&args);
    ui::run(args)
}
